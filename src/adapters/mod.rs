// Adapters layer: concrete HTTP implementations of the domain ports.

pub mod order_client;
pub mod sheets;

pub use order_client::OrderClient;
pub use sheets::SheetsClient;
