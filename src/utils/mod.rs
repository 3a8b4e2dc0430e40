pub mod a1;
pub mod error;
pub mod logger;
pub mod normalize;
pub mod retry;
pub mod timestamp;
pub mod validation;
