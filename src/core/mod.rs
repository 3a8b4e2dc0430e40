pub mod cache;
pub mod key_gate;
pub mod listing;
pub mod resolver;
pub mod service;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::domain::model::{Resolution, TableSnapshot};
pub use crate::domain::ports::{OrderSearch, SheetBackend};
pub use crate::utils::error::Result;
