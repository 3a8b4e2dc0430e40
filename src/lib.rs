pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::{Cli, Command};

pub use adapters::{OrderClient, SheetsClient};
pub use config::toml_config::{AppConfig, TableSpec};
pub use core::{resolver::OrderResolver, service::ReconcileService, store::RecordStore};
pub use utils::error::{ReconcileError, Result};
