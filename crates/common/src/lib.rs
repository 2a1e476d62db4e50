//! testdeck common library
//!
//! Shared data model, filesystem test discovery, configuration and the
//! bounded in-memory store used by the runner and the web server.

pub mod config;
pub mod error;
pub mod scanner;
pub mod store;
pub mod types;

pub use config::{AppConfig, DEFAULT_CONFIG_FILE};
pub use error::{Error, Result};
pub use scanner::{scan, TestScanner};
pub use store::{StorePolicy, TtlStore};
pub use types::*;

/// testdeck version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
