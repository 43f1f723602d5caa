//! # ledgerline-core
//!
//! Application configuration and logging bootstrap shared by the ledgerline
//! crates. The migration engine itself lives in `ledgerline-migrate`.

pub mod config;
pub mod logging;

pub use config::{AppConfig, ConfigError, ConfigResult, ConfigSource, Environment, LogFormat};
pub use logging::{init_logging, LoggingConfig};
