use ledgerline_core::ConfigError;
use ledgerline_migrate::MigrationError;
use thiserror::Error;

/// Top-level error of the `ledgerline` binary
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation cancelled: {reason}")]
    Cancelled { reason: String },

    #[error("Failed to initialize logging: {message}")]
    Logging { message: String },
}
