pub mod app_config;
pub mod sources;

use std::path::PathBuf;

use thiserror::Error;

pub use app_config::*;
pub use sources::*;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {field}. {hint}")]
    MissingRequired { field: String, hint: String },

    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Cannot read configuration file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse configuration file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, value: impl Into<String>, expected: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.into(),
            expected: expected.into(),
        }
    }
}
