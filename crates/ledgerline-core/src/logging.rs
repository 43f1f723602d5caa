//! # Structured Logging
//!
//! `tracing-subscriber` setup for the ledgerline binaries. Logs go to stderr
//! so stdout stays free for command output.

use std::io;

use serde_json::{json, Value};
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{AppConfig, Environment, LogFormat};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "warn")
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Include file and line number information
    pub include_location: bool,
    /// Include the event target (module path)
    pub include_target: bool,
    /// Environment filter (supports directives like "ledgerline_migrate=debug,sqlx=warn")
    pub env_filter: Option<String>,
    /// Custom fields reported when logging starts
    pub global_fields: serde_json::Map<String, Value>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_location: false,
            include_target: false,
            env_filter: None,
            global_fields: serde_json::Map::new(),
        }
    }
}

impl LoggingConfig {
    /// Create production logging configuration
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            include_location: false,
            include_target: true,
            env_filter: Some(crate_filter("info")),
            global_fields: env_field("production"),
        }
    }

    /// Create development logging configuration
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: LogFormat::Pretty,
            include_location: true,
            include_target: true,
            env_filter: Some(crate_filter("debug")),
            global_fields: env_field("development"),
        }
    }

    /// Create test logging configuration (minimal output)
    pub fn test() -> Self {
        Self {
            level: "error".to_string(),
            format: LogFormat::Plain,
            include_location: false,
            include_target: false,
            env_filter: Some(crate_filter("error")),
            global_fields: env_field("test"),
        }
    }

    /// Preset for `environment`
    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Development => Self::development(),
            Environment::Testing => Self::test(),
            Environment::Production => Self::production(),
        }
    }

    /// Level and format from application configuration on top of the environment preset
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self::for_environment(config.environment)
            .with_level(&config.log_level)
            .with_format(config.log_format)
    }

    pub fn with_level(mut self, level: &str) -> Self {
        self.level = level.to_string();
        self.env_filter = Some(crate_filter(level));
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Add a global field to report at startup
    pub fn with_global_field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.global_fields.insert(key.into(), value.into());
        self
    }

    /// Set environment filter
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Filter directives used when `RUST_LOG` is not set
    pub fn filter_directives(&self) -> &str {
        self.env_filter.as_deref().unwrap_or(&self.level)
    }
}

fn crate_filter(level: &str) -> String {
    format!(
        "ledgerline_core={level},ledgerline_migrate={level},ledgerline_cli={level},sqlx=warn",
        level = level
    )
}

fn env_field(env: &str) -> serde_json::Map<String, Value> {
    let mut fields = serde_json::Map::new();
    fields.insert("env".to_string(), json!(env));
    fields
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.filter_directives()))?;

    let layer = Layer::new()
        .with_writer(io::stderr)
        .with_target(config.include_target)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .try_init()?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(layer.pretty())
            .try_init()?,
        LogFormat::Plain => tracing_subscriber::registry()
            .with(filter)
            .with(layer.with_ansi(false))
            .try_init()?,
    }

    let fields = Value::Object(config.global_fields);
    tracing::debug!(
        target: "ledgerline::logging",
        level = %config.level,
        format = %config.format,
        fields = %fields,
        "logging initialized"
    );

    Ok(())
}
