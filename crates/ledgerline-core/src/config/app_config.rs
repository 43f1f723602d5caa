use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use super::{ConfigError, ConfigResult, ConfigSource};

/// Environment variable naming an explicit configuration file
pub const CONFIG_FILE_ENV: &str = "LEDGERLINE_CONFIG";

/// Configuration file picked up from the working directory when present
pub const DEFAULT_CONFIG_FILE: &str = "ledgerline.yaml";

const VALID_LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Environment enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Testing,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testing" | "test" => Ok(Environment::Testing),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::invalid(
                "environment",
                s,
                "development, testing, or production",
            )),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_str = match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Production => "production",
        };
        write!(f, "{}", env_str)
    }
}

impl Environment {
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }

    pub fn is_testing(&self) -> bool {
        matches!(self, Environment::Testing)
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
    Plain,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "plain" | "text" => Ok(LogFormat::Plain),
            _ => Err(ConfigError::invalid("log_format", s, "pretty, json, or plain")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
            LogFormat::Plain => write!(f, "plain"),
        }
    }
}

/// Shape of `ledgerline.yaml`
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    environment: Option<String>,
    database_url: Option<String>,
    migrations_dir: Option<PathBuf>,
    migrations_table: Option<String>,
    lock_timeout_secs: Option<u64>,
    log_level: Option<String>,
    log_format: Option<String>,
}

/// Application configuration.
///
/// Precedence: environment variables, then the YAML file, then defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub database_url: Option<String>,
    pub migrations_dir: PathBuf,
    pub migrations_table: String,
    pub lock_timeout: Duration,
    pub log_level: String,
    pub log_format: LogFormat,
    sources: HashMap<String, ConfigSource>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let sources = [
            ("environment", "development"),
            ("database_url", "none"),
            ("migrations_dir", "database/migrations"),
            ("migrations_table", "migrations"),
            ("lock_timeout", "60 seconds"),
            ("log_level", "info"),
            ("log_format", "pretty"),
        ]
        .into_iter()
        .map(|(field, value)| (field.to_string(), ConfigSource::Default(value.to_string())))
        .collect();

        Self {
            environment: Environment::Development,
            database_url: None,
            migrations_dir: PathBuf::from("database/migrations"),
            migrations_table: "migrations".to_string(),
            lock_timeout: Duration::from_secs(60),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            sources,
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment and optional YAML file
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration with `lookup` standing in for the environment
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        let file = match lookup(CONFIG_FILE_ENV) {
            Some(path) => Some(PathBuf::from(path)),
            None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|path| path.is_file()),
        };
        if let Some(path) = file {
            config.apply_file(&path)?;
        }

        config.apply_env(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> ConfigResult<()> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: FileConfig = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let origin = ConfigSource::File(path.display().to_string());

        if let Some(environment) = file.environment {
            self.environment = environment.parse()?;
            self.set_source("environment", origin.clone());
        }
        if let Some(url) = file.database_url {
            self.database_url = Some(url);
            self.set_source("database_url", origin.clone());
        }
        if let Some(dir) = file.migrations_dir {
            self.migrations_dir = dir;
            self.set_source("migrations_dir", origin.clone());
        }
        if let Some(table) = file.migrations_table {
            self.migrations_table = table;
            self.set_source("migrations_table", origin.clone());
        }
        if let Some(secs) = file.lock_timeout_secs {
            self.lock_timeout = Duration::from_secs(secs);
            self.set_source("lock_timeout", origin.clone());
        }
        if let Some(level) = file.log_level {
            self.log_level = level.to_lowercase();
            self.set_source("log_level", origin.clone());
        }
        if let Some(format) = file.log_format {
            self.log_format = format.parse()?;
            self.set_source("log_format", origin);
        }

        Ok(())
    }

    fn apply_env<F>(&mut self, lookup: &F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(env_str) = lookup("APP_ENV") {
            self.environment = env_str.parse()?;
            self.set_source("environment", ConfigSource::EnvVar("APP_ENV".to_string()));
        }

        if let Some(url) = lookup("DATABASE_URL") {
            self.database_url = Some(url);
            self.set_source("database_url", ConfigSource::EnvVar("DATABASE_URL".to_string()));
        }

        if let Some(dir) = lookup("MIGRATIONS_DIR") {
            self.migrations_dir = PathBuf::from(dir);
            self.set_source("migrations_dir", ConfigSource::EnvVar("MIGRATIONS_DIR".to_string()));
        }

        if let Some(table) = lookup("MIGRATIONS_TABLE") {
            self.migrations_table = table;
            self.set_source("migrations_table", ConfigSource::EnvVar("MIGRATIONS_TABLE".to_string()));
        }

        if let Some(secs_str) = lookup("MIGRATION_LOCK_TIMEOUT_SECS") {
            let secs: u64 = secs_str.trim().parse().map_err(|_| {
                ConfigError::invalid("lock_timeout", secs_str.as_str(), "whole number of seconds")
            })?;
            self.lock_timeout = Duration::from_secs(secs);
            self.set_source(
                "lock_timeout",
                ConfigSource::EnvVar("MIGRATION_LOCK_TIMEOUT_SECS".to_string()),
            );
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            self.log_level = level.to_lowercase();
            self.set_source("log_level", ConfigSource::EnvVar("LOG_LEVEL".to_string()));
        }

        if let Some(format) = lookup("LOG_FORMAT") {
            self.log_format = format.parse()?;
            self.set_source("log_format", ConfigSource::EnvVar("LOG_FORMAT".to_string()));
        }

        Ok(())
    }

    fn set_source(&mut self, field: &str, source: ConfigSource) {
        self.sources.insert(field.to_string(), source);
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::invalid(
                "log_level",
                self.log_level.as_str(),
                format!("one of: {}", VALID_LOG_LEVELS.join(", ")),
            ));
        }

        if self.migrations_dir.as_os_str().is_empty() {
            return Err(ConfigError::invalid("migrations_dir", "", "a directory path"));
        }

        if self.migrations_table.trim().is_empty() {
            return Err(ConfigError::invalid("migrations_table", "", "a table name"));
        }

        if self.lock_timeout.is_zero() {
            return Err(ConfigError::invalid("lock_timeout", "0", "at least one second"));
        }

        if let Some(database_url) = &self.database_url {
            // Only the scheme is echoed back; the URL may carry credentials.
            match url::Url::parse(database_url) {
                Ok(parsed) if matches!(parsed.scheme(), "postgres" | "postgresql") => {}
                Ok(parsed) => {
                    return Err(ConfigError::invalid(
                        "database_url",
                        format!("{}://...", parsed.scheme()),
                        "a postgres:// or postgresql:// URL",
                    ))
                }
                Err(_) => {
                    return Err(ConfigError::invalid(
                        "database_url",
                        "<unparseable>",
                        "a postgres:// or postgresql:// URL",
                    ))
                }
            }
        }

        Ok(())
    }

    /// The database URL, or an error telling the user how to set it
    pub fn require_database_url(&self) -> ConfigResult<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingRequired {
                field: "database_url".to_string(),
                hint: format!(
                    "Set the DATABASE_URL environment variable or `database_url` in {}",
                    DEFAULT_CONFIG_FILE
                ),
            })
    }

    /// Where each field's value came from
    pub fn config_sources(&self) -> &HashMap<String, ConfigSource> {
        &self.sources
    }

    pub fn source(&self, field: &str) -> Option<&ConfigSource> {
        self.sources.get(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn yaml_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = AppConfig::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.database_url, None);
        assert_eq!(config.migrations_dir, PathBuf::from("database/migrations"));
        assert_eq!(config.migrations_table, "migrations");
        assert_eq!(config.lock_timeout, Duration::from_secs(60));
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.source("migrations_dir").unwrap().is_default());
    }

    #[test]
    fn test_environment_variables_override_defaults() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("APP_ENV", "prod"),
            ("DATABASE_URL", "postgres://app:secret@db/app"),
            ("MIGRATIONS_DIR", "sql/migrations"),
            ("MIGRATIONS_TABLE", "schema_ledger"),
            ("MIGRATION_LOCK_TIMEOUT_SECS", "5"),
            ("LOG_LEVEL", "DEBUG"),
            ("LOG_FORMAT", "json"),
        ]))
        .unwrap();

        assert!(config.environment.is_production());
        assert_eq!(config.require_database_url().unwrap(), "postgres://app:secret@db/app");
        assert_eq!(config.migrations_dir, PathBuf::from("sql/migrations"));
        assert_eq!(config.migrations_table, "schema_ledger");
        assert_eq!(config.lock_timeout, Duration::from_secs(5));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.source("migrations_table"),
            Some(&ConfigSource::EnvVar("MIGRATIONS_TABLE".to_string()))
        );
    }

    #[test]
    fn test_yaml_file_overlay_loses_to_environment() {
        let file = yaml_file(
            "environment: testing\n\
             migrations_dir: from_file/migrations\n\
             migrations_table: file_ledger\n\
             lock_timeout_secs: 15\n",
        );
        let path = file.path().to_str().unwrap().to_string();

        let config = AppConfig::from_lookup(lookup_from(&[
            (CONFIG_FILE_ENV, path.as_str()),
            ("MIGRATIONS_TABLE", "env_ledger"),
        ]))
        .unwrap();

        assert!(config.environment.is_testing());
        assert_eq!(config.migrations_dir, PathBuf::from("from_file/migrations"));
        assert_eq!(config.migrations_table, "env_ledger");
        assert_eq!(config.lock_timeout, Duration::from_secs(15));
        assert!(config.source("migrations_dir").unwrap().is_file());
        assert!(config.source("migrations_table").unwrap().is_env_var());
        assert!(config.source("log_level").unwrap().is_default());
    }

    #[test]
    fn test_yaml_file_rejects_unknown_keys() {
        let file = yaml_file("migration_dir: typo\n");
        let path = file.path().to_str().unwrap().to_string();

        let err = AppConfig::from_lookup(lookup_from(&[(CONFIG_FILE_ENV, path.as_str())])).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_explicit_config_file_must_exist() {
        let err = AppConfig::from_lookup(lookup_from(&[(CONFIG_FILE_ENV, "/nonexistent/ledgerline.yaml")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let cases: &[(&str, &str, &str)] = &[
            ("APP_ENV", "staging", "environment"),
            ("LOG_LEVEL", "verbose", "log_level"),
            ("LOG_FORMAT", "xml", "log_format"),
            ("MIGRATION_LOCK_TIMEOUT_SECS", "soon", "lock_timeout"),
            ("MIGRATION_LOCK_TIMEOUT_SECS", "0", "lock_timeout"),
            ("DATABASE_URL", "mysql://localhost/app", "database_url"),
            ("DATABASE_URL", "not a url", "database_url"),
        ];

        for (key, value, expected_field) in cases {
            match AppConfig::from_lookup(lookup_from(&[(*key, *value)])) {
                Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(&field, expected_field),
                other => panic!("{}={} should be rejected, got {:?}", key, value, other),
            }
        }
    }

    #[test]
    fn test_database_url_error_hides_credentials() {
        let err = AppConfig::from_lookup(lookup_from(&[("DATABASE_URL", "mysql://root:hunter2@db/app")]))
            .unwrap_err();
        assert!(!err.to_string().contains("hunter2"));
    }

    #[test]
    fn test_missing_database_url() {
        let config = AppConfig::default();
        assert!(matches!(
            config.require_database_url(),
            Err(ConfigError::MissingRequired { .. })
        ));
    }

    #[test]
    fn test_blank_variables_are_ignored() {
        let config = AppConfig::from_lookup(lookup_from(&[("MIGRATIONS_TABLE", "  ")])).unwrap();
        assert_eq!(config.migrations_table, "migrations");
    }

    #[test]
    #[serial]
    fn test_from_env_reads_process_environment() {
        env::set_var("MIGRATIONS_DIR", "env/migrations");
        env::set_var("LOG_FORMAT", "plain");

        let config = AppConfig::from_env();

        env::remove_var("MIGRATIONS_DIR");
        env::remove_var("LOG_FORMAT");

        let config = config.unwrap();
        assert_eq!(config.migrations_dir, PathBuf::from("env/migrations"));
        assert_eq!(config.log_format, LogFormat::Plain);
    }
}
