//! Migration Definitions - Core types and structures for migrations
//!
//! Defines the file format constants and the fundamental types used
//! throughout the migration system: MigrationFile, MigrationRecord,
//! MigrationConfig and the operation results.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Optional header line that opens the UP section
pub const UP_HEADER: &str = "-- Up migration";

/// Line separating the UP section from the DOWN section
pub const DOWN_MARKER: &str = "-- Down migration";

/// Extension of migration files
pub const MIGRATION_EXTENSION: &str = "sql";

/// chrono format of the 14-digit name prefix
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// A migration as found on disk. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationFile {
    /// File stem, `<14-digit timestamp>_<slug>`
    pub name: String,
    /// Where the file was read from
    pub path: PathBuf,
    /// SQL applied by `run`
    pub up_sql: String,
    /// SQL applied by rollback
    pub down_sql: String,
}

impl MigrationFile {
    /// The 14-digit timestamp prefix of the name
    pub fn timestamp(&self) -> &str {
        self.name.get(..14).unwrap_or(&self.name)
    }

    /// Authoring time encoded in the name
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(self.timestamp(), TIMESTAMP_FORMAT)
            .ok()
            .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, MIGRATION_EXTENSION)
    }

    /// Path a migration with `name` has inside `dir`
    pub fn path_in(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{}.{}", name, MIGRATION_EXTENSION))
    }
}

/// One row of the ledger: a migration that has been applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Surrogate key assigned by the ledger
    pub id: i64,
    /// Migration name, unique in the ledger
    pub name: String,
    /// Batch the migration was applied in
    pub batch: i32,
    /// When the migration was applied
    pub executed_at: DateTime<Utc>,
}

/// Configuration for the migration system
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Directory where migration files are stored
    pub migrations_dir: PathBuf,
    /// Table name for tracking migrations
    pub migrations_table: String,
    /// How long mutating operations wait for the migration lock
    pub lock_timeout: Duration,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("database/migrations"),
            migrations_table: "migrations".to_string(),
            lock_timeout: Duration::from_secs(60),
        }
    }
}

impl MigrationConfig {
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.migrations_table = table.into();
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

/// Result of running migrations
#[derive(Debug, Clone, Default)]
pub struct MigrationRunResult {
    /// Batch the migrations were recorded under, `None` when nothing was pending
    pub batch: Option<i32>,
    /// Names of the migrations that were applied, in order
    pub applied: Vec<String>,
    /// Number of migrations that were already applied
    pub skipped_count: usize,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl MigrationRunResult {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }
}

impl fmt::Display for MigrationRunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.batch {
            None => write!(f, "No pending migrations."),
            Some(batch) => {
                writeln!(
                    f,
                    "Applied {} migration(s) in batch {} ({} ms):",
                    self.applied.len(),
                    batch,
                    self.execution_time_ms
                )?;
                for name in &self.applied {
                    writeln!(f, "  ✅ {}", name)?;
                }
                Ok(())
            }
        }
    }
}

/// Result of rolling back migrations
#[derive(Debug, Clone, Default)]
pub struct RollbackResult {
    /// Batch that was rolled back, `None` for an empty ledger or a multi-batch rollback
    pub batch: Option<i32>,
    /// Names of the migrations that were rolled back, in rollback order
    pub rolled_back: Vec<String>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl RollbackResult {
    pub fn rolled_back_count(&self) -> usize {
        self.rolled_back.len()
    }
}

impl fmt::Display for RollbackResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rolled_back.is_empty() {
            return write!(f, "Nothing to roll back.");
        }

        match self.batch {
            Some(batch) => writeln!(
                f,
                "Rolled back {} migration(s) from batch {} ({} ms):",
                self.rolled_back.len(),
                batch,
                self.execution_time_ms
            )?,
            None => writeln!(
                f,
                "Rolled back {} migration(s) ({} ms):",
                self.rolled_back.len(),
                self.execution_time_ms
            )?,
        }
        for name in &self.rolled_back {
            writeln!(f, "  ↩️  {}", name)?;
        }
        Ok(())
    }
}

/// True when `sql` holds nothing but blank lines and `--` comments
pub fn sql_is_empty(sql: &str) -> bool {
    sql.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_created_at_from_name() {
        let file = MigrationFile {
            name: "20240315093045_create_users".to_string(),
            path: PathBuf::from("20240315093045_create_users.sql"),
            up_sql: String::new(),
            down_sql: String::new(),
        };

        let created = file.created_at().unwrap();
        assert_eq!((created.year(), created.month(), created.day()), (2024, 3, 15));
        assert_eq!((created.hour(), created.minute(), created.second()), (9, 30, 45));
        assert_eq!(file.timestamp(), "20240315093045");
        assert_eq!(file.file_name(), "20240315093045_create_users.sql");
    }

    #[test]
    fn test_sql_is_empty() {
        assert!(sql_is_empty(""));
        assert!(sql_is_empty("  \n-- just a note\n   -- another\n"));
        assert!(!sql_is_empty("-- note\nCREATE TABLE t (id INT);"));
    }

    #[test]
    fn test_result_display_for_empty_cases() {
        assert_eq!(MigrationRunResult::default().to_string(), "No pending migrations.");
        assert_eq!(RollbackResult::default().to_string(), "Nothing to roll back.");
    }

    #[test]
    fn test_run_result_display_lists_migrations() {
        let result = MigrationRunResult {
            batch: Some(3),
            applied: vec!["20240101000000_a".to_string(), "20240102000000_b".to_string()],
            skipped_count: 4,
            execution_time_ms: 12,
        };

        let text = result.to_string();
        assert!(text.starts_with("Applied 2 migration(s) in batch 3"));
        assert!(text.find("20240101000000_a").unwrap() < text.find("20240102000000_b").unwrap());
    }

    #[test]
    fn test_config_builder() {
        let config = MigrationConfig::new("db/migrations")
            .with_table("schema_ledger")
            .with_lock_timeout(Duration::from_secs(5));

        assert_eq!(config.migrations_dir, PathBuf::from("db/migrations"));
        assert_eq!(config.migrations_table, "schema_ledger");
        assert_eq!(config.lock_timeout, Duration::from_secs(5));
    }
}
