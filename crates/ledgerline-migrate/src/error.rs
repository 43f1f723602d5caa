//! Error types for the migration engine
//!
//! Every fatal error names the migration and the phase that failed so a
//! caller can report the exact point of failure.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Stage of the engine an error was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    /// Executing UP statements
    Apply,
    /// Executing DOWN statements
    Rollback,
    /// Reading or upgrading the tracking table
    Ledger,
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationPhase::Apply => write!(f, "apply"),
            MigrationPhase::Rollback => write!(f, "rollback"),
            MigrationPhase::Ledger => write!(f, "ledger"),
        }
    }
}

/// Error types for migration operations
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A file lacks the section marker, has a bad name, or cannot be read
    #[error("Malformed migration file {}: {reason}", path.display())]
    MalformedMigrationFile { path: PathBuf, reason: String },

    /// An applied migration has no source file left on disk
    #[error("Migration file not found for applied migration: {name}")]
    MigrationFileNotFound { name: String },

    /// The UP or DOWN SQL of a migration failed
    #[error("{phase} failed for migration {name}: {source}")]
    SqlExecution {
        name: String,
        phase: MigrationPhase,
        #[source]
        source: sqlx::Error,
    },

    /// Opening or committing the transaction around a migration failed
    #[error("Transaction failed during {phase} of {name}: {source}")]
    Transaction {
        name: String,
        phase: MigrationPhase,
        #[source]
        source: sqlx::Error,
    },

    /// Reading or writing the tracking table failed
    #[error("Ledger error while trying to {operation}: {source}")]
    Ledger {
        operation: String,
        #[source]
        source: sqlx::Error,
    },

    /// Inserting or deleting the ledger row of one migration failed
    #[error("Ledger record write failed during {phase} of {name}: {source}")]
    LedgerRecord {
        name: String,
        phase: MigrationPhase,
        #[source]
        source: sqlx::Error,
    },

    /// The database could not be reached
    #[error("Failed to connect to database: {0}")]
    Connection(#[source] sqlx::Error),

    /// A name given to the generator is not usable as a migration slug
    #[error("Invalid migration name '{name}': {reason}")]
    InvalidMigrationName { name: String, reason: String },

    /// The generator would overwrite an existing file
    #[error("Migration file already exists: {}", path.display())]
    MigrationExists { path: PathBuf },

    /// Filesystem error outside of parsing a single file
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configured ledger table is not a plain SQL identifier
    #[error("Invalid ledger table name '{table}'")]
    InvalidLedgerTable { table: String },

    /// Another process kept the migration lock for the whole timeout
    #[error("Timed out after {waited:?} waiting for the migration lock")]
    LockTimeout { waited: Duration },

    /// Acquiring or releasing the migration lock failed
    #[error("Migration lock error: {source}")]
    Lock {
        #[source]
        source: sqlx::Error,
    },
}

impl MigrationError {
    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        MigrationError::MalformedMigrationFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn ledger(operation: impl Into<String>, source: sqlx::Error) -> Self {
        MigrationError::Ledger {
            operation: operation.into(),
            source,
        }
    }

    /// Name of the migration the error is about, if any
    pub fn migration_name(&self) -> Option<&str> {
        match self {
            MigrationError::MigrationFileNotFound { name }
            | MigrationError::SqlExecution { name, .. }
            | MigrationError::Transaction { name, .. }
            | MigrationError::LedgerRecord { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Phase the error was raised in, if it is tied to one
    pub fn phase(&self) -> Option<MigrationPhase> {
        match self {
            MigrationError::SqlExecution { phase, .. }
            | MigrationError::Transaction { phase, .. }
            | MigrationError::LedgerRecord { phase, .. } => Some(*phase),
            MigrationError::MigrationFileNotFound { .. } => Some(MigrationPhase::Rollback),
            MigrationError::Ledger { .. } => Some(MigrationPhase::Ledger),
            _ => None,
        }
    }
}
