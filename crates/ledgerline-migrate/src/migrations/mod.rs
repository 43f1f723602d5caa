//! Migration System
//!
//! Filesystem side: [`parser`], [`loader`] and [`generator`].
//! Database side: [`ledger`] (tracking table SQL), [`lock`], and the
//! [`runner`] / [`rollback`] / [`status`] operations built on a backend.

pub mod definitions;
pub mod generator;
pub mod ledger;
pub mod loader;
pub mod lock;
pub mod parser;
pub mod rollback;
pub mod runner;
pub mod status;

pub use definitions::*;
pub use generator::{normalize_migration_name, validate_migration_name, GeneratedMigration, MigrationGenerator};
pub use ledger::{latest_ledger_version, LedgerUpgrade, MigrationLedger, LEDGER_UPGRADES};
pub use loader::MigrationLoader;
pub use lock::{advisory_lock_key, MigrationLock, LOCK_POLL_INTERVAL};
pub use parser::{parse_migration_file, split_sections};
pub use rollback::MigrationRollback;
pub use runner::{MigrationRunner, RefreshResult};
pub use status::MigrationStatusReport;
