//! # ledgerline-migrate: batch-tracked SQL migrations
//!
//! Applies timestamp-ordered `.sql` files to a relational database, records
//! each applied file in a ledger table together with the batch it belonged
//! to, and rolls back the most recent batch on request.
//!
//! The engine is split into a filesystem side (parser, loader, generator)
//! and a database side reached only through [`MigrationBackend`], with
//! [`PostgresBackend`] as the production implementation.

pub mod backends;
pub mod error;
pub mod migrations;

#[cfg(test)]
mod tests;

pub use backends::{MigrationBackend, PostgresAdvisoryLock, PostgresBackend};
pub use error::*;
pub use migrations::*;
