//! Database Backend Abstractions
//!
//! The migration runner only talks to the database through
//! [`MigrationBackend`]. PostgreSQL is the supported dialect.

pub mod core;
pub mod postgres;

pub use self::core::*;
pub use self::postgres::{PostgresAdvisoryLock, PostgresBackend};
