//! Core Database Backend Trait
//!
//! Abstracts the ledger reads and the two transactional write paths
//! (apply and revert) so the runner's ordering and batching rules are
//! independent of the driver.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::MigrationResult;
use crate::migrations::definitions::{MigrationFile, MigrationRecord};
use crate::migrations::lock::MigrationLock;

/// Database side of the migration engine
#[async_trait]
pub trait MigrationBackend: Send + Sync {
    /// Create or upgrade the ledger table. Idempotent.
    async fn ensure_table(&self) -> MigrationResult<()>;

    /// Highest applied ledger upgrade step, 0 for a ledger never bootstrapped
    async fn ledger_version(&self) -> MigrationResult<i32>;

    /// All ledger records ordered by `executed_at` ascending
    async fn list_executed(&self) -> MigrationResult<Vec<MigrationRecord>>;

    /// Highest batch number in the ledger, `None` when it is empty
    async fn latest_batch(&self) -> MigrationResult<Option<i32>>;

    /// Batch number for the next run: latest + 1, or 1 for an empty ledger
    async fn next_batch_number(&self) -> MigrationResult<i32> {
        Ok(self.latest_batch().await?.map_or(1, |batch| batch + 1))
    }

    /// Records of one batch ordered by `executed_at` descending
    async fn batch_records(&self, batch: i32) -> MigrationResult<Vec<MigrationRecord>>;

    /// Execute the UP SQL and insert the ledger row in one transaction
    async fn apply(&self, migration: &MigrationFile, batch: i32) -> MigrationResult<MigrationRecord>;

    /// Execute the DOWN SQL and delete the ledger row in one transaction
    async fn revert(&self, record: &MigrationRecord, migration: &MigrationFile) -> MigrationResult<()>;

    /// Take the ledger-wide lock, waiting at most `timeout`
    async fn acquire_lock(&self, timeout: Duration) -> MigrationResult<Box<dyn MigrationLock>>;
}
