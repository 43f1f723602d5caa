//! Migration Rollback - Handles rolling back applied migrations
//!
//! Rolls back whole batches, most recently applied migration first. DOWN SQL
//! is always re-read from disk at rollback time.

use std::time::Instant;

use async_trait::async_trait;

use super::definitions::RollbackResult;
use super::runner::MigrationRunner;
use crate::backends::MigrationBackend;
use crate::error::MigrationResult;

/// Extension trait for MigrationRunner to add rollback functionality
#[async_trait]
pub trait MigrationRollback {
    /// Rollback the last batch of migrations
    async fn rollback_last_batch(&self) -> MigrationResult<RollbackResult>;

    /// Rollback all applied migrations, one batch at a time
    async fn rollback_all(&self) -> MigrationResult<RollbackResult>;
}

#[async_trait]
impl<B: MigrationBackend> MigrationRollback for MigrationRunner<B> {
    async fn rollback_last_batch(&self) -> MigrationResult<RollbackResult> {
        self.with_lock("rollback", || self.rollback_latest_batch()).await
    }

    async fn rollback_all(&self) -> MigrationResult<RollbackResult> {
        self.with_lock("rollback all", || self.rollback_every_batch()).await
    }
}

impl<B: MigrationBackend> MigrationRunner<B> {
    pub(crate) async fn rollback_latest_batch(&self) -> MigrationResult<RollbackResult> {
        let start_time = Instant::now();

        let Some(batch) = self.backend().latest_batch().await? else {
            tracing::info!("nothing to roll back");
            return Ok(RollbackResult {
                execution_time_ms: start_time.elapsed().as_millis(),
                ..RollbackResult::default()
            });
        };

        let rolled_back = self.rollback_batch(batch).await?;

        Ok(RollbackResult {
            batch: Some(batch),
            rolled_back,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }

    pub(crate) async fn rollback_every_batch(&self) -> MigrationResult<RollbackResult> {
        let start_time = Instant::now();
        let mut rolled_back = Vec::new();

        while let Some(batch) = self.backend().latest_batch().await? {
            let names = self.rollback_batch(batch).await?;
            if names.is_empty() {
                tracing::warn!(batch, "latest batch has no records, stopping rollback");
                break;
            }
            rolled_back.extend(names);
        }

        if rolled_back.is_empty() {
            tracing::info!("nothing to roll back");
        }

        Ok(RollbackResult {
            batch: None,
            rolled_back,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }

    /// Revert every record of `batch`, newest first, stopping at the first failure
    async fn rollback_batch(&self, batch: i32) -> MigrationResult<Vec<String>> {
        let records = self.backend().batch_records(batch).await?;
        let mut rolled_back = Vec::with_capacity(records.len());

        for record in &records {
            let migration = match self.loader().find(&record.name) {
                Ok(migration) => migration,
                Err(e) => {
                    tracing::error!(migration = %record.name, batch, error = %e, "cannot load migration for rollback");
                    return Err(e);
                }
            };

            tracing::info!(migration = %record.name, batch, "rolling back migration");

            if let Err(e) = self.backend().revert(record, &migration).await {
                tracing::error!(
                    migration = %record.name,
                    batch,
                    rolled_back = rolled_back.len(),
                    error = %e,
                    "rollback failed, aborting"
                );
                return Err(e);
            }

            tracing::info!(migration = %record.name, batch, "rolled back migration");
            rolled_back.push(record.name.clone());
        }

        Ok(rolled_back)
    }
}
