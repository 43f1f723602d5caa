//! Migration Runner - Executes migrations against the database
//!
//! Computes pending migrations, applies them in name order under a single
//! batch number, and serializes every mutating operation behind the
//! backend's migration lock.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::time::Instant;

use super::definitions::{MigrationConfig, MigrationFile, MigrationRunResult, RollbackResult};
use super::ledger::latest_ledger_version;
use super::loader::MigrationLoader;
use crate::backends::MigrationBackend;
use crate::error::MigrationResult;

/// Result of [`MigrationRunner::refresh`]
#[derive(Debug, Clone, Default)]
pub struct RefreshResult {
    pub rolled_back: RollbackResult,
    pub applied: MigrationRunResult,
}

impl fmt::Display for RefreshResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.rolled_back.to_string().trim_end())?;
        write!(f, "{}", self.applied)
    }
}

/// Migration runner that executes migrations against a database
pub struct MigrationRunner<B> {
    backend: B,
    loader: MigrationLoader,
    config: MigrationConfig,
}

impl<B: MigrationBackend> MigrationRunner<B> {
    /// Create a runner and bring the ledger table up to date.
    ///
    /// The lock is only taken when the ledger needs upgrading; `ensure_table`
    /// re-reads the version under it.
    pub async fn connect(backend: B, config: MigrationConfig) -> MigrationResult<Self> {
        let runner = Self {
            loader: MigrationLoader::new(config.migrations_dir.clone()),
            backend,
            config,
        };

        let current = runner.backend.ledger_version().await?;
        if current < latest_ledger_version() {
            tracing::debug!(current, latest = latest_ledger_version(), "ledger needs upgrading");
            runner
                .with_lock("bootstrap", || runner.backend.ensure_table())
                .await?;
        }

        Ok(runner)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn loader(&self) -> &MigrationLoader {
        &self.loader
    }

    /// Apply every pending migration in a new batch
    pub async fn run(&self) -> MigrationResult<MigrationRunResult> {
        self.with_lock("run", || self.run_pending()).await
    }

    /// Migrations on disk that have no ledger record, in apply order
    pub async fn pending(&self) -> MigrationResult<Vec<MigrationFile>> {
        let files = self.loader.load()?;
        let executed = self.backend.list_executed().await?;
        let executed_names: HashSet<&str> = executed.iter().map(|r| r.name.as_str()).collect();

        Ok(files
            .into_iter()
            .filter(|file| !executed_names.contains(file.name.as_str()))
            .collect())
    }

    /// Roll back every batch, then apply all migrations in one new batch
    pub async fn refresh(&self) -> MigrationResult<RefreshResult> {
        self.with_lock("refresh", || async move {
            let rolled_back = self.rollback_every_batch().await?;
            let applied = self.run_pending().await?;
            Ok(RefreshResult { rolled_back, applied })
        })
        .await
    }

    pub(crate) async fn run_pending(&self) -> MigrationResult<MigrationRunResult> {
        let start_time = Instant::now();

        let files = self.loader.load()?;
        let executed = self.backend.list_executed().await?;
        let executed_names: HashSet<&str> = executed.iter().map(|r| r.name.as_str()).collect();

        let pending: Vec<&MigrationFile> = files
            .iter()
            .filter(|file| !executed_names.contains(file.name.as_str()))
            .collect();
        let skipped_count = files.len() - pending.len();

        if pending.is_empty() {
            tracing::info!("no pending migrations");
            return Ok(MigrationRunResult {
                skipped_count,
                execution_time_ms: start_time.elapsed().as_millis(),
                ..MigrationRunResult::default()
            });
        }

        // Computed once, inside the lock, so concurrent runs cannot share it.
        let batch = self.backend.next_batch_number().await?;
        let mut applied = Vec::with_capacity(pending.len());

        for migration in pending {
            tracing::info!(migration = %migration.name, batch, "applying migration");

            if let Err(e) = self.backend.apply(migration, batch).await {
                tracing::error!(
                    migration = %migration.name,
                    batch,
                    applied = applied.len(),
                    error = %e,
                    "migration failed, aborting run"
                );
                return Err(e);
            }

            tracing::info!(migration = %migration.name, batch, "applied migration");
            applied.push(migration.name.clone());
        }

        Ok(MigrationRunResult {
            batch: Some(batch),
            applied,
            skipped_count,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }

    /// Run `operation` while holding the migration lock.
    ///
    /// The lock is released whether or not the operation succeeds. A failed
    /// release is logged; the operation's own outcome is returned.
    pub(crate) async fn with_lock<T, F, Fut>(&self, operation: &str, f: F) -> MigrationResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = MigrationResult<T>>,
    {
        let lock = self.backend.acquire_lock(self.config.lock_timeout).await?;
        tracing::debug!(operation, table = %self.config.migrations_table, "acquired migration lock");

        let outcome = f().await;

        if let Err(e) = lock.release().await {
            tracing::warn!(operation, error = %e, "failed to release migration lock");
        } else {
            tracing::debug!(operation, "released migration lock");
        }

        outcome
    }
}
