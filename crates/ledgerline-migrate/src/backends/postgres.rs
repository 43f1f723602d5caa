//! PostgreSQL Backend Implementation
//!
//! Implements [`MigrationBackend`] over a sqlx `PgPool`. Migration bodies are
//! sent as unprepared scripts so a single file may hold several statements.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::{Executor, Postgres, Row, Transaction};

use super::core::MigrationBackend;
use crate::error::{MigrationError, MigrationPhase, MigrationResult};
use crate::migrations::definitions::{sql_is_empty, MigrationConfig, MigrationFile, MigrationRecord};
use crate::migrations::ledger::{LedgerUpgrade, MigrationLedger};
use crate::migrations::lock::{advisory_lock_key, MigrationLock, LOCK_POLL_INTERVAL};

/// PostgreSQL migration backend
pub struct PostgresBackend {
    pool: PgPool,
    ledger: MigrationLedger,
}

impl PostgresBackend {
    pub fn new(pool: PgPool, ledger: MigrationLedger) -> Self {
        Self { pool, ledger }
    }

    /// Open a pool for `database_url` using the ledger table from `config`
    pub async fn connect(database_url: &str, config: &MigrationConfig) -> MigrationResult<Self> {
        validate_database_url(database_url)?;
        let ledger = MigrationLedger::new(config.migrations_table.clone())?;

        // One connection holds the advisory lock while another runs migrations.
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await
            .map_err(MigrationError::Connection)?;

        Ok(Self::new(pool, ledger))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn ledger(&self) -> &MigrationLedger {
        &self.ledger
    }

    /// Close the underlying pool
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn run_upgrade(&self, step: &LedgerUpgrade) -> MigrationResult<()> {
        let step_name = format!("ledger upgrade {}", step.version);
        let operation = format!("apply ledger upgrade {} ({})", step.version, step.description);

        let mut tx = self.pool.begin().await.map_err(|source| MigrationError::Transaction {
            name: step_name.clone(),
            phase: MigrationPhase::Ledger,
            source,
        })?;

        let sql = step.sql(self.ledger.table());
        if let Err(e) = (&mut *tx).execute(sql.as_str()).await {
            rollback_quietly(tx, &step_name).await;
            return Err(MigrationError::ledger(operation, e));
        }

        let recorded = sqlx::query(&self.ledger.record_schema_version_sql())
            .bind(step.version)
            .bind(step.description)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await;
        if let Err(e) = recorded {
            rollback_quietly(tx, &step_name).await;
            return Err(MigrationError::ledger(operation, e));
        }

        tx.commit().await.map_err(|source| MigrationError::Transaction {
            name: step_name,
            phase: MigrationPhase::Ledger,
            source,
        })
    }
}

#[async_trait]
impl MigrationBackend for PostgresBackend {
    async fn ensure_table(&self) -> MigrationResult<()> {
        sqlx::query(&self.ledger.create_schema_table_sql())
            .execute(&self.pool)
            .await
            .map_err(|e| MigrationError::ledger("create the ledger schema table", e))?;

        let current = sqlx::query_scalar::<_, Option<i32>>(&self.ledger.schema_version_sql())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MigrationError::ledger("read the ledger schema version", e))?
            .unwrap_or(0);

        for step in self.ledger.pending_upgrades(current) {
            tracing::info!(
                table = self.ledger.table(),
                version = step.version,
                description = step.description,
                "upgrading migration ledger"
            );
            self.run_upgrade(&step).await?;
        }

        Ok(())
    }

    async fn ledger_version(&self) -> MigrationResult<i32> {
        let exists = sqlx::query_scalar::<_, bool>(self.ledger.schema_table_exists_sql())
            .bind(self.ledger.schema_table())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MigrationError::ledger("look up the ledger schema table", e))?;
        if !exists {
            return Ok(0);
        }

        let version = sqlx::query_scalar::<_, Option<i32>>(&self.ledger.schema_version_sql())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MigrationError::ledger("read the ledger schema version", e))?;
        Ok(version.unwrap_or(0))
    }

    async fn list_executed(&self) -> MigrationResult<Vec<MigrationRecord>> {
        let rows = sqlx::query(&self.ledger.list_executed_sql())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrationError::ledger("list executed migrations", e))?;

        rows.iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| MigrationError::ledger("decode executed migrations", e))
    }

    async fn latest_batch(&self) -> MigrationResult<Option<i32>> {
        sqlx::query_scalar::<_, Option<i32>>(&self.ledger.latest_batch_sql())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MigrationError::ledger("read the latest batch", e))
    }

    async fn batch_records(&self, batch: i32) -> MigrationResult<Vec<MigrationRecord>> {
        let rows = sqlx::query(&self.ledger.batch_records_sql())
            .bind(batch)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrationError::ledger(format!("list migrations of batch {}", batch), e))?;

        rows.iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| MigrationError::ledger(format!("decode migrations of batch {}", batch), e))
    }

    async fn apply(&self, migration: &MigrationFile, batch: i32) -> MigrationResult<MigrationRecord> {
        let phase = MigrationPhase::Apply;
        let mut tx = self.pool.begin().await.map_err(|source| MigrationError::Transaction {
            name: migration.name.clone(),
            phase,
            source,
        })?;

        if let Err(source) = execute_script(&mut tx, &migration.up_sql).await {
            rollback_quietly(tx, &migration.name).await;
            return Err(MigrationError::SqlExecution {
                name: migration.name.clone(),
                phase,
                source,
            });
        }

        let inserted = sqlx::query(&self.ledger.insert_record_sql())
            .bind(migration.name.as_str())
            .bind(batch)
            .bind(Utc::now())
            .fetch_one(&mut *tx)
            .await
            .and_then(|row| {
                let id: i64 = row.try_get("id")?;
                let executed_at: DateTime<Utc> = row.try_get("executed_at")?;
                Ok((id, executed_at))
            });

        let (id, executed_at) = match inserted {
            Ok(values) => values,
            Err(e) => {
                rollback_quietly(tx, &migration.name).await;
                return Err(MigrationError::LedgerRecord {
                    name: migration.name.clone(),
                    phase,
                    source: e,
                });
            }
        };

        tx.commit().await.map_err(|source| MigrationError::Transaction {
            name: migration.name.clone(),
            phase,
            source,
        })?;

        Ok(MigrationRecord {
            id,
            name: migration.name.clone(),
            batch,
            executed_at,
        })
    }

    async fn revert(&self, record: &MigrationRecord, migration: &MigrationFile) -> MigrationResult<()> {
        let phase = MigrationPhase::Rollback;
        let mut tx = self.pool.begin().await.map_err(|source| MigrationError::Transaction {
            name: record.name.clone(),
            phase,
            source,
        })?;

        if let Err(source) = execute_script(&mut tx, &migration.down_sql).await {
            rollback_quietly(tx, &record.name).await;
            return Err(MigrationError::SqlExecution {
                name: record.name.clone(),
                phase,
                source,
            });
        }

        let deleted = sqlx::query(&self.ledger.delete_record_sql())
            .bind(record.name.as_str())
            .execute(&mut *tx)
            .await
            .and_then(|result| match result.rows_affected() {
                0 => Err(sqlx::Error::RowNotFound),
                _ => Ok(()),
            });

        if let Err(e) = deleted {
            rollback_quietly(tx, &record.name).await;
            return Err(MigrationError::LedgerRecord {
                name: record.name.clone(),
                phase,
                source: e,
            });
        }

        tx.commit().await.map_err(|source| MigrationError::Transaction {
            name: record.name.clone(),
            phase,
            source,
        })
    }

    async fn acquire_lock(&self, timeout: Duration) -> MigrationResult<Box<dyn MigrationLock>> {
        let key = advisory_lock_key(self.ledger.table());
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|source| MigrationError::Lock { source })?;

        let started = Instant::now();
        loop {
            let acquired = sqlx::query_scalar::<_, bool>("SELECT pg_try_advisory_lock($1)")
                .bind(key)
                .fetch_one(&mut *conn)
                .await
                .map_err(|source| MigrationError::Lock { source })?;

            if acquired {
                return Ok(Box::new(PostgresAdvisoryLock {
                    conn: Some(conn),
                    key,
                }));
            }

            let waited = started.elapsed();
            if waited >= timeout {
                return Err(MigrationError::LockTimeout { waited });
            }

            tracing::debug!(key, ?waited, "migration lock is held by another session, waiting");
            tokio::time::sleep(LOCK_POLL_INTERVAL).await;
        }
    }
}

/// Session-level advisory lock pinned to one pooled connection.
///
/// If the lock cannot be released cleanly the connection is detached from
/// the pool and dropped, which ends the session and frees the lock.
pub struct PostgresAdvisoryLock {
    conn: Option<PoolConnection<Postgres>>,
    key: i64,
}

#[async_trait]
impl MigrationLock for PostgresAdvisoryLock {
    async fn release(self: Box<Self>) -> MigrationResult<()> {
        let mut this = self;
        let key = this.key;
        let Some(mut conn) = this.conn.take() else {
            return Ok(());
        };

        let unlocked = sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock($1)")
            .bind(key)
            .fetch_one(&mut *conn)
            .await;

        match unlocked {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::warn!(key, "advisory lock was not held at release, closing its session");
                drop(conn.detach());
                Ok(())
            }
            Err(source) => {
                drop(conn.detach());
                Err(MigrationError::Lock { source })
            }
        }
    }
}

impl Drop for PostgresAdvisoryLock {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!(key = self.key, "migration lock dropped without release, closing its session");
            drop(conn.detach());
        }
    }
}

/// Accept only `postgres://` and `postgresql://` URLs
pub fn validate_database_url(database_url: &str) -> MigrationResult<()> {
    let parsed = url::Url::parse(database_url)
        .map_err(|e| MigrationError::Connection(sqlx::Error::Configuration(Box::new(e))))?;

    match parsed.scheme() {
        "postgres" | "postgresql" => Ok(()),
        other => Err(MigrationError::Connection(sqlx::Error::Configuration(
            format!("unsupported database scheme '{}', expected postgres", other).into(),
        ))),
    }
}

async fn execute_script(conn: &mut PgConnection, sql: &str) -> Result<(), sqlx::Error> {
    if sql_is_empty(sql) {
        return Ok(());
    }
    conn.execute(sql).await?;
    Ok(())
}

async fn rollback_quietly(tx: Transaction<'_, Postgres>, name: &str) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(migration = name, error = %e, "transaction rollback failed");
    }
}

fn record_from_row(row: &PgRow) -> Result<MigrationRecord, sqlx::Error> {
    Ok(MigrationRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        batch: row.try_get("batch")?,
        executed_at: row.try_get("executed_at")?,
    })
}
