//! Migration Ledger - SQL for the tracking table
//!
//! The ledger's own schema evolves through [`LEDGER_UPGRADES`], an ordered
//! list of idempotent steps. Applied step versions are stored in the
//! companion `<table>_schema` table, so a ledger is brought up to date by
//! running every step above the highest recorded version.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{MigrationError, MigrationResult};

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,52}$").expect("identifier pattern is valid"));

/// One step of the ledger's own schema history
#[derive(Clone, Copy)]
pub struct LedgerUpgrade {
    pub version: i32,
    pub description: &'static str,
    sql: fn(&str) -> String,
}

impl LedgerUpgrade {
    /// SQL of this step for the given ledger table
    pub fn sql(&self, table: &str) -> String {
        (self.sql)(table)
    }
}

impl std::fmt::Debug for LedgerUpgrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerUpgrade")
            .field("version", &self.version)
            .field("description", &self.description)
            .finish()
    }
}

pub const LEDGER_UPGRADES: &[LedgerUpgrade] = &[
    LedgerUpgrade {
        version: 1,
        description: "create ledger table",
        sql: create_table_sql,
    },
    LedgerUpgrade {
        version: 2,
        description: "add batch column",
        sql: add_batch_column_sql,
    },
    LedgerUpgrade {
        version: 3,
        description: "add executed_at column",
        sql: add_executed_at_column_sql,
    },
    LedgerUpgrade {
        version: 4,
        description: "index batch and executed_at",
        sql: create_batch_index_sql,
    },
];

/// Version a fully upgraded ledger is at
pub fn latest_ledger_version() -> i32 {
    LEDGER_UPGRADES.last().map_or(0, |step| step.version)
}

fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    \
            id BIGSERIAL PRIMARY KEY,\n    \
            name VARCHAR(255) NOT NULL UNIQUE\n\
        )",
        table
    )
}

fn add_batch_column_sql(table: &str) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN IF NOT EXISTS batch INTEGER NOT NULL DEFAULT 1",
        table
    )
}

fn add_executed_at_column_sql(table: &str) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN IF NOT EXISTS executed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()",
        table
    )
}

fn create_batch_index_sql(table: &str) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {}_batch_idx ON {} (batch, executed_at)",
        table, table
    )
}

/// The ledger table and the statements that read and write it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationLedger {
    table: String,
}

impl MigrationLedger {
    /// Create a ledger for `table`, which must be a plain SQL identifier.
    ///
    /// At most 53 characters, so `<table>_batch_idx` stays within the
    /// 63-byte identifier limit.
    pub fn new(table: impl Into<String>) -> MigrationResult<Self> {
        let table = table.into();
        if !IDENTIFIER.is_match(&table) {
            return Err(MigrationError::InvalidLedgerTable { table });
        }
        Ok(Self { table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Companion table recording applied ledger upgrade steps
    pub fn schema_table(&self) -> String {
        format!("{}_schema", self.table)
    }

    /// Steps that still have to run when the ledger is at `current_version`
    pub fn pending_upgrades(&self, current_version: i32) -> Vec<LedgerUpgrade> {
        LEDGER_UPGRADES
            .iter()
            .filter(|step| step.version > current_version)
            .copied()
            .collect()
    }

    pub fn create_schema_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                version INTEGER PRIMARY KEY,\n    \
                description VARCHAR(255) NOT NULL,\n    \
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()\n\
            )",
            self.schema_table()
        )
    }

    /// True when the companion table exists; takes the table name as `$1`
    pub fn schema_table_exists_sql(&self) -> &'static str {
        "SELECT to_regclass($1) IS NOT NULL"
    }

    pub fn schema_version_sql(&self) -> String {
        format!("SELECT MAX(version) FROM {}", self.schema_table())
    }

    pub fn record_schema_version_sql(&self) -> String {
        format!(
            "INSERT INTO {} (version, description, applied_at) VALUES ($1, $2, $3)",
            self.schema_table()
        )
    }

    pub fn list_executed_sql(&self) -> String {
        format!(
            "SELECT id, name, batch, executed_at FROM {} ORDER BY executed_at ASC, id ASC",
            self.table
        )
    }

    pub fn latest_batch_sql(&self) -> String {
        format!("SELECT MAX(batch) FROM {}", self.table)
    }

    pub fn batch_records_sql(&self) -> String {
        format!(
            "SELECT id, name, batch, executed_at FROM {} WHERE batch = $1 ORDER BY executed_at DESC, id DESC",
            self.table
        )
    }

    pub fn insert_record_sql(&self) -> String {
        format!(
            "INSERT INTO {} (name, batch, executed_at) VALUES ($1, $2, $3) RETURNING id, executed_at",
            self.table
        )
    }

    pub fn delete_record_sql(&self) -> String {
        format!("DELETE FROM {} WHERE name = $1", self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_identifier_tables() {
        for table in ["", "1migrations", "migrations; DROP TABLE users", "schema.migrations", "mi-grations"] {
            assert!(
                matches!(MigrationLedger::new(table), Err(MigrationError::InvalidLedgerTable { .. })),
                "{} should be rejected",
                table
            );
        }
        assert!(MigrationLedger::new("_ledger_2024").is_ok());
    }

    #[test]
    fn test_derived_identifiers_fit_postgres_limit() {
        assert!(MigrationLedger::new("t".repeat(54)).is_err());

        let ledger = MigrationLedger::new("t".repeat(53)).unwrap();
        assert!(ledger.schema_table().len() <= 63);
        let index_sql = create_batch_index_sql(ledger.table());
        let index_name = index_sql.split_whitespace().nth(5).unwrap();
        assert!(index_name.ends_with("_batch_idx"));
        assert!(index_name.len() <= 63, "{} is {} bytes", index_name, index_name.len());
    }

    #[test]
    fn test_upgrade_steps_are_ordered_and_idempotent() {
        let versions: Vec<i32> = LEDGER_UPGRADES.iter().map(|s| s.version).collect();
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(versions, sorted);

        for step in LEDGER_UPGRADES {
            assert!(step.sql("migrations").contains("IF NOT EXISTS"), "{}", step.description);
        }
    }

    #[test]
    fn test_pending_upgrades_from_version() {
        let ledger = MigrationLedger::new("migrations").unwrap();

        assert_eq!(ledger.pending_upgrades(0).len(), LEDGER_UPGRADES.len());
        let from_two: Vec<i32> = ledger.pending_upgrades(2).iter().map(|s| s.version).collect();
        assert_eq!(from_two, vec![3, 4]);
        assert!(ledger.pending_upgrades(LEDGER_UPGRADES.len() as i32).is_empty());
        assert!(ledger.pending_upgrades(latest_ledger_version()).is_empty());
        assert_eq!(ledger.pending_upgrades(latest_ledger_version() - 1).len(), 1);
    }

    #[test]
    fn test_ledger_sql_generation() {
        let ledger = MigrationLedger::new("migrations").unwrap();

        let create_sql = LEDGER_UPGRADES[0].sql(ledger.table());
        assert!(create_sql.contains("CREATE TABLE IF NOT EXISTS migrations"));
        assert!(create_sql.contains("name VARCHAR(255) NOT NULL UNIQUE"));

        assert!(ledger.list_executed_sql().ends_with("ORDER BY executed_at ASC, id ASC"));
        assert!(ledger.batch_records_sql().contains("WHERE batch = $1 ORDER BY executed_at DESC, id DESC"));
        assert!(ledger.insert_record_sql().starts_with("INSERT INTO migrations (name, batch, executed_at)"));
        assert_eq!(ledger.delete_record_sql(), "DELETE FROM migrations WHERE name = $1");
        assert_eq!(ledger.latest_batch_sql(), "SELECT MAX(batch) FROM migrations");
        assert!(ledger.create_schema_table_sql().contains("CREATE TABLE IF NOT EXISTS migrations_schema"));
    }
}
