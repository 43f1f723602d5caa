//! Migration status report
//!
//! A read-only view of the ledger against the migrations directory. Building
//! it never takes the migration lock and never writes.

use std::collections::HashSet;
use std::fmt;

use super::definitions::{MigrationFile, MigrationRecord};
use super::runner::MigrationRunner;
use crate::backends::MigrationBackend;
use crate::error::MigrationResult;

/// Executed and pending migrations at one point in time
#[derive(Debug, Clone, Default)]
pub struct MigrationStatusReport {
    /// Ledger records, oldest first
    pub executed: Vec<MigrationRecord>,
    /// Well-formed files without a ledger record, in apply order
    pub pending: Vec<MigrationFile>,
    /// Executed migrations whose file is gone from disk
    pub missing: Vec<String>,
}

impl MigrationStatusReport {
    pub fn new(files: Vec<MigrationFile>, executed: Vec<MigrationRecord>) -> Self {
        let executed_names: HashSet<&str> = executed.iter().map(|r| r.name.as_str()).collect();
        let file_names: HashSet<&str> = files.iter().map(|f| f.name.as_str()).collect();

        let missing = executed
            .iter()
            .filter(|record| !file_names.contains(record.name.as_str()))
            .map(|record| record.name.clone())
            .collect();

        let pending = files
            .iter()
            .filter(|file| !executed_names.contains(file.name.as_str()))
            .cloned()
            .collect();

        Self {
            executed,
            pending,
            missing,
        }
    }

    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }
}

impl fmt::Display for MigrationStatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Migration Status")?;
        writeln!(f, "================")?;

        writeln!(f, "Executed ({}):", self.executed.len())?;
        if self.executed.is_empty() {
            writeln!(f, "  none")?;
        }
        for record in &self.executed {
            writeln!(
                f,
                "  [batch {}] {}  {}",
                record.batch,
                record.name,
                record.executed_at.format("%Y-%m-%d %H:%M:%S UTC")
            )?;
        }

        writeln!(f, "Pending ({}):", self.pending.len())?;
        if self.pending.is_empty() {
            writeln!(f, "  none")?;
        }
        for file in &self.pending {
            writeln!(f, "  {}", file.name)?;
        }

        if !self.missing.is_empty() {
            writeln!(f, "Missing files ({}):", self.missing.len())?;
            for name in &self.missing {
                writeln!(f, "  {}", name)?;
            }
        }

        Ok(())
    }
}

impl<B: MigrationBackend> MigrationRunner<B> {
    /// Executed and pending migrations. Takes no lock.
    pub async fn status(&self) -> MigrationResult<MigrationStatusReport> {
        let files = self.loader().load()?;
        let executed = self.backend().list_executed().await?;
        Ok(MigrationStatusReport::new(files, executed))
    }
}
