
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::migrations::definitions::MigrationConfig;
use crate::migrations::runner::MigrationRunner;
use memory_backend::MemoryBackend;

pub(crate) fn write_migration(dir: &Path, name: &str, up: &str, down: &str) {
    let content = format!(
        "-- Migration: {}\n-- Up migration\n{}\n-- Down migration\n{}\n",
        name, up, down
    );
    fs::write(dir.join(format!("{}.sql", name)), content).unwrap();
}

/// Runner over a fresh in-memory ledger, plus a handle to inspect it
pub(crate) async fn memory_runner(dir: &Path) -> (MigrationRunner<MemoryBackend>, MemoryBackend) {
    let backend = MemoryBackend::new();
    let config = MigrationConfig::new(dir).with_lock_timeout(Duration::from_millis(10));
    let runner = MigrationRunner::connect(backend.clone(), config).await.unwrap();
    (runner, backend)
}
