//! Migration Loader - reads the migrations directory
//!
//! The ascending name order returned by [`MigrationLoader::load`] is the only
//! source of apply order. Directory iteration order and file times are never
//! consulted.

use std::fs;
use std::path::{Path, PathBuf};

use super::definitions::{MigrationFile, MIGRATION_EXTENSION};
use super::parser::parse_migration_file;
use crate::error::{MigrationError, MigrationResult};

/// Loads migration files from a single directory
#[derive(Debug, Clone)]
pub struct MigrationLoader {
    migrations_dir: PathBuf,
}

impl MigrationLoader {
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
        }
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Load all well-formed migrations sorted by name.
    ///
    /// A missing directory yields an empty list. Files that fail to parse are
    /// logged and skipped; only a failure to list the directory is an error.
    pub fn load(&self) -> MigrationResult<Vec<MigrationFile>> {
        if !self.migrations_dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.migrations_dir).map_err(|source| MigrationError::Io {
            path: self.migrations_dir.clone(),
            source,
        })?;

        let mut migrations = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| MigrationError::Io {
                path: self.migrations_dir.clone(),
                source,
            })?;

            let path = entry.path();
            if !path.is_file() || !has_migration_extension(&path) {
                continue;
            }

            match parse_migration_file(&path) {
                Ok(migration) => migrations.push(migration),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping malformed migration file");
                }
            }
        }

        migrations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(migrations)
    }

    /// Re-read a single migration by name.
    ///
    /// Unlike [`load`](Self::load) a malformed file is an error here, since
    /// the caller needs this exact migration.
    pub fn find(&self, name: &str) -> MigrationResult<MigrationFile> {
        let path = MigrationFile::path_in(&self.migrations_dir, name);
        if !path.is_file() {
            return Err(MigrationError::MigrationFileNotFound {
                name: name.to_string(),
            });
        }
        parse_migration_file(&path)
    }
}

fn has_migration_extension(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == MIGRATION_EXTENSION)
}
