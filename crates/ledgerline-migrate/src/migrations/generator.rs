//! Migration Generator - scaffolds new migration files
//!
//! New files are named `<UTC timestamp>_<slug>.sql` and never overwrite an
//! existing file.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::definitions::{MigrationFile, DOWN_MARKER, TIMESTAMP_FORMAT, UP_HEADER};
use crate::error::{MigrationError, MigrationResult};

const MAX_NAME_LENGTH: usize = 50;

/// A migration file written by [`MigrationGenerator`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedMigration {
    pub name: String,
    pub path: PathBuf,
}

/// Writes migration skeletons into a directory
#[derive(Debug, Clone)]
pub struct MigrationGenerator {
    migrations_dir: PathBuf,
}

impl MigrationGenerator {
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
        }
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Create a migration stamped with the current UTC time
    pub fn create(&self, raw_name: &str) -> MigrationResult<GeneratedMigration> {
        self.create_at(raw_name, Utc::now())
    }

    /// Create a migration stamped with `now`
    pub fn create_at(&self, raw_name: &str, now: DateTime<Utc>) -> MigrationResult<GeneratedMigration> {
        let slug = normalize_migration_name(raw_name);
        validate_migration_name(&slug).map_err(|reason| MigrationError::InvalidMigrationName {
            name: raw_name.to_string(),
            reason,
        })?;

        fs::create_dir_all(&self.migrations_dir).map_err(|source| MigrationError::Io {
            path: self.migrations_dir.clone(),
            source,
        })?;

        let name = format!("{}_{}", now.format(TIMESTAMP_FORMAT), slug);
        let path = MigrationFile::path_in(&self.migrations_dir, &name);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| match source.kind() {
                ErrorKind::AlreadyExists => MigrationError::MigrationExists { path: path.clone() },
                _ => MigrationError::Io {
                    path: path.clone(),
                    source,
                },
            })?;

        file.write_all(migration_template(&name, now).as_bytes())
            .map_err(|source| MigrationError::Io {
                path: path.clone(),
                source,
            })?;

        tracing::info!(migration = %name, path = %path.display(), "created migration file");

        Ok(GeneratedMigration { name, path })
    }
}

/// Trim, lowercase, and turn spaces into underscores
pub fn normalize_migration_name(raw_name: &str) -> String {
    raw_name.trim().to_lowercase().replace(' ', "_")
}

/// Check a normalized name, returning the reason it is rejected
pub fn validate_migration_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name cannot be empty".to_string());
    }

    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(format!("name cannot be longer than {} characters", MAX_NAME_LENGTH));
    }

    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-'))
    {
        return Err(format!(
            "invalid character '{}', only lowercase letters, digits, underscores and hyphens are allowed",
            c
        ));
    }

    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err("name cannot start with a digit".to_string());
    }

    Ok(())
}

fn migration_template(name: &str, now: DateTime<Utc>) -> String {
    format!(
        "-- Migration: {}\n\
         -- Created: {}\n\n\
         {}\n\
         -- Write the schema change here\n\n\
         {}\n\
         -- Write the statements that undo it here\n",
        name,
        now.format("%Y-%m-%d %H:%M:%S UTC"),
        UP_HEADER,
        DOWN_MARKER,
    )
}
