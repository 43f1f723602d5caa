//! Migration file parsing
//!
//! A migration file holds an UP body and a DOWN body separated by a single
//! `-- Down migration` line. The UP body may be introduced by a
//! `-- Up migration` header; anything above that header is dropped.

use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use super::definitions::{MigrationFile, DOWN_MARKER, UP_HEADER};
use crate::error::{MigrationError, MigrationResult};

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{14}_[A-Za-z0-9_\-]+$").expect("migration name pattern is valid"));

/// Read and parse one migration file
pub fn parse_migration_file(path: &Path) -> MigrationResult<MigrationFile> {
    let name = migration_name(path)?;

    let content = fs::read_to_string(path)
        .map_err(|e| MigrationError::malformed(path, format!("cannot be read: {}", e)))?;

    let (up_sql, down_sql) =
        split_sections(&content).map_err(|reason| MigrationError::malformed(path, reason))?;

    Ok(MigrationFile {
        name,
        path: path.to_path_buf(),
        up_sql,
        down_sql,
    })
}

/// Split file content into trimmed `(up, down)` bodies
pub fn split_sections(content: &str) -> Result<(String, String), String> {
    let lines: Vec<&str> = content.lines().collect();

    let markers: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.trim() == DOWN_MARKER)
        .map(|(index, _)| index)
        .collect();

    let marker = match markers.as_slice() {
        [index] => *index,
        [] => return Err(format!("missing '{}' marker", DOWN_MARKER)),
        many => {
            return Err(format!(
                "'{}' marker appears {} times, expected exactly once",
                DOWN_MARKER,
                many.len()
            ))
        }
    };

    let up_lines = &lines[..marker];
    let up_start = up_lines
        .iter()
        .position(|line| line.trim() == UP_HEADER)
        .map_or(0, |index| index + 1);

    let up_sql = up_lines[up_start..].join("\n").trim().to_string();
    let down_sql = lines[marker + 1..].join("\n").trim().to_string();

    Ok((up_sql, down_sql))
}

/// File stem of a migration path, checked against `<14 digits>_<slug>`
fn migration_name(path: &Path) -> MigrationResult<String> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| MigrationError::malformed(path, "file name is not valid UTF-8"))?;

    if !NAME_PATTERN.is_match(stem) {
        return Err(MigrationError::malformed(
            path,
            "file name must follow <YYYYMMDDHHMMSS>_<name>.sql",
        ));
    }

    Ok(stem.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_split_with_header() {
        let content = "-- Migration: create users\n-- Created: 2024-01-01\n\n-- Up migration\nCREATE TABLE users (id SERIAL PRIMARY KEY);\n\n-- Down migration\nDROP TABLE users;\n";

        let (up, down) = split_sections(content).unwrap();
        assert_eq!(up, "CREATE TABLE users (id SERIAL PRIMARY KEY);");
        assert_eq!(down, "DROP TABLE users;");
    }

    #[test]
    fn test_split_without_header_keeps_everything_above_marker() {
        let content = "CREATE TABLE a (id INT);\nCREATE TABLE b (id INT);\n-- Down migration\nDROP TABLE b;\nDROP TABLE a;";

        let (up, down) = split_sections(content).unwrap();
        assert_eq!(up, "CREATE TABLE a (id INT);\nCREATE TABLE b (id INT);");
        assert_eq!(down, "DROP TABLE b;\nDROP TABLE a;");
    }

    #[test]
    fn test_marker_with_surrounding_whitespace() {
        let content = "-- Up migration\nSELECT 1;\n   -- Down migration   \nSELECT 2;";

        let (up, down) = split_sections(content).unwrap();
        assert_eq!(up, "SELECT 1;");
        assert_eq!(down, "SELECT 2;");
    }

    #[test]
    fn test_missing_marker_is_rejected() {
        let err = split_sections("-- Up migration\nCREATE TABLE t (id INT);").unwrap_err();
        assert!(err.contains("missing"));
    }

    #[test]
    fn test_repeated_marker_is_rejected() {
        let content = "SELECT 1;\n-- Down migration\nSELECT 2;\n-- Down migration\nSELECT 3;";
        let err = split_sections(content).unwrap_err();
        assert!(err.contains("2 times"));
    }

    #[test]
    fn test_empty_bodies_are_allowed() {
        let (up, down) = split_sections("-- Up migration\n\n-- Down migration\n").unwrap();
        assert!(up.is_empty());
        assert!(down.is_empty());
    }

    #[test]
    fn test_parse_file_derives_name_from_stem() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("20240101000000_create_users.sql");
        fs::write(&path, "-- Up migration\nCREATE TABLE users (id INT);\n-- Down migration\nDROP TABLE users;").unwrap();

        let migration = parse_migration_file(&path).unwrap();
        assert_eq!(migration.name, "20240101000000_create_users");
        assert_eq!(migration.path, path);
        assert_eq!(migration.up_sql, "CREATE TABLE users (id INT);");
        assert_eq!(migration.down_sql, "DROP TABLE users;");
    }

    #[test]
    fn test_parse_file_without_marker_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("20240101000000_broken.sql");
        fs::write(&path, "CREATE TABLE broken (id INT);").unwrap();

        match parse_migration_file(&path) {
            Err(MigrationError::MalformedMigrationFile { path: reported, .. }) => {
                assert_eq!(reported, path)
            }
            other => panic!("expected MalformedMigrationFile, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_file_rejects_unprefixed_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("create_users.sql");
        fs::write(&path, "SELECT 1;\n-- Down migration\nSELECT 2;").unwrap();

        assert!(matches!(
            parse_migration_file(&path),
            Err(MigrationError::MalformedMigrationFile { .. })
        ));
    }
}
