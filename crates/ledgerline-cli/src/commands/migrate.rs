use std::io::{self, BufRead, Write};

use ledgerline_core::{AppConfig, Environment};
use ledgerline_migrate::{
    MigrationConfig, MigrationGenerator, MigrationResult, MigrationRollback, MigrationRunner,
    PostgresBackend,
};

use super::config::mask_database_url;
use crate::error::CliError;
use crate::interactive::{Prompt, CONFIRMATION_PHRASE};

/// Engine configuration derived from the application configuration
pub fn migration_config(config: &AppConfig) -> MigrationConfig {
    MigrationConfig::new(config.migrations_dir.clone())
        .with_table(config.migrations_table.clone())
        .with_lock_timeout(config.lock_timeout)
}

async fn open_runner(config: &AppConfig) -> Result<MigrationRunner<PostgresBackend>, CliError> {
    let database_url = config.require_database_url()?;
    let migration_config = migration_config(config);

    tracing::debug!(
        database = %mask_database_url(database_url),
        table = %migration_config.migrations_table,
        dir = %migration_config.migrations_dir.display(),
        "connecting to database"
    );

    let backend = PostgresBackend::connect(database_url, &migration_config).await?;
    Ok(MigrationRunner::connect(backend, migration_config).await?)
}

/// Close the pool on both paths, then surface the outcome
async fn finish<T>(
    runner: MigrationRunner<PostgresBackend>,
    outcome: MigrationResult<T>,
) -> Result<T, CliError> {
    runner.backend().close().await;
    Ok(outcome?)
}

/// Write a new migration skeleton. Never touches the database.
pub async fn create(config: &AppConfig, name: &str) -> Result<(), CliError> {
    let generator = MigrationGenerator::new(config.migrations_dir.clone());
    let generated = generator.create(name)?;

    println!("✅ Created migration: {}", generated.path.display());
    Ok(())
}

pub async fn run(config: &AppConfig) -> Result<(), CliError> {
    let runner = open_runner(config).await?;
    let outcome = runner.run().await;
    let result = finish(runner, outcome).await?;

    println!("{}", result.to_string().trim_end());
    Ok(())
}

pub async fn rollback(config: &AppConfig) -> Result<(), CliError> {
    let runner = open_runner(config).await?;
    let outcome = runner.rollback_last_batch().await;
    let result = finish(runner, outcome).await?;

    println!("{}", result.to_string().trim_end());
    Ok(())
}

pub async fn status(config: &AppConfig) -> Result<(), CliError> {
    let runner = open_runner(config).await?;
    let outcome = runner.status().await;
    let report = finish(runner, outcome).await?;

    println!("{}", report.to_string().trim_end());
    Ok(())
}

/// Roll back every applied migration
pub async fn reset(config: &AppConfig, force: bool) -> Result<(), CliError> {
    confirm_destructive("roll back every applied migration", config.environment, force)?;

    let runner = open_runner(config).await?;
    let outcome = runner.rollback_all().await;
    let result = finish(runner, outcome).await?;

    println!("{}", result.to_string().trim_end());
    Ok(())
}

/// Roll back every applied migration, then run them all again
pub async fn refresh(config: &AppConfig, force: bool) -> Result<(), CliError> {
    confirm_destructive(
        "roll back every applied migration and run them all again",
        config.environment,
        force,
    )?;

    let runner = open_runner(config).await?;
    let outcome = runner.refresh().await;
    let result = finish(runner, outcome).await?;

    println!("{}", result.to_string().trim_end());
    Ok(())
}

fn confirm_destructive(operation: &str, environment: Environment, force: bool) -> Result<(), CliError> {
    if force {
        tracing::warn!(operation, %environment, "confirmation skipped with --force");
        return Ok(());
    }

    let stdin = io::stdin();
    confirm_destructive_with(&mut stdin.lock(), &mut io::stdout(), operation, environment)
}

fn confirm_destructive_with<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    operation: &str,
    environment: Environment,
) -> Result<(), CliError> {
    if environment.is_production() {
        writeln!(output, "⚠️  You are about to {} in PRODUCTION.", operation)?;
        let prompt = format!("Type '{}' to continue", CONFIRMATION_PHRASE);
        if !Prompt::confirm_phrase(input, output, &prompt, CONFIRMATION_PHRASE)? {
            return Err(CliError::Cancelled {
                reason: "exact confirmation required".to_string(),
            });
        }
    } else {
        let prompt = format!("⚠️  This will {}. Continue?", operation);
        if !Prompt::confirm(input, output, &prompt, false)? {
            return Err(CliError::Cancelled {
                reason: "cancelled by user".to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;
    use tempfile::TempDir;

    fn answer(text: &str, environment: Environment) -> Result<(), CliError> {
        let mut input = Cursor::new(text.as_bytes().to_vec());
        let mut output = Vec::new();
        confirm_destructive_with(&mut input, &mut output, "reset", environment)
    }

    #[test]
    fn test_development_accepts_yes() {
        assert!(answer("y\n", Environment::Development).is_ok());
        assert!(answer("yes\n", Environment::Testing).is_ok());
        assert!(matches!(
            answer("n\n", Environment::Development),
            Err(CliError::Cancelled { .. })
        ));
        assert!(answer("\n", Environment::Development).is_err());
    }

    #[test]
    fn test_production_requires_exact_phrase() {
        assert!(answer("YES I UNDERSTAND\n", Environment::Production).is_ok());
        assert!(matches!(
            answer("y\n", Environment::Production),
            Err(CliError::Cancelled { .. })
        ));
    }

    #[test]
    fn test_force_skips_prompt() {
        assert!(confirm_destructive("reset", Environment::Production, true).is_ok());
    }

    #[test]
    fn test_migration_config_from_app_config() {
        let mut app = AppConfig::default();
        app.migrations_dir = "db/sql".into();
        app.migrations_table = "ledger".to_string();
        app.lock_timeout = Duration::from_secs(9);

        let config = migration_config(&app);

        assert_eq!(config.migrations_dir, std::path::PathBuf::from("db/sql"));
        assert_eq!(config.migrations_table, "ledger");
        assert_eq!(config.lock_timeout, Duration::from_secs(9));
    }

    #[tokio::test]
    async fn test_create_needs_no_database() {
        let temp_dir = TempDir::new().unwrap();
        let mut app = AppConfig::default();
        app.migrations_dir = temp_dir.path().join("migrations");

        create(&app, "create users").await.unwrap();

        let files: Vec<_> = std::fs::read_dir(&app.migrations_dir).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_pool_is_closed_when_run_fails() {
        let Some(url) = std::env::var("TEST_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .ok()
        else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("20240101000000_broken.sql"),
            "-- Up migration\nSELECT * FROM no_such_table_anywhere;\n-- Down migration\n",
        )
        .unwrap();

        let mut app = AppConfig::default();
        app.database_url = Some(url.clone());
        app.migrations_dir = temp_dir.path().to_path_buf();
        app.migrations_table = format!("ll_cli_close_{}", std::process::id());

        let runner = open_runner(&app).await.unwrap();
        let pool = runner.backend().pool().clone();
        let outcome = runner.run().await;
        let result = finish(runner, outcome).await;

        assert!(matches!(result, Err(CliError::Migration(_))));
        assert!(pool.is_closed());

        let cleanup = sqlx::PgPool::connect(&url).await.unwrap();
        for table in [format!("{}_schema", app.migrations_table), app.migrations_table.clone()] {
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
                .execute(&cleanup)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_database_commands_require_url() {
        let app = AppConfig::default();
        assert!(matches!(run(&app).await, Err(CliError::Config(_))));
    }
}
