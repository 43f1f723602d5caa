mod commands;
mod error;
mod interactive;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use ledgerline_core::{init_logging, AppConfig, LoggingConfig};

use commands::{config, migrate};
use error::CliError;

#[derive(Parser)]
#[command(name = "ledgerline")]
#[command(version, about = "Batch-tracked SQL schema migrations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database migration management
    Migrate {
        #[command(subcommand)]
        migrate_command: MigrateCommands,
    },

    /// Show the effective configuration and where each value came from
    Config,
}

#[derive(Subcommand)]
enum MigrateCommands {
    /// Create a new migration
    Create {
        /// Migration name
        name: String,
    },

    /// Run pending migrations
    #[command(alias = "up")]
    Run,

    /// Rollback the last batch of migrations
    #[command(alias = "down")]
    Rollback,

    /// Show migration status
    Status,

    /// Roll back every applied migration
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Roll back every applied migration, then run all migrations again
    Refresh {
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let app_config = AppConfig::from_env()?;

    init_logging(LoggingConfig::from_app_config(&app_config)).map_err(|e| CliError::Logging {
        message: e.to_string(),
    })?;

    match cli.command {
        Commands::Migrate { migrate_command } => match migrate_command {
            MigrateCommands::Create { name } => migrate::create(&app_config, &name).await,
            MigrateCommands::Run => migrate::run(&app_config).await,
            MigrateCommands::Rollback => migrate::rollback(&app_config).await,
            MigrateCommands::Status => migrate::status(&app_config).await,
            MigrateCommands::Reset { force } => migrate::reset(&app_config, force).await,
            MigrateCommands::Refresh { force } => migrate::refresh(&app_config, force).await,
        },
        Commands::Config => config::show(&app_config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_aliases_parse() {
        let cli = Cli::try_parse_from(["ledgerline", "migrate", "up"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Migrate { migrate_command: MigrateCommands::Run }
        ));

        let cli = Cli::try_parse_from(["ledgerline", "migrate", "down"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Migrate { migrate_command: MigrateCommands::Rollback }
        ));
    }

    #[test]
    fn test_destructive_commands_take_force() {
        let cli = Cli::try_parse_from(["ledgerline", "migrate", "reset", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Migrate { migrate_command: MigrateCommands::Reset { force: true } }
        ));

        let cli = Cli::try_parse_from(["ledgerline", "migrate", "refresh"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Migrate { migrate_command: MigrateCommands::Refresh { force: false } }
        ));
    }
}
