//! pgmngr CLI
//!
//! Command-line tool for managing a PostgreSQL database and its migrations.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use pgmngr::prelude::*;

/// Manage your Postgres database.
#[derive(Parser)]
#[command(name = "pgmngr")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path of the config file used to perform DB management.
    #[arg(
        short,
        long,
        env = "PGMNGR_CONFIG_FILE",
        default_value = ".pgmngr.json"
    )]
    config_file: PathBuf,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migration commands.
    Migration {
        #[command(subcommand)]
        command: MigrationCommands,
    },

    /// Manage your database.
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },

    /// Inspect the configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum MigrationCommands {
    /// Generate a new pair of migration files.
    New {
        /// Migration name, e.g. `create_users`.
        name: String,

        /// Do not wrap the migration in a transaction when it runs.
        #[arg(long)]
        no_txn: bool,
    },

    /// Apply all unapplied migrations in ascending order.
    Forward {
        /// Number of migrations to apply (all if not specified).
        #[arg(short, long)]
        count: Option<usize>,
    },

    /// Revert applied migrations, newest first.
    Rollback {
        /// Number of migrations to revert.
        #[arg(short, long, default_value_t = 1)]
        count: usize,
    },

    /// Show which migrations have been applied.
    Status,
}

#[derive(Subcommand)]
enum DbCommands {
    /// Create the database if it doesn't exist.
    Create,

    /// Drop the database (all sessions must be disconnected first).
    Drop,

    /// Drop and recreate the database, then apply every migration.
    Reset,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the resolved configuration (passwords masked).
    Display,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::load(&cli.config_file)?;

    match cli.command {
        Commands::Migration { command } => match command {
            MigrationCommands::New { name, no_txn } => {
                create_new(&config.migration.directory, &name, no_txn)?;
            }

            MigrationCommands::Forward { count } => {
                let report = apply_migration(Direction::Forward, &config, count).await?;
                info!("{} migration(s) applied", report.versions.len());
            }

            MigrationCommands::Rollback { count } => {
                let report = apply_migration(Direction::Rollback, &config, Some(count)).await?;
                info!("{} migration(s) rolled back", report.versions.len());
            }

            MigrationCommands::Status => {
                let runner = MigrationRunner::connect(&config).await?;
                let statuses = runner.status().await;
                runner.close().await;
                let statuses = statuses?;

                if statuses.is_empty() {
                    info!("No migrations found in {}", config.migration.directory.display());
                } else {
                    println!("\nMigrations:");
                    println!("{:-<60}", "");

                    for status in &statuses {
                        let mark = if status.is_applied() { "X" } else { " " };
                        let name = if status.is_missing() {
                            "<missing file>"
                        } else {
                            status.name.as_deref().unwrap_or_default()
                        };
                        match status.applied_at {
                            Some(applied_at) => println!(
                                " [{mark}] {}_{name} ({})",
                                status.version,
                                applied_at.format("%Y-%m-%d %H:%M:%S")
                            ),
                            None => println!(" [{mark}] {}_{name}", status.version),
                        }
                    }
                    println!();
                }
            }
        },

        Commands::Db { command } => match command {
            DbCommands::Create => create_database(&config).await?,
            DbCommands::Drop => drop_database(&config).await?,
            DbCommands::Reset => {
                let report = reset_database(&config).await?;
                info!(
                    "Database reset, {} migration(s) applied",
                    report.versions.len()
                );
            }
        },

        Commands::Config { command } => match command {
            ConfigCommands::Display => {
                println!("{}", serde_json::to_string_pretty(&config.redacted())?);
            }
        },
    }

    Ok(())
}

/// Prints the error message and, for pgmngr errors, their structured details.
fn report_error(err: &anyhow::Error) {
    eprintln!("error: {err}");
    if let Some(err) = err.downcast_ref::<PgmngrError>() {
        if let Ok(details) = serde_json::to_string_pretty(&err.details()) {
            eprintln!("{details}");
        }
    }
}
