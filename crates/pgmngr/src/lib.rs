//! SQL-file migrations for PostgreSQL.
//!
//! `pgmngr` replays hand-written SQL files in version order and records which
//! versions have been applied in a tracking table:
//! - Migration files are named `{unix_timestamp}_{name}[.no_txn].{up|down}.sql`
//! - Each file runs as one script, inside its own transaction unless the name
//!   carries `.no_txn.`
//! - The applied version is recorded in the same transaction as the script
//!
//! # Architecture
//!
//! - **Version** - Parses the timestamp version out of a file name
//! - **Files** - Discovers migration files and creates new ones
//! - **Ledger** - Reads and writes the tracking table
//! - **Diff** - Works out which versions are pending
//! - **Runner** - Bootstraps the ledger, plans and executes a run
//! - **Connection** - Lazy pools and ping retries
//! - **Admin** - Creates, drops and resets the target database
//!
//! # Example
//!
//! ```rust,ignore
//! use pgmngr::prelude::*;
//!
//! let config = Config::load(Path::new(".pgmngr.json"))?;
//! let report = apply_migration(Direction::Forward, &config, None).await?;
//! println!("applied {} migrations", report.versions.len());
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Create a pair of empty migration files
//! pgmngr migration new create_users
//!
//! # Apply pending migrations
//! pgmngr migration forward
//!
//! # Revert the most recent migration
//! pgmngr migration rollback
//!
//! # Create the database from the config file
//! pgmngr db create
//! ```

pub mod admin;
pub mod config;
pub mod connection;
pub mod diff;
pub mod error;
pub mod files;
pub mod ledger;
pub mod runner;
pub mod statements;
pub mod version;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::admin::{
        DatabaseAdmin, PgDatabaseAdmin, create_database, drop_database, reset_database,
    };
    pub use crate::config::{Config, ConnectionConfig, MigrationConfig, TableConfig};
    pub use crate::connection::{RetryPolicy, connect, connect_and_ping, ping};
    pub use crate::diff::{partition, pending};
    pub use crate::error::{PgmngrError, Result};
    pub use crate::files::{Direction, MigrationFile, MigrationFiles, create_new, scan};
    pub use crate::ledger::{AppliedMigration, Ledger};
    pub use crate::runner::{MigrationRunner, MigrationStatus, RunReport, apply_migration};
    pub use crate::version::{Version, parse_version};
}
