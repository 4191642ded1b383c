//! Migration runner.
//!
//! A run moves through `TableBootstrap → Diffing → Sorting → Executing(i) →
//! Done` and stops at the first failing file. Each file is its own
//! transaction: files committed before a failure stay applied and recorded,
//! so running again resumes at the failed version.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info, warn};

use crate::config::{Config, MigrationConfig};
use crate::connection;
use crate::diff;
use crate::error::{PgmngrError, Result};
use crate::files::{self, Direction, MigrationFile};
use crate::ledger::Ledger;
use crate::version::Version;

/// Where a run currently is; logged at each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Making sure the tracking table exists.
    TableBootstrap,
    /// Comparing files on disk with the ledger.
    Diffing,
    /// Ordering the pending files.
    Sorting,
    /// Running the i-th file of the plan (zero based).
    Executing(usize),
    /// Every planned file ran.
    Done,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Direction of the run.
    pub direction: Direction,
    /// Versions executed, in execution order.
    pub versions: Vec<Version>,
}

impl RunReport {
    /// Returns whether the run had nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// State of one migration, as shown by `migration status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Migration version.
    pub version: Version,
    /// Descriptive name, when the forward file exists.
    pub name: Option<String>,
    /// Forward file, when it exists.
    pub path: Option<PathBuf>,
    /// When it was applied, if it was.
    pub applied_at: Option<NaiveDateTime>,
}

impl MigrationStatus {
    /// Returns whether the ledger holds this version.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }

    /// Returns whether the version is applied but its file is gone.
    #[must_use]
    pub const fn is_missing(&self) -> bool {
        self.path.is_none()
    }
}

/// Applies migration files to a database and keeps the ledger in step.
pub struct MigrationRunner {
    pool: PgPool,
    ledger: Ledger,
    directory: PathBuf,
}

impl MigrationRunner {
    /// Creates a runner over an open pool.
    #[must_use]
    pub fn new(pool: PgPool, migration: &MigrationConfig) -> Self {
        let ledger = Ledger::new(pool.clone(), &migration.table);
        Self {
            pool,
            ledger,
            directory: migration.directory.clone(),
        }
    }

    /// Connects to the migration database, waiting for it to answer.
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = connection::connect_and_ping(&config.connection.migration).await?;
        Ok(Self::new(pool, &config.migration))
    }

    /// Returns the ledger.
    #[must_use]
    pub const fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Closes the pool, waiting for its connections to terminate.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Creates the tracking table if it is missing.
    pub async fn bootstrap(&self) -> Result<()> {
        debug!(phase = ?RunPhase::TableBootstrap, "Migration run");
        if !self.ledger.table_exists().await? {
            self.ledger.ensure_table().await?;
        }
        Ok(())
    }

    /// Returns the files a run in `direction` would execute, in order.
    ///
    /// Forward plans hold pending versions, oldest first. Rollback plans hold
    /// applied versions that have a down file, newest first. `limit` keeps
    /// only the first `limit` entries.
    pub async fn plan(&self, direction: Direction, limit: Option<usize>) -> Result<Vec<MigrationFile>> {
        debug!(phase = ?RunPhase::Diffing, ?direction, "Migration run");
        let mut on_disk = files::scan(&self.directory, direction)?;
        let applied = self.ledger.applied_versions().await?;

        debug!(phase = ?RunPhase::Sorting, ?direction, "Migration run");
        let versions: Vec<Version> = match direction {
            Direction::Forward => diff::pending(on_disk.keys().copied(), applied)
                .into_iter()
                .collect(),
            Direction::Rollback => {
                let (without_file, _) = diff::partition(applied.iter().copied(), on_disk.keys().copied());
                for version in &without_file {
                    warn!(%version, "Applied migration has no rollback file, skipping");
                }
                let mut rollback: Vec<Version> = applied
                    .into_iter()
                    .filter(|v| !without_file.contains(v))
                    .collect();
                rollback.reverse();
                rollback
            }
        };

        let limit = limit.unwrap_or(usize::MAX);
        Ok(versions
            .into_iter()
            .take(limit)
            .filter_map(|version| on_disk.remove(&version))
            .collect())
    }

    /// Runs every planned migration in `direction`.
    ///
    /// Stops at the first failure and returns it; migrations that already
    /// committed stay applied.
    pub async fn run(&self, direction: Direction, limit: Option<usize>) -> Result<RunReport> {
        self.bootstrap().await?;
        let plan = self.plan(direction, limit).await?;

        if plan.is_empty() {
            info!(?direction, "No migrations to run");
        }

        let mut versions = Vec::with_capacity(plan.len());
        for (i, file) in plan.iter().enumerate() {
            debug!(phase = ?RunPhase::Executing(i), version = %file.version, "Migration run");
            self.execute(file).await?;
            versions.push(file.version);
        }

        debug!(phase = ?RunPhase::Done, count = versions.len(), "Migration run");
        Ok(RunReport {
            direction,
            versions,
        })
    }

    /// Runs one migration file and updates the ledger.
    ///
    /// The whole file is sent as a single script. Unless the file opts out
    /// with `.no_txn.`, the script and the ledger update share a transaction.
    ///
    /// The server still runs a multi-statement script as one implicit
    /// transaction, so statements that refuse transaction blocks need a
    /// `.no_txn.` file of their own.
    pub async fn execute(&self, file: &MigrationFile) -> Result<()> {
        let sql = file.read_sql()?;
        let path = file.path.display();
        info!("Running migration for: {path}");

        if file.wrap_in_transaction {
            let mut tx = self.pool.begin().await.map_err(|e| {
                PgmngrError::sql(format!("beginning transaction for {path}"), e)
            })?;

            if let Err(e) = sqlx::raw_sql(&sql).execute(&mut *tx).await {
                rollback(tx, file).await;
                return Err(PgmngrError::sql(format!("running migration {path}"), e));
            }
            if let Err(e) = self.update_ledger(&mut *tx, file).await {
                rollback(tx, file).await;
                return Err(e);
            }

            tx.commit()
                .await
                .map_err(|e| PgmngrError::sql(format!("committing migration {path}"), e))?;
        } else {
            let mut conn = self.pool.acquire().await.map_err(|e| {
                PgmngrError::sql(format!("acquiring connection for {path}"), e)
            })?;

            sqlx::raw_sql(&sql)
                .execute(&mut *conn)
                .await
                .map_err(|e| PgmngrError::sql(format!("running migration {path}"), e))?;
            self.update_ledger(&mut *conn, file).await?;
        }

        info!("Migration successful using migration file: {path}");
        Ok(())
    }

    async fn update_ledger(&self, conn: &mut sqlx::PgConnection, file: &MigrationFile) -> Result<()> {
        match file.direction {
            Direction::Forward => self.ledger.record_applied(conn, file.version).await,
            Direction::Rollback => self.ledger.record_unapplied(conn, file.version).await,
        }
    }

    /// Lists forward migrations on disk next to the ledger.
    ///
    /// Versions recorded in the ledger without a file are included with no
    /// path.
    pub async fn status(&self) -> Result<Vec<MigrationStatus>> {
        self.bootstrap().await?;
        let on_disk = files::scan(&self.directory, Direction::Forward)?;
        let applied = self.ledger.applied().await?;

        let versions: BTreeSet<Version> = on_disk
            .keys()
            .copied()
            .chain(applied.iter().map(|a| a.version))
            .collect();

        Ok(versions
            .into_iter()
            .map(|version| {
                let file = on_disk.get(&version);
                MigrationStatus {
                    version,
                    name: file.map(|f| f.name.clone()),
                    path: file.map(|f| f.path.clone()),
                    applied_at: applied
                        .iter()
                        .find(|a| a.version == version)
                        .map(|a| a.applied_at),
                }
            })
            .collect())
    }
}

async fn rollback(tx: Transaction<'_, Postgres>, file: &MigrationFile) {
    if let Err(e) = tx.rollback().await {
        warn!(
            file = %file.path.display(),
            error = %e,
            "Failed to roll back migration transaction"
        );
    }
}

/// Connects with `config` and runs every migration in `direction`.
pub async fn apply_migration(
    direction: Direction,
    config: &Config,
    limit: Option<usize>,
) -> Result<RunReport> {
    let runner = MigrationRunner::connect(config).await?;
    let report = runner.run(direction, limit).await;
    runner.close().await;
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_flags() {
        let applied_at = chrono::DateTime::from_timestamp(1000, 0)
            .unwrap()
            .naive_utc();
        let missing = MigrationStatus {
            version: Version::new(1000),
            name: None,
            path: None,
            applied_at: Some(applied_at),
        };
        assert!(missing.is_applied());
        assert!(missing.is_missing());

        let pending = MigrationStatus {
            version: Version::new(2000),
            name: Some("create_orders".into()),
            path: Some(PathBuf::from("migrations/2000_create_orders.up.sql")),
            applied_at: None,
        };
        assert!(!pending.is_applied());
        assert!(!pending.is_missing());
    }
}
