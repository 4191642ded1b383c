//! Applied-version ledger.
//!
//! This module manages the tracking table (`public.schema_migrations` by
//! default) that records which migration versions have been applied to the
//! database.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use sqlx::{PgPool, Postgres};
use tracing::{debug, info};

use crate::config::TableConfig;
use crate::error::{PgmngrError, Result};
use crate::statements::Statements;
use crate::version::Version;

/// A row of the tracking table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    /// Applied version.
    pub version: Version,
    /// When the version was recorded (UTC).
    pub applied_at: NaiveDateTime,
}

/// Reads and writes the tracking table.
#[derive(Debug, Clone)]
pub struct Ledger {
    pool: PgPool,
    table: TableConfig,
    statements: Statements,
}

impl Ledger {
    /// Creates a ledger over the given tracking table.
    #[must_use]
    pub fn new(pool: PgPool, table: &TableConfig) -> Self {
        Self {
            pool,
            table: table.clone(),
            statements: Statements::new(table),
        }
    }

    fn qualified_name(&self) -> String {
        format!("{}.{}", self.table.schema, self.table.name)
    }

    /// Checks the catalog for the tracking table.
    pub async fn table_exists(&self) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(self.statements.table_exists())
            .bind(&self.table.schema)
            .bind(&self.table.name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                PgmngrError::sql(format!("checking for table {}", self.qualified_name()), e)
            })?;
        Ok(exists)
    }

    /// Creates the tracking table unless it already exists.
    ///
    /// Returns whether the table was created.
    pub async fn ensure_table(&self) -> Result<bool> {
        if self.table_exists().await? {
            debug!(table = %self.qualified_name(), "Tracking table already exists");
            return Ok(false);
        }

        sqlx::query(self.statements.create_table())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                PgmngrError::sql(format!("creating table {}", self.qualified_name()), e)
            })?;

        info!(table = %self.qualified_name(), "Created migrations tracking table");
        Ok(true)
    }

    /// Returns every applied version.
    pub async fn applied_versions(&self) -> Result<BTreeSet<Version>> {
        let rows: Vec<(i64,)> = sqlx::query_as(self.statements.applied_versions())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                PgmngrError::sql(
                    format!("reading applied versions from {}", self.qualified_name()),
                    e,
                )
            })?;
        Ok(rows.into_iter().map(|(v,)| Version::new(v)).collect())
    }

    /// Returns every applied migration with its timestamp, oldest version first.
    pub async fn applied(&self) -> Result<Vec<AppliedMigration>> {
        let rows: Vec<(i64, NaiveDateTime)> = sqlx::query_as(self.statements.applied_records())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                PgmngrError::sql(
                    format!("reading applied migrations from {}", self.qualified_name()),
                    e,
                )
            })?;

        Ok(rows
            .into_iter()
            .map(|(version, applied_at)| AppliedMigration {
                version: Version::new(version),
                applied_at,
            })
            .collect())
    }

    /// Records a version as applied.
    ///
    /// Pass the migration's open transaction so the row commits together with
    /// the migration itself.
    pub async fn record_applied<'c, E>(&self, executor: E, version: Version) -> Result<()>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        sqlx::query(self.statements.record_applied())
            .bind(version.as_i64())
            .execute(executor)
            .await
            .map_err(|e| PgmngrError::sql(format!("recording version {version}"), e))?;
        debug!(%version, "Recorded migration as applied");
        Ok(())
    }

    /// Removes a version from the ledger (for rollback).
    pub async fn record_unapplied<'c, E>(&self, executor: E, version: Version) -> Result<()>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        let result = sqlx::query(self.statements.remove_applied())
            .bind(version.as_i64())
            .execute(executor)
            .await
            .map_err(|e| PgmngrError::sql(format!("removing version {version}"), e))?;

        if result.rows_affected() == 0 {
            return Err(PgmngrError::NotApplied(version));
        }

        debug!(%version, "Removed migration from ledger");
        Ok(())
    }
}
