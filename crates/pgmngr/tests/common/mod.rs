//! Shared setup for tests that need a running PostgreSQL server.
//!
//! Tests are skipped unless `PGMNGR_DB_HOST` is set. `PGMNGR_DB_PORT`,
//! `PGMNGR_USERNAME` and `PGMNGR_PASSWORD` default to `5432`, `postgres`
//! and `postgres`.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use pgmngr::prelude::*;
use pgmngr::statements::quote_identifier;
use sqlx::PgPool;
use tempfile::TempDir;

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// A freshly created database and an empty migrations directory.
pub struct TestDatabase {
    pub config: Config,
    pub dir: TempDir,
    admin: PgPool,
}

impl TestDatabase {
    /// Creates a uniquely named database, or returns `None` when no server
    /// is configured.
    pub async fn create(prefix: &str) -> Option<Self> {
        let config = Self::config(prefix)?;
        create_database(&config).await.unwrap();

        let admin = connect_and_ping(&config.connection.admin).await.unwrap();
        let dir = TempDir::new().unwrap();
        let mut config = config;
        config.migration.directory = dir.path().to_path_buf();

        Some(Self { config, dir, admin })
    }

    /// Builds a configuration for a database that does not exist yet.
    pub fn config(prefix: &str) -> Option<Config> {
        let Ok(host) = std::env::var("PGMNGR_DB_HOST") else {
            eprintln!("PGMNGR_DB_HOST not set, skipping");
            return None;
        };
        let port = std::env::var("PGMNGR_DB_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(5432);
        let username = std::env::var("PGMNGR_USERNAME").unwrap_or_else(|_| "postgres".into());
        let password = std::env::var("PGMNGR_PASSWORD").unwrap_or_else(|_| "postgres".into());

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .subsec_nanos();
        let database = format!(
            "pgmngr_{prefix}_{}_{}_{nanos}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::SeqCst)
        );

        let connection = ConnectionConfig {
            username,
            password,
            host,
            port,
            ping_intervals: 3,
            ..ConnectionConfig::default()
        };

        let mut config = Config::default();
        config.connection.migration = ConnectionConfig {
            database,
            ..connection.clone()
        };
        config.connection.admin = ConnectionConfig {
            database: "postgres".into(),
            ..connection
        };
        config.apply_defaults();
        Some(config)
    }

    /// Name of the database under test.
    pub fn name(&self) -> &str {
        &self.config.connection.migration.database
    }

    /// Writes a migration file into the migrations directory.
    pub fn write(&self, file_name: &str, sql: &str) -> PathBuf {
        let path = self.dir.path().join(file_name);
        fs::write(&path, sql).unwrap();
        path
    }

    /// Opens a pool on the database under test.
    pub async fn pool(&self) -> PgPool {
        connect_and_ping(&self.config.connection.migration)
            .await
            .unwrap()
    }

    /// Returns whether `public.{table}` exists.
    pub async fn table_exists(&self, table: &str) -> bool {
        let pool = self.pool().await;
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_name = $1)",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();
        pool.close().await;
        exists
    }

    /// Waits for every session tagged with `application_name` to go away and
    /// returns how many are left.
    pub async fn sessions_named(&self, application_name: &str) -> i64 {
        let mut count = 0;
        for _ in 0..20 {
            let (sessions,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM pg_stat_activity WHERE application_name = $1",
            )
            .bind(application_name)
            .fetch_one(&self.admin)
            .await
            .unwrap();
            count = sessions;
            if count == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        count
    }

    /// Drops the database, disconnecting anything still attached to it.
    pub async fn teardown(self) {
        let sql = format!(
            "DROP DATABASE IF EXISTS {} WITH (FORCE)",
            quote_identifier(self.name())
        );
        sqlx::raw_sql(&sql).execute(&self.admin).await.unwrap();
        self.admin.close().await;
    }
}
