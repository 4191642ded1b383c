//! Database lifecycle: create, drop and reset the target database.
//!
//! These operations run over the administrative connection, since a database
//! cannot be created or dropped from a session connected to it.

use sqlx::PgPool;
use tracing::info;

use crate::config::{Config, ConnectionConfig};
use crate::connection;
use crate::error::{PgmngrError, Result};
use crate::files::Direction;
use crate::runner::{MigrationRunner, RunReport};
use crate::statements;

/// Capability to inspect, create and drop databases.
#[allow(async_fn_in_trait)]
pub trait DatabaseAdmin {
    /// Returns whether a database with this name exists (case-insensitive).
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Creates a database, owned by `owner` when given.
    async fn create(&self, name: &str, owner: Option<&str>) -> Result<()>;

    /// Drops a database. Sessions connected to it must be closed first.
    async fn drop_database(&self, name: &str) -> Result<()>;
}

/// [`DatabaseAdmin`] over an administrative PostgreSQL connection.
#[derive(Debug, Clone)]
pub struct PgDatabaseAdmin {
    pool: PgPool,
}

impl PgDatabaseAdmin {
    /// Wraps an administrative pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects with the admin configuration, waiting for the server.
    pub async fn connect(admin: &ConnectionConfig) -> Result<Self> {
        Ok(Self::new(connection::connect_and_ping(admin).await?))
    }

    /// Closes the administrative pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl DatabaseAdmin for PgDatabaseAdmin {
    async fn exists(&self, name: &str) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(statements::DATABASE_EXISTS)
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PgmngrError::sql(format!("checking for database {name}"), e))?;
        Ok(exists)
    }

    async fn create(&self, name: &str, owner: Option<&str>) -> Result<()> {
        let sql = statements::create_database(name, owner);
        sqlx::raw_sql(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| PgmngrError::sql(format!("creating database {name}"), e))?;
        Ok(())
    }

    async fn drop_database(&self, name: &str) -> Result<()> {
        let sql = statements::drop_database(name);
        sqlx::raw_sql(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| PgmngrError::sql(format!("dropping database {name}"), e))?;
        Ok(())
    }
}

/// Creates the migration database, failing if it already exists.
///
/// The migration user becomes the owner.
pub async fn create_database_with<A: DatabaseAdmin>(
    admin: &A,
    target: &ConnectionConfig,
) -> Result<()> {
    if admin.exists(&target.database).await? {
        return Err(PgmngrError::AlreadyExists(target.database.clone()));
    }
    admin
        .create(&target.database, Some(target.username.as_str()))
        .await?;
    info!(database = %target.database, owner = %target.username, "Created database");
    Ok(())
}

/// Drops the migration database, failing if it does not exist.
pub async fn drop_database_with<A: DatabaseAdmin>(
    admin: &A,
    target: &ConnectionConfig,
) -> Result<()> {
    if !admin.exists(&target.database).await? {
        return Err(PgmngrError::DoesNotExist(target.database.clone()));
    }
    admin.drop_database(&target.database).await?;
    info!(database = %target.database, "Dropped database");
    Ok(())
}

/// Drops the migration database when it exists, then creates it again.
pub async fn recreate_database_with<A: DatabaseAdmin>(
    admin: &A,
    target: &ConnectionConfig,
) -> Result<()> {
    if admin.exists(&target.database).await? {
        drop_database_with(admin, target).await?;
    } else {
        info!(database = %target.database, "Database does not exist, nothing to drop");
    }
    create_database_with(admin, target).await
}

/// Creates the database named in `config.connection.migration`.
pub async fn create_database(config: &Config) -> Result<()> {
    let admin = PgDatabaseAdmin::connect(&config.connection.admin).await?;
    let result = create_database_with(&admin, &config.connection.migration).await;
    admin.close().await;
    result
}

/// Drops the database named in `config.connection.migration`.
pub async fn drop_database(config: &Config) -> Result<()> {
    let admin = PgDatabaseAdmin::connect(&config.connection.admin).await?;
    let result = drop_database_with(&admin, &config.connection.migration).await;
    admin.close().await;
    result
}

/// Drops (when present) and recreates the migration database, then applies
/// every forward migration.
pub async fn reset_database(config: &Config) -> Result<RunReport> {
    let admin = PgDatabaseAdmin::connect(&config.connection.admin).await?;
    let recreated = recreate_database_with(&admin, &config.connection.migration).await;
    admin.close().await;
    recreated?;

    let runner = MigrationRunner::connect(config).await?;
    let report = runner.run(Direction::Forward, None).await;
    runner.close().await;
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Keeps databases in memory, keyed by lowercase name.
    #[derive(Default)]
    struct InMemoryAdmin {
        databases: Mutex<BTreeMap<String, Option<String>>>,
    }

    impl InMemoryAdmin {
        fn with(names: &[&str]) -> Self {
            let admin = Self::default();
            for name in names {
                admin
                    .databases
                    .lock()
                    .unwrap()
                    .insert(name.to_lowercase(), None);
            }
            admin
        }

        fn owner_of(&self, name: &str) -> Option<String> {
            self.databases
                .lock()
                .unwrap()
                .get(&name.to_lowercase())
                .cloned()
                .flatten()
        }
    }

    impl DatabaseAdmin for InMemoryAdmin {
        async fn exists(&self, name: &str) -> Result<bool> {
            Ok(self
                .databases
                .lock()
                .unwrap()
                .contains_key(&name.to_lowercase()))
        }

        async fn create(&self, name: &str, owner: Option<&str>) -> Result<()> {
            self.databases
                .lock()
                .unwrap()
                .insert(name.to_lowercase(), owner.map(str::to_string));
            Ok(())
        }

        async fn drop_database(&self, name: &str) -> Result<()> {
            self.databases.lock().unwrap().remove(&name.to_lowercase());
            Ok(())
        }
    }

    fn target(database: &str) -> ConnectionConfig {
        ConnectionConfig {
            username: "app".into(),
            database: database.into(),
            ..ConnectionConfig::default()
        }
    }

    #[tokio::test]
    async fn test_create_then_drop() {
        let admin = InMemoryAdmin::default();
        let target = target("app_db");

        create_database_with(&admin, &target).await.unwrap();
        assert!(admin.exists("app_db").await.unwrap());
        assert_eq!(admin.owner_of("app_db").as_deref(), Some("app"));

        drop_database_with(&admin, &target).await.unwrap();
        assert!(!admin.exists("app_db").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_existing_fails() {
        let admin = InMemoryAdmin::with(&["APP_DB"]);
        let err = create_database_with(&admin, &target("app_db"))
            .await
            .unwrap_err();
        assert!(matches!(err, PgmngrError::AlreadyExists(ref name) if name == "app_db"));
    }

    #[tokio::test]
    async fn test_recreate_replaces_existing() {
        let admin = InMemoryAdmin::with(&["app_db"]);
        assert_eq!(admin.owner_of("app_db"), None);

        recreate_database_with(&admin, &target("app_db")).await.unwrap();
        assert_eq!(admin.owner_of("app_db").as_deref(), Some("app"));
    }

    #[tokio::test]
    async fn test_recreate_tolerates_missing() {
        let admin = InMemoryAdmin::default();
        recreate_database_with(&admin, &target("app_db")).await.unwrap();
        assert!(admin.exists("app_db").await.unwrap());
    }

    #[tokio::test]
    async fn test_drop_missing_fails() {
        let admin = InMemoryAdmin::default();
        let err = drop_database_with(&admin, &target("app_db"))
            .await
            .unwrap_err();
        assert!(matches!(err, PgmngrError::DoesNotExist(ref name) if name == "app_db"));
    }
}
