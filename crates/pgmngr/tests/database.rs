//! Database lifecycle against a live PostgreSQL server.

mod common;

use common::TestDatabase;
use pgmngr::prelude::*;

#[tokio::test]
async fn test_create_and_drop() {
    let Some(config) = TestDatabase::config("lifecycle") else {
        return;
    };

    create_database(&config).await.unwrap();
    let err = create_database(&config).await.unwrap_err();
    assert!(matches!(err, PgmngrError::AlreadyExists(_)), "{err}");

    drop_database(&config).await.unwrap();
    let err = drop_database(&config).await.unwrap_err();
    assert!(matches!(err, PgmngrError::DoesNotExist(_)), "{err}");
}

#[tokio::test]
async fn test_reset_recreates_and_migrates() {
    let Some(db) = TestDatabase::create("reset").await else {
        return;
    };
    db.write(
        "1000_create_users.up.sql",
        "CREATE TABLE users (id SERIAL PRIMARY KEY);",
    );

    let report = reset_database(&db.config).await.unwrap();
    assert_eq!(report.versions, vec![Version::new(1000)]);
    assert!(db.table_exists("users").await);

    // Reset again drops the migrated database and replays the file.
    let report = reset_database(&db.config).await.unwrap();
    assert_eq!(report.versions, vec![Version::new(1000)]);

    db.teardown().await;
}

#[tokio::test]
async fn test_failed_reset_closes_admin_sessions() {
    let Some(db) = TestDatabase::create("reset_closes").await else {
        return;
    };
    let application_name = format!("{}_admin", db.name());
    let mut config = db.config.clone();
    config
        .connection
        .admin
        .query_params
        .insert("application_name".into(), application_name.clone());
    // Recreating fails: the owner role does not exist.
    config.connection.migration.username = format!("{}_nobody", db.name());

    let err = reset_database(&config).await.unwrap_err();
    assert!(matches!(err, PgmngrError::Sql { .. }), "{err}");
    assert_eq!(db.sessions_named(&application_name).await, 0);

    db.teardown().await;
}

#[tokio::test]
async fn test_reset_without_existing_database() {
    let Some(config) = TestDatabase::config("reset_fresh") else {
        return;
    };
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = config;
    config.migration.directory = dir.path().to_path_buf();

    let report = reset_database(&config).await.unwrap();
    assert!(report.is_empty());

    drop_database(&config).await.unwrap();
}

#[tokio::test]
async fn test_ping_gives_up_on_unknown_database() {
    let Some(config) = TestDatabase::config("missing") else {
        return;
    };

    let policy = RetryPolicy::immediate(2);
    let pool = connect(&config.connection.migration, &policy).unwrap();
    let err = ping(&pool, &config.connection.migration, &policy)
        .await
        .unwrap_err();
    assert!(
        matches!(err, PgmngrError::Connectivity { attempts: 2, .. }),
        "{err}"
    );
}
