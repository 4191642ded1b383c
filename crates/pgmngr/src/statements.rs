//! SQL statements used against the target and administrative databases.
//!
//! PostgreSQL cannot bind identifiers as parameters, so the tracking table
//! name is quoted into the statements once, when the table is built.

use crate::config::TableConfig;

/// Quotes a PostgreSQL identifier, doubling embedded quotes.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Statements for one tracking table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statements {
    table_exists: String,
    create_table: String,
    applied_versions: String,
    applied_records: String,
    record_applied: String,
    remove_applied: String,
}

impl Statements {
    /// Builds the statement table for the configured tracking table.
    #[must_use]
    pub fn new(table: &TableConfig) -> Self {
        let qualified = format!(
            "{}.{}",
            quote_identifier(&table.schema),
            quote_identifier(&table.name)
        );
        let primary_key = quote_identifier(&format!("{}_pk", table.name));

        Self {
            table_exists: "SELECT EXISTS (
  SELECT 1
  FROM information_schema.tables
  WHERE table_schema = $1
  AND table_name = $2
)"
            .to_string(),
            create_table: format!(
                "CREATE TABLE IF NOT EXISTS {qualified} (
  schema_migration_version INT8 NOT NULL,
  created_at TIMESTAMP WITHOUT TIME ZONE DEFAULT (NOW() AT TIME ZONE 'UTC') NOT NULL,
  CONSTRAINT {primary_key} PRIMARY KEY (schema_migration_version)
)"
            ),
            applied_versions: format!(
                "SELECT schema_migration_version FROM {qualified} ORDER BY schema_migration_version"
            ),
            applied_records: format!(
                "SELECT schema_migration_version, created_at FROM {qualified} ORDER BY schema_migration_version"
            ),
            record_applied: format!(
                "INSERT INTO {qualified} (schema_migration_version) VALUES ($1)"
            ),
            remove_applied: format!(
                "DELETE FROM {qualified} WHERE schema_migration_version = $1"
            ),
        }
    }

    /// Catalog lookup, binds `(schema, table)`.
    #[must_use]
    pub fn table_exists(&self) -> &str {
        &self.table_exists
    }

    /// Creates the tracking table.
    #[must_use]
    pub fn create_table(&self) -> &str {
        &self.create_table
    }

    /// Lists applied versions.
    #[must_use]
    pub fn applied_versions(&self) -> &str {
        &self.applied_versions
    }

    /// Lists applied versions with their timestamps.
    #[must_use]
    pub fn applied_records(&self) -> &str {
        &self.applied_records
    }

    /// Inserts a version, binds `(version)`.
    #[must_use]
    pub fn record_applied(&self) -> &str {
        &self.record_applied
    }

    /// Deletes a version, binds `(version)`.
    #[must_use]
    pub fn remove_applied(&self) -> &str {
        &self.remove_applied
    }
}

/// Checks for a database by name, binds `(name)`.
pub const DATABASE_EXISTS: &str = "SELECT EXISTS (
  SELECT 1 FROM pg_catalog.pg_database WHERE lower(datname) = lower($1)
)";

/// `CREATE DATABASE`, with an owner when one is given.
#[must_use]
pub fn create_database(name: &str, owner: Option<&str>) -> String {
    match owner.filter(|o| !o.is_empty()) {
        Some(owner) => format!(
            "CREATE DATABASE {} WITH OWNER = {}",
            quote_identifier(name),
            quote_identifier(owner)
        ),
        None => format!("CREATE DATABASE {}", quote_identifier(name)),
    }
}

/// `DROP DATABASE`.
#[must_use]
pub fn drop_database(name: &str) -> String {
    format!("DROP DATABASE {}", quote_identifier(name))
}
