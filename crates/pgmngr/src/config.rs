//! Configuration loading and defaulting.
//!
//! The configuration is a JSON file (`.pgmngr.json` by default) with two
//! connections, one to the database being migrated and one administrative
//! connection used to create and drop that database.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::error::{PgmngrError, Result};

/// Default number of ping attempts before giving up.
pub const DEFAULT_PING_INTERVALS: u32 = 5;
/// Default database host.
pub const DEFAULT_HOST: &str = "localhost";
/// Default database port.
pub const DEFAULT_PORT: u16 = 5432;
/// Default `sslmode` query parameter.
pub const DEFAULT_SSLMODE: &str = "disable";
/// Default schema of the tracking table.
pub const DEFAULT_TABLE_SCHEMA: &str = "public";
/// Default name of the tracking table.
pub const DEFAULT_TABLE_NAME: &str = "schema_migrations";
/// Default migrations directory.
pub const DEFAULT_DIRECTORY: &str = "migrations";
/// Default database for the administrative connection.
pub const DEFAULT_ADMIN_DATABASE: &str = "template1";

const MASKED_PASSWORD: &str = "****";

/// Full pgmngr configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database connections.
    pub connection: Connections,
    /// Migration files and tracking table.
    pub migration: MigrationConfig,
}

/// The two connections pgmngr uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Connections {
    /// Administrative connection, used for `CREATE/DROP DATABASE`. Its
    /// database is read and written as `template_database`.
    #[serde(with = "admin_keys")]
    pub admin: ConnectionConfig,
    /// Connection to the database being migrated.
    pub migration: ConnectionConfig,
}

/// Parameters for one PostgreSQL connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub username: String,
    pub password: String,
    pub database: String,
    pub host: String,
    pub port: u16,
    /// Extra connection parameters such as `sslmode`.
    pub query_params: BTreeMap<String, String>,
    /// Number of ping attempts before the connection is declared unreachable.
    pub ping_intervals: u32,
}

/// Where migrations live and where their state is recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub directory: PathBuf,
    pub table: TableConfig,
}

/// Location of the tracking table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    pub schema: String,
    pub name: String,
}

impl Config {
    /// Loads a configuration file and fills in defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| PgmngrError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mut config = Self::from_json(&contents).map_err(|e| PgmngrError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.apply_defaults();
        Ok(config)
    }

    /// Parses a configuration without applying defaults.
    pub fn from_json(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Fills every unset field with its default.
    ///
    /// Admin host, port and ping attempts fall back to the migration
    /// connection's values.
    pub fn apply_defaults(&mut self) {
        let migration = &mut self.connection.migration;
        if migration.ping_intervals == 0 {
            migration.ping_intervals = DEFAULT_PING_INTERVALS;
        }
        if migration.host.is_empty() {
            migration.host = DEFAULT_HOST.to_string();
        }
        if migration.port == 0 {
            migration.port = DEFAULT_PORT;
        }
        migration
            .query_params
            .entry("sslmode".to_string())
            .or_insert_with(|| DEFAULT_SSLMODE.to_string());

        let table = &mut self.migration.table;
        if table.schema.is_empty() {
            table.schema = DEFAULT_TABLE_SCHEMA.to_string();
        }
        if table.name.is_empty() {
            table.name = DEFAULT_TABLE_NAME.to_string();
        }
        if self.migration.directory.as_os_str().is_empty() {
            self.migration.directory = PathBuf::from(DEFAULT_DIRECTORY);
        }

        let migration = self.connection.migration.clone();
        let admin = &mut self.connection.admin;
        if admin.ping_intervals == 0 {
            admin.ping_intervals = migration.ping_intervals;
        }
        if admin.host.is_empty() {
            admin.host = migration.host;
        }
        if admin.port == 0 {
            admin.port = migration.port;
        }
        if admin.database.is_empty() {
            admin.database = DEFAULT_ADMIN_DATABASE.to_string();
        }
        admin
            .query_params
            .entry("sslmode".to_string())
            .or_insert_with(|| DEFAULT_SSLMODE.to_string());
    }

    /// Returns a copy with passwords masked, for display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        for connection in [
            &mut config.connection.admin,
            &mut config.connection.migration,
        ] {
            if !connection.password.is_empty() {
                connection.password = MASKED_PASSWORD.to_string();
            }
        }
        config
    }
}

impl ConnectionConfig {
    /// Builds driver connection options from these parameters.
    ///
    /// `sslmode` and `application_name` map to their driver settings; any
    /// other query parameter is sent to the server as a runtime option.
    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .database(&self.database);

        if !self.password.is_empty() {
            options = options.password(&self.password);
        }

        for (name, value) in &self.query_params {
            options = match name.as_str() {
                "sslmode" => {
                    let mode: PgSslMode =
                        value.parse().map_err(|e: sqlx::Error| PgmngrError::InvalidParameter {
                            name: name.clone(),
                            value: value.clone(),
                            reason: e.to_string(),
                        })?;
                    options.ssl_mode(mode)
                }
                "sslrootcert" => options.ssl_root_cert(value.as_str()),
                "application_name" => options.application_name(value),
                _ => options.options([(name.as_str(), value.as_str())]),
            };
        }

        Ok(options)
    }
}

/// Field names of the admin connection, which calls its database
/// `template_database`.
mod admin_keys {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::ConnectionConfig;

    #[derive(Default, Serialize, Deserialize)]
    #[serde(default)]
    struct AdminKeys {
        username: String,
        password: String,
        #[serde(rename = "template_database", alias = "database")]
        database: String,
        host: String,
        port: u16,
        query_params: BTreeMap<String, String>,
        ping_intervals: u32,
    }

    pub fn serialize<S: Serializer>(admin: &ConnectionConfig, serializer: S) -> Result<S::Ok, S::Error> {
        let admin = admin.clone();
        AdminKeys {
            username: admin.username,
            password: admin.password,
            database: admin.database,
            host: admin.host,
            port: admin.port,
            query_params: admin.query_params,
            ping_intervals: admin.ping_intervals,
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ConnectionConfig, D::Error> {
        let keys = AdminKeys::deserialize(deserializer)?;
        Ok(ConnectionConfig {
            username: keys.username,
            password: keys.password,
            database: keys.database,
            host: keys.host,
            port: keys.port,
            query_params: keys.query_params,
            ping_intervals: keys.ping_intervals,
        })
    }
}

impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}/{}", self.username, self.host, self.port, self.database)
    }
}
