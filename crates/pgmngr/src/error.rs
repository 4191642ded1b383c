//! Error types for pgmngr.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value, json};

use crate::version::Version;

/// Errors that can occur while managing migrations or databases.
#[derive(Debug, thiserror::Error)]
pub enum PgmngrError {
    /// Reading, writing or walking migration files failed.
    #[error("IO error on '{}': {source}", path.display())]
    Io {
        /// The file or directory involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A migration file name does not start with a usable version.
    #[error("Invalid version in migration file '{file}': {reason}")]
    InvalidVersion {
        /// Base name of the offending file.
        file: String,
        /// Why the version token was rejected.
        reason: String,
    },

    /// Two migration files of the same direction share a version.
    #[error(
        "Duplicate migration version {version}: '{}' and '{}'",
        first.display(),
        second.display()
    )]
    DuplicateVersion {
        /// The shared version.
        version: Version,
        /// The file found first.
        first: PathBuf,
        /// The file found second.
        second: PathBuf,
    },

    /// The database could not be reached within the retry budget.
    #[error(
        "failed to ping the database: {database} on host: {host}:{port} after {attempts} attempts: {source}"
    )]
    Connectivity {
        /// Database name.
        database: String,
        /// Server host.
        host: String,
        /// Server port.
        port: u16,
        /// How many pings were attempted.
        attempts: u32,
        /// The last ping error.
        #[source]
        source: sqlx::Error,
    },

    /// A migration script or a DDL/ledger statement failed.
    #[error("SQL error while {context}: {source}")]
    Sql {
        /// What was being done when the statement failed.
        context: String,
        /// The driver error.
        #[source]
        source: sqlx::Error,
    },

    /// The database to create already exists.
    #[error("database: {0} already exists")]
    AlreadyExists(String),

    /// The database to drop does not exist.
    #[error("database: {0} does not exist")]
    DoesNotExist(String),

    /// A rollback tried to remove a version the ledger does not hold.
    #[error("Migration version {0} is not recorded as applied")]
    NotApplied(Version),

    /// The configuration file is missing or malformed.
    #[error("Invalid configuration '{}': {reason}", path.display())]
    Config {
        /// Path of the configuration file.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// A connection query parameter has a value the driver rejects.
    #[error("Invalid connection parameter {name}={value}: {reason}")]
    InvalidParameter {
        /// Parameter name, e.g. `sslmode`.
        name: String,
        /// Rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PgmngrError {
    /// Wraps an IO error with the path it concerns.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Wraps a driver error with the operation that produced it.
    pub fn sql(context: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Sql {
            context: context.into(),
            source,
        }
    }

    /// Returns the structured fields of this error, for the CLI detail dump.
    #[must_use]
    pub fn details(&self) -> Value {
        let mut details = Map::new();
        details.insert("message".into(), json!(self.to_string()));
        match self {
            Self::Io { path, source } => {
                details.insert("kind".into(), json!("io"));
                details.insert("path".into(), json!(path.display().to_string()));
                details.insert("io_error".into(), json!(source.kind().to_string()));
            }
            Self::InvalidVersion { file, reason } => {
                details.insert("kind".into(), json!("invalid_version"));
                details.insert("file".into(), json!(file));
                details.insert("reason".into(), json!(reason));
            }
            Self::DuplicateVersion {
                version,
                first,
                second,
            } => {
                details.insert("kind".into(), json!("duplicate_version"));
                details.insert("version".into(), json!(version.as_i64()));
                details.insert(
                    "files".into(),
                    json!([first.display().to_string(), second.display().to_string()]),
                );
            }
            Self::Connectivity {
                database,
                host,
                port,
                attempts,
                ..
            } => {
                details.insert("kind".into(), json!("connectivity"));
                details.insert("database".into(), json!(database));
                details.insert("host".into(), json!(host));
                details.insert("port".into(), json!(port));
                details.insert("attempts".into(), json!(attempts));
            }
            Self::Sql { context, source } => {
                details.insert("kind".into(), json!("sql"));
                details.insert("context".into(), json!(context));
                if let Some(db_error) = source.as_database_error() {
                    if let Some(code) = db_error.code() {
                        details.insert("sqlstate".into(), json!(code));
                    }
                    details.insert("database_message".into(), json!(db_error.message()));
                }
            }
            Self::AlreadyExists(database) => {
                details.insert("kind".into(), json!("already_exists"));
                details.insert("database".into(), json!(database));
            }
            Self::DoesNotExist(database) => {
                details.insert("kind".into(), json!("does_not_exist"));
                details.insert("database".into(), json!(database));
            }
            Self::NotApplied(version) => {
                details.insert("kind".into(), json!("not_applied"));
                details.insert("version".into(), json!(version.as_i64()));
            }
            Self::Config { path, reason } => {
                details.insert("kind".into(), json!("config"));
                details.insert("path".into(), json!(path.display().to_string()));
                details.insert("reason".into(), json!(reason));
            }
            Self::InvalidParameter { name, value, .. } => {
                details.insert("kind".into(), json!("invalid_parameter"));
                details.insert("name".into(), json!(name));
                details.insert("value".into(), json!(value));
            }
            Self::Serialization(_) => {
                details.insert("kind".into(), json!("serialization"));
            }
        }
        Value::Object(details)
    }
}

/// Result type for pgmngr operations.
pub type Result<T> = std::result::Result<T, PgmngrError>;
