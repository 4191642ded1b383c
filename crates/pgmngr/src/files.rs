//! Migration file discovery and creation.
//!
//! Migration files live anywhere below the migrations directory and are named
//! `{version}_{name}[.no_txn].{up|down}.sql`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{PgmngrError, Result};
use crate::version::{Version, parse_version};

/// Contents written to a freshly created forward migration.
pub const UP_PLACEHOLDER: &str = "-- SQL statement for migration goes here.\n";

/// Contents written to a freshly created rollback migration.
pub const DOWN_PLACEHOLDER: &str = "-- SQL statement for reversing/reverting the migration.\n";

const NO_TXN_MARKER: &str = ".no_txn.";

/// Which way a migration file moves the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// `*.up.sql` files.
    Forward,
    /// `*.down.sql` files.
    Rollback,
}

impl Direction {
    /// File name suffix for this direction.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Forward => ".up.sql",
            Self::Rollback => ".down.sql",
        }
    }

    /// Classifies a file name by its suffix.
    #[must_use]
    pub fn of_file(file_name: &str) -> Option<Self> {
        [Self::Forward, Self::Rollback]
            .into_iter()
            .find(|direction| file_name.ends_with(direction.suffix()))
    }
}

/// A migration file discovered on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// Version parsed from the file name.
    pub version: Version,
    /// Descriptive part of the file name (`create_users`).
    pub name: String,
    /// Full path to the file.
    pub path: PathBuf,
    /// Direction derived from the suffix.
    pub direction: Direction,
    /// False when the file name carries the `.no_txn.` marker.
    pub wrap_in_transaction: bool,
}

impl MigrationFile {
    /// Builds a migration file from its path, or `None` when the path is not
    /// a `.sql` file of either direction.
    ///
    /// Every `.sql` file must carry a valid version, even one that matches
    /// neither suffix.
    pub fn from_path(path: &Path) -> Result<Option<Self>> {
        if path.extension().is_none_or(|ext| ext != "sql") {
            return Ok(None);
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(None);
        };

        let version = parse_version(file_name)?;
        let Some(direction) = Direction::of_file(file_name) else {
            debug!(file = %path.display(), "Ignoring .sql file without direction suffix");
            return Ok(None);
        };

        Ok(Some(Self {
            version,
            name: migration_name(file_name),
            path: path.to_path_buf(),
            direction,
            wrap_in_transaction: wrap_in_transaction(file_name),
        }))
    }

    /// Reads the whole script.
    pub fn read_sql(&self) -> Result<String> {
        fs::read_to_string(&self.path).map_err(|e| PgmngrError::io(&self.path, e))
    }
}

/// Migration files of one direction, keyed by version.
pub type MigrationFiles = BTreeMap<Version, MigrationFile>;

/// Returns whether a migration file should run inside a transaction.
#[must_use]
pub fn wrap_in_transaction(file_name: &str) -> bool {
    !file_name.contains(NO_TXN_MARKER)
}

fn migration_name(file_name: &str) -> String {
    let stem = file_name.split('.').next().unwrap_or_default();
    stem.split_once('_')
        .map(|(_, name)| name.to_string())
        .unwrap_or_default()
}

/// Recursively scans `directory` for migration files of `direction`.
///
/// Symbolic links to directories are not followed.
pub fn scan(directory: &Path, direction: Direction) -> Result<MigrationFiles> {
    let mut files = MigrationFiles::new();

    for entry in WalkDir::new(directory).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(directory).to_path_buf();
            PgmngrError::io(path, e.into())
        })?;
        if entry.file_type().is_dir() {
            continue;
        }

        let Some(file) = MigrationFile::from_path(entry.path())? else {
            continue;
        };
        if file.direction != direction {
            continue;
        }
        if let Some(existing) = files.get(&file.version) {
            return Err(PgmngrError::DuplicateVersion {
                version: file.version,
                first: existing.path.clone(),
                second: file.path,
            });
        }
        files.insert(file.version, file);
    }

    debug!(
        directory = %directory.display(),
        ?direction,
        count = files.len(),
        "Scanned migration files"
    );
    Ok(files)
}

/// Creates an empty forward/rollback pair of migration files.
///
/// Returns the paths of the `.up.sql` and `.down.sql` files. If writing the
/// second file fails, the first one is left in place.
pub fn create_new(directory: &Path, name: &str, no_transaction: bool) -> Result<(PathBuf, PathBuf)> {
    create_new_with_version(directory, Version::now(), name, no_transaction)
}

pub(crate) fn create_new_with_version(
    directory: &Path,
    version: Version,
    name: &str,
    no_transaction: bool,
) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(directory).map_err(|e| PgmngrError::io(directory, e))?;

    let mut prefix = format!("{version}_{name}");
    if no_transaction {
        prefix.push_str(".no_txn");
    }

    let up_path = directory.join(format!("{prefix}{}", Direction::Forward.suffix()));
    let down_path = directory.join(format!("{prefix}{}", Direction::Rollback.suffix()));

    fs::write(&up_path, UP_PLACEHOLDER).map_err(|e| PgmngrError::io(&up_path, e))?;
    info!("Created migration file: {}", up_path.display());

    fs::write(&down_path, DOWN_PLACEHOLDER).map_err(|e| PgmngrError::io(&down_path, e))?;
    info!("Created migration file: {}", down_path.display());

    Ok((up_path, down_path))
}
