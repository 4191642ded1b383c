//! Migration versions.
//!
//! A version is the Unix timestamp (in seconds) taken when the migration was
//! created. It is both the identity of a migration and its sort key.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::{PgmngrError, Result};

/// A migration version (Unix seconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(i64);

impl Version {
    /// Wraps a raw version number.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the current Unix time as a version.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    /// Returns the raw number stored in the tracking table.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parses the version out of a migration file base name.
///
/// The version is the first `_`-separated token of the first `.`-separated
/// token, e.g. `1577836800` for `1577836800_create_users.no_txn.up.sql`.
/// The number is normalized through an RFC 3339 round trip so that values
/// `chrono` cannot represent as a timestamp are rejected.
pub fn parse_version(file_name: &str) -> Result<Version> {
    let stem = file_name.split('.').next().unwrap_or_default();
    let token = stem.split('_').next().unwrap_or_default();

    let invalid = |reason: String| PgmngrError::InvalidVersion {
        file: file_name.to_string(),
        reason,
    };

    let seconds: i64 = token
        .parse()
        .map_err(|e: std::num::ParseIntError| invalid(format!("'{token}': {e}")))?;

    let timestamp = DateTime::<Utc>::from_timestamp(seconds, 0)
        .ok_or_else(|| invalid(format!("{seconds} is out of range for a timestamp")))?;
    let normalized = DateTime::parse_from_rfc3339(&timestamp.to_rfc3339())
        .map_err(|e| invalid(format!("{seconds} does not survive RFC 3339: {e}")))?;

    Ok(Version(normalized.timestamp()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forward_file() {
        let version = parse_version("1577836800_create_users.up.sql").unwrap();
        assert_eq!(version, Version::new(1_577_836_800));
    }

    #[test]
    fn test_parse_no_txn_and_down_files() {
        assert_eq!(
            parse_version("1000_add_index.no_txn.up.sql").unwrap(),
            Version::new(1000)
        );
        assert_eq!(
            parse_version("2000_create_orders.down.sql").unwrap(),
            Version::new(2000)
        );
    }

    #[test]
    fn test_parse_version_without_name() {
        assert_eq!(parse_version("42.up.sql").unwrap(), Version::new(42));
    }

    #[test]
    fn test_parse_round_trips_many_timestamps() {
        for seconds in [0_i64, 1, 999, 1_262_304_000, 1_700_000_000, 4_102_444_800] {
            let file = format!("{seconds}_migration.up.sql");
            assert_eq!(parse_version(&file).unwrap().as_i64(), seconds);
        }
    }

    #[test]
    fn test_parse_rejects_non_numeric_token() {
        let err = parse_version("create_users.up.sql").unwrap_err();
        assert!(matches!(err, PgmngrError::InvalidVersion { ref file, .. } if file == "create_users.up.sql"));
    }

    #[test]
    fn test_parse_rejects_empty_token() {
        assert!(parse_version("_users.up.sql").is_err());
        assert!(parse_version("").is_err());
    }

    #[test]
    fn test_parse_rejects_out_of_range_timestamp() {
        let err = parse_version(&format!("{}_far_future.up.sql", i64::MAX)).unwrap_err();
        assert!(matches!(err, PgmngrError::InvalidVersion { .. }));
    }

    #[test]
    fn test_versions_order_numerically() {
        let mut versions = vec![Version::new(20), Version::new(3), Version::new(100)];
        versions.sort();
        assert_eq!(
            versions,
            vec![Version::new(3), Version::new(20), Version::new(100)]
        );
    }

    #[test]
    fn test_now_is_parseable() {
        let now = Version::now();
        let file = format!("{now}_something.up.sql");
        assert_eq!(parse_version(&file).unwrap(), now);
    }
}
