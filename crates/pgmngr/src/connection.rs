//! Connecting to PostgreSQL and waiting for it to answer.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, warn};

use crate::config::ConnectionConfig;
use crate::error::{PgmngrError, Result};

/// How often and how patiently to ping a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// Pause between two attempts.
    pub delay: Duration,
    /// How long one attempt may wait for a connection.
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    /// `max_attempts` attempts one second apart.
    #[must_use]
    pub const fn fixed(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(5),
        }
    }

    /// `max_attempts` quick attempts with no pause in between.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay: Duration::ZERO,
            attempt_timeout: Duration::from_millis(250),
        }
    }

    /// The policy configured for a connection (`ping_intervals`).
    #[must_use]
    pub const fn for_connection(config: &ConnectionConfig) -> Self {
        Self::fixed(config.ping_intervals)
    }
}

/// Opens a lazily connected pool; nothing touches the network until the
/// first query.
///
/// A refused connection is retried inside the driver until
/// `policy.attempt_timeout` elapses, which bounds a single ping.
pub fn connect(config: &ConnectionConfig, policy: &RetryPolicy) -> Result<PgPool> {
    let options = config.connect_options()?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(policy.attempt_timeout)
        .connect_lazy_with(options);
    debug!(connection = %config, "Opened lazy connection pool");
    Ok(pool)
}

/// Pings the database until it answers or the policy runs out.
pub async fn ping(pool: &PgPool, config: &ConnectionConfig, policy: &RetryPolicy) -> Result<()> {
    let attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match sqlx::query("SELECT 1").execute(pool).await {
            Ok(_) => {
                debug!(connection = %config, attempt, "Database answered ping");
                return Ok(());
            }
            Err(e) => {
                warn!(
                    database = %config.database,
                    host = %config.host,
                    attempt,
                    error = %e,
                    "Ping failed"
                );
                last_error = Some(e);
            }
        }
        if attempt < attempts && !policy.delay.is_zero() {
            tokio::time::sleep(policy.delay).await;
        }
    }

    Err(PgmngrError::Connectivity {
        database: config.database.clone(),
        host: config.host.clone(),
        port: config.port,
        attempts,
        source: last_error.unwrap_or(sqlx::Error::PoolTimedOut),
    })
}

/// Connects and waits for the database using its configured policy.
pub async fn connect_and_ping(config: &ConnectionConfig) -> Result<PgPool> {
    connect_and_ping_with(config, &RetryPolicy::for_connection(config)).await
}

/// Connects and waits for the database using an explicit policy.
pub async fn connect_and_ping_with(
    config: &ConnectionConfig,
    policy: &RetryPolicy,
) -> Result<PgPool> {
    let pool = connect(config, policy)?;
    ping(&pool, config, policy).await?;
    Ok(pool)
}
