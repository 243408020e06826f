//! Datastore Writer (spec §4.5): a pooled, retrying, append-only writer for
//! [`Measurement`] rows.
//!
//! One `measurements` table receives one row per executed check. The pool is
//! opened once at startup through [`Store::connect`]; inserts never
//! interpolate config values into SQL strings (host/port/user/password come
//! through [`sqlx::postgres::PgConnectOptions`], parameters through bind
//! calls) to keep injection out of the picture entirely.

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use crate::config::DbConfig;
use crate::errors::StoreError;
use crate::records::Measurement;
use crate::retry::{with_backoff, RetryPolicy};

/// A pooled connection to the telemetry database.
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Opens the connection pool, mapping the three pool-sizing knobs from
    /// [`DbConfig`] onto `sqlx`'s pool options (see DESIGN.md for the
    /// `pool_maxcached` → `idle_timeout` mapping rationale).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PoolInit`] if the pool cannot be constructed
    /// (unreachable host, bad credentials at connect time, etc).
    pub async fn connect(config: &DbConfig) -> Result<Self, StoreError> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        let idle_timeout = std::time::Duration::from_secs(config.pool_maxcached.max(1) as u64 * 30);

        let pool = PgPoolOptions::new()
            .min_connections(config.pool_mincached)
            .max_connections(config.pool_maxconnections)
            .idle_timeout(idle_timeout)
            .connect_with(options)
            .await
            .map_err(StoreError::PoolInit)?;

        Ok(Self { pool })
    }

    /// Appends `measurement` to the `measurements` table, retrying
    /// transient errors (connection drops, pool timeouts) with
    /// [`RetryPolicy::datastore`]. Schema or authentication errors are not
    /// retried and propagate immediately.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RetriesExhausted`] if every retry attempt
    /// failed, or [`StoreError::NonRetryable`] if the database returned an
    /// error that retrying cannot fix.
    pub async fn insert_measurement(&self, measurement: &Measurement) -> Result<(), StoreError> {
        let policy = RetryPolicy::datastore();
        let mut attempts = 0u32;

        let result = with_backoff(
            &policy,
            || {
                attempts += 1;
                insert_once(&self.pool, measurement)
            },
            is_retryable,
        )
        .await;

        result.map_err(|source| {
            if is_retryable(&source) {
                StoreError::RetriesExhausted { attempts, source }
            } else {
                StoreError::NonRetryable(source)
            }
        })
    }
}

async fn insert_once(pool: &PgPool, measurement: &Measurement) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO measurements \
         (ts, region, project_id, target_id, host_id, check_type, status, latency_ms, meta) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(measurement.ts)
    .bind(&measurement.region)
    .bind(measurement.project_id)
    .bind(&measurement.target_id)
    .bind(&measurement.host_id)
    .bind(measurement.check_type.to_string())
    .bind(measurement.status.as_i16())
    .bind(measurement.latency_ms)
    .bind(&measurement.meta_json)
    .execute(pool)
    .await
    .map(|_| ())
}

/// Whether `error` represents a transient condition worth retrying:
/// connection-level I/O failures and pool-acquire timeouts, but not schema
/// mismatches, constraint violations, or authentication failures.
fn is_retryable(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
    )
}

/// Counts consecutive fully-failed cycles (every insert in a cycle exhausted
/// its retries, or the pool could not be used at all). Owned by the
/// scheduler; when this reaches [`crate::MAX_FAILED_CYCLES`] the process
/// exits with a fatal datastore error (spec §4.5).
#[derive(Debug, Default)]
pub struct FailedCycleCounter {
    consecutive: u32,
}

impl FailedCycleCounter {
    /// Creates a counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a cycle where every insert failed. Returns `true` once the
    /// counter reaches [`crate::MAX_FAILED_CYCLES`].
    pub fn record_failure(&mut self) -> bool {
        self.consecutive += 1;
        self.consecutive >= crate::MAX_FAILED_CYCLES
    }

    /// Records a cycle where at least one insert succeeded, resetting the
    /// streak.
    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// The current consecutive-failure count.
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_and_pool_errors_are_retryable() {
        assert!(is_retryable(&sqlx::Error::PoolTimedOut));
        assert!(is_retryable(&sqlx::Error::PoolClosed));
    }

    #[test]
    fn counter_trips_after_max_failed_cycles() {
        let mut counter = FailedCycleCounter::new();
        for _ in 0..crate::MAX_FAILED_CYCLES - 1 {
            assert!(!counter.record_failure());
        }
        assert!(counter.record_failure());
    }

    #[test]
    fn a_success_resets_the_streak() {
        let mut counter = FailedCycleCounter::new();
        counter.record_failure();
        counter.record_failure();
        counter.record_success();
        assert_eq!(counter.consecutive(), 0);
    }
}
