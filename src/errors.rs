//! Error types for the gnm-collector crate.
//!
//! This module provides specialized error types for each component, mirroring
//! the error taxonomy of spec §7:
//! - [`ConfigError`] - FatalConfig: missing/malformed config, unresolvable references
//! - [`CheckError`] - Failures during an individual probe
//! - [`StoreError`] - TransientDatastore / FatalDatastore failures in the writer
//! - [`RunError`] - Top-level errors surfaced by the collector binary
//!
//! All error types implement the standard Error trait and provide detailed error information.
//!
//! # Examples
//!
//! ```rust,no_run
//! use gnm_collector::config::Snapshot;
//! use gnm_collector::errors::ConfigError;
//!
//! fn load(dir: &str) -> Result<Snapshot, ConfigError> {
//!     Snapshot::load(dir)
//! }
//! ```

use thiserror::Error;

/// Errors that abort startup because the configuration is unusable.
///
/// Any variant here corresponds to spec §7's `FatalConfig`: the process logs
/// at `CRITICAL` and exits with status 1.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An I/O error occurred while reading a config artifact.
    #[error("could not read {path}: {source}")]
    Io {
        /// Path that could not be read.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// A config artifact could not be parsed as TOML.
    #[error("could not parse {path}: {source}")]
    Parse {
        /// Path that failed to parse.
        path: String,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },
    /// A service references a `host_id` that does not exist in the host catalog.
    #[error("service '{service_id}' references unknown host_id '{host_id}'")]
    UnknownHost {
        /// The offending service.
        service_id: String,
        /// The missing host id.
        host_id: String,
    },
    /// Two or more services share the same `service_id`.
    #[error("duplicate service_id '{0}'")]
    DuplicateServiceId(String),
    /// A service is missing a parameter required by its check type.
    #[error("service '{service_id}' (type {check_type}) is missing required param '{param}'")]
    MissingParam {
        /// The offending service.
        service_id: String,
        /// The check type of the offending service.
        check_type: String,
        /// The missing parameter name.
        param: String,
    },
    /// A service's params included a field not recognized for its check type, or failed
    /// to parse into that type's expected shape.
    #[error("service '{service_id}' has invalid params: {source}")]
    InvalidParams {
        /// The offending service.
        service_id: String,
        /// Underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },
    /// A numeric config field was zero or negative where a positive value is required.
    #[error("config field '{field}' must be positive, got {value}")]
    NotPositive {
        /// Name of the offending field.
        field: String,
        /// The rejected value.
        value: i64,
    },
    /// The ssl_cert check type could not determine a host to connect to.
    #[error("service '{0}' has type ssl_cert but no host address is derivable")]
    UndeterminedSslHost(String),
}

/// Errors that can occur during an individual network check.
///
/// These are component-local; the scheduler converts all of them into a
/// [`CheckResult`](crate::records::CheckResult) rather than letting them
/// propagate, per spec §7's propagation policy.
#[derive(Error, Debug)]
pub enum CheckError {
    /// The probe did not complete within its configured timeout.
    #[error("check timed out")]
    Timeout,
    /// An I/O error occurred during the probe (refused, unreachable, etc).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The ICMP probe failed.
    #[error("ping error: {0}")]
    Ping(String),
    /// The HTTP request failed at the transport level.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// DNS resolution failed.
    #[error("dns error: {0}")]
    Dns(#[from] hickory_resolver::error::ResolveError),
    /// The TLS handshake failed.
    #[error("tls error: {0}")]
    Tls(String),
    /// The leaf certificate could not be parsed.
    #[error("certificate parse error: {0}")]
    CertParse(String),
    /// The response body could not be parsed as JSON.
    #[error("json parse error: {0}")]
    Json(#[from] serde_json::Error),
    /// A `json_api` check's expectation was not met.
    #[error("expectation not met: {0}")]
    ExpectationFailed(String),
    /// An unexpected error occurred inside a probe implementation.
    #[error("internal probe error: {0}")]
    Internal(String),
}

/// Errors that can occur while appending to the datastore.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The connection pool could not be constructed at startup.
    #[error("could not build the connection pool: {0}")]
    PoolInit(#[source] sqlx::Error),
    /// A single insert failed after exhausting its retry budget.
    #[error("insert failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Last error observed.
        #[source]
        source: sqlx::Error,
    },
    /// A non-retryable error (schema mismatch, auth failure) was returned by the database.
    #[error("non-retryable datastore error: {0}")]
    NonRetryable(#[source] sqlx::Error),
}

/// Top-level errors surfaced by the collector binary.
#[derive(Error, Debug)]
pub enum RunError {
    /// Startup configuration could not be loaded or validated.
    #[error("fatal configuration error: {0}")]
    Config(#[from] ConfigError),
    /// The datastore became unavailable for too many consecutive cycles.
    #[error("fatal datastore error: {0}")]
    Datastore(#[from] StoreError),
    /// An I/O error occurred outside of a specific check or the store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
