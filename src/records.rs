//! Core types for representing declared targets, check outcomes, and the
//! persisted telemetry record. Mirrors spec §3's data model.
//!
//! - [`ServiceSpec`] / [`HostSpec`] - declared targets from the catalogs
//! - [`CheckParams`] - check-type-specific params, deserialized into a
//!   tagged variant per spec §9's design note rather than an open map
//! - [`ProbeIdentity`] - the probing vantage point, resolved once at startup
//! - [`RawStatus`] / [`CheckResult`] - what a probe hands back to the scheduler
//! - [`Status`] / [`Measurement`] - what actually gets persisted

use std::collections::BTreeMap;
use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ConfigError;

/// The six check types a [`ServiceSpec`] can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    /// ICMP echo.
    Ping,
    /// HTTP(S) GET.
    Http,
    /// DNS resolution.
    Dns,
    /// TCP connect.
    Tcp,
    /// TLS handshake + certificate inspection.
    SslCert,
    /// HTTP GET with JSON body validation.
    JsonApi,
}

impl CheckType {
    /// Returns a slice containing all check types, in catalog-declaration order.
    pub const fn all() -> &'static [Self] {
        &[
            Self::Ping,
            Self::Http,
            Self::Dns,
            Self::Tcp,
            Self::SslCert,
            Self::JsonApi,
        ]
    }
}

impl Display for CheckType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Ping => "ping",
                Self::Http => "http",
                Self::Dns => "dns",
                Self::Tcp => "tcp",
                Self::SslCert => "ssl_cert",
                Self::JsonApi => "json_api",
            }
        )
    }
}

/// DNS record types supported by the `dns` check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    /// IPv4 address record (default).
    #[default]
    A,
    /// IPv6 address record.
    Aaaa,
    /// Canonical name record.
    Cname,
    /// Mail exchange record.
    Mx,
    /// Text record.
    Txt,
}

/// Params for the `http` check.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HttpParams {
    /// The URL to GET.
    pub url: String,
}

/// Params for the `tcp` check.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TcpParams {
    /// The TCP port to connect to.
    pub port: u16,
}

/// Params for the `dns` check.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DnsParams {
    /// Record type to query. Defaults to `A`.
    #[serde(default)]
    pub record: RecordType,
    /// Name to resolve. Defaults to the service's host address.
    #[serde(default)]
    pub name: Option<String>,
}

/// Params for the `ssl_cert` check.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SslCertParams {
    /// Port to connect to. Defaults to 443.
    #[serde(default)]
    pub port: Option<u16>,
}

/// Params for the `json_api` check.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct JsonApiParams {
    /// The URL to GET.
    pub url: String,
    /// A `/`-separated JSON pointer path that must be present in the response body.
    #[serde(default)]
    pub expect_field: Option<String>,
    /// A value that `expect_field` (or the document root, if absent) must equal.
    #[serde(default)]
    pub expect_equals: Option<Value>,
}

/// The check-type-specific params of a [`ServiceSpec`], resolved from its raw
/// `params` map into a closed, validated tagged variant (spec §9).
#[derive(Debug, Clone)]
pub enum CheckParams {
    /// No params required.
    Ping,
    /// See [`HttpParams`].
    Http(HttpParams),
    /// See [`DnsParams`].
    Dns(DnsParams),
    /// See [`TcpParams`].
    Tcp(TcpParams),
    /// See [`SslCertParams`].
    SslCert(SslCertParams),
    /// See [`JsonApiParams`].
    JsonApi(JsonApiParams),
}

/// A declared host in the host catalog.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostSpec {
    /// Stable identifier referenced by [`ServiceSpec::host_id`].
    pub host_id: String,
    /// Hostname or IP address. Resolved per check; never cached across cycles.
    pub address: String,
}

/// A declared service in the service catalog.
///
/// Immutable once part of a [`Snapshot`](crate::config::Snapshot); one
/// measurement is produced per enabled `ServiceSpec` per cycle.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceSpec {
    /// Unique stable identifier; becomes [`Measurement::target_id`].
    pub service_id: String,
    /// Reference into the host catalog.
    #[serde(default)]
    pub host_id: Option<String>,
    /// Which of the six check types to run.
    #[serde(rename = "type")]
    pub check_type: CheckType,
    /// Whether this service is currently probed. Defaults to `true`.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Optional grouping tag.
    #[serde(default)]
    pub project_id: Option<i64>,
    /// Check-type-specific options, validated lazily via [`ServiceSpec::parsed_params`].
    #[serde(default)]
    pub params: Value,
}

fn default_true() -> bool {
    true
}

impl ServiceSpec {
    /// Deserializes [`ServiceSpec::params`] into the [`CheckParams`] variant
    /// matching [`ServiceSpec::check_type`], rejecting unrecognized fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingParam`] if a required field is absent,
    /// or [`ConfigError::InvalidParams`] if an unknown field is present or a
    /// field has the wrong shape.
    pub fn parsed_params(&self) -> Result<CheckParams, ConfigError> {
        fn parse<T: for<'de> Deserialize<'de>>(v: &Value) -> Result<T, serde_json::Error> {
            serde_json::from_value(v.clone())
        }
        match self.check_type {
            CheckType::Ping => Ok(CheckParams::Ping),
            CheckType::Http => parse::<HttpParams>(&self.params)
                .map(CheckParams::Http)
                .map_err(|source| self.param_error(source, "url")),
            CheckType::Tcp => parse::<TcpParams>(&self.params)
                .map(CheckParams::Tcp)
                .map_err(|source| self.param_error(source, "port")),
            CheckType::Dns => parse::<DnsParams>(&self.params)
                .map(CheckParams::Dns)
                .map_err(|source| self.param_error(source, "record")),
            CheckType::SslCert => parse::<SslCertParams>(&self.params)
                .map(CheckParams::SslCert)
                .map_err(|source| self.param_error(source, "port")),
            CheckType::JsonApi => parse::<JsonApiParams>(&self.params)
                .map(CheckParams::JsonApi)
                .map_err(|source| self.param_error(source, "url")),
        }
    }

    fn param_error(&self, source: serde_json::Error, required: &str) -> ConfigError {
        if self.params.get(required).is_none() && matches!(self.params, Value::Object(_) | Value::Null) {
            ConfigError::MissingParam {
                service_id: self.service_id.clone(),
                check_type: self.check_type.to_string(),
                param: required.to_string(),
            }
        } else {
            ConfigError::InvalidParams {
                service_id: self.service_id.clone(),
                source,
            }
        }
    }
}

/// How a [`ProbeIdentity`] was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    /// Resolved from environment variables.
    Env,
    /// Resolved via a geo-IP HTTP lookup.
    Geo,
    /// Fell back to the main config's region.
    Config,
}

impl Display for IdentitySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Env => "env",
                Self::Geo => "geo",
                Self::Config => "config",
            }
        )
    }
}

/// The probing vantage point, resolved once at startup and reused for every
/// [`Measurement`] in the process's lifetime.
#[derive(Debug, Clone, Default)]
pub struct ProbeIdentity {
    /// Region identifier distinguishing concurrent collectors.
    pub region: String,
    /// ISO country code or name, if known.
    pub country: String,
    /// City, if known.
    pub city: String,
    /// The collector's public IP, if known.
    pub public_ip: String,
    /// Which resolution path produced this identity.
    pub source: Option<IdentitySource>,
}

impl ProbeIdentity {
    /// Returns the five `probe_*` fields required in every [`Measurement::meta_json`].
    pub fn meta_fields(&self) -> BTreeMap<String, Value> {
        let mut m = BTreeMap::new();
        m.insert("probe_region".to_string(), Value::String(self.region.clone()));
        m.insert("probe_country".to_string(), Value::String(self.country.clone()));
        m.insert("probe_city".to_string(), Value::String(self.city.clone()));
        m.insert(
            "probe_public_ip".to_string(),
            Value::String(self.public_ip.clone()),
        );
        m.insert(
            "probe_source".to_string(),
            Value::String(self.source.map(|s| s.to_string()).unwrap_or_default()),
        );
        m
    }
}

/// The raw outcome a probe observed, before streak-based classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawStatus {
    /// The check succeeded within normal latency bounds.
    Ok,
    /// The check succeeded but was slow, or returned a soft-failure condition
    /// (e.g. an HTTP 4xx, or a certificate nearing expiry).
    Degraded,
    /// An unambiguous down signal: refused, timeout, resolution failure, or
    /// handshake failure.
    HardFailure,
}

/// What a single probe execution hands back to the scheduler.
///
/// Transient; never persisted directly. The [`classifier`](crate::classifier)
/// turns this into a [`Measurement`].
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// The raw classification the probe observed.
    pub raw_status: RawStatus,
    /// Wall time spent inside the probe boundary, in milliseconds. Never
    /// includes queuing or classification overhead.
    pub latency_ms: u32,
    /// Check-type-specific metadata (e.g. `http_status`, `days_until_expiry`).
    pub meta: BTreeMap<String, Value>,
    /// When `true` and `raw_status` is [`RawStatus::HardFailure`], the
    /// classifier persists CRIT immediately regardless of the streak counter
    /// (spec §4.3: an already-expired certificate is not a transient).
    pub bypass_two_strike: bool,
}

impl CheckResult {
    /// Builds an OK result with the given latency.
    pub fn ok(latency_ms: u32) -> Self {
        Self {
            raw_status: RawStatus::Ok,
            latency_ms,
            meta: BTreeMap::new(),
            bypass_two_strike: false,
        }
    }

    /// Builds a degraded (WARN) result.
    pub fn degraded(latency_ms: u32) -> Self {
        Self {
            raw_status: RawStatus::Degraded,
            latency_ms,
            meta: BTreeMap::new(),
            bypass_two_strike: false,
        }
    }

    /// Builds a hard-failure result with `latency_ms` set to 0 (no successful
    /// probe boundary was measured).
    pub fn hard_failure() -> Self {
        Self {
            raw_status: RawStatus::HardFailure,
            latency_ms: 0,
            meta: BTreeMap::new(),
            bypass_two_strike: false,
        }
    }

    /// Attaches a metadata field, builder-style.
    #[must_use]
    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }

    /// Marks this result as bypassing the two-strike rule, builder-style.
    #[must_use]
    pub fn bypassing_two_strike(mut self) -> Self {
        self.bypass_two_strike = true;
        self
    }
}

/// The persisted status of a [`Measurement`], after streak-based classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    /// Healthy.
    Ok = 0,
    /// Degraded, or a first-strike hard failure.
    Warn = 1,
    /// Confirmed down (second consecutive hard failure, or an already-expired certificate).
    Crit = 2,
}

impl Status {
    /// The `status` column value persisted to the datastore.
    pub const fn as_i16(self) -> i16 {
        self as u8 as i16
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Ok => "OK",
                Self::Warn => "WARN",
                Self::Crit => "CRIT",
            }
        )
    }
}

/// The immutable telemetry record persisted per probe execution (spec §3).
#[derive(Debug, Clone)]
pub struct Measurement {
    /// UTC wall-clock at check start.
    pub ts: DateTime<Utc>,
    /// The probing vantage point's region tag.
    pub region: String,
    /// Optional grouping tag, copied from the [`ServiceSpec`].
    pub project_id: Option<i64>,
    /// The checked service's `service_id`.
    pub target_id: String,
    /// The checked service's `host_id`, if any.
    pub host_id: Option<String>,
    /// Which check type produced this row.
    pub check_type: CheckType,
    /// The persisted status.
    pub status: Status,
    /// Latency observed inside the probe boundary, in milliseconds.
    pub latency_ms: i32,
    /// Metadata, always including the five `probe_*` identity fields plus
    /// any check-type-specific fields. `None` only if serialization somehow
    /// produces an empty document, which should not occur in practice.
    pub meta_json: Option<Value>,
}
