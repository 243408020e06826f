//! Config Loader: parses and validates the three on-disk config artifacts
//! (main config, host catalog, service catalog) into an immutable
//! [`Snapshot`]. Mirrors spec §4.1.
//!
//! Hot reload is explicitly not supported: a `Snapshot` is loaded once at
//! startup and handed to the [`scheduler`](crate::scheduler) for the life
//! of the process.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::errors::ConfigError;
use crate::records::{CheckType, HostSpec, ServiceSpec};

/// `[region]` table of the main config.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionConfig {
    /// Used by the identity resolver when neither env vars nor the geo-IP
    /// lookup produce a region.
    pub fallback_region: String,
    /// HTTP endpoint the identity resolver queries for geo-IP fallback.
    #[serde(default = "default_geo_endpoint")]
    pub geo_endpoint: String,
}

fn default_geo_endpoint() -> String {
    "https://ipapi.co/json/".to_string()
}

/// `[db]` table of the main config.
#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    /// Postgres host.
    pub host: String,
    /// Postgres port.
    #[serde(default = "default_db_port")]
    pub port: u16,
    /// Postgres user.
    pub user: String,
    /// Postgres password.
    pub password: String,
    /// Database name.
    pub database: String,
    /// Mapped onto `PgPoolOptions::min_connections`.
    pub pool_mincached: u32,
    /// Mapped onto an idle-connection timeout (sqlx has no literal "max
    /// cached" knob; see DESIGN.md).
    pub pool_maxcached: u32,
    /// Mapped onto `PgPoolOptions::max_connections`.
    pub pool_maxconnections: u32,
}

fn default_db_port() -> u16 {
    5432
}

/// Per-check-type timeout budgets, in seconds. Each is the wall-clock bound
/// the scheduler wraps the probe in via `tokio::time::timeout`.
#[derive(Debug, Clone, Deserialize)]
pub struct Timeouts {
    /// `ping` check timeout.
    pub ping_timeout_sec: u64,
    /// `http` check timeout.
    pub http_timeout_sec: u64,
    /// `dns` check timeout.
    pub dns_timeout_sec: u64,
    /// `tcp` check timeout.
    pub tcp_timeout_sec: u64,
    /// `json_api` check timeout.
    pub json_timeout_sec: u64,
    /// `ssl_cert` check timeout (connect + handshake).
    #[serde(default = "default_ssl_timeout")]
    pub ssl_cert_timeout_sec: u64,
}

fn default_ssl_timeout() -> u64 {
    10
}

impl Timeouts {
    /// The wall-clock budget for `check_type`, used by the scheduler as the
    /// outer [`tokio::time::timeout`] wrapped around every probe.
    pub fn for_check_type(&self, check_type: crate::records::CheckType) -> std::time::Duration {
        use crate::records::CheckType;
        let secs = match check_type {
            CheckType::Ping => self.ping_timeout_sec,
            CheckType::Http => self.http_timeout_sec,
            CheckType::Dns => self.dns_timeout_sec,
            CheckType::Tcp => self.tcp_timeout_sec,
            CheckType::SslCert => self.ssl_cert_timeout_sec,
            CheckType::JsonApi => self.json_timeout_sec,
        };
        std::time::Duration::from_secs(secs.max(1))
    }
}

/// Per-check-type latency thresholds used by the classifier to distinguish
/// OK from a degraded (but still successful) probe.
#[derive(Debug, Clone, Deserialize)]
pub struct Thresholds {
    /// `ping` WARN latency floor, in ms.
    pub ping_warn_ms: u32,
    /// `ping` latency above which a successful probe is still degraded.
    pub ping_very_slow_ms: u32,
    /// `http` WARN latency floor, in ms.
    pub http_warn_ms: u32,
    /// `http` very-slow latency floor, in ms.
    pub http_very_slow_ms: u32,
    /// `dns` WARN latency floor, in ms.
    pub dns_warn_ms: u32,
    /// `tcp` WARN latency floor, in ms.
    pub tcp_warn_ms: u32,
    /// `tcp` very-slow latency floor, in ms.
    pub tcp_very_slow_ms: u32,
    /// `json_api` WARN latency floor, in ms.
    pub json_warn_ms: u32,
    /// `json_api` very-slow latency floor, in ms.
    pub json_very_slow_ms: u32,
    /// Days before expiry at which `ssl_cert` reports degraded instead of OK.
    #[serde(default = "default_ssl_warn_days")]
    pub ssl_cert_warn_days: u32,
}

fn default_ssl_warn_days() -> u32 {
    14
}

/// `[collector]` table of the main config.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    /// Seconds between the start of one cycle and the next.
    pub interval_sec: u64,
    /// Upper bound on concurrently in-flight probes.
    pub max_workers: usize,
    /// Per-check-type timeout budgets.
    pub timeouts: Timeouts,
    /// Per-check-type latency thresholds.
    pub thresholds: Thresholds,
}

/// The top-level `config.toml` artifact.
#[derive(Debug, Clone, Deserialize)]
pub struct MainConfig {
    /// `[region]` table.
    pub region: RegionConfig,
    /// `[db]` table.
    pub db: DbConfig,
    /// `[collector]` table.
    pub collector: CollectorConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct HostCatalog {
    #[serde(default, rename = "host")]
    host: Vec<HostSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ServiceCatalog {
    #[serde(default, rename = "service")]
    service: Vec<ServiceSpec>,
}

/// The fully loaded and validated configuration for one process lifetime.
///
/// Built once by [`Snapshot::load`] and then handed around by shared
/// reference; there is deliberately no reload method.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Parsed `config.toml`.
    pub main: MainConfig,
    /// Parsed `hosts.toml`, as a flat list.
    pub hosts: Vec<HostSpec>,
    /// Parsed `services.toml`, as a flat list.
    pub services: Vec<ServiceSpec>,
}

impl Snapshot {
    /// Loads `config.toml`, `hosts.toml` and `services.toml` from `dir` and
    /// validates the result.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any artifact is missing, malformed, or
    /// fails validation (duplicate service ids, dangling host references,
    /// missing or malformed check params, non-positive numeric fields).
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let main: MainConfig = read_toml(&dir.join("config.toml"))?;
        let hosts: HostCatalog = read_toml(&dir.join("hosts.toml"))?;
        let services: ServiceCatalog = read_toml(&dir.join("services.toml"))?;

        let snapshot = Self {
            main,
            hosts: hosts.host,
            services: services.service,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Looks up a declared host by id.
    pub fn host_for(&self, host_id: &str) -> Option<&HostSpec> {
        self.hosts.iter().find(|h| h.host_id == host_id)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let host_ids: HashSet<&str> = self.hosts.iter().map(|h| h.host_id.as_str()).collect();
        let mut seen_service_ids = HashSet::new();

        for service in &self.services {
            if !seen_service_ids.insert(service.service_id.as_str()) {
                return Err(ConfigError::DuplicateServiceId(service.service_id.clone()));
            }
            if let Some(host_id) = &service.host_id {
                if !host_ids.contains(host_id.as_str()) {
                    return Err(ConfigError::UnknownHost {
                        service_id: service.service_id.clone(),
                        host_id: host_id.clone(),
                    });
                }
            }
            if service.check_type == CheckType::SslCert && service.host_id.is_none() {
                return Err(ConfigError::UndeterminedSslHost(service.service_id.clone()));
            }
            service.parsed_params()?;
        }

        check_positive("collector.max_workers", self.main.collector.max_workers as i64)?;
        check_positive(
            "collector.interval_sec",
            self.main.collector.interval_sec as i64,
        )?;
        if self.main.collector.interval_sec < 10 {
            tracing::warn!(
                interval_sec = self.main.collector.interval_sec,
                "collector.interval_sec is below 10s; this may overload monitored targets"
            );
        }
        check_positive("db.pool_mincached", self.main.db.pool_mincached as i64)?;
        check_positive("db.pool_maxcached", self.main.db.pool_maxcached as i64)?;
        check_positive(
            "db.pool_maxconnections",
            self.main.db.pool_maxconnections as i64,
        )?;

        let timeouts = &self.main.collector.timeouts;
        check_positive("collector.timeouts.ping_timeout_sec", timeouts.ping_timeout_sec as i64)?;
        check_positive("collector.timeouts.http_timeout_sec", timeouts.http_timeout_sec as i64)?;
        check_positive("collector.timeouts.dns_timeout_sec", timeouts.dns_timeout_sec as i64)?;
        check_positive("collector.timeouts.tcp_timeout_sec", timeouts.tcp_timeout_sec as i64)?;
        check_positive("collector.timeouts.json_timeout_sec", timeouts.json_timeout_sec as i64)?;
        check_positive(
            "collector.timeouts.ssl_cert_timeout_sec",
            timeouts.ssl_cert_timeout_sec as i64,
        )?;

        let thresholds = &self.main.collector.thresholds;
        check_positive("collector.thresholds.ping_warn_ms", thresholds.ping_warn_ms as i64)?;
        check_positive(
            "collector.thresholds.ping_very_slow_ms",
            thresholds.ping_very_slow_ms as i64,
        )?;
        check_positive("collector.thresholds.http_warn_ms", thresholds.http_warn_ms as i64)?;
        check_positive(
            "collector.thresholds.http_very_slow_ms",
            thresholds.http_very_slow_ms as i64,
        )?;
        check_positive("collector.thresholds.dns_warn_ms", thresholds.dns_warn_ms as i64)?;
        check_positive("collector.thresholds.tcp_warn_ms", thresholds.tcp_warn_ms as i64)?;
        check_positive(
            "collector.thresholds.tcp_very_slow_ms",
            thresholds.tcp_very_slow_ms as i64,
        )?;
        check_positive("collector.thresholds.json_warn_ms", thresholds.json_warn_ms as i64)?;
        check_positive(
            "collector.thresholds.json_very_slow_ms",
            thresholds.json_very_slow_ms as i64,
        )?;
        check_positive(
            "collector.thresholds.ssl_cert_warn_days",
            thresholds.ssl_cert_warn_days as i64,
        )?;

        Ok(())
    }
}

fn read_toml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn check_positive(field: &str, value: i64) -> Result<(), ConfigError> {
    if value <= 0 {
        return Err(ConfigError::NotPositive {
            field: field.to_string(),
            value,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_fixture(dir: &std::path::Path, main: &str, hosts: &str, services: &str) {
        fs::write(dir.join("config.toml"), main).unwrap();
        fs::write(dir.join("hosts.toml"), hosts).unwrap();
        fs::write(dir.join("services.toml"), services).unwrap();
    }

    const MAIN: &str = r#"
        [region]
        fallback_region = "eu-west"

        [db]
        host = "localhost"
        user = "gnm"
        password = "secret"
        database = "gnm"
        pool_mincached = 1
        pool_maxcached = 4
        pool_maxconnections = 10

        [collector]
        interval_sec = 30
        max_workers = 8

        [collector.timeouts]
        ping_timeout_sec = 2
        http_timeout_sec = 5
        dns_timeout_sec = 3
        tcp_timeout_sec = 3
        json_timeout_sec = 5

        [collector.thresholds]
        ping_warn_ms = 100
        ping_very_slow_ms = 500
        http_warn_ms = 300
        http_very_slow_ms = 1500
        dns_warn_ms = 200
        tcp_warn_ms = 200
        tcp_very_slow_ms = 1000
        json_warn_ms = 300
        json_very_slow_ms = 1500
    "#;

    const HOSTS: &str = r#"
        [[host]]
        host_id = "web1"
        address = "example.com"
    "#;

    #[test]
    fn loads_a_valid_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let services = r#"
            [[service]]
            service_id = "web1-http"
            host_id = "web1"
            type = "http"
            params = { url = "https://example.com/health" }
        "#;
        write_fixture(dir.path(), MAIN, HOSTS, services);

        let snapshot = Snapshot::load(dir.path()).expect("valid snapshot should load");
        assert_eq!(snapshot.services.len(), 1);
        assert_eq!(snapshot.hosts.len(), 1);
    }

    #[test]
    fn rejects_unknown_host_reference() {
        let dir = tempfile::tempdir().unwrap();
        let services = r#"
            [[service]]
            service_id = "ghost"
            host_id = "does-not-exist"
            type = "tcp"
            params = { port = 22 }
        "#;
        write_fixture(dir.path(), MAIN, HOSTS, services);

        let err = Snapshot::load(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownHost { .. }));
    }

    #[test]
    fn rejects_duplicate_service_id() {
        let dir = tempfile::tempdir().unwrap();
        let services = r#"
            [[service]]
            service_id = "dup"
            host_id = "web1"
            type = "ping"

            [[service]]
            service_id = "dup"
            host_id = "web1"
            type = "tcp"
            params = { port = 22 }
        "#;
        write_fixture(dir.path(), MAIN, HOSTS, services);

        let err = Snapshot::load(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateServiceId(id) if id == "dup"));
    }

    #[test]
    fn rejects_ssl_cert_without_host() {
        let dir = tempfile::tempdir().unwrap();
        let services = r#"
            [[service]]
            service_id = "no-host-ssl"
            type = "ssl_cert"
        "#;
        write_fixture(dir.path(), MAIN, HOSTS, services);

        let err = Snapshot::load(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UndeterminedSslHost(id) if id == "no-host-ssl"));
    }

    #[test]
    fn rejects_missing_required_param() {
        let dir = tempfile::tempdir().unwrap();
        let services = r#"
            [[service]]
            service_id = "no-url"
            host_id = "web1"
            type = "http"
        "#;
        write_fixture(dir.path(), MAIN, HOSTS, services);

        let err = Snapshot::load(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingParam { .. }));
    }

    #[test]
    fn rejects_non_positive_pool_size() {
        let dir = tempfile::tempdir().unwrap();
        let bad_main = MAIN.replace("pool_mincached = 1", "pool_mincached = 0");
        let services = r#"
            [[service]]
            service_id = "web1-ping"
            host_id = "web1"
            type = "ping"
        "#;
        write_fixture(dir.path(), &bad_main, HOSTS, services);

        let err = Snapshot::load(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::NotPositive { field, .. } if field == "db.pool_mincached"));
    }

    #[test]
    fn rejects_non_positive_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let bad_main = MAIN.replace("http_timeout_sec = 5", "http_timeout_sec = 0");
        let services = r#"
            [[service]]
            service_id = "web1-ping"
            host_id = "web1"
            type = "ping"
        "#;
        write_fixture(dir.path(), &bad_main, HOSTS, services);

        let err = Snapshot::load(dir.path()).unwrap_err();
        assert!(
            matches!(err, ConfigError::NotPositive { field, .. } if field == "collector.timeouts.http_timeout_sec")
        );
    }

    #[test]
    fn rejects_non_positive_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let bad_main = MAIN.replace("ping_warn_ms = 100", "ping_warn_ms = 0");
        let services = r#"
            [[service]]
            service_id = "web1-ping"
            host_id = "web1"
            type = "ping"
        "#;
        write_fixture(dir.path(), &bad_main, HOSTS, services);

        let err = Snapshot::load(dir.path()).unwrap_err();
        assert!(
            matches!(err, ConfigError::NotPositive { field, .. } if field == "collector.thresholds.ping_warn_ms")
        );
    }
}
