//! Check Probes (spec §4.3): one pluggable implementation per [`CheckType`],
//! dispatched through a closed match rather than `dyn Trait`, since the set
//! of check types is small and fixed (spec §9 "avoid deep inheritance;
//! prefer tagged-variant... composition").

mod dns;
mod http;
mod json_api;
mod ping;
mod tcp;
mod tls;

use crate::config::{Thresholds, Timeouts};
use crate::errors::ConfigError;
use crate::records::{CheckParams, CheckResult, CheckType, HostSpec, ServiceSpec};

impl CheckType {
    /// Runs `service`'s check, returning a [`CheckResult`] regardless of
    /// whether the underlying probe succeeded, timed out, or errored at the
    /// transport level — only a malformed config ([`ConfigError`]) escapes
    /// this boundary. Every other probe failure becomes
    /// [`RawStatus::HardFailure`](crate::records::RawStatus::HardFailure),
    /// per spec §7's propagation policy.
    pub async fn run(
        service: &ServiceSpec,
        host: Option<&HostSpec>,
        timeouts: &Timeouts,
        thresholds: &Thresholds,
    ) -> Result<CheckResult, ConfigError> {
        let params = service.parsed_params()?;
        Ok(match params {
            CheckParams::Ping => ping::run(host, timeouts, thresholds).await,
            CheckParams::Http(p) => http::run(&p, timeouts, thresholds).await,
            CheckParams::Dns(p) => dns::run(&p, host, timeouts, thresholds).await,
            CheckParams::Tcp(p) => tcp::run(&p, host, timeouts, thresholds).await,
            CheckParams::SslCert(p) => tls::run(&p, host, timeouts, thresholds).await,
            CheckParams::JsonApi(p) => json_api::run(&p, timeouts, thresholds).await,
        })
    }
}

/// Shared WARN/very-slow latency classification used by every check that has
/// both a `*_warn_ms` and a `*_very_slow_ms` threshold. Both tiers persist as
/// [`Status::Warn`](crate::records::Status::Warn); the distinction is kept
/// only as a `slow` metadata field (`yes`/`very`) for diagnosis.
pub(crate) fn classify_latency(latency_ms: u32, warn_ms: u32, very_slow_ms: u32) -> CheckResult {
    if latency_ms >= very_slow_ms {
        CheckResult::degraded(latency_ms).with_meta("slow", "very")
    } else if latency_ms >= warn_ms {
        CheckResult::degraded(latency_ms).with_meta("slow", "yes")
    } else {
        CheckResult::ok(latency_ms)
    }
}

/// Single-threshold variant of [`classify_latency`], for checks (`dns`) that
/// only declare a WARN floor.
pub(crate) fn classify_latency_simple(latency_ms: u32, warn_ms: u32) -> CheckResult {
    if latency_ms >= warn_ms {
        CheckResult::degraded(latency_ms)
    } else {
        CheckResult::ok(latency_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_latency_picks_the_right_tier() {
        assert_eq!(classify_latency(50, 100, 500).raw_status, crate::records::RawStatus::Ok);
        assert_eq!(classify_latency(150, 100, 500).raw_status, crate::records::RawStatus::Degraded);
        assert_eq!(classify_latency(600, 100, 500).raw_status, crate::records::RawStatus::Degraded);
    }

    #[test]
    fn classify_latency_simple_has_no_very_slow_tier() {
        assert_eq!(classify_latency_simple(50, 100).raw_status, crate::records::RawStatus::Ok);
        assert_eq!(classify_latency_simple(200, 100).raw_status, crate::records::RawStatus::Degraded);
    }
}
