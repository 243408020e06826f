//! ICMP echo probe. Tries an unprivileged raw socket via `surge-ping` first;
//! on a permission error (no `CAP_NET_RAW`) falls back to shelling out to the
//! system `ping` binary.

use std::error::Error as _;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use tokio::process::Command;

use crate::config::{Thresholds, Timeouts};
use crate::records::{CheckResult, HostSpec};

use super::classify_latency;

pub async fn run(host: Option<&HostSpec>, timeouts: &Timeouts, thresholds: &Thresholds) -> CheckResult {
    let Some(host) = host else {
        return CheckResult::hard_failure().with_meta("error", "no host declared for ping check");
    };
    let timeout = Duration::from_secs(timeouts.ping_timeout_sec.max(1));

    match probe_rawsock(&host.address, timeout).await {
        Ok(latency_ms) => {
            classify_latency(latency_ms, thresholds.ping_warn_ms, thresholds.ping_very_slow_ms)
                .with_meta("ping_mode", "rawsock")
        }
        Err(e) if is_permission_error(&e) => {
            tracing::debug!(error = %e, "raw socket ping denied, falling back to system ping");
            match probe_exec(&host.address, timeout).await {
                Ok(latency_ms) => {
                    classify_latency(latency_ms, thresholds.ping_warn_ms, thresholds.ping_very_slow_ms)
                        .with_meta("ping_mode", "exec")
                }
                Err(e) => CheckResult::hard_failure()
                    .with_meta("error", e.to_string())
                    .with_meta("ping_mode", "exec"),
            }
        }
        Err(e) => CheckResult::hard_failure()
            .with_meta("error", e.to_string())
            .with_meta("ping_mode", "rawsock"),
    }
}

fn is_permission_error(error: &surge_ping::SurgePingError) -> bool {
    error
        .source()
        .and_then(|s| s.downcast_ref::<std::io::Error>())
        .map(|io| io.kind() == std::io::ErrorKind::PermissionDenied)
        .unwrap_or(false)
}

async fn probe_rawsock(address: &str, timeout: Duration) -> Result<u32, surge_ping::SurgePingError> {
    let ip = resolve_ip(address).await.map_err(surge_ping::SurgePingError::IOError)?;
    let config = surge_ping::Config::default();
    let client = surge_ping::Client::new(&config)?;
    let mut pinger = client
        .pinger(ip, surge_ping::PingIdentifier(rand::random()))
        .await;
    pinger.timeout(timeout);

    let payload = [0u8; 56];
    let start = Instant::now();
    pinger.ping(surge_ping::PingSequence(0), &payload).await?;
    Ok(start.elapsed().as_millis() as u32)
}

async fn resolve_ip(address: &str) -> std::io::Result<IpAddr> {
    if let Ok(ip) = address.parse::<IpAddr>() {
        return Ok(ip);
    }
    let mut addrs = tokio::net::lookup_host((address, 0)).await?;
    addrs
        .next()
        .map(|sa| sa.ip())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "host has no addresses"))
}

async fn probe_exec(address: &str, timeout: Duration) -> std::io::Result<u32> {
    let output = tokio::time::timeout(
        timeout,
        Command::new("ping")
            .arg("-c")
            .arg("1")
            .arg("-W")
            .arg(timeout.as_secs().to_string())
            .arg(address)
            .output(),
    )
    .await
    .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "system ping timed out"))??;

    if !output.status.success() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("ping exited with {}", output.status),
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_ping_time(&stdout)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "could not parse ping output"))
}

fn parse_ping_time(stdout: &str) -> Option<u32> {
    let idx = stdout.find("time=")?;
    let rest = &stdout[idx + "time=".len()..];
    let end = rest.find(|c: char| !c.is_ascii_digit() && c != '.')?;
    rest[..end].parse::<f64>().ok().map(|ms| ms.round() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_time_field_from_linux_ping_output() {
        let stdout = "64 bytes from 1.1.1.1: icmp_seq=1 ttl=58 time=12.3 ms\n";
        assert_eq!(parse_ping_time(stdout), Some(12));
    }

    #[test]
    fn returns_none_when_no_time_field_present() {
        assert_eq!(parse_ping_time("Request timeout for icmp_seq 0"), None);
    }
}
