//! TCP connect probe (`tcp` check type).

use std::time::{Duration, Instant};

use tokio::net::TcpStream;

use crate::config::{Thresholds, Timeouts};
use crate::records::{CheckResult, HostSpec, TcpParams};

use super::classify_latency;

pub async fn run(
    params: &TcpParams,
    host: Option<&HostSpec>,
    timeouts: &Timeouts,
    thresholds: &Thresholds,
) -> CheckResult {
    let Some(host) = host else {
        return CheckResult::hard_failure().with_meta("error", "no host declared for tcp check");
    };
    let timeout = Duration::from_secs(timeouts.tcp_timeout_sec.max(1));
    let target = format!("{}:{}", host.address, params.port);

    let start = Instant::now();
    let attempt = tokio::time::timeout(timeout, TcpStream::connect(&target)).await;
    let latency_ms = start.elapsed().as_millis() as u32;

    match attempt {
        Ok(Ok(_stream)) => {
            classify_latency(latency_ms, thresholds.tcp_warn_ms, thresholds.tcp_very_slow_ms)
                .with_meta("port", params.port)
        }
        Ok(Err(e)) => CheckResult::hard_failure()
            .with_meta("error", e.to_string())
            .with_meta("port", params.port),
        Err(_) => CheckResult::hard_failure()
            .with_meta("error", "timeout")
            .with_meta("port", params.port),
    }
}
