//! Plain HTTP(S) GET probe (`http` check type).

use std::time::{Duration, Instant};

use crate::config::{Thresholds, Timeouts};
use crate::records::{CheckResult, HttpParams, RawStatus};

use super::classify_latency;

pub async fn run(params: &HttpParams, timeouts: &Timeouts, thresholds: &Thresholds) -> CheckResult {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(timeouts.http_timeout_sec))
        .build()
    {
        Ok(c) => c,
        Err(e) => return CheckResult::hard_failure().with_meta("error", e.to_string()),
    };

    let start = Instant::now();
    let response = client.get(&params.url).send().await;
    let latency_ms = start.elapsed().as_millis() as u32;

    match response {
        Ok(resp) => {
            let status = resp.status();
            let final_url = resp.url().to_string();
            let mut result = classify_latency(latency_ms, thresholds.http_warn_ms, thresholds.http_very_slow_ms)
                .with_meta("http_status", status.as_u16())
                .with_meta("final_url", final_url);
            if status.is_server_error() {
                result.raw_status = RawStatus::HardFailure;
            } else if status.is_client_error() {
                result.raw_status = RawStatus::Degraded;
            }
            result
        }
        Err(e) => CheckResult::hard_failure().with_meta("error", e.to_string()),
    }
}
