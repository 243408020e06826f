//! HTTP GET probe with JSON body validation (`json_api` check type).

use std::time::{Duration, Instant};

use serde_json::Value;

use crate::config::{Thresholds, Timeouts};
use crate::records::{CheckResult, JsonApiParams, RawStatus};

use super::classify_latency;

const SNIPPET_LEN: usize = 256;

pub async fn run(params: &JsonApiParams, timeouts: &Timeouts, thresholds: &Thresholds) -> CheckResult {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(timeouts.json_timeout_sec))
        .build()
    {
        Ok(c) => c,
        Err(e) => return CheckResult::hard_failure().with_meta("error", e.to_string()),
    };

    let start = Instant::now();
    let response = match client.get(&params.url).send().await {
        Ok(r) => r,
        Err(e) => return CheckResult::hard_failure().with_meta("error", e.to_string()),
    };
    let status = response.status();
    let body_bytes = match response.bytes().await {
        Ok(b) => b,
        Err(e) => return CheckResult::hard_failure().with_meta("error", e.to_string()),
    };
    let latency_ms = start.elapsed().as_millis() as u32;

    let body: Value = match serde_json::from_slice(&body_bytes) {
        Ok(v) => v,
        Err(_) => {
            return CheckResult::hard_failure()
                .with_meta("http_status", status.as_u16())
                .with_meta("body_snippet", snippet(&body_bytes));
        }
    };

    let mut result = classify_latency(latency_ms, thresholds.json_warn_ms, thresholds.json_very_slow_ms)
        .with_meta("http_status", status.as_u16());

    if let Some(reason) = check_expectations(&body, params) {
        result = result
            .with_meta("body_snippet", snippet(&body_bytes))
            .with_meta("expectation_error", reason);
        result.raw_status = RawStatus::HardFailure;
    }

    result
}

fn check_expectations(body: &Value, params: &JsonApiParams) -> Option<String> {
    let path = params.expect_field.as_deref()?;
    let pointer = to_json_pointer(path);
    let Some(found) = body.pointer(&pointer) else {
        return Some(format!("field '{path}' not present"));
    };
    if let Some(expected) = &params.expect_equals {
        if found != expected {
            return Some(format!("field '{path}' was {found}, expected {expected}"));
        }
    }
    None
}

fn to_json_pointer(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

fn snippet(bytes: &[u8]) -> String {
    let cut = bytes.len().min(SNIPPET_LEN);
    String::from_utf8_lossy(&bytes[..cut]).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expectation_passes_when_field_matches() {
        let params = JsonApiParams {
            url: String::new(),
            expect_field: Some("status".to_string()),
            expect_equals: Some(json!("ok")),
        };
        let body = json!({"status": "ok"});
        assert_eq!(check_expectations(&body, &params), None);
    }

    #[test]
    fn expectation_fails_when_field_missing() {
        let params = JsonApiParams {
            url: String::new(),
            expect_field: Some("status".to_string()),
            expect_equals: None,
        };
        let body = json!({"other": "ok"});
        assert!(check_expectations(&body, &params).is_some());
    }

    #[test]
    fn expectation_fails_on_value_mismatch() {
        let params = JsonApiParams {
            url: String::new(),
            expect_field: Some("status".to_string()),
            expect_equals: Some(json!("ok")),
        };
        let body = json!({"status": "degraded"});
        assert!(check_expectations(&body, &params).is_some());
    }

    #[test]
    fn no_expectations_means_always_satisfied() {
        let params = JsonApiParams {
            url: String::new(),
            expect_field: None,
            expect_equals: None,
        };
        assert_eq!(check_expectations(&json!({}), &params), None);
    }

    #[test]
    fn snippet_truncates_long_bodies() {
        let long = "x".repeat(1000);
        assert_eq!(snippet(long.as_bytes()).len(), SNIPPET_LEN);
    }
}
