//! DNS resolution probe (`dns` check type), via `hickory-resolver`'s
//! system-configured async resolver.

use std::time::{Duration, Instant};

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::proto::rr::RecordType as WireRecordType;
use hickory_resolver::TokioAsyncResolver;
use serde_json::json;

use crate::config::{Thresholds, Timeouts};
use crate::records::{CheckResult, DnsParams, HostSpec, RecordType};

use super::classify_latency_simple;

pub async fn run(
    params: &DnsParams,
    host: Option<&HostSpec>,
    timeouts: &Timeouts,
    thresholds: &Thresholds,
) -> CheckResult {
    let Some(name) = params.name.clone().or_else(|| host.map(|h| h.address.clone())) else {
        return CheckResult::hard_failure()
            .with_meta("error", "no name to resolve and no host declared");
    };

    let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
    let timeout = Duration::from_secs(timeouts.dns_timeout_sec.max(1));

    let start = Instant::now();
    let outcome = tokio::time::timeout(timeout, lookup(&resolver, &name, params.record)).await;
    let latency_ms = start.elapsed().as_millis() as u32;

    match outcome {
        Ok(Ok(answers)) => {
            let capped: Vec<_> = answers.into_iter().take(8).collect();
            classify_latency_simple(latency_ms, thresholds.dns_warn_ms)
                .with_meta("resolver", "system")
                .with_meta("answers", json!(capped))
        }
        Ok(Err(e)) => CheckResult::hard_failure().with_meta("error", e.to_string()),
        Err(_) => CheckResult::hard_failure().with_meta("error", "timeout"),
    }
}

async fn lookup(
    resolver: &TokioAsyncResolver,
    name: &str,
    record: RecordType,
) -> Result<Vec<String>, hickory_resolver::error::ResolveError> {
    Ok(match record {
        RecordType::A => resolver
            .ipv4_lookup(name)
            .await?
            .iter()
            .map(|ip| ip.to_string())
            .collect(),
        RecordType::Aaaa => resolver
            .ipv6_lookup(name)
            .await?
            .iter()
            .map(|ip| ip.to_string())
            .collect(),
        RecordType::Cname => resolver
            .lookup(name, WireRecordType::CNAME)
            .await?
            .iter()
            .map(|r| r.to_string())
            .collect(),
        RecordType::Mx => resolver
            .mx_lookup(name)
            .await?
            .iter()
            .map(|mx| mx.to_string())
            .collect(),
        RecordType::Txt => resolver
            .txt_lookup(name)
            .await?
            .iter()
            .map(|txt| txt.to_string())
            .collect(),
    })
}
