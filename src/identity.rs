//! Probe Identity Resolver (spec §4.2): determines the region/country/city/
//! public IP this collector process is probing from, once per process
//! lifetime, and stamps every [`Measurement`](crate::records::Measurement)
//! with it.
//!
//! Resolution order: environment variables, then a geo-IP HTTP lookup, then
//! the main config's fallback region. The result is cached behind a
//! [`OnceCell`] so repeated calls within a process never re-resolve.

use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Deserialize;

use crate::config::RegionConfig;
use crate::records::{IdentitySource, ProbeIdentity};
use crate::{ENV_CITY, ENV_COUNTRY, ENV_PUBLIC_IP, ENV_REGION};

static IDENTITY: OnceCell<ProbeIdentity> = OnceCell::new();

#[derive(Debug, Deserialize)]
struct GeoResponse {
    #[serde(default)]
    region: String,
    #[serde(default, rename = "country_code")]
    country_code: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    ip: String,
}

/// Resolves the probe identity, caching the result for the rest of the
/// process's lifetime.
///
/// The first caller pays the cost of the geo-IP lookup (if env vars didn't
/// already supply a region); every subsequent call returns the cached value
/// immediately, including calls made from a different region than the one
/// that initialized the cache.
pub async fn resolve(region_config: &RegionConfig) -> ProbeIdentity {
    if let Some(identity) = IDENTITY.get() {
        return identity.clone();
    }
    let identity = resolve_uncached(region_config).await;
    IDENTITY.get_or_init(|| identity.clone());
    identity
}

async fn resolve_uncached(region_config: &RegionConfig) -> ProbeIdentity {
    if let Ok(region) = std::env::var(ENV_REGION) {
        if !region.is_empty() {
            return ProbeIdentity {
                region,
                country: std::env::var(ENV_COUNTRY).unwrap_or_default(),
                city: std::env::var(ENV_CITY).unwrap_or_default(),
                public_ip: std::env::var(ENV_PUBLIC_IP).unwrap_or_default(),
                source: Some(IdentitySource::Env),
            };
        }
    }

    if let Some(identity) = geo_lookup(&region_config.geo_endpoint).await {
        return identity;
    }

    ProbeIdentity {
        region: region_config.fallback_region.clone(),
        country: String::new(),
        city: String::new(),
        public_ip: String::new(),
        source: Some(IdentitySource::Config),
    }
}

async fn geo_lookup(endpoint: &str) -> Option<ProbeIdentity> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
        .ok()?;

    let result = client.get(endpoint).send().await;
    let response = match result {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!(error = %e, "geo-ip lookup failed");
            return None;
        }
    };

    let body: GeoResponse = match response.json().await {
        Ok(b) => b,
        Err(e) => {
            tracing::debug!(error = %e, "geo-ip response was not the expected shape");
            return None;
        }
    };

    if body.region.is_empty() {
        return None;
    }

    Some(ProbeIdentity {
        region: body.region,
        country: body.country_code,
        city: body.city,
        public_ip: body.ip,
        source: Some(IdentitySource::Geo),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_fields_have_all_five_keys() {
        let identity = ProbeIdentity {
            region: "eu-west".to_string(),
            country: "DE".to_string(),
            city: "Berlin".to_string(),
            public_ip: "203.0.113.9".to_string(),
            source: Some(IdentitySource::Env),
        };
        let meta = identity.meta_fields();
        for key in [
            "probe_region",
            "probe_country",
            "probe_city",
            "probe_public_ip",
            "probe_source",
        ] {
            assert!(meta.contains_key(key), "missing {key}");
        }
        assert_eq!(meta["probe_source"], serde_json::json!("env"));
    }

    #[tokio::test]
    async fn geo_lookup_parses_a_successful_response() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"region": "eu-west", "country_code": "DE", "city": "Berlin", "ip": "203.0.113.9"}),
            ))
            .mount(&server)
            .await;

        let identity = geo_lookup(&server.uri()).await.expect("lookup should succeed");
        assert_eq!(identity.region, "eu-west");
        assert_eq!(identity.source, Some(IdentitySource::Geo));
    }

    #[tokio::test]
    async fn geo_lookup_falls_through_silently_on_error() {
        assert!(geo_lookup("http://127.0.0.1:1").await.is_none());
    }
}
