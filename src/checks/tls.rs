//! TLS handshake + leaf certificate inspection probe (`ssl_cert` check type).
//!
//! `rustls` doesn't hand back the peer's certificate chain after a
//! successful handshake, so this installs a custom
//! [`rustls::client::danger::ServerCertVerifier`] that accepts whatever it is
//! given (the handshake's own validity is not what this check measures) but
//! remembers the leaf certificate it saw, for inspection with `x509-parser`.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::config::{Thresholds, Timeouts};
use crate::records::{CheckResult, HostSpec, RawStatus, SslCertParams};

#[derive(Debug)]
struct CertCapture {
    captured: Mutex<Option<Vec<u8>>>,
}

impl CertCapture {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            captured: Mutex::new(None),
        })
    }

    fn take(&self) -> Option<Vec<u8>> {
        self.captured.lock().expect("cert capture mutex poisoned").take()
    }
}

impl ServerCertVerifier for CertCapture {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        *self.captured.lock().expect("cert capture mutex poisoned") = Some(end_entity.as_ref().to_vec());
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

pub async fn run(
    params: &SslCertParams,
    host: Option<&HostSpec>,
    timeouts: &Timeouts,
    thresholds: &Thresholds,
) -> CheckResult {
    let Some(host) = host else {
        return CheckResult::hard_failure().with_meta("error", "no host declared for ssl_cert check");
    };
    let port = params.port.unwrap_or(443);
    let timeout = Duration::from_secs(timeouts.ssl_cert_timeout_sec.max(1));

    match tokio::time::timeout(timeout, handshake(&host.address, port)).await {
        Ok(Ok((latency_ms, der))) => inspect_cert(&der, latency_ms, thresholds),
        Ok(Err(e)) => CheckResult::hard_failure().with_meta("error", e),
        Err(_) => CheckResult::hard_failure().with_meta("error", "timeout"),
    }
}

async fn handshake(address: &str, port: u16) -> Result<(u32, Vec<u8>), String> {
    let capture = CertCapture::new();
    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(capture.clone())
        .with_no_client_auth();

    let connector = TlsConnector::from(Arc::new(config));
    let server_name =
        ServerName::try_from(address.to_string()).map_err(|_| format!("invalid server name: {address}"))?;

    let start = Instant::now();
    let stream = TcpStream::connect((address, port))
        .await
        .map_err(|e| e.to_string())?;
    connector
        .connect(server_name, stream)
        .await
        .map_err(|e| e.to_string())?;
    let latency_ms = start.elapsed().as_millis() as u32;

    let der = capture
        .take()
        .ok_or_else(|| "handshake completed without observing a certificate".to_string())?;
    Ok((latency_ms, der))
}

fn inspect_cert(der: &[u8], latency_ms: u32, thresholds: &Thresholds) -> CheckResult {
    let cert = match x509_parser::parse_x509_certificate(der) {
        Ok((_, cert)) => cert,
        Err(e) => {
            return CheckResult::hard_failure().with_meta("error", format!("certificate parse error: {e}"))
        }
    };

    let not_after = cert.validity().not_after;
    let now = x509_parser::time::ASN1Time::now();
    let seconds_remaining = not_after.timestamp() - now.timestamp();
    let expired = seconds_remaining < 0;
    let days_until_expiry = seconds_remaining.div_euclid(86_400);

    let mut result = CheckResult::ok(latency_ms)
        .with_meta("issuer", cert.issuer().to_string())
        .with_meta("subject", cert.subject().to_string())
        .with_meta("days_until_expiry", days_until_expiry);

    if expired {
        result.raw_status = RawStatus::HardFailure;
        result = result.bypassing_two_strike();
    } else if (days_until_expiry as u32) <= thresholds.ssl_cert_warn_days {
        result.raw_status = RawStatus::Degraded;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> Thresholds {
        Thresholds {
            ping_warn_ms: 0,
            ping_very_slow_ms: 0,
            http_warn_ms: 0,
            http_very_slow_ms: 0,
            dns_warn_ms: 0,
            tcp_warn_ms: 0,
            tcp_very_slow_ms: 0,
            json_warn_ms: 0,
            json_very_slow_ms: 0,
            ssl_cert_warn_days: 14,
        }
    }

    #[test]
    fn malformed_der_is_a_hard_failure_not_a_panic() {
        let result = inspect_cert(b"not a certificate", 5, &thresholds());
        assert_eq!(result.raw_status, RawStatus::HardFailure);
        assert!(!result.bypass_two_strike);
    }
}
