//! Probe module for validating rendered configurations.
//!
//! A `Prober` supplies four sub-probes; `Prober::probe` runs them against the
//! endpoint and resolver named in the config text and folds the outcomes into
//! a `TestResult`.

mod dns;
mod network;
mod ping;
mod simulated;
mod speed;

pub use dns::*;
pub use network::*;
pub use ping::*;
pub use simulated::*;
pub use speed::*;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Resolver used when the config has no `DNS` line.
pub const DEFAULT_RESOLVER: &str = "1.1.1.1";

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("command failed: {0}")]
    Command(String),
    #[error("unreachable: {0}")]
    Unreachable(String),
}

/// Outcome of one probe run, stored JSON-encoded on the configuration.
///
/// `speed_test` and `latency` are only set when `connection_test` passed;
/// `error` only when the probe could not run at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub connection_test: bool,
    /// Mbps
    pub speed_test: Option<f64>,
    pub dns_resolution: bool,
    /// Milliseconds
    pub latency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TestResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.connection_test && self.dns_resolution
    }
}

/// A `host:port` peer endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Parse `host:port` or `[v6]:port`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest.split_once(']')?;
            (host, tail.strip_prefix(':')?)
        } else {
            s.rsplit_once(':')?
        };

        if host.is_empty() {
            return None;
        }
        Some(Self {
            host: host.to_string(),
            port: port.parse().ok()?,
        })
    }

    pub fn is_ip(&self) -> bool {
        self.host.parse::<std::net::IpAddr>().is_ok()
    }
}

/// Value of the first `Endpoint = ...` line.
pub fn extract_endpoint(config_text: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?mi)^\s*Endpoint\s*=\s*(\S.*?)\s*$").unwrap());
    re.captures(config_text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// First resolver from the `DNS = ...` line, or `DEFAULT_RESOLVER`.
pub fn extract_resolver(config_text: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?mi)^\s*DNS\s*=\s*(\S.*?)\s*$").unwrap());
    re.captures(config_text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().split(',').map(str::trim).find(|s| !s.is_empty()))
        .unwrap_or(DEFAULT_RESOLVER)
        .to_string()
}

/// Validation probes for a configuration.
///
/// Implementations only provide the sub-probes. `probe` runs each one
/// independently; latency and speed run only after a successful connection.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Whether the endpoint is reachable at all.
    async fn check_connection(&self, endpoint: &Endpoint) -> Result<(), ProbeError>;

    /// Whether `resolver` answers a lookup for a well-known name.
    async fn check_dns(&self, resolver: &str) -> Result<(), ProbeError>;

    /// Round trip to the endpoint, in milliseconds.
    async fn measure_latency(&self, endpoint: &Endpoint) -> Result<f64, ProbeError>;

    /// Throughput, in Mbps.
    async fn measure_speed(&self, endpoint: &Endpoint) -> Result<f64, ProbeError>;

    async fn probe(&self, config_text: &str) -> TestResult {
        let Some(raw) = extract_endpoint(config_text) else {
            return TestResult::failed("No endpoint found");
        };
        let Some(endpoint) = Endpoint::parse(&raw) else {
            return TestResult::failed(format!("Invalid endpoint: {}", raw));
        };
        let resolver = extract_resolver(config_text);

        let mut result = TestResult::default();

        match self.check_connection(&endpoint).await {
            Ok(()) => result.connection_test = true,
            Err(e) => tracing::debug!("Connection probe for {} failed: {}", raw, e),
        }

        match self.check_dns(&resolver).await {
            Ok(()) => result.dns_resolution = true,
            Err(e) => tracing::debug!("DNS probe via {} failed: {}", resolver, e),
        }

        if result.connection_test {
            match self.measure_latency(&endpoint).await {
                Ok(ms) => result.latency = Some(round_to(ms, 1)),
                Err(e) => tracing::debug!("Latency probe for {} failed: {}", raw, e),
            }

            match self.measure_speed(&endpoint).await {
                Ok(mbps) => result.speed_test = Some(round_to(mbps, 2)),
                Err(e) => tracing::debug!("Speed probe for {} failed: {}", raw, e),
            }
        }

        result
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic prober with canned sub-probe outcomes.
    struct CannedProber {
        connect: bool,
        dns: bool,
        latency: Option<f64>,
    }

    #[async_trait]
    impl Prober for CannedProber {
        async fn check_connection(&self, endpoint: &Endpoint) -> Result<(), ProbeError> {
            if self.connect {
                Ok(())
            } else {
                Err(ProbeError::Unreachable(endpoint.host.clone()))
            }
        }

        async fn check_dns(&self, _resolver: &str) -> Result<(), ProbeError> {
            if self.dns {
                Ok(())
            } else {
                Err(ProbeError::Timeout(Duration::from_secs(1)))
            }
        }

        async fn measure_latency(&self, _endpoint: &Endpoint) -> Result<f64, ProbeError> {
            self.latency
                .ok_or_else(|| ProbeError::Network("no echo".to_string()))
        }

        async fn measure_speed(&self, _endpoint: &Endpoint) -> Result<f64, ProbeError> {
            Ok(12.3456)
        }
    }

    const TEXT: &str = "[Interface]\nPrivateKey = a\nDNS = 9.9.9.9, 1.1.1.1\n\n[Peer]\nPublicKey = b\nEndpoint = 162.159.192.1:2408\n";

    #[test]
    fn test_extract_endpoint_and_resolver() {
        assert_eq!(extract_endpoint(TEXT).as_deref(), Some("162.159.192.1:2408"));
        assert_eq!(extract_resolver(TEXT), "9.9.9.9");
        assert_eq!(extract_endpoint("[Peer]\nPublicKey = b\n"), None);
        assert_eq!(extract_resolver("[Peer]\n"), DEFAULT_RESOLVER);
    }

    #[test]
    fn test_endpoint_parse() {
        assert_eq!(
            Endpoint::parse("engage.cloudflare.com:2408"),
            Some(Endpoint { host: "engage.cloudflare.com".to_string(), port: 2408 })
        );
        let v6 = Endpoint::parse("[2606:4700:d0::a29f:c001]:2408").unwrap();
        assert_eq!(v6.host, "2606:4700:d0::a29f:c001");
        assert!(v6.is_ip());
        assert!(Endpoint::parse("no-port").is_none());
        assert!(Endpoint::parse(":2408").is_none());
        assert!(Endpoint::parse("host:99999").is_none());
    }

    #[tokio::test]
    async fn test_missing_endpoint() {
        let prober = CannedProber { connect: true, dns: true, latency: Some(1.0) };
        let result = prober.probe("[Interface]\nPrivateKey = a\n").await;
        assert_eq!(result, TestResult::failed("No endpoint found"));
        assert!(!result.is_valid());
    }

    #[tokio::test]
    async fn test_all_pass() {
        let prober = CannedProber { connect: true, dns: true, latency: Some(42.04) };
        let result = prober.probe(TEXT).await;
        assert!(result.is_valid());
        assert_eq!(result.latency, Some(42.0));
        assert_eq!(result.speed_test, Some(12.35));
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_latency_and_speed_gated_on_connection() {
        let prober = CannedProber { connect: false, dns: true, latency: Some(10.0) };
        let result = prober.probe(TEXT).await;
        assert!(!result.connection_test);
        assert!(result.dns_resolution);
        assert!(result.latency.is_none());
        assert!(result.speed_test.is_none());
        assert!(!result.is_valid());
    }

    #[tokio::test]
    async fn test_sub_probe_failure_is_isolated() {
        let prober = CannedProber { connect: true, dns: false, latency: None };
        let result = prober.probe(TEXT).await;
        assert!(result.connection_test);
        assert!(!result.dns_resolution);
        assert!(result.latency.is_none());
        assert!(result.speed_test.is_some());
    }

    #[test]
    fn test_result_json_shape() {
        let json = serde_json::to_value(TestResult::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "connectionTest": false,
                "speedTest": null,
                "dnsResolution": false,
                "latency": null
            })
        );
    }
}
