//! Device registration against the Warp API.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::header::USER_AGENT;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use super::{
    region_endpoint, ConfigSource, KeyPair, Provenance, SourceError, SourceRequest,
    CLOUDFLARE_PEER_KEY, DEFAULT_ADDRESSES,
};
use crate::wireguard::TunnelConfig;

const CLIENT_USER_AGENT: &str = "okhttp/3.12.1";

#[derive(Debug, Serialize)]
struct RegistrationRequest<'a> {
    key: &'a str,
    install_id: String,
    fcm_token: String,
    tos: String,
    #[serde(rename = "type")]
    device_type: &'static str,
    locale: &'static str,
}

/// Registers a fresh device key with each base URL in turn until one accepts.
pub struct WarpRegistrar {
    client: reqwest::Client,
    base_urls: Vec<String>,
    timeout: Duration,
}

impl WarpRegistrar {
    pub fn new(base_urls: Vec<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_urls,
            timeout,
        })
    }

    async fn register(&self, base: &str, keys: &KeyPair) -> Result<Value, SourceError> {
        let url = format!("{}/reg", base.trim_end_matches('/'));
        let body = RegistrationRequest {
            key: &keys.public_key,
            install_id: uuid::Uuid::new_v4().to_string(),
            fcm_token: uuid::Uuid::new_v4().to_string(),
            tos: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            device_type: "Android",
            locale: "en_US",
        };

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SourceError::Timeout(url.clone())
                } else {
                    SourceError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url,
                status: status.as_u16(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ConfigSource for WarpRegistrar {
    fn name(&self) -> &str {
        "warp-api"
    }

    fn provenance(&self) -> Provenance {
        Provenance::Registered
    }

    async fn fetch(&self, request: SourceRequest<'_>) -> Result<TunnelConfig, SourceError> {
        let keys = KeyPair::generate();

        for base in &self.base_urls {
            match self.register(base, &keys).await {
                Ok(registration) => {
                    tracing::info!("Registered device via {}", base);
                    return Ok(tunnel_from_registration(
                        &registration,
                        keys.private_key,
                        request.region,
                    ));
                }
                Err(e) => {
                    tracing::warn!("Registration via {} failed: {}", base, e);
                }
            }
        }

        Err(SourceError::Unavailable(format!(
            "all {} registration endpoints failed",
            self.base_urls.len()
        )))
    }
}

/// Build the tunnel from a registration response.
///
/// Missing peer keys or addresses fall back to the well-known Warp values.
pub fn tunnel_from_registration(registration: &Value, private_key: String, region: &str) -> TunnelConfig {
    let public_key = registration
        .pointer("/config/peers/0/public_key")
        .and_then(Value::as_str)
        .filter(|k| !k.is_empty())
        .unwrap_or(CLOUDFLARE_PEER_KEY)
        .to_string();

    let addresses = registration
        .pointer("/config/interface/addresses")
        .map(addresses_from_value)
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| DEFAULT_ADDRESSES.iter().map(|a| a.to_string()).collect());

    TunnelConfig {
        private_key,
        public_key,
        endpoint: region_endpoint(region).to_string(),
        addresses,
    }
}

/// Addresses arrive either as a list of CIDRs or as a `{v4, v6}` object.
fn addresses_from_value(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Value::Object(map) => {
            let mut out = Vec::new();
            if let Some(v4) = map.get("v4").and_then(Value::as_str) {
                out.push(with_prefix(v4, 32));
            }
            if let Some(v6) = map.get("v6").and_then(Value::as_str) {
                out.push(with_prefix(v6, 128));
            }
            out
        }
        _ => Vec::new(),
    }
}

fn with_prefix(addr: &str, bits: u8) -> String {
    if addr.contains('/') {
        addr.to_string()
    } else {
        format!("{}/{}", addr, bits)
    }
}
