//! Prober that touches the network for every sub-probe.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

use super::{download_mbps, ping, resolve_via, Endpoint, ProbeError, Prober, PROBE_NAME};

/// Port tried when the endpoint does not answer ICMP.
pub const TCP_FALLBACK_PORT: u16 = 443;

pub struct NetworkProber {
    timeout: Duration,
    speed_url: String,
    client: reqwest::Client,
}

impl NetworkProber {
    pub fn new(timeout: Duration, speed_url: impl Into<String>) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            timeout,
            speed_url: speed_url.into(),
            client,
        })
    }

    async fn tcp_connect(&self, host: &str) -> Result<Duration, ProbeError> {
        let start = Instant::now();
        tokio::time::timeout(self.timeout, TcpStream::connect((host, TCP_FALLBACK_PORT)))
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))?
            .map_err(|e| ProbeError::Unreachable(format!("{}:{}: {}", host, TCP_FALLBACK_PORT, e)))?;
        Ok(start.elapsed())
    }
}

#[async_trait]
impl Prober for NetworkProber {
    async fn check_connection(&self, endpoint: &Endpoint) -> Result<(), ProbeError> {
        match ping(&endpoint.host, self.timeout).await {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::debug!("Ping to {} failed ({}), trying TCP", endpoint.host, e);
                self.tcp_connect(&endpoint.host).await.map(|_| ())
            }
        }
    }

    async fn check_dns(&self, resolver: &str) -> Result<(), ProbeError> {
        resolve_via(resolver, PROBE_NAME, self.timeout).await.map(|_| ())
    }

    async fn measure_latency(&self, endpoint: &Endpoint) -> Result<f64, ProbeError> {
        let rtt = match ping(&endpoint.host, self.timeout).await {
            Ok(rtt) => rtt,
            Err(_) => self.tcp_connect(&endpoint.host).await?,
        };
        Ok(rtt.as_secs_f64() * 1000.0)
    }

    async fn measure_speed(&self, _endpoint: &Endpoint) -> Result<f64, ProbeError> {
        download_mbps(&self.client, &self.speed_url, self.timeout).await
    }
}
