//! Prober with weighted random outcomes and no network access.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::Range;
use std::sync::Mutex;
use std::time::Duration;

use super::{Endpoint, ProbeError, Prober};

const CLOUDFLARE_PREFIXES: &[&str] = &["162.159.", "188.114."];
const CLOUDFLARE_RESOLVERS: &[&str] = &["1.1.1.1", "1.0.0.1"];

/// Success odds for each connectivity tier.
const CLOUDFLARE_ODDS: f64 = 0.7;
const IP_ODDS: f64 = 0.6;
const HOSTNAME_ODDS: f64 = 0.4;
const LAST_RESORT_ODDS: f64 = 0.3;
const DNS_ODDS: f64 = 0.9;

const LATENCY_MS: Range<f64> = 20.0..120.0;
const SPEED_MBPS: Range<f64> = 1.0..20.0;

/// Random stand-in for `NetworkProber`.
///
/// With `delays` on, each sub-probe sleeps for a short random interval the
/// way a real probe would take time.
pub struct SimulatedProber {
    rng: Mutex<StdRng>,
    delays: bool,
}

impl SimulatedProber {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
            delays: true,
        }
    }

    /// Reproducible outcomes without delays.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            delays: false,
        }
    }

    pub fn with_delays(mut self, delays: bool) -> Self {
        self.delays = delays;
        self
    }

    fn chance(&self, odds: f64) -> bool {
        self.with_rng(|rng| rng.gen_bool(odds))
    }

    fn sample(&self, range: Range<f64>) -> f64 {
        self.with_rng(|rng| rng.gen_range(range))
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        // A poisoned rng is still a usable rng.
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut rng)
    }

    async fn pause(&self, millis: Range<u64>) {
        if self.delays {
            let ms = self.with_rng(|rng| rng.gen_range(millis));
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

impl Default for SimulatedProber {
    fn default() -> Self {
        Self::new()
    }
}

fn is_cloudflare(host: &str) -> bool {
    host.contains("cloudflare.com")
        || CLOUDFLARE_PREFIXES.iter().any(|p| host.starts_with(p))
        || CLOUDFLARE_RESOLVERS.iter().any(|r| host.contains(r))
}

#[async_trait]
impl Prober for SimulatedProber {
    async fn check_connection(&self, endpoint: &Endpoint) -> Result<(), ProbeError> {
        if is_cloudflare(&endpoint.host) {
            self.pause(1000..4000).await;
            if self.chance(CLOUDFLARE_ODDS) {
                return Ok(());
            }
        }

        self.pause(500..2500).await;
        let odds = if endpoint.is_ip() { IP_ODDS } else { HOSTNAME_ODDS };
        if self.chance(odds) {
            return Ok(());
        }

        self.pause(200..1200).await;
        if self.chance(LAST_RESORT_ODDS) {
            return Ok(());
        }

        Err(ProbeError::Unreachable(format!("{}:{}", endpoint.host, endpoint.port)))
    }

    async fn check_dns(&self, resolver: &str) -> Result<(), ProbeError> {
        self.pause(200..1200).await;
        if self.chance(DNS_ODDS) {
            Ok(())
        } else {
            Err(ProbeError::Network(format!("no answer from {}", resolver)))
        }
    }

    async fn measure_latency(&self, _endpoint: &Endpoint) -> Result<f64, ProbeError> {
        let ms = self.sample(LATENCY_MS);
        if self.delays {
            tokio::time::sleep(Duration::from_secs_f64(ms / 1000.0)).await;
        }
        Ok(ms)
    }

    async fn measure_speed(&self, _endpoint: &Endpoint) -> Result<f64, ProbeError> {
        self.pause(1000..4000).await;
        Ok(self.sample(SPEED_MBPS))
    }
}
