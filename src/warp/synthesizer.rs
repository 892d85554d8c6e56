//! Ordered-fallback tunnel synthesis.

use rand::seq::SliceRandom;
use std::sync::Arc;

use super::{
    ConfigSource, KeyPair, Provenance, SourceRequest, Synthesized, ALTERNATE_ENDPOINTS,
    CLOUDFLARE_PEER_KEY, DEFAULT_ADDRESSES,
};
use crate::wireguard::TunnelConfig;

/// Produces tunnels from a registrar, an optional premium source, and a local
/// fallback. Never fails: upstream trouble only shows up in the logs and in
/// `Provenance::Fallback`.
pub struct Synthesizer {
    registrar: Arc<dyn ConfigSource>,
    premium: Option<Arc<dyn ConfigSource>>,
}

impl Synthesizer {
    pub fn new(registrar: Arc<dyn ConfigSource>, premium: Option<Arc<dyn ConfigSource>>) -> Self {
        Self { registrar, premium }
    }

    /// Synthesize one tunnel for `region`; premium requests try the premium
    /// source first.
    pub async fn generate(&self, region: &str, warp_plus: bool) -> Synthesized {
        if warp_plus {
            if let Some(found) = self.try_premium(region, None).await {
                return found;
            }
        }
        self.register_or_fallback(region).await
    }

    /// Synthesize the `slot`-th tunnel of a premium batch.
    pub async fn generate_indexed(&self, slot: usize) -> Synthesized {
        if let Some(found) = self.try_premium("auto", Some(slot)).await {
            return found;
        }
        self.register_or_fallback("auto").await
    }

    async fn try_premium(&self, region: &str, slot: Option<usize>) -> Option<Synthesized> {
        let source = self.premium.as_ref()?;
        match source.fetch(SourceRequest { region, slot }).await {
            Ok(tunnel) => Some(Synthesized {
                tunnel,
                provenance: source.provenance(),
            }),
            Err(e) => {
                tracing::warn!("Premium source {} failed, using registration: {}", source.name(), e);
                None
            }
        }
    }

    async fn register_or_fallback(&self, region: &str) -> Synthesized {
        match self.registrar.fetch(SourceRequest { region, slot: None }).await {
            Ok(tunnel) => Synthesized {
                tunnel,
                provenance: self.registrar.provenance(),
            },
            Err(e) => {
                tracing::warn!(
                    "Source {} failed ({}), generating fallback configuration",
                    self.registrar.name(),
                    e
                );
                Synthesized {
                    tunnel: fallback_tunnel(),
                    provenance: Provenance::Fallback,
                }
            }
        }
    }
}

/// Locally generated tunnel on a random alternate endpoint.
pub fn fallback_tunnel() -> TunnelConfig {
    let keys = KeyPair::generate();
    let mut endpoints = ALTERNATE_ENDPOINTS.to_vec();
    endpoints.shuffle(&mut rand::thread_rng());

    TunnelConfig {
        private_key: keys.private_key,
        public_key: CLOUDFLARE_PEER_KEY.to_string(),
        endpoint: endpoints[0].to_string(),
        addresses: DEFAULT_ADDRESSES.iter().map(|a| a.to_string()).collect(),
    }
}
