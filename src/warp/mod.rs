//! Warp tunnel synthesis.
//!
//! A `Synthesizer` asks its config sources, in order, for a tunnel and falls
//! back to locally generated material when all of them fail. Callers learn
//! which path produced the tunnel from `Provenance`.

mod batch;
mod bot_table;
mod keys;
mod registrar;
mod synthesizer;

pub use batch::*;
pub use bot_table::*;
pub use keys::*;
pub use registrar::*;
pub use synthesizer::*;

use crate::wireguard::TunnelConfig;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Region tags accepted by the generator; anything else resolves like `auto`.
pub const REGION_ENDPOINTS: &[(&str, &str)] = &[
    ("auto", "engage.cloudflare.com:2408"),
    ("us-east", "engage.cloudflare.com:2408"),
    ("us-west", "engage.cloudflare.com:2408"),
    ("eu-central", "engage.cloudflare.com:2408"),
    ("asia-pacific", "engage.cloudflare.com:2408"),
];

/// Endpoints used when no remote source answered.
pub const ALTERNATE_ENDPOINTS: &[&str] = &[
    "162.159.192.1:2408",
    "162.159.193.1:2408",
    "162.159.195.1:2408",
    "188.114.96.1:2408",
    "188.114.97.1:2408",
    "engage.cloudflare.com:2408",
    "engage.cloudflare.com:500",
    "engage.cloudflare.com:1701",
    "engage.cloudflare.com:4500",
];

pub const DEFAULT_ADDRESSES: &[&str] = &[
    "10.2.0.2/32",
    "fd01:5ca1:ab1e:8061:84f1:8b0b:8c1f:4d76/128",
];

/// Map a region tag to its endpoint.
pub fn region_endpoint(region: &str) -> &'static str {
    REGION_ENDPOINTS
        .iter()
        .find(|(name, _)| *name == region)
        .unwrap_or(&REGION_ENDPOINTS[0])
        .1
}

/// Where a synthesized tunnel came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    /// Registered with a Warp API endpoint.
    Registered,
    /// Taken from the premium entry table.
    BotTable,
    /// Placeholder keys generated locally; not registered anywhere.
    Fallback,
}

/// A tunnel plus its provenance.
#[derive(Debug, Clone)]
pub struct Synthesized {
    pub tunnel: TunnelConfig,
    pub provenance: Provenance,
}

/// Config source error types.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("request to {0} timed out")]
    Timeout(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("{url} answered {status}")]
    Status { url: String, status: u16 },
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

/// What a source is asked for.
#[derive(Debug, Clone, Copy)]
pub struct SourceRequest<'a> {
    pub region: &'a str,
    /// Position within a batch; sources that rotate entries use it to spread
    /// a batch across their table. `None` for single requests.
    pub slot: Option<usize>,
}

/// A provider of tunnel configurations.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    fn name(&self) -> &str;

    fn provenance(&self) -> Provenance;

    async fn fetch(&self, request: SourceRequest<'_>) -> Result<TunnelConfig, SourceError>;
}
