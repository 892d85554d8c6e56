//! WireGuard INI rendering and parsing.

mod format;
mod parse;

pub use format::*;
pub use parse::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed routing for every rendered peer.
pub const ALLOWED_IPS: &str = "0.0.0.0/0, ::/0";
pub const PERSISTENT_KEEPALIVE: u32 = 25;

/// Key material and addressing for one tunnel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelConfig {
    pub private_key: String,
    pub public_key: String,
    /// `host:port`
    pub endpoint: String,
    pub addresses: Vec<String>,
}

/// Errors for text that cannot be rendered or parsed.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfError {
    #[error("field {0} must not contain line breaks")]
    Newline(&'static str),
    #[error("Invalid WireGuard configuration: missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
}
