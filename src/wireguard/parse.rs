//! Parsing user-supplied WireGuard INI text.

use super::{ConfError, TunnelConfig};
use crate::db::{DEFAULT_ADDRESS, DEFAULT_DNS, DEFAULT_MTU};

/// A parsed upload: the tunnel plus its interface DNS and MTU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedConfig {
    pub tunnel: TunnelConfig,
    pub dns: String,
    pub mtu: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Interface,
    Peer,
    Other,
}

/// Parse WireGuard INI text.
///
/// Section headers and keys are case-insensitive, values are split on the
/// first `=` so base64 padding survives, and unknown keys are ignored. A bad
/// `MTU` falls back to 1280. Fails listing every missing required field.
pub fn parse(text: &str) -> Result<ParsedConfig, ConfError> {
    let mut section = Section::None;
    let mut private_key = String::new();
    let mut public_key = String::new();
    let mut endpoint = String::new();
    let mut addresses: Vec<String> = Vec::new();
    let mut dns = DEFAULT_DNS.to_string();
    let mut mtu = DEFAULT_MTU;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            section = match trimmed.to_ascii_lowercase().as_str() {
                "[interface]" => Section::Interface,
                "[peer]" => Section::Peer,
                _ => Section::Other,
            };
            continue;
        }

        let Some((key, value)) = trimmed.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();

        match (section, key.as_str()) {
            (Section::Interface, "privatekey") => private_key = value.to_string(),
            (Section::Interface, "dns") => dns = value.to_string(),
            (Section::Interface, "mtu") => mtu = value.parse().unwrap_or(DEFAULT_MTU),
            (Section::Interface, "address") => {
                addresses.extend(
                    value
                        .split(',')
                        .map(|a| a.trim().to_string())
                        .filter(|a| !a.is_empty()),
                );
            }
            (Section::Peer, "publickey") => public_key = value.to_string(),
            (Section::Peer, "endpoint") => endpoint = value.to_string(),
            _ => {}
        }
    }

    let mut missing = Vec::new();
    if private_key.is_empty() {
        missing.push("PrivateKey");
    }
    if public_key.is_empty() {
        missing.push("PublicKey");
    }
    if endpoint.is_empty() {
        missing.push("Endpoint");
    }
    if !missing.is_empty() {
        return Err(ConfError::MissingFields(missing));
    }

    if addresses.is_empty() {
        addresses.push(DEFAULT_ADDRESS.to_string());
    }

    Ok(ParsedConfig {
        tunnel: TunnelConfig {
            private_key,
            public_key,
            endpoint,
            addresses,
        },
        dns,
        mtu,
    })
}
