//! Premium entries served from a pre-provisioned table.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::Deserialize;
use std::path::Path;

use super::{ConfigSource, Provenance, SourceError, SourceRequest, DEFAULT_ADDRESSES};
use crate::wireguard::TunnelConfig;

/// Endpoints rotated across table entries.
pub const ROTATION_ENDPOINTS: &[&str] = &[
    "162.159.192.1:2408",
    "162.159.193.1:2408",
    "162.159.195.1:2408",
    "188.114.96.1:2408",
    "188.114.97.1:2408",
    "engage.cloudflare.com:500",
    "engage.cloudflare.com:1701",
    "engage.cloudflare.com:4500",
];

/// One provisioned premium account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotEntry {
    pub private_key: String,
    pub public_key: String,
    #[serde(default)]
    pub addresses: Vec<String>,
}

/// Config source over a fixed list of premium entries.
///
/// Stands in for a bot client; anything that yields entries can replace it
/// behind `ConfigSource`.
pub struct BotTable {
    entries: Vec<BotEntry>,
}

impl BotTable {
    pub fn new(entries: Vec<BotEntry>) -> Self {
        Self { entries }
    }

    /// Load entries from a JSON array file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SourceError::Unavailable(format!("{}: {}", path.display(), e)))?;
        let entries: Vec<BotEntry> =
            serde_json::from_str(&raw).map_err(|e| SourceError::Decode(e.to_string()))?;

        tracing::info!("Loaded {} premium entries from {}", entries.len(), path.display());
        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn pick(&self, slot: Option<usize>) -> Option<(&BotEntry, &'static str)> {
        match slot {
            Some(i) => self.entries.get(i % self.entries.len().max(1)).map(|entry| {
                (entry, ROTATION_ENDPOINTS[i % ROTATION_ENDPOINTS.len()])
            }),
            None => {
                let mut rng = rand::thread_rng();
                let entry = self.entries.choose(&mut rng)?;
                let endpoint = ROTATION_ENDPOINTS.choose(&mut rng)?;
                Some((entry, *endpoint))
            }
        }
    }
}

#[async_trait]
impl ConfigSource for BotTable {
    fn name(&self) -> &str {
        "bot-table"
    }

    fn provenance(&self) -> Provenance {
        Provenance::BotTable
    }

    async fn fetch(&self, request: SourceRequest<'_>) -> Result<TunnelConfig, SourceError> {
        let (entry, endpoint) = self
            .pick(request.slot)
            .ok_or_else(|| SourceError::Unavailable("premium table is empty".to_string()))?;

        let addresses = if entry.addresses.is_empty() {
            DEFAULT_ADDRESSES.iter().map(|a| a.to_string()).collect()
        } else {
            entry.addresses.clone()
        };

        Ok(TunnelConfig {
            private_key: entry.private_key.clone(),
            public_key: entry.public_key.clone(),
            endpoint: endpoint.to_string(),
            addresses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn entry(n: u8) -> BotEntry {
        BotEntry {
            private_key: format!("private-{}", n),
            public_key: "bmXOC+F1FxEMF9dyiK2H5/1SUtzH0JuVo51h2wPfgyo=".to_string(),
            addresses: vec![],
        }
    }

    #[tokio::test]
    async fn test_slots_rotate() {
        let table = BotTable::new((0..3).map(entry).collect());

        let first = table
            .fetch(SourceRequest { region: "auto", slot: Some(0) })
            .await
            .unwrap();
        let fourth = table
            .fetch(SourceRequest { region: "auto", slot: Some(3) })
            .await
            .unwrap();

        assert_eq!(first.private_key, "private-0");
        assert_eq!(first.endpoint, ROTATION_ENDPOINTS[0]);
        assert_eq!(fourth.private_key, "private-0");
        assert_eq!(fourth.endpoint, ROTATION_ENDPOINTS[3]);
        assert_eq!(first.addresses.len(), DEFAULT_ADDRESSES.len());
    }

    #[tokio::test]
    async fn test_random_pick_comes_from_table() {
        let table = BotTable::new((0..2).map(entry).collect());
        let tunnel = table
            .fetch(SourceRequest { region: "auto", slot: None })
            .await
            .unwrap();
        assert!(tunnel.private_key.starts_with("private-"));
        assert!(ROTATION_ENDPOINTS.contains(&tunnel.endpoint.as_str()));
    }

    #[tokio::test]
    async fn test_empty_table_is_unavailable() {
        let table = BotTable::new(vec![]);
        let result = table.fetch(SourceRequest { region: "auto", slot: Some(4) }).await;
        assert!(matches!(result, Err(SourceError::Unavailable(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(
            tmp,
            r#"[{{"privateKey":"a=","publicKey":"b=","addresses":["10.2.0.2/32"]}}]"#
        )
        .unwrap();

        let table = BotTable::load(tmp.path()).unwrap();
        assert_eq!(table.len(), 1);
        assert!(BotTable::load("/nonexistent/warpgen.json").is_err());
    }
}
