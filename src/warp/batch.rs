//! Batch generation of premium configurations.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::Synthesizer;
use crate::db::{dns_or_default, ConfigStore, Configuration, DbError, NewConfiguration};
use crate::wireguard::{render, ConfError};

/// Upper bound on configurations produced by one batch call.
pub const MAX_BATCH: usize = 10;

/// Region tag stored on batch-produced records.
pub const BATCH_REGION: &str = "telegram-bot";

#[derive(Error, Debug)]
pub enum BatchError {
    #[error(transparent)]
    Conf(#[from] ConfError),
    #[error(transparent)]
    Db(#[from] DbError),
}

/// A stored configuration and its rendered text.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub configuration: Configuration,
    pub content: String,
}

/// Synthesizes, renders and stores up to `MAX_BATCH` configurations per call.
pub struct BatchGenerator {
    synthesizer: Arc<Synthesizer>,
    store: Arc<dyn ConfigStore>,
    delay: Duration,
}

impl BatchGenerator {
    pub fn new(synthesizer: Arc<Synthesizer>, store: Arc<dyn ConfigStore>, delay: Duration) -> Self {
        Self {
            synthesizer,
            store,
            delay,
        }
    }

    /// Produce `count` (clamped to `MAX_BATCH`) configurations.
    ///
    /// Items are created one at a time with `delay` between them. An error
    /// stops the batch; records already stored stay stored.
    pub async fn run(&self, count: usize, dns: &str, mtu: u16) -> Result<Vec<BatchItem>, BatchError> {
        let count = count.min(MAX_BATCH);
        let dns = dns_or_default(dns);
        let mut items = Vec::with_capacity(count);

        for slot in 0..count {
            if slot > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let synthesized = self.synthesizer.generate_indexed(slot).await;
            let content = render(&synthesized.tunnel, dns, mtu)?;
            let tunnel = synthesized.tunnel;

            let configuration = self.store.create(NewConfiguration {
                name: batch_name(),
                private_key: tunnel.private_key,
                public_key: tunnel.public_key,
                endpoint: tunnel.endpoint,
                dns: dns.to_string(),
                mtu,
                addresses: tunnel.addresses,
                warp_plus: true,
                region: BATCH_REGION.to_string(),
            })?;

            items.push(BatchItem {
                configuration,
                content,
            });
        }

        tracing::info!("Batch produced {} configurations", items.len());
        Ok(items)
    }
}

fn batch_name() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(5)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("warp-batch-{}-{}.conf", chrono::Utc::now().timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, DEFAULT_DNS};
    use crate::warp::{BotEntry, BotTable, ConfigSource, Provenance, SourceError, SourceRequest};
    use crate::wireguard::TunnelConfig;
    use async_trait::async_trait;

    struct DownSource;

    #[async_trait]
    impl ConfigSource for DownSource {
        fn name(&self) -> &str {
            "down"
        }

        fn provenance(&self) -> Provenance {
            Provenance::Registered
        }

        async fn fetch(&self, _request: SourceRequest<'_>) -> Result<TunnelConfig, SourceError> {
            Err(SourceError::Unavailable("offline".to_string()))
        }
    }

    fn generator(store: Arc<dyn ConfigStore>) -> BatchGenerator {
        let table: Arc<dyn ConfigSource> = Arc::new(BotTable::new(
            (0..5)
                .map(|i| BotEntry {
                    private_key: format!("key-{}=", i),
                    public_key: "peer=".to_string(),
                    addresses: vec![],
                })
                .collect(),
        ));
        let synth = Arc::new(Synthesizer::new(Arc::new(DownSource), Some(table)));
        BatchGenerator::new(synth, store, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_batch_is_clamped() {
        let store: Arc<dyn ConfigStore> = Arc::new(MemoryStore::new());
        let items = generator(store.clone()).run(15, "1.1.1.1", 1280).await.unwrap();

        assert_eq!(items.len(), MAX_BATCH);
        assert_eq!(store.list().unwrap().len(), MAX_BATCH);
        assert!(items.iter().all(|i| i.configuration.warp_plus));
        assert!(items.iter().all(|i| i.configuration.region == BATCH_REGION));
        assert!(items.iter().all(|i| !i.configuration.is_valid));
        assert!(items[0].content.contains("MTU = 1280"));
    }

    #[tokio::test]
    async fn test_batch_spreads_table() {
        let store: Arc<dyn ConfigStore> = Arc::new(MemoryStore::new());
        let items = generator(store).run(3, "1.1.1.1", 1280).await.unwrap();
        let keys: Vec<&str> = items.iter().map(|i| i.configuration.private_key.as_str()).collect();
        assert_eq!(keys, vec!["key-0=", "key-1=", "key-2="]);
    }

    #[tokio::test]
    async fn test_bad_dns_writes_nothing() {
        let store: Arc<dyn ConfigStore> = Arc::new(MemoryStore::new());
        let err = generator(store.clone()).run(3, "1.1.1.1\n", 1280).await.unwrap_err();
        assert!(matches!(err, BatchError::Conf(_)));
        assert!(store.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_dns_matches_stored_record() {
        let store: Arc<dyn ConfigStore> = Arc::new(MemoryStore::new());
        let items = generator(store.clone()).run(2, "  ", 1280).await.unwrap();

        for item in &items {
            assert_eq!(item.configuration.dns, DEFAULT_DNS);
            assert!(item.content.contains(&format!("DNS = {}\n", DEFAULT_DNS)));
            let stored = store.get(item.configuration.id).unwrap().unwrap();
            assert_eq!(stored.dns, DEFAULT_DNS);
        }
    }

    #[test]
    fn test_batch_name() {
        let name = batch_name();
        assert!(name.starts_with("warp-batch-"));
        assert!(name.ends_with(".conf"));
    }
}
