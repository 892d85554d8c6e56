//! warpgen - WireGuard configuration generator for Cloudflare Warp endpoints.
//!
//! Generates, stores, probes and serves WireGuard configurations over a small
//! JSON API.

mod config;
mod db;
mod probe;
mod warp;
mod web;
mod wireguard;

use config::{ProberKind, ServerConfig};
use probe::{NetworkProber, Prober, SimulatedProber};
use warp::{BatchGenerator, BotTable, ConfigSource, Synthesizer, WarpRegistrar};
use web::{AppState, Server};

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("warpgen=info".parse()?))
        .init();

    let cfg = ServerConfig::load();
    tracing::info!("Starting warpgen on port {}...", cfg.http_port);

    let store = db::open_store(&cfg)?;

    let registrar = Arc::new(WarpRegistrar::new(cfg.registration_urls.clone(), cfg.registration_timeout)?);
    let premium: Option<Arc<dyn ConfigSource>> = match &cfg.bot_table_path {
        Some(path) => match BotTable::load(path) {
            Ok(table) if table.is_empty() => {
                tracing::warn!("Premium table {} has no entries, premium source disabled", path);
                None
            }
            Ok(table) => {
                tracing::info!("Premium table enabled with {} entries", table.len());
                Some(Arc::new(table))
            }
            Err(e) => {
                tracing::warn!("Premium table disabled: {}", e);
                None
            }
        },
        None => None,
    };
    let synthesizer = Arc::new(Synthesizer::new(registrar, premium));

    let prober: Arc<dyn Prober> = match cfg.prober {
        ProberKind::Network => Arc::new(NetworkProber::new(cfg.probe_timeout, cfg.speed_test_url.clone())?),
        ProberKind::Simulated => {
            tracing::warn!("Using simulated prober; test results are random");
            let simulated = match cfg.probe_seed {
                Some(seed) => SimulatedProber::seeded(seed),
                None => SimulatedProber::new(),
            };
            Arc::new(simulated.with_delays(cfg.probe_delays))
        }
    };

    let batch = Arc::new(BatchGenerator::new(synthesizer.clone(), store.clone(), cfg.batch_delay));

    let server = Server::new(
        cfg.http_port,
        AppState {
            store,
            synthesizer,
            batch,
            prober,
        },
    );
    server.start().await?;

    Ok(())
}
