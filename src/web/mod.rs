//! Web server module.

mod error;
mod handlers;

pub use error::*;
pub use handlers::*;

use crate::db::ConfigStore;
use crate::probe::Prober;
use crate::warp::{BatchGenerator, Synthesizer};

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ConfigStore>,
    pub synthesizer: Arc<Synthesizer>,
    pub batch: Arc<BatchGenerator>,
    pub prober: Arc<dyn Prober>,
}

/// Build the router with all routes.
pub fn routes(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/configurations", get(handlers::handle_list))
        .route("/api/configurations/generate", post(handlers::handle_generate))
        .route("/api/configurations/test", post(handlers::handle_test))
        .route("/api/configurations/telegram-batch", post(handlers::handle_batch))
        .route("/api/configurations/upload", post(handlers::handle_upload))
        // Static segment, matched ahead of `{id}`.
        .route("/api/configurations/invalid", delete(handlers::handle_delete_invalid))
        .route("/api/configurations/{id}", delete(handlers::handle_delete))
        .route("/api/configurations/{id}/download", get(handlers::handle_download))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB
        .with_state(state)
}

/// Web server for warpgen.
pub struct Server {
    port: u16,
    state: AppState,
}

impl Server {
    pub fn new(port: u16, state: AppState) -> Self {
        Self { port, state }
    }

    /// Start the server on the configured port.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let router = routes(self.state.clone());

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
