//! HTTP request handlers.

use super::{AppError, AppState};
use crate::db::{
    dns_or_default, Configuration, ConfigurationPatch, NewConfiguration, TestStatus, DEFAULT_DNS,
    DEFAULT_MTU, DEFAULT_REGION, MAX_MTU, MIN_MTU,
};
use crate::probe::TestResult;
use crate::warp::Provenance;
use crate::wireguard::{parse, render, TunnelConfig};

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::header,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Region tag stored on uploaded records.
pub const UPLOAD_REGION: &str = "uploaded";

const DEFAULT_BATCH_COUNT: i64 = 5;

/// A configuration plus its derived test status.
#[derive(Debug, Serialize)]
pub struct ConfigurationView {
    #[serde(flatten)]
    pub configuration: Configuration,
    pub status: TestStatus,
}

impl From<Configuration> for ConfigurationView {
    fn from(configuration: Configuration) -> Self {
        let status = configuration.status();
        Self {
            configuration,
            status,
        }
    }
}

fn tunnel_of(config: &Configuration) -> TunnelConfig {
    TunnelConfig {
        private_key: config.private_key.clone(),
        public_key: config.public_key.clone(),
        endpoint: config.endpoint.clone(),
        addresses: config.addresses.clone(),
    }
}

fn check_mtu(mtu: u16) -> Result<(), AppError> {
    if (MIN_MTU..=MAX_MTU).contains(&mtu) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "MTU must be between {} and {}",
            MIN_MTU, MAX_MTU
        )))
    }
}

fn timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ============================================================================
// Listing
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// `invalid` limits the listing to records with `isValid = false`.
    #[serde(default)]
    pub status: Option<String>,
}

pub async fn handle_list(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<ConfigurationView>>, AppError> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let configs = match query.status.as_deref() {
        None | Some("all") => state.store.list()?,
        Some("invalid") => state.store.list_invalid()?,
        Some(other) => {
            return Err(AppError::BadRequest(format!("Unknown status filter: {}", other)));
        }
    };
    Ok(Json(configs.into_iter().map(ConfigurationView::from).collect()))
}

// ============================================================================
// Generation
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_dns")]
    pub dns: String,
    #[serde(default = "default_mtu")]
    pub mtu: u16,
    #[serde(default)]
    pub warp_plus: bool,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_dns() -> String {
    DEFAULT_DNS.to_string()
}

fn default_mtu() -> u16 {
    DEFAULT_MTU
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub configuration: ConfigurationView,
    pub content: String,
    pub provenance: Provenance,
}

pub async fn handle_generate(
    State(state): State<AppState>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, AppError> {
    let Json(req) = body?;
    check_mtu(req.mtu)?;

    let dns = dns_or_default(&req.dns).to_string();

    let synthesized = state.synthesizer.generate(&req.region, req.warp_plus).await;
    let content = render(&synthesized.tunnel, &dns, req.mtu)?;

    let name = match synthesized.provenance {
        Provenance::BotTable => format!("warp-plus-{}.conf", timestamp_ms()),
        _ => format!("warp-config-{}.conf", timestamp_ms()),
    };
    tracing::info!("Generated {} ({:?})", name, synthesized.provenance);

    let tunnel = synthesized.tunnel;
    let configuration = state.store.create(NewConfiguration {
        name,
        private_key: tunnel.private_key,
        public_key: tunnel.public_key,
        endpoint: tunnel.endpoint,
        dns,
        mtu: req.mtu,
        addresses: tunnel.addresses,
        warp_plus: req.warp_plus,
        region: req.region,
    })?;

    Ok(Json(GenerateResponse {
        configuration: configuration.into(),
        content,
        provenance: synthesized.provenance,
    }))
}

// ============================================================================
// Testing
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRequest {
    pub config_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResponse {
    pub configuration: ConfigurationView,
    pub test_results: TestResult,
}

pub async fn handle_test(
    State(state): State<AppState>,
    body: Result<Json<TestRequest>, JsonRejection>,
) -> Result<Json<TestResponse>, AppError> {
    let Json(req) = body?;

    let config = state
        .store
        .get(req.config_id)?
        .ok_or_else(AppError::config_not_found)?;
    let content = render(&tunnel_of(&config), &config.dns, config.mtu)?;

    let result = state.prober.probe(&content).await;
    let encoded = serde_json::to_string(&result)
        .map_err(|e| AppError::internal("Failed to test configuration", e))?;

    let updated = state.store.update(
        config.id,
        ConfigurationPatch::outcome(result.is_valid(), encoded),
    )?;
    tracing::info!("Tested configuration {}: valid={}", updated.id, updated.is_valid);

    Ok(Json(TestResponse {
        configuration: updated.into(),
        test_results: result,
    }))
}

// ============================================================================
// Download and deletion
// ============================================================================

pub async fn handle_download(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(id) = id?;
    let config = state.store.get(id)?.ok_or_else(AppError::config_not_found)?;
    let content = render(&tunnel_of(&config), &config.dns, config.mtu)?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", config.name.replace('"', "")),
            ),
        ],
        content,
    )
        .into_response())
}

pub async fn handle_delete(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Value>, AppError> {
    let Path(id) = id?;
    if !state.store.delete(id)? {
        return Err(AppError::config_not_found());
    }
    Ok(Json(json!({ "success": true })))
}

pub async fn handle_delete_invalid(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let deleted = state.store.delete_invalid()?;
    tracing::info!("Deleted {} invalid configurations", deleted);
    Ok(Json(json!({ "deletedCount": deleted })))
}

// ============================================================================
// Batch
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    #[serde(default = "default_batch_count")]
    pub count: i64,
    #[serde(default = "default_dns")]
    pub dns: String,
    #[serde(default = "default_mtu")]
    pub mtu: u16,
}

fn default_batch_count() -> i64 {
    DEFAULT_BATCH_COUNT
}

#[derive(Debug, Serialize)]
pub struct BatchEntry {
    pub configuration: ConfigurationView,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub success: bool,
    pub count: usize,
    pub configurations: Vec<BatchEntry>,
}

pub async fn handle_batch(
    State(state): State<AppState>,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchResponse>, AppError> {
    let Json(req) = body?;
    check_mtu(req.mtu)?;

    let count = usize::try_from(req.count.max(0)).unwrap_or(0);
    let items = state.batch.run(count, &req.dns, req.mtu).await?;

    let configurations: Vec<BatchEntry> = items
        .into_iter()
        .map(|item| BatchEntry {
            configuration: item.configuration.into(),
            content: item.content,
        })
        .collect();

    Ok(Json(BatchResponse {
        success: true,
        count: configurations.len(),
        configurations,
    }))
}

// ============================================================================
// Upload
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    #[serde(default)]
    pub content: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub configuration: ConfigurationView,
    pub message: &'static str,
}

pub async fn handle_upload(
    State(state): State<AppState>,
    body: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let Json(req) = body?;
    let content = match req.content.as_ref().and_then(Value::as_str) {
        Some(text) if !text.trim().is_empty() => text,
        _ => return Err(AppError::BadRequest("Configuration content is required".to_string())),
    };

    let parsed = parse(content)?;
    check_mtu(parsed.mtu)?;
    // Whatever is stored must render later for download and testing.
    render(&parsed.tunnel, &parsed.dns, parsed.mtu)?;

    let tunnel = parsed.tunnel;
    let configuration = state.store.create(NewConfiguration {
        name: format!("warp-uploaded-{}.conf", timestamp_ms()),
        private_key: tunnel.private_key,
        public_key: tunnel.public_key,
        endpoint: tunnel.endpoint,
        dns: parsed.dns,
        mtu: parsed.mtu,
        addresses: tunnel.addresses,
        warp_plus: true,
        region: UPLOAD_REGION.to_string(),
    })?;
    tracing::info!("Uploaded configuration {}", configuration.id);

    Ok(Json(UploadResponse {
        success: true,
        configuration: configuration.into(),
        message: "Configuration uploaded successfully",
    }))
}
