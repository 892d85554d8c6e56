//! HTTP error mapping.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::db::DbError;
use crate::warp::BatchError;
use crate::wireguard::ConfError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Detail is logged; the client only sees the public message.
    #[error("Internal error: {detail}")]
    Internal { public: &'static str, detail: String },
}

impl AppError {
    pub fn internal(public: &'static str, detail: impl ToString) -> Self {
        AppError::Internal {
            public,
            detail: detail.to_string(),
        }
    }

    pub fn config_not_found() -> Self {
        AppError::NotFound("Configuration not found".to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            AppError::Internal { public, detail } => {
                tracing::error!("{}: {}", public, detail);
                (StatusCode::INTERNAL_SERVER_ERROR, public.to_string())
            }
        };
        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}

impl From<DbError> for AppError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound => AppError::config_not_found(),
            other => AppError::internal("Storage failure", other),
        }
    }
}

impl From<ConfError> for AppError {
    fn from(e: ConfError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl From<BatchError> for AppError {
    fn from(e: BatchError) -> Self {
        match e {
            BatchError::Conf(e) => e.into(),
            BatchError::Db(e) => e.into(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        AppError::BadRequest(e.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(e: PathRejection) -> Self {
        AppError::BadRequest(e.body_text())
    }
}
