use crate::datasource::DataSourceError;
use crate::domain::{AmountError, PositionKey};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure of a single reconciliation.
///
/// Every variant is scoped to one (wallet, token unit) pair; the sweep logs
/// it and moves on.
#[derive(Debug, Error)]
pub enum PositionError {
    /// Malformed or negative observation. Nothing is persisted.
    #[error("validation failed: {0}")]
    Validation(String),
    /// An LP ratio was needed but none was observed. Retried next sweep.
    #[error("price ratio required for {0} but unavailable")]
    MissingPriceData(PositionKey),
    /// Upstream lookup failed or timed out. Never treated as a zero balance.
    #[error("upstream unavailable for {key}: {source}")]
    UpstreamTimeout {
        key: PositionKey,
        #[source]
        source: DataSourceError,
    },
    /// Stored row is in an impossible state; the row is frozen.
    #[error("inconsistent stored state for {key}: {reason}")]
    Consistency { key: PositionKey, reason: String },
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl From<AmountError> for PositionError {
    fn from(err: AmountError) -> Self {
        PositionError::Validation(err.to_string())
    }
}

impl PositionError {
    /// Short label for logs and sweep counters.
    pub fn kind(&self) -> &'static str {
        match self {
            PositionError::Validation(_) => "validation",
            PositionError::MissingPriceData(_) => "missing_price_data",
            PositionError::UpstreamTimeout { .. } => "upstream_timeout",
            PositionError::Consistency { .. } => "consistency",
            PositionError::Db(_) => "db",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
