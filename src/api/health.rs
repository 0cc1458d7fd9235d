use crate::api::AppState;
use crate::error::AppError;
use axum::extract::State;
use axum::Json;
use tracing::warn;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Ready once the database answers.
pub async fn ready(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    state.repo.health_check().await.map_err(|e| {
        warn!(error = %e, "Readiness check failed");
        AppError::Unavailable("database unavailable".into())
    })?;
    Ok(Json(serde_json::json!({"status": "ready"})))
}
