use crate::api::AppState;
use crate::domain::{PositionKey, TimeMs, TokenUnit, WalletAddress};
use crate::error::AppError;
use crate::orchestration::{EventView, PositionReport};
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionsQuery {
    pub wallet: String,
    pub include_closed: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionsResponse {
    pub wallet: String,
    pub as_of: i64,
    pub positions: Vec<PositionReport>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionEventsQuery {
    pub wallet: String,
    pub token_unit: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionEventsResponse {
    pub wallet: String,
    pub token_unit: String,
    pub events: Vec<EventView>,
}

pub async fn get_positions(
    Query(params): Query<PositionsQuery>,
    State(state): State<AppState>,
) -> Result<Json<PositionsResponse>, AppError> {
    let wallet = WalletAddress::from_str(&params.wallet)
        .map_err(|_| AppError::BadRequest("Invalid wallet address".into()))?;
    let now = TimeMs::now();

    let positions = state
        .reports
        .position_report(&wallet, params.include_closed.unwrap_or(false), now)
        .await
        .map_err(|e| AppError::Internal(format!("Position query failed: {}", e)))?;

    Ok(Json(PositionsResponse {
        wallet: wallet.to_string(),
        as_of: now.as_ms(),
        positions,
    }))
}

pub async fn get_position_events(
    Query(params): Query<PositionEventsQuery>,
    State(state): State<AppState>,
) -> Result<Json<PositionEventsResponse>, AppError> {
    let wallet = WalletAddress::from_str(&params.wallet)
        .map_err(|_| AppError::BadRequest("Invalid wallet address".into()))?;
    let token_unit = TokenUnit::from_str(&params.token_unit)
        .map_err(|_| AppError::BadRequest("Invalid token unit".into()))?;
    let key = PositionKey::new(wallet, token_unit);

    if state.repo.get_position(&key).await?.is_none() {
        return Err(AppError::NotFound(format!("No position for {}", key)));
    }
    let events = state
        .reports
        .events(&key)
        .await
        .map_err(|e| AppError::Internal(format!("Event query failed: {}", e)))?;

    Ok(Json(PositionEventsResponse {
        wallet: key.wallet.to_string(),
        token_unit: key.token_unit.to_string(),
        events,
    }))
}
