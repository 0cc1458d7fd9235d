pub mod health;
pub mod positions;

use crate::db::Repository;
use crate::orchestration::ReportService;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub reports: Arc<ReportService>,
}

impl AppState {
    pub fn new(repo: Arc<Repository>, reports: Arc<ReportService>) -> Self {
        Self { repo, reports }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/positions", get(positions::get_positions))
        .route("/v1/positions/events", get(positions::get_position_events))
        .layer(cors)
        .with_state(state)
}
