//! Health check handler

use axum::{extract::State, response::Json};
use chrono::Utc;

use crate::{models::HealthResponse, server::AppState};

/// Liveness endpoint; never cached, never rate limited
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::online(
        Utc::now(),
        state.start_time.elapsed().as_secs(),
        state.cache.stats(),
    ))
}
