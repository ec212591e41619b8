//! Liveness and landing routes.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

pub const WELCOME_TEXT: &str = "Welcome to My Book Library!";

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub storage_backend: String,
}

/// GET / - Plain-text welcome.
pub async fn welcome() -> &'static str {
    WELCOME_TEXT
}

/// GET /health - Both stores reachable.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.metadata.health_check().await?;
    state.storage.health_check().await?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        storage_backend: state.storage.backend_name().to_string(),
    }))
}
