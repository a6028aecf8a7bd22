//! Health and statistics handlers

use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use lexicon_service::ServiceStats;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    /// Whether the tagging model is loaded
    pub model_loaded: bool,
    /// Whether a remote model is configured for legal extraction
    pub openai_configured: bool,
    #[schema(example = "0.1.0")]
    pub version: String,
    pub uptime_seconds: u64,
}

/// Health check
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let service = &state.service;
    Json(HealthResponse {
        status: "ok".to_string(),
        model_loaded: service.model_loaded(),
        openai_configured: service.legal_configured(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_secs(),
    })
}

/// Statistics response
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    /// HTTP requests seen by the compute routes
    pub total_requests: u64,
    pub model_id: String,
    /// Request, cache and batching counters
    #[schema(value_type = Object)]
    pub service: ServiceStats,
}

/// Cache and request statistics
#[utoipa::path(
    get,
    path = "/api/stats",
    tag = "health",
    responses(
        (status = 200, description = "Current statistics", body = StatsResponse)
    )
)]
pub async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(StatsResponse {
        total_requests: state.get_request_count(),
        model_id: state.service.model_id().to_string(),
        service: state.service.stats(),
    })
}
