//! Lexicon API - HTTP server
//!
//! Exposes entity recognition and legal role extraction over JSON, with
//! OpenAPI documentation served next to the endpoints.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod state;

use crate::handlers::{health, legal, ner, ApiDoc};
use crate::state::AppState;
use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    // Compute routes sit behind the API key check
    let protected_routes = Router::new()
        .route("/api/ner", post(ner::extract_entities))
        .route("/api/ner/batch", post(ner::extract_entities_batch))
        .route("/api/legal-entities", post(legal::extract_legal_entities))
        .route(
            "/api/legal-entities/batch",
            post(legal::extract_legal_entities_batch),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::api_key_middleware,
        ));

    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/stats", get(health::stats));

    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}
