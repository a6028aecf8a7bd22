//! API key authentication
//!
//! Compute routes require the `X-API-Key` header when `auth.require_api_key`
//! is set. A missing key is 401, a wrong key is 403.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Check the request's API key against the configured one
pub async fn api_key_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    state.increment_requests();

    let auth = &state.config.auth;
    if auth.require_api_key {
        let provided = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok());

        match provided {
            None => {
                warn!(path = %request.uri().path(), "API key missing in request");
                return Err(AppError::Unauthorized);
            }
            Some(key) if !keys_match(key, &auth.api_key) => {
                warn!(path = %request.uri().path(), "Invalid API key provided");
                return Err(AppError::Forbidden);
            }
            Some(_) => {}
        }
    }

    Ok(next.run(request).await)
}

/// Compare without short-circuiting on the first differing byte
fn keys_match(provided: &str, expected: &str) -> bool {
    let (a, b) = (provided.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
