//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lexicon_core::LexiconError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::ValidationErrors;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    #[schema(example = "BAD_REQUEST")]
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn unauthorized() -> Self {
        Self::new(
            "UNAUTHORIZED",
            "API key is missing. Provide a valid API key in the X-API-Key header.",
        )
    }

    pub fn forbidden() -> Self {
        Self::new("FORBIDDEN", "Invalid API key")
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    Forbidden,
    NotImplemented(String),
    BadGateway(String),
    ServiceUnavailable(String),
    GatewayTimeout(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ApiError::bad_request(msg)),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, ApiError::unauthorized()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, ApiError::forbidden()),
            AppError::NotImplemented(msg) => (
                StatusCode::NOT_IMPLEMENTED,
                ApiError::new("NOT_IMPLEMENTED", msg),
            ),
            AppError::BadGateway(msg) => (
                StatusCode::BAD_GATEWAY,
                ApiError::new("REMOTE_MODEL_ERROR", "Remote model request failed").with_details(msg),
            ),
            AppError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiError::new("SERVICE_UNAVAILABLE", "Service temporarily unavailable")
                    .with_details(msg),
            ),
            AppError::GatewayTimeout(msg) => (
                StatusCode::GATEWAY_TIMEOUT,
                ApiError::new("TIMEOUT", "Request timed out").with_details(msg),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::internal_error().with_details(msg),
            ),
        };

        (status, Json(error)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<LexiconError> for AppError {
    fn from(err: LexiconError) -> Self {
        let message = err.to_string();
        match err {
            LexiconError::Validation(msg) => AppError::BadRequest(msg),
            LexiconError::BackendUnavailable(_) | LexiconError::Overloaded(_) => {
                AppError::ServiceUnavailable(message)
            }
            LexiconError::RemoteModel(_) | LexiconError::RemoteModelExhausted { .. } => {
                AppError::BadGateway(message)
            }
            LexiconError::RemoteModelUnconfigured(_) => AppError::NotImplemented(message),
            LexiconError::Timeout(_) => AppError::GatewayTimeout(message),
            LexiconError::CacheCompute(_) | LexiconError::Config(_) => AppError::Internal(message),
        }
    }
}
