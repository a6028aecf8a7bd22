//! Legal role extraction handlers

use crate::error::{ApiError, AppError};
use crate::state::AppState;
use axum::{extract::State, Json};
use lexicon_core::{char_offset, Entity};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use validator::Validate;

/// Role reported for a person the model could not place
const UNKNOWN_ROLE: &str = "unknown";

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LegalEntityRequest {
    /// Legal text to analyze
    #[validate(length(min = 1))]
    #[schema(example = "In the case of Smith v. Jones, the plaintiff John Smith filed a lawsuit against the defendant Sarah Jones.")]
    pub text: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BatchLegalEntityRequest {
    /// Texts to analyze, at most 10 by default
    #[validate(length(min = 1))]
    pub texts: Vec<String>,
}

/// A person and their role in the text
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LegalEntity {
    #[schema(example = "John Smith")]
    pub name: String,
    /// defendant, plaintiff, representative or unknown
    #[schema(example = "plaintiff")]
    pub role: String,
    pub start_pos: usize,
    pub end_pos: usize,
    pub confidence: f32,
}

impl LegalEntity {
    pub fn from_entity(source: &str, entity: &Entity) -> Self {
        Self {
            name: entity.text.clone(),
            role: entity
                .role
                .map_or(UNKNOWN_ROLE, |role| role.as_str())
                .to_string(),
            start_pos: char_offset(source, entity.start),
            end_pos: char_offset(source, entity.end),
            confidence: entity.confidence,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LegalEntityResponse {
    /// Original text
    pub text: String,
    pub entities: Vec<LegalEntity>,
}

impl LegalEntityResponse {
    fn new(text: String, entities: &[Entity]) -> Self {
        let entities = entities
            .iter()
            .map(|entity| LegalEntity::from_entity(&text, entity))
            .collect();
        Self { text, entities }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchLegalEntityResponse {
    pub results: Vec<LegalEntityResponse>,
}

/// Identify the people in a legal text and their roles
#[utoipa::path(
    post,
    path = "/api/legal-entities",
    tag = "legal",
    request_body = LegalEntityRequest,
    responses(
        (status = 200, description = "People and roles found", body = LegalEntityResponse),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 401, description = "Missing API key", body = ApiError),
        (status = 403, description = "Invalid API key", body = ApiError),
        (status = 501, description = "No remote model configured", body = ApiError),
        (status = 502, description = "Remote model failed", body = ApiError)
    ),
    security(("api_key" = []))
)]
pub async fn extract_legal_entities(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LegalEntityRequest>,
) -> Result<Json<LegalEntityResponse>, AppError> {
    request.validate()?;

    let entities = state.service.extract_legal(&request.text).await?;
    Ok(Json(LegalEntityResponse::new(request.text, &entities)))
}

/// Identify people and roles in several legal texts
#[utoipa::path(
    post,
    path = "/api/legal-entities/batch",
    tag = "legal",
    request_body = BatchLegalEntityRequest,
    responses(
        (status = 200, description = "People and roles per text", body = BatchLegalEntityResponse),
        (status = 400, description = "Empty or oversized batch", body = ApiError),
        (status = 401, description = "Missing API key", body = ApiError),
        (status = 403, description = "Invalid API key", body = ApiError),
        (status = 501, description = "No remote model configured", body = ApiError),
        (status = 502, description = "Remote model failed", body = ApiError)
    ),
    security(("api_key" = []))
)]
pub async fn extract_legal_entities_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchLegalEntityRequest>,
) -> Result<Json<BatchLegalEntityResponse>, AppError> {
    request.validate()?;

    let results = state.service.extract_legal_batch(&request.texts).await?;
    let results = request
        .texts
        .into_iter()
        .zip(results)
        .map(|(text, entities)| LegalEntityResponse::new(text, &entities))
        .collect();

    Ok(Json(BatchLegalEntityResponse { results }))
}
