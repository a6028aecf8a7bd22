//! Named entity recognition handlers

use crate::error::{ApiError, AppError};
use crate::state::AppState;
use axum::{extract::State, Json};
use lexicon_core::{char_offset, Entity};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use utoipa::ToSchema;
use validator::Validate;

/// Single text request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct NerRequest {
    /// Text to analyze
    #[validate(length(min = 1))]
    #[schema(example = "Presiden Joko Widodo mengunjungi Jakarta untuk bertemu dengan Menteri Anies Baswedan.")]
    pub text: String,
}

/// Batch request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BatchNerRequest {
    /// Texts to analyze, at most 100 by default
    #[validate(length(min = 1))]
    pub texts: Vec<String>,
}

/// A recognized entity, with character offsets
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NerEntity {
    #[schema(example = "Joko Widodo")]
    pub text: String,
    /// PER, LOC or ORG
    #[serde(rename = "type")]
    #[schema(example = "PER")]
    pub entity_type: String,
    pub start_pos: usize,
    pub end_pos: usize,
    pub confidence: f32,
}

impl NerEntity {
    pub fn from_entity(source: &str, entity: &Entity) -> Self {
        Self {
            text: entity.text.clone(),
            entity_type: entity.entity_type.as_str().to_string(),
            start_pos: char_offset(source, entity.start),
            end_pos: char_offset(source, entity.end),
            confidence: entity.confidence,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NerResponse {
    /// Original text
    pub text: String,
    pub entities: Vec<NerEntity>,
}

impl NerResponse {
    fn new(text: String, entities: &[Entity]) -> Self {
        let entities = entities
            .iter()
            .map(|entity| NerEntity::from_entity(&text, entity))
            .collect();
        Self { text, entities }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchNerResponse {
    /// One result per input text, in input order
    pub results: Vec<NerResponse>,
}

/// Extract named entities from a text
#[utoipa::path(
    post,
    path = "/api/ner",
    tag = "ner",
    request_body = NerRequest,
    responses(
        (status = 200, description = "Entities found", body = NerResponse),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 401, description = "Missing API key", body = ApiError),
        (status = 403, description = "Invalid API key", body = ApiError),
        (status = 503, description = "Tagging backend unavailable", body = ApiError)
    ),
    security(("api_key" = []))
)]
pub async fn extract_entities(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NerRequest>,
) -> Result<Json<NerResponse>, AppError> {
    request.validate()?;

    let entities = state.service.recognize(&request.text).await?;
    debug!(entities = entities.len(), "NER request served");

    Ok(Json(NerResponse::new(request.text, &entities)))
}

/// Extract named entities from several texts
#[utoipa::path(
    post,
    path = "/api/ner/batch",
    tag = "ner",
    request_body = BatchNerRequest,
    responses(
        (status = 200, description = "Entities per text", body = BatchNerResponse),
        (status = 400, description = "Empty or oversized batch", body = ApiError),
        (status = 401, description = "Missing API key", body = ApiError),
        (status = 403, description = "Invalid API key", body = ApiError),
        (status = 503, description = "Tagging backend unavailable or overloaded", body = ApiError)
    ),
    security(("api_key" = []))
)]
pub async fn extract_entities_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchNerRequest>,
) -> Result<Json<BatchNerResponse>, AppError> {
    request.validate()?;

    let results = state.service.recognize_batch(&request.texts).await?;
    let results = request
        .texts
        .into_iter()
        .zip(results)
        .map(|(text, entities)| NerResponse::new(text, &entities))
        .collect();

    Ok(Json(BatchNerResponse { results }))
}
