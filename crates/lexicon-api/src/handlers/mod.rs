//! API handlers

pub mod health;
pub mod legal;
pub mod ner;

use crate::error::ApiError;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Lexicon Named Entity Recognition API",
        description = "Indonesian named entity recognition and legal role extraction"
    ),
    paths(
        health::health_check,
        health::stats,
        ner::extract_entities,
        ner::extract_entities_batch,
        legal::extract_legal_entities,
        legal::extract_legal_entities_batch,
    ),
    components(schemas(
        ApiError,
        health::HealthResponse,
        health::StatsResponse,
        ner::NerRequest,
        ner::BatchNerRequest,
        ner::NerEntity,
        ner::NerResponse,
        ner::BatchNerResponse,
        legal::LegalEntityRequest,
        legal::BatchLegalEntityRequest,
        legal::LegalEntity,
        legal::LegalEntityResponse,
        legal::BatchLegalEntityResponse,
    )),
    modifiers(&ApiKeyScheme),
    tags(
        (name = "health", description = "Liveness and statistics"),
        (name = "ner", description = "Named entity recognition"),
        (name = "legal", description = "Legal role extraction")
    )
)]
pub struct ApiDoc;

struct ApiKeyScheme;

impl Modify for ApiKeyScheme {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(
                    crate::auth::API_KEY_HEADER,
                ))),
            );
        }
    }
}
