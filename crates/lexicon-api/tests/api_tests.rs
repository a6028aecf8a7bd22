//! API integration tests
//!
//! The router runs against the built-in gazetteer tagger and a scripted
//! remote model, so no network access is needed.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use lexicon_api::{create_router, state::AppState};
use lexicon_core::{AppConfig, CompletionFailure, CompletionRequest, LlmClient};
use lexicon_service::{create_tagging_backend, LexiconService};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

const API_KEY: &str = "test-key";

/// Remote model that always gives the same answer
struct ScriptedModel {
    reply: Result<String, CompletionFailure>,
    calls: Mutex<usize>,
}

#[async_trait]
impl LlmClient for ScriptedModel {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String, CompletionFailure> {
        *self.calls.lock().unwrap() += 1;
        self.reply.clone()
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.require_api_key = true;
    config.auth.api_key = API_KEY.to_string();
    config.performance.batch_window_ms = 1;
    config.llm.max_attempts = 2;
    config.llm.initial_backoff_ms = 1;
    config.llm.max_backoff_ms = 2;
    config
}

fn app_with(config: AppConfig, model: Option<Arc<ScriptedModel>>) -> Router {
    let backend = create_tagging_backend(&config.model, Duration::from_secs(5)).unwrap();
    let llm = model.map(|m| m as Arc<dyn LlmClient>);
    let service = LexiconService::with_backends(&config, backend, llm).unwrap();
    create_router(Arc::new(AppState::new(config, service)))
}

fn app(model: Option<Arc<ScriptedModel>>) -> Router {
    app_with(test_config(), model)
}

fn scripted(reply: Result<&str, CompletionFailure>) -> Arc<ScriptedModel> {
    Arc::new(ScriptedModel {
        reply: reply.map(str::to_string),
        calls: Mutex::new(0),
    })
}

/// Helper to create an authenticated JSON request
fn create_json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .header("X-API-Key", API_KEY)
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

// =============================================================================
// Health and statistics
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let (status, json) = send(
        app(None),
        Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["model_loaded"], true);
    assert_eq!(json["openai_configured"], false);
    assert!(json["version"].is_string());
    assert!(json["uptime_seconds"].is_number());
}

#[tokio::test]
async fn test_health_reports_remote_model() {
    let (_, json) = send(
        app(Some(scripted(Ok(r#"{"entities": []}"#)))),
        Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(json["openai_configured"], true);
}

#[tokio::test]
async fn test_stats_after_requests() {
    let app = app(None);
    for _ in 0..2 {
        let (status, _) = send(
            app.clone(),
            create_json_request("/api/ner", json!({"text": "Presiden Joko Widodo"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, json) = send(
        app,
        Request::builder()
            .uri("/api/stats")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_requests"], 2);
    assert_eq!(json["service"]["ner_requests"], 2);
    assert_eq!(json["service"]["cache"]["hits"], 1);
    assert_eq!(json["service"]["cache"]["misses"], 1);
}

#[tokio::test]
async fn test_openapi_document_served() {
    let (status, json) = send(
        app(None),
        Request::builder()
            .uri("/api-docs/openapi.json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/api/ner"].is_object());
    assert!(json["paths"]["/api/legal-entities/batch"].is_object());
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_missing_api_key_is_unauthorized() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/ner")
        .header("Content-Type", "application/json")
        .body(Body::from(r#"{"text": "Presiden Joko Widodo"}"#))
        .unwrap();

    let (status, json) = send(app(None), request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_wrong_api_key_is_forbidden() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/legal-entities")
        .header("Content-Type", "application/json")
        .header("X-API-Key", "not-the-key")
        .body(Body::from(r#"{"text": "Terdakwa Budi Santoso"}"#))
        .unwrap();

    let (status, json) = send(app(None), request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_api_key_not_required_when_disabled() {
    let mut config = test_config();
    config.auth.require_api_key = false;

    let request = Request::builder()
        .method("POST")
        .uri("/api/ner")
        .header("Content-Type", "application/json")
        .body(Body::from(r#"{"text": "Presiden Joko Widodo"}"#))
        .unwrap();

    let (status, _) = send(app_with(config, None), request).await;
    assert_eq!(status, StatusCode::OK);
}

// =============================================================================
// Entity recognition
// =============================================================================

#[tokio::test]
async fn test_ner_strips_titles() {
    let (status, json) = send(
        app(None),
        create_json_request(
            "/api/ner",
            json!({"text": "Gubernur Jawa Barat Ridwan Kamil meresmikan jembatan"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json["text"],
        "Gubernur Jawa Barat Ridwan Kamil meresmikan jembatan"
    );
    let entities = json["entities"].as_array().unwrap();
    assert!(entities
        .iter()
        .any(|e| e["text"] == "Ridwan Kamil" && e["type"] == "PER"));
    assert!(entities
        .iter()
        .any(|e| e["text"] == "Jawa Barat" && e["type"] == "LOC"));
}

#[tokio::test]
async fn test_ner_offsets_are_characters() {
    let text = "café itu, Presiden Joko Widodo datang";
    let (status, json) =
        send(app(None), create_json_request("/api/ner", json!({ "text": text }))).await;

    assert_eq!(status, StatusCode::OK);
    let person = json["entities"]
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["text"] == "Joko Widodo")
        .cloned()
        .unwrap();
    assert_eq!(person["start_pos"], 19);
    assert_eq!(person["end_pos"], 30);
}

#[tokio::test]
async fn test_ner_short_text_is_empty() {
    let (status, json) =
        send(app(None), create_json_request("/api/ner", json!({"text": "Al"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["entities"], json!([]));
}

#[tokio::test]
async fn test_ner_rejects_empty_text() {
    for text in ["", "   "] {
        let (status, json) =
            send(app(None), create_json_request("/api/ner", json!({ "text": text }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "BAD_REQUEST");
    }
}

#[tokio::test]
async fn test_ner_batch_preserves_order() {
    let texts = [
        "Menteri Sri Mulyani",
        "Presiden Joko Widodo",
        "Dr. Siti Nurhaliza",
    ];
    let (status, json) = send(
        app(None),
        create_json_request("/api/ner/batch", json!({ "texts": texts })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    for (result, text) in results.iter().zip(texts) {
        assert_eq!(result["text"], text);
    }
    assert_eq!(results[1]["entities"][0]["text"], "Joko Widodo");
    assert_eq!(results[2]["entities"][0]["text"], "Dr. Siti Nurhaliza");
}

#[tokio::test]
async fn test_ner_batch_limits() {
    let (status, _) = send(
        app(None),
        create_json_request("/api/ner/batch", json!({ "texts": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let texts = vec!["Presiden Joko Widodo"; 101];
    let (status, json) = send(
        app(None),
        create_json_request("/api/ner/batch", json!({ "texts": texts })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"].as_str().unwrap().contains("100"));
}

// =============================================================================
// Legal role extraction
// =============================================================================

#[tokio::test]
async fn test_legal_requires_remote_model() {
    let (status, json) = send(
        app(None),
        create_json_request(
            "/api/legal-entities",
            json!({"text": "Terdakwa Budi Santoso hadir di persidangan."}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(json["code"], "NOT_IMPLEMENTED");
}

#[tokio::test]
async fn test_legal_entities() {
    let model = scripted(Ok(r#"{"entities": [
        {"name": "Budi Santoso", "role": "terdakwa", "confidence": 0.9},
        {"name": "Andi Wijaya", "role": "pengacara", "confidence": 0.8},
        {"name": "Rudi Hartono", "role": "plaintiff", "confidence": 0.7}
    ]}"#));
    let text = "Terdakwa Budi Santoso didampingi pengacara Andi Wijaya.";

    let (status, json) = send(
        app(Some(model.clone())),
        create_json_request("/api/legal-entities", json!({ "text": text })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json["entities"],
        json!([
            {"name": "Budi Santoso", "role": "defendant", "start_pos": 9, "end_pos": 21, "confidence": 0.9},
            {"name": "Andi Wijaya", "role": "representative", "start_pos": 43, "end_pos": 54, "confidence": 0.8}
        ])
    );
    assert_eq!(*model.calls.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_legal_remote_failure_is_bad_gateway() {
    let model = scripted(Err(CompletionFailure::Timeout));
    let (status, json) = send(
        app(Some(model.clone())),
        create_json_request(
            "/api/legal-entities",
            json!({"text": "Terdakwa Budi Santoso hadir."}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "REMOTE_MODEL_ERROR");
    assert_eq!(*model.calls.lock().unwrap(), 2);
}

#[tokio::test]
async fn test_legal_batch_limit() {
    let model = scripted(Ok(r#"{"entities": []}"#));
    let texts = vec!["Terdakwa Budi Santoso hadir."; 11];
    let (status, _) = send(
        app(Some(model.clone())),
        create_json_request("/api/legal-entities/batch", json!({ "texts": texts })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(*model.calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_legal_batch() {
    let model = scripted(Ok(
        r#"{"entities": [{"name": "Budi Santoso", "role": "defendant", "confidence": 0.9}]}"#,
    ));
    let texts = ["Terdakwa Budi Santoso hadir.", "Budi Santoso membantah dakwaan."];
    let (status, json) = send(
        app(Some(model)),
        create_json_request("/api/legal-entities/batch", json!({ "texts": texts })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["entities"][0]["start_pos"], 9);
    assert_eq!(results[1]["entities"][0]["start_pos"], 0);
    assert_eq!(results[1]["entities"][0]["role"], "defendant");
}
