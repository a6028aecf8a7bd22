//! Lexicon API Server
//!
//! REST API server for Indonesian entity recognition and legal role extraction.

use anyhow::Context;
use lexicon_api::{create_router, state::AppState};
use lexicon_core::{AppConfig, ConfigOverrides, LoggingConfig};
use lexicon_service::LexiconService;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = AppConfig::resolve(None, &ConfigOverrides::default())
        .context("failed to load configuration")?;

    // Initialize tracing
    init_tracing(&config.logging);

    let service = LexiconService::from_config(&config).context("failed to build service")?;
    tracing::info!(
        model_id = service.model_id(),
        model_loaded = service.model_loaded(),
        legal_enabled = service.legal_configured(),
        require_api_key = config.auth.require_api_key,
        "Service ready"
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);

    // Create application state
    let state = Arc::new(AppState::new(config, service));

    // Create router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Lexicon API Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Lexicon API Server stopped");
    Ok(())
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("{},tower_http=debug", logging.level).into()
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections");
}
