//! # Server Configuration
//!
//! This module contains the server setup and configuration for the Buildwatch API.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::handlers;
use crate::telemetry;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::health))
        .route(
            "/api/webhook",
            post(handlers::webhook::ingest_webhook).get(handlers::webhook::webhook_status),
        )
        .route("/api/events", get(handlers::events::list_events))
        .route("/api/stats", get(handlers::stats::get_stats))
        .layer(middleware::from_fn(telemetry::trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration
pub async fn run_server(
    config: Arc<AppConfig>,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let state = AppState { config, db };
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = ?err, "Failed to install shutdown signal handler");
    }
    tracing::info!("Shutdown signal received");
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::webhook::ingest_webhook,
        crate::handlers::webhook::webhook_status,
        crate::handlers::events::list_events,
        crate::handlers::stats::get_stats,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthResponse,
            crate::handlers::webhook::WebhookAckResponse,
            crate::handlers::webhook::WebhookStatusResponse,
            crate::handlers::events::EventRecord,
            crate::handlers::events::PaginationInfo,
            crate::handlers::events::TypeCount,
            crate::handlers::events::ListEventsResponse,
            crate::handlers::stats::CountBucket,
            crate::handlers::stats::EventStats,
            crate::handlers::stats::ExpirationInfo,
            crate::handlers::stats::StatsResponse,
            crate::normalization::EventMeta,
            crate::error::ApiError,
        )
    ),
    info(
        title = "Buildwatch API",
        description = "Webhook receiver for deployment, project, and firewall events",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
