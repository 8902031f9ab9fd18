//! # Webhook Ingestion Handlers
//!
//! This module contains the webhook ingestion endpoint. Every delivery walks
//! the same pipeline: read the raw body, verify its signature, parse and
//! validate the envelope, normalize, then persist. The first failing stage
//! determines the response; nothing is stored unless every stage succeeds.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::normalization::{self, ALL_EVENT_KINDS, WebhookEnvelope};
use crate::repositories::BuildEventRepository;
use crate::server::AppState;
use crate::webhook_verification::verify_webhook_signature;

/// Upper bound on accepted webhook body size
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Acknowledgement returned after a delivery is stored
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAckResponse {
    /// Always true for stored deliveries
    pub success: bool,
    /// Provider-assigned delivery identifier
    #[serde(rename = "eventId")]
    pub event_id: String,
    /// Event type as received
    #[serde(rename = "type")]
    pub event_type: String,
}

/// Endpoint descriptor returned on GET
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookStatusResponse {
    pub message: String,
    pub status: String,
    #[serde(rename = "supportedEvents")]
    pub supported_events: Vec<String>,
}

/// Ingest a signed webhook delivery
#[utoipa::path(
    post,
    path = "/api/webhook",
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Event stored", body = WebhookAckResponse),
        (status = 400, description = "Malformed body or envelope", body = ApiError),
        (status = 401, description = "Missing or invalid signature", body = ApiError),
        (status = 409, description = "Duplicate delivery", body = ApiError),
        (status = 500, description = "Secret not configured or storage failure", body = ApiError)
    ),
    tag = "webhook"
)]
pub async fn ingest_webhook(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<WebhookAckResponse>, ApiError> {
    let (parts, body) = request.into_parts();
    let body_bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| {
            error!(error = ?e, "Failed to read webhook request body");
            ApiError::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                "Failed to read request body",
            )
        })?;

    // Signature covers the raw bytes exactly as received
    verify_webhook_signature(&body_bytes, &parts.headers, &state.config)?;

    let raw: serde_json::Value = serde_json::from_slice(&body_bytes).map_err(|_| {
        ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", "Invalid JSON")
    })?;

    let envelope: WebhookEnvelope = serde_json::from_value(raw).map_err(|_| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "Invalid event format",
        )
    })?;

    let event = normalization::normalize(envelope).map_err(|err| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            &format!("Invalid event format: {}", err),
        )
    })?;

    let repo = BuildEventRepository::new(&state.db);
    let stored = repo.insert(&event, Utc::now()).await?;

    info!(
        event_id = %stored.event_id,
        event_type = %stored.event_type,
        region = %stored.region,
        "Webhook event stored"
    );

    Ok(Json(WebhookAckResponse {
        success: true,
        event_id: stored.event_id,
        event_type: stored.event_type,
    }))
}

/// Describe the webhook endpoint and its supported event types
#[utoipa::path(
    get,
    path = "/api/webhook",
    responses(
        (status = 200, description = "Endpoint descriptor", body = WebhookStatusResponse)
    ),
    tag = "webhook"
)]
pub async fn webhook_status() -> Json<WebhookStatusResponse> {
    Json(WebhookStatusResponse {
        message: "Webhook endpoint is active".to_string(),
        status: "active".to_string(),
        supported_events: ALL_EVENT_KINDS
            .iter()
            .map(|k| k.as_str().to_string())
            .collect(),
    })
}
