//! Normalization of webhook envelopes into typed build events.
//!
//! Incoming deliveries share a common envelope (`id`, `type`, `createdAt`,
//! `payload`, optional `region`). This module validates the envelope, coerces
//! the timestamp, and extracts the typed columns for each supported event
//! family. Unrecognized event types are kept verbatim with no extraction so
//! new provider events are never dropped.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;

/// Canonical registry of supported event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DeploymentCreated,
    DeploymentSucceeded,
    DeploymentError,
    DeploymentCancelled,
    DeploymentPromoted,
    ProjectCreated,
    ProjectRemoved,
    AttackDetected,
}

impl EventKind {
    /// Return the canonical string representation for this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            EventKind::DeploymentCreated => "deployment.created",
            EventKind::DeploymentSucceeded => "deployment.succeeded",
            EventKind::DeploymentError => "deployment.error",
            EventKind::DeploymentCancelled => "deployment.cancelled",
            EventKind::DeploymentPromoted => "deployment.promoted",
            EventKind::ProjectCreated => "project.created",
            EventKind::ProjectRemoved => "project.removed",
            EventKind::AttackDetected => "attack.detected",
        }
    }

    /// Whether this kind belongs to the deployment lifecycle family.
    pub const fn is_deployment(self) -> bool {
        matches!(
            self,
            EventKind::DeploymentCreated
                | EventKind::DeploymentSucceeded
                | EventKind::DeploymentError
                | EventKind::DeploymentCancelled
                | EventKind::DeploymentPromoted
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete registry of canonical kinds.
pub const ALL_EVENT_KINDS: &[EventKind] = &[
    EventKind::DeploymentCreated,
    EventKind::DeploymentSucceeded,
    EventKind::DeploymentError,
    EventKind::DeploymentCancelled,
    EventKind::DeploymentPromoted,
    EventKind::ProjectCreated,
    EventKind::ProjectRemoved,
    EventKind::AttackDetected,
];

/// Return the canonical kind corresponding to the provided string, if any.
pub fn parse_event_kind(event_type: &str) -> Option<EventKind> {
    ALL_EVENT_KINDS
        .iter()
        .copied()
        .find(|k| k.as_str() == event_type)
}

/// Raw webhook delivery envelope as sent by the provider.
///
/// `createdAt` stays untyped here because senders emit either epoch
/// milliseconds or an RFC 3339 string; [`normalize`] coerces it.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "createdAt")]
    pub created_at: Value,
    pub payload: Value,
    #[serde(default)]
    pub region: Option<String>,
}

/// Structured metadata extracted per event family.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mitigated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// A validated, normalized event ready for persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvent {
    pub event_id: String,
    /// Canonical kind when the type is recognized, `None` for pass-through types.
    pub kind: Option<EventKind>,
    /// Verbatim event type string from the envelope.
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: Value,
    pub region: String,
    pub project_id: Option<String>,
    pub deployment_id: Option<String>,
    pub status: Option<String>,
    pub url: Option<String>,
    pub meta: EventMeta,
}

/// Errors that can occur while validating and normalizing an envelope.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("event id must be a non-empty string")]
    EmptyEventId,
    #[error("event type must be a non-empty string")]
    EmptyEventType,
    #[error("malformed createdAt timestamp: {value}")]
    MalformedTimestamp { value: String },
    #[error("payload must be a JSON object")]
    PayloadNotObject,
}

/// Coerce a `createdAt` value into a UTC timestamp.
///
/// Accepts integer epoch milliseconds or an RFC 3339 string; everything else
/// is malformed.
fn coerce_timestamp(value: &Value) -> Result<DateTime<Utc>, NormalizationError> {
    let malformed = || NormalizationError::MalformedTimestamp {
        value: value.to_string(),
    };

    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(malformed),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| malformed()),
        _ => Err(malformed()),
    }
}

fn str_field(payload: &Value, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}

fn bool_field(payload: &Value, key: &str) -> Option<bool> {
    payload.get(key).and_then(Value::as_bool)
}

fn str_array_field(payload: &Value, key: &str) -> Option<Vec<String>> {
    payload.get(key).and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}

/// Validate an envelope and extract the typed columns for its event family.
///
/// Extraction is type-checked: a field of the wrong JSON type is treated as
/// absent rather than failing the whole event. The full payload is preserved
/// alongside whatever was extracted.
pub fn normalize(envelope: WebhookEnvelope) -> Result<NormalizedEvent, NormalizationError> {
    if envelope.id.is_empty() {
        return Err(NormalizationError::EmptyEventId);
    }
    if envelope.event_type.is_empty() {
        return Err(NormalizationError::EmptyEventType);
    }

    let occurred_at = coerce_timestamp(&envelope.created_at)?;

    if !envelope.payload.is_object() {
        return Err(NormalizationError::PayloadNotObject);
    }

    let kind = parse_event_kind(&envelope.event_type);
    let payload = &envelope.payload;

    let mut event = NormalizedEvent {
        event_id: envelope.id,
        kind,
        event_type: envelope.event_type,
        occurred_at,
        payload: envelope.payload.clone(),
        region: envelope
            .region
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "unknown".to_string()),
        project_id: None,
        deployment_id: None,
        status: None,
        url: None,
        meta: EventMeta::default(),
    };

    match kind {
        Some(k) if k.is_deployment() => {
            event.deployment_id = str_field(payload, "id");
            event.project_id = str_field(payload, "projectId");
            // Fall back to the lifecycle stage encoded in the type itself
            event.status = str_field(payload, "status").or_else(|| {
                k.as_str()
                    .split_once('.')
                    .map(|(_, stage)| stage.to_string())
            });
            event.url = str_field(payload, "url");
            event.meta = EventMeta {
                team_id: str_field(payload, "teamId"),
                user_id: str_field(payload, "userId"),
                project_name: str_field(payload, "name"),
                deployment_url: str_field(payload, "url"),
                target: str_field(payload, "target"),
                alias: str_array_field(payload, "alias"),
                ..EventMeta::default()
            };
        }
        Some(EventKind::ProjectCreated | EventKind::ProjectRemoved) => {
            event.project_id = str_field(payload, "id");
            event.meta = EventMeta {
                team_id: str_field(payload, "teamId"),
                user_id: str_field(payload, "userId"),
                project_name: str_field(payload, "name"),
                framework: str_field(payload, "framework"),
                ..EventMeta::default()
            };
        }
        Some(EventKind::AttackDetected) => {
            event.meta = EventMeta {
                team_id: str_field(payload, "teamId"),
                attack_type: str_field(payload, "attackType"),
                mitigated: bool_field(payload, "mitigated"),
                ip_address: str_field(payload, "ipAddress"),
                user_agent: str_field(payload, "userAgent"),
                ..EventMeta::default()
            };
        }
        _ => {
            // Pass-through: unrecognized types keep the raw payload only
        }
    }

    Ok(event)
}
