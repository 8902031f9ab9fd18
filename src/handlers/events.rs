//! # Event Query Handlers
//!
//! Read side of the API: filtered, paginated listing of stored events.
//! Expired rows never appear in responses even if the sweeper has not
//! removed them yet.

use axum::{
    extract::{Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use crate::error::{ApiError, validation_error};
use crate::models::build_event::Model;
use crate::repositories::{BuildEventRepository, EventFilter};
use crate::server::AppState;

const MAX_PAGE_SIZE: u64 = 100;

/// Query parameters for listing events
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListEventsQuery {
    /// 1-based page number
    #[serde(default = "default_page")]
    #[param(minimum = 1, example = 1)]
    pub page: u64,
    /// Page size (1-100)
    #[serde(default = "default_limit")]
    #[param(minimum = 1, maximum = 100, example = 50)]
    pub limit: u64,
    /// Filter by event type
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    /// Filter by project identifier
    #[serde(rename = "projectId")]
    pub project_id: Option<String>,
    /// Filter by extracted status
    pub status: Option<String>,
    /// Only events that occurred at or after this RFC 3339 timestamp
    #[serde(rename = "startDate")]
    pub start_date: Option<String>,
    /// Only events that occurred at or before this RFC 3339 timestamp
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
}

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    50
}

/// A stored event as returned by the query API
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EventRecord {
    #[serde(rename = "eventId")]
    pub event_id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "receivedAt")]
    pub received_at: DateTime<Utc>,
    pub payload: Value,
    pub region: String,
    #[serde(rename = "projectId", skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(rename = "deploymentId", skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub meta: Value,
    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,
}

impl From<Model> for EventRecord {
    fn from(model: Model) -> Self {
        Self {
            event_id: model.event_id,
            event_type: model.event_type,
            created_at: model.occurred_at.into(),
            received_at: model.received_at.into(),
            payload: model.payload,
            region: model.region,
            project_id: model.project_id,
            deployment_id: model.deployment_id,
            status: model.status,
            url: model.url,
            meta: model.meta,
            expires_at: model.expires_at.into(),
        }
    }
}

/// Pagination metadata
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaginationInfo {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub pages: u64,
}

/// Per-type count over the current filter set
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TypeCount {
    #[serde(rename = "type")]
    pub event_type: String,
    pub count: i64,
}

/// Response body for event listing
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ListEventsResponse {
    pub success: bool,
    pub events: Vec<EventRecord>,
    pub pagination: PaginationInfo,
    /// Per-type counts computed over the same filters as `events`
    pub stats: Vec<TypeCount>,
}

fn parse_date_param(name: &str, value: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            validation_error(
                &format!("{} must be an RFC 3339 timestamp", name),
                serde_json::json!({ name: value }),
            )
        })
}

/// List stored events with filters and pagination
#[utoipa::path(
    get,
    path = "/api/events",
    params(ListEventsQuery),
    responses(
        (status = 200, description = "Page of events", body = ListEventsResponse),
        (status = 400, description = "Invalid query parameters", body = ApiError)
    ),
    tag = "events"
)]
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<ListEventsQuery>,
) -> Result<Json<ListEventsResponse>, ApiError> {
    if query.page < 1 {
        return Err(validation_error(
            "page must be at least 1",
            serde_json::json!({ "page": query.page }),
        ));
    }

    if query.limit < 1 || query.limit > MAX_PAGE_SIZE {
        return Err(validation_error(
            "limit must be between 1 and 100",
            serde_json::json!({ "limit": query.limit }),
        ));
    }

    let occurred_after = query
        .start_date
        .as_deref()
        .map(|v| parse_date_param("startDate", v))
        .transpose()?;
    let occurred_before = query
        .end_date
        .as_deref()
        .map(|v| parse_date_param("endDate", v))
        .transpose()?;

    let filter = EventFilter {
        event_type: query.event_type,
        project_id: query.project_id,
        status: query.status,
        occurred_after,
        occurred_before,
    };

    let now = Utc::now();
    let repo = BuildEventRepository::new(&state.db);
    let total = repo.count_events(&filter, now).await?;
    let events = repo
        .list_events(&filter, query.page, query.limit, now)
        .await?;
    let by_type = repo.count_filtered_by_type(&filter, now).await?;

    Ok(Json(ListEventsResponse {
        success: true,
        events: events.into_iter().map(EventRecord::from).collect(),
        pagination: PaginationInfo {
            page: query.page,
            limit: query.limit,
            total,
            pages: total.div_ceil(query.limit),
        },
        stats: by_type
            .into_iter()
            .map(|(event_type, count)| TypeCount { event_type, count })
            .collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::init_pool;
    use crate::normalization::EventMeta;
    use crate::normalization::NormalizedEvent;
    use crate::server::{AppState, create_app};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Duration;
    use migration::{Migrator, MigratorTrait};
    use serde_json::json;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let config = AppConfig {
            profile: "test".to_string(),
            database_url: "sqlite::memory:".to_string(),
            webhook_secret: Some("test_secret".to_string()),
            ..Default::default()
        };

        let db = init_pool(&config).await.expect("Failed to init test DB");
        Migrator::up(&db, None).await.expect("Failed to migrate");

        AppState {
            config: Arc::new(config),
            db,
        }
    }

    async fn seed_event(
        state: &AppState,
        event_id: &str,
        event_type: &str,
        project_id: Option<&str>,
        occurred_at: DateTime<Utc>,
    ) {
        let event = NormalizedEvent {
            event_id: event_id.to_string(),
            kind: crate::normalization::parse_event_kind(event_type),
            event_type: event_type.to_string(),
            occurred_at,
            payload: json!({"seed": true}),
            region: "iad1".to_string(),
            project_id: project_id.map(str::to_string),
            deployment_id: None,
            status: Some("READY".to_string()),
            url: None,
            meta: EventMeta::default(),
        };
        BuildEventRepository::new(&state.db)
            .insert(&event, Utc::now())
            .await
            .unwrap();
    }

    async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_list_events_returns_page_with_metadata() {
        let state = test_state().await;
        let now = Utc::now();
        for i in 0..5 {
            seed_event(
                &state,
                &format!("evt_{}", i),
                "deployment.succeeded",
                Some("prj_1"),
                now - Duration::seconds(i),
            )
            .await;
        }

        let (status, json) = get_json(create_app(state), "/api/events?page=1&limit=2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], json!(true));
        assert_eq!(json["events"].as_array().unwrap().len(), 2);
        assert_eq!(json["pagination"]["total"], json!(5));
        assert_eq!(json["pagination"]["pages"], json!(3));
        // Newest first
        assert_eq!(json["events"][0]["eventId"], json!("evt_0"));
        // Per-type counts cover the whole filter set, not just the page
        assert_eq!(json["stats"][0]["type"], json!("deployment.succeeded"));
        assert_eq!(json["stats"][0]["count"], json!(5));
    }

    #[tokio::test]
    async fn test_list_events_filters_by_type_and_project() {
        let state = test_state().await;
        let now = Utc::now();
        seed_event(&state, "evt_1", "deployment.succeeded", Some("prj_1"), now).await;
        seed_event(&state, "evt_2", "project.created", Some("prj_2"), now).await;

        let (status, json) = get_json(
            create_app(state.clone()),
            "/api/events?type=project.created",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["events"].as_array().unwrap().len(), 1);
        assert_eq!(json["events"][0]["eventId"], json!("evt_2"));

        let (status, json) = get_json(create_app(state), "/api/events?projectId=prj_1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["events"][0]["eventId"], json!("evt_1"));
    }

    #[tokio::test]
    async fn test_list_events_date_range() {
        let state = test_state().await;
        let now = Utc::now();
        seed_event(
            &state,
            "evt_old",
            "deployment.created",
            None,
            now - Duration::hours(3),
        )
        .await;
        seed_event(&state, "evt_new", "deployment.created", None, now).await;

        let cutoff = (now - Duration::hours(1))
            .to_rfc3339()
            .replace('+', "%2B");
        let (status, json) = get_json(
            create_app(state),
            &format!("/api/events?startDate={}", cutoff),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["events"].as_array().unwrap().len(), 1);
        assert_eq!(json["events"][0]["eventId"], json!("evt_new"));
    }

    #[tokio::test]
    async fn test_list_events_rejects_bad_pagination() {
        let state = test_state().await;

        let (status, json) = get_json(create_app(state.clone()), "/api/events?page=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], json!("VALIDATION_FAILED"));

        let (status, _) = get_json(create_app(state.clone()), "/api/events?limit=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get_json(create_app(state), "/api/events?limit=101").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_events_rejects_bad_dates() {
        let state = test_state().await;

        let (status, json) =
            get_json(create_app(state), "/api/events?startDate=last-tuesday").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(
            json["message"]
                .as_str()
                .unwrap()
                .contains("RFC 3339")
        );
    }

    #[tokio::test]
    async fn test_list_events_empty_database() {
        let state = test_state().await;

        let (status, json) = get_json(create_app(state), "/api/events").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["events"].as_array().unwrap().len(), 0);
        assert_eq!(json["pagination"]["total"], json!(0));
        assert_eq!(json["pagination"]["pages"], json!(0));
    }
}
