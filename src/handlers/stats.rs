//! # Statistics Handler
//!
//! Aggregate view over stored events: totals, per-type and per-region
//! breakdowns, recent arrivals, and retention info.

use axum::{extract::State, response::Json};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::handlers::events::EventRecord;
use crate::repositories::{BuildEventRepository, EVENT_TTL_HOURS, EventFilter};
use crate::server::AppState;

const EXPIRING_SOON_HOURS: i64 = 6;
const RECENT_LIMIT: u64 = 10;

/// A single bucket in a group-by breakdown
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CountBucket {
    pub key: String,
    pub count: i64,
}

/// Aggregated event counts
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EventStats {
    /// Total active (unexpired) events
    pub total: u64,
    /// Events received in the last 24 hours
    #[serde(rename = "last24h")]
    pub last_24h: u64,
    /// Events expiring within the next six hours
    #[serde(rename = "expiringSoon")]
    pub expiring_soon: u64,
    #[serde(rename = "byType")]
    pub by_type: Vec<CountBucket>,
    #[serde(rename = "byRegion")]
    pub by_region: Vec<CountBucket>,
    /// Ten most recently received events
    pub recent: Vec<EventRecord>,
}

/// Retention policy description
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ExpirationInfo {
    #[serde(rename = "ttlHours")]
    pub ttl_hours: i64,
    pub description: String,
}

/// Response body for the stats endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatsResponse {
    pub success: bool,
    pub stats: EventStats,
    pub expiration: ExpirationInfo,
}

/// Aggregate statistics over stored events
#[utoipa::path(
    get,
    path = "/api/stats",
    responses(
        (status = 200, description = "Event statistics", body = StatsResponse),
        (status = 500, description = "Database error", body = ApiError)
    ),
    tag = "stats"
)]
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let now = Utc::now();
    let repo = BuildEventRepository::new(&state.db);

    let total = repo.count_events(&EventFilter::default(), now).await?;
    let last_24h = repo
        .count_received_since(now - Duration::hours(24), now)
        .await?;
    let expiring_soon = repo
        .count_expiring_within(Duration::hours(EXPIRING_SOON_HOURS), now)
        .await?;
    let by_type = repo.count_by_type(now).await?;
    let by_region = repo.count_by_region(now).await?;
    let recent = repo.recent(RECENT_LIMIT, now).await?;

    Ok(Json(StatsResponse {
        success: true,
        stats: EventStats {
            total,
            last_24h,
            expiring_soon,
            by_type: by_type
                .into_iter()
                .map(|(key, count)| CountBucket { key, count })
                .collect(),
            by_region: by_region
                .into_iter()
                .map(|(key, count)| CountBucket { key, count })
                .collect(),
            recent: recent.into_iter().map(EventRecord::from).collect(),
        },
        expiration: ExpirationInfo {
            ttl_hours: EVENT_TTL_HOURS,
            description: format!(
                "Events are retained for {} hours after ingestion",
                EVENT_TTL_HOURS
            ),
        },
    }))
}
