//! # Build Event Repository
//!
//! This module contains the repository implementation for build event
//! entities, providing filtered listing, aggregate counts for stats, and the
//! expiry sweep. Rows past their `expires_at` are treated as gone even before
//! the sweeper physically deletes them.

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::error::{RepositoryError, is_unique_violation};
use crate::models::build_event::{Column, Entity as BuildEvent, Model};
use crate::normalization::NormalizedEvent;

/// Retention window applied to every stored event.
pub const EVENT_TTL_HOURS: i64 = 25;

/// Filters applied to listing and counting queries.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_type: Option<String>,
    pub project_id: Option<String>,
    pub status: Option<String>,
    pub occurred_after: Option<DateTime<Utc>>,
    pub occurred_before: Option<DateTime<Utc>>,
}

/// Repository for build event database operations
pub struct BuildEventRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> BuildEventRepository<'a> {
    /// Create a new BuildEventRepository with the given database connection
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Persist a normalized event, stamping `received_at` and `expires_at`.
    ///
    /// Returns [`RepositoryError::Duplicate`] when an event with the same
    /// delivery id has already been stored.
    pub async fn insert(
        &self,
        event: &NormalizedEvent,
        now: DateTime<Utc>,
    ) -> Result<Model, RepositoryError> {
        let meta = serde_json::to_value(&event.meta)?;

        let model = crate::models::build_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            event_id: Set(event.event_id.clone()),
            event_type: Set(event.event_type.clone()),
            occurred_at: Set(event.occurred_at.into()),
            received_at: Set(now.into()),
            payload: Set(event.payload.clone()),
            region: Set(event.region.clone()),
            project_id: Set(event.project_id.clone()),
            deployment_id: Set(event.deployment_id.clone()),
            status: Set(event.status.clone()),
            url: Set(event.url.clone()),
            meta: Set(meta),
            expires_at: Set((now + Duration::hours(EVENT_TTL_HOURS)).into()),
        };

        model.insert(self.db).await.map_err(|err| {
            if is_unique_violation(&err) {
                RepositoryError::Duplicate
            } else {
                RepositoryError::Database(err)
            }
        })
    }

    fn active_filtered(
        filter: &EventFilter,
        now: DateTime<Utc>,
    ) -> sea_orm::Select<BuildEvent> {
        let mut query = BuildEvent::find().filter(Column::ExpiresAt.gt(now));

        if let Some(ref event_type) = filter.event_type {
            query = query.filter(Column::EventType.eq(event_type.clone()));
        }

        if let Some(ref project_id) = filter.project_id {
            query = query.filter(Column::ProjectId.eq(project_id.clone()));
        }

        if let Some(ref status) = filter.status {
            query = query.filter(Column::Status.eq(status.clone()));
        }

        if let Some(after) = filter.occurred_after {
            query = query.filter(Column::OccurredAt.gte(after));
        }

        if let Some(before) = filter.occurred_before {
            query = query.filter(Column::OccurredAt.lte(before));
        }

        query
    }

    /// List active events matching the filter, newest first, one page at a time.
    ///
    /// `page` is 1-based.
    pub async fn list_events(
        &self,
        filter: &EventFilter,
        page: u64,
        limit: u64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Model>, RepositoryError> {
        let offset = page.saturating_sub(1) * limit;

        let events = Self::active_filtered(filter, now)
            .order_by_desc(Column::OccurredAt)
            .order_by_desc(Column::Id)
            .offset(offset)
            .limit(limit)
            .all(self.db)
            .await?;

        Ok(events)
    }

    /// Count active events matching the filter.
    pub async fn count_events(
        &self,
        filter: &EventFilter,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let count = Self::active_filtered(filter, now).count(self.db).await?;
        Ok(count)
    }

    /// Count events matching the filter, grouped by event type.
    ///
    /// Backs the per-type breakdown returned alongside listings, so the
    /// counts reflect the same filter set as the page itself.
    pub async fn count_filtered_by_type(
        &self,
        filter: &EventFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, i64)>, RepositoryError> {
        let rows = Self::active_filtered(filter, now)
            .select_only()
            .column(Column::EventType)
            .column_as(Column::Id.count(), "count")
            .group_by(Column::EventType)
            .into_tuple::<(String, i64)>()
            .all(self.db)
            .await?;

        Ok(rows)
    }

    /// Count active events grouped by event type.
    pub async fn count_by_type(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, i64)>, RepositoryError> {
        let rows = BuildEvent::find()
            .select_only()
            .column(Column::EventType)
            .column_as(Column::Id.count(), "count")
            .filter(Column::ExpiresAt.gt(now))
            .group_by(Column::EventType)
            .into_tuple::<(String, i64)>()
            .all(self.db)
            .await?;

        Ok(rows)
    }

    /// Count active events grouped by region.
    pub async fn count_by_region(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, i64)>, RepositoryError> {
        let rows = BuildEvent::find()
            .select_only()
            .column(Column::Region)
            .column_as(Column::Id.count(), "count")
            .filter(Column::ExpiresAt.gt(now))
            .group_by(Column::Region)
            .into_tuple::<(String, i64)>()
            .all(self.db)
            .await?;

        Ok(rows)
    }

    /// Count active events received at or after the cutoff.
    pub async fn count_received_since(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let count = BuildEvent::find()
            .filter(Column::ExpiresAt.gt(now))
            .filter(Column::ReceivedAt.gte(cutoff))
            .count(self.db)
            .await?;

        Ok(count)
    }

    /// Count active events whose retention ends within the window.
    pub async fn count_expiring_within(
        &self,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let count = BuildEvent::find()
            .filter(Column::ExpiresAt.gt(now))
            .filter(Column::ExpiresAt.lte(now + window))
            .count(self.db)
            .await?;

        Ok(count)
    }

    /// Most recently received active events.
    pub async fn recent(
        &self,
        limit: u64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Model>, RepositoryError> {
        let events = BuildEvent::find()
            .filter(Column::ExpiresAt.gt(now))
            .order_by_desc(Column::ReceivedAt)
            .order_by_desc(Column::Id)
            .limit(limit)
            .all(self.db)
            .await?;

        Ok(events)
    }

    /// Delete every event whose retention window has ended.
    ///
    /// Returns the number of rows removed.
    pub async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = BuildEvent::delete_many()
            .filter(Column::ExpiresAt.lte(now))
            .exec(self.db)
            .await?;

        Ok(result.rows_affected)
    }
}
