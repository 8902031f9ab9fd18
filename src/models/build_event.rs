//! Build event entity model
//!
//! This module contains the SeaORM entity model for the build_events table,
//! which stores verified and normalized webhook deliveries.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Build event entity representing a persisted webhook delivery
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "build_events")]
pub struct Model {
    /// Unique identifier for the row (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Provider-assigned delivery identifier; unique across all rows
    #[sea_orm(unique)]
    pub event_id: String,

    /// Verbatim event type string (e.g., deployment.succeeded)
    pub event_type: String,

    /// Timestamp when the event occurred at the provider
    pub occurred_at: DateTimeWithTimeZone,

    /// Timestamp when the event was ingested
    pub received_at: DateTimeWithTimeZone,

    /// Full delivery payload as received
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: JsonValue,

    /// Provider region the delivery originated from ("unknown" when absent)
    pub region: String,

    pub project_id: Option<String>,

    pub deployment_id: Option<String>,

    pub status: Option<String>,

    pub url: Option<String>,

    /// Extracted per-family metadata
    #[sea_orm(column_type = "JsonBinary")]
    pub meta: JsonValue,

    /// Timestamp after which the row is expired and eligible for deletion
    pub expires_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
