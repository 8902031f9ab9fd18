//! Migration to create the build_events table.
//!
//! This migration creates the build_events table which stores verified and
//! normalized webhook events, deduplicated by delivery event_id and expired
//! after a fixed retention window via expires_at.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BuildEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BuildEvents::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BuildEvents::EventId).text().not_null())
                    .col(ColumnDef::new(BuildEvents::EventType).text().not_null())
                    .col(
                        ColumnDef::new(BuildEvents::OccurredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BuildEvents::ReceivedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(BuildEvents::Payload).json_binary().not_null())
                    .col(
                        ColumnDef::new(BuildEvents::Region)
                            .text()
                            .not_null()
                            .default("unknown"),
                    )
                    .col(ColumnDef::new(BuildEvents::ProjectId).text().null())
                    .col(ColumnDef::new(BuildEvents::DeploymentId).text().null())
                    .col(ColumnDef::new(BuildEvents::Status).text().null())
                    .col(ColumnDef::new(BuildEvents::Url).text().null())
                    .col(ColumnDef::new(BuildEvents::Meta).json_binary().not_null())
                    .col(
                        ColumnDef::new(BuildEvents::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Uniqueness on the provider delivery id backs duplicate rejection
        manager
            .create_index(
                Index::create()
                    .name("idx_build_events_event_id")
                    .table(BuildEvents::Table)
                    .col(BuildEvents::EventId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Create index for type-filtered listing with occurred_at DESC using raw SQL
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_build_events_type_occurred ON build_events (event_type, occurred_at DESC)".to_string(),
            ))
            .await?;

        // Create index for project-scoped listing with occurred_at DESC using raw SQL
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_build_events_project_occurred ON build_events (project_id, occurred_at DESC)".to_string(),
            ))
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_build_events_deployment_id")
                    .table(BuildEvents::Table)
                    .col(BuildEvents::DeploymentId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_build_events_status")
                    .table(BuildEvents::Table)
                    .col(BuildEvents::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_build_events_region")
                    .table(BuildEvents::Table)
                    .col(BuildEvents::Region)
                    .to_owned(),
            )
            .await?;

        // Create index for the expiry sweep and active-row filtering
        manager
            .create_index(
                Index::create()
                    .name("idx_build_events_expires_at")
                    .table(BuildEvents::Table)
                    .col(BuildEvents::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop indexes first
        manager
            .drop_index(Index::drop().name("idx_build_events_event_id").to_owned())
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_build_events_type_occurred")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_build_events_project_occurred")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_build_events_deployment_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("idx_build_events_status").to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_build_events_region").to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_build_events_expires_at").to_owned())
            .await?;

        // Then drop table
        manager
            .drop_table(Table::drop().table(BuildEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum BuildEvents {
    Table,
    Id,
    EventId,
    EventType,
    OccurredAt,
    ReceivedAt,
    Payload,
    Region,
    ProjectId,
    DeploymentId,
    Status,
    Url,
    Meta,
    ExpiresAt,
}
