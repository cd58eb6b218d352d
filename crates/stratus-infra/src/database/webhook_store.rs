//! PostgreSQL webhook ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, DbConn, DbErr, EntityTrait, QueryFilter};

use stratus_core::RepoError;
use stratus_core::domain::WebhookEvent;
use stratus_core::ports::{InsertOutcome, WebhookEventStore};

use super::entity::webhook_event::{self, Entity as WebhookEventEntity};

/// Ledger stored in the `webhook_events` table.
///
/// The primary key on `id` decides concurrent registrations: the insert uses
/// `ON CONFLICT (id) DO NOTHING` and a zero row count means another
/// delivery already claimed the event.
pub struct PostgresWebhookEventStore {
    db: DbConn,
}

impl PostgresWebhookEventStore {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }
}

fn map_db_err(err: DbErr) -> RepoError {
    match err {
        DbErr::Conn(e) => RepoError::Connection(e.to_string()),
        DbErr::ConnectionAcquire(e) => RepoError::Connection(e.to_string()),
        other => RepoError::Query(other.to_string()),
    }
}

#[async_trait]
impl WebhookEventStore for PostgresWebhookEventStore {
    async fn insert_if_absent(&self, event: &WebhookEvent) -> Result<InsertOutcome, RepoError> {
        let rows = WebhookEventEntity::insert(webhook_event::ActiveModel::from(event))
            .on_conflict(
                OnConflict::column(webhook_event::Column::Id)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(map_db_err)?;

        if rows == 0 {
            Ok(InsertOutcome::AlreadyExists)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    async fn mark_processed(&self, id: &str, at: DateTime<Utc>) -> Result<(), RepoError> {
        let result = WebhookEventEntity::update_many()
            .col_expr(webhook_event::Column::Processed, Expr::value(true))
            .col_expr(webhook_event::Column::UpdatedAt, Expr::value(at.fixed_offset()))
            .filter(webhook_event::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .map_err(map_db_err)?;

        if result.rows_affected == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Option<WebhookEvent>, RepoError> {
        let model = WebhookEventEntity::find_by_id(id.to_string())
            .one(&self.db)
            .await
            .map_err(map_db_err)?;

        Ok(model.map(Into::into))
    }

    async fn purge_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepoError> {
        let result = WebhookEventEntity::delete_many()
            .filter(webhook_event::Column::Processed.eq(true))
            .filter(webhook_event::Column::CreatedAt.lt(cutoff.fixed_offset()))
            .exec(&self.db)
            .await
            .map_err(map_db_err)?;

        Ok(result.rows_affected)
    }
}
