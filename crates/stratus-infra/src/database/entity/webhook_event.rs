//! Webhook ledger entity for SeaORM.

use sea_orm::Set;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "webhook_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub event_type: String,
    pub processed: bool,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Conversion from SeaORM Model to the domain ledger row.
impl From<Model> for stratus_core::domain::WebhookEvent {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            event_type: model.event_type,
            processed: model.processed,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }
}

/// Conversion from the domain ledger row to SeaORM ActiveModel.
impl From<&stratus_core::domain::WebhookEvent> for ActiveModel {
    fn from(event: &stratus_core::domain::WebhookEvent) -> Self {
        Self {
            id: Set(event.id.clone()),
            event_type: Set(event.event_type.clone()),
            processed: Set(event.processed),
            created_at: Set(event.created_at.into()),
            updated_at: Set(event.updated_at.into()),
        }
    }
}
