//! Append-only audit and idempotency record of received webhooks

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text", unique)]
    pub external_event_id: String,

    #[sea_orm(column_type = "Text")]
    pub event_type: String,

    /// Account the event resolved to, when known
    pub account_id: Option<Uuid>,

    /// Raw webhook body, kept opaque
    #[sea_orm(column_type = "Text")]
    pub payload: String,

    /// Null until the event has been applied
    pub processed_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
