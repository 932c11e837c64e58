//! Subscription record mirrored from the payment provider

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Provider status value that marks a subscription as the live one
pub const STATUS_ACTIVE: &str = "active";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "subscriptions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub account_id: Uuid,

    #[sea_orm(column_type = "Text", unique)]
    pub external_subscription_id: String,

    #[sea_orm(column_type = "Text")]
    pub external_price_id: String,

    /// Provider-defined status string, stored verbatim
    #[sea_orm(column_type = "Text")]
    pub status: String,

    #[sea_orm(column_type = "Text")]
    pub plan_type: String,

    pub current_period_start: DateTimeWithTimeZone,

    pub current_period_end: DateTimeWithTimeZone,

    pub canceled_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::account::Entity",
        from = "Column::AccountId",
        to = "super::account::Column::Id",
        on_delete = "Cascade"
    )]
    Account,
}

impl Related<super::account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
