//! Account entity: identity plus entitlement state

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Entitlement status of an account
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    PastDue,
    Canceled,
    Incomplete,
    TrialExpired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::TrialExpired => "trial_expired",
        }
    }
}

impl From<String> for SubscriptionStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "trial" => SubscriptionStatus::Trial,
            "active" => SubscriptionStatus::Active,
            "past_due" => SubscriptionStatus::PastDue,
            "canceled" => SubscriptionStatus::Canceled,
            "trial_expired" => SubscriptionStatus::TrialExpired,
            _ => SubscriptionStatus::Incomplete,
        }
    }
}

impl From<SubscriptionStatus> for String {
    fn from(status: SubscriptionStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Billing plan an account is on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPlan {
    None,
    Monthly,
    Annual,
}

impl SubscriptionPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionPlan::None => "none",
            SubscriptionPlan::Monthly => "monthly",
            SubscriptionPlan::Annual => "annual",
        }
    }

    /// Parse a purchasable plan; `none` is not one
    pub fn parse_paid(s: &str) -> Option<Self> {
        match s {
            "monthly" => Some(SubscriptionPlan::Monthly),
            "annual" => Some(SubscriptionPlan::Annual),
            _ => None,
        }
    }

    /// Local approximation of one billing period
    pub fn period_days(&self) -> i64 {
        match self {
            SubscriptionPlan::Annual => 365,
            _ => 30,
        }
    }
}

impl From<String> for SubscriptionPlan {
    fn from(s: String) -> Self {
        SubscriptionPlan::parse_paid(&s).unwrap_or(SubscriptionPlan::None)
    }
}

impl From<SubscriptionPlan> for String {
    fn from(plan: SubscriptionPlan) -> Self {
        plan.as_str().to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text", unique)]
    pub email: String,

    #[serde(skip_serializing)]
    #[sea_orm(column_type = "Text", nullable)]
    pub password_hash: Option<String>,

    #[sea_orm(column_type = "Text", nullable, unique)]
    pub federated_id: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub first_name: String,

    #[sea_orm(column_type = "Text")]
    pub last_name: String,

    #[sea_orm(column_type = "Text")]
    pub subscription_status: String,

    #[sea_orm(column_type = "Text")]
    pub subscription_plan: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub customer_ref: Option<String>,

    pub trial_ends_at: Option<DateTimeWithTimeZone>,

    pub subscription_ends_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Get the subscription status as an enum
    pub fn status(&self) -> SubscriptionStatus {
        SubscriptionStatus::from(self.subscription_status.clone())
    }

    /// Get the plan as an enum
    pub fn plan(&self) -> SubscriptionPlan {
        SubscriptionPlan::from(self.subscription_plan.clone())
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::subscription::Entity")]
    Subscription,

    #[sea_orm(has_many = "super::document::Entity")]
    Document,

    #[sea_orm(has_many = "super::text::Entity")]
    Text,
}

impl Related<super::subscription::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subscription.def()
    }
}

impl Related<super::document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Document.def()
    }
}

impl Related<super::text::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Text.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_and_fallback() {
        assert_eq!(
            SubscriptionStatus::from("past_due".to_string()),
            SubscriptionStatus::PastDue
        );
        assert_eq!(String::from(SubscriptionStatus::TrialExpired), "trial_expired");
        assert_eq!(
            SubscriptionStatus::from("paused".to_string()),
            SubscriptionStatus::Incomplete
        );
    }

    #[test]
    fn test_plan_parsing() {
        assert_eq!(SubscriptionPlan::parse_paid("annual"), Some(SubscriptionPlan::Annual));
        assert_eq!(SubscriptionPlan::parse_paid("none"), None);
        assert_eq!(SubscriptionPlan::parse_paid("weekly"), None);
        assert_eq!(SubscriptionPlan::Annual.period_days(), 365);
        assert_eq!(SubscriptionPlan::Monthly.period_days(), 30);
    }
}
