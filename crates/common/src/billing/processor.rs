//! Payment event processor
//!
//! Applies verified webhook events to local entitlement state exactly once.
//! Each event runs in a single transaction covering the audit row, the
//! subscription record and the account: either all of them change or none
//! do. An event whose audit row already carries `processed_at` is a no-op.
//!
//! Events that reference an unknown account or subscription are logged and
//! dropped (still marked processed); they are data anomalies that a retry
//! cannot fix.

use crate::billing::events::{
    CheckoutSession, EventKind, InvoiceObject, ProviderEvent, SubscriptionObject,
};
use crate::config::BillingConfig;
use crate::db::models::*;
use crate::errors::Result;
use crate::metrics;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    IntoActiveModel, QueryFilter, Set, TransactionTrait,
};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Result of handing one event to the processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Handler ran and the event is now marked processed
    Applied,
    /// Event id was seen and processed before; nothing changed
    AlreadyProcessed,
}

impl ProcessOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessOutcome::Applied => "applied",
            ProcessOutcome::AlreadyProcessed => "already_processed",
        }
    }
}

/// Price ids recorded on subscriptions created at checkout
#[derive(Debug, Clone)]
pub struct PlanPrices {
    pub monthly: String,
    pub annual: String,
}

impl PlanPrices {
    pub fn for_plan(&self, plan: SubscriptionPlan) -> &str {
        match plan {
            SubscriptionPlan::Annual => &self.annual,
            _ => &self.monthly,
        }
    }
}

impl From<&BillingConfig> for PlanPrices {
    fn from(config: &BillingConfig) -> Self {
        Self {
            monthly: config.monthly_price_id.clone(),
            annual: config.annual_price_id.clone(),
        }
    }
}

/// Applies provider events to accounts and subscription records
#[derive(Clone)]
pub struct PaymentEventProcessor {
    db: DatabaseConnection,
    prices: PlanPrices,
}

impl PaymentEventProcessor {
    pub fn new(db: DatabaseConnection, prices: PlanPrices) -> Self {
        Self { db, prices }
    }

    /// Apply an event received now
    pub async fn process(&self, event: &ProviderEvent, payload: &str) -> Result<ProcessOutcome> {
        self.process_at(event, payload, Utc::now()).await
    }

    /// Apply an event as of `now`.
    ///
    /// On error the transaction is dropped uncommitted, which rolls back
    /// every write including the audit row, so redelivery retries in full.
    pub async fn process_at(
        &self,
        event: &ProviderEvent,
        payload: &str,
        now: DateTime<Utc>,
    ) -> Result<ProcessOutcome> {
        let txn = self.db.begin().await?;

        let existing = PaymentEventEntity::find()
            .filter(PaymentEventColumn::ExternalEventId.eq(&event.id))
            .one(&txn)
            .await?;

        let record = match existing {
            Some(record) if record.is_processed() => {
                info!(event_id = %event.id, event_type = %event.event_type, "Event already processed");
                metrics::record_webhook(&event.event_type, "duplicate");
                return Ok(ProcessOutcome::AlreadyProcessed);
            }
            Some(record) => record,
            None => {
                PaymentEventActiveModel {
                    id: Set(Uuid::new_v4()),
                    external_event_id: Set(event.id.clone()),
                    event_type: Set(event.event_type.clone()),
                    account_id: Set(None),
                    payload: Set(payload.to_string()),
                    processed_at: Set(None),
                    created_at: Set(now.into()),
                }
                .insert(&txn)
                .await?
            }
        };

        let account_id = self.apply(&txn, event, now).await?;

        let mut record = record.into_active_model();
        record.processed_at = Set(Some(now.into()));
        if account_id.is_some() {
            record.account_id = Set(account_id);
        }
        record.update(&txn).await?;

        txn.commit().await?;

        info!(
            event_id = %event.id,
            event_type = %event.event_type,
            account_id = ?account_id,
            "Payment event applied"
        );
        metrics::record_webhook(&event.event_type, "applied");
        Ok(ProcessOutcome::Applied)
    }

    /// Dispatch to the type-specific handler; returns the affected account
    async fn apply(
        &self,
        txn: &DatabaseTransaction,
        event: &ProviderEvent,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>> {
        match &event.kind {
            EventKind::CheckoutCompleted(session) => {
                self.on_checkout_completed(txn, &event.id, session, now).await
            }
            EventKind::SubscriptionCreated(subscription)
            | EventKind::SubscriptionUpdated(subscription)
            | EventKind::SubscriptionDeleted(subscription) => {
                on_subscription_changed(txn, &event.id, subscription, now).await
            }
            EventKind::InvoicePaymentFailed(invoice) => {
                on_invoice_payment_failed(txn, &event.id, invoice, now).await
            }
            EventKind::InvoicePaymentSucceeded(_) => Ok(None),
            EventKind::Unknown => {
                info!(event_id = %event.id, event_type = %event.event_type, "Unhandled event type recorded");
                Ok(None)
            }
        }
    }

    async fn on_checkout_completed(
        &self,
        txn: &DatabaseTransaction,
        event_id: &str,
        session: &CheckoutSession,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>> {
        let account_id = session
            .metadata_value("user_id")
            .and_then(|id| Uuid::parse_str(id).ok());
        let account = match account_id {
            Some(id) => AccountEntity::find_by_id(id).one(txn).await?,
            None => None,
        };
        let Some(account) = account else {
            error!(
                event_id,
                checkout_session = %session.id,
                user_ref = ?session.metadata_value("user_id"),
                "Checkout completed for unknown account, dropping event"
            );
            return Ok(None);
        };

        let plan = session
            .metadata_value("plan_type")
            .and_then(SubscriptionPlan::parse_paid)
            .unwrap_or(SubscriptionPlan::Monthly);
        let period_end = now + Duration::days(plan.period_days());
        let account_id = account.id;

        let mut active = account.clone().into_active_model();
        active.subscription_status = Set(SubscriptionStatus::Active.into());
        active.subscription_plan = Set(plan.into());
        active.subscription_ends_at = Set(Some(period_end.into()));
        if account.customer_ref.is_none() {
            active.customer_ref = Set(session.customer.clone());
        }
        active.updated_at = Set(now.into());
        active.update(txn).await?;

        let has_active = SubscriptionEntity::find()
            .filter(SubscriptionColumn::AccountId.eq(account_id))
            .filter(SubscriptionColumn::Status.eq(SUBSCRIPTION_STATUS_ACTIVE))
            .one(txn)
            .await?
            .is_some();
        if has_active {
            return Ok(Some(account_id));
        }

        let external_id = session
            .subscription
            .clone()
            .unwrap_or_else(|| format!("checkout_{}", session.id));

        // A non-active record with this external id (e.g. canceled) is revived, not duplicated.
        let existing = SubscriptionEntity::find()
            .filter(SubscriptionColumn::ExternalSubscriptionId.eq(&external_id))
            .one(txn)
            .await?;

        match existing {
            Some(record) => {
                let mut record = record.into_active_model();
                record.status = Set(SUBSCRIPTION_STATUS_ACTIVE.to_string());
                record.plan_type = Set(plan.as_str().to_string());
                record.current_period_start = Set(now.into());
                record.current_period_end = Set(period_end.into());
                record.updated_at = Set(now.into());
                record.update(txn).await?;
            }
            None => {
                SubscriptionActiveModel {
                    id: Set(Uuid::new_v4()),
                    account_id: Set(account_id),
                    external_subscription_id: Set(external_id.clone()),
                    external_price_id: Set(self.prices.for_plan(plan).to_string()),
                    status: Set(SUBSCRIPTION_STATUS_ACTIVE.to_string()),
                    plan_type: Set(plan.as_str().to_string()),
                    current_period_start: Set(now.into()),
                    current_period_end: Set(period_end.into()),
                    canceled_at: Set(None),
                    created_at: Set(now.into()),
                    updated_at: Set(now.into()),
                }
                .insert(txn)
                .await?;
            }
        }

        info!(
            account_id = %account_id,
            subscription_id = %external_id,
            plan = plan.as_str(),
            "Subscription activated from checkout"
        );
        Ok(Some(account_id))
    }
}

async fn on_subscription_changed(
    txn: &DatabaseTransaction,
    event_id: &str,
    object: &SubscriptionObject,
    now: DateTime<Utc>,
) -> Result<Option<Uuid>> {
    let Some(record) = SubscriptionEntity::find()
        .filter(SubscriptionColumn::ExternalSubscriptionId.eq(&object.id))
        .one(txn)
        .await?
    else {
        error!(event_id, subscription_id = %object.id, "Subscription event for unknown subscription, dropping event");
        return Ok(None);
    };

    let account_id = record.account_id;
    let mut active = record.into_active_model();
    active.status = Set(object.status.clone());
    if let Some(start) = object.current_period_start.and_then(from_unix) {
        active.current_period_start = Set(start.into());
    }
    let period_end = object.current_period_end.and_then(from_unix);
    if let Some(end) = period_end {
        active.current_period_end = Set(end.into());
    }
    active.canceled_at = Set(object.canceled_at.and_then(from_unix).map(Into::into));
    active.updated_at = Set(now.into());
    let record = active.update(txn).await?;

    let mirrored = match object.status.as_str() {
        "active" => Some(SubscriptionStatus::Active),
        "past_due" => Some(SubscriptionStatus::PastDue),
        "canceled" => Some(SubscriptionStatus::Canceled),
        _ => None,
    };

    let Some(status) = mirrored else {
        return Ok(Some(account_id));
    };

    let Some(account) = AccountEntity::find_by_id(account_id).one(txn).await? else {
        error!(event_id, account_id = %account_id, "Subscription owner missing, account not updated");
        return Ok(None);
    };

    let mut account = account.into_active_model();
    account.subscription_status = Set(status.into());
    if status == SubscriptionStatus::Active {
        account.subscription_ends_at = Set(Some(record.current_period_end));
    }
    account.updated_at = Set(now.into());
    account.update(txn).await?;

    info!(
        account_id = %account_id,
        subscription_id = %object.id,
        status = %object.status,
        "Subscription status mirrored"
    );
    Ok(Some(account_id))
}

async fn on_invoice_payment_failed(
    txn: &DatabaseTransaction,
    event_id: &str,
    invoice: &InvoiceObject,
    now: DateTime<Utc>,
) -> Result<Option<Uuid>> {
    let account = match invoice.customer.as_deref() {
        Some(customer) => {
            AccountEntity::find()
                .filter(AccountColumn::CustomerRef.eq(customer))
                .one(txn)
                .await?
        }
        None => None,
    };
    let Some(account) = account else {
        error!(event_id, customer = ?invoice.customer, "Payment failure for unknown customer, dropping event");
        return Ok(None);
    };

    let account_id = account.id;
    let mut account = account.into_active_model();
    account.subscription_status = Set(SubscriptionStatus::PastDue.into());
    account.updated_at = Set(now.into());
    account.update(txn).await?;

    warn!(account_id = %account_id, invoice = ?invoice.id, "Invoice payment failed, account past due");
    Ok(Some(account_id))
}

fn from_unix(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_prices() {
        let prices = PlanPrices::from(&BillingConfig::default());
        assert_eq!(prices.for_plan(SubscriptionPlan::Annual), "price_annual_192");
        assert_eq!(prices.for_plan(SubscriptionPlan::Monthly), "price_monthly_27");
    }

    #[test]
    fn test_from_unix() {
        let ts = from_unix(1_700_000_000).unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(ProcessOutcome::Applied.as_str(), "applied");
        assert_eq!(ProcessOutcome::AlreadyProcessed.as_str(), "already_processed");
    }
}
