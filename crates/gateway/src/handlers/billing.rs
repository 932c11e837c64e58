//! Billing API: checkout, portal, cancellation toggles and status
//!
//! None of these change entitlement directly. The provider confirms
//! every change with a webhook, which the processor applies.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::CurrentAccount;
use crate::AppState;
use writify_common::{
    billing::{CheckoutRequest, PlanPrices},
    db::models::{Subscription, SubscriptionPlan},
    entitlement::EntitlementSnapshot,
    errors::{AppError, Result},
};

#[derive(Debug, Deserialize)]
pub struct CheckoutSessionRequest {
    #[serde(default)]
    pub plan_type: String,
}

#[derive(Serialize)]
pub struct CheckoutSessionResponse {
    pub checkout_url: String,
}

#[derive(Serialize)]
pub struct PortalSessionResponse {
    pub portal_url: String,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Subscription record as shown to its owner
#[derive(Debug, Serialize)]
pub struct SubscriptionView {
    pub plan_type: String,
    pub status: String,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub canceled_at: Option<DateTime<Utc>>,
}

impl From<&Subscription> for SubscriptionView {
    fn from(sub: &Subscription) -> Self {
        Self {
            plan_type: sub.plan_type.clone(),
            status: sub.status.clone(),
            current_period_start: sub.current_period_start.with_timezone(&Utc),
            current_period_end: sub.current_period_end.with_timezone(&Utc),
            canceled_at: sub.canceled_at.map(|t| t.with_timezone(&Utc)),
        }
    }
}

#[derive(Serialize)]
pub struct SubscriptionStatusResponse {
    #[serde(flatten)]
    pub entitlement: EntitlementSnapshot,
    pub subscription: Option<SubscriptionView>,
}

/// Start a hosted checkout for a paid plan
pub async fn create_checkout_session(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    Json(request): Json<CheckoutSessionRequest>,
) -> Result<Json<CheckoutSessionResponse>> {
    let plan = SubscriptionPlan::parse_paid(&request.plan_type).ok_or_else(|| {
        AppError::Validation {
            message: "Invalid plan type".to_string(),
            field: Some("plan_type".to_string()),
        }
    })?;

    let account = match account.customer_ref.clone() {
        Some(_) => account,
        None => {
            let customer = state
                .provider
                .create_customer(&account.email, &account.full_name(), account.id)
                .await?;
            tracing::info!(account_id = %account.id, "Payment customer created");
            state.repo.set_customer_ref(account, &customer).await?
        }
    };
    let customer = account.customer_ref.clone().unwrap_or_default();

    let prices = PlanPrices::from(&state.config.billing);
    let checkout = CheckoutRequest {
        customer,
        price_id: prices.for_plan(plan).to_string(),
        account_id: account.id,
        plan,
        success_url: state
            .config
            .public_link("/success?session_id={CHECKOUT_SESSION_ID}"),
        cancel_url: state.config.public_link("/pricing"),
    };

    let checkout_url = state.provider.create_checkout_session(&checkout).await?;
    tracing::info!(account_id = %account.id, plan = plan.as_str(), "Checkout session created");

    Ok(Json(CheckoutSessionResponse { checkout_url }))
}

/// Open the provider's self-service billing portal
pub async fn create_billing_portal_session(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
) -> Result<Json<PortalSessionResponse>> {
    let customer = account
        .customer_ref
        .as_deref()
        .ok_or_else(|| AppError::NotFound {
            resource_type: "billing customer".to_string(),
            id: account.id.to_string(),
        })?;

    let portal_url = state
        .provider
        .create_portal_session(customer, &state.config.public_link("/billing"))
        .await?;

    Ok(Json(PortalSessionResponse { portal_url }))
}

/// Cancel the active subscription at the end of its period
pub async fn cancel_subscription(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
) -> Result<Json<SuccessResponse>> {
    set_cancel_at_period_end(&state, account.id, true).await
}

/// Undo a pending cancellation
pub async fn reactivate_subscription(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
) -> Result<Json<SuccessResponse>> {
    set_cancel_at_period_end(&state, account.id, false).await
}

async fn set_cancel_at_period_end(
    state: &AppState,
    account_id: Uuid,
    cancel: bool,
) -> Result<Json<SuccessResponse>> {
    let subscription = state
        .repo
        .find_active_subscription(account_id)
        .await?
        .ok_or(AppError::SubscriptionNotFound)?;

    state
        .provider
        .set_cancel_at_period_end(&subscription.external_subscription_id, cancel)
        .await?;

    tracing::info!(
        account_id = %account_id,
        subscription_id = %subscription.external_subscription_id,
        cancel,
        "Subscription cancel-at-period-end updated"
    );

    Ok(Json(SuccessResponse { success: true }))
}

/// Entitlement snapshot plus the active subscription, if any
pub async fn subscription_status(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
) -> Result<Json<SubscriptionStatusResponse>> {
    let subscription = state.repo.find_active_subscription(account.id).await?;

    Ok(Json(SubscriptionStatusResponse {
        entitlement: EntitlementSnapshot::of(&account, Utc::now()),
        subscription: subscription.as_ref().map(SubscriptionView::from),
    }))
}
