//! Page models
//!
//! Browser pages are served as JSON models that a front end renders.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{
    account::AccountView, billing::SubscriptionView, documents::DocumentView,
};
use crate::middleware::CurrentAccount;
use crate::AppState;
use writify_common::{
    db::models::SubscriptionPlan,
    entitlement::{GateNotice, TRIAL_DAYS},
    errors::Result,
};

#[derive(Serialize)]
pub struct PlanView {
    pub plan_type: &'static str,
    pub price_id: String,
    pub period_days: i64,
}

#[derive(Serialize)]
pub struct NoticeView {
    pub code: &'static str,
    pub message: &'static str,
}

#[derive(Serialize)]
pub struct PricingPage {
    pub page: &'static str,
    pub trial_days: i64,
    pub plans: Vec<PlanView>,
    pub notice: Option<NoticeView>,
}

#[derive(Debug, Deserialize)]
pub struct PricingQuery {
    pub notice: Option<String>,
}

/// Public pricing page; `notice` explains why the gate sent the user here
pub async fn pricing(
    State(state): State<AppState>,
    Query(query): Query<PricingQuery>,
) -> Json<PricingPage> {
    let billing = &state.config.billing;
    let plans = [
        (SubscriptionPlan::Monthly, &billing.monthly_price_id),
        (SubscriptionPlan::Annual, &billing.annual_price_id),
    ]
    .into_iter()
    .map(|(plan, price_id)| PlanView {
        plan_type: plan.as_str(),
        price_id: price_id.clone(),
        period_days: plan.period_days(),
    })
    .collect();

    let notice = query
        .notice
        .as_deref()
        .and_then(GateNotice::from_code)
        .map(|notice| NoticeView {
            code: notice.code(),
            message: notice.message(),
        });

    Json(PricingPage {
        page: "pricing",
        trial_days: TRIAL_DAYS,
        plans,
        notice,
    })
}

#[derive(Serialize)]
pub struct BillingPage {
    pub page: &'static str,
    pub account: AccountView,
    pub subscriptions: Vec<SubscriptionView>,
}

/// Billing overview: entitlement plus subscription history
pub async fn billing(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
) -> Result<Json<BillingPage>> {
    let subscriptions = state.repo.list_subscriptions(account.id).await?;
    Ok(Json(BillingPage {
        page: "billing",
        account: AccountView::of(&account, Utc::now()),
        subscriptions: subscriptions.iter().map(SubscriptionView::from).collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SuccessQuery {
    pub session_id: Option<String>,
}

#[derive(Serialize)]
pub struct SuccessPage {
    pub page: &'static str,
    pub session_id: Option<String>,
    pub message: &'static str,
    pub account: AccountView,
}

/// Checkout return page; access follows once the webhook lands
pub async fn success(
    CurrentAccount(account): CurrentAccount,
    Query(query): Query<SuccessQuery>,
) -> Json<SuccessPage> {
    let message = if account.is_subscription_active() {
        "Your subscription is active. Thank you!"
    } else {
        "Thank you! Your payment is being confirmed and access will update shortly."
    };

    Json(SuccessPage {
        page: "success",
        session_id: query.session_id,
        message,
        account: AccountView::of(&account, Utc::now()),
    })
}

#[derive(Serialize)]
pub struct DashboardText {
    pub id: uuid::Uuid,
    pub title: String,
    pub updated_at: chrono::DateTime<Utc>,
}

#[derive(Serialize)]
pub struct DashboardPage {
    pub page: &'static str,
    pub account: AccountView,
    pub texts: Vec<DashboardText>,
    pub documents: Vec<DocumentView>,
}

/// Writing workspace: saved texts and uploaded documents
pub async fn dashboard(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
) -> Result<Json<DashboardPage>> {
    let texts = state.repo.list_texts(account.id).await?;
    let documents = state.repo.list_documents(account.id).await?;

    Ok(Json(DashboardPage {
        page: "dashboard",
        account: AccountView::of(&account, Utc::now()),
        texts: texts
            .into_iter()
            .map(|text| DashboardText {
                id: text.id,
                title: text.title,
                updated_at: text.updated_at.with_timezone(&Utc),
            })
            .collect(),
        documents: documents.iter().map(DocumentView::from).collect(),
    }))
}
