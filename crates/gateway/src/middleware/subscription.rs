//! Subscription gate
//!
//! Runs after [`require_session`](super::session::require_session). API
//! callers without access get a structured 403; page callers are sent to
//! the pricing page with a notice code.

use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use writify_common::{entitlement::GateNotice, errors::AppError, metrics};

use super::{is_api_path, CurrentAccount};

pub async fn require_subscription(request: Request, next: Next) -> Response {
    let Some(CurrentAccount(account)) = request.extensions().get::<CurrentAccount>().cloned()
    else {
        return AppError::Unauthorized {
            message: "Authentication required".to_string(),
        }
        .into_response();
    };

    let now = Utc::now();
    if account.has_valid_access_at(now) {
        return next.run(request).await;
    }

    tracing::info!(
        account_id = %account.id,
        subscription_status = account.status().as_str(),
        path = %request.uri().path(),
        "Access denied without active subscription"
    );

    if is_api_path(request.uri().path()) {
        metrics::record_gate_denial("api");
        account.subscription_required(now).into_response()
    } else {
        metrics::record_gate_denial("page");
        Redirect::to(&GateNotice::for_account(&account).redirect_path()).into_response()
    }
}
