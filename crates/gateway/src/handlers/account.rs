//! Account profile and removal

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::middleware::CurrentAccount;
use crate::AppState;
use writify_common::{
    auth::clear_session_cookie,
    db::models::Account,
    entitlement::EntitlementSnapshot,
    errors::Result,
};

/// Public view of an account; never carries credentials
#[derive(Debug, Serialize)]
pub struct AccountView {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
    pub entitlement: EntitlementSnapshot,
}

impl AccountView {
    pub fn of(account: &Account, now: DateTime<Utc>) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            first_name: account.first_name.clone(),
            last_name: account.last_name.clone(),
            created_at: account.created_at.with_timezone(&Utc),
            entitlement: EntitlementSnapshot::of(account, now),
        }
    }
}

/// Get the signed-in account
pub async fn get_account(CurrentAccount(account): CurrentAccount) -> Json<AccountView> {
    Json(AccountView::of(&account, Utc::now()))
}

#[derive(Serialize)]
pub struct DeleteAccountResponse {
    pub deleted: bool,
    pub documents_removed: usize,
}

/// Delete the signed-in account and everything it owns
pub async fn delete_account(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
) -> Result<Response> {
    let documents = state.repo.delete_account(account.id).await?;

    for document in &documents {
        state.storage.remove(document).await;
    }

    if let Some(customer) = account.customer_ref.as_deref() {
        if let Err(e) = state.provider.delete_customer(customer).await {
            tracing::warn!(
                account_id = %account.id,
                error = %e,
                "Failed to delete payment provider customer"
            );
        }
    }

    tracing::info!(
        account_id = %account.id,
        documents = documents.len(),
        "Account deleted"
    );

    Ok((
        [(
            header::SET_COOKIE,
            clear_session_cookie(&state.config.auth.session_cookie),
        )],
        Json(DeleteAccountResponse {
            deleted: true,
            documents_removed: documents.len(),
        }),
    )
        .into_response())
}
