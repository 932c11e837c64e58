//! Registration, login and logout
//!
//! Successful sign-in returns the session token in the body and as an
//! HttpOnly cookie, so both API clients and browser pages work.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::account::AccountView;
use crate::AppState;
use writify_common::{
    auth::{
        clear_session_cookie, hash_password, normalize_email, session_cookie,
        validate_password_strength, verify_password,
    },
    db::{models::Account, Credential, NewAccount},
    errors::{AppError, Result},
};

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 254))]
    pub email: String,

    #[validate(length(min = 1, max = 100))]
    pub first_name: String,

    #[validate(length(min = 1, max = 100))]
    pub last_name: String,

    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct GoogleLoginRequest {
    /// Google ID token from the sign-in button
    pub credential: String,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub account: AccountView,
}

#[derive(Serialize)]
pub struct LoginPage {
    pub page: &'static str,
    pub google_client_id: Option<String>,
}

/// Issue a session for an account
fn session_response(state: &AppState, account: &Account, status: StatusCode) -> Result<Response> {
    let token = state.jwt.generate_token(account.id)?;
    let cookie = session_cookie(
        &state.config.auth.session_cookie,
        &token,
        state.jwt.expiration_secs(),
    );

    let body = SessionResponse {
        token,
        token_type: "Bearer",
        expires_in: state.jwt.expiration_secs(),
        account: AccountView::of(account, Utc::now()),
    };

    Ok((status, [(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal {
            message: format!("Password task failed: {}", e),
        })?
}

/// Login page model
pub async fn login_page(State(state): State<AppState>) -> Json<LoginPage> {
    Json(LoginPage {
        page: "login",
        google_client_id: state.config.auth.google_client_id.clone(),
    })
}

/// Create a password account and start its trial
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Response> {
    request.validate()?;
    let email = normalize_email(&request.email)?;
    validate_password_strength(&request.password)?;

    let password = request.password;
    let password_hash = blocking(move || hash_password(&password)).await?;

    let account = state
        .repo
        .create_account(NewAccount {
            email,
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            credential: Credential::Password(password_hash),
        })
        .await?;

    tracing::info!(account_id = %account.id, "Account registered");
    session_response(&state, &account, StatusCode::CREATED)
}

/// Password login; every failure looks the same to the caller
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Response> {
    let email = normalize_email(&request.email).map_err(|_| AppError::InvalidCredentials)?;

    let account = state
        .repo
        .find_account_by_email(&email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    let Some(hash) = account.password_hash.clone() else {
        tracing::debug!(account_id = %account.id, "Password login on federated-only account");
        return Err(AppError::InvalidCredentials);
    };

    let password = request.password;
    if !blocking(move || verify_password(&password, &hash)).await? {
        tracing::info!(account_id = %account.id, "Failed login attempt");
        return Err(AppError::InvalidCredentials);
    }

    let account = state.repo.expire_trial_if_due(account).await?;
    tracing::info!(account_id = %account.id, "Account logged in");
    session_response(&state, &account, StatusCode::OK)
}

/// Sign in with a Google ID token, linking or creating the account
pub async fn google_login(
    State(state): State<AppState>,
    Json(request): Json<GoogleLoginRequest>,
) -> Result<Response> {
    let verifier = state.federated.as_ref().ok_or_else(|| AppError::NotFound {
        resource_type: "sign-in provider".to_string(),
        id: "google".to_string(),
    })?;

    if request.credential.trim().is_empty() {
        return Err(AppError::MissingField {
            field: "credential".to_string(),
        });
    }

    let identity = verifier.verify(request.credential.trim()).await?;

    let account = match state.repo.find_account_by_federated_id(&identity.subject).await? {
        Some(account) => account,
        None => match state.repo.find_account_by_email(&identity.email).await? {
            Some(account) => {
                tracing::info!(account_id = %account.id, "Linking Google identity to existing account");
                state.repo.link_federated_id(account, &identity.subject).await?
            }
            None => {
                let account = state
                    .repo
                    .create_account(NewAccount {
                        email: identity.email,
                        first_name: identity.first_name,
                        last_name: identity.last_name,
                        credential: Credential::Federated(identity.subject),
                    })
                    .await?;
                tracing::info!(account_id = %account.id, "Account registered via Google");
                account
            }
        },
    };

    let account = state.repo.expire_trial_if_due(account).await?;
    session_response(&state, &account, StatusCode::OK)
}

/// Clear the session cookie
pub async fn logout(State(state): State<AppState>) -> Response {
    (
        [(
            header::SET_COOKIE,
            clear_session_cookie(&state.config.auth.session_cookie),
        )],
        Json(serde_json::json!({ "success": true })),
    )
        .into_response()
}
