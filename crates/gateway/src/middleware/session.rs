//! Session middleware
//!
//! Resolves the session token to an account, applies the passive trial
//! expiry sweep and hands the fresh account to handlers via request
//! extensions.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use writify_common::{
    auth::session_token,
    db::models::Account,
    errors::{AppError, Result},
};

use super::is_api_path;
use crate::AppState;

pub const LOGIN_PATH: &str = "/auth/login";

/// The signed-in account, already swept for trial expiry
#[derive(Debug, Clone)]
pub struct CurrentAccount(pub Account);

impl<S: Send + Sync> FromRequestParts<S> for CurrentAccount {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<CurrentAccount>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized {
                message: "Authentication required".to_string(),
            })
    }
}

/// Require a valid session; API callers get 401, page callers go to login
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let api = is_api_path(request.uri().path());
    // Owned copy: the request must not be borrowed across the lookups below
    let token = session_token(request.headers(), &state.config.auth.session_cookie)
        .map(str::to_string);

    match resolve_account(&state, token.as_deref()).await {
        Ok(account) => {
            request.extensions_mut().insert(CurrentAccount(account));
            next.run(request).await
        }
        Err(e) if is_session_error(&e) => {
            tracing::debug!(error = %e, path = %request.uri().path(), "Session rejected");
            if api {
                e.into_response()
            } else {
                Redirect::to(LOGIN_PATH).into_response()
            }
        }
        Err(e) => e.into_response(),
    }
}

async fn resolve_account(state: &AppState, token: Option<&str>) -> Result<Account> {
    let token = token.ok_or_else(|| AppError::Unauthorized {
        message: "Authentication required".to_string(),
    })?;

    let claims = state.jwt.validate_token(token)?;
    let account_id = claims.account_id()?;

    let account = state
        .repo
        .find_account(account_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized {
            message: "Session account no longer exists".to_string(),
        })?;

    state.repo.expire_trial_if_due(account).await
}

fn is_session_error(error: &AppError) -> bool {
    matches!(
        error,
        AppError::Unauthorized { .. } | AppError::InvalidToken | AppError::ExpiredToken
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;

    fn assert_send_middleware<H, F>(_: H)
    where
        H: Fn(State<AppState>, Request, Next) -> F,
        F: Future<Output = Response> + Send,
    {
    }

    #[test]
    fn test_require_session_future_is_send() {
        // from_fn_with_state only accepts middleware whose future is Send
        assert_send_middleware(require_session);
    }
}
