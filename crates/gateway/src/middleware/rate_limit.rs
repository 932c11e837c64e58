//! Rate limiting middleware
//!
//! Two limiters:
//! - a process-wide token bucket (governor) in front of the suggestion endpoint
//! - a per-address fixed window in Redis in front of the auth endpoints, so the
//!   count holds across gateway instances

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use writify_common::{
    cache::keys,
    errors::{AppError, Result},
};

use crate::AppState;

/// Rate limiter using governor crate
pub type GlobalRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Create a new rate limiter; zero values are raised to one
pub fn create_rate_limiter(requests_per_second: u32, burst: u32) -> Arc<GlobalRateLimiter> {
    let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(burst).unwrap_or(rate);
    let quota = Quota::per_second(rate).allow_burst(burst);

    Arc::new(RateLimiter::direct(quota))
}

/// Token bucket in front of the generation-backed endpoint
pub async fn limit_suggestions(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    if state.config.rate_limit.enabled && state.limiter.check().is_err() {
        tracing::warn!("Suggestion rate limit exceeded");
        return Err(AppError::RateLimited {
            limit: state.config.rate_limit.requests_per_second,
            window_secs: 1,
        });
    }
    Ok(next.run(request).await)
}

/// Per-address attempt counter for login, registration and federated sign-in.
///
/// Fails open: when Redis is absent or errors the request is let through.
pub async fn limit_auth_attempts(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let settings = &state.config.rate_limit;
    if !settings.enabled {
        return Ok(next.run(request).await);
    }

    let Some(cache) = state.cache.as_ref() else {
        tracing::warn!("No Redis connection, auth rate limit skipped");
        return Ok(next.run(request).await);
    };

    let endpoint = request
        .uri()
        .path()
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();
    let addr = client_addr(&request, &settings.trusted_proxies);
    let key = keys::auth_attempts(&endpoint, &addr);

    match cache.incr_with_window(&key, settings.auth_window_secs).await {
        Ok(count) if count > u64::from(settings.auth_attempts) => {
            tracing::warn!(endpoint = %endpoint, client = %addr, count, "Auth rate limit exceeded");
            Err(AppError::RateLimited {
                limit: settings.auth_attempts,
                window_secs: settings.auth_window_secs,
            })
        }
        Ok(_) => Ok(next.run(request).await),
        Err(e) => {
            tracing::warn!(error = %e, "Auth rate limit check failed, allowing request");
            Ok(next.run(request).await)
        }
    }
}

/// Address the auth counter is keyed on.
///
/// The socket peer, unless the peer is a trusted proxy; then the right-most
/// `X-Forwarded-For` hop that is not itself a trusted proxy. Hops to the left
/// of that are client-supplied and never used.
fn client_addr(request: &Request, trusted_proxies: &[IpAddr]) -> String {
    let Some(peer) = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
    else {
        return "unknown".to_string();
    };

    if !trusted_proxies.contains(&peer) {
        return peer.to_string();
    }

    let hops: Vec<IpAddr> = request
        .headers()
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|hop| hop.trim().parse().ok())
        .collect();

    hops.into_iter()
        .rev()
        .find(|hop| !trusted_proxies.contains(hop))
        .unwrap_or(peer)
        .to_string()
}
