//! Payment provider webhook
//!
//! The raw body is verified before anything is parsed or written, so a
//! forged delivery never leaves a payment event row behind.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;
use writify_common::{
    billing::ProviderEvent,
    errors::{AppError, Result},
    metrics,
};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
}

pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>> {
    let Some(verifier) = state.webhook_verifier.as_ref() else {
        tracing::error!("Webhook received but no signing secret is configured");
        metrics::record_webhook("unverified", "rejected");
        return Err(AppError::WebhookSignatureInvalid);
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            metrics::record_webhook("unverified", "rejected");
            AppError::WebhookSignatureInvalid
        })?;

    if let Err(e) = verifier.verify(&body, signature, Utc::now().timestamp()) {
        tracing::warn!(error = %e, "Webhook signature verification failed");
        metrics::record_webhook("unverified", "rejected");
        return Err(e);
    }

    let payload = std::str::from_utf8(&body).map_err(|_| AppError::WebhookPayload {
        message: "Body is not UTF-8".to_string(),
    })?;
    let event = ProviderEvent::parse(payload)?;

    match state.processor.process(&event, payload).await {
        Ok(outcome) => Ok(Json(WebhookResponse {
            status: outcome.as_str(),
        })),
        Err(e) => {
            tracing::error!(
                event_id = %event.id,
                event_type = %event.event_type,
                error = %e,
                "Webhook processing failed, rolled back"
            );
            metrics::record_webhook(&event.event_type, "failed");
            Err(AppError::WebhookPayload {
                message: format!("Failed to process event {}", event.id),
            })
        }
    }
}
