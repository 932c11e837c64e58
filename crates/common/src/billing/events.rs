//! Webhook event parsing
//!
//! Provider events arrive as `{"id", "type", "data": {"object": {...}}}`.
//! The type string is mapped onto a closed set of kinds; anything else
//! becomes [`EventKind::Unknown`] and is recorded without side effects.

use crate::errors::{AppError, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// A verified, parsed webhook event
#[derive(Debug, Clone)]
pub struct ProviderEvent {
    /// Globally unique provider event id, the dedup key
    pub id: String,
    /// Raw type string as delivered
    pub event_type: String,
    pub kind: EventKind,
}

#[derive(Debug, Clone)]
pub enum EventKind {
    CheckoutCompleted(CheckoutSession),
    SubscriptionCreated(SubscriptionObject),
    SubscriptionUpdated(SubscriptionObject),
    SubscriptionDeleted(SubscriptionObject),
    InvoicePaymentFailed(InvoiceObject),
    InvoicePaymentSucceeded(InvoiceObject),
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub customer: Option<String>,
    /// Unix seconds
    #[serde(default)]
    pub current_period_start: Option<i64>,
    /// Unix seconds
    #[serde(default)]
    pub current_period_end: Option<i64>,
    /// Unix seconds
    #[serde(default)]
    pub canceled_at: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceObject {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

impl ProviderEvent {
    /// Parse a raw webhook body
    pub fn parse(payload: &str) -> Result<Self> {
        let raw: RawEvent = serde_json::from_str(payload).map_err(|e| AppError::WebhookPayload {
            message: e.to_string(),
        })?;

        let object = raw.data.object;
        let kind = match raw.event_type.as_str() {
            "checkout.session.completed" => EventKind::CheckoutCompleted(decode(object)?),
            "customer.subscription.created" => EventKind::SubscriptionCreated(decode(object)?),
            "customer.subscription.updated" => EventKind::SubscriptionUpdated(decode(object)?),
            "customer.subscription.deleted" => EventKind::SubscriptionDeleted(decode(object)?),
            "invoice.payment_failed" => EventKind::InvoicePaymentFailed(decode(object)?),
            "invoice.payment_succeeded" => EventKind::InvoicePaymentSucceeded(decode(object)?),
            _ => EventKind::Unknown,
        };

        Ok(Self {
            id: raw.id,
            event_type: raw.event_type,
            kind,
        })
    }
}

fn decode<T: serde::de::DeserializeOwned>(object: serde_json::Value) -> Result<T> {
    serde_json::from_value(object).map_err(|e| AppError::WebhookPayload {
        message: format!("unexpected event object: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_checkout_completed() {
        let payload = json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": {
                "id": "cs_123",
                "customer": "cus_9",
                "subscription": null,
                "metadata": {"user_id": "abc", "plan_type": "annual"}
            }}
        })
        .to_string();

        let event = ProviderEvent::parse(&payload).unwrap();
        assert_eq!(event.id, "evt_1");
        match event.kind {
            EventKind::CheckoutCompleted(session) => {
                assert_eq!(session.id, "cs_123");
                assert_eq!(session.subscription, None);
                assert_eq!(session.metadata_value("plan_type"), Some("annual"));
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_parse_subscription_deleted() {
        let payload = json!({
            "id": "evt_2",
            "type": "customer.subscription.deleted",
            "data": {"object": {
                "id": "sub_1",
                "status": "canceled",
                "current_period_start": 1700000000,
                "current_period_end": 1702592000,
                "canceled_at": 1701000000
            }}
        })
        .to_string();

        match ProviderEvent::parse(&payload).unwrap().kind {
            EventKind::SubscriptionDeleted(sub) => {
                assert_eq!(sub.status, "canceled");
                assert_eq!(sub.canceled_at, Some(1701000000));
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        let payload = json!({
            "id": "evt_3",
            "type": "customer.tax_id.created",
            "data": {"object": {"anything": true}}
        })
        .to_string();

        let event = ProviderEvent::parse(&payload).unwrap();
        assert!(matches!(event.kind, EventKind::Unknown));
        assert_eq!(event.event_type, "customer.tax_id.created");
    }

    #[test]
    fn test_malformed_payloads_rejected() {
        assert!(matches!(
            ProviderEvent::parse("not json"),
            Err(AppError::WebhookPayload { .. })
        ));

        let missing_status = json!({
            "id": "evt_4",
            "type": "customer.subscription.updated",
            "data": {"object": {"id": "sub_1"}}
        })
        .to_string();
        assert!(ProviderEvent::parse(&missing_status).is_err());
    }
}
