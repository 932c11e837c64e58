//! Payment provider API client
//!
//! Synchronous calls made on behalf of a signed-in account: customer
//! creation, hosted checkout, the self-service portal and cancellation
//! toggles. Entitlement changes never happen here; they arrive later as
//! webhook events.

use crate::config::BillingConfig;
use crate::db::models::SubscriptionPlan;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

/// Parameters for a hosted subscription checkout
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub customer: String,
    pub price_id: String,
    pub account_id: Uuid,
    pub plan: SubscriptionPlan,
    pub success_url: String,
    pub cancel_url: String,
}

/// Outbound operations against the payment provider
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a customer and return its provider id
    async fn create_customer(&self, email: &str, name: &str, account_id: Uuid) -> Result<String>;

    /// Create a checkout session and return the hosted URL
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<String>;

    /// Create a billing portal session and return its URL
    async fn create_portal_session(&self, customer: &str, return_url: &str) -> Result<String>;

    /// Toggle cancel-at-period-end on a subscription
    async fn set_cancel_at_period_end(&self, subscription_id: &str, cancel: bool) -> Result<()>;

    async fn delete_customer(&self, customer: &str) -> Result<()>;
}

/// Stripe REST client (form-encoded requests, bearer secret key)
pub struct StripeClient {
    client: reqwest::Client,
    secret_key: Option<String>,
    api_base: String,
}

#[derive(Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Deserialize)]
struct UrlResponse {
    url: String,
}

impl StripeClient {
    pub fn new(config: &BillingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        if config.secret_key.is_none() {
            tracing::warn!("Billing secret key not set, provider calls will fail");
        }

        Ok(Self {
            client,
            secret_key: config.secret_key.clone().filter(|k| !k.is_empty()),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn secret(&self) -> Result<&str> {
        self.secret_key
            .as_deref()
            .ok_or_else(|| AppError::PaymentProvider {
                message: "Payment provider is not configured".to_string(),
            })
    }

    async fn send(&self, request: reqwest::RequestBuilder, operation: &str) -> Result<reqwest::Response> {
        let response = request
            .bearer_auth(self.secret()?)
            .send()
            .await
            .map_err(|e| AppError::PaymentProvider {
                message: format!("{} request failed: {}", operation, e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(operation, %status, body = %body, "Payment provider rejected request");
            return Err(AppError::PaymentProvider {
                message: format!("{} failed with status {}", operation, status),
            });
        }

        Ok(response)
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        form: &[(&str, String)],
        operation: &str,
    ) -> Result<T> {
        let url = format!("{}{}", self.api_base, path);
        let response = self.send(self.client.post(&url).form(form), operation).await?;
        response.json().await.map_err(|e| AppError::PaymentProvider {
            message: format!("Failed to parse {} response: {}", operation, e),
        })
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_customer(&self, email: &str, name: &str, account_id: Uuid) -> Result<String> {
        let form = [
            ("email", email.to_string()),
            ("name", name.to_string()),
            ("metadata[user_id]", account_id.to_string()),
        ];
        let customer: IdResponse = self.post_form("/customers", &form, "create customer").await?;
        tracing::info!(account_id = %account_id, customer = %customer.id, "Provider customer created");
        Ok(customer.id)
    }

    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<String> {
        let form = [
            ("customer", request.customer.clone()),
            ("mode", "subscription".to_string()),
            ("payment_method_types[0]", "card".to_string()),
            ("line_items[0][price]", request.price_id.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            ("success_url", request.success_url.clone()),
            ("cancel_url", request.cancel_url.clone()),
            ("metadata[user_id]", request.account_id.to_string()),
            ("metadata[plan_type]", request.plan.as_str().to_string()),
        ];
        let session: UrlResponse = self
            .post_form("/checkout/sessions", &form, "create checkout session")
            .await?;
        Ok(session.url)
    }

    async fn create_portal_session(&self, customer: &str, return_url: &str) -> Result<String> {
        let form = [
            ("customer", customer.to_string()),
            ("return_url", return_url.to_string()),
        ];
        let session: UrlResponse = self
            .post_form("/billing_portal/sessions", &form, "create portal session")
            .await?;
        Ok(session.url)
    }

    async fn set_cancel_at_period_end(&self, subscription_id: &str, cancel: bool) -> Result<()> {
        let form = [("cancel_at_period_end", cancel.to_string())];
        let _: IdResponse = self
            .post_form(
                &format!("/subscriptions/{}", subscription_id),
                &form,
                "update subscription",
            )
            .await?;
        Ok(())
    }

    async fn delete_customer(&self, customer: &str) -> Result<()> {
        let url = format!("{}/customers/{}", self.api_base, customer);
        self.send(self.client.delete(&url), "delete customer").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_client_refuses_calls() {
        let client = StripeClient::new(&BillingConfig::default()).unwrap();
        let err = client
            .create_portal_session("cus_123", "https://writify.test/billing")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PaymentProvider { .. }));
    }

    #[test]
    fn test_api_base_trailing_slash() {
        let config = BillingConfig {
            api_base: "https://api.stripe.com/v1/".to_string(),
            ..BillingConfig::default()
        };
        let client = StripeClient::new(&config).unwrap();
        assert_eq!(client.api_base, "https://api.stripe.com/v1");
    }
}
