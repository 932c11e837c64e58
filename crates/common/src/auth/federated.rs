//! Federated identity verification
//!
//! The browser hands us a Google ID token; we ask Google's tokeninfo
//! endpoint whether it is genuine and check that it was minted for us.

use crate::config::AuthConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// Verified identity claims from the federated provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedIdentity {
    /// Provider subject id, stable per user
    pub subject: String,
    /// Lowercased, provider-verified email
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[async_trait]
pub trait FederatedVerifier: Send + Sync {
    /// Verify an ID token and return the identity it asserts
    async fn verify(&self, id_token: &str) -> Result<FederatedIdentity>;
}

/// Raw tokeninfo response; Google encodes booleans as strings here
#[derive(Debug, Deserialize)]
pub(crate) struct TokenInfo {
    #[serde(default)]
    aud: String,
    #[serde(default)]
    iss: String,
    #[serde(default)]
    sub: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    email_verified: serde_json::Value,
    #[serde(default)]
    given_name: String,
    #[serde(default)]
    family_name: String,
}

impl TokenInfo {
    /// Check audience, issuer and required claims
    pub(crate) fn into_identity(self, client_id: &str) -> Result<FederatedIdentity> {
        let reject = |reason: &str| {
            tracing::warn!(reason, "Federated token rejected");
            AppError::Unauthorized {
                message: "Google authentication failed".to_string(),
            }
        };

        if self.aud != client_id {
            return Err(reject("audience mismatch"));
        }
        if !GOOGLE_ISSUERS.contains(&self.iss.as_str()) {
            return Err(reject("unexpected issuer"));
        }
        let verified = match &self.email_verified {
            serde_json::Value::Bool(b) => *b,
            serde_json::Value::String(s) => s == "true",
            _ => false,
        };
        if !verified {
            return Err(reject("email not verified"));
        }
        if self.sub.is_empty() || self.email.is_empty() {
            return Err(reject("missing subject or email"));
        }

        Ok(FederatedIdentity {
            subject: self.sub,
            email: self.email.trim().to_lowercase(),
            first_name: self.given_name,
            last_name: self.family_name,
        })
    }
}

/// Verifies Google ID tokens via the tokeninfo endpoint
pub struct GoogleVerifier {
    client: reqwest::Client,
    client_id: String,
    tokeninfo_url: String,
}

impl GoogleVerifier {
    /// Returns `None` when no client id is configured
    pub fn from_config(config: &AuthConfig) -> Result<Option<Self>> {
        let Some(client_id) = config.google_client_id.clone().filter(|id| !id.is_empty()) else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Some(Self {
            client,
            client_id,
            tokeninfo_url: config.google_tokeninfo_url.clone(),
        }))
    }
}

#[async_trait]
impl FederatedVerifier for GoogleVerifier {
    async fn verify(&self, id_token: &str) -> Result<FederatedIdentity> {
        // JWTs have three dot-separated parts
        if id_token.split('.').count() != 3 {
            return Err(AppError::Unauthorized {
                message: "Google authentication failed".to_string(),
            });
        }

        let response = self
            .client
            .get(&self.tokeninfo_url)
            .query(&[("id_token", id_token)])
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "Google rejected ID token");
            return Err(AppError::Unauthorized {
                message: "Google authentication failed".to_string(),
            });
        }

        let info: TokenInfo = response.json().await?;
        info.into_identity(&self.client_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn info(overrides: serde_json::Value) -> TokenInfo {
        let mut base = json!({
            "aud": "client-123.apps.googleusercontent.com",
            "iss": "https://accounts.google.com",
            "sub": "1098765",
            "email": "Ada@Example.com",
            "email_verified": "true",
            "given_name": "Ada",
            "family_name": "Lovelace"
        });
        if let (Some(base), Some(extra)) = (base.as_object_mut(), overrides.as_object()) {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(base).unwrap()
    }

    const CLIENT: &str = "client-123.apps.googleusercontent.com";

    #[test]
    fn test_valid_token_info() {
        let identity = info(json!({})).into_identity(CLIENT).unwrap();
        assert_eq!(identity.subject, "1098765");
        assert_eq!(identity.email, "ada@example.com");
        assert_eq!(identity.first_name, "Ada");
    }

    #[test]
    fn test_rejections() {
        assert!(info(json!({"aud": "someone-else"})).into_identity(CLIENT).is_err());
        assert!(info(json!({"iss": "evil.example.com"})).into_identity(CLIENT).is_err());
        assert!(info(json!({"email_verified": "false"})).into_identity(CLIENT).is_err());
        assert!(info(json!({"sub": ""})).into_identity(CLIENT).is_err());
    }

    #[test]
    fn test_boolean_email_verified() {
        assert!(info(json!({"email_verified": true})).into_identity(CLIENT).is_ok());
    }

    #[test]
    fn test_disabled_without_client_id() {
        assert!(GoogleVerifier::from_config(&AuthConfig::default()).unwrap().is_none());
    }
}
