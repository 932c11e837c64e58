//! Authentication utilities
//!
//! Provides:
//! - Session token generation and validation (HS256 JWT)
//! - Argon2id password hashing and verification
//! - Password policy and email normalization
//! - Session token lookup from bearer header or cookie
//! - Federated identity verification (see [`federated`])

pub mod federated;

pub use federated::{FederatedIdentity, FederatedVerifier, GoogleVerifier};

use crate::config::AuthConfig;
use crate::errors::{AppError, Result};
use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::http::{header, HeaderMap};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::ValidateEmail;

const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;

const COMMON_PASSWORDS: &[&str] = &[
    "password",
    "12345678",
    "qwerty123",
    "abc12345",
    "password123",
    "123456789",
    "welcome123",
];

/// Session token claims
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (account ID)
    pub sub: String,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,
}

impl SessionClaims {
    pub fn account_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|_| AppError::InvalidToken)
    }
}

/// Session token manager
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_secs: i64,
}

impl JwtManager {
    /// Create a new session manager with the given secret
    pub fn new(secret: &str, expiration_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration_secs: expiration_secs as i64,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let secret = config
            .jwt_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "auth.jwt_secret must be set".to_string(),
            })?;
        Ok(Self::new(secret, config.jwt_expiration_secs))
    }

    pub fn expiration_secs(&self) -> i64 {
        self.expiration_secs
    }

    /// Issue a session token for an account
    pub fn generate_token(&self, account_id: Uuid) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.expiration_secs);

        let claims = SessionClaims {
            sub: account_id.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| AppError::Internal {
            message: format!("Failed to generate token: {}", e),
        })
    }

    /// Validate and decode a session token
    pub fn validate_token(&self, token: &str) -> Result<SessionClaims> {
        decode::<SessionClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::ExpiredToken,
                _ => AppError::InvalidToken,
            })
    }
}

/// Hash a password with Argon2id and a random salt
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal {
            message: format!("Password hash error: {}", e),
        })
}

/// Verify a password against a stored PHC-format hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| AppError::Internal {
        message: format!("Invalid stored password hash: {}", e),
    })?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AppError::Internal {
            message: format!("Password verify error: {}", e),
        }),
    }
}

/// Enforce the password policy
pub fn validate_password_strength(password: &str) -> Result<()> {
    let len = password.chars().count();
    let problem = if len < MIN_PASSWORD_LEN {
        Some("Password must be at least 8 characters long")
    } else if len > MAX_PASSWORD_LEN {
        Some("Password is too long")
    } else if !password.chars().any(|c| c.is_ascii_uppercase()) {
        Some("Password must contain at least one uppercase letter")
    } else if !password.chars().any(|c| c.is_ascii_lowercase()) {
        Some("Password must contain at least one lowercase letter")
    } else if !password.chars().any(|c| c.is_ascii_digit()) {
        Some("Password must contain at least one number")
    } else if COMMON_PASSWORDS.contains(&password.to_lowercase().as_str()) {
        Some("Password is too common")
    } else {
        None
    };

    match problem {
        Some(message) => Err(AppError::Validation {
            message: message.to_string(),
            field: Some("password".to_string()),
        }),
        None => Ok(()),
    }
}

/// Trim and lowercase an email, rejecting malformed addresses
pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    if !email.validate_email() {
        return Err(AppError::Validation {
            message: "Please enter a valid email address".to_string(),
            field: Some("email".to_string()),
        });
    }
    Ok(email)
}

/// Session token from `Authorization: Bearer` or the session cookie
pub fn session_token<'a>(headers: &'a HeaderMap, cookie_name: &str) -> Option<&'a str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value)
        .filter(|t| !t.is_empty())
}

/// `Set-Cookie` value carrying a session token
pub fn session_cookie(cookie_name: &str, token: &str, max_age_secs: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        cookie_name, token, max_age_secs
    )
}

/// `Set-Cookie` value that clears the session
pub fn clear_session_cookie(cookie_name: &str) -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", cookie_name)
}
