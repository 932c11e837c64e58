//! Error types for Writify services
//!
//! Provides a single error enum with:
//! - Distinct variants for validation, entitlement, upstream and storage failures
//! - HTTP status code mapping
//! - Structured JSON error responses with machine-readable codes

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Where the entitlement gate sends accounts without access
pub const PRICING_PATH: &str = "/pricing";

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    ValidationError,
    MissingField,
    InvalidFormat,
    PayloadTooLarge,
    UnsupportedFileType,

    // Authentication errors
    Unauthorized,
    InvalidCredentials,
    InvalidToken,
    ExpiredToken,

    // Entitlement errors
    SubscriptionRequired,

    // Resource errors
    NotFound,
    AccountNotFound,
    DocumentNotFound,
    TextNotFound,
    SubscriptionNotFound,

    // Conflict errors
    DuplicateAccount,

    // Rate limiting
    RateLimited,

    // Database errors
    DatabaseError,
    ConnectionError,

    // External service errors
    UpstreamError,
    PaymentProviderError,
    GenerationError,
    WebhookSignatureInvalid,
    WebhookPayloadInvalid,
    CacheError,
    StorageError,

    // Internal errors
    InternalError,
    ConfigurationError,
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    #[error("Payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Unsupported file type: {extension}")]
    UnsupportedFileType { extension: String },

    // Authentication errors
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid session token")]
    InvalidToken,

    #[error("Session expired")]
    ExpiredToken,

    // Entitlement errors
    #[error("Subscription required")]
    SubscriptionRequired {
        subscription_status: String,
        trial_expired: bool,
    },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("Account not found: {id}")]
    AccountNotFound { id: String },

    #[error("Document not found: {id}")]
    DocumentNotFound { id: String },

    #[error("Text not found: {id}")]
    TextNotFound { id: String },

    #[error("No active subscription found")]
    SubscriptionNotFound,

    // Conflict errors
    #[error("An account with this email already exists")]
    DuplicateAccount,

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per {window_secs}s")]
    RateLimited { limit: u32, window_secs: u64 },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // External service errors
    #[error("Payment provider error: {message}")]
    PaymentProvider { message: String },

    #[error("Generation service error: {message}")]
    Generation { message: String },

    #[error("Invalid webhook signature")]
    WebhookSignatureInvalid,

    #[error("Invalid webhook payload: {message}")]
    WebhookPayload { message: String },

    #[error("Cache error: {message}")]
    CacheError { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::MissingField { .. } => ErrorCode::MissingField,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            AppError::UnsupportedFileType { .. } => ErrorCode::UnsupportedFileType,
            AppError::Unauthorized { .. } => ErrorCode::Unauthorized,
            AppError::InvalidCredentials => ErrorCode::InvalidCredentials,
            AppError::InvalidToken => ErrorCode::InvalidToken,
            AppError::ExpiredToken => ErrorCode::ExpiredToken,
            AppError::SubscriptionRequired { .. } => ErrorCode::SubscriptionRequired,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::AccountNotFound { .. } => ErrorCode::AccountNotFound,
            AppError::DocumentNotFound { .. } => ErrorCode::DocumentNotFound,
            AppError::TextNotFound { .. } => ErrorCode::TextNotFound,
            AppError::SubscriptionNotFound => ErrorCode::SubscriptionNotFound,
            AppError::DuplicateAccount => ErrorCode::DuplicateAccount,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::PaymentProvider { .. } => ErrorCode::PaymentProviderError,
            AppError::Generation { .. } => ErrorCode::GenerationError,
            AppError::WebhookSignatureInvalid => ErrorCode::WebhookSignatureInvalid,
            AppError::WebhookPayload { .. } => ErrorCode::WebhookPayloadInvalid,
            AppError::CacheError { .. } => ErrorCode::CacheError,
            AppError::Storage { .. } => ErrorCode::StorageError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. }
            | AppError::MissingField { .. }
            | AppError::InvalidFormat { .. }
            | AppError::UnsupportedFileType { .. }
            | AppError::WebhookSignatureInvalid
            | AppError::WebhookPayload { .. } => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            AppError::Unauthorized { .. }
            | AppError::InvalidCredentials
            | AppError::InvalidToken
            | AppError::ExpiredToken => StatusCode::UNAUTHORIZED,

            // 403 Forbidden
            AppError::SubscriptionRequired { .. } => StatusCode::FORBIDDEN,

            // 404 Not Found
            AppError::NotFound { .. }
            | AppError::AccountNotFound { .. }
            | AppError::DocumentNotFound { .. }
            | AppError::TextNotFound { .. }
            | AppError::SubscriptionNotFound => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::DuplicateAccount => StatusCode::CONFLICT,

            // 413 Payload Too Large
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Database(_)
            | AppError::DatabaseConnection { .. }
            | AppError::Storage { .. }
            | AppError::Internal { .. }
            | AppError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::PaymentProvider { .. }
            | AppError::Generation { .. }
            | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            AppError::CacheError { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Variant-specific payload attached to the JSON body
    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::SubscriptionRequired {
                subscription_status,
                trial_expired,
            } => Some(json!({
                "subscription_status": subscription_status,
                "trial_expired": trial_expired,
                "redirect_url": PRICING_PATH,
            })),
            AppError::Validation {
                field: Some(field), ..
            } => Some(json!({ "field": field })),
            _ => None,
        }
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                details: self.details(),
                request_id: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage {
            message: err.to_string(),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::CacheError {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors.field_errors().keys().next().map(|f| f.to_string());
        AppError::Validation {
            message: errors.to_string(),
            field,
        }
    }
}
