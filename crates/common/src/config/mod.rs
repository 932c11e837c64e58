//! Configuration management for Writify services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Redis configuration
    pub redis: RedisConfig,

    /// Session and federated login configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Payment provider configuration
    #[serde(default)]
    pub billing: BillingConfig,

    /// Text generation service configuration
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Document context limits
    #[serde(default)]
    pub context: ContextConfig,

    /// Upload and storage configuration
    #[serde(default)]
    pub documents: DocumentsConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally visible base URL, used for provider redirect links
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Create missing tables on startup
    #[serde(default = "default_enabled")]
    pub create_schema: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    /// Redis URL
    pub url: String,

    /// Key prefix for namespacing
    #[serde(default = "default_service_name")]
    pub key_prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// JWT secret for session token signing
    pub jwt_secret: Option<String>,

    /// Session lifetime in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_secs: u64,

    /// Name of the session cookie
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,

    /// Google OAuth client id; federated login is disabled without it
    pub google_client_id: Option<String>,

    /// Google token verification endpoint
    #[serde(default = "default_google_tokeninfo_url")]
    pub google_tokeninfo_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BillingConfig {
    /// Payment provider secret API key
    pub secret_key: Option<String>,

    /// Webhook signing secret
    pub webhook_secret: Option<String>,

    /// Provider API base URL
    #[serde(default = "default_billing_api_base")]
    pub api_base: String,

    /// Price id of the monthly plan
    #[serde(default = "default_monthly_price_id")]
    pub monthly_price_id: String,

    /// Price id of the annual plan
    #[serde(default = "default_annual_price_id")]
    pub annual_price_id: String,

    /// Provider request timeout in seconds
    #[serde(default = "default_billing_timeout")]
    pub timeout_secs: u64,

    /// Accepted clock skew for webhook signatures, in seconds
    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_secs: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    /// Messages API endpoint
    #[serde(default = "default_generation_endpoint")]
    pub endpoint: String,

    /// API key; an empty key selects the offline mock client
    pub api_key: Option<String>,

    /// Model to use
    #[serde(default = "default_generation_model")]
    pub model: String,

    /// Maximum output tokens
    #[serde(default = "default_generation_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_generation_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContextConfig {
    /// Upper bound on the built document context, in characters
    #[serde(default = "default_context_max_chars")]
    pub max_chars: usize,

    /// Cap applied when the context is inserted into the prompt
    #[serde(default = "default_prompt_context_chars")]
    pub prompt_max_chars: usize,

    /// Characters reserved per document for its header line
    #[serde(default = "default_header_reserve")]
    pub header_reserve: usize,

    /// Per-document ceiling once three or more documents share the budget
    #[serde(default = "default_per_document_cap")]
    pub per_document_cap: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DocumentsConfig {
    /// Local upload directory
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,

    /// Maximum upload size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Optional remote blob storage
    #[serde(default)]
    pub remote: Option<RemoteStorageConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteStorageConfig {
    /// Cloud name (account namespace)
    pub cloud_name: String,

    /// API key
    pub api_key: String,

    /// API secret used to sign uploads
    pub api_secret: String,

    /// Folder objects are uploaded into
    #[serde(default = "default_remote_folder")]
    pub folder: String,

    /// API base URL
    #[serde(default = "default_remote_api_base")]
    pub api_base: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Global requests per second on the suggestion endpoint
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Auth attempts allowed per client address within the window
    #[serde(default = "default_auth_attempts")]
    pub auth_attempts: u32,

    /// Auth rate limit window in seconds
    #[serde(default = "default_auth_window")]
    pub auth_window_secs: u64,

    /// Reverse proxies whose `X-Forwarded-For` entries are believed; empty keys on the peer
    #[serde(default)]
    pub trusted_proxies: Vec<IpAddr>,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_public_url() -> String { "http://localhost:8080".to_string() }
fn default_request_timeout() -> u64 { 60 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_jwt_expiration() -> u64 { 60 * 60 * 24 * 7 }
fn default_session_cookie() -> String { "writify_session".to_string() }
fn default_google_tokeninfo_url() -> String { "https://oauth2.googleapis.com/tokeninfo".to_string() }
fn default_billing_api_base() -> String { "https://api.stripe.com/v1".to_string() }
fn default_monthly_price_id() -> String { "price_monthly_27".to_string() }
fn default_annual_price_id() -> String { "price_annual_192".to_string() }
fn default_billing_timeout() -> u64 { 20 }
fn default_webhook_tolerance() -> i64 { 300 }
fn default_generation_endpoint() -> String { "https://api.anthropic.com/v1/messages".to_string() }
fn default_generation_model() -> String { "claude-3-haiku-20240307".to_string() }
fn default_generation_max_tokens() -> u32 { 1000 }
fn default_generation_temperature() -> f32 { 0.7 }
fn default_generation_timeout() -> u64 { 30 }
fn default_context_max_chars() -> usize { 6000 }
fn default_prompt_context_chars() -> usize { 8000 }
fn default_header_reserve() -> usize { 100 }
fn default_per_document_cap() -> usize { 2000 }
fn default_upload_dir() -> String { "uploads".to_string() }
fn default_max_upload_bytes() -> usize { 10 * 1024 * 1024 }
fn default_remote_folder() -> String { "writify_documents".to_string() }
fn default_remote_api_base() -> String { "https://api.cloudinary.com/v1_1".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "writify".to_string() }
fn default_rate_limit() -> u32 { 20 }
fn default_burst() -> u32 { 40 }
fn default_auth_attempts() -> u32 { 5 }
fn default_auth_window() -> u64 { 60 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__BILLING__WEBHOOK_SECRET=whsec_...
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Build an absolute URL from a path on this service
    pub fn public_link(&self, path: &str) -> String {
        format!("{}{}", self.server.public_url.trim_end_matches('/'), path)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_expiration_secs: default_jwt_expiration(),
            session_cookie: default_session_cookie(),
            google_client_id: None,
            google_tokeninfo_url: default_google_tokeninfo_url(),
        }
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            webhook_secret: None,
            api_base: default_billing_api_base(),
            monthly_price_id: default_monthly_price_id(),
            annual_price_id: default_annual_price_id(),
            timeout_secs: default_billing_timeout(),
            webhook_tolerance_secs: default_webhook_tolerance(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_generation_endpoint(),
            api_key: None,
            model: default_generation_model(),
            max_tokens: default_generation_max_tokens(),
            temperature: default_generation_temperature(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_chars: default_context_max_chars(),
            prompt_max_chars: default_prompt_context_chars(),
            header_reserve: default_header_reserve(),
            per_document_cap: default_per_document_cap(),
        }
    }
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            max_upload_bytes: default_max_upload_bytes(),
            remote: None,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            auth_attempts: default_auth_attempts(),
            auth_window_secs: default_auth_window(),
            trusted_proxies: Vec::new(),
            enabled: default_enabled(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                public_url: default_public_url(),
                request_timeout_secs: default_request_timeout(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/writify".to_string(),
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
                create_schema: default_enabled(),
            },
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
                key_prefix: default_service_name(),
            },
            auth: AuthConfig::default(),
            billing: BillingConfig::default(),
            generation: GenerationConfig::default(),
            context: ContextConfig::default(),
            documents: DocumentsConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.generation.model, "claude-3-haiku-20240307");
        assert_eq!(config.generation.max_tokens, 1000);
        assert_eq!(config.documents.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.rate_limit.auth_attempts, 5);
    }

    #[test]
    fn test_price_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.billing.monthly_price_id, "price_monthly_27");
        assert_eq!(config.billing.annual_price_id, "price_annual_192");
    }

    #[test]
    fn test_context_caps_are_ordered() {
        let context = ContextConfig::default();
        assert!(context.max_chars <= context.prompt_max_chars);
        assert!(context.per_document_cap * 3 <= context.max_chars);
    }

    #[test]
    fn test_public_link() {
        let mut config = AppConfig::default();
        config.server.public_url = "https://writify.app/".to_string();
        assert_eq!(config.public_link("/pricing"), "https://writify.app/pricing");
    }
}
