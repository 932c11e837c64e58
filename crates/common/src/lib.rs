//! Writify Common Library
//!
//! Shared code for the Writify gateway including:
//! - Database models and repository
//! - Entitlement state model and access predicates
//! - Payment event processing and provider API client
//! - Document context building and the suggestion pipeline
//! - Document text extraction and storage
//! - Error types, configuration, authentication and metrics

pub mod auth;
pub mod billing;
pub mod cache;
pub mod config;
pub mod context;
pub mod db;
pub mod documents;
pub mod entitlement;
pub mod errors;
pub mod metrics;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
