//! Redis counter store
//!
//! Provides:
//! - Connection management
//! - Fixed-window counters (`INCR`, `EXPIRE` on first hit) for rate limiting

use crate::config::RedisConfig;
use crate::errors::{AppError, Result};
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use tokio::sync::RwLock;
use tracing::debug;

/// Redis client with namespaced keys
pub struct Cache {
    connection: RwLock<MultiplexedConnection>,
    key_prefix: String,
}

impl Cache {
    /// Connect to Redis
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str()).map_err(|e| AppError::CacheError {
            message: format!("Failed to create Redis client: {}", e),
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to connect to Redis: {}", e),
            })?;

        Ok(Self {
            connection: RwLock::new(connection),
            key_prefix: config.key_prefix.clone(),
        })
    }

    /// Build a prefixed key
    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }

    /// Count a hit in the window starting at the first hit; returns the new count
    pub async fn incr_with_window(&self, key: &str, window_secs: u64) -> Result<u64> {
        let full_key = self.key(key);
        let mut conn = self.connection.write().await;

        let count: u64 = conn.incr(&full_key, 1u64).await.map_err(|e| AppError::CacheError {
            message: format!("Failed to increment '{}': {}", full_key, e),
        })?;

        if count == 1 {
            let _: bool = conn
                .expire(&full_key, window_secs as i64)
                .await
                .map_err(|e| AppError::CacheError {
                    message: format!("Failed to set expiry on '{}': {}", full_key, e),
                })?;
        }

        debug!(key = %full_key, count, "Counter incremented");
        Ok(count)
    }

    /// Ping Redis to check connectivity
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.write().await;
        redis::cmd("PING")
            .query_async::<String>(&mut *conn)
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Redis ping failed: {}", e),
            })?;
        Ok(())
    }
}

/// Cache key builder helpers
pub mod keys {
    /// Auth attempts from one client address on one endpoint
    pub fn auth_attempts(endpoint: &str, client_addr: &str) -> String {
        format!("ratelimit:auth:{}:{}", endpoint, client_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_builders() {
        assert_eq!(
            keys::auth_attempts("login", "10.0.0.1"),
            "ratelimit:auth:login:10.0.0.1"
        );
    }

    #[tokio::test]
    async fn test_unreachable_redis_is_cache_error() {
        let config = RedisConfig {
            url: "redis://127.0.0.1:1".to_string(),
            key_prefix: "writify".to_string(),
        };
        match Cache::new(&config).await {
            Err(AppError::CacheError { .. }) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("connected to a closed port"),
        }
    }
}
