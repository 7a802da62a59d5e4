//! Remote store connection configuration.
//!
//! This module provides connection settings for the Redis-compatible remote
//! store, loaded from environment variables or constructed explicitly.

use std::env;

use crate::local_tier::LocalTierConfig;

/// A single remote store endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedisEndpoint {
    /// Host name or IP address.
    pub host: String,

    /// Port number.
    pub port: u16,

    /// Optional password for AUTH.
    pub password: Option<String>,
}

impl Default for RedisEndpoint {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 6379,
            password: None,
        }
    }
}

/// Cache manager configuration.
///
/// # Environment Variables
///
/// - `REDIS_ENABLED`: whether the cache manager should be constructed at all
///   (default: `true`)
/// - `REDIS_HOST`: store host (default: `127.0.0.1`)
/// - `REDIS_PORT`: store port (default: `6379`)
/// - `REDIS_PASSWORD`: optional password (default: none)
/// - `REDIS_DATABASE`: logical database index (default: `0`)
/// - `CACHE_TTL_SECONDS`: default TTL for cached items in seconds (default: `300`)
/// - `CACHE_PREFIX`: prefix for all cache keys (default: `redstash`)
#[derive(Clone, Debug)]
pub struct RedisConfig {
    /// Whether caching is enabled. When false the hosting layer should skip
    /// constructing the manager; construction fails explicitly otherwise.
    pub enabled: bool,

    /// Store endpoints. The first endpoint is used for the connection URL;
    /// additional endpoints are carried for deployments that resolve a
    /// primary externally.
    pub endpoints: Vec<RedisEndpoint>,

    /// Logical database index.
    pub database: u32,

    /// Default time-to-live for cached items in seconds, applied when an
    /// operation does not specify one.
    pub default_ttl_seconds: u64,

    /// Prefix for all cache keys to avoid collisions with other store users.
    pub key_prefix: String,

    /// Local in-process tier settings.
    pub local_tier: LocalTierConfig,
}

impl RedisConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let endpoint = RedisEndpoint {
            host: env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: env::var("REDIS_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(6379),
            password: env::var("REDIS_PASSWORD").ok().filter(|p| !p.is_empty()),
        };

        Self {
            enabled: env::var("REDIS_ENABLED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
            endpoints: vec![endpoint],
            database: env::var("REDIS_DATABASE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            default_ttl_seconds: env::var("CACHE_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            key_prefix: env::var("CACHE_PREFIX").unwrap_or_else(|_| "redstash".into()),
            local_tier: LocalTierConfig::from_env(),
        }
    }

    /// Render the connection URL for the first endpoint.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let config = RedisConfig::default();
    /// assert_eq!(config.redis_url(), "redis://127.0.0.1:6379/0");
    /// ```
    pub fn redis_url(&self) -> String {
        let endpoint = self.endpoints.first().cloned().unwrap_or_default();
        match &endpoint.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, endpoint.host, endpoint.port, self.database
            ),
            None => format!(
                "redis://{}:{}/{}",
                endpoint.host, endpoint.port, self.database
            ),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoints: vec![RedisEndpoint::default()],
            database: 0,
            default_ttl_seconds: 300,
            key_prefix: "redstash".into(),
            local_tier: LocalTierConfig::default(),
        }
    }
}
