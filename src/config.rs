//! Centralized configuration.
//!
//! Loaded from environment variables (with `.env` support) and validated
//! at startup.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ConfigError;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Socket address the auth server binds to.
    pub bind: SocketAddr,
    /// Redis connection URL.
    pub redis_url: String,
    /// Maximum number of cached credentials.
    pub cache_capacity: usize,
    /// Maximum lifetime of a cached credential before it is re-read.
    pub cache_ttl: Duration,
    /// Interval between stats flushes to storage.
    pub stats_interval: Duration,
    /// Per-request handling timeout.
    pub request_timeout: Duration,
    /// Graceful shutdown timeout.
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but unparsable, or a
    /// value fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let bind: SocketAddr = env::var("BIND")
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string())
            .parse()
            .map_err(|e| ConfigError(format!("Invalid BIND: {e}")))?;

        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

        let cache_capacity = parse_env("CACHE_CAPACITY", 1024)?;
        if cache_capacity == 0 {
            return Err(ConfigError("CACHE_CAPACITY must be positive".to_string()));
        }

        let cache_ttl = Duration::from_secs(parse_env("CACHE_TTL", 15)?);
        if cache_ttl.is_zero() {
            return Err(ConfigError("CACHE_TTL must be positive".to_string()));
        }

        let stats_interval = Duration::from_secs(parse_env("STATS_INTERVAL", 5)?);
        if stats_interval.is_zero() {
            return Err(ConfigError("STATS_INTERVAL must be positive".to_string()));
        }

        let request_timeout = Duration::from_secs(parse_env("REQUEST_TIMEOUT", 10)?);
        let shutdown_timeout = Duration::from_secs(parse_env("SHUTDOWN_TIMEOUT", 5)?);

        Ok(Self {
            bind,
            redis_url,
            cache_capacity,
            cache_ttl,
            stats_interval,
            request_timeout,
            shutdown_timeout,
        })
    }
}

/// Parse environment variable with default value.
fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val
            .parse()
            .map_err(|e| ConfigError(format!("Invalid {name}: {e}"))),
        Err(_) => Ok(default),
    }
}
