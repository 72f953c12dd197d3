// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

/// Resources service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// HTTP listen address
    pub addr: SocketAddr,
    /// Grace period for in-flight requests on shutdown
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `HOSTARA_RESOURCES_DATABASE_URL`: PostgreSQL connection string
    ///
    /// Optional (with defaults):
    /// - `HOSTARA_RESOURCES_ADDR`: listen address (default: 0.0.0.0:2080)
    /// - `HOSTARA_SHUTDOWN_TIMEOUT_SECS`: shutdown grace period (default: 20)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("HOSTARA_RESOURCES_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("HOSTARA_RESOURCES_DATABASE_URL"))?;

        let addr: SocketAddr = std::env::var("HOSTARA_RESOURCES_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:2080".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("HOSTARA_RESOURCES_ADDR", "must be a socket address")
            })?;

        let shutdown_timeout_secs: u64 = std::env::var("HOSTARA_SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "20".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("HOSTARA_SHUTDOWN_TIMEOUT_SECS", "must be an integer")
            })?;

        Ok(Self {
            database_url,
            addr,
            shutdown_timeout: Duration::from_secs(shutdown_timeout_secs),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn set(key: &str, value: Option<&str>) {
        // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
        unsafe {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }

    #[test]
    fn test_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        set("HOSTARA_RESOURCES_DATABASE_URL", Some("postgres://localhost/resources"));
        set("HOSTARA_RESOURCES_ADDR", None);
        set("HOSTARA_SHUTDOWN_TIMEOUT_SECS", None);

        let config = Config::from_env().unwrap();
        assert_eq!(config.addr.port(), 2080);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_invalid_addr() {
        let _lock = ENV_MUTEX.lock().unwrap();
        set("HOSTARA_RESOURCES_DATABASE_URL", Some("postgres://localhost/resources"));
        set("HOSTARA_RESOURCES_ADDR", Some("not-an-addr"));

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("HOSTARA_RESOURCES_ADDR", _)));
        set("HOSTARA_RESOURCES_ADDR", None);
    }

    #[test]
    fn test_missing_database_url() {
        let _lock = ENV_MUTEX.lock().unwrap();
        set("HOSTARA_RESOURCES_DATABASE_URL", None);

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("HOSTARA_RESOURCES_DATABASE_URL"));
    }
}
