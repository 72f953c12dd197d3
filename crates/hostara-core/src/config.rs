// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use hostara_messaging::MessagingConfig;
use std::net::SocketAddr;
use std::time::Duration;

/// Core service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub messaging: MessagingConfig,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// HTTP listen address
    pub addr: SocketAddr,
    /// Base URL of the resource allocation service
    pub resources_url: String,
    /// Per-request timeout for the resource allocation service
    pub resources_timeout: Duration,
    /// Queue receiving provisioning results
    pub queue: String,
    /// Upper bound on draining consumers and requests at shutdown
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Broker settings come from [`MessagingConfig::from_env`].
    ///
    /// Required:
    /// - `HOSTARA_DATABASE_URL`: PostgreSQL connection string
    ///
    /// Optional (with defaults):
    /// - `HOSTARA_API_ADDR`: listen address (default: 0.0.0.0:8080)
    /// - `HOSTARA_RESOURCES_URL`: allocator base URL (default: http://127.0.0.1:2080)
    /// - `HOSTARA_RESOURCES_TIMEOUT_MS`: allocator request timeout (default: 5000)
    /// - `HOSTARA_QUEUE`: provisioning result queue (default: api_events_queue)
    /// - `HOSTARA_SHUTDOWN_TIMEOUT_SECS`: shutdown drain limit (default: 20)
    pub fn from_env() -> Result<Self, ConfigError> {
        let messaging = MessagingConfig::from_env("core")?;

        let database_url = std::env::var("HOSTARA_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("HOSTARA_DATABASE_URL"))?;

        let addr: SocketAddr = std::env::var("HOSTARA_API_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("HOSTARA_API_ADDR", "must be a socket address"))?;

        let resources_url = std::env::var("HOSTARA_RESOURCES_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:2080".to_string());
        if !resources_url.starts_with("http://") && !resources_url.starts_with("https://") {
            return Err(ConfigError::Invalid(
                "HOSTARA_RESOURCES_URL",
                "must be an http(s) URL",
            ));
        }

        let resources_timeout_ms: u64 = std::env::var("HOSTARA_RESOURCES_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("HOSTARA_RESOURCES_TIMEOUT_MS", "must be an integer")
            })?;

        let queue =
            std::env::var("HOSTARA_QUEUE").unwrap_or_else(|_| "api_events_queue".to_string());

        let shutdown_timeout_secs: u64 = std::env::var("HOSTARA_SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "20".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("HOSTARA_SHUTDOWN_TIMEOUT_SECS", "must be an integer")
            })?;

        Ok(Self {
            messaging,
            database_url,
            addr,
            resources_url,
            resources_timeout: Duration::from_millis(resources_timeout_ms),
            queue,
            shutdown_timeout: Duration::from_secs(shutdown_timeout_secs),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Messaging(#[from] hostara_messaging::ConfigError),

    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
