// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Broker settings shared by every hostara service.

use std::time::Duration;

/// Message transport configuration.
#[derive(Debug, Clone)]
pub struct MessagingConfig {
    /// Broker connection URL (`redis://...`)
    pub broker_url: String,
    /// Upper bound on a single handler invocation
    pub handler_timeout: Duration,
    /// How long an idle receive loop waits before polling again
    pub poll_interval: Duration,
    /// Consumer name within each queue's consumer group
    pub consumer_name: String,
    /// How long a delivery may stay unsettled before any consumer reclaims it.
    /// Longer than `handler_timeout`.
    pub claim_idle: Duration,
}

impl MessagingConfig {
    /// Settings for tests and embedded use, without a broker URL.
    pub fn local(consumer_name: impl Into<String>) -> Self {
        Self {
            broker_url: String::new(),
            handler_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(200),
            consumer_name: consumer_name.into(),
            claim_idle: Duration::from_secs(60),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `HOSTARA_BROKER_URL`: broker connection string
    ///
    /// Optional (with defaults):
    /// - `HOSTARA_HANDLER_TIMEOUT_MS`: per-message handler timeout (default: 10000)
    /// - `HOSTARA_BROKER_POLL_INTERVAL_MS`: idle poll interval (default: 200)
    /// - `HOSTARA_CONSUMER_NAME`: consumer name (default: `<service>-1`)
    /// - `HOSTARA_BROKER_CLAIM_IDLE_MS`: idle time after which unsettled
    ///   deliveries are reclaimed (default: 60000, must exceed the handler timeout)
    pub fn from_env(service: &str) -> Result<Self, ConfigError> {
        let broker_url = std::env::var("HOSTARA_BROKER_URL")
            .map_err(|_| ConfigError::Missing("HOSTARA_BROKER_URL"))?;

        let handler_timeout_ms: u64 = std::env::var("HOSTARA_HANDLER_TIMEOUT_MS")
            .unwrap_or_else(|_| "10000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("HOSTARA_HANDLER_TIMEOUT_MS", "must be a positive integer")
            })?;
        if handler_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "HOSTARA_HANDLER_TIMEOUT_MS",
                "must be a positive integer",
            ));
        }

        let poll_interval_ms: u64 = std::env::var("HOSTARA_BROKER_POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "200".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("HOSTARA_BROKER_POLL_INTERVAL_MS", "must be an integer")
            })?;

        let consumer_name =
            std::env::var("HOSTARA_CONSUMER_NAME").unwrap_or_else(|_| format!("{}-1", service));

        let claim_idle_ms: u64 = std::env::var("HOSTARA_BROKER_CLAIM_IDLE_MS")
            .unwrap_or_else(|_| "60000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("HOSTARA_BROKER_CLAIM_IDLE_MS", "must be an integer")
            })?;
        if claim_idle_ms <= handler_timeout_ms {
            return Err(ConfigError::Invalid(
                "HOSTARA_BROKER_CLAIM_IDLE_MS",
                "must be longer than HOSTARA_HANDLER_TIMEOUT_MS",
            ));
        }

        Ok(Self {
            broker_url,
            handler_timeout: Duration::from_millis(handler_timeout_ms),
            poll_interval: Duration::from_millis(poll_interval_ms),
            consumer_name,
            claim_idle: Duration::from_millis(claim_idle_ms),
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
