// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use hostara_messaging::MessagingConfig;
use std::time::Duration;

/// Provisioning worker configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub messaging: MessagingConfig,
    /// Queue receiving provisioning commands
    pub queue: String,
    /// Simulated provisioning latency
    pub delay: Duration,
    /// Probability that a simulated provisioning fails
    pub failure_rate: f64,
    /// Upper bound on draining consumers at shutdown
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Broker settings come from [`MessagingConfig::from_env`]. Optional (with defaults):
    /// - `HOSTARA_PROVISIONING_QUEUE`: command queue (default: provisioning_queue)
    /// - `HOSTARA_PROVISIONING_DELAY_MS`: simulated latency (default: 5000),
    ///   must be shorter than the handler timeout
    /// - `HOSTARA_PROVISIONING_FAILURE_RATE`: failure probability 0..=1 (default: 0.2)
    /// - `HOSTARA_SHUTDOWN_TIMEOUT_SECS`: shutdown drain limit (default: 20)
    pub fn from_env() -> Result<Self, ConfigError> {
        let messaging = MessagingConfig::from_env("provisioning")?;

        let queue = std::env::var("HOSTARA_PROVISIONING_QUEUE")
            .unwrap_or_else(|_| "provisioning_queue".to_string());

        let delay_ms: u64 = std::env::var("HOSTARA_PROVISIONING_DELAY_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("HOSTARA_PROVISIONING_DELAY_MS", "must be an integer")
            })?;
        let delay = Duration::from_millis(delay_ms);
        if delay >= messaging.handler_timeout {
            return Err(ConfigError::Invalid(
                "HOSTARA_PROVISIONING_DELAY_MS",
                "must be shorter than HOSTARA_HANDLER_TIMEOUT_MS",
            ));
        }

        let failure_rate: f64 = std::env::var("HOSTARA_PROVISIONING_FAILURE_RATE")
            .unwrap_or_else(|_| "0.2".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("HOSTARA_PROVISIONING_FAILURE_RATE", "must be a number")
            })?;
        if !(0.0..=1.0).contains(&failure_rate) {
            return Err(ConfigError::Invalid(
                "HOSTARA_PROVISIONING_FAILURE_RATE",
                "must be between 0 and 1",
            ));
        }

        let shutdown_timeout_secs: u64 = std::env::var("HOSTARA_SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "20".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("HOSTARA_SHUTDOWN_TIMEOUT_SECS", "must be an integer")
            })?;

        Ok(Self {
            messaging,
            queue,
            delay,
            failure_rate,
            shutdown_timeout: Duration::from_secs(shutdown_timeout_secs),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Messaging(#[from] hostara_messaging::ConfigError),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
