// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use hostara_messaging::MessagingConfig;
use std::net::SocketAddr;
use std::time::Duration;

use crate::connection::ConnectionConfig;
use crate::hub::HubConfig;

/// Notification service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub messaging: MessagingConfig,
    /// Address the WebSocket endpoint listens on
    pub addr: SocketAddr,
    /// Queue receiving `server.updated` events
    pub queue: String,
    pub hub: HubConfig,
    pub connection: ConnectionConfig,
    /// Upper bound on each shutdown phase
    pub shutdown_timeout: Duration,
}

fn var_or(key: &'static str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_u64(key: &'static str, default: &str) -> Result<u64, ConfigError> {
    var_or(key, default)
        .parse()
        .map_err(|_| ConfigError::Invalid(key, "must be an integer"))
}

fn positive_secs(key: &'static str, default: &str) -> Result<Duration, ConfigError> {
    match parse_u64(key, default)? {
        0 => Err(ConfigError::Invalid(key, "must be greater than zero")),
        secs => Ok(Duration::from_secs(secs)),
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Broker settings come from [`MessagingConfig::from_env`]. Optional (with defaults):
    /// - `HOSTARA_NOTIFICATIONS_ADDR`: listen address (default: 0.0.0.0:1080)
    /// - `HOSTARA_NOTIFICATIONS_QUEUE`: event queue (default: api_notifications_queue)
    /// - `HOSTARA_WS_PING_INTERVAL_SECS`: keep-alive ping period (default: 50),
    ///   must be shorter than the pong wait
    /// - `HOSTARA_WS_PONG_WAIT_SECS`: idle limit (default: 60)
    /// - `HOSTARA_WS_WRITE_WAIT_SECS`: frame write limit (default: 10)
    /// - `HOSTARA_WS_MAX_MESSAGE_SIZE`: largest client frame in bytes (default: 524288)
    /// - `HOSTARA_WS_BUFFER`: outbound messages buffered per connection (default: 256)
    /// - `HOSTARA_SHUTDOWN_TIMEOUT_SECS`: shutdown drain limit (default: 20)
    pub fn from_env() -> Result<Self, ConfigError> {
        let messaging = MessagingConfig::from_env("notifications")?;

        let addr: SocketAddr = var_or("HOSTARA_NOTIFICATIONS_ADDR", "0.0.0.0:1080")
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("HOSTARA_NOTIFICATIONS_ADDR", "must be a socket address")
            })?;

        let queue = var_or("HOSTARA_NOTIFICATIONS_QUEUE", "api_notifications_queue");

        let ping_interval = positive_secs("HOSTARA_WS_PING_INTERVAL_SECS", "50")?;
        let pong_wait = positive_secs("HOSTARA_WS_PONG_WAIT_SECS", "60")?;
        if ping_interval >= pong_wait {
            return Err(ConfigError::Invalid(
                "HOSTARA_WS_PING_INTERVAL_SECS",
                "must be shorter than HOSTARA_WS_PONG_WAIT_SECS",
            ));
        }
        let write_wait = positive_secs("HOSTARA_WS_WRITE_WAIT_SECS", "10")?;

        let max_message_size = parse_u64("HOSTARA_WS_MAX_MESSAGE_SIZE", "524288")? as usize;
        if max_message_size == 0 {
            return Err(ConfigError::Invalid(
                "HOSTARA_WS_MAX_MESSAGE_SIZE",
                "must be greater than zero",
            ));
        }

        let client_buffer = parse_u64("HOSTARA_WS_BUFFER", "256")? as usize;
        if client_buffer == 0 {
            return Err(ConfigError::Invalid("HOSTARA_WS_BUFFER", "must be greater than zero"));
        }

        let shutdown_timeout = Duration::from_secs(parse_u64("HOSTARA_SHUTDOWN_TIMEOUT_SECS", "20")?);

        Ok(Self {
            messaging,
            addr,
            queue,
            hub: HubConfig {
                client_buffer,
                ..HubConfig::default()
            },
            connection: ConnectionConfig {
                ping_interval,
                pong_wait,
                write_wait,
                max_message_size,
            },
            shutdown_timeout,
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
