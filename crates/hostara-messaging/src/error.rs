// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for hostara-messaging.

use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MessagingError {
    /// Redis command failed.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Message could not be encoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Publish or bind against an exchange that was never declared.
    #[error("Exchange '{0}' is not declared")]
    UnknownExchange(String),

    /// Exchange was declared twice with different kinds.
    #[error("Exchange '{name}' already declared as {existing}")]
    ExchangeMismatch {
        name: String,
        existing: &'static str,
    },

    /// A stored message is missing required fields.
    #[error("Malformed stored message {tag} on '{queue}'")]
    MalformedMessage { queue: String, tag: String },

    /// Broker connection has been closed.
    #[error("Broker is closed")]
    Closed,

    /// In-flight consumers did not finish before the shutdown deadline.
    #[error("Timed out waiting for consumers to drain")]
    ShutdownTimeout,

    /// Broker-specific failure.
    #[error("Broker error: {0}")]
    Broker(String),
}

impl MessagingError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Redis(_) => "BROKER_UNAVAILABLE",
            Self::Json(_) => "ENCODING_FAILED",
            Self::UnknownExchange(_) => "UNKNOWN_EXCHANGE",
            Self::ExchangeMismatch { .. } => "EXCHANGE_MISMATCH",
            Self::MalformedMessage { .. } => "MALFORMED_MESSAGE",
            Self::Closed => "BROKER_CLOSED",
            Self::ShutdownTimeout => "SHUTDOWN_TIMEOUT",
            Self::Broker(_) => "BROKER_ERROR",
        }
    }
}
