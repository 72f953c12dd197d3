// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for hostara-notifications.

use thiserror::Error;

/// Hub errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum HubError {
    /// The hub's command queue is full; the send was not accepted.
    #[error("Hub send queue is full")]
    Full,

    /// The hub has been stopped.
    #[error("Hub is shutting down")]
    ShuttingDown,

    /// Connections did not finish before the shutdown deadline.
    #[error("Timed out waiting for connections to close")]
    ShutdownTimeout,
}

impl HubError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Full => "HUB_FULL",
            Self::ShuttingDown => "HUB_SHUTTING_DOWN",
            Self::ShutdownTimeout => "SHUTDOWN_TIMEOUT",
        }
    }
}

/// Notification delivery errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NotificationError {
    /// Event could not be encoded for the wire.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Hub(#[from] HubError),

    /// One or more senders failed. Each entry is `"<sender>: <error>"`.
    #[error("Notification completed with errors: {}", .0.join("; "))]
    Senders(Vec<String>),
}

impl NotificationError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Json(_) => "ENCODING_FAILED",
            Self::Hub(e) => e.error_code(),
            Self::Senders(_) => "SENDERS_FAILED",
        }
    }
}
