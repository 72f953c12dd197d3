// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for hostara-provisioning.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProvisioningError {
    /// The caller cancelled before provisioning finished.
    #[error("Provisioning cancelled for server '{0}'")]
    Cancelled(Uuid),

    /// The result event could not be emitted.
    #[error("Failed to emit provisioning result for server '{server_id}': {reason}")]
    Notify { server_id: Uuid, reason: String },
}

impl ProvisioningError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Cancelled(_) => "PROVISIONING_CANCELLED",
            Self::Notify { .. } => "NOTIFY_FAILED",
        }
    }
}
