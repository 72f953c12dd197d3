// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for hostara-resources.

use hostara_protocol::{ResourceError, RpcError};
use thiserror::Error;
use uuid::Uuid;

/// Result type using PoolError
pub type Result<T> = std::result::Result<T, PoolError>;

/// Allocator errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// Input validation failed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No pool has enough capacity for the request.
    #[error("Not enough resources")]
    NotEnoughResources,

    /// The referenced pool does not exist.
    #[error("Pool '{0}' not found")]
    PoolNotFound(Uuid),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<ResourceError> for PoolError {
    fn from(e: ResourceError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl PoolError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotEnoughResources => "NOT_ENOUGH_RESOURCES",
            Self::PoolNotFound(_) => "POOL_NOT_FOUND",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Convert this error to an RpcError for the allocation boundary.
    pub fn to_rpc_error(&self) -> RpcError {
        let code = match self {
            Self::Validation(_) => RpcError::INVALID_ARGUMENT,
            Self::NotEnoughResources => RpcError::FAILED_PRECONDITION,
            Self::PoolNotFound(_) => RpcError::NOT_FOUND,
            Self::Database(_) => RpcError::INTERNAL,
        };
        RpcError::new(code, self.to_string())
    }
}
