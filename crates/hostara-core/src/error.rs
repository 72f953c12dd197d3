// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for hostara-core.

use hostara_messaging::MessagingError;
use thiserror::Error;
use uuid::Uuid;

use crate::server::ServerStatus;

/// Result type using ServerError
pub type Result<T> = std::result::Result<T, ServerError>;

/// Failure classification shared by every business error.
///
/// Everything except [`ErrorKind::Transient`] is permanent from the
/// message-processing point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    AccessDenied,
    Transient,
}

impl ErrorKind {
    pub fn is_permanent(self) -> bool {
        !matches!(self, Self::Transient)
    }
}

/// Errors reported by the resource allocation service.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResourcesError {
    #[error("Invalid resource request: {0}")]
    Validation(String),

    #[error("Not enough resources")]
    NotEnoughResources,

    #[error("Pool '{0}' not found")]
    PoolNotFound(Uuid),

    /// Transport failure or unexpected reply.
    #[error("Resource service unavailable: {0}")]
    Unavailable(String),
}

impl ResourcesError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotEnoughResources => ErrorKind::Conflict,
            Self::PoolNotFound(_) => ErrorKind::NotFound,
            Self::Unavailable(_) => ErrorKind::Transient,
        }
    }
}

/// Plan errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PlanError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Plan '{0}' not found")]
    NotFound(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl PlanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Database(_) => ErrorKind::Transient,
        }
    }

    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "PLAN_NOT_FOUND",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }
}

/// Server lifecycle errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServerError {
    /// Input validation failed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The plan named at creation (or recorded on the server) does not exist.
    #[error("Invalid plan '{0}'")]
    InvalidPlan(Uuid),

    #[error("Server '{0}' not found")]
    NotFound(Uuid),

    /// The caller does not own the server.
    #[error("Access denied to server '{0}'")]
    AccessDenied(Uuid),

    /// The requested transition is not allowed from the current status.
    #[error("Invalid server status {actual}, expected {expected}")]
    InvalidStatus {
        actual: ServerStatus,
        expected: &'static str,
    },

    /// Another writer changed the server's status first.
    #[error("Server '{0}' was modified concurrently")]
    ConcurrentUpdate(Uuid),

    #[error(transparent)]
    Resources(#[from] ResourcesError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<PlanError> for ServerError {
    fn from(e: PlanError) -> Self {
        match e {
            PlanError::Validation(msg) => Self::Validation(msg),
            PlanError::NotFound(id) => Self::InvalidPlan(id),
            PlanError::Database(e) => Self::Database(e),
        }
    }
}

impl ServerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::InvalidPlan(_) | Self::InvalidStatus { .. } => {
                ErrorKind::Validation
            }
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AccessDenied(_) => ErrorKind::AccessDenied,
            // A lost compare-and-set is retried against the fresh row.
            Self::ConcurrentUpdate(_) => ErrorKind::Transient,
            Self::Resources(e) => e.kind(),
            Self::Messaging(_) | Self::Database(_) => ErrorKind::Transient,
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.kind().is_permanent()
    }

    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidPlan(_) => "INVALID_PLAN",
            Self::NotFound(_) => "SERVER_NOT_FOUND",
            Self::AccessDenied(_) => "ACCESS_DENIED",
            Self::InvalidStatus { .. } => "INVALID_STATUS",
            Self::ConcurrentUpdate(_) => "CONCURRENT_UPDATE",
            Self::Resources(ResourcesError::NotEnoughResources) => "NOT_ENOUGH_RESOURCES",
            Self::Resources(ResourcesError::PoolNotFound(_)) => "POOL_NOT_FOUND",
            Self::Resources(ResourcesError::Validation(_)) => "VALIDATION_ERROR",
            Self::Resources(ResourcesError::Unavailable(_)) => "RESOURCES_UNAVAILABLE",
            Self::Messaging(_) => "MESSAGING_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let id = Uuid::new_v4();
        assert_eq!(ServerError::AccessDenied(id).kind(), ErrorKind::AccessDenied);
        assert_eq!(
            ServerError::Resources(ResourcesError::NotEnoughResources).kind(),
            ErrorKind::Conflict
        );
        assert!(ServerError::Validation("bad".into()).is_permanent());
        assert!(ServerError::NotFound(id).is_permanent());
        assert!(!ServerError::ConcurrentUpdate(id).is_permanent());
        assert!(!ServerError::Messaging(MessagingError::Closed).is_permanent());
        assert!(!ServerError::Database(sqlx::Error::PoolTimedOut).is_permanent());
        assert!(
            !ServerError::Resources(ResourcesError::Unavailable("down".into())).is_permanent()
        );
    }

    #[test]
    fn test_invalid_status_names_both_statuses() {
        let err = ServerError::InvalidStatus {
            actual: ServerStatus::Running,
            expected: "STOPPED",
        };
        assert_eq!(err.to_string(), "Invalid server status RUNNING, expected STOPPED");
        assert_eq!(err.error_code(), "INVALID_STATUS");
    }

    #[test]
    fn test_missing_plan_is_invalid_plan() {
        let id = Uuid::new_v4();
        let err: ServerError = PlanError::NotFound(id).into();
        assert!(matches!(err, ServerError::InvalidPlan(p) if p == id));
    }
}
