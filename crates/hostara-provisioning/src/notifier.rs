// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Emission of provisioning results.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hostara_messaging::{MessageManager, MessagingError};
use hostara_protocol::events::{PROVISION_FAILED, PROVISION_SUCCEEDED};
use hostara_protocol::topology::EVENTS_EXCHANGE;
use hostara_protocol::{ServerProvisionFailedEvent, ServerProvisionedEvent};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Where provisioning results go.
#[async_trait]
pub trait ProvisioningNotifier: Send + Sync {
    async fn notify_success(
        &self,
        server_id: Uuid,
        ipv4_address: &str,
        provisioned_at: DateTime<Utc>,
    ) -> Result<(), MessagingError>;

    async fn notify_failure(
        &self,
        server_id: Uuid,
        reason: &str,
        failed_at: DateTime<Utc>,
    ) -> Result<(), MessagingError>;
}

/// Publishes results to the events exchange.
pub struct MessagingNotifier {
    manager: Arc<MessageManager>,
}

impl MessagingNotifier {
    pub fn new(manager: Arc<MessageManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl ProvisioningNotifier for MessagingNotifier {
    async fn notify_success(
        &self,
        server_id: Uuid,
        ipv4_address: &str,
        provisioned_at: DateTime<Utc>,
    ) -> Result<(), MessagingError> {
        let event = ServerProvisionedEvent {
            server_id,
            ipv4_address: ipv4_address.to_string(),
            provisioned_at,
        };
        self.manager
            .publish(EVENTS_EXCHANGE, PROVISION_SUCCEEDED, &event)
            .await
    }

    async fn notify_failure(
        &self,
        server_id: Uuid,
        reason: &str,
        failed_at: DateTime<Utc>,
    ) -> Result<(), MessagingError> {
        let event = ServerProvisionFailedEvent {
            server_id,
            reason: reason.to_string(),
            failed_at,
        };
        self.manager
            .publish(EVENTS_EXCHANGE, PROVISION_FAILED, &event)
            .await
    }
}

/// One recorded notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Succeeded { server_id: Uuid, ipv4_address: String },
    Failed { server_id: Uuid, reason: String },
}

/// In-memory notifier that records what it was asked to emit.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }

    /// Make every subsequent notification fail until reset.
    pub async fn set_failing(&self, fail: bool) {
        *self.fail.lock().await = fail;
    }

    async fn record(&self, notification: Notification) -> Result<(), MessagingError> {
        if *self.fail.lock().await {
            return Err(MessagingError::Broker("notifier unavailable".to_string()));
        }
        self.sent.lock().await.push(notification);
        Ok(())
    }
}

#[async_trait]
impl ProvisioningNotifier for RecordingNotifier {
    async fn notify_success(
        &self,
        server_id: Uuid,
        ipv4_address: &str,
        _provisioned_at: DateTime<Utc>,
    ) -> Result<(), MessagingError> {
        self.record(Notification::Succeeded {
            server_id,
            ipv4_address: ipv4_address.to_string(),
        })
        .await
    }

    async fn notify_failure(
        &self,
        server_id: Uuid,
        reason: &str,
        _failed_at: DateTime<Utc>,
    ) -> Result<(), MessagingError> {
        self.record(Notification::Failed {
            server_id,
            reason: reason.to_string(),
        })
        .await
    }
}
