// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Issuing provisioning commands.

use async_trait::async_trait;
use hostara_messaging::{MessageManager, MessagingError};
use hostara_protocol::ProvisionServerCommand;
use hostara_protocol::events::PROVISION_REQUEST;
use hostara_protocol::topology::COMMANDS_EXCHANGE;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Ask the provisioning service to provision `server_id`.
    async fn request_provisioning(&self, server_id: Uuid, hostname: &str)
    -> Result<(), MessagingError>;
}

/// Publishes `server.provision.request` to the commands exchange.
pub struct MessagingProvisioner {
    manager: Arc<MessageManager>,
}

impl MessagingProvisioner {
    pub fn new(manager: Arc<MessageManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Provisioner for MessagingProvisioner {
    async fn request_provisioning(
        &self,
        server_id: Uuid,
        hostname: &str,
    ) -> Result<(), MessagingError> {
        self.manager
            .publish(
                COMMANDS_EXCHANGE,
                PROVISION_REQUEST,
                &ProvisionServerCommand::new(server_id, hostname),
            )
            .await
    }
}

/// Records provisioning requests instead of sending them.
#[derive(Default)]
pub struct RecordingProvisioner {
    requests: Mutex<Vec<ProvisionServerCommand>>,
    fail: Mutex<bool>,
}

impl RecordingProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn requests(&self) -> Vec<ProvisionServerCommand> {
        self.requests.lock().await.clone()
    }

    /// Make every subsequent request fail until reset.
    pub async fn set_failing(&self, fail: bool) {
        *self.fail.lock().await = fail;
    }
}

#[async_trait]
impl Provisioner for RecordingProvisioner {
    async fn request_provisioning(
        &self,
        server_id: Uuid,
        hostname: &str,
    ) -> Result<(), MessagingError> {
        if *self.fail.lock().await {
            return Err(MessagingError::Broker("broker unavailable".into()));
        }
        self.requests
            .lock()
            .await
            .push(ProvisionServerCommand::new(server_id, hostname));
        Ok(())
    }
}
