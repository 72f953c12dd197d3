// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Status-changed notifications.

use async_trait::async_trait;
use hostara_messaging::{MessageManager, MessagingError};
use hostara_protocol::ServerStatusChangedEvent;
use hostara_protocol::events::SERVER_UPDATED;
use hostara_protocol::topology::EVENTS_EXCHANGE;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::server::Server;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Announce the current status of `server` to its owner.
    async fn server_updated(&self, server: &Server) -> Result<(), MessagingError>;
}

fn status_event(server: &Server) -> ServerStatusChangedEvent {
    ServerStatusChangedEvent {
        server_id: server.id,
        owner_id: server.owner_id,
        status: server.status().as_str().to_string(),
        ipv4_address: server.ipv4_address().map(str::to_string),
    }
}

/// Publishes `server.updated` to the events exchange.
pub struct MessagingNotifier {
    manager: Arc<MessageManager>,
}

impl MessagingNotifier {
    pub fn new(manager: Arc<MessageManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Notifier for MessagingNotifier {
    async fn server_updated(&self, server: &Server) -> Result<(), MessagingError> {
        self.manager
            .publish(EVENTS_EXCHANGE, SERVER_UPDATED, &status_event(server))
            .await
    }
}

/// Records notifications for tests.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<ServerStatusChangedEvent>>,
    fail: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<ServerStatusChangedEvent> {
        self.sent.lock().await.clone()
    }

    /// Make every subsequent notification fail until reset.
    pub async fn set_failing(&self, fail: bool) {
        *self.fail.lock().await = fail;
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn server_updated(&self, server: &Server) -> Result<(), MessagingError> {
        if *self.fail.lock().await {
            return Err(MessagingError::Broker("broker unavailable".into()));
        }
        self.sent.lock().await.push(status_event(server));
        Ok(())
    }
}
