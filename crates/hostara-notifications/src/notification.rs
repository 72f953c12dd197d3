// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! User-facing notifications and the channels that deliver them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::error::{HubError, NotificationError};
use crate::hub::Hub;

/// Frame pushed to clients: `{"type": ..., "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: serde_json::Value,
}

/// One delivery channel for notifications.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Short name used when reporting failures.
    fn name(&self) -> &'static str;

    async fn send(&self, owner: Uuid, event: &Event) -> Result<(), NotificationError>;
}

/// Fans a notification out over every configured sender.
pub struct Notifier {
    senders: Vec<Arc<dyn NotificationSender>>,
}

impl Notifier {
    pub fn new(senders: Vec<Arc<dyn NotificationSender>>) -> Self {
        Self { senders }
    }

    /// Deliver `event` to `owner` through every sender.
    ///
    /// A failing sender does not stop the others; all failures are reported
    /// together.
    pub async fn notify(&self, owner: Uuid, event: &Event) -> Result<(), NotificationError> {
        let mut failures = Vec::new();
        for sender in &self.senders {
            if let Err(e) = sender.send(owner, event).await {
                warn!(sender = sender.name(), %owner, error = %e, "Notification sender failed");
                failures.push(format!("{}: {}", sender.name(), e));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(NotificationError::Senders(failures))
        }
    }
}

/// Delivers notifications to the owner's live WebSocket connections.
#[derive(Clone)]
pub struct WsSender {
    hub: Hub,
}

impl WsSender {
    pub fn new(hub: Hub) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl NotificationSender for WsSender {
    fn name(&self) -> &'static str {
        "websocket"
    }

    #[instrument(
        name = "notification.websocket.send",
        skip(self, event),
        fields(owner_id = %owner, event_type = %event.kind)
    )]
    async fn send(&self, owner: Uuid, event: &Event) -> Result<(), NotificationError> {
        let data = serde_json::to_string(event)?;
        self.hub.send(owner, data)?;
        Ok(())
    }
}

/// Keeps every notification in memory. For tests.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(Uuid, Event)>>,
    failing: AtomicBool,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<(Uuid, Event)> {
        self.sent.lock().await.clone()
    }

    /// Make every subsequent send fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, owner: Uuid, event: &Event) -> Result<(), NotificationError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(HubError::ShuttingDown.into());
        }
        self.sent.lock().await.push((owner, event.clone()));
        Ok(())
    }
}
