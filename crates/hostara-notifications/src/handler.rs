// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Consumer for `server.updated` events.

use async_trait::async_trait;
use hostara_messaging::{Delivery, HandlerError, MessageHandler, decode};
use hostara_protocol::ServerStatusChangedEvent;
use hostara_protocol::events::SERVER_UPDATED;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::notification::{Event, Notifier};

/// Forwards status changes to the server's owner.
///
/// The frame's `type` is the routing key and its `payload` is the event body
/// as published.
pub struct ServerUpdatedHandler {
    notifier: Arc<Notifier>,
}

impl ServerUpdatedHandler {
    pub fn new(notifier: Arc<Notifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl MessageHandler for ServerUpdatedHandler {
    async fn handle(
        &self,
        delivery: &Delivery,
        cancel: CancellationToken,
    ) -> Result<(), HandlerError> {
        if delivery.routing_key != SERVER_UPDATED {
            return Err(HandlerError::Permanent(format!(
                "unknown routing key: {}",
                delivery.routing_key
            )));
        }
        let changed: ServerStatusChangedEvent = decode(delivery)?;
        let event = Event {
            kind: delivery.routing_key.clone(),
            payload: decode(delivery)?,
        };

        info!(
            owner_id = %changed.owner_id,
            server_id = %changed.server_id,
            status = %changed.status,
            "Handling server update"
        );

        tokio::select! {
            _ = cancel.cancelled() => Err(HandlerError::transient("cancelled")),
            result = self.notifier.notify(changed.owner_id, &event) => {
                result.map_err(HandlerError::transient)
            }
        }
    }
}
