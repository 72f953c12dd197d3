// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Consumer for `server.provision.request`.

use async_trait::async_trait;
use hostara_messaging::{Delivery, HandlerError, MessageHandler, decode};
use hostara_protocol::ProvisionServerCommand;
use hostara_protocol::events::PROVISION_REQUEST;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::simulator::Provisioning;

pub struct ProvisionRequestHandler {
    provisioning: Arc<dyn Provisioning>,
}

impl ProvisionRequestHandler {
    pub fn new(provisioning: Arc<dyn Provisioning>) -> Self {
        Self { provisioning }
    }
}

#[async_trait]
impl MessageHandler for ProvisionRequestHandler {
    async fn handle(
        &self,
        delivery: &Delivery,
        cancel: CancellationToken,
    ) -> Result<(), HandlerError> {
        if delivery.routing_key != PROVISION_REQUEST {
            return Err(HandlerError::Permanent(format!(
                "unknown routing key: {}",
                delivery.routing_key
            )));
        }
        let command: ProvisionServerCommand = decode(delivery)?;

        info!(
            server_id = %command.server_id,
            hostname = %command.hostname,
            attempt = delivery.attempt,
            "Received provisioning request"
        );

        // Cancellation and emit failures are both worth another attempt.
        self.provisioning
            .generate_ip(command.server_id, &cancel)
            .await
            .map_err(HandlerError::transient)
    }
}
