// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Consumer for provisioning results (`server.provision.*`).

use async_trait::async_trait;
use hostara_messaging::{Delivery, HandlerError, MessageHandler, decode};
use hostara_protocol::events::{PROVISION_FAILED, PROVISION_SUCCEEDED};
use hostara_protocol::{ServerProvisionFailedEvent, ServerProvisionedEvent};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::ServerError;
use crate::service::ServerService;

/// Applies provisioning results to the server state machine.
///
/// Redelivered results are no-ops: both transitions are idempotent.
pub struct ProvisionResultHandler {
    servers: Arc<dyn ServerService>,
}

impl ProvisionResultHandler {
    pub fn new(servers: Arc<dyn ServerService>) -> Self {
        Self { servers }
    }
}

fn classify(e: ServerError) -> HandlerError {
    if e.is_permanent() {
        HandlerError::permanent(e)
    } else {
        HandlerError::transient(e)
    }
}

#[async_trait]
impl MessageHandler for ProvisionResultHandler {
    async fn handle(
        &self,
        delivery: &Delivery,
        cancel: CancellationToken,
    ) -> Result<(), HandlerError> {
        let applied = match delivery.routing_key.as_str() {
            PROVISION_SUCCEEDED => {
                let event: ServerProvisionedEvent = decode(delivery)?;
                info!(server_id = %event.server_id, ip = %event.ipv4_address, "Provisioning succeeded");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(HandlerError::transient("cancelled")),
                    result = self.servers.set_ip_address(event.server_id, &event.ipv4_address) => result,
                }
            }
            PROVISION_FAILED => {
                let event: ServerProvisionFailedEvent = decode(delivery)?;
                info!(server_id = %event.server_id, reason = %event.reason, "Provisioning failed");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(HandlerError::transient("cancelled")),
                    result = self.servers.set_provisioning_failed(event.server_id) => result,
                }
            }
            other => {
                return Err(HandlerError::Permanent(format!(
                    "unknown routing key: {other}"
                )));
            }
        };
        applied.map(|_| ()).map_err(classify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::RecordingNotifier;
    use crate::plan::PlanManager;
    use crate::provisioner::RecordingProvisioner;
    use crate::resources::InMemoryResources;
    use crate::server::ServerStatus;
    use crate::service::{ServerManager, compose};
    use crate::store::{InMemoryPlanStore, InMemoryServerStore};
    use chrono::Utc;
    use hostara_protocol::Resource;
    use uuid::Uuid;

    async fn setup() -> (Arc<dyn ServerService>, Uuid, Uuid) {
        let plans = PlanManager::new(Arc::new(InMemoryPlanStore::new()));
        let plan = plans.create("small", 1, 512, 10, 1).await.unwrap();
        let service = compose(ServerManager::new(
            Arc::new(InMemoryServerStore::new()),
            plans,
            Arc::new(InMemoryResources::new(Resource::new(4, 4096, 100, 4))),
            Arc::new(RecordingProvisioner::new()),
            Arc::new(RecordingNotifier::new()),
        ));
        let owner = Uuid::new_v4();
        let server = service.create("web", plan.id, owner).await.unwrap();
        (service, server.id, owner)
    }

    fn delivery<T: serde::Serialize>(routing_key: &str, event: &T) -> Delivery {
        Delivery {
            queue: "api_events_queue".into(),
            routing_key: routing_key.into(),
            body: serde_json::to_vec(event).unwrap(),
            tag: "1".into(),
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn test_success_event_applies_address_and_is_idempotent() {
        let (service, server_id, owner) = setup().await;
        let handler = ProvisionResultHandler::new(service.clone());
        let event = ServerProvisionedEvent {
            server_id,
            ipv4_address: "10.0.0.42".into(),
            provisioned_at: Utc::now(),
        };
        let msg = delivery(PROVISION_SUCCEEDED, &event);

        handler.handle(&msg, CancellationToken::new()).await.unwrap();
        handler.handle(&msg, CancellationToken::new()).await.unwrap();

        let server = service.find_by_id(server_id, owner).await.unwrap();
        assert_eq!(server.status(), ServerStatus::Stopped);
        assert_eq!(server.ipv4_address(), Some("10.0.0.42"));
    }

    #[tokio::test]
    async fn test_failure_event_marks_server() {
        let (service, server_id, owner) = setup().await;
        let handler = ProvisionResultHandler::new(service.clone());
        let event = ServerProvisionFailedEvent {
            server_id,
            reason: "IP generation failed".into(),
            failed_at: Utc::now(),
        };

        handler
            .handle(&delivery(PROVISION_FAILED, &event), CancellationToken::new())
            .await
            .unwrap();
        let server = service.find_by_id(server_id, owner).await.unwrap();
        assert_eq!(server.status(), ServerStatus::ProvisionFailed);
    }

    #[tokio::test]
    async fn test_permanent_failures() {
        let (service, server_id, _) = setup().await;
        let handler = ProvisionResultHandler::new(service);

        // Unknown server.
        let event = ServerProvisionedEvent {
            server_id: Uuid::new_v4(),
            ipv4_address: "10.0.0.1".into(),
            provisioned_at: Utc::now(),
        };
        let err = handler
            .handle(&delivery(PROVISION_SUCCEEDED, &event), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_permanent());

        // Malformed address.
        let event = ServerProvisionedEvent {
            server_id,
            ipv4_address: "not-an-ip".into(),
            provisioned_at: Utc::now(),
        };
        let err = handler
            .handle(&delivery(PROVISION_SUCCEEDED, &event), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_permanent());

        // Unexpected routing key.
        let err = handler
            .handle(&delivery("server.provision.unknown", &event), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_permanent());
    }
}
