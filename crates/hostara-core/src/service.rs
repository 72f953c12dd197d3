// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Server lifecycle operations.
//!
//! [`ServerManager`] runs the provisioning saga against four capabilities:
//!
//! | Capability            | Production                  | Test double             |
//! |-----------------------|-----------------------------|-------------------------|
//! | [`ServerStore`]       | `PostgresServerStore`       | `InMemoryServerStore`   |
//! | [`ResourcesManager`]  | `HttpResourcesManager`      | `InMemoryResources`     |
//! | [`Provisioner`]       | `MessagingProvisioner`      | `RecordingProvisioner`  |
//! | [`Notifier`]          | `MessagingNotifier`         | `RecordingNotifier`     |
//!
//! [`TracedServers`] wraps any [`ServerService`] with a span and an outcome
//! log per call; [`compose`] applies the wrappers in their fixed order.

use async_trait::async_trait;
use hostara_protocol::{Page, Resource};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{Result, ServerError};
use crate::notifier::Notifier;
use crate::plan::PlanManager;
use crate::provisioner::Provisioner;
use crate::resources::ResourcesManager;
use crate::server::{Server, ServerStatus};
use crate::store::ServerStore;

#[async_trait]
pub trait ServerService: Send + Sync {
    async fn find_by_id(&self, id: Uuid, caller: Uuid) -> Result<Server>;

    /// Allocate resources for `plan_id`, persist a `PENDING` server and
    /// request its provisioning.
    async fn create(&self, name: &str, plan_id: Uuid, owner_id: Uuid) -> Result<Server>;

    /// The caller's servers, newest first.
    async fn search(&self, page: Page, caller: Uuid) -> Result<(Vec<Server>, i64)>;

    async fn start(&self, id: Uuid, caller: Uuid) -> Result<Server>;

    async fn stop(&self, id: Uuid, caller: Uuid) -> Result<Server>;

    /// Remove the server and return its resources. On failure the server is
    /// left in its previous status so the delete can be retried.
    async fn delete(&self, id: Uuid, caller: Uuid) -> Result<()>;

    /// Apply a successful provisioning result. Idempotent for the same address.
    async fn set_ip_address(&self, id: Uuid, ip: &str) -> Result<Server>;

    /// Apply a failed provisioning result. Idempotent.
    async fn set_provisioning_failed(&self, id: Uuid) -> Result<Server>;
}

/// Server business rules over the capability traits.
pub struct ServerManager {
    servers: Arc<dyn ServerStore>,
    plans: PlanManager,
    resources: Arc<dyn ResourcesManager>,
    provisioner: Arc<dyn Provisioner>,
    notifier: Arc<dyn Notifier>,
}

impl ServerManager {
    pub fn new(
        servers: Arc<dyn ServerStore>,
        plans: PlanManager,
        resources: Arc<dyn ResourcesManager>,
        provisioner: Arc<dyn Provisioner>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            servers,
            plans,
            resources,
            provisioner,
            notifier,
        }
    }

    async fn load(&self, id: Uuid) -> Result<Server> {
        self.servers
            .find_by_id(id)
            .await?
            .ok_or(ServerError::NotFound(id))
    }

    async fn load_owned(&self, id: Uuid, caller: Uuid) -> Result<Server> {
        let server = self.load(id).await?;
        server.ensure_owner(caller)?;
        Ok(server)
    }

    /// Write `server`'s status and address if the row is still in `expected`.
    async fn persist(&self, server: &Server, expected: ServerStatus) -> Result<()> {
        let applied = self
            .servers
            .update_status(server.id, expected, server.status(), server.ipv4_address())
            .await?;
        if !applied {
            return Err(ServerError::ConcurrentUpdate(server.id));
        }
        Ok(())
    }

    async fn notify(&self, server: &Server) {
        if let Err(e) = self.notifier.server_updated(server).await {
            warn!(
                server_id = %server.id,
                status = %server.status(),
                error = %e,
                "Failed to publish status change"
            );
        }
    }

    /// Put a server stuck in `DELETING` back to its status before the delete.
    async fn restore_status(&self, original: &Server) {
        let restored = self
            .servers
            .update_status(
                original.id,
                ServerStatus::Deleting,
                original.status(),
                original.ipv4_address(),
            )
            .await;
        if !matches!(restored, Ok(true)) {
            error!(server_id = %original.id, "Failed to restore status after failed delete");
        }
    }

    /// Undo a creation whose later step failed.
    async fn compensate_create(&self, server: &Server, allocated: Resource, persisted: bool) {
        if persisted {
            if let Err(e) = self.servers.delete(server.id).await {
                error!(server_id = %server.id, error = %e, "Compensation failed: server row not removed");
            }
        }
        match self
            .resources
            .return_resources(allocated, server.pool_id)
            .await
        {
            Ok(()) => info!(server_id = %server.id, pool_id = %server.pool_id, "Creation compensated"),
            Err(e) => error!(
                server_id = %server.id,
                pool_id = %server.pool_id,
                error = %e,
                "Compensation failed: resources not returned"
            ),
        }
    }
}

#[async_trait]
impl ServerService for ServerManager {
    async fn find_by_id(&self, id: Uuid, caller: Uuid) -> Result<Server> {
        self.load_owned(id, caller).await
    }

    async fn create(&self, name: &str, plan_id: Uuid, owner_id: Uuid) -> Result<Server> {
        let plan = self.plans.find_by_id(plan_id).await?;
        let mut server = Server::new(name, owner_id, plan.id, Uuid::nil())?;
        server.pool_id = self.resources.consume(plan.resource()).await?;
        let pool_id = server.pool_id;

        if let Err(e) = self.servers.insert(&server).await {
            self.compensate_create(&server, plan.resource(), false).await;
            return Err(e);
        }

        if let Err(e) = self
            .provisioner
            .request_provisioning(server.id, &server.name)
            .await
        {
            self.compensate_create(&server, plan.resource(), true).await;
            return Err(e.into());
        }

        info!(server_id = %server.id, %pool_id, "Server created, provisioning requested");
        Ok(server)
    }

    async fn search(&self, page: Page, caller: Uuid) -> Result<(Vec<Server>, i64)> {
        self.servers.search_by_owner(caller, page).await
    }

    async fn start(&self, id: Uuid, caller: Uuid) -> Result<Server> {
        let mut server = self.load_owned(id, caller).await?;
        let expected = server.status();
        server.start()?;
        self.persist(&server, expected).await?;
        self.notify(&server).await;
        Ok(server)
    }

    async fn stop(&self, id: Uuid, caller: Uuid) -> Result<Server> {
        let mut server = self.load_owned(id, caller).await?;
        let expected = server.status();
        server.stop()?;
        self.persist(&server, expected).await?;
        self.notify(&server).await;
        Ok(server)
    }

    async fn delete(&self, id: Uuid, caller: Uuid) -> Result<()> {
        let original = self.load_owned(id, caller).await?;
        let plan = self.plans.find_by_id(original.plan_id).await?;
        let mut server = original.clone();
        server.begin_delete()?;
        // Only the caller that wins this compare-and-set removes the row and
        // returns resources.
        self.persist(&server, original.status()).await?;

        match self.servers.delete(id).await {
            Ok(true) => {}
            Ok(false) => warn!(server_id = %id, "Server row already gone"),
            Err(e) => {
                self.restore_status(&original).await;
                return Err(e);
            }
        }

        if let Err(e) = self
            .resources
            .return_resources(plan.resource(), original.pool_id)
            .await
        {
            if let Err(restore) = self.servers.insert(&original).await {
                error!(
                    server_id = %id,
                    pool_id = %original.pool_id,
                    error = %restore,
                    "Failed to restore server after failed resource return"
                );
            }
            return Err(e.into());
        }

        info!(server_id = %id, pool_id = %original.pool_id, "Server deleted");
        Ok(())
    }

    async fn set_ip_address(&self, id: Uuid, ip: &str) -> Result<Server> {
        let mut server = self.load(id).await?;
        let expected = server.status();
        if !server.assign_ip(ip)? {
            debug!(server_id = %id, "Address already applied");
            return Ok(server);
        }
        self.persist(&server, expected).await?;
        self.notify(&server).await;
        Ok(server)
    }

    async fn set_provisioning_failed(&self, id: Uuid) -> Result<Server> {
        let mut server = self.load(id).await?;
        let expected = server.status();
        if !server.mark_provision_failed()? {
            debug!(server_id = %id, "Provisioning failure already applied");
            return Ok(server);
        }
        self.persist(&server, expected).await?;
        self.notify(&server).await;
        Ok(server)
    }
}

/// Tracing decorator for any [`ServerService`].
pub struct TracedServers<S> {
    inner: S,
}

impl<S> TracedServers<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

fn outcome<T>(operation: &'static str, result: &Result<T>) {
    match result {
        Ok(_) => debug!(operation, "Server operation succeeded"),
        Err(e) => warn!(
            operation,
            code = e.error_code(),
            permanent = e.is_permanent(),
            error = %e,
            "Server operation failed"
        ),
    }
}

#[async_trait]
impl<S: ServerService> ServerService for TracedServers<S> {
    #[instrument(name = "servers.find_by_id", skip(self))]
    async fn find_by_id(&self, id: Uuid, caller: Uuid) -> Result<Server> {
        let result = self.inner.find_by_id(id, caller).await;
        outcome("find_by_id", &result);
        result
    }

    #[instrument(name = "servers.create", skip(self))]
    async fn create(&self, name: &str, plan_id: Uuid, owner_id: Uuid) -> Result<Server> {
        let result = self.inner.create(name, plan_id, owner_id).await;
        outcome("create", &result);
        result
    }

    #[instrument(name = "servers.search", skip(self))]
    async fn search(&self, page: Page, caller: Uuid) -> Result<(Vec<Server>, i64)> {
        let result = self.inner.search(page, caller).await;
        outcome("search", &result);
        result
    }

    #[instrument(name = "servers.start", skip(self))]
    async fn start(&self, id: Uuid, caller: Uuid) -> Result<Server> {
        let result = self.inner.start(id, caller).await;
        outcome("start", &result);
        result
    }

    #[instrument(name = "servers.stop", skip(self))]
    async fn stop(&self, id: Uuid, caller: Uuid) -> Result<Server> {
        let result = self.inner.stop(id, caller).await;
        outcome("stop", &result);
        result
    }

    #[instrument(name = "servers.delete", skip(self))]
    async fn delete(&self, id: Uuid, caller: Uuid) -> Result<()> {
        let result = self.inner.delete(id, caller).await;
        outcome("delete", &result);
        result
    }

    #[instrument(name = "servers.set_ip_address", skip(self))]
    async fn set_ip_address(&self, id: Uuid, ip: &str) -> Result<Server> {
        let result = self.inner.set_ip_address(id, ip).await;
        outcome("set_ip_address", &result);
        result
    }

    #[instrument(name = "servers.set_provisioning_failed", skip(self))]
    async fn set_provisioning_failed(&self, id: Uuid) -> Result<Server> {
        let result = self.inner.set_provisioning_failed(id).await;
        outcome("set_provisioning_failed", &result);
        result
    }
}

/// Build the server service used by the binary and tests.
///
/// Wrap order: `ServerManager` then `TracedServers`.
pub fn compose(manager: ServerManager) -> Arc<dyn ServerService> {
    Arc::new(TracedServers::new(manager))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::RecordingNotifier;
    use crate::provisioner::RecordingProvisioner;
    use crate::resources::InMemoryResources;
    use crate::store::{InMemoryPlanStore, InMemoryServerStore};

    const CAPACITY: Resource = Resource::new(8, 8192, 100, 4);

    struct Fixture {
        service: Arc<dyn ServerService>,
        store: Arc<InMemoryServerStore>,
        resources: Arc<InMemoryResources>,
        provisioner: Arc<RecordingProvisioner>,
        notifier: Arc<RecordingNotifier>,
        plan_id: Uuid,
        owner: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryServerStore::new());
        let plans = PlanManager::new(Arc::new(InMemoryPlanStore::new()));
        let plan = plans.create("small", 2, 2048, 20, 1).await.unwrap();
        let resources = Arc::new(InMemoryResources::new(CAPACITY));
        let provisioner = Arc::new(RecordingProvisioner::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let service = compose(ServerManager::new(
            store.clone(),
            plans,
            resources.clone(),
            provisioner.clone(),
            notifier.clone(),
        ));
        Fixture {
            service,
            store,
            resources,
            provisioner,
            notifier,
            plan_id: plan.id,
            owner: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_create_consumes_and_requests_provisioning() {
        let f = fixture().await;
        let server = f.service.create("web-1", f.plan_id, f.owner).await.unwrap();

        assert_eq!(server.status(), ServerStatus::Pending);
        assert_eq!(server.pool_id, f.resources.pool_id());
        assert_eq!(f.resources.available().await, Resource::new(6, 6144, 80, 3));
        let requests = f.provisioner.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].server_id, server.id);
        assert_eq!(requests[0].hostname, "web-1");
    }

    #[tokio::test]
    async fn test_create_with_unknown_plan() {
        let f = fixture().await;
        let err = f
            .service
            .create("web-1", Uuid::new_v4(), f.owner)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidPlan(_)));
        assert_eq!(f.resources.available().await, CAPACITY);
    }

    #[tokio::test]
    async fn test_create_without_capacity_is_conflict() {
        let f = fixture().await;
        for i in 0..4 {
            f.service
                .create(&format!("s{i}"), f.plan_id, f.owner)
                .await
                .unwrap();
        }
        let err = f.service.create("s5", f.plan_id, f.owner).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Conflict);
        assert_eq!(f.store.count().await, 4);
    }

    #[tokio::test]
    async fn test_create_compensates_when_command_cannot_be_sent() {
        let f = fixture().await;
        f.provisioner.set_failing(true).await;

        let err = f.service.create("web-1", f.plan_id, f.owner).await.unwrap_err();
        assert!(!err.is_permanent());
        assert_eq!(f.resources.available().await, CAPACITY);
        assert_eq!(f.resources.returns().await, 1);
        assert_eq!(f.store.count().await, 0);
    }

    #[tokio::test]
    async fn test_set_ip_address_is_idempotent() {
        let f = fixture().await;
        let server = f.service.create("web-1", f.plan_id, f.owner).await.unwrap();

        let first = f.service.set_ip_address(server.id, "10.0.0.9").await.unwrap();
        assert_eq!(first.status(), ServerStatus::Stopped);
        let second = f.service.set_ip_address(server.id, "10.0.0.9").await.unwrap();
        assert_eq!(second, first);
        // Only the real transition is announced.
        assert_eq!(f.notifier.sent().await.len(), 1);

        let err = f
            .service
            .set_ip_address(server.id, "10.0.0.10")
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidStatus { .. }));
    }

    #[tokio::test]
    async fn test_set_provisioning_failed_then_delete_returns_resources() {
        let f = fixture().await;
        let server = f.service.create("web-1", f.plan_id, f.owner).await.unwrap();

        let failed = f.service.set_provisioning_failed(server.id).await.unwrap();
        assert_eq!(failed.status(), ServerStatus::ProvisionFailed);
        f.service.set_provisioning_failed(server.id).await.unwrap();

        f.service.delete(server.id, f.owner).await.unwrap();
        assert_eq!(f.resources.available().await, CAPACITY);
        assert!(matches!(
            f.service.find_by_id(server.id, f.owner).await,
            Err(ServerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_foreign_caller_is_denied_in_every_status() {
        let f = fixture().await;
        let stranger = Uuid::new_v4();
        let server = f.service.create("web-1", f.plan_id, f.owner).await.unwrap();

        for step in 0..3 {
            assert!(matches!(
                f.service.find_by_id(server.id, stranger).await,
                Err(ServerError::AccessDenied(_))
            ));
            assert!(matches!(
                f.service.start(server.id, stranger).await,
                Err(ServerError::AccessDenied(_))
            ));
            assert!(matches!(
                f.service.stop(server.id, stranger).await,
                Err(ServerError::AccessDenied(_))
            ));
            assert!(matches!(
                f.service.delete(server.id, stranger).await,
                Err(ServerError::AccessDenied(_))
            ));
            match step {
                0 => {
                    f.service.set_ip_address(server.id, "10.0.0.2").await.unwrap();
                }
                1 => {
                    f.service.start(server.id, f.owner).await.unwrap();
                }
                _ => {}
            }
        }
        assert_eq!(f.resources.returns().await, 0);
    }

    #[tokio::test]
    async fn test_failed_status_publish_does_not_fail_transition() {
        let f = fixture().await;
        let provisioned = f.service.create("web-1", f.plan_id, f.owner).await.unwrap();
        let failed = f.service.create("web-2", f.plan_id, f.owner).await.unwrap();

        f.notifier.set_failing(true).await;
        let server = f.service.set_ip_address(provisioned.id, "10.0.0.8").await.unwrap();
        assert_eq!(server.status(), ServerStatus::Stopped);
        let server = f.service.set_provisioning_failed(failed.id).await.unwrap();
        assert_eq!(server.status(), ServerStatus::ProvisionFailed);

        let stored = f.service.find_by_id(provisioned.id, f.owner).await.unwrap();
        assert_eq!(stored.status(), ServerStatus::Stopped);
        assert_eq!(stored.ipv4_address(), Some("10.0.0.8"));
        let stored = f.service.find_by_id(failed.id, f.owner).await.unwrap();
        assert_eq!(stored.status(), ServerStatus::ProvisionFailed);
        assert!(f.notifier.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_restores_status_when_return_fails() {
        let f = fixture().await;
        let server = f.service.create("web-1", f.plan_id, f.owner).await.unwrap();
        f.service.set_ip_address(server.id, "10.0.0.3").await.unwrap();

        f.resources.set_unavailable(true).await;
        let err = f.service.delete(server.id, f.owner).await.unwrap_err();
        assert!(!err.is_permanent());

        let current = f.service.find_by_id(server.id, f.owner).await.unwrap();
        assert_eq!(current.status(), ServerStatus::Stopped);

        assert_eq!(f.resources.returns().await, 0);

        f.resources.set_unavailable(false).await;
        f.service.delete(server.id, f.owner).await.unwrap();
        assert_eq!(f.resources.available().await, CAPACITY);
    }

    #[tokio::test]
    async fn test_delete_can_be_retried_when_row_removal_fails() {
        let f = fixture().await;
        let server = f.service.create("web-1", f.plan_id, f.owner).await.unwrap();
        f.service.set_ip_address(server.id, "10.0.0.3").await.unwrap();
        f.service.start(server.id, f.owner).await.unwrap();

        f.store.set_failing_delete(true);
        let err = f.service.delete(server.id, f.owner).await.unwrap_err();
        assert!(matches!(err, ServerError::Database(_)));
        assert!(!err.is_permanent());

        let current = f.service.find_by_id(server.id, f.owner).await.unwrap();
        assert_eq!(current.status(), ServerStatus::Running);
        assert_eq!(current.ipv4_address(), Some("10.0.0.3"));
        assert_eq!(f.resources.returns().await, 0);

        f.store.set_failing_delete(false);
        f.service.delete(server.id, f.owner).await.unwrap();
        assert_eq!(f.store.count().await, 0);
        assert_eq!(f.resources.returns().await, 1);
        assert_eq!(f.resources.available().await, CAPACITY);
    }

    #[tokio::test]
    async fn test_pending_server_cannot_be_deleted() {
        let f = fixture().await;
        let server = f.service.create("web-1", f.plan_id, f.owner).await.unwrap();
        let err = f.service.delete(server.id, f.owner).await.unwrap_err();
        assert!(matches!(
            err,
            ServerError::InvalidStatus {
                actual: ServerStatus::Pending,
                ..
            }
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_deletes_return_resources_once() {
        let f = fixture().await;
        let server = f.service.create("web-1", f.plan_id, f.owner).await.unwrap();
        f.service.set_ip_address(server.id, "10.0.0.4").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = f.service.clone();
            let (id, owner) = (server.id, f.owner);
            handles.push(tokio::spawn(async move { service.delete(id, owner).await }));
        }
        let mut deleted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                deleted += 1;
            }
        }

        assert_eq!(deleted, 1);
        assert_eq!(f.resources.returns().await, 1);
        assert_eq!(f.resources.available().await, CAPACITY);
    }

    #[tokio::test]
    async fn test_search_lists_only_callers_servers() {
        let f = fixture().await;
        f.service.create("a", f.plan_id, f.owner).await.unwrap();
        f.service.create("b", f.plan_id, f.owner).await.unwrap();
        f.service.create("c", f.plan_id, Uuid::new_v4()).await.unwrap();

        let (mine, total) = f.service.search(Page::default(), f.owner).await.unwrap();
        assert_eq!(total, 2);
        assert!(mine.iter().all(|s| s.owner_id == f.owner));
    }
}
