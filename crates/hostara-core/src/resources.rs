// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client side of the resource allocation service.

use async_trait::async_trait;
use hostara_protocol::{ConsumeReply, ConsumeRequest, Resource, ReturnRequest, RpcError};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::ResourcesError;

#[async_trait]
pub trait ResourcesManager: Send + Sync {
    /// Allocate `resource` from some pool and return that pool's id.
    async fn consume(&self, resource: Resource) -> Result<Uuid, ResourcesError>;

    /// Give `resource` back to `pool_id`.
    async fn return_resources(&self, resource: Resource, pool_id: Uuid)
    -> Result<(), ResourcesError>;
}

/// Calls the allocator's HTTP/JSON boundary.
#[derive(Clone)]
pub struct HttpResourcesManager {
    client: reqwest::Client,
    base_url: String,
}

impl HttpResourcesManager {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ResourcesError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ResourcesError::Unavailable(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: serde::Serialize + Sync>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, ResourcesError> {
        let url = format!("{}{}", self.base_url, path);
        self.client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ResourcesError::Unavailable(format!("request to {url} failed: {e}")))
    }
}

/// Map a non-success reply to a typed error using its `RpcError` code.
async fn rpc_failure(response: reqwest::Response, pool_id: Option<Uuid>) -> ResourcesError {
    let status = response.status();
    let Ok(rpc) = response.json::<RpcError>().await else {
        return ResourcesError::Unavailable(format!("unexpected status {status}"));
    };
    match (rpc.code.as_str(), pool_id) {
        (RpcError::INVALID_ARGUMENT, _) => ResourcesError::Validation(rpc.message),
        (RpcError::FAILED_PRECONDITION, _) => ResourcesError::NotEnoughResources,
        (RpcError::NOT_FOUND, Some(id)) => ResourcesError::PoolNotFound(id),
        _ => ResourcesError::Unavailable(format!("{}: {}", rpc.code, rpc.message)),
    }
}

#[async_trait]
impl ResourcesManager for HttpResourcesManager {
    async fn consume(&self, resource: Resource) -> Result<Uuid, ResourcesError> {
        let response = self
            .post("/v1/resources/consume", &ConsumeRequest { resource })
            .await?;
        if !response.status().is_success() {
            return Err(rpc_failure(response, None).await);
        }
        let reply: ConsumeReply = response
            .json()
            .await
            .map_err(|e| ResourcesError::Unavailable(format!("invalid consume reply: {e}")))?;
        debug!(pool_id = %reply.pool_id, "Resources consumed");
        Ok(reply.pool_id)
    }

    async fn return_resources(
        &self,
        resource: Resource,
        pool_id: Uuid,
    ) -> Result<(), ResourcesError> {
        let response = self
            .post("/v1/resources/return", &ReturnRequest { resource, pool_id })
            .await?;
        if !response.status().is_success() {
            return Err(rpc_failure(response, Some(pool_id)).await);
        }
        debug!(%pool_id, "Resources returned");
        Ok(())
    }
}

/// Single-pool allocator for tests.
pub struct InMemoryResources {
    pool_id: Uuid,
    state: Mutex<InMemoryResourcesState>,
}

struct InMemoryResourcesState {
    available: Resource,
    returns: usize,
    unavailable: bool,
}

impl InMemoryResources {
    pub fn new(available: Resource) -> Self {
        Self {
            pool_id: Uuid::new_v4(),
            state: Mutex::new(InMemoryResourcesState {
                available,
                returns: 0,
                unavailable: false,
            }),
        }
    }

    pub fn pool_id(&self) -> Uuid {
        self.pool_id
    }

    pub async fn available(&self) -> Resource {
        self.state.lock().await.available
    }

    /// Number of successful returns so far.
    pub async fn returns(&self) -> usize {
        self.state.lock().await.returns
    }

    /// Make every subsequent call fail as unavailable until reset.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }
}

#[async_trait]
impl ResourcesManager for InMemoryResources {
    async fn consume(&self, resource: Resource) -> Result<Uuid, ResourcesError> {
        let mut state = self.state.lock().await;
        if state.unavailable {
            return Err(ResourcesError::Unavailable("resources offline".into()));
        }
        resource
            .validate()
            .map_err(|e| ResourcesError::Validation(e.to_string()))?;
        state.available = state
            .available
            .checked_sub(&resource)
            .ok_or(ResourcesError::NotEnoughResources)?;
        Ok(self.pool_id)
    }

    async fn return_resources(
        &self,
        resource: Resource,
        pool_id: Uuid,
    ) -> Result<(), ResourcesError> {
        let mut state = self.state.lock().await;
        if state.unavailable {
            return Err(ResourcesError::Unavailable("resources offline".into()));
        }
        if pool_id != self.pool_id {
            return Err(ResourcesError::PoolNotFound(pool_id));
        }
        state.available = state
            .available
            .checked_add(&resource)
            .map_err(|e| ResourcesError::Validation(e.to_string()))?;
        state.returns += 1;
        Ok(())
    }
}
