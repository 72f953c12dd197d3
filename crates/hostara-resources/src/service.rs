// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pool operations.
//!
//! [`PoolManager`] holds the business rules; [`TracedPools`] wraps any
//! [`PoolService`] with a span and an outcome log per call. [`compose`]
//! applies the wrappers in their fixed order.

use async_trait::async_trait;
use hostara_protocol::{Page, Resource};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{PoolError, Result};
use crate::pool::{Pool, validate_delta};
use crate::store::PoolStore;

#[async_trait]
pub trait PoolService: Send + Sync {
    async fn create_pool(&self, name: &str, available: Resource) -> Result<Pool>;

    async fn find_by_id(&self, id: Uuid) -> Result<Pool>;

    async fn search(&self, page: Page) -> Result<(Vec<Pool>, i64)>;

    /// Take `resource` from a pool that can cover it and return that pool's id.
    async fn consume(&self, resource: Resource) -> Result<Uuid>;

    /// Give `resource` back to `pool_id`.
    async fn return_resources(&self, resource: Resource, pool_id: Uuid) -> Result<()>;

    /// Admin top-up of `pool_id`; returns the updated pool.
    async fn add_resources(&self, resource: Resource, pool_id: Uuid) -> Result<Pool>;
}

/// Pool business rules over a [`PoolStore`].
pub struct PoolManager {
    store: Arc<dyn PoolStore>,
}

impl PoolManager {
    pub fn new(store: Arc<dyn PoolStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PoolService for PoolManager {
    async fn create_pool(&self, name: &str, available: Resource) -> Result<Pool> {
        let pool = Pool::new(name, available)?;
        self.store.insert(&pool).await?;
        Ok(pool)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Pool> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(PoolError::PoolNotFound(id))
    }

    async fn search(&self, page: Page) -> Result<(Vec<Pool>, i64)> {
        self.store.search(page).await
    }

    async fn consume(&self, resource: Resource) -> Result<Uuid> {
        validate_delta(&resource)?;
        self.store
            .subtract(&resource)
            .await?
            .ok_or(PoolError::NotEnoughResources)
    }

    async fn return_resources(&self, resource: Resource, pool_id: Uuid) -> Result<()> {
        self.add_resources(resource, pool_id).await.map(|_| ())
    }

    async fn add_resources(&self, resource: Resource, pool_id: Uuid) -> Result<Pool> {
        validate_delta(&resource)?;
        self.store
            .append(&resource, pool_id)
            .await?
            .ok_or(PoolError::PoolNotFound(pool_id))
    }
}

/// Tracing decorator for any [`PoolService`].
pub struct TracedPools<S> {
    inner: S,
}

impl<S> TracedPools<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

fn outcome<T>(operation: &'static str, result: &Result<T>) {
    match result {
        Ok(_) => debug!(operation, "Pool operation succeeded"),
        Err(e) => warn!(operation, code = e.error_code(), error = %e, "Pool operation failed"),
    }
}

#[async_trait]
impl<S: PoolService> PoolService for TracedPools<S> {
    #[instrument(name = "pools.create", skip(self))]
    async fn create_pool(&self, name: &str, available: Resource) -> Result<Pool> {
        let result = self.inner.create_pool(name, available).await;
        outcome("create_pool", &result);
        result
    }

    #[instrument(name = "pools.find_by_id", skip(self))]
    async fn find_by_id(&self, id: Uuid) -> Result<Pool> {
        let result = self.inner.find_by_id(id).await;
        outcome("find_by_id", &result);
        result
    }

    #[instrument(name = "pools.search", skip(self))]
    async fn search(&self, page: Page) -> Result<(Vec<Pool>, i64)> {
        let result = self.inner.search(page).await;
        outcome("search", &result);
        result
    }

    #[instrument(name = "pools.consume", skip(self))]
    async fn consume(&self, resource: Resource) -> Result<Uuid> {
        let result = self.inner.consume(resource).await;
        if let Ok(pool_id) = &result {
            debug!(%pool_id, "Resources consumed");
        }
        outcome("consume", &result);
        result
    }

    #[instrument(name = "pools.return", skip(self))]
    async fn return_resources(&self, resource: Resource, pool_id: Uuid) -> Result<()> {
        let result = self.inner.return_resources(resource, pool_id).await;
        outcome("return_resources", &result);
        result
    }

    #[instrument(name = "pools.add_resources", skip(self))]
    async fn add_resources(&self, resource: Resource, pool_id: Uuid) -> Result<Pool> {
        let result = self.inner.add_resources(resource, pool_id).await;
        outcome("add_resources", &result);
        result
    }
}

/// Build the pool service used by the binary and tests.
///
/// Wrap order: `PoolManager` then `TracedPools`.
pub fn compose(store: Arc<dyn PoolStore>) -> Arc<dyn PoolService> {
    let service = PoolManager::new(store);
    let service = TracedPools::new(service);
    Arc::new(service)
}
