// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory pool store for tests.

use async_trait::async_trait;
use hostara_protocol::{Page, Resource};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::PoolStore;
use crate::error::{PoolError, Result};
use crate::pool::Pool;

/// Pool store keeping pools in insertion order behind one lock.
#[derive(Default)]
pub struct InMemoryPoolStore {
    pools: Mutex<Vec<Pool>>,
}

impl InMemoryPoolStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PoolStore for InMemoryPoolStore {
    async fn insert(&self, pool: &Pool) -> Result<()> {
        let mut pools = self.pools.lock().await;
        if pools.iter().any(|p| p.id == pool.id) {
            return Err(PoolError::Validation(format!("pool {} already exists", pool.id)));
        }
        pools.push(pool.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Pool>> {
        Ok(self.pools.lock().await.iter().find(|p| p.id == id).cloned())
    }

    async fn search(&self, page: Page) -> Result<(Vec<Pool>, i64)> {
        let pools = self.pools.lock().await;
        let items = pools
            .iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .cloned()
            .collect();
        Ok((items, pools.len() as i64))
    }

    async fn subtract(&self, resource: &Resource) -> Result<Option<Uuid>> {
        let mut pools = self.pools.lock().await;
        for pool in pools.iter_mut() {
            if let Some(rest) = pool.available.checked_sub(resource) {
                pool.available = rest;
                return Ok(Some(pool.id));
            }
        }
        Ok(None)
    }

    async fn append(&self, resource: &Resource, pool_id: Uuid) -> Result<Option<Pool>> {
        let mut pools = self.pools.lock().await;
        let Some(pool) = pools.iter_mut().find(|p| p.id == pool_id) else {
            return Ok(None);
        };
        pool.available = pool.available.checked_add(resource)?;
        Ok(Some(pool.clone()))
    }
}
