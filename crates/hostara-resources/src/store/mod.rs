// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pool storage.
//!
//! `subtract` and `append` are the only capacity mutations. Each must be a
//! single atomic store operation: implementations never read a pool, change
//! it in memory and write it back.

mod memory;
mod postgres;

pub use memory::InMemoryPoolStore;
pub use postgres::PostgresPoolStore;

use async_trait::async_trait;
use hostara_protocol::{Page, Resource};
use uuid::Uuid;

use crate::error::Result;
use crate::pool::Pool;

#[async_trait]
pub trait PoolStore: Send + Sync {
    async fn insert(&self, pool: &Pool) -> Result<()>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Pool>>;

    /// A page of pools, oldest first, plus the total count.
    async fn search(&self, page: Page) -> Result<(Vec<Pool>, i64)>;

    /// Take `resource` from the oldest pool that covers it.
    ///
    /// Returns the pool id, or `None` when no pool has enough capacity
    /// (nothing is modified in that case).
    async fn subtract(&self, resource: &Resource) -> Result<Option<Uuid>>;

    /// Add `resource` to `pool_id`, returning the updated pool or `None`
    /// when it does not exist.
    async fn append(&self, resource: &Resource, pool_id: Uuid) -> Result<Option<Pool>>;
}
