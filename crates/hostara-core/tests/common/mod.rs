// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for hostara-core.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hostara_core::{PostgresPlanStore, PostgresServerStore, ResourcesError, ResourcesManager};
use hostara_protocol::Resource;
use hostara_resources::{PoolError, PoolService};
use sqlx::PgPool;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Helper macro to skip tests if TEST_DATABASE_URL is not set.
#[macro_export]
macro_rules! skip_if_no_db {
    () => {
        if std::env::var("TEST_DATABASE_URL").is_err() {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        }
    };
}

static DB_LOCK: Mutex<()> = Mutex::const_new(());

/// Database-backed test context with empty plan and server tables.
pub struct TestContext {
    pub pool: PgPool,
    pub servers: PostgresServerStore,
    pub plans: PostgresPlanStore,
    _guard: MutexGuard<'static, ()>,
}

impl TestContext {
    pub async fn new() -> Option<Self> {
        let database_url = std::env::var("TEST_DATABASE_URL").ok()?;
        let guard = DB_LOCK.lock().await;
        let pool = PgPool::connect(&database_url).await.ok()?;
        hostara_core::migrations::run_postgres(&pool).await.ok()?;
        sqlx::query("DELETE FROM servers").execute(&pool).await.ok()?;
        sqlx::query("DELETE FROM plans").execute(&pool).await.ok()?;
        Some(Self {
            servers: PostgresServerStore::new(pool.clone()),
            plans: PostgresPlanStore::new(pool.clone()),
            pool,
            _guard: guard,
        })
    }
}

/// Runs the real allocator in-process behind the client capability.
pub struct LocalResources(pub Arc<dyn PoolService>);

fn map_pool_error(e: PoolError) -> ResourcesError {
    match e {
        PoolError::Validation(msg) => ResourcesError::Validation(msg),
        PoolError::NotEnoughResources => ResourcesError::NotEnoughResources,
        PoolError::PoolNotFound(id) => ResourcesError::PoolNotFound(id),
        other => ResourcesError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl ResourcesManager for LocalResources {
    async fn consume(&self, resource: Resource) -> Result<Uuid, ResourcesError> {
        self.0.consume(resource).await.map_err(map_pool_error)
    }

    async fn return_resources(
        &self,
        resource: Resource,
        pool_id: Uuid,
    ) -> Result<(), ResourcesError> {
        self.0
            .return_resources(resource, pool_id)
            .await
            .map_err(map_pool_error)
    }
}

/// Poll `check` until it returns true or `limit` elapses.
pub async fn eventually<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check().await
}
