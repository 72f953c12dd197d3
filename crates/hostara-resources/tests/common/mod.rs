// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for hostara-resources.

#![allow(dead_code)]

use sqlx::PgPool;
use tokio::sync::{Mutex, MutexGuard};

use hostara_resources::PostgresPoolStore;

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

// Consume picks from every row in the table, so database tests must not overlap.
static DB_LOCK: Mutex<()> = Mutex::const_new(());

/// Database-backed test context. Each context starts from an empty pools table
/// and holds the database lock until dropped.
pub struct TestContext {
    pub pool: PgPool,
    pub store: PostgresPoolStore,
    _guard: MutexGuard<'static, ()>,
}

impl TestContext {
    pub async fn new() -> Option<Self> {
        let database_url = std::env::var("TEST_DATABASE_URL").ok()?;
        let guard = DB_LOCK.lock().await;
        let pool = PgPool::connect(&database_url).await.ok()?;
        hostara_resources::migrations::run_postgres(&pool).await.ok()?;
        sqlx::query("DELETE FROM pools").execute(&pool).await.ok()?;
        let store = PostgresPoolStore::new(pool.clone());
        Some(Self {
            pool,
            store,
            _guard: guard,
        })
    }
}
