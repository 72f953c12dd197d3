// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory stores for tests.

use async_trait::async_trait;
use hostara_protocol::Page;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{PlanStore, ServerStore};
use crate::error::{PlanError, Result, ServerError};
use crate::plan::Plan;
use crate::server::{Server, ServerStatus};

#[derive(Default)]
pub struct InMemoryServerStore {
    servers: Mutex<HashMap<Uuid, Server>>,
    fail_delete: AtomicBool,
}

impl InMemoryServerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.servers.lock().await.len()
    }

    /// Make every subsequent `delete` fail as if the database were down.
    pub fn set_failing_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ServerStore for InMemoryServerStore {
    async fn insert(&self, server: &Server) -> Result<()> {
        let mut servers = self.servers.lock().await;
        if servers.contains_key(&server.id) {
            return Err(ServerError::Validation(format!(
                "server {} already exists",
                server.id
            )));
        }
        servers.insert(server.id, server.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Server>> {
        Ok(self.servers.lock().await.get(&id).cloned())
    }

    async fn search_by_owner(&self, owner_id: Uuid, page: Page) -> Result<(Vec<Server>, i64)> {
        let servers = self.servers.lock().await;
        let mut owned: Vec<&Server> = servers.values().filter(|s| s.owner_id == owner_id).collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        let total = owned.len() as i64;
        let items = owned
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .cloned()
            .collect();
        Ok((items, total))
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: ServerStatus,
        status: ServerStatus,
        ipv4_address: Option<&str>,
    ) -> Result<bool> {
        let mut servers = self.servers.lock().await;
        let Some(current) = servers.get(&id) else {
            return Ok(false);
        };
        if current.status() != expected {
            return Ok(false);
        }
        let updated = Server::restore(
            current.id,
            current.owner_id,
            current.plan_id,
            current.pool_id,
            current.name.clone(),
            status,
            ipv4_address.map(str::to_string),
            current.created_at,
        );
        servers.insert(id, updated);
        Ok(true)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(ServerError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(self.servers.lock().await.remove(&id).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryPlanStore {
    plans: Mutex<Vec<Plan>>,
}

impl InMemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanStore for InMemoryPlanStore {
    async fn insert(&self, plan: &Plan) -> std::result::Result<(), PlanError> {
        let mut plans = self.plans.lock().await;
        if plans.iter().any(|p| p.id == plan.id) {
            return Err(PlanError::Validation(format!("plan {} already exists", plan.id)));
        }
        plans.push(plan.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> std::result::Result<Option<Plan>, PlanError> {
        Ok(self.plans.lock().await.iter().find(|p| p.id == id).cloned())
    }

    async fn search(&self, page: Page) -> std::result::Result<(Vec<Plan>, i64), PlanError> {
        let plans = self.plans.lock().await;
        let items = plans
            .iter()
            .rev()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .cloned()
            .collect();
        Ok((items, plans.len() as i64))
    }
}
