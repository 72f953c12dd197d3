// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Plans: immutable resource bundles servers are created from.

use chrono::{DateTime, Utc};
use hostara_protocol::{Page, Resource};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::PlanError;
use crate::store::PlanStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub cpu_cores: i32,
    pub ram_mb: i32,
    pub disk_gb: i32,
    pub ip_count: i32,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    pub fn new(
        name: &str,
        cpu_cores: i32,
        ram_mb: i32,
        disk_gb: i32,
        ip_count: i32,
    ) -> Result<Self, PlanError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PlanError::Validation("name must not be empty".into()));
        }
        for (field, value) in [
            ("cpuCores", cpu_cores),
            ("ramMb", ram_mb),
            ("diskGb", disk_gb),
            ("ipCount", ip_count),
        ] {
            if value <= 0 {
                return Err(PlanError::Validation(format!("{field} must be positive")));
            }
        }
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            cpu_cores,
            ram_mb,
            disk_gb,
            ip_count,
            created_at: Utc::now(),
        })
    }

    /// The quantity allocated for one server on this plan.
    pub fn resource(&self) -> Resource {
        Resource::new(self.cpu_cores, self.ram_mb, self.disk_gb, self.ip_count)
    }
}

/// Plan operations over a [`PlanStore`].
#[derive(Clone)]
pub struct PlanManager {
    store: Arc<dyn PlanStore>,
}

impl PlanManager {
    pub fn new(store: Arc<dyn PlanStore>) -> Self {
        Self { store }
    }

    #[instrument(name = "plans.create", skip(self))]
    pub async fn create(
        &self,
        name: &str,
        cpu_cores: i32,
        ram_mb: i32,
        disk_gb: i32,
        ip_count: i32,
    ) -> Result<Plan, PlanError> {
        let plan = Plan::new(name, cpu_cores, ram_mb, disk_gb, ip_count)?;
        self.store.insert(&plan).await?;
        info!(plan_id = %plan.id, "Plan created");
        Ok(plan)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Plan, PlanError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(PlanError::NotFound(id))
    }

    pub async fn search(&self, page: Page) -> Result<(Vec<Plan>, i64), PlanError> {
        self.store.search(page).await
    }
}
