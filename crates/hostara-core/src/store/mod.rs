// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Server and plan storage.
//!
//! Server status changes go through [`ServerStore::update_status`], a
//! compare-and-set on the previous status: of two concurrent transitions
//! from the same status only one applies.

mod memory;
mod postgres;

pub use memory::{InMemoryPlanStore, InMemoryServerStore};
pub use postgres::{PostgresPlanStore, PostgresServerStore};

use async_trait::async_trait;
use hostara_protocol::Page;
use uuid::Uuid;

use crate::error::{PlanError, Result};
use crate::plan::Plan;
use crate::server::{Server, ServerStatus};

#[async_trait]
pub trait ServerStore: Send + Sync {
    async fn insert(&self, server: &Server) -> Result<()>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Server>>;

    /// A page of `owner_id`'s servers, newest first, plus their total count.
    async fn search_by_owner(&self, owner_id: Uuid, page: Page) -> Result<(Vec<Server>, i64)>;

    /// Set `status` and `ipv4_address` if the row is still in `expected`.
    ///
    /// Returns false when the row is gone or its status moved on.
    async fn update_status(
        &self,
        id: Uuid,
        expected: ServerStatus,
        status: ServerStatus,
        ipv4_address: Option<&str>,
    ) -> Result<bool>;

    /// Remove the row. Returns false when it did not exist.
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn insert(&self, plan: &Plan) -> std::result::Result<(), PlanError>;

    async fn find_by_id(&self, id: Uuid) -> std::result::Result<Option<Plan>, PlanError>;

    /// A page of plans, newest first, plus the total count.
    async fn search(&self, page: Page) -> std::result::Result<(Vec<Plan>, i64), PlanError>;
}
