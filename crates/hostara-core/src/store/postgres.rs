// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL server and plan storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hostara_protocol::Page;
use sqlx::PgPool;
use uuid::Uuid;

use super::{PlanStore, ServerStore};
use crate::error::{PlanError, Result, ServerError};
use crate::plan::Plan;
use crate::server::{Server, ServerStatus};

#[derive(Debug, sqlx::FromRow)]
struct ServerRecord {
    id: Uuid,
    owner_id: Uuid,
    plan_id: Uuid,
    pool_id: Uuid,
    name: String,
    status: String,
    ipv4_address: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ServerRecord> for Server {
    type Error = ServerError;

    fn try_from(r: ServerRecord) -> Result<Self> {
        let status = ServerStatus::parse(&r.status).ok_or_else(|| {
            ServerError::Validation(format!("unknown status '{}' for server {}", r.status, r.id))
        })?;
        Ok(Server::restore(
            r.id,
            r.owner_id,
            r.plan_id,
            r.pool_id,
            r.name,
            status,
            r.ipv4_address,
            r.created_at,
        ))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PlanRecord {
    id: Uuid,
    name: String,
    cpu_cores: i32,
    ram_mb: i32,
    disk_gb: i32,
    ip_count: i32,
    created_at: DateTime<Utc>,
}

impl From<PlanRecord> for Plan {
    fn from(r: PlanRecord) -> Self {
        Plan {
            id: r.id,
            name: r.name,
            cpu_cores: r.cpu_cores,
            ram_mb: r.ram_mb,
            disk_gb: r.disk_gb,
            ip_count: r.ip_count,
            created_at: r.created_at,
        }
    }
}

/// PostgreSQL-backed server store.
#[derive(Clone)]
pub struct PostgresServerStore {
    pool: PgPool,
}

impl PostgresServerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ServerStore for PostgresServerStore {
    async fn insert(&self, server: &Server) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO servers (id, owner_id, plan_id, pool_id, name, status, ipv4_address, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(server.id)
        .bind(server.owner_id)
        .bind(server.plan_id)
        .bind(server.pool_id)
        .bind(&server.name)
        .bind(server.status().as_str())
        .bind(server.ipv4_address())
        .bind(server.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Server>> {
        let record = sqlx::query_as::<_, ServerRecord>(
            r#"
            SELECT id, owner_id, plan_id, pool_id, name, status, ipv4_address, created_at
            FROM servers
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        record.map(Server::try_from).transpose()
    }

    async fn search_by_owner(&self, owner_id: Uuid, page: Page) -> Result<(Vec<Server>, i64)> {
        let records = sqlx::query_as::<_, ServerRecord>(
            r#"
            SELECT id, owner_id, plan_id, pool_id, name, status, ipv4_address, created_at
            FROM servers
            WHERE owner_id = $1
            ORDER BY created_at DESC, id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(owner_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM servers WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await?;

        let servers = records
            .into_iter()
            .map(Server::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((servers, total))
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: ServerStatus,
        status: ServerStatus,
        ipv4_address: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE servers
            SET status = $3, ipv4_address = $4
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(status.as_str())
        .bind(ipv4_address)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM servers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// PostgreSQL-backed plan store.
#[derive(Clone)]
pub struct PostgresPlanStore {
    pool: PgPool,
}

impl PostgresPlanStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlanStore for PostgresPlanStore {
    async fn insert(&self, plan: &Plan) -> std::result::Result<(), PlanError> {
        sqlx::query(
            r#"
            INSERT INTO plans (id, name, cpu_cores, ram_mb, disk_gb, ip_count, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(plan.id)
        .bind(&plan.name)
        .bind(plan.cpu_cores)
        .bind(plan.ram_mb)
        .bind(plan.disk_gb)
        .bind(plan.ip_count)
        .bind(plan.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> std::result::Result<Option<Plan>, PlanError> {
        let record = sqlx::query_as::<_, PlanRecord>(
            r#"
            SELECT id, name, cpu_cores, ram_mb, disk_gb, ip_count, created_at
            FROM plans
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Plan::from))
    }

    async fn search(&self, page: Page) -> std::result::Result<(Vec<Plan>, i64), PlanError> {
        let records = sqlx::query_as::<_, PlanRecord>(
            r#"
            SELECT id, name, cpu_cores, ram_mb, disk_gb, ip_count, created_at
            FROM plans
            ORDER BY created_at DESC, id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM plans")
            .fetch_one(&self.pool)
            .await?;

        Ok((records.into_iter().map(Plan::from).collect(), total))
    }
}
