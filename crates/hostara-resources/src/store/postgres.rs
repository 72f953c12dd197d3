// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL pool storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hostara_protocol::{Page, Resource};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::PoolStore;
use crate::error::Result;
use crate::pool::Pool;

/// How many times `subtract` retries when it lost a race for a pool that
/// still appears to fit.
const SUBTRACT_ATTEMPTS: usize = 3;

#[derive(Debug, sqlx::FromRow)]
struct PoolRecord {
    id: Uuid,
    name: String,
    cpu_cores: i32,
    ram_mb: i32,
    disk_gb: i32,
    ip_count: i32,
    created_at: DateTime<Utc>,
}

impl From<PoolRecord> for Pool {
    fn from(r: PoolRecord) -> Self {
        Pool {
            id: r.id,
            name: r.name,
            available: Resource::new(r.cpu_cores, r.ram_mb, r.disk_gb, r.ip_count),
            created_at: r.created_at,
        }
    }
}

/// PostgreSQL-backed pool store.
#[derive(Clone)]
pub struct PostgresPoolStore {
    pool: PgPool,
}

impl PostgresPoolStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn try_subtract(pool: &PgPool, r: &Resource) -> Result<Option<Uuid>> {
    // The inner SELECT locks the chosen row; the outer WHERE re-checks the
    // capacity against the row as committed by any concurrent writer.
    let id: Option<Uuid> = sqlx::query_scalar(
        r#"
        UPDATE pools
        SET cpu_cores = cpu_cores - $1,
            ram_mb = ram_mb - $2,
            disk_gb = disk_gb - $3,
            ip_count = ip_count - $4
        WHERE id = (
            SELECT id FROM pools
            WHERE cpu_cores >= $1 AND ram_mb >= $2 AND disk_gb >= $3 AND ip_count >= $4
            ORDER BY created_at, id
            LIMIT 1
            FOR UPDATE
        )
        AND cpu_cores >= $1 AND ram_mb >= $2 AND disk_gb >= $3 AND ip_count >= $4
        RETURNING id
        "#,
    )
    .bind(r.cpu_cores)
    .bind(r.ram_mb)
    .bind(r.disk_gb)
    .bind(r.ip_count)
    .fetch_optional(pool)
    .await?;

    Ok(id)
}

async fn any_fits(pool: &PgPool, r: &Resource) -> Result<bool> {
    let fits: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM pools
            WHERE cpu_cores >= $1 AND ram_mb >= $2 AND disk_gb >= $3 AND ip_count >= $4
        )
        "#,
    )
    .bind(r.cpu_cores)
    .bind(r.ram_mb)
    .bind(r.disk_gb)
    .bind(r.ip_count)
    .fetch_one(pool)
    .await?;

    Ok(fits)
}

#[async_trait]
impl PoolStore for PostgresPoolStore {
    async fn insert(&self, pool: &Pool) -> Result<()> {
        let r = &pool.available;
        sqlx::query(
            r#"
            INSERT INTO pools (id, name, cpu_cores, ram_mb, disk_gb, ip_count, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(pool.id)
        .bind(&pool.name)
        .bind(r.cpu_cores)
        .bind(r.ram_mb)
        .bind(r.disk_gb)
        .bind(r.ip_count)
        .bind(pool.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Pool>> {
        let record = sqlx::query_as::<_, PoolRecord>(
            r#"
            SELECT id, name, cpu_cores, ram_mb, disk_gb, ip_count, created_at
            FROM pools
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Pool::from))
    }

    async fn search(&self, page: Page) -> Result<(Vec<Pool>, i64)> {
        let records = sqlx::query_as::<_, PoolRecord>(
            r#"
            SELECT id, name, cpu_cores, ram_mb, disk_gb, ip_count, created_at
            FROM pools
            ORDER BY created_at, id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pools")
            .fetch_one(&self.pool)
            .await?;

        Ok((records.into_iter().map(Pool::from).collect(), total))
    }

    async fn subtract(&self, resource: &Resource) -> Result<Option<Uuid>> {
        for attempt in 1..=SUBTRACT_ATTEMPTS {
            if let Some(id) = try_subtract(&self.pool, resource).await? {
                return Ok(Some(id));
            }
            if !any_fits(&self.pool, resource).await? {
                return Ok(None);
            }
            debug!(attempt, "Lost race for pool capacity, retrying");
        }
        Ok(None)
    }

    async fn append(&self, resource: &Resource, pool_id: Uuid) -> Result<Option<Pool>> {
        let record = sqlx::query_as::<_, PoolRecord>(
            r#"
            UPDATE pools
            SET cpu_cores = cpu_cores + $1,
                ram_mb = ram_mb + $2,
                disk_gb = disk_gb + $3,
                ip_count = ip_count + $4
            WHERE id = $5
            RETURNING id, name, cpu_cores, ram_mb, disk_gb, ip_count, created_at
            "#,
        )
        .bind(resource.cpu_cores)
        .bind(resource.ram_mb)
        .bind(resource.disk_gb)
        .bind(resource.ip_count)
        .bind(pool_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Pool::from))
    }
}
