// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Server entity and its state machine.
//!
//! | From                              | Call                      | To               |
//! |-----------------------------------|---------------------------|------------------|
//! | (new)                             | create                    | PENDING          |
//! | PENDING                           | `assign_ip`               | STOPPED          |
//! | PENDING                           | `mark_provision_failed`   | PROVISION_FAILED |
//! | STOPPED                           | `start`                   | RUNNING          |
//! | RUNNING                           | `stop`                    | STOPPED          |
//! | STOPPED, RUNNING, PROVISION_FAILED | `begin_delete`           | DELETING         |
//!
//! Status and address are private: they only change through the transition
//! methods below, each of which checks the table before mutating.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;
use uuid::Uuid;

use crate::error::{Result, ServerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerStatus {
    Pending,
    Stopped,
    Running,
    ProvisionFailed,
    Deleting,
}

impl ServerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Stopped => "STOPPED",
            Self::Running => "RUNNING",
            Self::ProvisionFailed => "PROVISION_FAILED",
            Self::Deleting => "DELETING",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "STOPPED" => Some(Self::Stopped),
            "RUNNING" => Some(Self::Running),
            "PROVISION_FAILED" => Some(Self::ProvisionFailed),
            "DELETING" => Some(Self::Deleting),
            _ => None,
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub plan_id: Uuid,
    pub pool_id: Uuid,
    pub name: String,
    status: ServerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    ipv4_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Server {
    /// A new `PENDING` server backed by an allocation from `pool_id`.
    pub fn new(name: &str, owner_id: Uuid, plan_id: Uuid, pool_id: Uuid) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServerError::Validation("name must not be empty".into()));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            owner_id,
            plan_id,
            pool_id,
            name: name.to_string(),
            status: ServerStatus::Pending,
            ipv4_address: None,
            created_at: Utc::now(),
        })
    }

    /// Rebuild a server from storage.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        id: Uuid,
        owner_id: Uuid,
        plan_id: Uuid,
        pool_id: Uuid,
        name: String,
        status: ServerStatus,
        ipv4_address: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id,
            plan_id,
            pool_id,
            name,
            status,
            ipv4_address,
            created_at,
        }
    }

    pub fn status(&self) -> ServerStatus {
        self.status
    }

    pub fn ipv4_address(&self) -> Option<&str> {
        self.ipv4_address.as_deref()
    }

    pub fn ensure_owner(&self, caller: Uuid) -> Result<()> {
        if self.owner_id != caller {
            return Err(ServerError::AccessDenied(self.id));
        }
        Ok(())
    }

    fn require(&self, allowed: &[ServerStatus], expected: &'static str) -> Result<()> {
        if !allowed.contains(&self.status) {
            return Err(ServerError::InvalidStatus {
                actual: self.status,
                expected,
            });
        }
        Ok(())
    }

    /// STOPPED -> RUNNING
    pub fn start(&mut self) -> Result<()> {
        self.require(&[ServerStatus::Stopped], "STOPPED")?;
        self.status = ServerStatus::Running;
        Ok(())
    }

    /// RUNNING -> STOPPED
    pub fn stop(&mut self) -> Result<()> {
        self.require(&[ServerStatus::Running], "RUNNING")?;
        self.status = ServerStatus::Stopped;
        Ok(())
    }

    /// PENDING -> STOPPED with `ip` recorded.
    ///
    /// Returns `Ok(false)` without changing anything when `ip` is already the
    /// recorded address.
    pub fn assign_ip(&mut self, ip: &str) -> Result<bool> {
        let ip = validate_ipv4(ip)?;
        if self.ipv4_address.as_deref() == Some(ip.as_str()) {
            return Ok(false);
        }
        self.require(&[ServerStatus::Pending], "PENDING")?;
        self.status = ServerStatus::Stopped;
        self.ipv4_address = Some(ip);
        Ok(true)
    }

    /// PENDING -> PROVISION_FAILED. Returns `Ok(false)` if already failed.
    pub fn mark_provision_failed(&mut self) -> Result<bool> {
        if self.status == ServerStatus::ProvisionFailed {
            return Ok(false);
        }
        self.require(&[ServerStatus::Pending], "PENDING")?;
        self.status = ServerStatus::ProvisionFailed;
        Ok(true)
    }

    /// STOPPED | RUNNING | PROVISION_FAILED -> DELETING
    pub fn begin_delete(&mut self) -> Result<()> {
        self.require(
            &[
                ServerStatus::Stopped,
                ServerStatus::Running,
                ServerStatus::ProvisionFailed,
            ],
            "STOPPED, RUNNING or PROVISION_FAILED",
        )?;
        self.status = ServerStatus::Deleting;
        Ok(())
    }
}

/// Canonical form of a dotted-quad IPv4 literal.
pub fn validate_ipv4(ip: &str) -> Result<String> {
    ip.trim()
        .parse::<Ipv4Addr>()
        .map(|addr| addr.to_string())
        .map_err(|_| ServerError::Validation(format!("invalid IPv4 address '{ip}'")))
}
