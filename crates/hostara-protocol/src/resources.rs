// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource quantities and the resource allocation RPC boundary.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bundle of capacity: CPU cores, RAM, disk and IP addresses.
///
/// Used both as the available capacity of a pool and as the delta
/// consumed or returned for a single server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub cpu_cores: i32,
    pub ram_mb: i32,
    pub disk_gb: i32,
    pub ip_count: i32,
}

/// A resource quantity failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceError {
    #[error("{0} must not be negative")]
    Negative(&'static str),

    #[error("{0} overflows")]
    Overflow(&'static str),
}

impl Resource {
    pub const fn new(cpu_cores: i32, ram_mb: i32, disk_gb: i32, ip_count: i32) -> Self {
        Self {
            cpu_cores,
            ram_mb,
            disk_gb,
            ip_count,
        }
    }

    fn fields(&self) -> [(&'static str, i32); 4] {
        [
            ("cpuCores", self.cpu_cores),
            ("ramMb", self.ram_mb),
            ("diskGb", self.disk_gb),
            ("ipCount", self.ip_count),
        ]
    }

    /// Every quantity must be non-negative.
    pub fn validate(&self) -> Result<(), ResourceError> {
        match self.fields().into_iter().find(|(_, v)| *v < 0) {
            Some((name, _)) => Err(ResourceError::Negative(name)),
            None => Ok(()),
        }
    }

    /// True when every quantity in `self` is at least the one in `other`.
    pub fn covers(&self, other: &Resource) -> bool {
        self.cpu_cores >= other.cpu_cores
            && self.ram_mb >= other.ram_mb
            && self.disk_gb >= other.disk_gb
            && self.ip_count >= other.ip_count
    }

    /// Subtract `other`, or `None` if any quantity would go negative.
    pub fn checked_sub(&self, other: &Resource) -> Option<Resource> {
        if !self.covers(other) {
            return None;
        }
        Some(Resource {
            cpu_cores: self.cpu_cores - other.cpu_cores,
            ram_mb: self.ram_mb - other.ram_mb,
            disk_gb: self.disk_gb - other.disk_gb,
            ip_count: self.ip_count - other.ip_count,
        })
    }

    pub fn checked_add(&self, other: &Resource) -> Result<Resource, ResourceError> {
        let add = |name, a: i32, b: i32| a.checked_add(b).ok_or(ResourceError::Overflow(name));
        Ok(Resource {
            cpu_cores: add("cpuCores", self.cpu_cores, other.cpu_cores)?,
            ram_mb: add("ramMb", self.ram_mb, other.ram_mb)?,
            disk_gb: add("diskGb", self.disk_gb, other.disk_gb)?,
            ip_count: add("ipCount", self.ip_count, other.ip_count)?,
        })
    }
}

/// `ConsumeResource(resource) -> poolId`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeRequest {
    pub resource: Resource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeReply {
    pub pool_id: Uuid,
}

/// `ReturnResource(resource, poolId)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnRequest {
    pub resource: Resource,
    pub pool_id: Uuid,
}

/// Error body returned by the resource allocation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: String,
    pub message: String,
}

impl RpcError {
    pub const INVALID_ARGUMENT: &'static str = "INVALID_ARGUMENT";
    pub const FAILED_PRECONDITION: &'static str = "FAILED_PRECONDITION";
    pub const NOT_FOUND: &'static str = "NOT_FOUND";
    pub const INTERNAL: &'static str = "INTERNAL";

    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}
