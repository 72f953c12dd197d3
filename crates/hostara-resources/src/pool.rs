// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource pool model.

use chrono::{DateTime, Utc};
use hostara_protocol::Resource;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PoolError, Result};

/// A named reservoir of capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub id: Uuid,
    pub name: String,
    pub available: Resource,
    pub created_at: DateTime<Utc>,
}

impl Pool {
    /// Validate and build a new pool. The name is trimmed.
    pub fn new(name: &str, available: Resource) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PoolError::Validation("name must not be empty".to_string()));
        }
        available.validate()?;
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            available,
            created_at: Utc::now(),
        })
    }
}

/// Reject negative quantities in a consume/return delta.
pub fn validate_delta(resource: &Resource) -> Result<()> {
    resource.validate()?;
    Ok(())
}
