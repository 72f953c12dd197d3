// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Saga messages exchanged over the broker.
//!
//! Field names are camelCase on the wire; timestamps are RFC 3339.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Command: provision the server identified by `serverId`.
pub const PROVISION_REQUEST: &str = "server.provision.request";
/// Event: provisioning finished with an address.
pub const PROVISION_SUCCEEDED: &str = "server.provision.succeeded";
/// Event: provisioning gave up.
pub const PROVISION_FAILED: &str = "server.provision.failed";
/// Binding pattern covering every provisioning result.
pub const PROVISION_RESULTS: &str = "server.provision.*";
/// Event: a server changed status.
pub const SERVER_UPDATED: &str = "server.updated";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionServerCommand {
    pub server_id: Uuid,
    pub hostname: String,
}

impl ProvisionServerCommand {
    pub fn new(server_id: Uuid, hostname: impl Into<String>) -> Self {
        Self {
            server_id,
            hostname: hostname.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerProvisionedEvent {
    pub server_id: Uuid,
    pub ipv4_address: String,
    pub provisioned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerProvisionFailedEvent {
    pub server_id: Uuid,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Status-changed notification addressed to the server's owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatusChangedEvent {
    pub server_id: Uuid,
    pub owner_id: Uuid,
    pub status: String,
    #[serde(rename = "ip", default, skip_serializing_if = "Option::is_none")]
    pub ipv4_address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_wire_shape() {
        let id = Uuid::new_v4();
        let value = serde_json::to_value(ProvisionServerCommand::new(id, "web-1")).unwrap();
        assert_eq!(value, json!({ "serverId": id.to_string(), "hostname": "web-1" }));
    }

    #[test]
    fn test_status_changed_omits_missing_ip() {
        let event = ServerStatusChangedEvent {
            server_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            status: "PROVISION_FAILED".to_string(),
            ipv4_address: None,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("ip").is_none());
        assert_eq!(value["status"], "PROVISION_FAILED");
    }

    #[test]
    fn test_status_changed_carries_ip() {
        let server_id = Uuid::new_v4();
        let owner_id = Uuid::new_v4();
        let event = ServerStatusChangedEvent {
            server_id,
            owner_id,
            status: "STOPPED".to_string(),
            ipv4_address: Some("10.0.0.1".to_string()),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "serverId": server_id.to_string(),
                "ownerId": owner_id.to_string(),
                "status": "STOPPED",
                "ip": "10.0.0.1",
            })
        );
        let parsed: ServerStatusChangedEvent = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_provisioned_event_parses_camel_case() {
        let id = Uuid::new_v4();
        let raw = format!(
            r#"{{"serverId":"{}","ipv4Address":"10.0.0.7","provisionedAt":"2025-03-01T10:00:00Z"}}"#,
            id
        );
        let event: ServerProvisionedEvent = serde_json::from_str(&raw).unwrap();
        assert_eq!(event.server_id, id);
        assert_eq!(event.ipv4_address, "10.0.0.7");
    }

    #[test]
    fn test_result_pattern_covers_both_results() {
        let prefix = PROVISION_RESULTS.trim_end_matches('*');
        assert!(PROVISION_SUCCEEDED.starts_with(prefix));
        assert!(PROVISION_FAILED.starts_with(prefix));
        assert!(!PROVISION_REQUEST.ends_with("succeeded"));
    }
}
