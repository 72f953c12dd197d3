// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Exchange topology shared by publishers and consumers.

use serde::{Deserialize, Serialize};

/// Direct exchange carrying provisioning commands.
pub const COMMANDS_EXCHANGE: &str = "server_commands_exchange";

/// Topic exchange carrying provisioning results and status changes.
pub const EVENTS_EXCHANGE: &str = "server_events_exchange";

/// Direct exchange that receives rejected deliveries.
pub const DEAD_LETTER_EXCHANGE: &str = "hosting.dlx";

/// Routing key used to dead-letter messages rejected from `queue`.
pub fn dlq_routing_key(queue: &str) -> String {
    format!("dlq.{}", queue)
}

/// Name of the dead-letter queue paired with `queue`.
pub fn dlq_queue_name(queue: &str) -> String {
    format!("{}.dlq", queue)
}

/// How an exchange matches routing keys against bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    /// Binding key must equal the routing key.
    Direct,
    /// Binding key is a dot-separated pattern (`*` one word, `#` zero or more).
    Topic,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Direct => "direct",
            ExchangeKind::Topic => "topic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(ExchangeKind::Direct),
            "topic" => Some(ExchangeKind::Topic),
            _ => None,
        }
    }
}

/// Declaration of a named exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeConfig {
    pub name: String,
    pub kind: ExchangeKind,
}

impl ExchangeConfig {
    pub fn new(name: impl Into<String>, kind: ExchangeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// The three exchanges every hostara service declares on startup.
    pub fn defaults() -> Vec<ExchangeConfig> {
        vec![
            ExchangeConfig::new(COMMANDS_EXCHANGE, ExchangeKind::Direct),
            ExchangeConfig::new(EVENTS_EXCHANGE, ExchangeKind::Topic),
            ExchangeConfig::new(DEAD_LETTER_EXCHANGE, ExchangeKind::Direct),
        ]
    }
}
