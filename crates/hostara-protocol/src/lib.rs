// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hostara Protocol - wire contracts shared by every hostara service
//!
//! The services never call each other's internals. They agree on:
//! - Exchange topology (names, kinds, dead-letter naming)
//! - Saga messages (provisioning command and result events)
//! - The resource allocation boundary (consume/return payloads and error codes)
//! - Pagination for list endpoints
//!
//! # Architecture
//!
//! ```text
//!  hostara-core ──ConsumeResource/ReturnResource──▶ hostara-resources
//!       │
//!       │ server.provision.request  (server_commands_exchange, direct)
//!       ▼
//!  hostara-provisioning
//!       │
//!       │ server.provision.succeeded|failed  (server_events_exchange, topic)
//!       ▼
//!  hostara-core ──server.updated──▶ hostara-notifications ──ws──▶ clients
//!
//!  rejected deliveries ──dlq.<queue>──▶ hosting.dlx ──▶ <queue>.dlq
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use hostara_protocol::events::{self, ProvisionServerCommand};
//! use hostara_protocol::topology::COMMANDS_EXCHANGE;
//!
//! let command = ProvisionServerCommand::new(server_id, "web-1");
//! manager.publish(COMMANDS_EXCHANGE, events::PROVISION_REQUEST, &command).await?;
//! ```

pub mod events;
pub mod page;
pub mod resources;
pub mod topology;

pub use events::{
    ProvisionServerCommand, ServerProvisionFailedEvent, ServerProvisionedEvent,
    ServerStatusChangedEvent,
};
pub use page::{Page, PageDocument};
pub use resources::{ConsumeReply, ConsumeRequest, Resource, ResourceError, ReturnRequest, RpcError};
pub use topology::{ExchangeConfig, ExchangeKind};
