// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hostara Core - server lifecycle manager
//!
//! Owns the server state machine and drives the provisioning saga:
//!
//! ```text
//! create ──> consume resources ──> persist PENDING ──> publish server.provision.request
//!                                                                  │
//!                     server.provision.succeeded / .failed <───────┘
//!                                  │
//!                                  v
//!             STOPPED | PROVISION_FAILED ──> publish server.updated
//! ```
//!
//! Result events may arrive more than once; applying the same result twice
//! leaves the server unchanged. If the provisioning command cannot be
//! published, creation is compensated: the row is removed and the resources
//! are returned to their pool.

pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod migrations;
pub mod notifier;
pub mod plan;
pub mod provisioner;
pub mod resources;
pub mod server;
pub mod service;
pub mod store;

pub use error::{ErrorKind, PlanError, ResourcesError, ServerError};
pub use handler::ProvisionResultHandler;
pub use notifier::{MessagingNotifier, Notifier, RecordingNotifier};
pub use plan::{Plan, PlanManager};
pub use provisioner::{MessagingProvisioner, Provisioner, RecordingProvisioner};
pub use resources::{HttpResourcesManager, InMemoryResources, ResourcesManager};
pub use server::{Server, ServerStatus};
pub use service::{ServerManager, ServerService, TracedServers, compose};
pub use store::{
    InMemoryPlanStore, InMemoryServerStore, PlanStore, PostgresPlanStore, PostgresServerStore,
    ServerStore,
};
