// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hostara Provisioning - the external side of the provisioning saga
//!
//! Consumes `server.provision.request` commands, simulates provisioning an
//! address after a configured delay and emits exactly one result event per
//! invocation:
//! - `server.provision.succeeded` with a `10.0.0.N` address, or
//! - `server.provision.failed` with a reason (fixed probability).
//!
//! [`ProvisioningSimulator`] can be swapped for a real backend behind the
//! [`Provisioning`] trait without changing the command handler.

pub mod config;
pub mod error;
pub mod handler;
pub mod notifier;
pub mod simulator;

pub use error::ProvisioningError;
pub use handler::ProvisionRequestHandler;
pub use notifier::{MessagingNotifier, ProvisioningNotifier, RecordingNotifier};
pub use simulator::{Provisioning, ProvisioningSimulator, TracedProvisioning, compose};
