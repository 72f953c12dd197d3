// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hostara Notifications - real-time status updates for users
//!
//! Consumes `server.updated` events and pushes them to every live
//! WebSocket connection of the server's owner.
//!
//! ```text
//! server.updated ──> ServerUpdatedHandler ──> Notifier ──> WsSender ──> Hub
//!                                                                       │
//!                                       owner's connections <── Send ───┘
//! ```
//!
//! The [`Hub`] owns the connection registry inside a single task; other
//! code talks to it through register, unregister and send commands. A
//! connection that cannot keep up with its buffer is dropped instead of
//! slowing down the hub.

pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod http;
pub mod hub;
pub mod notification;

pub use connection::ConnectionConfig;
pub use error::{HubError, NotificationError};
pub use handler::ServerUpdatedHandler;
pub use hub::{Client, Hub, HubConfig};
pub use notification::{Event, NotificationSender, Notifier, RecordingSender, WsSender};
