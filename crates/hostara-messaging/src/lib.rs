// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hostara Messaging - at-least-once publish/subscribe
//!
//! A [`MessageManager`] publishes JSON messages to named exchanges and runs
//! one receive loop per subscription. Each delivery is handed to a
//! [`MessageHandler`] under a bounded timeout and then settled:
//!
//! | Handler outcome              | Settlement                          |
//! |------------------------------|-------------------------------------|
//! | `Ok(())`                     | ack                                 |
//! | `Err(HandlerError::Permanent)` | reject to the dead-letter queue   |
//! | `Err(HandlerError::Transient)` | requeue for redelivery            |
//! | timeout                      | requeue for redelivery              |
//!
//! Subscriptions that declare a [`DlqConfig`] also get a terminal
//! [`DeadLetterSink`] consumer on `<queue>.dlq`.
//!
//! Brokers implement the [`Broker`] trait. [`RedisBroker`] stores each queue
//! as a Redis stream with a consumer group; [`InMemoryBroker`] is the
//! in-process double used by tests.

pub mod broker;
pub mod config;
pub mod error;
pub mod handler;
pub mod manager;
pub mod routing;

pub use broker::{Broker, DeadLetter, Delivery, DlqConfig, InMemoryBroker, QueueBinding, RedisBroker};
pub use config::{ConfigError, MessagingConfig};
pub use error::MessagingError;
pub use handler::{DeadLetterSink, HandlerError, LogErrors, MessageHandler, decode};
pub use manager::{MessageManager, Subscription};
