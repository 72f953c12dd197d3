// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Broker abstraction.
//!
//! A broker routes published messages from exchanges into queues and hands
//! them out one delivery at a time. Every delivery must be settled exactly
//! once with [`Broker::ack`], [`Broker::requeue`] or [`Broker::reject`].

mod memory;
mod redis_streams;

pub use memory::{InMemoryBroker, Published};
pub use redis_streams::RedisBroker;

use async_trait::async_trait;
use hostara_protocol::ExchangeConfig;
use hostara_protocol::topology::{DEAD_LETTER_EXCHANGE, dlq_routing_key};
use serde::{Deserialize, Serialize};

use crate::error::MessagingError;

/// Where rejected deliveries from a queue are routed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub exchange: String,
    pub routing_key: String,
}

/// Dead-letter configuration for a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DlqConfig {
    /// Direct exchange that receives rejected messages.
    pub exchange: String,
}

impl Default for DlqConfig {
    fn default() -> Self {
        Self {
            exchange: DEAD_LETTER_EXCHANGE.to_string(),
        }
    }
}

/// Binds `queue` to `exchange` for messages matching `routing_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    pub dead_letter: Option<DeadLetter>,
}

impl QueueBinding {
    pub fn new(
        queue: impl Into<String>,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        Self {
            queue: queue.into(),
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            dead_letter: None,
        }
    }

    /// Route rejected deliveries to `dlq.exchange` under `dlq.<queue>`.
    pub fn with_dead_letter(mut self, dlq: &DlqConfig) -> Self {
        self.dead_letter = Some(DeadLetter {
            exchange: dlq.exchange.clone(),
            routing_key: dlq_routing_key(&self.queue),
        });
        self
    }
}

/// A message handed to a consumer, awaiting settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub queue: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    /// Broker-specific identifier used to settle the delivery.
    pub tag: String,
    /// 1 on first delivery, incremented on every requeue.
    pub attempt: u32,
}

impl Delivery {
    pub fn redelivered(&self) -> bool {
        self.attempt > 1
    }
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Declare an exchange. Redeclaring with the same kind is a no-op.
    async fn declare_exchange(&self, exchange: &ExchangeConfig) -> Result<(), MessagingError>;

    /// Create the queue if needed and bind it.
    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), MessagingError>;

    /// Route `body` to every queue bound to `exchange` with a matching key.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), MessagingError>;

    /// Take the next delivery from `queue`, if any. Never blocks waiting for one.
    async fn try_receive(&self, queue: &str) -> Result<Option<Delivery>, MessagingError>;

    async fn ack(&self, delivery: &Delivery) -> Result<(), MessagingError>;

    /// Put the message back for redelivery.
    async fn requeue(&self, delivery: &Delivery) -> Result<(), MessagingError>;

    /// Drop the message to the queue's dead-letter route, or discard it if none.
    async fn reject(&self, delivery: &Delivery) -> Result<(), MessagingError>;

    async fn close(&self) -> Result<(), MessagingError>;
}
