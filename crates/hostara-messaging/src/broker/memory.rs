// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process broker for tests and single-process setups.

use async_trait::async_trait;
use hostara_protocol::{ExchangeConfig, ExchangeKind};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{Broker, DeadLetter, Delivery, QueueBinding};
use crate::error::MessagingError;
use crate::routing::binding_matches;

/// A message accepted by [`InMemoryBroker::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
}

#[derive(Debug)]
struct Stored {
    routing_key: String,
    body: Vec<u8>,
    attempt: u32,
}

#[derive(Debug, Default)]
struct State {
    exchanges: HashMap<String, ExchangeKind>,
    bindings: Vec<QueueBinding>,
    dead_letters: HashMap<String, DeadLetter>,
    queues: HashMap<String, VecDeque<Stored>>,
    unacked: HashMap<String, Delivery>,
    published: Vec<Published>,
    next_tag: u64,
    fail_publish: bool,
    closed: bool,
}

impl State {
    fn route(&mut self, exchange: &str, routing_key: &str, body: &[u8]) -> Result<usize, MessagingError> {
        let kind = *self
            .exchanges
            .get(exchange)
            .ok_or_else(|| MessagingError::UnknownExchange(exchange.to_string()))?;

        let targets: Vec<String> = self
            .bindings
            .iter()
            .filter(|b| b.exchange == exchange && binding_matches(kind, &b.routing_key, routing_key))
            .map(|b| b.queue.clone())
            .collect();

        for queue in &targets {
            self.queues.entry(queue.clone()).or_default().push_back(Stored {
                routing_key: routing_key.to_string(),
                body: body.to_vec(),
                attempt: 1,
            });
        }
        self.published.push(Published {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            body: body.to_vec(),
        });
        Ok(targets.len())
    }

    fn settle(&mut self, delivery: &Delivery) -> Result<Delivery, MessagingError> {
        self.unacked
            .remove(&delivery.tag)
            .ok_or_else(|| MessagingError::Broker(format!("unknown delivery tag {}", delivery.tag)))
    }
}

/// Broker that keeps exchanges, bindings and queues in memory.
///
/// Supports the same routing, dead-lettering and redelivery rules as the
/// Redis broker, plus inspection helpers and failure injection for tests.
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    state: Mutex<State>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message accepted by `publish`, in order (dead-letter routing included).
    pub async fn published(&self) -> Vec<Published> {
        self.state.lock().await.published.clone()
    }

    /// Messages waiting in `queue` (not counting unacknowledged deliveries).
    pub async fn queue_depth(&self, queue: &str) -> usize {
        self.state
            .lock()
            .await
            .queues
            .get(queue)
            .map_or(0, VecDeque::len)
    }

    /// Deliveries handed out and not yet settled.
    pub async fn unacked(&self) -> usize {
        self.state.lock().await.unacked.len()
    }

    /// Make every subsequent `publish` fail until reset.
    pub async fn set_fail_publish(&self, fail: bool) {
        self.state.lock().await.fail_publish = fail;
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn declare_exchange(&self, exchange: &ExchangeConfig) -> Result<(), MessagingError> {
        let mut state = self.state.lock().await;
        match state.exchanges.get(&exchange.name) {
            Some(existing) if *existing != exchange.kind => Err(MessagingError::ExchangeMismatch {
                name: exchange.name.clone(),
                existing: existing.as_str(),
            }),
            Some(_) => Ok(()),
            None => {
                state.exchanges.insert(exchange.name.clone(), exchange.kind);
                Ok(())
            }
        }
    }

    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), MessagingError> {
        let mut state = self.state.lock().await;
        if !state.exchanges.contains_key(&binding.exchange) {
            return Err(MessagingError::UnknownExchange(binding.exchange.clone()));
        }
        state.queues.entry(binding.queue.clone()).or_default();
        if let Some(dead_letter) = &binding.dead_letter {
            state
                .dead_letters
                .insert(binding.queue.clone(), dead_letter.clone());
        }
        let duplicate = state.bindings.iter().any(|b| {
            b.queue == binding.queue
                && b.exchange == binding.exchange
                && b.routing_key == binding.routing_key
        });
        if !duplicate {
            state.bindings.push(binding.clone());
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), MessagingError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(MessagingError::Closed);
        }
        if state.fail_publish {
            return Err(MessagingError::Broker("publish rejected".to_string()));
        }
        let routed = state.route(exchange, routing_key, body)?;
        if routed == 0 {
            debug!(exchange, routing_key, "Message matched no bindings");
        }
        Ok(())
    }

    async fn try_receive(&self, queue: &str) -> Result<Option<Delivery>, MessagingError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(MessagingError::Closed);
        }
        let Some(stored) = state.queues.get_mut(queue).and_then(VecDeque::pop_front) else {
            return Ok(None);
        };
        state.next_tag += 1;
        let delivery = Delivery {
            queue: queue.to_string(),
            routing_key: stored.routing_key,
            body: stored.body,
            tag: state.next_tag.to_string(),
            attempt: stored.attempt,
        };
        state.unacked.insert(delivery.tag.clone(), delivery.clone());
        Ok(Some(delivery))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), MessagingError> {
        self.state.lock().await.settle(delivery)?;
        Ok(())
    }

    async fn requeue(&self, delivery: &Delivery) -> Result<(), MessagingError> {
        let mut state = self.state.lock().await;
        let delivery = state.settle(delivery)?;
        state
            .queues
            .entry(delivery.queue)
            .or_default()
            .push_back(Stored {
                routing_key: delivery.routing_key,
                body: delivery.body,
                attempt: delivery.attempt + 1,
            });
        Ok(())
    }

    async fn reject(&self, delivery: &Delivery) -> Result<(), MessagingError> {
        let mut state = self.state.lock().await;
        let delivery = state.settle(delivery)?;
        match state.dead_letters.get(&delivery.queue).cloned() {
            Some(dead_letter) => {
                state.route(&dead_letter.exchange, &dead_letter.routing_key, &delivery.body)?;
            }
            None => {
                warn!(
                    queue = %delivery.queue,
                    routing_key = %delivery.routing_key,
                    "Rejected message discarded, no dead-letter route"
                );
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), MessagingError> {
        self.state.lock().await.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::DlqConfig;
    use hostara_protocol::topology::{DEAD_LETTER_EXCHANGE, EVENTS_EXCHANGE, dlq_routing_key};

    async fn broker() -> InMemoryBroker {
        let broker = InMemoryBroker::new();
        for exchange in ExchangeConfig::defaults() {
            broker.declare_exchange(&exchange).await.unwrap();
        }
        broker
    }

    #[tokio::test]
    async fn test_topic_routing_fans_out_to_matching_queues() {
        let broker = broker().await;
        broker
            .bind_queue(&QueueBinding::new("results", EVENTS_EXCHANGE, "server.provision.*"))
            .await
            .unwrap();
        broker
            .bind_queue(&QueueBinding::new("updates", EVENTS_EXCHANGE, "server.updated"))
            .await
            .unwrap();

        broker
            .publish(EVENTS_EXCHANGE, "server.provision.failed", b"{}")
            .await
            .unwrap();

        assert_eq!(broker.queue_depth("results").await, 1);
        assert_eq!(broker.queue_depth("updates").await, 0);
    }

    #[tokio::test]
    async fn test_requeue_increments_attempt() {
        let broker = broker().await;
        broker
            .bind_queue(&QueueBinding::new("q", EVENTS_EXCHANGE, "#"))
            .await
            .unwrap();
        broker.publish(EVENTS_EXCHANGE, "a.b", b"x").await.unwrap();

        let first = broker.try_receive("q").await.unwrap().unwrap();
        assert_eq!(first.attempt, 1);
        assert!(!first.redelivered());
        broker.requeue(&first).await.unwrap();

        let second = broker.try_receive("q").await.unwrap().unwrap();
        assert_eq!(second.attempt, 2);
        assert!(second.redelivered());
        assert_ne!(first.tag, second.tag);
        broker.ack(&second).await.unwrap();

        assert_eq!(broker.unacked().await, 0);
        assert!(broker.try_receive("q").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reject_routes_to_dead_letter_queue() {
        let broker = broker().await;
        broker
            .bind_queue(
                &QueueBinding::new("q", EVENTS_EXCHANGE, "server.updated")
                    .with_dead_letter(&DlqConfig::default()),
            )
            .await
            .unwrap();
        broker
            .bind_queue(&QueueBinding::new("q.dlq", DEAD_LETTER_EXCHANGE, dlq_routing_key("q")))
            .await
            .unwrap();

        broker
            .publish(EVENTS_EXCHANGE, "server.updated", b"poison")
            .await
            .unwrap();
        let delivery = broker.try_receive("q").await.unwrap().unwrap();
        broker.reject(&delivery).await.unwrap();

        let dead = broker.try_receive("q.dlq").await.unwrap().unwrap();
        assert_eq!(dead.body, b"poison");
        assert_eq!(dead.routing_key, "dlq.q");
        assert!(broker.try_receive("q").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reject_without_dead_letter_discards() {
        let broker = broker().await;
        broker
            .bind_queue(&QueueBinding::new("q", EVENTS_EXCHANGE, "#"))
            .await
            .unwrap();
        broker.publish(EVENTS_EXCHANGE, "x", b"1").await.unwrap();
        let delivery = broker.try_receive("q").await.unwrap().unwrap();
        broker.reject(&delivery).await.unwrap();

        assert_eq!(broker.queue_depth("q").await, 0);
        assert_eq!(broker.unacked().await, 0);
    }

    #[tokio::test]
    async fn test_double_settle_is_an_error() {
        let broker = broker().await;
        broker
            .bind_queue(&QueueBinding::new("q", EVENTS_EXCHANGE, "#"))
            .await
            .unwrap();
        broker.publish(EVENTS_EXCHANGE, "x", b"1").await.unwrap();
        let delivery = broker.try_receive("q").await.unwrap().unwrap();
        broker.ack(&delivery).await.unwrap();
        assert!(broker.ack(&delivery).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_exchange_and_kind_mismatch() {
        let broker = broker().await;
        let err = broker.publish("nope", "x", b"").await.unwrap_err();
        assert!(matches!(err, MessagingError::UnknownExchange(_)));

        let err = broker
            .declare_exchange(&ExchangeConfig::new(EVENTS_EXCHANGE, ExchangeKind::Direct))
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::ExchangeMismatch { .. }));
    }

    #[tokio::test]
    async fn test_fail_publish_and_close() {
        let broker = broker().await;
        broker.set_fail_publish(true).await;
        assert!(broker.publish(EVENTS_EXCHANGE, "x", b"").await.is_err());
        broker.set_fail_publish(false).await;
        broker.publish(EVENTS_EXCHANGE, "x", b"").await.unwrap();

        broker.close().await.unwrap();
        assert!(matches!(
            broker.try_receive("q").await,
            Err(MessagingError::Closed)
        ));
    }
}
