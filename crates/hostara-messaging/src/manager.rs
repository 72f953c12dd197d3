// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Publish/subscribe front end over a [`Broker`].

use hostara_protocol::ExchangeConfig;
use hostara_protocol::topology::dlq_queue_name;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

use crate::broker::{Broker, Delivery, DlqConfig, QueueBinding};
use crate::config::MessagingConfig;
use crate::error::MessagingError;
use crate::handler::{DeadLetterSink, HandlerError, MessageHandler};

/// Handle for a running subscription.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub queue: String,
    /// Sink consuming `<queue>.dlq`, when the subscription declared one.
    pub dead_letters: Option<Arc<DeadLetterSink>>,
}

/// Owns the receive loops of every subscription made through it.
pub struct MessageManager {
    broker: Arc<dyn Broker>,
    handler_timeout: Duration,
    poll_interval: Duration,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl MessageManager {
    /// Declare `exchanges` on `broker` and return a manager ready to publish.
    pub async fn new(
        broker: Arc<dyn Broker>,
        exchanges: &[ExchangeConfig],
        config: &MessagingConfig,
    ) -> Result<Self, MessagingError> {
        for exchange in exchanges {
            broker.declare_exchange(exchange).await?;
            debug!(exchange = %exchange.name, kind = exchange.kind.as_str(), "Exchange declared");
        }
        Ok(Self {
            broker,
            handler_timeout: config.handler_timeout,
            poll_interval: config.poll_interval,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        })
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    /// Serialize `message` as JSON and publish it.
    pub async fn publish<T: Serialize + Sync>(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &T,
    ) -> Result<(), MessagingError> {
        let body = serde_json::to_vec(message)?;
        self.broker.publish(exchange, routing_key, &body).await
    }

    /// Bind `queue` to `exchange` under `routing_key` and start a receive loop
    /// that feeds `handler`.
    ///
    /// With a `dlq`, rejected messages go to `<queue>.dlq`, which gets its own
    /// [`DeadLetterSink`] consumer.
    #[instrument(skip(self, handler, dlq))]
    pub async fn subscribe<H>(
        &self,
        queue: &str,
        routing_key: &str,
        exchange: &str,
        handler: H,
        dlq: Option<DlqConfig>,
    ) -> Result<Subscription, MessagingError>
    where
        H: MessageHandler + 'static,
    {
        if self.shutdown.is_cancelled() {
            return Err(MessagingError::Closed);
        }

        let mut binding = QueueBinding::new(queue, exchange, routing_key);
        let mut dead_letters = None;
        if let Some(dlq) = &dlq {
            binding = binding.with_dead_letter(dlq);
            let Some(route) = &binding.dead_letter else {
                return Err(MessagingError::Broker("dead-letter route missing".into()));
            };
            let dlq_queue = dlq_queue_name(queue);
            self.broker
                .bind_queue(&QueueBinding::new(&dlq_queue, &route.exchange, &route.routing_key))
                .await?;
            let sink = Arc::new(DeadLetterSink::new());
            self.spawn_consumer(dlq_queue, sink.clone());
            dead_letters = Some(sink);
        }
        self.broker.bind_queue(&binding).await?;
        self.spawn_consumer(queue.to_string(), Arc::new(handler));

        info!(exchange, dead_letter = dlq.is_some(), "Subscribed");
        Ok(Subscription {
            queue: queue.to_string(),
            dead_letters,
        })
    }

    fn spawn_consumer(&self, queue: String, handler: Arc<dyn MessageHandler>) {
        let consumer = Consumer {
            broker: self.broker.clone(),
            queue,
            handler,
            handler_timeout: self.handler_timeout,
            poll_interval: self.poll_interval,
            shutdown: self.shutdown.clone(),
        };
        self.tracker.spawn(consumer.run());
    }

    /// Stop all receive loops, wait up to `timeout` for in-flight handlers,
    /// then close the broker.
    pub async fn stop(&self, timeout: Duration) -> Result<(), MessagingError> {
        info!("Stopping message manager");
        self.shutdown.cancel();
        self.tracker.close();

        let drained = tokio::time::timeout(timeout, self.tracker.wait()).await;
        self.broker.close().await?;
        match drained {
            Ok(()) => {
                info!("Message manager stopped");
                Ok(())
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Consumers did not drain in time");
                Err(MessagingError::ShutdownTimeout)
            }
        }
    }
}

struct Consumer {
    broker: Arc<dyn Broker>,
    queue: String,
    handler: Arc<dyn MessageHandler>,
    handler_timeout: Duration,
    poll_interval: Duration,
    shutdown: CancellationToken,
}

impl Consumer {
    async fn run(self) {
        debug!(queue = %self.queue, "Consumer started");
        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                next = self.broker.try_receive(&self.queue) => next,
            };

            match next {
                Ok(Some(delivery)) => self.process(delivery).await,
                Ok(None) => {
                    if !self.idle().await {
                        break;
                    }
                }
                Err(MessagingError::Closed) => break,
                Err(e) => {
                    error!(queue = %self.queue, error = %e, "Failed to receive message");
                    if !self.idle().await {
                        break;
                    }
                }
            }
        }
        debug!(queue = %self.queue, "Consumer stopped");
    }

    /// Wait one poll interval. Returns false when shutdown was requested.
    async fn idle(&self) -> bool {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(self.poll_interval) => true,
        }
    }

    async fn process(&self, delivery: Delivery) {
        let cancel = self.shutdown.child_token();
        let outcome = tokio::time::timeout(
            self.handler_timeout,
            self.handler.handle(&delivery, cancel.clone()),
        )
        .await
        .unwrap_or_else(|_| {
            cancel.cancel();
            Err(HandlerError::Transient(format!(
                "handler timed out after {}ms",
                self.handler_timeout.as_millis()
            )))
        });

        let settled = match &outcome {
            Ok(()) => self.broker.ack(&delivery).await,
            Err(e) if e.is_permanent() => {
                warn!(
                    queue = %delivery.queue,
                    routing_key = %delivery.routing_key,
                    error = %e,
                    "Rejecting message"
                );
                self.broker.reject(&delivery).await
            }
            Err(e) => {
                debug!(
                    queue = %delivery.queue,
                    routing_key = %delivery.routing_key,
                    attempt = delivery.attempt,
                    error = %e,
                    "Requeueing message"
                );
                self.broker.requeue(&delivery).await
            }
        };

        if let Err(e) = settled {
            error!(
                queue = %delivery.queue,
                tag = %delivery.tag,
                error = %e,
                "Failed to settle message"
            );
        }
    }
}
