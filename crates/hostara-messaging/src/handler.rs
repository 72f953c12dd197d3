// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Message handlers and the outcome classification that drives settlement.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::broker::Delivery;

/// Outcome of a failed handler invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// Retrying cannot help; the message goes to the dead-letter queue.
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// The message is requeued for redelivery.
    #[error("{0}")]
    Transient(String),
}

impl HandlerError {
    pub fn permanent(err: impl Display) -> Self {
        Self::Permanent(err.to_string())
    }

    pub fn transient(err: impl Display) -> Self {
        Self::Transient(err.to_string())
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }
}

/// Decode a JSON delivery body. A body that does not parse is a permanent failure.
pub fn decode<T: DeserializeOwned>(delivery: &Delivery) -> Result<T, HandlerError> {
    serde_json::from_slice(&delivery.body).map_err(|e| {
        HandlerError::Permanent(format!(
            "undecodable '{}' message: {}",
            delivery.routing_key, e
        ))
    })
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one delivery. `cancel` fires when the handler timeout elapses
    /// or the manager shuts down.
    async fn handle(&self, delivery: &Delivery, cancel: CancellationToken)
    -> Result<(), HandlerError>;
}

#[async_trait]
impl<H: MessageHandler + ?Sized> MessageHandler for Arc<H> {
    async fn handle(
        &self,
        delivery: &Delivery,
        cancel: CancellationToken,
    ) -> Result<(), HandlerError> {
        (**self).handle(delivery, cancel).await
    }
}

/// Logs every failure of the wrapped handler and passes the error through.
pub struct LogErrors<H> {
    inner: H,
}

impl<H> LogErrors<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<H: MessageHandler> MessageHandler for LogErrors<H> {
    async fn handle(
        &self,
        delivery: &Delivery,
        cancel: CancellationToken,
    ) -> Result<(), HandlerError> {
        let result = self.inner.handle(delivery, cancel).await;
        if let Err(e) = &result {
            error!(
                queue = %delivery.queue,
                routing_key = %delivery.routing_key,
                attempt = delivery.attempt,
                permanent = e.is_permanent(),
                error = %e,
                "Message handler failed"
            );
        }
        result
    }
}

/// Terminal consumer for a dead-letter queue: records and acknowledges.
#[derive(Debug, Default)]
pub struct DeadLetterSink {
    received: AtomicU64,
}

impl DeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of dead-lettered messages seen so far.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::SeqCst)
    }
}

const BODY_PREVIEW: usize = 512;

#[async_trait]
impl MessageHandler for DeadLetterSink {
    async fn handle(&self, delivery: &Delivery, _cancel: CancellationToken) -> Result<(), HandlerError> {
        let total = self.received.fetch_add(1, Ordering::SeqCst) + 1;
        let body = String::from_utf8_lossy(&delivery.body);
        let preview: String = body.chars().take(BODY_PREVIEW).collect();
        warn!(
            queue = %delivery.queue,
            routing_key = %delivery.routing_key,
            total,
            body = %preview,
            "Dead-lettered message"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn delivery(body: &[u8]) -> Delivery {
        Delivery {
            queue: "q".into(),
            routing_key: "server.updated".into(),
            body: body.to_vec(),
            tag: "1".into(),
            attempt: 1,
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Ping {
        n: u32,
    }

    #[test]
    fn test_decode_failure_is_permanent() {
        let err = decode::<Ping>(&delivery(b"not json")).unwrap_err();
        assert!(err.is_permanent());
        assert!(err.to_string().contains("server.updated"));

        assert_eq!(decode::<Ping>(&delivery(br#"{"n":3}"#)).unwrap(), Ping { n: 3 });
    }

    struct Failing(HandlerError);

    #[async_trait]
    impl MessageHandler for Failing {
        async fn handle(&self, _: &Delivery, _: CancellationToken) -> Result<(), HandlerError> {
            Err(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_log_errors_passes_result_through() {
        let wrapped = LogErrors::new(Failing(HandlerError::transient("db down")));
        let err = wrapped
            .handle(&delivery(b"{}"), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, HandlerError::Transient("db down".into()));
    }

    #[tokio::test]
    async fn test_dead_letter_sink_counts() {
        let sink = Arc::new(DeadLetterSink::new());
        for _ in 0..3 {
            sink.handle(&delivery(b"x"), CancellationToken::new())
                .await
                .unwrap();
        }
        assert_eq!(sink.received(), 3);
    }
}
