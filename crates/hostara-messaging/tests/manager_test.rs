// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Delivery contract tests: ack, requeue, dead-letter and handler timeouts.

mod common;

use async_trait::async_trait;
use common::*;
use hostara_messaging::{
    Broker, Delivery, DlqConfig, HandlerError, MessageHandler, MessagingError, decode,
};
use hostara_protocol::ServerProvisionedEvent;
use hostara_protocol::events::{PROVISION_RESULTS, PROVISION_SUCCEEDED};
use hostara_protocol::topology::EVENTS_EXCHANGE;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Records the attempt number of every delivery it sees.
#[derive(Default)]
struct Recorder {
    attempts: Mutex<Vec<u32>>,
}

impl Recorder {
    async fn attempts(&self) -> Vec<u32> {
        self.attempts.lock().await.clone()
    }
}

struct Decoding(Arc<Recorder>);

#[async_trait]
impl MessageHandler for Decoding {
    async fn handle(&self, delivery: &Delivery, _: CancellationToken) -> Result<(), HandlerError> {
        self.0.attempts.lock().await.push(delivery.attempt);
        let _event: ServerProvisionedEvent = decode(delivery)?;
        Ok(())
    }
}

/// Hangs on the first attempt until cancelled, succeeds afterwards.
struct SlowFirst(Arc<Recorder>);

#[async_trait]
impl MessageHandler for SlowFirst {
    async fn handle(&self, delivery: &Delivery, cancel: CancellationToken) -> Result<(), HandlerError> {
        self.0.attempts.lock().await.push(delivery.attempt);
        if delivery.attempt == 1 {
            cancel.cancelled().await;
            return Err(HandlerError::transient("cancelled"));
        }
        Ok(())
    }
}

/// Fails transiently a fixed number of times.
struct Flaky {
    recorder: Arc<Recorder>,
    failures: u32,
}

#[async_trait]
impl MessageHandler for Flaky {
    async fn handle(&self, delivery: &Delivery, _: CancellationToken) -> Result<(), HandlerError> {
        self.recorder.attempts.lock().await.push(delivery.attempt);
        if delivery.attempt <= self.failures {
            return Err(HandlerError::transient("database unavailable"));
        }
        Ok(())
    }
}

fn provisioned() -> ServerProvisionedEvent {
    ServerProvisionedEvent {
        server_id: Uuid::new_v4(),
        ipv4_address: "10.0.0.9".into(),
        provisioned_at: chrono::Utc::now(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_message_goes_to_dlq_once() {
    let (broker, manager) = harness(Duration::from_secs(10)).await;
    let recorder = Arc::new(Recorder::default());
    let subscription = manager
        .subscribe(
            "api_events_queue",
            PROVISION_RESULTS,
            EVENTS_EXCHANGE,
            Decoding(recorder.clone()),
            Some(DlqConfig::default()),
        )
        .await
        .unwrap();
    let sink = subscription.dead_letters.clone().unwrap();

    broker
        .publish(EVENTS_EXCHANGE, PROVISION_SUCCEEDED, b"{not json")
        .await
        .unwrap();

    assert!(eventually(Duration::from_secs(5), || async { sink.received() == 1 }).await);

    // Give the consumer time to (wrongly) see it again.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(recorder.attempts().await, vec![1]);
    assert_eq!(broker.queue_depth("api_events_queue").await, 0);
    assert_eq!(broker.queue_depth("api_events_queue.dlq").await, 0);
    assert_eq!(sink.received(), 1);

    manager.stop(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_valid_message_is_acked() {
    let (broker, manager) = harness(Duration::from_secs(10)).await;
    let recorder = Arc::new(Recorder::default());
    let subscription = manager
        .subscribe(
            "api_events_queue",
            PROVISION_RESULTS,
            EVENTS_EXCHANGE,
            Decoding(recorder.clone()),
            Some(DlqConfig::default()),
        )
        .await
        .unwrap();

    manager
        .publish(EVENTS_EXCHANGE, PROVISION_SUCCEEDED, &provisioned())
        .await
        .unwrap();

    assert!(eventually(Duration::from_secs(5), || async { !recorder.attempts().await.is_empty() }).await);
    assert!(eventually(Duration::from_secs(1), || async { broker.unacked().await == 0 }).await);
    assert_eq!(subscription.dead_letters.unwrap().received(), 0);

    manager.stop(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_handler_timeout_redelivers() {
    let (_broker, manager) = harness(Duration::from_millis(100)).await;
    let recorder = Arc::new(Recorder::default());
    manager
        .subscribe(
            "provisioning_queue",
            PROVISION_RESULTS,
            EVENTS_EXCHANGE,
            SlowFirst(recorder.clone()),
            Some(DlqConfig::default()),
        )
        .await
        .unwrap();

    manager
        .publish(EVENTS_EXCHANGE, PROVISION_SUCCEEDED, &provisioned())
        .await
        .unwrap();

    assert!(
        eventually(Duration::from_secs(5), || async {
            recorder.attempts().await == vec![1, 2]
        })
        .await
    );

    manager.stop(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried_until_success() {
    let (broker, manager) = harness(Duration::from_secs(10)).await;
    let recorder = Arc::new(Recorder::default());
    let subscription = manager
        .subscribe(
            "api_events_queue",
            PROVISION_RESULTS,
            EVENTS_EXCHANGE,
            Flaky {
                recorder: recorder.clone(),
                failures: 3,
            },
            Some(DlqConfig::default()),
        )
        .await
        .unwrap();

    manager
        .publish(EVENTS_EXCHANGE, PROVISION_SUCCEEDED, &provisioned())
        .await
        .unwrap();

    assert!(
        eventually(Duration::from_secs(5), || async {
            recorder.attempts().await == vec![1, 2, 3, 4]
        })
        .await
    );
    assert!(eventually(Duration::from_secs(1), || async { broker.unacked().await == 0 }).await);
    assert_eq!(subscription.dead_letters.unwrap().received(), 0);

    manager.stop(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_reports_timeout_for_stuck_handler() {
    struct Stuck;

    #[async_trait]
    impl MessageHandler for Stuck {
        async fn handle(&self, _: &Delivery, _: CancellationToken) -> Result<(), HandlerError> {
            // Ignores cancellation.
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    let (broker, manager) = harness(Duration::from_secs(7200)).await;
    manager
        .subscribe("stuck", "#", EVENTS_EXCHANGE, Stuck, None)
        .await
        .unwrap();
    broker.publish(EVENTS_EXCHANGE, "a.b", b"{}").await.unwrap();
    assert!(eventually(Duration::from_secs(5), || async { broker.unacked().await == 1 }).await);

    let err = manager.stop(Duration::from_millis(100)).await.unwrap_err();
    assert!(matches!(err, MessagingError::ShutdownTimeout));
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_after_stop_fails() {
    let (_broker, manager) = harness(Duration::from_secs(1)).await;
    manager.stop(Duration::from_secs(1)).await.unwrap();

    let err = manager
        .subscribe(
            "late",
            "#",
            EVENTS_EXCHANGE,
            Decoding(Arc::new(Recorder::default())),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MessagingError::Closed));
}
