// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Redis Streams broker tests. Require TEST_REDIS_URL.

mod common;

use hostara_messaging::{Broker, DlqConfig, QueueBinding, RedisBroker};
use hostara_protocol::ExchangeConfig;
use hostara_protocol::topology::{DEAD_LETTER_EXCHANGE, EVENTS_EXCHANGE, dlq_routing_key};
use std::time::Duration;
use uuid::Uuid;

async fn broker(url: &str, prefix: &str, consumer: &str) -> RedisBroker {
    let client = redis::Client::open(url).unwrap();
    let conn = redis::aio::ConnectionManager::new(client).await.unwrap();
    let broker = RedisBroker::with_connection(conn, prefix, consumer);
    for exchange in ExchangeConfig::defaults() {
        broker.declare_exchange(&exchange).await.unwrap();
    }
    broker
}

fn prefix() -> String {
    format!("hostara-test-{}", Uuid::new_v4())
}

#[tokio::test]
async fn test_publish_receive_ack() {
    let url = skip_if_no_redis!();
    let prefix = prefix();
    let broker = broker(&url, &prefix, "c1").await;

    broker
        .bind_queue(&QueueBinding::new("results", EVENTS_EXCHANGE, "server.provision.*"))
        .await
        .unwrap();
    broker
        .publish(EVENTS_EXCHANGE, "server.provision.succeeded", b"{\"ok\":true}")
        .await
        .unwrap();
    broker
        .publish(EVENTS_EXCHANGE, "server.updated", b"ignored")
        .await
        .unwrap();

    let delivery = broker.try_receive("results").await.unwrap().unwrap();
    assert_eq!(delivery.routing_key, "server.provision.succeeded");
    assert_eq!(delivery.body, b"{\"ok\":true}");
    assert_eq!(delivery.attempt, 1);
    broker.ack(&delivery).await.unwrap();

    assert!(broker.try_receive("results").await.unwrap().is_none());
}

#[tokio::test]
async fn test_requeue_and_reject_to_dlq() {
    let url = skip_if_no_redis!();
    let prefix = prefix();
    let broker = broker(&url, &prefix, "c1").await;

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

    let first = broker.try_receive("q").await.unwrap().unwrap();
    broker.requeue(&first).await.unwrap();
    let second = broker.try_receive("q").await.unwrap().unwrap();
    assert_eq!(second.attempt, 2);
    broker.reject(&second).await.unwrap();

    assert!(broker.try_receive("q").await.unwrap().is_none());
    let dead = broker.try_receive("q.dlq").await.unwrap().unwrap();
    assert_eq!(dead.body, b"poison");
}

#[tokio::test]
async fn test_pending_entries_recovered_after_restart() {
    let url = skip_if_no_redis!();
    let prefix = prefix();

    let crashed = broker(&url, &prefix, "worker-1").await;
    crashed
        .bind_queue(&QueueBinding::new("work", EVENTS_EXCHANGE, "#"))
        .await
        .unwrap();
    crashed.publish(EVENTS_EXCHANGE, "job", b"1").await.unwrap();
    let lost = crashed.try_receive("work").await.unwrap().unwrap();

    // Same consumer name, fresh process: the unsettled entry comes back first.
    let restarted = broker(&url, &prefix, "worker-1").await;
    let recovered = restarted.try_receive("work").await.unwrap().unwrap();
    assert_eq!(recovered.tag, lost.tag);
    restarted.ack(&recovered).await.unwrap();
    assert!(restarted.try_receive("work").await.unwrap().is_none());
}

#[tokio::test]
async fn test_unsettled_delivery_is_reclaimed_after_idle() {
    let url = skip_if_no_redis!();
    let prefix = prefix();

    let stuck = broker(&url, &prefix, "worker-1")
        .await
        .with_claim_idle(Duration::from_millis(100));
    stuck
        .bind_queue(&QueueBinding::new("work", EVENTS_EXCHANGE, "#"))
        .await
        .unwrap();
    stuck.publish(EVENTS_EXCHANGE, "job", b"1").await.unwrap();

    // Received but never settled, as when an ack fails.
    let unsettled = stuck.try_receive("work").await.unwrap().unwrap();
    assert!(stuck.try_receive("work").await.unwrap().is_none());

    // Another consumer, same process lifetime: no restart needed.
    let peer = broker(&url, &prefix, "worker-2")
        .await
        .with_claim_idle(Duration::from_millis(100));
    tokio::time::sleep(Duration::from_millis(250)).await;
    let reclaimed = peer.try_receive("work").await.unwrap().unwrap();
    assert_eq!(reclaimed.tag, unsettled.tag);
    assert_eq!(reclaimed.body, b"1");
    peer.ack(&reclaimed).await.unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(stuck.try_receive("work").await.unwrap().is_none());
    assert!(peer.try_receive("work").await.unwrap().is_none());
}
