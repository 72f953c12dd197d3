// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared helpers for hostara-messaging integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use hostara_messaging::{InMemoryBroker, MessageManager, MessagingConfig};
use hostara_protocol::ExchangeConfig;

/// Skip test if TEST_REDIS_URL is not set.
#[macro_export]
macro_rules! skip_if_no_redis {
    () => {
        match std::env::var("TEST_REDIS_URL") {
            Ok(url) => url,
            Err(_) => {
                eprintln!("Skipping test: TEST_REDIS_URL not set");
                return;
            }
        }
    };
}

/// In-memory broker plus a manager with the default exchanges declared.
pub async fn harness(handler_timeout: Duration) -> (Arc<InMemoryBroker>, MessageManager) {
    let broker = Arc::new(InMemoryBroker::new());
    let mut config = MessagingConfig::local("test");
    config.handler_timeout = handler_timeout;
    config.poll_interval = Duration::from_millis(10);
    let manager = MessageManager::new(broker.clone(), &ExchangeConfig::defaults(), &config)
        .await
        .expect("declare exchanges");
    (broker, manager)
}

/// Poll `check` until it returns true or `limit` elapses.
pub async fn eventually<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check().await
}
