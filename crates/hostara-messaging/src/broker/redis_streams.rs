// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Redis Streams broker.
//!
//! Layout under the key prefix:
//! - `<prefix>:exchanges`: hash of exchange name to kind
//! - `<prefix>:bindings:<exchange>`: set of JSON `{queue, routingKey}`
//! - `<prefix>:dead_letters`: hash of queue name to JSON dead-letter route
//! - `<prefix>:queue:<queue>`: stream of `{routing_key, body, attempt}` entries
//!
//! Each queue is consumed through one consumer group, so several processes
//! subscribing to the same queue compete for messages. Entries stay pending
//! in the group until settled; on the first receive after startup a consumer
//! re-reads its own pending entries before taking new ones. Entries left
//! unsettled for longer than `claim_idle`, by a failed settle or a consumer
//! that went away, are reclaimed with `XAUTOCLAIM` and delivered again.

use async_trait::async_trait;
use hostara_protocol::{ExchangeConfig, ExchangeKind};
use redis::aio::ConnectionManager;
use redis::streams::{StreamAutoClaimReply, StreamId, StreamReadReply};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{Broker, DeadLetter, Delivery, QueueBinding};
use crate::error::MessagingError;
use crate::routing::binding_matches;

const GROUP: &str = "hostara";
const DEFAULT_PREFIX: &str = "hostara";
const DEFAULT_CLAIM_IDLE: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredBinding {
    queue: String,
    routing_key: String,
}

/// Broker backed by Redis Streams consumer groups.
pub struct RedisBroker {
    conn: ConnectionManager,
    prefix: String,
    consumer: String,
    /// Queues whose consumer group is known to exist.
    groups: Mutex<HashSet<String>>,
    /// Queues whose pending entries have already been re-read.
    recovered: Mutex<HashSet<String>>,
    claim_idle: Duration,
    /// Earliest time each queue is scanned again for idle entries.
    next_claim: Mutex<HashMap<String, Instant>>,
    closed: AtomicBool,
}

impl RedisBroker {
    /// Connect to `url` and consume as `consumer` within each queue's group.
    pub async fn connect(url: &str, consumer: impl Into<String>) -> Result<Self, MessagingError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        let consumer = consumer.into();
        info!(consumer = %consumer, "Connected to Redis broker");
        Ok(Self::with_connection(conn, DEFAULT_PREFIX, consumer))
    }

    pub fn with_connection(
        conn: ConnectionManager,
        prefix: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
            consumer: consumer.into(),
            groups: Mutex::new(HashSet::new()),
            recovered: Mutex::new(HashSet::new()),
            claim_idle: DEFAULT_CLAIM_IDLE,
            next_claim: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Reclaim deliveries that stayed unsettled for `idle`. Must be longer
    /// than any handler runs.
    pub fn with_claim_idle(mut self, idle: Duration) -> Self {
        self.claim_idle = idle;
        self
    }

    fn exchanges_key(&self) -> String {
        format!("{}:exchanges", self.prefix)
    }

    fn bindings_key(&self, exchange: &str) -> String {
        format!("{}:bindings:{}", self.prefix, exchange)
    }

    fn dead_letters_key(&self) -> String {
        format!("{}:dead_letters", self.prefix)
    }

    fn stream_key(&self, queue: &str) -> String {
        format!("{}:queue:{}", self.prefix, queue)
    }

    fn ensure_open(&self) -> Result<(), MessagingError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MessagingError::Closed);
        }
        Ok(())
    }

    async fn ensure_group(&self, queue: &str) -> Result<(), MessagingError> {
        let mut groups = self.groups.lock().await;
        if groups.contains(queue) {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let created: redis::RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(self.stream_key(queue))
            .arg(GROUP)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match created {
            Ok(()) => debug!(queue, "Created consumer group"),
            Err(e) if e.code() == Some("BUSYGROUP") => {}
            Err(e) => return Err(e.into()),
        }
        groups.insert(queue.to_string());
        Ok(())
    }

    async fn append(
        &self,
        queue: &str,
        routing_key: &str,
        body: &[u8],
        attempt: u32,
    ) -> Result<(), MessagingError> {
        let mut conn = self.conn.clone();
        let _id: String = redis::cmd("XADD")
            .arg(self.stream_key(queue))
            .arg("*")
            .arg("routing_key")
            .arg(routing_key)
            .arg("body")
            .arg(body)
            .arg("attempt")
            .arg(attempt)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn remove(&self, queue: &str, tag: &str) -> Result<(), MessagingError> {
        let mut conn = self.conn.clone();
        let key = self.stream_key(queue);
        let _: () = redis::pipe()
            .atomic()
            .cmd("XACK")
            .arg(&key)
            .arg(GROUP)
            .arg(tag)
            .ignore()
            .cmd("XDEL")
            .arg(&key)
            .arg(tag)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn read_one(&self, queue: &str, start: &str) -> Result<Option<StreamId>, MessagingError> {
        let mut conn = self.conn.clone();
        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(GROUP)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(1)
            .arg("STREAMS")
            .arg(self.stream_key(queue))
            .arg(start)
            .query_async(&mut conn)
            .await?;
        Ok(reply
            .and_then(|r| r.keys.into_iter().next())
            .and_then(|k| k.ids.into_iter().next()))
    }

    /// Take over one entry of `queue` that no consumer settled within
    /// `claim_idle`, if a scan is due.
    async fn claim_idle_entry(&self, queue: &str) -> Result<Option<StreamId>, MessagingError> {
        let now = Instant::now();
        if self
            .next_claim
            .lock()
            .await
            .get(queue)
            .is_some_and(|due| *due > now)
        {
            return Ok(None);
        }

        let mut conn = self.conn.clone();
        let reply: StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(self.stream_key(queue))
            .arg(GROUP)
            .arg(&self.consumer)
            .arg(u64::try_from(self.claim_idle.as_millis()).unwrap_or(u64::MAX))
            .arg("0-0")
            .arg("COUNT")
            .arg(1)
            .query_async(&mut conn)
            .await?;

        let claimed = reply.claimed.into_iter().next();
        match &claimed {
            Some(entry) => info!(queue, tag = %entry.id, "Reclaimed idle delivery"),
            // Scan again once the next entry could have gone idle.
            None => {
                self.next_claim
                    .lock()
                    .await
                    .insert(queue.to_string(), now + self.claim_idle / 2);
            }
        }
        Ok(claimed)
    }

    fn to_delivery(queue: &str, entry: &StreamId) -> Result<Delivery, MessagingError> {
        let malformed = || MessagingError::MalformedMessage {
            queue: queue.to_string(),
            tag: entry.id.clone(),
        };
        Ok(Delivery {
            queue: queue.to_string(),
            routing_key: entry.get::<String>("routing_key").ok_or_else(malformed)?,
            body: entry.get::<Vec<u8>>("body").ok_or_else(malformed)?,
            tag: entry.id.clone(),
            attempt: entry.get::<u32>("attempt").unwrap_or(1),
        })
    }

    async fn route(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<usize, MessagingError> {
        let mut conn = self.conn.clone();
        let kind: Option<String> = redis::cmd("HGET")
            .arg(self.exchanges_key())
            .arg(exchange)
            .query_async(&mut conn)
            .await?;
        let kind = kind
            .as_deref()
            .and_then(ExchangeKind::parse)
            .ok_or_else(|| MessagingError::UnknownExchange(exchange.to_string()))?;

        let members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(self.bindings_key(exchange))
            .query_async(&mut conn)
            .await?;

        let mut routed = 0;
        for member in members {
            let binding: StoredBinding = serde_json::from_str(&member)?;
            if binding_matches(kind, &binding.routing_key, routing_key) {
                self.append(&binding.queue, routing_key, body, 1).await?;
                routed += 1;
            }
        }
        Ok(routed)
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn declare_exchange(&self, exchange: &ExchangeConfig) -> Result<(), MessagingError> {
        self.ensure_open()?;
        let mut conn = self.conn.clone();
        let created: bool = redis::cmd("HSETNX")
            .arg(self.exchanges_key())
            .arg(&exchange.name)
            .arg(exchange.kind.as_str())
            .query_async(&mut conn)
            .await?;
        if created {
            return Ok(());
        }
        let existing: Option<String> = redis::cmd("HGET")
            .arg(self.exchanges_key())
            .arg(&exchange.name)
            .query_async(&mut conn)
            .await?;
        match existing.as_deref().and_then(ExchangeKind::parse) {
            Some(kind) if kind == exchange.kind => Ok(()),
            Some(kind) => Err(MessagingError::ExchangeMismatch {
                name: exchange.name.clone(),
                existing: kind.as_str(),
            }),
            None => Err(MessagingError::Broker(format!(
                "exchange '{}' has an unreadable kind",
                exchange.name
            ))),
        }
    }

    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), MessagingError> {
        self.ensure_open()?;
        let mut conn = self.conn.clone();
        let declared: bool = redis::cmd("HEXISTS")
            .arg(self.exchanges_key())
            .arg(&binding.exchange)
            .query_async(&mut conn)
            .await?;
        if !declared {
            return Err(MessagingError::UnknownExchange(binding.exchange.clone()));
        }

        self.ensure_group(&binding.queue).await?;

        let member = serde_json::to_string(&StoredBinding {
            queue: binding.queue.clone(),
            routing_key: binding.routing_key.clone(),
        })?;
        let _added: i64 = redis::cmd("SADD")
            .arg(self.bindings_key(&binding.exchange))
            .arg(member)
            .query_async(&mut conn)
            .await?;

        if let Some(dead_letter) = &binding.dead_letter {
            let _set: i64 = redis::cmd("HSET")
                .arg(self.dead_letters_key())
                .arg(&binding.queue)
                .arg(serde_json::to_string(dead_letter)?)
                .query_async(&mut conn)
                .await?;
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), MessagingError> {
        self.ensure_open()?;
        let routed = self.route(exchange, routing_key, body).await?;
        if routed == 0 {
            debug!(exchange, routing_key, "Message matched no bindings");
        }
        Ok(())
    }

    async fn try_receive(&self, queue: &str) -> Result<Option<Delivery>, MessagingError> {
        self.ensure_open()?;
        self.ensure_group(queue).await?;

        loop {
            let recovering = !self.recovered.lock().await.contains(queue);
            let entry = if recovering {
                match self.read_one(queue, "0").await? {
                    Some(entry) => entry,
                    None => {
                        self.recovered.lock().await.insert(queue.to_string());
                        continue;
                    }
                }
            } else if let Some(entry) = self.claim_idle_entry(queue).await? {
                entry
            } else {
                match self.read_one(queue, ">").await? {
                    Some(entry) => entry,
                    None => return Ok(None),
                }
            };

            match Self::to_delivery(queue, &entry) {
                Ok(delivery) => return Ok(Some(delivery)),
                Err(e) => {
                    // Pending entry whose payload was deleted or never written.
                    warn!(error = %e, "Dropping malformed stream entry");
                    self.remove(queue, &entry.id).await?;
                }
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), MessagingError> {
        self.ensure_open()?;
        self.remove(&delivery.queue, &delivery.tag).await
    }

    async fn requeue(&self, delivery: &Delivery) -> Result<(), MessagingError> {
        self.ensure_open()?;
        self.append(
            &delivery.queue,
            &delivery.routing_key,
            &delivery.body,
            delivery.attempt + 1,
        )
        .await?;
        self.remove(&delivery.queue, &delivery.tag).await
    }

    async fn reject(&self, delivery: &Delivery) -> Result<(), MessagingError> {
        self.ensure_open()?;
        let mut conn = self.conn.clone();
        let route: Option<String> = redis::cmd("HGET")
            .arg(self.dead_letters_key())
            .arg(&delivery.queue)
            .query_async(&mut conn)
            .await?;

        match route {
            Some(raw) => {
                let dead_letter: DeadLetter = serde_json::from_str(&raw)?;
                self.route(&dead_letter.exchange, &dead_letter.routing_key, &delivery.body)
                    .await?;
            }
            None => warn!(
                queue = %delivery.queue,
                routing_key = %delivery.routing_key,
                "Rejected message discarded, no dead-letter route"
            ),
        }
        self.remove(&delivery.queue, &delivery.tag).await
    }

    async fn close(&self) -> Result<(), MessagingError> {
        self.closed.store(true, Ordering::SeqCst);
        info!(consumer = %self.consumer, "Redis broker closed");
        Ok(())
    }
}
