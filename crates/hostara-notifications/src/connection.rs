// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-connection read and write loops.
//!
//! The read loop only keeps the connection alive: every pong pushes the read
//! deadline out by `pong_wait`, anything else from the client is ignored.
//! The write loop drains the hub's outbound queue and pings every
//! `ping_interval`. When either loop ends the connection's token is
//! cancelled, which ends the other, and the client is unregistered.

use std::fmt::Display;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::hub::{Client, Hub};

/// Keep-alive and framing limits for client connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// How often the server pings. Must be shorter than `pong_wait`.
    pub ping_interval: Duration,
    /// How long the connection may stay silent before it is closed.
    pub pong_wait: Duration,
    /// Limit on a single frame write.
    pub write_wait: Duration,
    /// Largest frame accepted from the client, in bytes.
    pub max_message_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(50),
            pong_wait: Duration::from_secs(60),
            write_wait: Duration::from_secs(10),
            max_message_size: 524_288,
        }
    }
}

/// Serve an upgraded WebSocket for a registered client until it closes.
pub async fn serve(socket: WebSocket, client: Client, hub: Hub, config: ConnectionConfig) {
    let (sink, stream) = socket.split();
    run(sink, stream, client, &hub, &config).await;
}

/// Drive both loops over an already split connection.
pub async fn run<W, R, E>(sink: W, stream: R, client: Client, hub: &Hub, config: &ConnectionConfig)
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let Client {
        id,
        owner,
        outbound,
        cancel,
    } = client;
    info!(%owner, client_id = %id, "Client connected");

    tokio::join!(
        async {
            read_loop(stream, &cancel, config).await;
            cancel.cancel();
        },
        async {
            write_loop(sink, outbound, &cancel, config).await;
            cancel.cancel();
        },
    );

    hub.unregister(owner, id).await;
    info!(%owner, client_id = %id, "Client disconnected");
}

async fn read_loop<R, E>(mut stream: R, cancel: &CancellationToken, config: &ConnectionConfig)
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mut deadline = Instant::now() + config.pong_wait;
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return,
            frame = tokio::time::timeout_at(deadline, stream.next()) => frame,
        };
        match frame {
            Err(_) => {
                debug!("Pong deadline exceeded");
                return;
            }
            Ok(None) | Ok(Some(Ok(Message::Close(_)))) => return,
            Ok(Some(Err(e))) => {
                debug!(error = %e, "Read failed");
                return;
            }
            Ok(Some(Ok(Message::Pong(_)))) => deadline = Instant::now() + config.pong_wait,
            Ok(Some(Ok(Message::Text(text)))) if text.len() > config.max_message_size => {
                debug!(size = text.len(), "Client frame too large");
                return;
            }
            Ok(Some(Ok(Message::Binary(data)))) if data.len() > config.max_message_size => {
                debug!(size = data.len(), "Client frame too large");
                return;
            }
            Ok(Some(Ok(_))) => {}
        }
    }
}

async fn write_loop<W>(
    mut sink: W,
    mut outbound: tokio::sync::mpsc::Receiver<String>,
    cancel: &CancellationToken,
    config: &ConnectionConfig,
) where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let mut ping = tokio::time::interval_at(
        Instant::now() + config.ping_interval,
        config.ping_interval,
    );
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            data = outbound.recv() => match data {
                Some(data) => {
                    if !write(&mut sink, Message::Text(data.into()), config.write_wait).await {
                        return;
                    }
                }
                // Dropped by the hub.
                None => break,
            },
            _ = ping.tick() => {
                if !write(&mut sink, Message::Ping(Bytes::new()), config.write_wait).await {
                    return;
                }
            }
        }
    }
    let _ = write(&mut sink, Message::Close(None), config.write_wait).await;
}

async fn write<W>(sink: &mut W, message: Message, wait: Duration) -> bool
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    match tokio::time::timeout(wait, sink.send(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(error = %e, "Write failed");
            false
        }
        Err(_) => {
            debug!("Write deadline exceeded");
            false
        }
    }
}
