// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Connection registry owned by a single coordinating task.
//!
//! The owner-to-connections map lives inside [`Hub::start`]'s loop and is
//! only touched through [`Command`]s sent over its queue. [`Hub`] itself is
//! a cheap handle that can be cloned into HTTP handlers and senders.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TrackedFuture;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::HubError;

/// Hub sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Pending commands (sends, registrations) the hub queue holds.
    pub command_buffer: usize,
    /// Outbound messages buffered per connection before it counts as slow.
    pub client_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            command_buffer: 256,
            client_buffer: 256,
        }
    }
}

enum Command {
    Register {
        owner: Uuid,
        id: Uuid,
        outbound: mpsc::Sender<String>,
        cancel: CancellationToken,
    },
    Unregister {
        owner: Uuid,
        id: Uuid,
    },
    Send {
        owner: Uuid,
        data: String,
    },
    Count {
        owner: Uuid,
        reply: oneshot::Sender<usize>,
    },
}

/// A registered connection's end of the hub.
///
/// `outbound` yields the messages addressed to `owner`; it closes when the
/// hub drops the connection. `cancel` fires on hub shutdown or when the
/// connection is dropped as a slow consumer.
pub struct Client {
    pub id: Uuid,
    pub owner: Uuid,
    pub outbound: mpsc::Receiver<String>,
    pub cancel: CancellationToken,
}

/// Handle to a running hub.
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::Sender<Command>,
    client_buffer: usize,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Hub {
    /// Spawn the coordinating loop.
    pub fn start(config: &HubConfig) -> Self {
        let (commands, queue) = mpsc::channel(config.command_buffer.max(1));
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        tracker.spawn(run(queue, shutdown.clone()));
        Self {
            commands,
            client_buffer: config.client_buffer.max(1),
            shutdown,
            tracker,
        }
    }

    /// Add a connection for `owner`.
    pub async fn register(&self, owner: Uuid) -> Result<Client, HubError> {
        if self.shutdown.is_cancelled() {
            return Err(HubError::ShuttingDown);
        }
        let (outbound, receiver) = mpsc::channel(self.client_buffer);
        let id = Uuid::new_v4();
        let cancel = self.shutdown.child_token();
        self.commands
            .send(Command::Register {
                owner,
                id,
                outbound,
                cancel: cancel.clone(),
            })
            .await
            .map_err(|_| HubError::ShuttingDown)?;
        Ok(Client {
            id,
            owner,
            outbound: receiver,
            cancel,
        })
    }

    /// Remove a connection. Unknown ids and a stopped hub are ignored.
    pub async fn unregister(&self, owner: Uuid, id: Uuid) {
        if self
            .commands
            .send(Command::Unregister { owner, id })
            .await
            .is_err()
        {
            debug!(%owner, client_id = %id, "Hub already stopped, nothing to unregister");
        }
    }

    /// Queue `data` for every connection of `owner`. Never waits.
    pub fn send(&self, owner: Uuid, data: String) -> Result<(), HubError> {
        if self.shutdown.is_cancelled() {
            return Err(HubError::ShuttingDown);
        }
        match self.commands.try_send(Command::Send { owner, data }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(HubError::Full),
            Err(TrySendError::Closed(_)) => Err(HubError::ShuttingDown),
        }
    }

    /// Number of live connections for `owner`, as seen by the hub loop after
    /// every command queued before this call.
    pub async fn connections(&self, owner: Uuid) -> Result<usize, HubError> {
        let (reply, count) = oneshot::channel();
        self.commands
            .send(Command::Count { owner, reply })
            .await
            .map_err(|_| HubError::ShuttingDown)?;
        count.await.map_err(|_| HubError::ShuttingDown)
    }

    /// True once [`Hub::stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Have [`Hub::stop`] wait for `future`, typically a connection's loops.
    pub fn track<F: Future>(&self, future: F) -> TrackedFuture<F> {
        self.tracker.track_future(future)
    }

    /// Cancel every connection and wait up to `timeout` for the hub loop and
    /// all tracked connections to finish.
    pub async fn stop(&self, timeout: Duration) -> Result<(), HubError> {
        info!("Stopping notification hub");
        self.shutdown.cancel();
        self.tracker.close();

        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => {
                info!("Notification hub stopped");
                Ok(())
            }
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Connections did not close in time"
                );
                Err(HubError::ShutdownTimeout)
            }
        }
    }
}

struct Registration {
    outbound: mpsc::Sender<String>,
    cancel: CancellationToken,
}

async fn run(mut queue: mpsc::Receiver<Command>, shutdown: CancellationToken) {
    let mut clients: HashMap<Uuid, HashMap<Uuid, Registration>> = HashMap::new();

    loop {
        let command = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            command = queue.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };

        match command {
            Command::Register {
                owner,
                id,
                outbound,
                cancel,
            } => {
                clients
                    .entry(owner)
                    .or_default()
                    .insert(id, Registration { outbound, cancel });
                debug!(%owner, client_id = %id, "Client registered");
            }
            Command::Unregister { owner, id } => {
                if let Some(connections) = clients.get_mut(&owner) {
                    if let Some(registration) = connections.remove(&id) {
                        registration.cancel.cancel();
                        debug!(%owner, client_id = %id, "Client unregistered");
                    }
                    if connections.is_empty() {
                        clients.remove(&owner);
                    }
                }
            }
            Command::Send { owner, data } => {
                let Some(connections) = clients.get_mut(&owner) else {
                    debug!(%owner, "No connections for owner, dropping message");
                    continue;
                };
                connections.retain(|id, registration| {
                    match registration.outbound.try_send(data.clone()) {
                        Ok(()) => true,
                        Err(TrySendError::Full(_)) => {
                            warn!(%owner, client_id = %id, "Client buffer full, dropping connection");
                            registration.cancel.cancel();
                            false
                        }
                        Err(TrySendError::Closed(_)) => {
                            debug!(%owner, client_id = %id, "Client gone, removing");
                            registration.cancel.cancel();
                            false
                        }
                    }
                });
                if connections.is_empty() {
                    clients.remove(&owner);
                }
            }
            Command::Count { owner, reply } => {
                let _ = reply.send(clients.get(&owner).map_or(0, HashMap::len));
            }
        }
    }

    let remaining: usize = clients.values().map(HashMap::len).sum();
    for registration in clients.into_values().flat_map(HashMap::into_values) {
        registration.cancel.cancel();
    }
    info!(connections = remaining, "Hub loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    #[tokio::test]
    async fn test_send_reaches_only_the_owners_connections() {
        let hub = Hub::start(&HubConfig::default());
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let mut first = hub.register(alice).await.unwrap();
        let mut second = hub.register(alice).await.unwrap();
        let mut other = hub.register(bob).await.unwrap();

        hub.send(alice, "update".into()).unwrap();
        assert_eq!(hub.connections(alice).await.unwrap(), 2);

        assert_eq!(first.outbound.recv().await.as_deref(), Some("update"));
        assert_eq!(second.outbound.recv().await.as_deref(), Some("update"));
        assert_eq!(other.outbound.try_recv(), Err(TryRecvError::Empty));

        hub.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_slow_connection_is_dropped() {
        let hub = Hub::start(&HubConfig {
            command_buffer: 16,
            client_buffer: 1,
        });
        let owner = Uuid::new_v4();
        let mut slow = hub.register(owner).await.unwrap();
        let mut fast = hub.register(owner).await.unwrap();

        hub.send(owner, "one".into()).unwrap();
        assert_eq!(fast.outbound.recv().await.as_deref(), Some("one"));
        hub.send(owner, "two".into()).unwrap();
        assert_eq!(hub.connections(owner).await.unwrap(), 1);

        assert!(slow.cancel.is_cancelled());
        assert!(!fast.cancel.is_cancelled());
        assert_eq!(slow.outbound.recv().await.as_deref(), Some("one"));
        assert_eq!(slow.outbound.recv().await, None);
        assert_eq!(fast.outbound.recv().await.as_deref(), Some("two"));

        hub.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_unregister_and_unknown_owner() {
        let hub = Hub::start(&HubConfig::default());
        let owner = Uuid::new_v4();
        let client = hub.register(owner).await.unwrap();

        hub.unregister(owner, client.id).await;
        hub.unregister(owner, client.id).await;
        assert_eq!(hub.connections(owner).await.unwrap(), 0);
        assert!(client.cancel.is_cancelled());

        // Nobody listening is not an error.
        hub.send(Uuid::new_v4(), "ignored".into()).unwrap();
        hub.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_fails_fast_when_queue_is_full() {
        let hub = Hub::start(&HubConfig {
            command_buffer: 1,
            client_buffer: 16,
        });
        let owner = Uuid::new_v4();

        // The hub loop has not been polled yet on this single-threaded runtime.
        hub.send(owner, "first".into()).unwrap();
        assert_eq!(hub.send(owner, "second".into()), Err(HubError::Full));

        hub.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_cancels_connections_and_rejects_work() {
        let hub = Hub::start(&HubConfig::default());
        let owner = Uuid::new_v4();
        let mut client = hub.register(owner).await.unwrap();

        assert!(!hub.is_stopped());
        hub.stop(Duration::from_secs(1)).await.unwrap();

        assert!(hub.is_stopped());
        assert!(client.cancel.is_cancelled());
        assert_eq!(client.outbound.recv().await, None);
        assert_eq!(hub.send(owner, "late".into()), Err(HubError::ShuttingDown));
        assert!(matches!(
            hub.register(owner).await,
            Err(HubError::ShuttingDown)
        ));
        // Unregistering after shutdown is harmless.
        hub.unregister(owner, client.id).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_reports_timeout_for_stuck_connections() {
        let hub = Hub::start(&HubConfig::default());
        tokio::spawn(hub.track(std::future::pending::<()>()));

        assert_eq!(
            hub.stop(Duration::from_millis(100)).await,
            Err(HubError::ShutdownTimeout)
        );
    }
}
