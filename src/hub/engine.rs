//! Hub engine
//!
//! The hub is the single authority over which connections are registered
//! and the only place broadcasts are dispatched from. It runs as one task:
//! - registrations, unregistrations, membership queries and publishes
//!   arrive through separate intakes owned by `HubHandle`
//! - the dispatch loop is the only code that reads or writes `members`, so
//!   the registry needs no lock
//! - a publish offers the payload to every member with a non-blocking
//!   `try_send`; a member whose queue is full is evicted on the spot
//!
//! Dropping a member's `Client` closes its outbound queue, which is the
//! signal its connection uses to send a Close frame and tear down.

use std::collections::HashMap;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::client::{Client, ClientId};
use crate::config::HubSettings;
use crate::hub::message::LineageUpdate;
use crate::utils::HubError;

type MembersReply = oneshot::Sender<Vec<ClientId>>;

#[derive(Debug)]
pub struct Hub {
    members: HashMap<ClientId, Client>,
    register_rx: mpsc::Receiver<Client>,
    unregister_rx: mpsc::UnboundedReceiver<ClientId>,
    publish_rx: mpsc::Receiver<Bytes>,
    query_rx: mpsc::Receiver<MembersReply>,
    shutdown: CancellationToken,
}

/// Cloneable entry point to a running `Hub`.
///
/// Every operation is a message to the dispatch loop; none of them touch the
/// registry directly.
#[derive(Debug, Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<Client>,
    unregister_tx: mpsc::UnboundedSender<ClientId>,
    query_tx: mpsc::Sender<MembersReply>,
    publish_tx: mpsc::Sender<Bytes>,
    queue_capacity: usize,
    shutdown: CancellationToken,
}

impl Hub {
    /// Creates a hub and the handle used to reach it. The hub does nothing
    /// until `run` is awaited or spawned.
    pub fn new(settings: &HubSettings) -> (Hub, HubHandle) {
        let (register_tx, register_rx) = mpsc::channel(settings.intake_capacity);
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (query_tx, query_rx) = mpsc::channel(settings.intake_capacity);
        let (publish_tx, publish_rx) = mpsc::channel(settings.intake_capacity);
        let shutdown = CancellationToken::new();

        let hub = Hub {
            members: HashMap::new(),
            register_rx,
            unregister_rx,
            query_rx,
            publish_rx,
            shutdown: shutdown.clone(),
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            query_tx,
            publish_tx,
            queue_capacity: settings.queue_capacity,
            shutdown,
        };
        (hub, handle)
    }

    /// Creates a hub and spawns its dispatch loop on the current runtime.
    pub fn spawn(settings: &HubSettings) -> (HubHandle, JoinHandle<()>) {
        let (hub, handle) = Hub::new(settings);
        let task = tokio::spawn(hub.run());
        (handle, task)
    }

    /// The dispatch loop.
    ///
    /// Runs until `HubHandle::shutdown` is called or every handle has been
    /// dropped. On exit all remaining members are dropped, closing their
    /// queues.
    ///
    /// Each intake keeps its own order, but across intakes the loop favours
    /// shutdown, then registrations, unregistrations, publishes and finally
    /// membership queries. A registration that reaches the hub while a
    /// publish is still waiting in its intake is applied first, so the new
    /// member also receives that payload.
    pub async fn run(mut self) {
        info!("Hub started");

        loop {
            // biased: a registration already sitting in its intake is applied
            // before any publish sent after it, and a membership query sees
            // every publish sent before it
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("Hub shutdown requested");
                    break;
                }
                registration = self.register_rx.recv() => match registration {
                    Some(client) => self.register(client),
                    // every handle owns a register sender
                    None => {
                        info!("All hub handles dropped");
                        break;
                    }
                },
                Some(id) = self.unregister_rx.recv() => self.unregister(&id),
                Some(payload) = self.publish_rx.recv() => self.publish(payload),
                Some(reply) = self.query_rx.recv() => {
                    let _ = reply.send(self.member_ids());
                }
            }
        }

        let remaining = self.members.len();
        self.members.clear();
        info!("Hub stopped, closed {} client queue(s)", remaining);
    }

    fn register(&mut self, client: Client) {
        let id = client.id.clone();
        if self.members.insert(id.clone(), client).is_some() {
            warn!("Client {} registered twice, previous queue closed", id);
        }
        info!("Client {} connected. Total clients: {}", id, self.members.len());
    }

    fn unregister(&mut self, id: &ClientId) {
        if self.members.remove(id).is_some() {
            info!("Client {} disconnected. Total clients: {}", id, self.members.len());
        } else {
            debug!("Unregister for unknown client {}", id);
        }
    }

    fn publish(&mut self, payload: Bytes) {
        let offered = self.members.len();

        self.members
            .retain(|id, client| match client.sender.try_send(payload.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!("Evicting client {}: outbound queue full", id);
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Dropping client {}: connection already gone", id);
                    false
                }
            });

        let removed = offered - self.members.len();
        if removed > 0 {
            info!(
                "Removed {} client(s) during broadcast. Total clients: {}",
                removed,
                self.members.len()
            );
        }
        trace!(
            "Broadcast {} bytes to {} client(s)",
            payload.len(),
            self.members.len()
        );
    }

    fn member_ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.members.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl HubHandle {
    /// Registers `id` and returns the receiving half of its private outbound
    /// queue. Registering the same id twice replaces the earlier membership;
    /// callers must not do that.
    pub async fn register(&self, id: ClientId) -> Result<mpsc::Receiver<Bytes>, HubError> {
        let (sender, queue) = mpsc::channel(self.queue_capacity);
        self.register_tx
            .send(Client::new(id, sender))
            .await
            .map_err(|_| HubError::Closed)?;
        Ok(queue)
    }

    /// Removes `id` from the hub if it is still a member. Safe to call any
    /// number of times, including after an eviction or once the hub stopped.
    pub fn unregister(&self, id: &ClientId) {
        let _ = self.unregister_tx.send(id.clone());
    }

    /// Broadcasts an already-serialized payload to every member.
    ///
    /// Only fails when the hub is no longer running. Slow members never make
    /// this wait; they are evicted instead.
    pub async fn publish(&self, payload: impl Into<Bytes>) -> Result<(), HubError> {
        self.publish_tx
            .send(payload.into())
            .await
            .map_err(|_| HubError::Closed)
    }

    /// Serializes `value` as JSON and broadcasts it. A serialization failure
    /// is returned before anything is sent.
    pub async fn publish_json<T>(&self, value: &T) -> Result<(), HubError>
    where
        T: Serialize + ?Sized,
    {
        let payload = serde_json::to_vec(value)?;
        self.publish(payload).await
    }

    pub async fn publish_update(&self, update: &LineageUpdate) -> Result<(), HubError> {
        self.publish_json(update).await
    }

    /// Snapshot of the current members, sorted by id.
    pub async fn members(&self) -> Result<Vec<ClientId>, HubError> {
        let (reply, response) = oneshot::channel();
        self.query_tx
            .send(reply)
            .await
            .map_err(|_| HubError::Closed)?;
        response.await.map_err(|_| HubError::Closed)
    }

    /// Stops the dispatch loop. Every member queue is closed, so each
    /// connection sends a Close frame and tears itself down.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once `shutdown` has been called on any handle.
    pub async fn shutdown_requested(&self) {
        self.shutdown.cancelled().await
    }
}
