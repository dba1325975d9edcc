//! Broadcast hub: the single owner of the subscriber set.
//!
//! All membership changes and broadcasts go through one ordered command
//! channel and are applied one at a time by the hub loop. Delivery to a
//! subscriber is a non-blocking `try_send` onto its bounded queue; a full or
//! closed queue evicts that subscriber without touching the others.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pesa_core::{ConnectionId, EventKind, PaymentEvent};

use crate::metrics::{EVENTS_BROADCAST_TOTAL, WS_EVICTIONS_TOTAL};
use crate::websocket::ConnectionState;

/// Depth of the hub's command channel.
pub const COMMAND_CAPACITY: usize = 1024;

/// Errors returned by [`HubHandle`].
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The hub loop has stopped.
    #[error("broadcast hub is not running")]
    Closed,
    /// The event could not be serialized.
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Snapshot entry returned by [`HubHandle::list_clients`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    /// Connection ID.
    pub id: ConnectionId,
    /// When the connection was established.
    pub connected_at: DateTime<Utc>,
}

enum Command {
    Register {
        state: Arc<ConnectionState>,
        tx: mpsc::Sender<Arc<String>>,
    },
    Unregister {
        id: ConnectionId,
    },
    Broadcast {
        kind: EventKind,
        payload: Arc<String>,
    },
    ListClients {
        reply: oneshot::Sender<Vec<ClientInfo>>,
    },
}

struct Member {
    state: Arc<ConnectionState>,
    tx: mpsc::Sender<Arc<String>>,
}

/// The hub loop. Construct with [`Hub::spawn`].
pub struct Hub {
    commands: mpsc::Receiver<Command>,
    members: HashMap<ConnectionId, Member>,
    count: Arc<AtomicUsize>,
}

impl Hub {
    /// Start the hub loop on the current runtime.
    ///
    /// The loop runs until `shutdown` is cancelled or every handle is dropped.
    pub fn spawn(shutdown: CancellationToken) -> (HubHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let count = Arc::new(AtomicUsize::new(0));
        let hub = Self {
            commands: rx,
            members: HashMap::new(),
            count: Arc::clone(&count),
        };
        let handle = HubHandle { tx, count };
        let task = tokio::spawn(hub.run(shutdown));
        (handle, task)
    }

    async fn run(mut self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.apply(cmd),
                    None => break,
                },
            }
        }
        let remaining = self.members.len();
        self.members.clear();
        self.sync_count();
        info!(remaining, "broadcast hub stopped");
    }

    fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::Register { state, tx } => self.register(state, tx),
            Command::Unregister { id } => {
                if self.members.remove(&id).is_some() {
                    debug!(conn_id = %id, "client unregistered");
                }
            }
            Command::Broadcast { kind, payload } => self.broadcast(kind, &payload),
            Command::ListClients { reply } => {
                let mut clients: Vec<ClientInfo> = self
                    .members
                    .values()
                    .map(|m| ClientInfo {
                        id: m.state.id.clone(),
                        connected_at: m.state.connected_at,
                    })
                    .collect();
                clients.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
                let _ = reply.send(clients);
            }
        }
        self.sync_count();
    }

    fn register(&mut self, state: Arc<ConnectionState>, tx: mpsc::Sender<Arc<String>>) {
        if self.members.contains_key(&state.id) {
            warn!(conn_id = %state.id, "duplicate registration ignored");
            return;
        }
        debug!(conn_id = %state.id, "client registered");
        let _ = self.members.insert(state.id.clone(), Member { state, tx });
    }

    fn broadcast(&mut self, kind: EventKind, payload: &Arc<String>) {
        let mut evicted = Vec::new();
        for (id, member) in &self.members {
            match member.tx.try_send(Arc::clone(payload)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(conn_id = %id, event_type = %kind, "send queue full, evicting slow client");
                    member.state.mark_evicted();
                    evicted.push(id.clone());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(conn_id = %id, "send queue closed, removing client");
                    evicted.push(id.clone());
                }
            }
        }
        for id in &evicted {
            let _ = self.members.remove(id);
            counter!(WS_EVICTIONS_TOTAL).increment(1);
        }
        counter!(EVENTS_BROADCAST_TOTAL, "type" => kind.as_str()).increment(1);
        debug!(
            event_type = %kind,
            recipients = self.members.len(),
            evicted = evicted.len(),
            "event broadcast"
        );
    }

    fn sync_count(&self) {
        self.count.store(self.members.len(), Ordering::Relaxed);
    }
}

/// Cloneable handle used by sessions and adapters to talk to the hub.
#[derive(Clone, Debug)]
pub struct HubHandle {
    tx: mpsc::Sender<Command>,
    count: Arc<AtomicUsize>,
}

impl HubHandle {
    /// Add a subscriber. It receives only events broadcast after this call.
    ///
    /// Registering an ID that is already present is ignored and `queue` is
    /// dropped, which closes the caller's receiver.
    pub async fn register(
        &self,
        state: Arc<ConnectionState>,
        queue: mpsc::Sender<Arc<String>>,
    ) -> Result<(), HubError> {
        self.send(Command::Register { state, tx: queue }).await
    }

    /// Remove a subscriber and close its queue. Unknown IDs are a no-op.
    pub async fn unregister(&self, id: ConnectionId) -> Result<(), HubError> {
        self.send(Command::Unregister { id }).await
    }

    /// Serialize `event` once and fan it out to every current subscriber.
    pub async fn broadcast(&self, event: &PaymentEvent) -> Result<(), HubError> {
        let payload = Arc::new(event.to_json()?);
        self.send(Command::Broadcast {
            kind: event.kind,
            payload,
        })
        .await
    }

    /// Point-in-time snapshot of the subscriber set, ordered by ID.
    pub async fn list_clients(&self) -> Result<Vec<ClientInfo>, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ListClients { reply }).await?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Number of subscribers as of the last command the hub applied.
    pub fn client_count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// Whether the hub loop is still accepting commands.
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    async fn send(&self, cmd: Command) -> Result<(), HubError> {
        self.tx.send(cmd).await.map_err(|_| HubError::Closed)
    }
}
