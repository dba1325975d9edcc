//! Per-subscriber connection state and the read/write pumps.

use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, close_code};
use chrono::{DateTime, Utc};
use futures::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use pesa_core::ConnectionId;

/// Close reason sent to a subscriber evicted for falling behind.
pub const SLOW_CONSUMER_REASON: &str = "slow consumer";

/// Longest time spent on a best-effort close frame.
const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

/// Shared state for one live subscriber.
///
/// The hub keeps an `Arc` of this next to the subscriber's queue sender;
/// the pumps use it for liveness and to learn why their queue closed.
#[derive(Debug)]
pub struct ConnectionState {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// When the transport handshake completed.
    pub connected_at: DateTime<Utc>,
    last_seen: Mutex<Instant>,
    evicted: AtomicBool,
}

impl ConnectionState {
    /// Fresh state with a new ID, stamped now.
    pub fn new() -> Self {
        Self::with_id(ConnectionId::new())
    }

    /// Fresh state with a caller-chosen ID.
    pub fn with_id(id: ConnectionId) -> Self {
        Self {
            id,
            connected_at: Utc::now(),
            last_seen: Mutex::new(Instant::now()),
            evicted: AtomicBool::new(false),
        }
    }

    /// Record inbound activity.
    pub fn mark_alive(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the last inbound frame (or since connect).
    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Flag this connection as evicted by the hub.
    pub fn mark_evicted(&self) {
        self.evicted.store(true, Ordering::Relaxed);
    }

    /// Whether the hub evicted this connection.
    pub fn is_evicted(&self) -> bool {
        self.evicted.load(Ordering::Relaxed)
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Keep-alive timing for the outbound pump.
#[derive(Clone, Copy, Debug)]
pub struct PumpConfig {
    /// Interval between Ping frames.
    pub heartbeat_interval: Duration,
    /// Silence longer than this ends the connection. Also bounds each write.
    pub heartbeat_timeout: Duration,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(90),
        }
    }
}

/// Why the inbound pump stopped.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The client sent a close frame.
    ClientClosed,
    /// The transport ended without a close frame.
    Eof,
    /// The transport returned an error.
    Error(String),
    /// Teardown was signalled from elsewhere.
    Cancelled,
}

/// Why the outbound pump stopped.
#[derive(Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The hub closed the queue; remaining items were flushed and a close
    /// frame sent.
    QueueClosed,
    /// No inbound activity within the heartbeat timeout.
    TimedOut,
    /// A write failed or did not complete within the timeout.
    WriteFailed(String),
    /// Teardown was signalled from elsewhere.
    Cancelled,
}

/// Drain inbound frames for liveness until close, error or cancellation.
///
/// Payloads are ignored; every frame counts as activity.
pub async fn read_pump<S, E>(
    mut stream: S,
    state: &ConnectionState,
    cancel: CancellationToken,
) -> ReadOutcome
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        tokio::select! {
            () = cancel.cancelled() => return ReadOutcome::Cancelled,
            frame = stream.next() => match frame {
                None => return ReadOutcome::Eof,
                Some(Err(e)) => return ReadOutcome::Error(e.to_string()),
                Some(Ok(Message::Close(frame))) => {
                    debug!(conn_id = %state.id, ?frame, "client sent close frame");
                    return ReadOutcome::ClientClosed;
                }
                Some(Ok(Message::Text(text))) => {
                    state.mark_alive();
                    debug!(conn_id = %state.id, len = text.as_str().len(), "ignoring inbound text");
                }
                Some(Ok(_)) => state.mark_alive(),
            },
        }
    }
}

/// Forward queued events to the transport and keep the connection alive.
///
/// This is the only writer to `sink`. When the hub closes the queue, items
/// already buffered are flushed before a close frame is sent.
pub async fn write_pump<S>(
    mut sink: S,
    mut queue: mpsc::Receiver<Arc<String>>,
    state: Arc<ConnectionState>,
    config: PumpConfig,
    cancel: CancellationToken,
) -> WriteOutcome
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut ping = tokio::time::interval_at(
        Instant::now() + config.heartbeat_interval,
        config.heartbeat_interval,
    );
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                let _ = close(&mut sink, close_code::AWAY, "server closing").await;
                return WriteOutcome::Cancelled;
            }
            item = queue.recv() => match item {
                Some(text) => {
                    let frame = Message::Text(text.as_str().into());
                    if let Err(e) = send(&mut sink, frame, config.heartbeat_timeout).await {
                        return WriteOutcome::WriteFailed(e);
                    }
                }
                None => {
                    let (code, reason) = if state.is_evicted() {
                        (close_code::POLICY, SLOW_CONSUMER_REASON)
                    } else {
                        (close_code::NORMAL, "unregistered")
                    };
                    debug!(conn_id = %state.id, code, reason, "queue closed, sending close frame");
                    let _ = close(&mut sink, code, reason).await;
                    return WriteOutcome::QueueClosed;
                }
            },
            _ = ping.tick() => {
                let idle = state.idle_for();
                if idle > config.heartbeat_timeout {
                    warn!(conn_id = %state.id, idle_secs = idle.as_secs(), "client unresponsive, disconnecting");
                    return WriteOutcome::TimedOut;
                }
                if let Err(e) = send(&mut sink, Message::Ping(Vec::new().into()), config.heartbeat_timeout).await {
                    return WriteOutcome::WriteFailed(e);
                }
            }
        }
    }
}

async fn send<S>(sink: &mut S, frame: Message, limit: Duration) -> Result<(), String>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match tokio::time::timeout(limit, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("write timed out after {limit:?}")),
    }
}

async fn close<S>(sink: &mut S, code: u16, reason: &str) -> Result<(), String>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let frame = Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }));
    send(sink, frame, CLOSE_FRAME_TIMEOUT).await
}
