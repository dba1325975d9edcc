//! WebSocket session lifecycle: one subscriber from upgrade to teardown.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocket;
use futures::StreamExt;
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::{
    ConnectionState, PumpConfig, ReadOutcome, WriteOutcome, read_pump, write_pump,
};
use crate::hub::HubHandle;
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};

/// How long teardown waits for the writer to flush and send its close frame.
const WRITER_GRACE: Duration = Duration::from_secs(2);

/// Session parameters taken from server configuration.
#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    /// Keep-alive timing.
    pub pump: PumpConfig,
    /// Capacity of the subscriber's outbound queue.
    pub send_queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pump: PumpConfig::default(),
            send_queue_capacity: 256,
        }
    }
}

/// Run a subscriber session until either pump stops or the server shuts down.
///
/// Teardown always unregisters from the hub. When the hub itself closed the
/// queue (eviction), the writer is given a short grace period to flush what
/// was already queued and send its close frame.
#[instrument(skip_all, fields(conn_id = %state.id))]
pub async fn run_ws_session(
    ws: WebSocket,
    state: Arc<ConnectionState>,
    hub: HubHandle,
    config: SessionConfig,
    shutdown: CancellationToken,
) {
    let (sink, stream) = ws.split();
    let (tx, rx) = mpsc::channel(config.send_queue_capacity.max(1));

    if let Err(e) = hub.register(Arc::clone(&state), tx).await {
        warn!(error = %e, "could not register subscriber");
        return;
    }
    info!("subscriber connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let cancel = shutdown.child_token();
    let mut writer = tokio::spawn(write_pump(
        sink,
        rx,
        Arc::clone(&state),
        config.pump,
        cancel.clone(),
    ));

    let mut writer_done = None;
    tokio::select! {
        outcome = read_pump(stream, &state, cancel.clone()) => {
            match &outcome {
                ReadOutcome::Error(e) => debug!(error = %e, "read failed"),
                other => debug!(outcome = ?other, "reader stopped"),
            }
        }
        joined = &mut writer => {
            let outcome = joined.unwrap_or_else(|e| WriteOutcome::WriteFailed(e.to_string()));
            debug!(?outcome, "writer stopped");
            writer_done = Some(outcome);
        }
    }

    // Let the writer flush and close on its own if the hub already closed
    // its queue; otherwise stop it now.
    if writer_done.is_none() && !state.is_evicted() {
        cancel.cancel();
    }
    let _ = hub.unregister(state.id.clone()).await;
    if writer_done.is_none() && tokio::time::timeout(WRITER_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }
    cancel.cancel();

    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    info!(
        evicted = state.is_evicted(),
        connected_secs = (chrono::Utc::now() - state.connected_at).num_seconds(),
        "subscriber disconnected"
    );
}
