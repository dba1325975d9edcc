//! WebSocket subscriber handling.
//!
//! Each subscriber runs two cooperating pumps: an inbound pump that only
//! watches for liveness and close, and an outbound pump that is the sole
//! writer to the transport. Both converge on one teardown driven by a
//! per-connection cancellation token.

pub mod connection;
pub mod session;

pub use connection::{ConnectionState, PumpConfig, ReadOutcome, WriteOutcome};
pub use session::{SessionConfig, run_ws_session};
