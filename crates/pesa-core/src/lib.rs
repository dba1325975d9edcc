//! # pesa-core
//!
//! Shared vocabulary for the payment-status relay:
//!
//! - **IDs**: [`ConnectionId`] for live subscriber connections
//! - **Events**: [`PaymentEvent`], the payload fanned out to subscribers, with
//!   its [`EventKind`] discriminator

#![deny(unsafe_code)]

pub mod events;
pub mod ids;

pub use events::{EventKind, PaymentEvent};
pub use ids::ConnectionId;
