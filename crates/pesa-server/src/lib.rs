//! # pesa-server
//!
//! Axum HTTP + WebSocket server for the payment-status relay.
//!
//! - [`hub`]: the broadcast hub, a single control loop that owns the set of
//!   live subscribers and fans payment events out to them
//! - [`websocket`]: per-subscriber read/write pumps, keep-alive and teardown
//! - [`handlers`]: webhook and payment-initiation routes that feed the hub
//! - [`server`]: router assembly and listener lifecycle

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;
