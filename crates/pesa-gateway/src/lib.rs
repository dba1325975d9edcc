//! # pesa-gateway
//!
//! Thin adapter over the M-Pesa Daraja API.
//!
//! - [`DarajaClient`]: authenticated STK push and B2C payment calls, with a
//!   single forced-refresh retry when the gateway rejects the cached token
//! - [`types`]: request, response and callback models in the gateway's
//!   wire casing
//! - [`phone`] and [`password`]: MSISDN normalization and STK password
//!   derivation
//! - [`security`]: B2C security credential from the initiator password and
//!   the gateway certificate

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod password;
pub mod phone;
pub mod security;
pub mod types;

pub use client::DarajaClient;
pub use errors::{GatewayError, Result};
pub use password::{stk_password, timestamp};
pub use phone::format_phone_number;
pub use security::encrypt_initiator_password;
