//! # pesa-auth
//!
//! Gateway authentication:
//!
//! - [`CredentialCache`]: a lock-protected bearer token with a lazily checked
//!   expiry, shared by every outbound caller
//! - [`TokenProvider`]: fetches fresh tokens with the OAuth client-credentials
//!   grant and writes them back into the cache

#![deny(unsafe_code)]

pub mod cache;
pub mod errors;
pub mod token;

pub use cache::{CredentialCache, DEFAULT_EXPIRY_MARGIN};
pub use errors::AuthError;
pub use token::TokenProvider;
