//! Expiring credential cache.
//!
//! Holds one bearer token and the instant it stops being usable. Expiry is
//! checked lazily on [`CredentialCache::get`]; nothing sweeps in the
//! background. Concurrent refreshers are not coalesced: whichever `set`
//! lands last wins.

use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;

/// Tokens are treated as expired this long before the gateway says so.
pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Entry {
    token: String,
    expiry: Instant,
}

/// Process-wide holder of the gateway access token.
#[derive(Debug)]
pub struct CredentialCache {
    entry: RwLock<Option<Entry>>,
    margin: Duration,
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialCache {
    /// Empty cache with the default 60 s safety margin.
    pub fn new() -> Self {
        Self::with_margin(DEFAULT_EXPIRY_MARGIN)
    }

    /// Empty cache with a custom safety margin.
    pub fn with_margin(margin: Duration) -> Self {
        Self {
            entry: RwLock::new(None),
            margin,
        }
    }

    /// The cached token, if one is present and not yet expired.
    pub fn get(&self) -> Option<String> {
        let entry = self.entry.read();
        entry
            .as_ref()
            .filter(|e| !e.token.is_empty() && Instant::now() < e.expiry)
            .map(|e| e.token.clone())
    }

    /// Store `token`, valid for `ttl_secs` minus the safety margin.
    ///
    /// A lifetime no longer than the margin leaves the token already expired.
    pub fn set(&self, token: impl Into<String>, ttl_secs: u64) {
        let lifetime = Duration::from_secs(ttl_secs).saturating_sub(self.margin);
        let entry = Entry {
            token: token.into(),
            expiry: Instant::now() + lifetime,
        };
        *self.entry.write() = Some(entry);
    }

    /// Forget the cached token.
    pub fn clear(&self) {
        *self.entry.write() = None;
    }

    /// Time left before the cached token expires, if it is still valid.
    pub fn remaining(&self) -> Option<Duration> {
        let entry = self.entry.read();
        let entry = entry.as_ref().filter(|e| !e.token.is_empty())?;
        let left = entry.expiry.checked_duration_since(Instant::now())?;
        (!left.is_zero()).then_some(left)
    }
}
