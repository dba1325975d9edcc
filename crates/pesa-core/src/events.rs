//! Payment status events fanned out to live subscribers.
//!
//! The hub treats an event as opaque: it serializes it once and pushes the
//! same bytes to every subscriber. The wire shape is a flat JSON object with
//! a `type` discriminator, an RFC 3339 `timestamp`, and whatever fields the
//! webhook adapter attached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Discriminator for [`PaymentEvent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Result of an STK push (customer prompt) delivered by the gateway.
    StkCallback,
    /// A B2C payout was accepted by the gateway for processing.
    B2cInitiated,
    /// Final result of a B2C payout.
    B2cCallback,
    /// The gateway gave up waiting on a queued B2C payout.
    B2cTimeout,
}

impl EventKind {
    /// Wire name of the discriminator.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StkCallback => "stk_callback",
            Self::B2cInitiated => "b2c_initiated",
            Self::B2cCallback => "b2c_callback",
            Self::B2cTimeout => "b2c_timeout",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payment status event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// Event discriminator.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// When the relay produced the event.
    pub timestamp: DateTime<Utc>,
    /// Adapter-supplied fields, flattened into the top-level object.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl PaymentEvent {
    /// Create an event of `kind` stamped with the current time.
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            fields: Map::new(),
        }
    }

    /// Attach a field.
    ///
    /// `type` and `timestamp` are reserved and silently skipped so the flat
    /// wire object never carries duplicate keys. A value that cannot be
    /// represented as JSON is logged and left out.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        if key == "type" || key == "timestamp" {
            return self;
        }
        match serde_json::to_value(value) {
            Ok(value) => {
                let _ = self.fields.insert(key.to_owned(), value);
            }
            Err(error) => {
                warn!(
                    event = self.kind.as_str(),
                    field = key,
                    %error,
                    "dropping unserializable event field"
                );
            }
        }
        self
    }

    /// Look up an attached field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Serialize to the JSON text sent to subscribers.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
