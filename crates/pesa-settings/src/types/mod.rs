//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may set any subset of fields; the rest keep their default value.

mod gateway;
mod logging;
mod server;

pub use gateway::*;
pub use logging::*;
pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the relay.
///
/// ```json
/// {
///   "server": { "port": 8080 },
///   "gateway": { "consumerKey": "...", "consumerSecret": "..." }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PesaSettings {
    /// HTTP/WebSocket listener and connection tuning.
    pub server: ServerSettings,
    /// Payment gateway credentials and endpoints.
    pub gateway: GatewaySettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl PesaSettings {
    /// Check that the loaded values are usable.
    ///
    /// Server tuning problems and missing gateway credentials are both
    /// reported; the caller decides whether the latter is fatal.
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.gateway.validate()
    }
}

pub(crate) fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SettingsError::InvalidValue(format!("{field} is empty")));
    }
    Ok(())
}
