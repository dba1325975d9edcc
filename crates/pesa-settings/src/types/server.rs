use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Listener and per-connection tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Interval between keep-alive pings sent to each subscriber.
    pub heartbeat_interval_ms: u64,
    /// A subscriber silent for this long is torn down.
    pub heartbeat_timeout_ms: u64,
    /// Capacity of each subscriber's outbound queue, in events.
    pub send_queue_capacity: usize,
    /// Largest inbound WebSocket message accepted, in bytes.
    pub max_message_size: usize,
    /// Allow cross-origin requests from any origin.
    pub cors_allow_any_origin: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            send_queue_capacity: 256,
            max_message_size: 64 * 1024,
            cors_allow_any_origin: true,
        }
    }
}

impl ServerSettings {
    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Ping interval as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Liveness timeout as a [`Duration`].
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "sendQueueCapacity must be at least 1".into(),
            ));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "heartbeatIntervalMs must be positive".into(),
            ));
        }
        if self.heartbeat_timeout_ms <= self.heartbeat_interval_ms {
            return Err(SettingsError::InvalidValue(
                "heartbeatTimeoutMs must exceed heartbeatIntervalMs".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_addr_joins_host_and_port() {
        let settings = ServerSettings {
            host: "127.0.0.1".into(),
            port: 9000,
            ..ServerSettings::default()
        };
        assert_eq!(settings.bind_addr(), "127.0.0.1:9000");
    }

    #[test]
    fn durations() {
        let settings = ServerSettings::default();
        assert_eq!(settings.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(settings.heartbeat_timeout(), Duration::from_secs(90));
    }

    #[test]
    fn zero_queue_rejected() {
        let settings = ServerSettings {
            send_queue_capacity: 0,
            ..ServerSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn timeout_must_exceed_interval() {
        let settings = ServerSettings {
            heartbeat_interval_ms: 1000,
            heartbeat_timeout_ms: 1000,
            ..ServerSettings::default()
        };
        assert!(settings.validate().is_err());
        assert!(ServerSettings::default().validate().is_ok());
    }
}
