//! Server configuration.

use std::time::Duration;

use pesa_settings::ServerSettings;

/// Runtime configuration for the HTTP/WebSocket server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Interval between server-initiated Ping frames.
    pub heartbeat_interval: Duration,
    /// Silence longer than this tears a subscriber down.
    pub heartbeat_timeout: Duration,
    /// Capacity of each subscriber's outbound queue.
    pub send_queue_capacity: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Allow cross-origin requests from any origin.
    pub cors_allow_any_origin: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(90),
            send_queue_capacity: 256,
            max_message_size: 64 * 1024,
            cors_allow_any_origin: true,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            heartbeat_interval: s.heartbeat_interval(),
            heartbeat_timeout: s.heartbeat_timeout(),
            send_queue_capacity: s.send_queue_capacity.max(1),
            max_message_size: s.max_message_size,
            cors_allow_any_origin: s.cors_allow_any_origin,
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
