//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"`, or `"degraded"` once the hub loop has stopped.
    pub status: &'static str,
    /// Live subscriber count.
    pub clients: usize,
    /// Seconds since the server started.
    pub uptime_secs: u64,
}

impl HealthResponse {
    /// Whether events can still be delivered.
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, clients: usize, hub_running: bool) -> HealthResponse {
    HealthResponse {
        status: if hub_running { "ok" } else { "degraded" },
        clients,
        uptime_secs: start_time.elapsed().as_secs(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_ok() {
        let resp = health_check(Instant::now(), 0, true);
        assert_eq!(resp.status, "ok");
        assert!(resp.is_ok());
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn stopped_hub_is_degraded() {
        let resp = health_check(Instant::now(), 0, false);
        assert_eq!(resp.status, "degraded");
        assert!(!resp.is_ok());
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        assert!(health_check(start, 0, true).uptime_secs >= 59);
    }

    #[test]
    fn serializes_expected_fields() {
        let json = serde_json::to_value(health_check(Instant::now(), 3, true)).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["clients"], 3);
        assert!(json["uptime_secs"].is_u64());
    }
}
