//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"`, or `"degraded"` when the connection table cannot be read.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open WebSocket connections.
    pub connections: usize,
    /// Executions currently bound to a connection. Absent when degraded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registered: Option<u64>,
}

pub fn health_check(
    start_time: Instant,
    connections: usize,
    registered: Option<u64>,
) -> HealthResponse {
    let status = if registered.is_some() { "ok" } else { "degraded" };
    HealthResponse {
        status: status.into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        registered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_server_reports_ok() {
        let resp = health_check(Instant::now(), 0, Some(0));
        assert_eq!(resp.status, "ok");
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn unreadable_store_is_degraded() {
        let resp = health_check(Instant::now(), 2, None);
        assert_eq!(resp.status, "degraded");
        let json = serde_json::to_value(resp).unwrap();
        assert!(json.get("registered").is_none());
        assert_eq!(json["connections"], 2);
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        assert!(health_check(start, 0, Some(0)).uptime_secs >= 59);
    }

    #[test]
    fn serialization() {
        let json = serde_json::to_value(health_check(Instant::now(), 3, Some(1))).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["connections"], 3);
        assert_eq!(json["registered"], 1);
        assert!(json["uptime_secs"].is_number());
    }
}
