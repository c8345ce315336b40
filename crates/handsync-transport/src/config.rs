//! Connection settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for reaching the tracking service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Tracker host.
    pub host: String,
    /// WebSocket port.
    pub port: u16,
    /// Port of the camera preview (MJPEG over HTTP).
    pub stream_port: u16,
    /// Delay before the single reconnect attempt after an unexpected close.
    pub reconnect_delay_ms: u64,
    /// Period of the liveness ping while the socket is open.
    pub heartbeat_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
            stream_port: 8766,
            reconnect_delay_ms: 3000,
            heartbeat_interval_ms: 5000,
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub const fn with_stream_port(mut self, port: u16) -> Self {
        self.stream_port = port;
        self
    }

    /// WebSocket address of the tracker.
    #[must_use]
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }

    /// Camera preview resource, handed to the UI as-is.
    #[must_use]
    pub fn stream_url(&self) -> String {
        format!("http://{}:{}/stream", self.host, self.stream_port)
    }

    #[must_use]
    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.url(), "ws://127.0.0.1:8765");
        assert_eq!(config.stream_url(), "http://127.0.0.1:8766/stream");
        assert_eq!(config.reconnect_delay(), Duration::from_secs(3));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let config: SyncConfig = serde_json::from_str(r#"{"host":"10.0.0.2","port":9000}"#).unwrap();
        assert_eq!(config.url(), "ws://10.0.0.2:9000");
        assert_eq!(config.heartbeat_interval_ms, 5000);
    }
}
