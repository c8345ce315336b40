//! Client-to-server wire messages.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Payload of a `set_active` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveFlag {
    pub active: bool,
}

/// Message from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Liveness ping. Timestamp in milliseconds since the Unix epoch.
    Ping { timestamp: f64 },
    /// Toggle whether the tracker acts on recognized gestures.
    SetActive { data: ActiveFlag },
}

impl ClientMessage {
    /// Create a ping stamped with the current wall-clock time.
    #[must_use]
    pub fn ping() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or(0.0);
        Self::Ping { timestamp }
    }

    #[must_use]
    pub const fn set_active(active: bool) -> Self {
        Self::SetActive {
            data: ActiveFlag { active },
        }
    }

    /// Encode for the socket.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
