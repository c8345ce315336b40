//! Data model shared by the decoder, the store and render consumers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Number of skeletal keypoints per tracked hand.
pub const LANDMARK_COUNT: usize = 21;

/// Socket lifecycle as observed by the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No socket, or the last one closed.
    #[default]
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// The socket is open and messages are flowing.
    Connected,
}

/// Left/Right classification of a tracked hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    /// Parse the wire label (`"Left"` / `"Right"`).
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Left" => Some(Self::Left),
            "Right" => Some(Self::Right),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Left => "Left",
            Self::Right => "Right",
        }
    }
}

/// Confidence evolution of a gesture, as classified upstream.
///
/// Informational only: this layer never enforces transitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Idle,
    Entering,
    Held,
    Exiting,
}

impl LifecycleState {
    /// Parse a wire label, falling back to `Idle` for anything unrecognized.
    #[must_use]
    pub fn from_label_lenient(label: &str) -> Self {
        match label {
            "entering" => Self::Entering,
            "held" => Self::Held,
            "exiting" => Self::Exiting,
            _ => Self::Idle,
        }
    }
}

/// One skeletal keypoint in render space (centered, y-up, depth negated).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Complete pose of one hand at one instant.
///
/// Published behind an `Arc` and never mutated afterwards; every inbound
/// frame produces a fresh value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandPoseFrame {
    pub handedness: Handedness,
    /// Tracker-assigned hand id (e.g. `hand_0`), empty when not provided.
    pub hand_id: String,
    /// Fixed topology: 0 = wrist, then four joints per finger thumb..pinky.
    pub landmarks: [Landmark; LANDMARK_COUNT],
    pub gesture: String,
    pub gesture_score: f32,
    pub lifecycle: LifecycleState,
}

impl HandPoseFrame {
    /// Wrist keypoint.
    #[must_use]
    pub const fn wrist(&self) -> Landmark {
        self.landmarks[0]
    }
}

/// Kind of a discrete gesture event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureEventType {
    Enter,
    Hold,
    Exit,
    Slide,
}

impl GestureEventType {
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "enter" => Some(Self::Enter),
            "hold" => Some(Self::Hold),
            "exit" => Some(Self::Exit),
            "slide" => Some(Self::Slide),
            _ => None,
        }
    }
}

/// Discrete gesture transition reported by the tracker.
///
/// Only the most recent one is retained; there is no history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureEvent {
    pub event_type: GestureEventType,
    pub gesture: String,
    pub hand_id: String,
    pub timestamp: f64,
    /// Milliseconds the gesture has been held.
    pub hold_duration: f64,
    pub confidence: f64,
    /// Producer-defined extras (e.g. slide direction), passed through untouched.
    pub meta: Map<String, Value>,
}

/// Per-frame session statistics carried by `frame_data`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub inference_time_ms: f64,
    pub active: bool,
    pub frame_id: u64,
}
