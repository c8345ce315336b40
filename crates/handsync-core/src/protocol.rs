//! Inbound wire protocol.
//!
//! Every server message is a `{type, timestamp, data}` envelope. Decoding
//! happens once, here, and yields one of a closed set of typed records.
//! Payload fields are read leniently: missing or ill-typed numbers and
//! booleans fall back to `0` / `false` instead of failing the message.

use serde::Deserialize;
use serde_json::Value;

use crate::types::{
    GestureEvent, GestureEventType, HandPoseFrame, Handedness, LANDMARK_COUNT, Landmark,
    LifecycleState, SessionStats,
};

/// Decode error.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Unknown message type: {0}")]
    UnknownType(String),
    #[error("Missing field: {0}")]
    MissingField(&'static str),
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    timestamp: Value,
    #[serde(default)]
    data: Value,
}

/// Typed server message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Greeting sent once per connection. No state effect.
    Connected(HelloInfo),
    /// Full replacement of both hand slots plus session stats.
    Frame(FrameUpdate),
    /// Discrete gesture transition.
    GestureEvent(GestureEvent),
    /// Heartbeat reply.
    Pong,
}

/// Contents of the `connected` greeting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HelloInfo {
    pub message: String,
    pub version: String,
    pub camera_width: u32,
    pub camera_height: u32,
}

/// Decoded `frame_data` payload.
///
/// A side that is `None` was absent from the message and must be cleared.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameUpdate {
    pub timestamp: f64,
    pub stats: SessionStats,
    pub left: Option<HandPoseFrame>,
    pub right: Option<HandPoseFrame>,
}

/// Decode one text frame from the socket.
///
/// # Errors
/// Returns error if the envelope is not valid JSON, carries an unknown
/// `type`, or a `gesture_event` lacks one of its identifying fields.
pub fn decode(text: &str) -> Result<Inbound, DecodeError> {
    let envelope: Envelope = serde_json::from_str(text)?;
    let timestamp = number(Some(&envelope.timestamp));

    match envelope.kind.as_str() {
        "connected" => Ok(Inbound::Connected(decode_hello(&envelope.data))),
        "frame_data" => Ok(Inbound::Frame(decode_frame(&envelope.data, timestamp))),
        "gesture_event" => decode_gesture_event(&envelope.data).map(Inbound::GestureEvent),
        "pong" => Ok(Inbound::Pong),
        _ => Err(DecodeError::UnknownType(envelope.kind)),
    }
}

/// Map a normalized tracker coordinate (top-left origin, y down, each axis
/// in `[0, 1]`) into render space (centered, y up, depth negated).
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn to_render_space(x: f64, y: f64, z: f64) -> Landmark {
    Landmark::new(
        ((x - 0.5) * 2.0) as f32,
        (-(y - 0.5) * 2.0) as f32,
        (-z * 0.5) as f32,
    )
}

fn decode_hello(data: &Value) -> HelloInfo {
    let camera = data.get("config").and_then(|c| c.get("camera"));
    let dimension = |key: &str| {
        camera
            .and_then(|c| c.get(key))
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0)
    };

    HelloInfo {
        message: text(data.get("message")).unwrap_or_default().to_owned(),
        version: text(data.get("version")).unwrap_or_default().to_owned(),
        camera_width: dimension("width"),
        camera_height: dimension("height"),
    }
}

fn decode_frame(data: &Value, timestamp: f64) -> FrameUpdate {
    let mut left = None;
    let mut right = None;

    let hands = data.get("hands").and_then(Value::as_array);
    for raw in hands.into_iter().flatten() {
        match decode_hand(raw) {
            // Repeated handedness: the later record wins.
            Ok(hand) => match hand.handedness {
                Handedness::Left => left = Some(hand),
                Handedness::Right => right = Some(hand),
            },
            Err(e) => tracing::warn!(error = %e, "rejecting hand record"),
        }
    }

    FrameUpdate {
        timestamp,
        stats: SessionStats {
            inference_time_ms: number(data.get("inference_time_ms")),
            active: flag(data.get("active")),
            frame_id: data.get("frame_id").and_then(Value::as_u64).unwrap_or(0),
        },
        left,
        right,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn decode_hand(raw: &Value) -> Result<HandPoseFrame, DecodeError> {
    let label = text(raw.get("handedness")).ok_or(DecodeError::MissingField("handedness"))?;
    let handedness = Handedness::from_label(label).ok_or_else(|| DecodeError::InvalidValue {
        field: "handedness",
        value: label.to_owned(),
    })?;

    let points = raw
        .get("landmarks")
        .and_then(Value::as_array)
        .ok_or(DecodeError::MissingField("landmarks"))?;
    if points.len() != LANDMARK_COUNT {
        return Err(DecodeError::InvalidValue {
            field: "landmarks",
            value: format!("{} entries", points.len()),
        });
    }

    let mut landmarks = [Landmark::default(); LANDMARK_COUNT];
    for (slot, point) in landmarks.iter_mut().zip(points) {
        let axis = |i: usize| number(point.get(i));
        *slot = to_render_space(axis(0), axis(1), axis(2));
    }

    Ok(HandPoseFrame {
        handedness,
        hand_id: text(raw.get("id")).unwrap_or_default().to_owned(),
        landmarks,
        gesture: text(raw.get("gesture")).unwrap_or_default().to_owned(),
        gesture_score: number(raw.get("gesture_score")) as f32,
        lifecycle: LifecycleState::from_label_lenient(text(raw.get("state")).unwrap_or_default()),
    })
}

fn decode_gesture_event(data: &Value) -> Result<GestureEvent, DecodeError> {
    let label = text(data.get("event_type")).ok_or(DecodeError::MissingField("event_type"))?;
    let event_type =
        GestureEventType::from_label(label).ok_or_else(|| DecodeError::InvalidValue {
            field: "event_type",
            value: label.to_owned(),
        })?;
    let gesture = text(data.get("gesture")).ok_or(DecodeError::MissingField("gesture"))?;
    let hand_id = text(data.get("hand_id")).ok_or(DecodeError::MissingField("hand_id"))?;

    Ok(GestureEvent {
        event_type,
        gesture: gesture.to_owned(),
        hand_id: hand_id.to_owned(),
        timestamp: number(data.get("timestamp")),
        hold_duration: number(data.get("hold_duration")),
        confidence: number(data.get("confidence")),
        meta: data
            .get("meta")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
    })
}

fn number(value: Option<&Value>) -> f64 {
    value
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite())
        .unwrap_or(0.0)
}

fn flag(value: Option<&Value>) -> bool {
    value.and_then(Value::as_bool).unwrap_or(false)
}

fn text(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str)
}
