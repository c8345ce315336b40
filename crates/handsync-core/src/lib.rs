//! Hand-pose stream synchronization core.
//!
//! This crate provides the socket-free building blocks:
//! - `protocol` - Envelope decoding into typed records
//! - `SyncStore` - Reactive fields plus pull-only hand slots
//! - `render` - Per-tick sampling contract and gesture palette
//! - Data model types shared by all of the above

pub mod protocol;
pub mod render;
pub mod store;
pub mod types;

pub use protocol::{DecodeError, FrameUpdate, HelloInfo, Inbound};
pub use render::{PoseSource, RenderSample};
pub use store::{ReactiveState, StoreChange, SyncStore};
pub use types::{
    ConnectionState, GestureEvent, GestureEventType, HandPoseFrame, Handedness, Landmark,
    LifecycleState, SessionStats,
};
