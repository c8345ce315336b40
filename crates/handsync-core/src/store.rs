//! Synchronized client-side view of the tracking session.
//!
//! Two tiers live behind one facade:
//! - the reactive tier (connection, active flag, inference time, last event,
//!   fps) broadcasts a [`StoreChange`] to every subscriber whenever a value
//!   actually changes;
//! - the high-frequency tier (the two hand slots and the last frame id) is
//!   replaced on every `frame_data` and is only ever read by polling.
//!
//! Hand slots hold `Arc<HandPoseFrame>` values that are swapped wholesale,
//! so a reference a reader captured earlier stays internally consistent after
//! later frames are applied.

use std::{
    sync::{Arc, Mutex, PoisonError, RwLock},
    time::{Duration, Instant},
};

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::{
    protocol::{FrameUpdate, Inbound},
    types::{ConnectionState, GestureEvent, HandPoseFrame, Handedness, SessionStats},
};

/// Subscriber queue depth. Lagging subscribers skip to the newest changes.
const CHANGE_CAPACITY: usize = 256;

/// Window over which frame arrivals are counted for the fps figure.
const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Notification emitted when a reactive field changes.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreChange {
    Connection(ConnectionState),
    Active(bool),
    InferenceTime(f64),
    LastEvent(Arc<GestureEvent>),
    Fps(f64),
}

/// Snapshot of the reactive tier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReactiveState {
    pub connection: ConnectionState,
    pub active: bool,
    pub inference_time_ms: f64,
    pub last_event: Option<Arc<GestureEvent>>,
    pub fps: f64,
}

#[derive(Default)]
struct PoseSlots {
    left: Option<Arc<HandPoseFrame>>,
    right: Option<Arc<HandPoseFrame>>,
    frame_id: u64,
}

/// Counts frame arrivals and yields a rate once per elapsed window.
#[derive(Debug, Default)]
struct FpsMeter {
    window_start: Option<Instant>,
    frames: u32,
}

impl FpsMeter {
    fn tick(&mut self, now: Instant) -> Option<f64> {
        let Some(start) = self.window_start else {
            self.window_start = Some(now);
            return None;
        };

        self.frames = self.frames.saturating_add(1);
        let elapsed = now.saturating_duration_since(start);
        if elapsed < FPS_WINDOW {
            return None;
        }

        let fps = f64::from(self.frames) / elapsed.as_secs_f64();
        self.window_start = Some(now);
        self.frames = 0;
        Some(fps)
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Authoritative client-side state for one tracking session.
///
/// One writer (the connection's message handler) and any number of
/// readers. Construct one per session and share it behind an `Arc`.
pub struct SyncStore {
    reactive: RwLock<ReactiveState>,
    poses: RwLock<PoseSlots>,
    fps: Mutex<FpsMeter>,
    last_pong: Mutex<Option<Instant>>,
    sender: broadcast::Sender<StoreChange>,
}

impl Default for SyncStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStore {
    /// Create an empty, disconnected store.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            reactive: RwLock::new(ReactiveState::default()),
            poses: RwLock::new(PoseSlots::default()),
            fps: Mutex::new(FpsMeter::default()),
            last_pong: Mutex::new(None),
            sender,
        }
    }

    /// Get a receiver for reactive-tier changes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.sender.subscribe()
    }

    /// Stream of reactive-tier changes. Lagged items are skipped.
    #[must_use]
    pub fn changes(&self) -> futures::stream::BoxStream<'static, StoreChange> {
        BroadcastStream::new(self.subscribe())
            .filter_map(|res| async move { res.ok() })
            .boxed()
    }

    /// Current reactive values.
    #[must_use]
    pub fn snapshot(&self) -> ReactiveState {
        self.reactive.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn connection(&self) -> ConnectionState {
        self.reactive.read().unwrap_or_else(PoisonError::into_inner).connection
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.reactive.read().unwrap_or_else(PoisonError::into_inner).active
    }

    #[must_use]
    pub fn inference_time_ms(&self) -> f64 {
        self.reactive
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .inference_time_ms
    }

    #[must_use]
    pub fn last_event(&self) -> Option<Arc<GestureEvent>> {
        self.reactive
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last_event
            .clone()
    }

    #[must_use]
    pub fn fps(&self) -> f64 {
        self.reactive.read().unwrap_or_else(PoisonError::into_inner).fps
    }

    /// Current left-hand pose, or `None` when no left hand is tracked.
    #[must_use]
    pub fn left_hand(&self) -> Option<Arc<HandPoseFrame>> {
        self.hand(Handedness::Left)
    }

    /// Current right-hand pose, or `None` when no right hand is tracked.
    #[must_use]
    pub fn right_hand(&self) -> Option<Arc<HandPoseFrame>> {
        self.hand(Handedness::Right)
    }

    #[must_use]
    pub fn hand(&self, side: Handedness) -> Option<Arc<HandPoseFrame>> {
        let poses = self.poses.read().unwrap_or_else(PoisonError::into_inner);
        match side {
            Handedness::Left => poses.left.clone(),
            Handedness::Right => poses.right.clone(),
        }
    }

    /// Id of the most recently applied `frame_data`.
    #[must_use]
    pub fn frame_id(&self) -> u64 {
        self.poses.read().unwrap_or_else(PoisonError::into_inner).frame_id
    }

    /// Stats of the most recently applied `frame_data`, read as one unit.
    ///
    /// The active flag also reflects local `set_active` calls made since.
    #[must_use]
    pub fn session(&self) -> SessionStats {
        let poses = self.poses.read().unwrap_or_else(PoisonError::into_inner);
        let reactive = self.reactive.read().unwrap_or_else(PoisonError::into_inner);
        SessionStats {
            inference_time_ms: reactive.inference_time_ms,
            active: reactive.active,
            frame_id: poses.frame_id,
        }
    }

    /// When the last heartbeat reply arrived.
    #[must_use]
    pub fn last_pong(&self) -> Option<Instant> {
        *self.last_pong.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a socket lifecycle transition.
    ///
    /// Dropping to `Disconnected` also clears both hand slots and zeroes the
    /// frame rate, so consumers stop showing data that will never be superseded.
    pub fn set_connection(&self, state: ConnectionState) {
        if state == ConnectionState::Disconnected {
            self.clear_hands();
            self.fps.lock().unwrap_or_else(PoisonError::into_inner).reset();
            self.update(|r| &mut r.fps, 0.0, StoreChange::Fps(0.0));
        }
        self.update(
            |r| &mut r.connection,
            state,
            StoreChange::Connection(state),
        );
    }

    pub fn set_active(&self, active: bool) {
        self.update(|r| &mut r.active, active, StoreChange::Active(active));
    }

    pub fn set_inference_time(&self, ms: f64) {
        self.update(
            |r| &mut r.inference_time_ms,
            ms,
            StoreChange::InferenceTime(ms),
        );
    }

    /// Replace the retained gesture event. Always notifies.
    pub fn set_last_event(&self, event: GestureEvent) {
        let event = Arc::new(event);
        self.reactive
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .last_event = Some(Arc::clone(&event));
        self.publish(StoreChange::LastEvent(event));
    }

    /// Apply one decoded server message.
    pub fn apply(&self, inbound: Inbound) {
        match inbound {
            Inbound::Connected(hello) => {
                tracing::info!(
                    version = %hello.version,
                    camera_width = hello.camera_width,
                    camera_height = hello.camera_height,
                    "tracker says hello: {}",
                    hello.message
                );
            }
            Inbound::Frame(update) => self.apply_frame(update),
            Inbound::GestureEvent(event) => {
                tracing::debug!(
                    event_type = ?event.event_type,
                    gesture = %event.gesture,
                    hand_id = %event.hand_id,
                    "gesture event"
                );
                self.set_last_event(event);
            }
            Inbound::Pong => {
                *self.last_pong.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(Instant::now());
            }
        }
    }

    /// Replace both hand slots and refresh session stats.
    pub fn apply_frame(&self, update: FrameUpdate) {
        self.apply_frame_at(update, Instant::now());
    }

    fn apply_frame_at(&self, update: FrameUpdate, now: Instant) {
        let FrameUpdate {
            stats, left, right, ..
        } = update;

        let rate = self.fps.lock().unwrap_or_else(PoisonError::into_inner).tick(now);

        // Hands and stats land under one pair of writes (poses before reactive,
        // the order `session` reads in), so no reader sees a half-applied frame.
        let mut changes = Vec::with_capacity(3);
        {
            let mut poses = self.poses.write().unwrap_or_else(PoisonError::into_inner);
            let mut reactive = self.reactive.write().unwrap_or_else(PoisonError::into_inner);
            *poses = PoseSlots {
                left: left.map(Arc::new),
                right: right.map(Arc::new),
                frame_id: stats.frame_id,
            };
            if replace(&mut reactive.inference_time_ms, stats.inference_time_ms) {
                changes.push(StoreChange::InferenceTime(stats.inference_time_ms));
            }
            if replace(&mut reactive.active, stats.active) {
                changes.push(StoreChange::Active(stats.active));
            }
            if let Some(fps) = rate {
                if replace(&mut reactive.fps, fps) {
                    changes.push(StoreChange::Fps(fps));
                }
            }
        }
        tracing::trace!(frame_id = stats.frame_id, "frame applied");

        for change in changes {
            self.publish(change);
        }
    }

    fn clear_hands(&self) {
        let mut poses = self.poses.write().unwrap_or_else(PoisonError::into_inner);
        poses.left = None;
        poses.right = None;
    }

    fn update<T: PartialEq>(
        &self,
        field: impl FnOnce(&mut ReactiveState) -> &mut T,
        value: T,
        change: StoreChange,
    ) {
        let changed = {
            let mut reactive = self.reactive.write().unwrap_or_else(PoisonError::into_inner);
            replace(field(&mut reactive), value)
        };
        if changed {
            self.publish(change);
        }
    }

    fn publish(&self, change: StoreChange) {
        let _ = self.sender.send(change); // no subscribers is fine
    }
}

/// Overwrite `slot` if `value` differs. Returns whether it changed.
fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

#[cfg(test)]
mod tests {
    use serde_json::Map;
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;
    use crate::types::{GestureEventType, LANDMARK_COUNT, Landmark, LifecycleState};

    fn pose(side: Handedness, gesture: &str, x: f32) -> HandPoseFrame {
        HandPoseFrame {
            handedness: side,
            hand_id: "hand_0".into(),
            landmarks: [Landmark::new(x, 0.0, 0.0); LANDMARK_COUNT],
            gesture: gesture.into(),
            gesture_score: 0.9,
            lifecycle: LifecycleState::Held,
        }
    }

    fn update(
        frame_id: u64,
        inference_time_ms: f64,
        left: Option<HandPoseFrame>,
        right: Option<HandPoseFrame>,
    ) -> FrameUpdate {
        FrameUpdate {
            timestamp: 0.0,
            stats: SessionStats {
                inference_time_ms,
                active: false,
                frame_id,
            },
            left,
            right,
        }
    }

    fn event(gesture: &str) -> GestureEvent {
        GestureEvent {
            event_type: GestureEventType::Enter,
            gesture: gesture.into(),
            hand_id: "hand_0".into(),
            timestamp: 1.0,
            hold_duration: 0.0,
            confidence: 0.8,
            meta: Map::new(),
        }
    }

    #[test]
    fn test_frame_replaces_both_slots() {
        let store = SyncStore::new();
        store.apply_frame(update(1, 5.0, Some(pose(Handedness::Left, "open", 0.1)), None));
        assert!(store.left_hand().is_some());
        assert!(store.right_hand().is_none());

        store.apply_frame(update(2, 5.0, None, Some(pose(Handedness::Right, "fist", 0.2))));
        assert!(store.left_hand().is_none());
        assert_eq!(store.right_hand().unwrap().gesture, "fist");
        assert_eq!(store.frame_id(), 2);
    }

    #[test]
    fn test_captured_reference_survives_next_frame() {
        let store = SyncStore::new();
        store.apply_frame(update(1, 5.0, Some(pose(Handedness::Left, "open", 0.1)), None));
        let first = store.left_hand().unwrap();

        store.apply_frame(update(2, 5.0, Some(pose(Handedness::Left, "pinch", 0.7)), None));
        let second = store.left_hand().unwrap();

        assert_eq!(first.gesture, "open");
        assert_eq!(first.wrist().x, 0.1);
        assert_eq!(second.gesture, "pinch");
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_reactive_change_notifies_hand_change_does_not() {
        let store = SyncStore::new();
        let mut rx = store.subscribe();

        store.apply_frame(update(1, 7.5, Some(pose(Handedness::Left, "open", 0.1)), None));
        assert_eq!(rx.try_recv().unwrap(), StoreChange::InferenceTime(7.5));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        // Same stats, different hands: nothing reactive moved.
        store.apply_frame(update(2, 7.5, None, Some(pose(Handedness::Right, "fist", 0.3))));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert!(store.right_hand().is_some());
    }

    #[test]
    fn test_setting_same_value_is_silent() {
        let store = SyncStore::new();
        let mut rx = store.subscribe();

        store.set_active(true);
        store.set_active(true);
        assert_eq!(rx.try_recv().unwrap(), StoreChange::Active(true));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_gesture_event_always_notifies() {
        let store = SyncStore::new();
        let mut rx = store.subscribe();

        store.apply(Inbound::GestureEvent(event("fist")));
        store.apply(Inbound::GestureEvent(event("fist")));

        assert!(matches!(rx.try_recv(), Ok(StoreChange::LastEvent(e)) if e.gesture == "fist"));
        assert!(matches!(rx.try_recv(), Ok(StoreChange::LastEvent(_))));
        assert_eq!(store.last_event().unwrap().gesture, "fist");
    }

    #[test]
    fn test_pong_records_liveness_silently() {
        let store = SyncStore::new();
        let mut rx = store.subscribe();
        assert!(store.last_pong().is_none());

        store.apply(Inbound::Pong);
        assert!(store.last_pong().is_some());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_disconnect_clears_hands() {
        let store = SyncStore::new();
        store.set_connection(ConnectionState::Connected);
        store.apply_frame(update(
            1,
            5.0,
            Some(pose(Handedness::Left, "open", 0.1)),
            Some(pose(Handedness::Right, "ok", 0.1)),
        ));

        let mut rx = store.subscribe();
        store.set_connection(ConnectionState::Disconnected);
        assert_eq!(
            rx.try_recv().unwrap(),
            StoreChange::Connection(ConnectionState::Disconnected)
        );
        assert!(store.left_hand().is_none());
        assert!(store.right_hand().is_none());
    }

    #[test]
    fn test_fps_published_once_per_window() {
        let store = SyncStore::new();
        let mut rx = store.subscribe();
        let start = Instant::now();

        for i in 0..=30_u32 {
            let at = start + Duration::from_millis(u64::from(i) * 1000 / 30);
            store.apply_frame_at(update(u64::from(i), 4.0, None, None), at);
        }

        let fps_changes: Vec<f64> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|c| match c {
                StoreChange::Fps(fps) => Some(fps),
                _ => None,
            })
            .collect();
        assert_eq!(fps_changes.len(), 1);
        assert!((fps_changes[0] - 30.0).abs() < 0.1);
        assert!((store.fps() - 30.0).abs() < 0.1);
    }

    #[test]
    fn test_disconnect_zeroes_fps() {
        let store = SyncStore::new();
        store.set_connection(ConnectionState::Connected);
        let start = Instant::now();
        for i in 0..=30_u32 {
            let at = start + Duration::from_millis(u64::from(i) * 1000 / 30);
            store.apply_frame_at(update(u64::from(i), 4.0, None, None), at);
        }
        assert!(store.fps() > 0.0);

        let mut rx = store.subscribe();
        store.set_connection(ConnectionState::Disconnected);
        assert_eq!(rx.try_recv().unwrap(), StoreChange::Fps(0.0));
        assert_eq!(
            rx.try_recv().unwrap(),
            StoreChange::Connection(ConnectionState::Disconnected)
        );
        assert_eq!(store.fps(), 0.0);
        assert_eq!(store.snapshot().fps, 0.0);
    }

    #[test]
    fn test_frame_stats_apply_with_the_frame() {
        let store = SyncStore::new();
        std::thread::scope(|s| {
            s.spawn(|| {
                for id in 1..=2000_u32 {
                    store.apply_frame(FrameUpdate {
                        timestamp: 0.0,
                        stats: SessionStats {
                            inference_time_ms: f64::from(id),
                            active: id % 2 == 1,
                            frame_id: u64::from(id),
                        },
                        left: None,
                        right: None,
                    });
                }
            });
            s.spawn(|| {
                for _ in 0..2000 {
                    let stats = store.session();
                    let id = u32::try_from(stats.frame_id).unwrap();
                    assert_eq!(stats.inference_time_ms, f64::from(id));
                    assert_eq!(stats.active, id % 2 == 1);
                }
            });
        });
        assert_eq!(store.session().frame_id, 2000);
    }

    #[test]
    fn test_fps_meter_waits_for_full_window() {
        let mut meter = FpsMeter::default();
        let start = Instant::now();
        assert_eq!(meter.tick(start), None);
        assert_eq!(meter.tick(start + Duration::from_millis(500)), None);
        assert_eq!(meter.tick(start + Duration::from_millis(1000)), Some(2.0));
    }

    #[tokio::test]
    async fn test_changes_stream_yields_in_order() {
        let store = SyncStore::new();
        let mut changes = store.changes();

        store.set_connection(ConnectionState::Connecting);
        store.set_connection(ConnectionState::Connected);

        assert_eq!(
            changes.next().await,
            Some(StoreChange::Connection(ConnectionState::Connecting))
        );
        assert_eq!(
            changes.next().await,
            Some(StoreChange::Connection(ConnectionState::Connected))
        );
        assert_eq!(store.snapshot().connection, ConnectionState::Connected);
    }
}
