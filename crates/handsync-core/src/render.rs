//! Pull-side contract for the skeleton renderer.
//!
//! The renderer calls [`sample`] once per display tick. It never subscribes
//! to anything; absent hands are hidden and present hands are drawn from the
//! shared pose plus a color picked by gesture label.

use std::sync::Arc;

use crate::{
    store::SyncStore,
    types::{HandPoseFrame, Handedness},
};

pub const WRIST: usize = 0;
pub const THUMB_TIP: usize = 4;
pub const INDEX_MCP: usize = 5;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_TIP: usize = 12;
pub const RING_MCP: usize = 13;
pub const RING_TIP: usize = 16;
pub const PINKY_MCP: usize = 17;
pub const PINKY_TIP: usize = 20;

/// Fingertip landmark indices, thumb to pinky.
pub const FINGERTIPS: [usize; 5] = [THUMB_TIP, INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP];

/// Bones to draw between landmarks: the five finger chains, the knuckle
/// line across the palm, and the wrist to pinky base edge.
#[rustfmt::skip]
pub const HAND_BONES: [(usize, usize); 21] = [
    (WRIST, 1), (1, 2), (2, 3), (3, THUMB_TIP),
    (WRIST, INDEX_MCP), (INDEX_MCP, 6), (6, 7), (7, INDEX_TIP),
    (INDEX_MCP, MIDDLE_MCP), (MIDDLE_MCP, 10), (10, 11), (11, MIDDLE_TIP),
    (MIDDLE_MCP, RING_MCP), (RING_MCP, 14), (14, 15), (15, RING_TIP),
    (RING_MCP, PINKY_MCP), (WRIST, PINKY_MCP), (PINKY_MCP, 18), (18, 19), (19, PINKY_TIP),
];

/// 24-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u32);

impl Rgb {
    #[must_use]
    pub const fn channels(self) -> (u8, u8, u8) {
        let [_, r, g, b] = self.0.to_be_bytes();
        (r, g, b)
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:06x}", self.0)
    }
}

/// Color for labels missing from [`GESTURE_COLORS`].
pub const DEFAULT_COLOR: Rgb = Rgb(0x00ff_ffff);

/// Fixed gesture palette.
pub const GESTURE_COLORS: [(&str, Rgb); 7] = [
    ("idle", Rgb(0x0088_8888)),
    ("open", Rgb(0x0000_ff88)),
    ("fist", Rgb(0x00ff_4444)),
    ("pinch", Rgb(0x0044_aaff)),
    ("point", Rgb(0x00ff_aa00)),
    ("victory", Rgb(0x00aa_44ff)),
    ("ok", Rgb(0x0000_ffff)),
];

/// Resolve the presentation color for a gesture label.
#[must_use]
pub fn gesture_color(label: &str) -> Rgb {
    GESTURE_COLORS
        .iter()
        .find(|(name, _)| *name == label)
        .map_or(DEFAULT_COLOR, |(_, color)| *color)
}

/// Anything that can hand out the current pose per side.
pub trait PoseSource {
    fn left_hand(&self) -> Option<Arc<HandPoseFrame>>;
    fn right_hand(&self) -> Option<Arc<HandPoseFrame>>;
}

impl PoseSource for SyncStore {
    fn left_hand(&self) -> Option<Arc<HandPoseFrame>> {
        Self::left_hand(self)
    }

    fn right_hand(&self) -> Option<Arc<HandPoseFrame>> {
        Self::right_hand(self)
    }
}

/// What to draw for one visible hand.
#[derive(Debug, Clone, PartialEq)]
pub struct HandVisual {
    pub pose: Arc<HandPoseFrame>,
    pub color: Rgb,
}

impl HandVisual {
    fn new(pose: Arc<HandPoseFrame>) -> Self {
        let color = gesture_color(&pose.gesture);
        Self { pose, color }
    }
}

/// One render tick's view of both hands. `None` means hide that hand.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderSample {
    pub left: Option<HandVisual>,
    pub right: Option<HandVisual>,
}

impl RenderSample {
    #[must_use]
    pub const fn side(&self, side: Handedness) -> Option<&HandVisual> {
        match side {
            Handedness::Left => self.left.as_ref(),
            Handedness::Right => self.right.as_ref(),
        }
    }
}

/// Pull both hands for the current tick.
#[must_use]
pub fn sample<S: PoseSource + ?Sized>(source: &S) -> RenderSample {
    RenderSample {
        left: source.left_hand().map(HandVisual::new),
        right: source.right_hand().map(HandVisual::new),
    }
}
