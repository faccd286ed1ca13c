use serde::{Deserialize, Serialize};

/// Recorded coordinates are stored at this multiple of the recording
/// resolution's pixel grid (960x540 spans 0..19200 x 0..10800).
pub const COORD_SCALE: f64 = 20.0;

/// Maps raw recorded coordinates to pixels on the live device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinateTransform {
    record: (u32, u32),
    target: (u32, u32),
}

impl CoordinateTransform {
    pub fn new(record: (u32, u32), target: (u32, u32)) -> Self {
        Self { record, target }
    }

    pub fn is_identity(&self) -> bool {
        self.record == self.target
    }

    pub fn to_device(&self, raw_x: i64, raw_y: i64) -> (i32, i32) {
        let mut x = raw_x as f64 / COORD_SCALE;
        let mut y = raw_y as f64 / COORD_SCALE;
        if !self.is_identity() {
            x = x * self.target.0 as f64 / self.record.0.max(1) as f64;
            y = y * self.target.1 as f64 / self.record.1.max(1) as f64;
        }
        (x.round() as i32, y.round() as i32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Gesture {
    Tap {
        x: i32,
        y: i32,
    },
    Swipe {
        from: (i32, i32),
        to: (i32, i32),
        duration_ms: u64,
    },
}

/// Decide between tap and swipe for a closed down/up pair (device pixels).
///
/// Any axis moving more than `threshold_px` makes it a swipe lasting as long
/// as the recorded gesture, but never shorter than `min_swipe_ms`. Otherwise
/// it is a tap where the finger went down.
pub fn classify(
    anchor: (i32, i32),
    anchor_ms: u64,
    close: (i32, i32),
    close_ms: u64,
    threshold_px: i32,
    min_swipe_ms: u64,
) -> Gesture {
    let dx = (close.0 - anchor.0).abs();
    let dy = (close.1 - anchor.1).abs();
    if dx > threshold_px || dy > threshold_px {
        Gesture::Swipe {
            from: anchor,
            to: close,
            duration_ms: close_ms.saturating_sub(anchor_ms).max(min_swipe_ms),
        }
    } else {
        Gesture::Tap {
            x: anchor.0,
            y: anchor.1,
        }
    }
}
