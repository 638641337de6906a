//! Canonical per-file frame grid: the single timebase every measurement
//! column and every label is aligned to.

/// Frame count is `floor(duration_ms / frame_shift_ms)`; frame `i` sits at
/// `i * frame_shift_ms` ms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameGrid {
    frame_shift_ms: f64,
    frames: usize,
}

impl FrameGrid {
    pub fn build(duration_ms: f64, frame_shift_ms: f64) -> Self {
        debug_assert!(frame_shift_ms > 0.0);
        let frames = if duration_ms <= 0.0 {
            0
        } else {
            (duration_ms / frame_shift_ms).floor() as usize
        };
        Self {
            frame_shift_ms,
            frames,
        }
    }

    pub fn frame_shift_ms(&self) -> f64 {
        self.frame_shift_ms
    }

    pub fn len(&self) -> usize {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    pub fn time_ms(&self, frame: usize) -> f64 {
        frame as f64 * self.frame_shift_ms
    }
}
