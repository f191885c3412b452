//! The time context handed to update and draw callbacks.

use std::time::Duration;

use crate::id::FrameIndex;

/// Timing snapshot passed to every update or draw call.
///
/// The game loop keeps one `FrameTime` for updates and a separate one for
/// draws, since a single host tick may run several updates but at most one
/// draw.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameTime {
    /// Time covered by this call. For fixed-step updates this is always the
    /// target step; for draws it is the sum of the updates that preceded it.
    pub elapsed: Duration,
    /// Sum of all `elapsed` values handed out so far, including this one.
    pub total: Duration,
    /// Number of calls made so far, including this one.
    pub frame_count: FrameIndex,
    /// Whether the loop has fallen behind its target update rate. Subsystems
    /// may skip expensive non-critical work while this is set.
    pub running_slowly: bool,
}

impl FrameTime {
    /// Advance to the next call, covering `elapsed`.
    pub fn advance(&mut self, elapsed: Duration, running_slowly: bool) {
        self.elapsed = elapsed;
        self.total = self.total.saturating_add(elapsed);
        self.frame_count = FrameIndex(self.frame_count.0 + 1);
        self.running_slowly = running_slowly;
    }

    /// `elapsed` in seconds, for integrators that work in floating point.
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed.as_secs_f32()
    }

    /// Reset all counters to zero.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
