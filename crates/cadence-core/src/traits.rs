//! Collaborator traits consumed by the frame loop.

use std::time::Duration;

use crate::time::FrameTime;

/// The platform host driving the loop.
///
/// Only the state the frame scheduler needs is exposed here; windowing and
/// platform interop live elsewhere.
pub trait Host {
    /// Whether the application currently has focus.
    fn is_active(&self) -> bool;

    /// Whether the application is suspended (minimized, backgrounded).
    /// Drawing is skipped entirely while suspended.
    fn is_suspended(&self) -> bool;

    /// Host-preferred sleep while inactive. Overrides the configured
    /// inactive sleep when present.
    fn inactive_sleep_hint(&self) -> Option<Duration> {
        None
    }
}

impl<T: Host + ?Sized> Host for &T {
    fn is_active(&self) -> bool {
        (**self).is_active()
    }

    fn is_suspended(&self) -> bool {
        (**self).is_suspended()
    }

    fn inactive_sleep_hint(&self) -> Option<Duration> {
        (**self).inactive_sleep_hint()
    }
}

impl<T: Host + ?Sized> Host for std::sync::Arc<T> {
    fn is_active(&self) -> bool {
        (**self).is_active()
    }

    fn is_suspended(&self) -> bool {
        (**self).is_suspended()
    }

    fn inactive_sleep_hint(&self) -> Option<Duration> {
        (**self).inactive_sleep_hint()
    }
}

/// Application callbacks run on the owning thread.
pub trait Game {
    /// Perform one logical update.
    fn update(&mut self, time: &FrameTime);

    /// Render one frame.
    fn draw(&mut self, time: &FrameTime);

    /// Perform one logical update while the host is suspended.
    ///
    /// Defaults to [`update`](Self::update).
    fn update_suspended(&mut self, time: &FrameTime) {
        self.update(time);
    }
}

/// Monotonic time and sleeping, injectable for tests.
pub trait TimeSource {
    /// Monotonic time since an arbitrary, fixed origin.
    fn now(&self) -> Duration;

    /// Block the calling thread for about `duration`.
    fn sleep(&self, duration: Duration);

    /// Called before the first pacing sleep. Platforms with a coarse
    /// default timer resolution raise it here.
    fn begin_pacing(&self) {}

    /// Undo [`begin_pacing`](Self::begin_pacing).
    fn end_pacing(&self) {}
}

impl<T: TimeSource + ?Sized> TimeSource for Box<T> {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }

    fn begin_pacing(&self) {
        (**self).begin_pacing()
    }

    fn end_pacing(&self) {
        (**self).end_pacing()
    }
}

impl<T: TimeSource + ?Sized> TimeSource for std::sync::Arc<T> {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }

    fn begin_pacing(&self) {
        (**self).begin_pacing()
    }

    fn end_pacing(&self) {
        (**self).end_pacing()
    }
}
