//! Engine context lifecycle states.

use std::fmt;

/// Lifecycle of an engine context.
///
/// Transitions only move forward:
/// `Initialized → Running → Disposing → Disposed`. `Running` may be skipped
/// if the context is disposed before its first update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LifecycleState {
    /// Constructed; no update has run yet.
    Initialized = 1,
    /// At least one update or draw has run.
    Running = 2,
    /// Shutdown in progress. New background work is rejected.
    Disposing = 3,
    /// Shutdown finished. Every operation except property reads fails.
    Disposed = 4,
}

impl LifecycleState {
    /// Encode for storage in an atomic.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode a value produced by [`as_u8`](Self::as_u8).
    ///
    /// Unknown values decode as `Disposed`, the most restrictive state.
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Initialized,
            2 => Self::Running,
            3 => Self::Disposing,
            _ => Self::Disposed,
        }
    }

    /// Whether new background tasks may still be spawned.
    pub fn accepts_spawn(self) -> bool {
        self < Self::Disposing
    }

    /// Whether queued work may still be submitted.
    ///
    /// Work items stay accepted while disposing: background tasks that are
    /// being waited on may need owning-thread continuations to finish.
    pub fn accepts_work(self) -> bool {
        self < Self::Disposed
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Disposing => "disposing",
            Self::Disposed => "disposed",
        };
        f.write_str(name)
    }
}
