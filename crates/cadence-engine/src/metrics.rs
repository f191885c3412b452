//! Cumulative frame and scheduling counters.
//!
//! [`ContextStats`] is kept by the engine context (queue drains, task
//! sweeps). [`FrameMetrics`] is kept by the game loop and embeds the
//! context's stats so callers read one snapshot.

/// Counters maintained by [`EngineContext`](crate::context::EngineContext).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContextStats {
    /// Update calls that reached the game callback.
    pub updates: u64,
    /// Draw calls that reached the game callback.
    pub draws: u64,
    /// Work items run by queue drains (including ones that panicked).
    pub work_items_drained: u64,
    /// Work items that panicked while draining.
    pub work_item_faults: u64,
    /// Tasks handed to the worker pool.
    pub tasks_started: u64,
    /// Terminal tasks removed from the pending set.
    pub tasks_retired: u64,
}

/// Counters maintained by [`GameLoop`](crate::game_loop::GameLoop).
///
/// Everything is cumulative except `last_tick_us` and `last_updates`,
/// which describe the most recent tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameMetrics {
    /// Ticks executed.
    pub ticks: u64,
    /// Ticks that ran no update (not enough time accumulated).
    pub idle_ticks: u64,
    /// Ticks that ran more than one update.
    pub catch_up_ticks: u64,
    /// Ticks that ran on the suspended path.
    pub suspended_ticks: u64,
    /// Ticks whose accumulated time hit the clamp.
    pub clamped_ticks: u64,
    /// Transitions into the running-slowly state.
    pub running_slowly_transitions: u64,
    /// Total time spent in pacing or inactive sleeps, in microseconds.
    pub slept_us: u64,
    /// Wall-clock time of the most recent tick, in microseconds.
    pub last_tick_us: u64,
    /// Updates run by the most recent tick.
    pub last_updates: u32,
    /// Snapshot of the context's counters.
    pub context: ContextStats,
}
