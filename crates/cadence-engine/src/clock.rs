//! Accumulator-based fixed/variable timestep frame clock.
//!
//! Called once per host tick, [`FrameClock::advance`] measures the wall
//! time since the previous call and decides how many logical updates are
//! due and what deltas to hand to update and draw. The clock never runs
//! the updates itself; the [`GameLoop`](crate::game_loop::GameLoop) does.
//!
//! ```text
//!   now - last ──► accumulated (clamped to max_accumulated)
//!                      │
//!          fixed step  │  variable step
//!      ┌───────────────┴────────────────┐
//!  n = acc / step                    n = 1
//!  n == 0: pace-sleep, idle          delta = acc, acc = 0
//!  n  > 0: acc -= n * step
//! ```

use std::time::{Duration, Instant};

use cadence_core::TimeSource;

use crate::config::{ClockConfig, ConfigError};

// ── TimeSource implementations ─────────────────────────────────────

/// Wall-clock time source backed by [`Instant`] and `thread::sleep`.
#[derive(Clone, Copy, Debug)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    /// Create a source whose origin is the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

// ── TickPlan ───────────────────────────────────────────────────────

/// What the caller should do for one host tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickPlan {
    /// Number of logical updates to run. Zero means nothing is due.
    pub updates_to_run: u32,
    /// Delta handed to each update.
    pub update_delta: Duration,
    /// Delta handed to the draw that follows the updates.
    pub draw_delta: Duration,
    /// Sticky "fallen behind" flag, threaded into every [`FrameTime`](cadence_core::FrameTime).
    pub running_slowly: bool,
    /// Whether the caller should draw after the updates.
    pub should_draw: bool,
    /// Time spent sleeping inside this call (inactive or pacing sleep).
    pub slept: Duration,
    /// Time discarded by the accumulator clamp during this call.
    pub clamped: Duration,
}

impl TickPlan {
    /// Whether no update is due this call.
    pub fn is_idle(&self) -> bool {
        self.updates_to_run == 0
    }
}

// ── FrameClock ─────────────────────────────────────────────────────

/// Fixed/variable timestep clock with a bounded accumulator.
///
/// Invariants after every call to [`advance`](Self::advance):
/// - `accumulated` is in `[0, max_accumulated]`;
/// - in fixed-step mode `accumulated < target_step` once the due updates
///   are consumed;
/// - in variable-step mode `accumulated` is zero.
pub struct FrameClock<S: TimeSource = SystemTimeSource> {
    source: S,
    config: ClockConfig,
    last: Duration,
    accumulated: Duration,
    lag_frames: u32,
    running_slowly: bool,
    force_next_delta_zero: bool,
    pacing: bool,
}

impl FrameClock<SystemTimeSource> {
    /// Create a clock on the wall-clock time source.
    pub fn new(config: ClockConfig) -> Result<Self, ConfigError> {
        Self::with_source(config, SystemTimeSource::new())
    }
}

impl<S: TimeSource> FrameClock<S> {
    /// Create a clock on a custom time source. The first call to
    /// [`advance`](Self::advance) measures from this instant.
    pub fn with_source(config: ClockConfig, source: S) -> Result<Self, ConfigError> {
        config.validate()?;
        let last = source.now();
        Ok(Self {
            source,
            config,
            last,
            accumulated: Duration::ZERO,
            lag_frames: 0,
            running_slowly: false,
            force_next_delta_zero: false,
            pacing: false,
        })
    }

    /// Advance one host tick using the configured inactive sleep.
    pub fn advance(&mut self, host_is_active: bool, host_is_suspended: bool) -> TickPlan {
        self.advance_with(host_is_active, host_is_suspended, None)
    }

    /// Advance one host tick. `inactive_sleep` overrides the configured
    /// inactive sleep for this call when present.
    pub fn advance_with(
        &mut self,
        host_is_active: bool,
        host_is_suspended: bool,
        inactive_sleep: Option<Duration>,
    ) -> TickPlan {
        if !self.pacing {
            self.source.begin_pacing();
            self.pacing = true;
        }

        let mut plan = TickPlan {
            running_slowly: self.running_slowly,
            ..TickPlan::default()
        };

        // 1. Bound CPU usage while backgrounded.
        if !host_is_active {
            let nap = inactive_sleep.unwrap_or(self.config.inactive_sleep);
            if !nap.is_zero() {
                self.source.sleep(nap);
                plan.slept += nap;
            }
        }

        // 2. Measure and accumulate, clamped.
        let now = self.source.now();
        let elapsed = now.saturating_sub(self.last);
        self.last = now;
        self.accumulated = self.accumulated.saturating_add(elapsed);
        if self.accumulated > self.config.max_accumulated {
            plan.clamped = self.accumulated - self.config.max_accumulated;
            self.accumulated = self.config.max_accumulated;
            log::warn!(
                "frame clock discarded {:?} above the {:?} accumulator clamp",
                plan.clamped,
                self.config.max_accumulated
            );
        }

        if self.config.use_fixed_timestep {
            self.advance_fixed(&mut plan);
        } else {
            self.advance_variable(&mut plan);
        }

        plan.should_draw = plan.updates_to_run > 0 && !host_is_suspended;
        plan
    }

    fn advance_fixed(&mut self, plan: &mut TickPlan) {
        let step = self.config.target_step;
        let due = self.accumulated.as_nanos() / step.as_nanos();
        // Bounded by max_accumulated / target_step, which validate() keeps finite.
        let updates = u32::try_from(due).unwrap_or(u32::MAX);

        if updates == 0 {
            let remaining = step - self.accumulated;
            if remaining > self.config.sleep_slack {
                let nap = remaining - self.config.sleep_granularity;
                self.source.sleep(nap);
                plan.slept += nap;
            }
            return;
        }

        if updates == 1 {
            self.lag_frames = self.lag_frames.saturating_sub(1);
        } else {
            self.lag_frames = self.lag_frames.saturating_add(updates - 1);
        }
        if self.running_slowly {
            if self.lag_frames == 0 {
                self.running_slowly = false;
                log::debug!("frame clock caught up");
            }
        } else if self.lag_frames > self.config.running_slowly_threshold {
            self.running_slowly = true;
            log::warn!(
                "frame clock running slowly: {} frames of lag",
                self.lag_frames
            );
        }

        let consumed = step * updates;
        self.accumulated -= consumed;

        plan.updates_to_run = updates;
        plan.update_delta = step;
        plan.draw_delta = consumed;
        plan.running_slowly = self.running_slowly;
    }

    fn advance_variable(&mut self, plan: &mut TickPlan) {
        let delta = if self.force_next_delta_zero {
            self.force_next_delta_zero = false;
            Duration::ZERO
        } else {
            self.accumulated
        };
        self.accumulated = Duration::ZERO;
        self.lag_frames = 0;
        self.running_slowly = false;

        plan.updates_to_run = 1;
        plan.update_delta = delta;
        plan.draw_delta = delta;
        plan.running_slowly = false;
    }

    /// Drop all unconsumed time and rebase the measurement baseline.
    ///
    /// In variable-step mode the next update also reports a zero delta.
    /// Used when resuming after a long pause.
    pub fn reset_elapsed_time(&mut self) {
        self.accumulated = Duration::ZERO;
        self.last = self.source.now();
        self.lag_frames = 0;
        self.running_slowly = false;
        if !self.config.use_fixed_timestep {
            self.force_next_delta_zero = true;
        }
    }

    /// Undo any platform timer adjustment made while pacing.
    pub fn finish(&mut self) {
        if self.pacing {
            self.source.end_pacing();
            self.pacing = false;
        }
    }

    /// Unconsumed time carried to the next tick.
    pub fn accumulated(&self) -> Duration {
        self.accumulated
    }

    /// Current lag counter.
    pub fn lag_frames(&self) -> u32 {
        self.lag_frames
    }

    /// Sticky "fallen behind" flag.
    pub fn is_running_slowly(&self) -> bool {
        self.running_slowly
    }

    /// Current configuration.
    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    /// The underlying time source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fixed update quantum.
    pub fn target_step(&self) -> Duration {
        self.config.target_step
    }

    /// Change the fixed update quantum. Takes effect on the next tick.
    pub fn set_target_step(&mut self, step: Duration) -> Result<(), ConfigError> {
        let next = ClockConfig {
            target_step: step,
            ..self.config.clone()
        };
        next.validate()?;
        self.config = next;
        Ok(())
    }

    /// Sleep applied while the host is inactive.
    pub fn inactive_sleep(&self) -> Duration {
        self.config.inactive_sleep
    }

    /// Change the inactive sleep. `Duration::ZERO` disables it.
    pub fn set_inactive_sleep(&mut self, sleep: Duration) {
        self.config.inactive_sleep = sleep;
    }

    /// Whether fixed-step mode is selected.
    pub fn use_fixed_timestep(&self) -> bool {
        self.config.use_fixed_timestep
    }

    /// Switch between fixed and variable step. Takes effect on the next tick.
    pub fn set_use_fixed_timestep(&mut self, fixed: bool) {
        self.config.use_fixed_timestep = fixed;
    }
}

impl<S: TimeSource> Drop for FrameClock<S> {
    fn drop(&mut self) {
        self.finish();
    }
}
