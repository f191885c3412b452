//! Host-facing game loop.
//!
//! [`GameLoop`] ties a [`FrameClock`] to an [`EngineContext`], a [`Host`]
//! and a [`Game`]. The host calls [`tick`](GameLoop::tick) once per
//! platform tick; the loop asks the clock how many updates are due, runs
//! them through the context (queue drain, task sweep, `Game::update`), then
//! draws once unless the host is suspended.
//!
//! Update and draw keep separate [`FrameTime`]s: update time advances by
//! one step per update, draw time by the whole tick's consumed time.

use std::time::{Duration, Instant};

use cadence_core::{ContextError, FrameTime, Game, Host, TimeSource};

use crate::clock::{FrameClock, SystemTimeSource, TickPlan};
use crate::config::{ConfigError, EngineConfig};
use crate::context::{ContextHandle, EngineContext, ShutdownReport};
use crate::metrics::FrameMetrics;

/// A complete frame loop over a host and a game.
pub struct GameLoop<H: Host, G: Game, S: TimeSource = SystemTimeSource> {
    clock: FrameClock<S>,
    context: EngineContext,
    host: H,
    game: G,
    update_time: FrameTime,
    draw_time: FrameTime,
    metrics: FrameMetrics,
}

impl<H: Host, G: Game> GameLoop<H, G, SystemTimeSource> {
    /// Build a loop on the wall clock. The calling thread becomes the
    /// owning thread.
    pub fn new(config: EngineConfig, host: H, game: G) -> Result<Self, ContextError> {
        Self::with_source(config, host, game, SystemTimeSource::new())
    }
}

impl<H: Host, G: Game, S: TimeSource> GameLoop<H, G, S> {
    /// Build a loop on a custom time source.
    pub fn with_source(config: EngineConfig, host: H, game: G, source: S) -> Result<Self, ContextError> {
        let clock = FrameClock::with_source(config.clock.clone(), source)?;
        let context = EngineContext::new(&config)?;
        Ok(Self {
            clock,
            context,
            host,
            game,
            update_time: FrameTime::default(),
            draw_time: FrameTime::default(),
            metrics: FrameMetrics::default(),
        })
    }

    /// Advance one host tick: run the due updates, then draw.
    ///
    /// Delegates to [`run_suspended_tick`](Self::run_suspended_tick) while
    /// the host reports suspended. A failing work item aborts the tick
    /// after the updates that already ran; the error is returned.
    pub fn tick(&mut self) -> Result<TickPlan, ContextError> {
        if self.host.is_suspended() {
            return self.run_suspended_tick();
        }
        let started = Instant::now();
        let plan = self.clock.advance_with(
            self.host.is_active(),
            false,
            self.host.inactive_sleep_hint(),
        );
        self.record_plan(&plan);

        let Self {
            context,
            game,
            update_time,
            draw_time,
            ..
        } = self;
        for _ in 0..plan.updates_to_run {
            update_time.advance(plan.update_delta, plan.running_slowly);
            context.update(update_time, |t| game.update(t))?;
        }
        if plan.should_draw {
            draw_time.advance(plan.draw_delta, plan.running_slowly);
            context.draw(draw_time, |t| game.draw(t))?;
        }

        self.finish_tick(started);
        Ok(plan)
    }

    /// Advance one host tick on the suspended path: due updates go to
    /// [`Game::update_suspended`] and nothing is drawn.
    pub fn run_suspended_tick(&mut self) -> Result<TickPlan, ContextError> {
        let started = Instant::now();
        let plan = self.clock.advance_with(
            self.host.is_active(),
            true,
            self.host.inactive_sleep_hint(),
        );
        self.record_plan(&plan);
        self.metrics.suspended_ticks += 1;

        let Self {
            context,
            game,
            update_time,
            ..
        } = self;
        for _ in 0..plan.updates_to_run {
            update_time.advance(plan.update_delta, plan.running_slowly);
            context.update(update_time, |t| game.update_suspended(t))?;
        }

        self.finish_tick(started);
        Ok(plan)
    }

    /// Tick until `stop` returns true. `stop` is checked before each tick.
    pub fn run_until(&mut self, mut stop: impl FnMut(&Self) -> bool) -> Result<(), ContextError> {
        while !stop(self) {
            self.tick()?;
        }
        Ok(())
    }

    /// Drop unconsumed time. See [`FrameClock::reset_elapsed_time`].
    pub fn reset_elapsed_time(&mut self) {
        self.clock.reset_elapsed_time();
    }

    /// Stop pacing and dispose the context.
    pub fn cleanup(&mut self) -> Result<ShutdownReport, ContextError> {
        self.clock.finish();
        self.context.dispose()
    }

    // ── Clock properties ─────────────────────────────────────────

    /// Fixed update quantum.
    pub fn target_step(&self) -> Duration {
        self.clock.target_step()
    }

    /// Change the fixed update quantum from the next tick on.
    pub fn set_target_step(&mut self, step: Duration) -> Result<(), ConfigError> {
        self.clock.set_target_step(step)
    }

    /// Sleep applied while the host is inactive.
    pub fn inactive_sleep(&self) -> Duration {
        self.clock.inactive_sleep()
    }

    /// Change the inactive sleep. `Duration::ZERO` disables it.
    pub fn set_inactive_sleep(&mut self, sleep: Duration) {
        self.clock.set_inactive_sleep(sleep);
    }

    /// Whether updates use the fixed step.
    pub fn use_fixed_timestep(&self) -> bool {
        self.clock.use_fixed_timestep()
    }

    /// Switch between fixed and variable step from the next tick on.
    pub fn set_use_fixed_timestep(&mut self, fixed: bool) {
        self.clock.set_use_fixed_timestep(fixed);
    }

    // ── Accessors ────────────────────────────────────────────────

    /// The frame clock.
    pub fn clock(&self) -> &FrameClock<S> {
        &self.clock
    }

    /// The engine context.
    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    /// Mutable access to the engine context (shutdown hooks, waits).
    pub fn context_mut(&mut self) -> &mut EngineContext {
        &mut self.context
    }

    /// A cloneable context handle.
    pub fn handle(&self) -> ContextHandle {
        self.context.handle()
    }

    /// The host.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// The game.
    pub fn game(&self) -> &G {
        &self.game
    }

    /// Mutable access to the game.
    pub fn game_mut(&mut self) -> &mut G {
        &mut self.game
    }

    /// Time context of the most recent update.
    pub fn update_time(&self) -> &FrameTime {
        &self.update_time
    }

    /// Time context of the most recent draw.
    pub fn draw_time(&self) -> &FrameTime {
        &self.draw_time
    }

    /// Cumulative metrics, including a fresh snapshot of context stats.
    pub fn metrics(&self) -> FrameMetrics {
        FrameMetrics {
            context: self.context.stats(),
            ..self.metrics.clone()
        }
    }

    fn record_plan(&mut self, plan: &TickPlan) {
        let m = &mut self.metrics;
        m.ticks += 1;
        m.last_updates = plan.updates_to_run;
        match plan.updates_to_run {
            0 => m.idle_ticks += 1,
            1 => {}
            _ => m.catch_up_ticks += 1,
        }
        if !plan.clamped.is_zero() {
            m.clamped_ticks += 1;
        }
        if plan.running_slowly && !self.update_time.running_slowly {
            m.running_slowly_transitions += 1;
        }
        m.slept_us += plan.slept.as_micros() as u64;
    }

    fn finish_tick(&mut self, started: Instant) {
        self.metrics.last_tick_us = started.elapsed().as_micros() as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_test_utils::{
        exclusive_context, GameEvent, ManualTimeSource, RecordingGame, ScriptedHost,
    };
    use std::sync::{Arc, Mutex};

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn config_16ms() -> EngineConfig {
        let mut c = EngineConfig {
            worker_count: Some(1),
            worker_name_prefix: "loop-test".to_string(),
            ..EngineConfig::default()
        };
        c.clock.target_step = ms(16);
        c
    }

    type TestLoop = GameLoop<Arc<ScriptedHost>, RecordingGame, ManualTimeSource>;

    fn build() -> (TestLoop, Arc<ScriptedHost>, ManualTimeSource) {
        let host = Arc::new(ScriptedHost::new());
        let source = ManualTimeSource::new();
        let lp = GameLoop::with_source(
            config_16ms(),
            Arc::clone(&host),
            RecordingGame::new(),
            source.clone(),
        )
        .unwrap();
        (lp, host, source)
    }

    #[test]
    fn updates_then_one_draw_per_tick() {
        let _guard = exclusive_context();
        let (mut lp, _host, source) = build();

        source.advance(ms(40));
        let plan = lp.tick().unwrap();
        assert_eq!(plan.updates_to_run, 2);

        let events = lp.game().events();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], GameEvent::Update(_)));
        assert!(matches!(events[1], GameEvent::Update(_)));
        assert!(events[2].is_draw());
        assert_eq!(events[0].time().elapsed, ms(16));
        assert_eq!(events[1].time().total, ms(32));
        assert_eq!(events[2].time().elapsed, ms(32));
        assert_eq!(lp.update_time().frame_count.0, 2);
        assert_eq!(lp.draw_time().frame_count.0, 1);
        lp.cleanup().unwrap();
    }

    #[test]
    fn idle_tick_runs_nothing() {
        let _guard = exclusive_context();
        let (mut lp, _host, source) = build();
        source.advance(ms(5));
        let plan = lp.tick().unwrap();
        assert!(plan.is_idle());
        assert!(lp.game().events().is_empty());
        assert_eq!(lp.metrics().idle_ticks, 1);
        lp.cleanup().unwrap();
    }

    #[test]
    fn suspended_host_updates_without_drawing() {
        let _guard = exclusive_context();
        let (mut lp, host, source) = build();
        host.set_suspended(true);
        source.advance(ms(32));
        let plan = lp.tick().unwrap();
        assert_eq!(plan.updates_to_run, 2);
        assert!(!plan.should_draw);
        assert_eq!(lp.game().suspended_update_count(), 2);
        assert_eq!(lp.game().draw_count(), 0);
        assert_eq!(lp.metrics().suspended_ticks, 1);
        lp.cleanup().unwrap();
    }

    #[test]
    fn queued_work_runs_before_the_update() {
        let _guard = exclusive_context();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o = Arc::clone(&order);
        let game = RecordingGame::with_update_hook(move |_| o.lock().unwrap().push("update"));
        let source = ManualTimeSource::new();
        let mut lp = GameLoop::with_source(config_16ms(), ScriptedHost::new(), game, source.clone())
            .unwrap();

        let handle = lp.handle();
        let o = Arc::clone(&order);
        std::thread::spawn(move || {
            handle
                .post(move || o.lock().unwrap().push("queued"))
                .unwrap();
        })
        .join()
        .unwrap();

        source.advance(ms(16));
        lp.tick().unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["queued", "update"]);
        assert_eq!(lp.metrics().context.work_items_drained, 1);
        lp.cleanup().unwrap();
    }

    #[test]
    fn clock_properties_round_trip() {
        let _guard = exclusive_context();
        let (mut lp, _host, _source) = build();
        assert_eq!(lp.target_step(), ms(16));
        assert_eq!(lp.inactive_sleep(), ms(20));
        assert!(lp.use_fixed_timestep());

        lp.set_target_step(ms(10)).unwrap();
        lp.set_inactive_sleep(ms(5));
        lp.set_use_fixed_timestep(false);
        assert_eq!(lp.target_step(), ms(10));
        assert_eq!(lp.inactive_sleep(), ms(5));
        assert!(!lp.use_fixed_timestep());
        assert!(lp.set_target_step(Duration::ZERO).is_err());
        lp.cleanup().unwrap();
    }

    #[test]
    fn reset_elapsed_time_zeroes_next_variable_delta() {
        let _guard = exclusive_context();
        let (mut lp, _host, source) = build();
        lp.set_use_fixed_timestep(false);
        source.advance(ms(300));
        lp.reset_elapsed_time();
        source.advance(ms(7));
        lp.tick().unwrap();
        assert_eq!(lp.update_time().elapsed, Duration::ZERO);
        lp.cleanup().unwrap();
    }

    #[test]
    fn cleanup_ends_pacing_and_disposes() {
        let _guard = exclusive_context();
        let (mut lp, _host, source) = build();
        source.advance(ms(16));
        lp.tick().unwrap();
        assert_eq!(source.pacing_depth(), 1);
        let report = lp.cleanup().unwrap();
        assert_eq!(report.workers_joined, 1);
        assert_eq!(source.pacing_depth(), 0);
        source.advance(ms(16));
        assert_eq!(
            lp.tick().unwrap_err(),
            ContextError::AlreadyDisposed { operation: "update" }
        );
    }

    #[test]
    fn run_until_stops_on_predicate() {
        let _guard = exclusive_context();
        let (mut lp, _host, source) = build();
        let s = source.clone();
        lp.run_until(|lp| {
            s.advance(ms(16));
            lp.game().update_count() >= 3
        })
        .unwrap();
        assert_eq!(lp.game().update_count(), 3);
        lp.cleanup().unwrap();
    }
}
