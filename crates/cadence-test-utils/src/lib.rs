//! Test utilities and mock collaborators for Cadence development.
//!
//! Provides a virtual clock ([`ManualTimeSource`]), a host whose state can
//! be flipped from the test ([`ScriptedHost`]), a [`Game`] that records
//! every callback ([`RecordingGame`]), and helpers for the process-wide
//! engine-context singleton.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Once};
use std::time::Duration;

use cadence_core::{FrameTime, Game, Host, TimeSource};

pub use fixtures::{GameEvent, RecordingGame};

// ── Singleton guard ──────────────────────────────────────────────

static CONTEXT_GUARD: Mutex<()> = Mutex::new(());

/// Serialize tests that construct an engine context.
///
/// Only one context may be live per process, and the test harness runs
/// tests on parallel threads. Hold the returned guard for the lifetime of
/// the context. A test that panicked while holding the guard does not
/// poison it for the others.
pub fn exclusive_context() -> MutexGuard<'static, ()> {
    CONTEXT_GUARD.lock().unwrap_or_else(|e| e.into_inner())
}

// ── Logging ──────────────────────────────────────────────────────

static LOG_INIT: Once = Once::new();

/// Install an `env_logger` that writes through the test harness capture.
///
/// Idempotent. Honours `RUST_LOG`; defaults to `debug` for Cadence crates.
pub fn init_test_logging() {
    LOG_INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();
        if let Ok(filter) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filter);
        } else {
            builder.filter_level(log::LevelFilter::Warn);
            builder.filter_module("cadence_engine", log::LevelFilter::Debug);
        }
        builder.is_test(true);
        let _ = builder.try_init();
    });
}

// ── ManualTimeSource ─────────────────────────────────────────────

struct ManualState {
    now_ns: AtomicU64,
    sleep_advances: AtomicBool,
    pacing: AtomicI64,
    sleeps: Mutex<Vec<Duration>>,
}

/// Virtual time source for deterministic clock tests.
///
/// Time only moves when the test calls [`advance`](Self::advance), or when
/// code under test calls `sleep` (unless disabled with
/// [`set_sleep_advances`](Self::set_sleep_advances)). Clones share state.
#[derive(Clone)]
pub struct ManualTimeSource {
    state: Arc<ManualState>,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self {
            state: Arc::new(ManualState {
                now_ns: AtomicU64::new(0),
                sleep_advances: AtomicBool::new(true),
                pacing: AtomicI64::new(0),
                sleeps: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Move virtual time forward.
    pub fn advance(&self, by: Duration) {
        self.state
            .now_ns
            .fetch_add(by.as_nanos() as u64, Ordering::AcqRel);
    }

    /// Whether `sleep` moves virtual time forward. Default: true.
    pub fn set_sleep_advances(&self, advances: bool) {
        self.state.sleep_advances.store(advances, Ordering::Release);
    }

    /// Every sleep requested so far, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state
            .sleeps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Sum of all sleeps requested so far.
    pub fn total_slept(&self) -> Duration {
        self.sleeps().into_iter().sum()
    }

    /// `begin_pacing` calls minus `end_pacing` calls.
    pub fn pacing_depth(&self) -> i64 {
        self.state.pacing.load(Ordering::Acquire)
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.state.now_ns.load(Ordering::Acquire))
    }

    fn sleep(&self, duration: Duration) {
        self.state
            .sleeps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
        if self.state.sleep_advances.load(Ordering::Acquire) {
            self.advance(duration);
        }
    }

    fn begin_pacing(&self) {
        self.state.pacing.fetch_add(1, Ordering::AcqRel);
    }

    fn end_pacing(&self) {
        self.state.pacing.fetch_sub(1, Ordering::AcqRel);
    }
}

// ── ScriptedHost ─────────────────────────────────────────────────

/// Host whose active/suspended state is set by the test.
///
/// Share it as `Arc<ScriptedHost>` to flip state while a loop owns it.
pub struct ScriptedHost {
    active: AtomicBool,
    suspended: AtomicBool,
    sleep_hint: Mutex<Option<Duration>>,
}

impl ScriptedHost {
    /// An active, non-suspended host.
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(true),
            suspended: AtomicBool::new(false),
            sleep_hint: Mutex::new(None),
        }
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    pub fn set_suspended(&self, suspended: bool) {
        self.suspended.store(suspended, Ordering::Release);
    }

    pub fn set_sleep_hint(&self, hint: Option<Duration>) {
        *self.sleep_hint.lock().unwrap_or_else(|e| e.into_inner()) = hint;
    }
}

impl Default for ScriptedHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for ScriptedHost {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    fn inactive_sleep_hint(&self) -> Option<Duration> {
        *self.sleep_hint.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A game that does nothing. Useful when only the scheduling matters.
#[derive(Default)]
pub struct NullGame;

impl Game for NullGame {
    fn update(&mut self, _time: &FrameTime) {}

    fn draw(&mut self, _time: &FrameTime) {}
}
