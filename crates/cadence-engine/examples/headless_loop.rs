//! Headless game loop: fixed-step updates, background work, clean shutdown.
//!
//! Demonstrates:
//!   1. Building a `GameLoop` on the wall clock
//!   2. Spawning a background task that hands results back to the
//!      owning thread through the executor queue
//!   3. Reading frame metrics
//!   4. Disposing with `cleanup()` and printing the shutdown report
//!
//! Run with:
//!   RUST_LOG=cadence_engine=debug cargo run --example headless_loop

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cadence_core::{ContextError, FrameTime, Game, Host};
use cadence_engine::{ContextHandle, EngineConfig, GameLoop, TaskHandle, WorkOptions};

// ─── Host: always active, never suspended ───────────────────────

struct Headless;

impl Host for Headless {
    fn is_active(&self) -> bool {
        true
    }

    fn is_suspended(&self) -> bool {
        false
    }
}

// ─── Game: counts frames and collects background results ────────

#[derive(Default)]
struct Counter {
    updates: u64,
    draws: u64,
}

impl Game for Counter {
    fn update(&mut self, _time: &FrameTime) {
        self.updates += 1;
    }

    fn draw(&mut self, time: &FrameTime) {
        self.draws += 1;
        if self.draws % 30 == 0 {
            log::info!(
                "draw {} at {:.2}s (slow: {})",
                self.draws,
                time.total.as_secs_f32(),
                time.running_slowly
            );
        }
    }
}

fn is_prime(n: u64) -> bool {
    n >= 2 && (2..).take_while(|d| d * d <= n).all(|d| n % d != 0)
}

/// Count primes in `range` on a worker, then report the count from the
/// owning thread via a queued continuation.
fn spawn_search(
    handle: &ContextHandle,
    range: Range<u64>,
    total: Arc<AtomicU64>,
) -> Result<TaskHandle<u64>, ContextError> {
    let owner = handle.clone();
    handle.spawn(move |token| {
        let start = range.start;
        let mut hits = 0;
        for n in range {
            if token.is_cancelled() {
                return hits;
            }
            if is_prime(n) {
                hits += 1;
            }
        }
        let report = owner.queue_work_item(
            move || {
                total.fetch_add(hits, Ordering::Relaxed);
                log::info!("chunk from {start}: {hits} primes");
            },
            WorkOptions::NONE,
        );
        if let Ok(Some(pending)) = report {
            let _ = pending.wait();
        }
        hits
    })
}

fn main() {
    let mut builder = env_logger::Builder::new();
    match std::env::var("RUST_LOG") {
        Ok(filter) => builder.parse_filters(&filter),
        Err(_) => builder.filter_level(log::LevelFilter::Info),
    };
    builder.init();

    let config = EngineConfig {
        worker_count: Some(2),
        ..EngineConfig::default()
    };
    let mut game_loop = match GameLoop::new(config, Headless, Counter::default()) {
        Ok(l) => l,
        Err(e) => {
            log::error!("failed to start: {e}");
            return;
        }
    };

    let handle = game_loop.handle();
    let total = Arc::new(AtomicU64::new(0));
    let mut tasks = Vec::new();
    for chunk in 0..4u64 {
        match spawn_search(&handle, chunk * 50_000..(chunk + 1) * 50_000, Arc::clone(&total)) {
            Ok(task) => tasks.push(task),
            Err(e) => log::error!("spawn failed: {e}"),
        }
    }

    let mut ticks = 0;
    let result = game_loop.run_until(|lp| {
        ticks += 1;
        ticks > 240 || lp.update_time().total >= Duration::from_secs(3)
    });
    if let Err(e) = result {
        log::error!("loop stopped: {e}");
    }

    if let Err(e) = game_loop.context_mut().wait_for_pending_tasks(false) {
        log::error!("waiting for tasks failed: {e}");
    }
    for task in tasks {
        let id = task.id();
        match task.wait() {
            Ok(hits) => log::debug!("{id} finished with {hits} primes"),
            Err(e) => log::warn!("{id} did not finish: {e}"),
        }
    }

    let counter = game_loop.game();
    let metrics = game_loop.metrics();
    println!(
        "updates={} draws={} idle_ticks={} catch_up_ticks={} tasks_started={}",
        counter.updates,
        counter.draws,
        metrics.idle_ticks,
        metrics.catch_up_ticks,
        metrics.context.tasks_started
    );
    println!("primes reported on the owning thread: {}", total.load(Ordering::Relaxed));

    match game_loop.cleanup() {
        Ok(report) => println!("shutdown: {report:?}"),
        Err(e) => log::error!("cleanup failed: {e}"),
    }
}
