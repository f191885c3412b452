//! Benchmark profiles and workloads for the Cadence frame scheduler.
//!
//! - [`reference_config`]: 60 Hz fixed step, 4 workers
//! - [`stress_config`]: 240 Hz fixed step, 16 workers
//! - [`post_burst`]: enqueue a burst of no-op work items
//! - [`wall_pattern`]: deterministic per-tick wall times with periodic spikes

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::time::Duration;

use cadence_engine::{ClockConfig, EngineConfig, ExecutorHandle};

/// Reference profile: 60 Hz fixed step, 4 background workers.
pub fn reference_config() -> EngineConfig {
    EngineConfig {
        worker_count: Some(4),
        worker_name_prefix: "bench-worker".to_string(),
        clock: ClockConfig::default(),
    }
}

/// Stress profile: 240 Hz fixed step, 16 background workers.
///
/// Same clock policy as [`reference_config`] at four times the update rate.
pub fn stress_config() -> EngineConfig {
    EngineConfig {
        worker_count: Some(16),
        worker_name_prefix: "bench-stress".to_string(),
        clock: ClockConfig {
            target_step: Duration::from_nanos(4_166_667),
            ..ClockConfig::default()
        },
    }
}

/// Post `n` no-op callbacks. Returns how many were accepted.
pub fn post_burst(handle: &ExecutorHandle, n: usize) -> usize {
    (0..n).filter(|_| handle.post(|| {}).is_ok()).count()
}

/// Deterministic wall-time pattern: mostly on-budget ticks around
/// `step`, with a spike of `spike_factor` steps every `period` ticks.
pub fn wall_pattern(step: Duration, ticks: usize, period: usize, spike_factor: u32) -> Vec<Duration> {
    (0..ticks)
        .map(|i| {
            if period > 0 && i % period == period - 1 {
                step * spike_factor
            } else if i % 3 == 0 {
                step + step / 4
            } else {
                step - step / 8
            }
        })
        .collect()
}
