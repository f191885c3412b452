//! Frame scheduling for the Cadence engine.
//!
//! Provides the [`FrameClock`] (fixed/variable timestep with a bounded
//! accumulator), the cooperative single-threaded [`Executor`], the
//! background [`TaskRegistry`], and the [`EngineContext`] that binds them
//! to one owning thread. [`GameLoop`] composes all of it with a host and a
//! game.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
pub mod context;
pub mod executor;
pub mod game_loop;
pub mod metrics;
pub mod pool;
pub mod tasks;
pub mod work;

pub use clock::{FrameClock, SystemTimeSource, TickPlan};
pub use config::{ClockConfig, ConfigError, EngineConfig, DEFAULT_TARGET_STEP};
pub use context::{context_is_live, ContextHandle, EngineContext, ShutdownReport};
pub use executor::{Executor, ExecutorHandle};
pub use game_loop::GameLoop;
pub use metrics::{ContextStats, FrameMetrics};
pub use pool::WorkerPool;
pub use tasks::{CancellationToken, FaultObserver, SweepStats, TaskHandle, TaskRegistry, TaskStatus};
pub use work::{WorkHandle, WorkOptions};
