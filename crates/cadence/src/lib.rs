//! Cadence: fixed-step frame scheduling with a cooperative owning-thread
//! executor.
//!
//! This is the top-level facade crate that re-exports the public API from
//! the Cadence sub-crates. For most users, adding `cadence` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use cadence::prelude::*;
//!
//! struct Window;
//! impl Host for Window {
//!     fn is_active(&self) -> bool { true }
//!     fn is_suspended(&self) -> bool { false }
//! }
//!
//! #[derive(Default)]
//! struct Sim { steps: u32 }
//! impl Game for Sim {
//!     fn update(&mut self, _time: &FrameTime) { self.steps += 1; }
//!     fn draw(&mut self, _time: &FrameTime) {}
//! }
//!
//! let config = EngineConfig { worker_count: Some(1), ..EngineConfig::default() };
//! let mut game_loop = GameLoop::new(config, Window, Sim::default()).unwrap();
//!
//! // Background work runs on a worker, its continuation on this thread.
//! let handle = game_loop.handle();
//! let owner = handle.clone();
//! handle
//!     .spawn(move |_token| {
//!         owner.post(|| println!("back on the owning thread")).unwrap();
//!     })
//!     .unwrap();
//!
//! game_loop.run_until(|lp| lp.game().steps >= 3).unwrap();
//! let report = game_loop.cleanup().unwrap();
//! assert_eq!(report.workers_joined, 1);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `cadence-core` | Ids, `FrameTime`, lifecycle, errors, `Host`/`Game`/`TimeSource` |
//! | [`engine`] | `cadence-engine` | Frame clock, executor, task registry, engine context, game loop |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and ids (`cadence-core`).
///
/// Contains the time context, lifecycle states, the error taxonomy, and the
/// collaborator traits ([`types::Host`], [`types::Game`],
/// [`types::TimeSource`]).
pub use cadence_core as types;

/// Scheduling engine (`cadence-engine`).
///
/// [`engine::FrameClock`] for the timestep algorithm,
/// [`engine::EngineContext`] for the owning-thread executor and background
/// tasks, [`engine::GameLoop`] to drive both from a host.
pub use cadence_engine as engine;

/// Common imports for typical Cadence usage.
///
/// ```rust
/// use cadence::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use cadence_core::{FrameTime, Game, Host, LifecycleState, TaskId, TimeSource};

    // Errors
    pub use cadence_core::{ContextError, Fault, WaitError};

    // Configuration
    pub use cadence_engine::{ClockConfig, ConfigError, EngineConfig};

    // Engine
    pub use cadence_engine::{
        CancellationToken, ContextHandle, EngineContext, FrameClock, FrameMetrics, GameLoop,
        ShutdownReport, TaskHandle, TaskStatus, TickPlan, WorkHandle, WorkOptions,
    };
}
