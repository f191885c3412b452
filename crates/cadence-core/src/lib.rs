//! Core types and traits for the Cadence frame scheduler.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the identifiers, the time context, the lifecycle states, the error
//! taxonomy, and the collaborator traits used throughout the workspace.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;
pub mod lifecycle;
pub mod time;
pub mod traits;

pub use error::{ContextError, Fault, WaitError};
pub use id::{FrameIndex, TaskId, WorkItemId};
pub use lifecycle::LifecycleState;
pub use time::FrameTime;
pub use traits::{Game, Host, TimeSource};
