//! Strongly-typed identifiers for scheduled work.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for unique [`TaskId`] allocation.
static TASK_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Counter for unique [`WorkItemId`] allocation.
static WORK_ITEM_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifies a background task tracked by the task registry.
///
/// Allocated from a process-wide monotonic counter via [`TaskId::next`].
/// Ids are never reused, so a stale id can never alias a newer task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Allocate a fresh, unique task id. Thread-safe.
    pub fn next() -> Self {
        Self(TASK_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Identifies an item posted to the executor queue.
///
/// Ids are allocated in post order, so comparing two ids from the same
/// process tells which item was posted first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkItemId(u64);

impl WorkItemId {
    /// Allocate a fresh, unique work item id. Thread-safe.
    pub fn next() -> Self {
        Self(WORK_ITEM_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "work#{}", self.0)
    }
}

/// Monotonically increasing frame counter.
///
/// Counts logical updates (or draws) performed since the loop started.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameIndex(pub u64);

impl fmt::Display for FrameIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for FrameIndex {
    fn from(v: u64) -> Self {
        Self(v)
    }
}
