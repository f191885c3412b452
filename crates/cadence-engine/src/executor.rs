//! Cooperative single-threaded executor.
//!
//! Any thread may [`post`](ExecutorHandle::post) a callback; only the
//! owning thread drains them, one at a time, in post order. Callbacks never
//! run concurrently with each other or with the owner's update/draw logic.
//!
//! The queue is an unbounded crossbeam channel (multi-producer, single
//! consumer) plus an atomic pending counter. [`Executor::drain_all`] uses a
//! snapshot of that counter to bound each pass, so callbacks that post more
//! work cannot keep the owner draining forever.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use cadence_core::{ContextError, Fault, WorkItemId};

/// Type-erased queued callback. `Err` means the callback panicked.
pub(crate) type WorkFn = Box<dyn FnOnce() -> Result<(), Fault> + Send + 'static>;

/// One queued callback.
pub(crate) struct WorkItem {
    id: WorkItemId,
    run: WorkFn,
}

struct QueueShared {
    owner: ThreadId,
    pending: AtomicUsize,
    posted: AtomicU64,
}

// ── ExecutorHandle ───────────────────────────────────────────────

/// Posting side of the executor. Cheap to clone, safe to share.
#[derive(Clone)]
pub struct ExecutorHandle {
    tx: Sender<WorkItem>,
    shared: Arc<QueueShared>,
}

// Compile-time assertion: ExecutorHandle must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<ExecutorHandle>();
};

impl ExecutorHandle {
    /// Append `callback` to the queue. Returns immediately; the callback
    /// runs later on the owning thread.
    ///
    /// A panic inside the callback surfaces from the drain call that ran
    /// it as [`ContextError::WorkItemFailed`].
    pub fn post<F>(&self, callback: F) -> Result<WorkItemId, ContextError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_boxed(Box::new(move || {
            panic::catch_unwind(AssertUnwindSafe(callback)).map_err(Fault::from_panic)
        }))
    }

    pub(crate) fn post_boxed(&self, run: WorkFn) -> Result<WorkItemId, ContextError> {
        let id = WorkItemId::next();
        // Count before sending so a concurrent drain_all snapshot never
        // misses an item that is already visible in the channel.
        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(WorkItem { id, run }).is_err() {
            self.shared.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(ContextError::AlreadyDisposed { operation: "post" });
        }
        self.shared.posted.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    /// Run `callback` immediately on the calling thread, bypassing the
    /// queue. Only meaningful when the caller already is the owning thread.
    pub fn send<R>(&self, callback: impl FnOnce() -> R) -> R {
        callback()
    }

    /// Whether the calling thread owns this executor.
    pub fn is_owning_thread(&self) -> bool {
        thread::current().id() == self.shared.owner
    }

    /// The owning thread.
    pub fn owner(&self) -> ThreadId {
        self.shared.owner
    }

    /// Items posted but not yet drained.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Total items ever posted.
    pub fn posted(&self) -> u64 {
        self.shared.posted.load(Ordering::Relaxed)
    }
}

// ── Executor ─────────────────────────────────────────────────────

/// Draining side of the executor, owned by the owning thread.
pub struct Executor {
    rx: Receiver<WorkItem>,
    handle: ExecutorHandle,
    drained: u64,
}

impl Executor {
    /// Create an executor owned by the calling thread.
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            rx,
            handle: ExecutorHandle {
                tx,
                shared: Arc::new(QueueShared {
                    owner: thread::current().id(),
                    pending: AtomicUsize::new(0),
                    posted: AtomicU64::new(0),
                }),
            },
            drained: 0,
        }
    }

    /// A posting handle for other threads.
    pub fn handle(&self) -> ExecutorHandle {
        self.handle.clone()
    }

    /// Items posted but not yet drained.
    pub fn pending(&self) -> usize {
        self.handle.pending()
    }

    /// Total items drained (including ones that panicked).
    pub fn drained(&self) -> u64 {
        self.drained
    }

    /// Run at most one queued callback. Returns whether one ran.
    pub fn drain_one(&mut self) -> Result<bool, ContextError> {
        self.check_owner("drain_one")?;
        self.run_next()
    }

    /// Run the callbacks that were pending when the call started.
    ///
    /// Work posted by those callbacks waits for the next pass. A panicking
    /// callback aborts the pass; the items behind it stay queued. Returns
    /// how many callbacks ran.
    pub fn drain_all(&mut self) -> Result<usize, ContextError> {
        self.check_owner("drain_all")?;
        let budget = self.pending();
        let mut ran = 0;
        while ran < budget {
            if !self.run_next()? {
                break;
            }
            ran += 1;
        }
        Ok(ran)
    }

    fn run_next(&mut self) -> Result<bool, ContextError> {
        let item = match self.rx.try_recv() {
            Ok(item) => item,
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return Ok(false),
        };
        self.handle.shared.pending.fetch_sub(1, Ordering::AcqRel);
        self.drained += 1;
        (item.run)().map_err(|fault| {
            log::debug!("{} panicked while draining: {}", item.id, fault.message());
            ContextError::WorkItemFailed(fault)
        })?;
        Ok(true)
    }

    fn check_owner(&self, operation: &'static str) -> Result<(), ContextError> {
        let caller = thread::current().id();
        if caller != self.handle.shared.owner {
            return Err(ContextError::WrongThread {
                operation,
                owner: self.handle.shared.owner,
                caller,
            });
        }
        Ok(())
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}
