//! Background task tracking.
//!
//! Spawned tasks start out [`Created`](TaskStatus::Created) in the
//! registry's pending set. Each owning-thread update sweeps the set: new
//! tasks are handed to the [`WorkerPool`], terminal ones are retired.
//! Shutdown waits on the same set.
//!
//! The pending set lives behind one mutex. A sweep copies it into an
//! owner-only working buffer, inspects each task without holding the lock,
//! then removes the retired ids in a second short critical section. New
//! spawns landing in between are picked up by the next sweep.
//!
//! Closing the registry flips a flag under that same mutex, so a spawn
//! either lands before the close (and is seen by the shutdown wait) or is
//! rejected.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use smallvec::SmallVec;

use cadence_core::{ContextError, Fault, TaskId, WaitError};

use crate::pool::{Job, WorkerPool};

// ── TaskStatus ───────────────────────────────────────────────────

/// Lifecycle of a background task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TaskStatus {
    /// Registered, not yet handed to a worker.
    Created = 0,
    /// Handed to a worker; may or may not be executing yet.
    Running = 1,
    /// Body returned normally.
    Completed = 2,
    /// Canceled before the body started.
    Canceled = 3,
    /// Body panicked.
    Faulted = 4,
}

impl TaskStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::Canceled,
            _ => Self::Faulted,
        }
    }

    /// Completed, canceled, or faulted.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Canceled | Self::Faulted)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
            Self::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

// ── CancellationToken ────────────────────────────────────────────

/// Shared one-shot cancellation signal.
///
/// Every task spawned through a context observes the same token. Once
/// tripped it stays tripped.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A fresh, untripped token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Trip the token. Returns `true` if this call tripped it.
    pub(crate) fn cancel(&self) -> bool {
        !self.flag.swap(true, Ordering::AcqRel)
    }
}

/// Callback invoked on the worker thread when a task body panics.
pub type FaultObserver = Arc<dyn Fn(TaskId, &Fault) + Send + Sync>;

// ── TaskCell ─────────────────────────────────────────────────────

type Body<T> = Box<dyn FnOnce(&CancellationToken) -> T + Send + 'static>;

struct TaskCell<T> {
    id: TaskId,
    owner: ThreadId,
    status: AtomicU8,
    body: Mutex<Option<Body<T>>>,
    outcome: Mutex<Option<Result<T, WaitError>>>,
    done: Condvar,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl<T> TaskCell<T> {
    fn status(&self) -> TaskStatus {
        TaskStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn transition(&self, from: TaskStatus, to: TaskStatus) -> bool {
        self.status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn finish(&self, status: TaskStatus, result: Result<T, WaitError>) {
        let mut outcome = lock(&self.outcome);
        *outcome = Some(result);
        self.status.store(status as u8, Ordering::Release);
        self.done.notify_all();
    }

    /// Running → Canceled for a job that never reached a worker.
    fn abort_start(&self) {
        lock(&self.body).take();
        self.finish(TaskStatus::Canceled, Err(WaitError::Canceled));
    }
}

/// Type-erased view the registry keeps of every task.
trait TrackedTask: Send + Sync {
    fn id(&self) -> TaskId;
    fn status(&self) -> TaskStatus;
    fn start(self: Arc<Self>, token: CancellationToken, observer: Option<FaultObserver>) -> Option<Job>;
    fn abort_start(&self);
    fn cancel_unstarted(&self) -> bool;
}

impl<T: Send + 'static> TrackedTask for TaskCell<T> {
    fn id(&self) -> TaskId {
        self.id
    }

    fn status(&self) -> TaskStatus {
        TaskCell::status(self)
    }

    fn start(self: Arc<Self>, token: CancellationToken, observer: Option<FaultObserver>) -> Option<Job> {
        if !self.transition(TaskStatus::Created, TaskStatus::Running) {
            return None;
        }
        let body = lock(&self.body).take()?;
        Some(Box::new(move || {
            if token.is_cancelled() {
                self.finish(TaskStatus::Canceled, Err(WaitError::Canceled));
                return;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| body(&token))) {
                Ok(value) => self.finish(TaskStatus::Completed, Ok(value)),
                Err(payload) => {
                    let fault = Fault::from_panic(payload);
                    log::debug!("{} faulted: {}", self.id, fault.message());
                    if let Some(observer) = &observer {
                        observer(self.id, &fault);
                    }
                    self.finish(TaskStatus::Faulted, Err(WaitError::Faulted(fault)));
                }
            }
        }))
    }

    fn abort_start(&self) {
        TaskCell::abort_start(self)
    }

    fn cancel_unstarted(&self) -> bool {
        if !self.transition(TaskStatus::Created, TaskStatus::Canceled) {
            return false;
        }
        lock(&self.body).take();
        let mut outcome = lock(&self.outcome);
        *outcome = Some(Err(WaitError::Canceled));
        self.done.notify_all();
        true
    }
}

// ── TaskHandle ───────────────────────────────────────────────────

/// Handle to a spawned background task.
///
/// Faults are never rethrown on their own: they surface only through
/// [`wait`](Self::wait), [`fault`](Self::fault), or the context's fault
/// observer.
pub struct TaskHandle<T> {
    cell: Arc<TaskCell<T>>,
}

impl<T> TaskHandle<T> {
    /// Registry id.
    pub fn id(&self) -> TaskId {
        self.cell.id
    }

    /// Current status.
    pub fn status(&self) -> TaskStatus {
        self.cell.status()
    }

    /// Completed, canceled, or faulted.
    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// The fault, if the body panicked.
    pub fn fault(&self) -> Option<Fault> {
        match &*lock(&self.cell.outcome) {
            Some(Err(WaitError::Faulted(fault))) => Some(fault.clone()),
            _ => None,
        }
    }

    /// Take the result if the task is terminal.
    pub fn try_take(&mut self) -> Option<Result<T, WaitError>> {
        lock(&self.cell.outcome).take()
    }

    /// Block until the task is terminal.
    ///
    /// On the owning thread this never blocks: a task that is not yet
    /// terminal returns [`WaitError::WouldBlockOwner`]. Only an owner-side
    /// sweep can start it, and a running body may be waiting on a queued
    /// continuation that only the owner drains. Use
    /// [`EngineContext::wait_for_pending_tasks`](crate::context::EngineContext::wait_for_pending_tasks)
    /// there instead.
    pub fn wait(self) -> Result<T, WaitError> {
        self.wait_until(None)
    }

    /// Block for at most `timeout`. On [`WaitError::TimedOut`] the handle
    /// stays usable. The owning-thread rule of [`wait`](Self::wait) applies.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<T, WaitError> {
        self.wait_until(Some(Instant::now() + timeout))
    }

    fn wait_until(&self, deadline: Option<Instant>) -> Result<T, WaitError> {
        if thread::current().id() == self.cell.owner && !self.status().is_terminal() {
            return Err(WaitError::WouldBlockOwner);
        }
        let mut outcome = lock(&self.cell.outcome);
        loop {
            if let Some(result) = outcome.take() {
                return result;
            }
            if self.status().is_terminal() {
                return Err(WaitError::Abandoned);
            }
            outcome = match deadline {
                None => self.cell.done.wait(outcome).unwrap_or_else(|e| e.into_inner()),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(WaitError::TimedOut);
                    }
                    self.cell
                        .done
                        .wait_timeout(outcome, deadline - now)
                        .unwrap_or_else(|e| e.into_inner())
                        .0
                }
            };
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.cell.id)
            .field("status", &self.status())
            .finish()
    }
}

// ── TaskRegistry ─────────────────────────────────────────────────

/// Outcome of one [`TaskRegistry::sweep`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Tasks handed to the worker pool.
    pub started: usize,
    /// Terminal tasks removed from the pending set.
    pub retired: usize,
}

#[derive(Default)]
struct PendingSet {
    tasks: IndexMap<TaskId, Arc<dyn TrackedTask>>,
    closed: bool,
}

#[derive(Default)]
struct SweepBuffers {
    polling: Vec<Arc<dyn TrackedTask>>,
    retired: SmallVec<[TaskId; 8]>,
}

/// Pending-task set shared by the owning thread and every spawner.
pub struct TaskRegistry {
    owner: ThreadId,
    pending: Mutex<PendingSet>,
    /// Only the owning thread touches this; the mutex is never contended.
    buffers: Mutex<SweepBuffers>,
    token: CancellationToken,
    observer: Mutex<Option<FaultObserver>>,
}

impl TaskRegistry {
    /// An empty registry owned by the calling thread.
    pub fn new() -> Self {
        Self {
            owner: thread::current().id(),
            pending: Mutex::new(PendingSet::default()),
            buffers: Mutex::new(SweepBuffers::default()),
            token: CancellationToken::new(),
            observer: Mutex::new(None),
        }
    }

    /// Register a task in the `Created` state. Thread-safe.
    ///
    /// Fails with [`ContextError::SpawnAfterShutdown`] once the registry is
    /// [closed](Self::close).
    pub fn spawn<T, F>(&self, body: F) -> Result<TaskHandle<T>, ContextError>
    where
        T: Send + 'static,
        F: FnOnce(&CancellationToken) -> T + Send + 'static,
    {
        let cell = Arc::new(TaskCell {
            id: TaskId::next(),
            owner: self.owner,
            status: AtomicU8::new(TaskStatus::Created as u8),
            body: Mutex::new(Some(Box::new(body) as Body<T>)),
            outcome: Mutex::new(None),
            done: Condvar::new(),
        });
        let tracked: Arc<dyn TrackedTask> = Arc::clone(&cell) as Arc<dyn TrackedTask>;
        let mut pending = lock(&self.pending);
        if pending.closed {
            return Err(ContextError::SpawnAfterShutdown);
        }
        pending.tasks.insert(cell.id, tracked);
        Ok(TaskHandle { cell })
    }

    /// Reject every later spawn. Returns `true` on the first call.
    pub fn close(&self) -> bool {
        let mut pending = lock(&self.pending);
        !std::mem::replace(&mut pending.closed, true)
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        lock(&self.pending).closed
    }

    /// Start created tasks on `pool` and retire terminal ones.
    pub fn sweep(&self, pool: &WorkerPool) -> Result<SweepStats, ContextError> {
        self.check_owner("sweep")?;
        let mut stats = SweepStats::default();
        let mut buffers = lock(&self.buffers);
        let SweepBuffers { polling, retired } = &mut *buffers;

        polling.extend(lock(&self.pending).tasks.values().cloned());
        let observer = lock(&self.observer).clone();

        for task in polling.iter() {
            match task.status() {
                TaskStatus::Created => {
                    if let Some(job) = Arc::clone(task).start(self.token.clone(), observer.clone()) {
                        if pool.execute(job).is_err() {
                            log::warn!("worker pool closed; canceling {}", task.id());
                            task.abort_start();
                        } else {
                            stats.started += 1;
                        }
                    }
                }
                TaskStatus::Running => {}
                _ => retired.push(task.id()),
            }
        }

        if !retired.is_empty() {
            let mut pending = lock(&self.pending);
            for id in retired.iter() {
                pending.tasks.shift_remove(id);
            }
            stats.retired = retired.len();
        }
        polling.clear();
        retired.clear();
        Ok(stats)
    }

    /// Remove every terminal task. Returns how many were removed.
    pub fn retire_terminal(&self) -> usize {
        let mut pending = lock(&self.pending);
        let before = pending.tasks.len();
        pending.tasks.retain(|_, task| !task.status().is_terminal());
        before - pending.tasks.len()
    }

    /// Whether nothing is left to wait for: every pending task is either
    /// terminal or was never started.
    pub fn all_settled(&self) -> bool {
        lock(&self.pending)
            .tasks
            .values()
            .all(|t| t.status() != TaskStatus::Running)
    }

    /// Move every never-started task to `Canceled`. Returns the count.
    pub fn cancel_unstarted(&self) -> usize {
        lock(&self.pending)
            .tasks
            .values()
            .filter(|t| t.cancel_unstarted())
            .count()
    }

    /// Trip the shared cancellation token. Returns `true` on the first call.
    pub fn cancel(&self) -> bool {
        self.token.cancel()
    }

    /// The token every task body receives.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Tasks currently in the pending set.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).tasks.len()
    }

    /// Install (or clear) the fault observer for tasks started from now on.
    pub fn set_fault_observer(&self, observer: Option<FaultObserver>) {
        *lock(&self.observer) = observer;
    }

    fn check_owner(&self, operation: &'static str) -> Result<(), ContextError> {
        let caller = thread::current().id();
        if caller != self.owner {
            return Err(ContextError::WrongThread {
                operation,
                owner: self.owner,
                caller,
            });
        }
        Ok(())
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}
