//! The engine context: executor queue, task registry, worker pool, and
//! lifecycle, bound to one owning thread.
//!
//! At most one [`EngineContext`] is live per process. It is not ambient:
//! code that needs to post work back to the owning thread or spawn
//! background work receives a [`ContextHandle`] explicitly.
//!
//! # Lifecycle
//!
//! ```text
//! new() ──► Initialized ──update/draw──► Running ──dispose()──► Disposing ──► Disposed
//!                 └──────────────────dispose()──────────────────┘
//! ```
//!
//! Disposing rejects new tasks but still accepts queued work, since the
//! tasks being waited on may need owning-thread continuations to finish.
//! Disposed rejects everything except property reads.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Instant;

use cadence_core::{ContextError, Fault, FrameTime, LifecycleState, TaskId};

use crate::config::EngineConfig;
use crate::executor::{Executor, ExecutorHandle};
use crate::metrics::ContextStats;
use crate::pool::WorkerPool;
use crate::tasks::{CancellationToken, FaultObserver, TaskHandle, TaskRegistry};
use crate::work::{WorkHandle, WorkOptions};

// ── Singleton claim ──────────────────────────────────────────────

static CONTEXT_LIVE: AtomicBool = AtomicBool::new(false);

struct ContextClaim;

impl ContextClaim {
    fn acquire() -> Result<Self, ContextError> {
        CONTEXT_LIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ContextClaim)
            .map_err(|_| ContextError::DuplicateContext)
    }
}

impl Drop for ContextClaim {
    fn drop(&mut self) {
        CONTEXT_LIVE.store(false, Ordering::Release);
    }
}

/// Whether an engine context is currently live in this process.
pub fn context_is_live() -> bool {
    CONTEXT_LIVE.load(Ordering::Acquire)
}

// ── ShutdownReport ───────────────────────────────────────────────

/// Report from [`EngineContext::dispose`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Total time spent in the shutdown sequence.
    pub total_ms: u64,
    /// Time spent waiting for pending tasks.
    pub wait_ms: u64,
    /// Drain-and-yield iterations of the pending-task wait.
    pub wait_iterations: usize,
    /// Tasks canceled before they started.
    pub tasks_canceled: usize,
    /// Work items drained during shutdown.
    pub work_items_drained: usize,
    /// Work items that panicked during shutdown. Logged, not propagated.
    pub work_item_faults: usize,
    /// Shutdown hooks run.
    pub hooks_run: usize,
    /// Shutdown hooks that panicked.
    pub hook_faults: usize,
    /// Worker threads joined.
    pub workers_joined: usize,
}

#[derive(Default)]
struct WaitTally {
    iterations: usize,
    canceled: usize,
    drained: usize,
    faults: usize,
}

// ── Shared state ─────────────────────────────────────────────────

struct Shared {
    owner: ThreadId,
    state: AtomicU8,
    registry: TaskRegistry,
}

impl Shared {
    fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: LifecycleState) {
        log::debug!("engine context {} -> {}", self.state(), state);
        self.state.store(state.as_u8(), Ordering::Release);
    }
}

// ── ContextHandle ────────────────────────────────────────────────

/// Cloneable, thread-safe access to a live context.
///
/// Everything here may be called from any thread. Calls made after the
/// context is disposed fail with [`ContextError::AlreadyDisposed`].
#[derive(Clone)]
pub struct ContextHandle {
    shared: Arc<Shared>,
    executor: ExecutorHandle,
}

// Compile-time assertion: ContextHandle must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<ContextHandle>();
};

impl ContextHandle {
    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.shared.state()
    }

    /// The owning thread.
    pub fn owner(&self) -> ThreadId {
        self.shared.owner
    }

    /// Whether the calling thread is the owning thread.
    pub fn is_owning_thread(&self) -> bool {
        thread::current().id() == self.shared.owner
    }

    /// Queued work items not yet drained.
    pub fn pending_work_items(&self) -> usize {
        self.executor.pending()
    }

    /// Tasks in the registry's pending set.
    pub fn pending_tasks(&self) -> usize {
        self.shared.registry.pending_count()
    }

    /// The cancellation token every spawned task receives.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shared.registry.token().clone()
    }

    /// Post a fire-and-forget callback to the owning thread. Never runs
    /// inline, even when called on the owning thread.
    pub fn post<F>(&self, callback: F) -> Result<(), ContextError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.check_accepts_work("post")?;
        self.executor.post(callback).map(|_| ())
    }

    /// Queue work that produces no value.
    pub fn queue_action<F>(
        &self,
        work: F,
        options: WorkOptions,
    ) -> Result<Option<WorkHandle<()>>, ContextError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue_work_item(work, options)
    }

    /// Queue work for the owning thread.
    ///
    /// On the owning thread without
    /// [`force_asynchronous_execution`](WorkOptions::force_asynchronous_execution)
    /// the work runs inline and the returned handle is already resolved
    /// (or `None` with
    /// [`return_none_on_synchronous_execution`](WorkOptions::return_none_on_synchronous_execution)).
    /// Otherwise it is posted and resolves when the owner drains it.
    pub fn queue_work_item<T, F>(
        &self,
        work: F,
        options: WorkOptions,
    ) -> Result<Option<WorkHandle<T>>, ContextError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.check_accepts_work("queue_work_item")?;
        if self.runs_inline(options) {
            let value = self.executor.send(work);
            return Ok(self.resolved(value, options));
        }
        let (tx, rx) = crossbeam_channel::bounded(1);
        let id = self.executor.post_boxed(Box::new(move || {
            match panic::catch_unwind(AssertUnwindSafe(work)) {
                Ok(value) => {
                    let _ = tx.send(Ok(value));
                    Ok(())
                }
                Err(payload) => {
                    let fault = Fault::from_panic(payload);
                    let _ = tx.send(Err(fault.clone()));
                    Err(fault)
                }
            }
        }))?;
        Ok(Some(WorkHandle::pending(id, rx, self.shared.owner)))
    }

    /// Queue work that itself returns a further handle. The returned handle
    /// resolves with the inner handle's result.
    pub fn queue_work_item_chained<T, F>(
        &self,
        work: F,
        options: WorkOptions,
    ) -> Result<Option<WorkHandle<T>>, ContextError>
    where
        T: Send + 'static,
        F: FnOnce() -> WorkHandle<T> + Send + 'static,
    {
        self.check_accepts_work("queue_work_item_chained")?;
        if self.runs_inline(options) {
            let inner = self.executor.send(work);
            return Ok((!options.return_none_on_synchronous_execution).then_some(inner));
        }
        let (tx, rx) = crossbeam_channel::bounded(1);
        let id = self.executor.post_boxed(Box::new(move || {
            match panic::catch_unwind(AssertUnwindSafe(work)) {
                Ok(inner) => {
                    let _ = tx.send(Ok(inner));
                    Ok(())
                }
                Err(payload) => {
                    let fault = Fault::from_panic(payload);
                    let _ = tx.send(Err(fault.clone()));
                    Err(fault)
                }
            }
        }))?;
        Ok(Some(WorkHandle::chained(id, rx, self.shared.owner)))
    }

    /// Register a background task. It starts on a worker at the next
    /// update's sweep, never before.
    ///
    /// A task that panics is silent unless its handle is inspected or a
    /// fault observer is installed.
    pub fn spawn<T, F>(&self, action: F) -> Result<TaskHandle<T>, ContextError>
    where
        T: Send + 'static,
        F: FnOnce(&CancellationToken) -> T + Send + 'static,
    {
        match self.state() {
            LifecycleState::Disposed => Err(ContextError::AlreadyDisposed { operation: "spawn" }),
            state if !state.accepts_spawn() => Err(ContextError::SpawnAfterShutdown),
            // The registry re-checks under its own lock; dispose may have
            // started since the state was read.
            _ => self.shared.registry.spawn(action),
        }
    }

    /// Install (or clear) the hook called on the worker thread when a
    /// task body panics.
    pub fn set_fault_observer<F>(&self, observer: Option<F>)
    where
        F: Fn(TaskId, &Fault) + Send + Sync + 'static,
    {
        let observer = observer.map(|f| Arc::new(f) as FaultObserver);
        self.shared.registry.set_fault_observer(observer);
    }

    fn runs_inline(&self, options: WorkOptions) -> bool {
        !options.force_asynchronous_execution && self.is_owning_thread()
    }

    fn resolved<T>(&self, value: T, options: WorkOptions) -> Option<WorkHandle<T>> {
        (!options.return_none_on_synchronous_execution)
            .then(|| WorkHandle::ready(value, self.shared.owner))
    }

    fn check_accepts_work(&self, operation: &'static str) -> Result<(), ContextError> {
        if self.state().accepts_work() {
            Ok(())
        } else {
            Err(ContextError::AlreadyDisposed { operation })
        }
    }
}

// ── EngineContext ────────────────────────────────────────────────

type ShutdownHook = Box<dyn FnOnce() + Send + 'static>;

/// Owning-thread side of the engine: drains the queue, sweeps the task
/// registry, runs update/draw callbacks, and shuts everything down.
pub struct EngineContext {
    handle: ContextHandle,
    executor: Executor,
    pool: WorkerPool,
    shutdown_hooks: Vec<ShutdownHook>,
    stats: ContextStats,
    claim: Option<ContextClaim>,
}

impl EngineContext {
    /// Create the context, owned by the calling thread, and start its
    /// worker pool.
    ///
    /// Fails with [`ContextError::DuplicateContext`] while another context
    /// is live.
    pub fn new(config: &EngineConfig) -> Result<Self, ContextError> {
        config.validate()?;
        let claim = ContextClaim::acquire()?;
        let workers = config.resolved_worker_count();
        let pool = WorkerPool::new(workers, &config.worker_name_prefix)?;
        let executor = Executor::new();
        let shared = Arc::new(Shared {
            owner: thread::current().id(),
            state: AtomicU8::new(LifecycleState::Initialized.as_u8()),
            registry: TaskRegistry::new(),
        });
        log::info!(
            "engine context created on {:?} with {workers} workers",
            shared.owner
        );
        Ok(Self {
            handle: ContextHandle {
                shared,
                executor: executor.handle(),
            },
            executor,
            pool,
            shutdown_hooks: Vec::new(),
            stats: ContextStats::default(),
            claim: Some(claim),
        })
    }

    /// A cloneable handle for other threads and subsystems.
    pub fn handle(&self) -> ContextHandle {
        self.handle.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.handle.state()
    }

    /// The owning thread.
    pub fn owner(&self) -> ThreadId {
        self.handle.owner()
    }

    /// Cumulative counters.
    pub fn stats(&self) -> ContextStats {
        self.stats
    }

    /// Number of background worker threads.
    pub fn worker_count(&self) -> usize {
        self.pool.size()
    }

    /// Ids of the background worker threads.
    pub fn worker_thread_ids(&self) -> &[ThreadId] {
        self.pool.thread_ids()
    }

    /// One logical update: drain the queue, sweep the task registry, then
    /// run `callback`.
    ///
    /// A panicking work item aborts the update before `callback` runs and
    /// is returned as [`ContextError::WorkItemFailed`]; the next update
    /// resumes with the items behind it.
    pub fn update(
        &mut self,
        time: &FrameTime,
        callback: impl FnOnce(&FrameTime),
    ) -> Result<(), ContextError> {
        self.enter("update")?;
        let drained = self.executor.drain_all();
        self.stats.work_items_drained = self.executor.drained();
        if let Err(e) = drained {
            self.stats.work_item_faults += 1;
            return Err(e);
        }
        let sweep = self.handle.shared.registry.sweep(&self.pool)?;
        self.stats.tasks_started += sweep.started as u64;
        self.stats.tasks_retired += sweep.retired as u64;
        callback(time);
        self.stats.updates += 1;
        Ok(())
    }

    /// Run `callback` as the frame's draw.
    pub fn draw(
        &mut self,
        time: &FrameTime,
        callback: impl FnOnce(&FrameTime),
    ) -> Result<(), ContextError> {
        self.enter("draw")?;
        callback(time);
        self.stats.draws += 1;
        Ok(())
    }

    /// Block until no task is running, draining the queue between checks.
    ///
    /// With `cancel`, the shared cancellation token is tripped and
    /// never-started tasks move to `Canceled`. Without it they stay
    /// registered and are not waited for. Returns the iterations taken.
    pub fn wait_for_pending_tasks(&mut self, cancel: bool) -> Result<usize, ContextError> {
        self.check_owner("wait_for_pending_tasks")?;
        self.check_not_disposed("wait_for_pending_tasks")?;
        let mut tally = WaitTally::default();
        self.wait_pending(cancel, None, false, &mut tally)?;
        Ok(tally.iterations)
    }

    /// [`wait_for_pending_tasks`](Self::wait_for_pending_tasks) with an
    /// iteration cap. Fails with [`ContextError::WaitLimitReached`] instead
    /// of looping forever.
    pub fn wait_for_pending_tasks_with_limit(
        &mut self,
        cancel: bool,
        max_iterations: usize,
    ) -> Result<usize, ContextError> {
        self.check_owner("wait_for_pending_tasks_with_limit")?;
        self.check_not_disposed("wait_for_pending_tasks_with_limit")?;
        let mut tally = WaitTally::default();
        self.wait_pending(cancel, Some(max_iterations), false, &mut tally)?;
        Ok(tally.iterations)
    }

    /// Register a callback to run during [`dispose`](Self::dispose), after
    /// the final queue drain. Hooks run in registration order.
    pub fn on_shutdown(&mut self, hook: impl FnOnce() + Send + 'static) -> Result<(), ContextError> {
        self.check_owner("on_shutdown")?;
        self.check_not_disposed("on_shutdown")?;
        self.shutdown_hooks.push(Box::new(hook));
        Ok(())
    }

    /// Shut the context down.
    ///
    /// 1. Enter `Disposing` and close the task registry: new tasks are
    ///    rejected, including spawns already past the state check.
    /// 2. Cancel and wait for every pending task, draining the queue
    ///    between checks. Work-item panics are logged and counted.
    /// 3. Drain the queue once more.
    /// 4. Run shutdown hooks.
    /// 5. Join the worker pool, enter `Disposed`, release the singleton.
    ///
    /// Calling it again returns an empty report.
    pub fn dispose(&mut self) -> Result<ShutdownReport, ContextError> {
        self.check_owner("dispose")?;
        if self.state() == LifecycleState::Disposed {
            return Ok(ShutdownReport::default());
        }

        let start = Instant::now();
        self.handle.shared.set_state(LifecycleState::Disposing);
        self.handle.shared.registry.close();

        let mut tally = WaitTally::default();
        self.wait_pending(true, None, true, &mut tally)?;
        let wait_ms = start.elapsed().as_millis() as u64;

        loop {
            match self.executor.drain_all() {
                Ok(n) => {
                    tally.drained += n;
                    break;
                }
                Err(e) => self.record_shutdown_fault(&e, &mut tally),
            }
        }
        self.handle.shared.registry.retire_terminal();

        let mut hooks_run = 0;
        let mut hook_faults = 0;
        for hook in self.shutdown_hooks.drain(..) {
            hooks_run += 1;
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(hook)) {
                hook_faults += 1;
                log::error!("shutdown hook panicked: {}", Fault::from_panic(payload));
            }
        }

        let workers_joined = self.pool.shutdown();
        self.stats.work_items_drained = self.executor.drained();
        self.handle.shared.set_state(LifecycleState::Disposed);
        self.claim.take();

        let report = ShutdownReport {
            total_ms: start.elapsed().as_millis() as u64,
            wait_ms,
            wait_iterations: tally.iterations,
            tasks_canceled: tally.canceled,
            work_items_drained: tally.drained,
            work_item_faults: tally.faults,
            hooks_run,
            hook_faults,
            workers_joined,
        };
        log::info!("engine context disposed: {report:?}");
        Ok(report)
    }

    fn wait_pending(
        &mut self,
        cancel: bool,
        limit: Option<usize>,
        tolerate_faults: bool,
        tally: &mut WaitTally,
    ) -> Result<(), ContextError> {
        let registry = &self.handle.shared.registry;
        if cancel && registry.cancel() {
            log::debug!("cancellation requested for background tasks");
        }
        loop {
            if cancel {
                tally.canceled += registry.cancel_unstarted();
            }
            if registry.all_settled() {
                break;
            }
            if let Some(max) = limit {
                if tally.iterations >= max {
                    return Err(ContextError::WaitLimitReached {
                        iterations: tally.iterations,
                    });
                }
            }
            match self.executor.drain_one() {
                Ok(true) => tally.drained += 1,
                Ok(false) => {}
                Err(e @ ContextError::WorkItemFailed(_)) if tolerate_faults => {
                    tally.drained += 1;
                    self.stats.work_item_faults += 1;
                    log::error!("work item failed during shutdown: {e}");
                    tally.faults += 1;
                }
                Err(e) => {
                    self.stats.work_items_drained = self.executor.drained();
                    return Err(e);
                }
            }
            thread::yield_now();
            tally.iterations += 1;
        }
        registry.retire_terminal();
        self.stats.work_items_drained = self.executor.drained();
        Ok(())
    }

    fn record_shutdown_fault(&mut self, e: &ContextError, tally: &mut WaitTally) {
        log::error!("work item failed during shutdown: {e}");
        self.stats.work_item_faults += 1;
        tally.faults += 1;
        tally.drained += 1;
    }

    fn enter(&mut self, operation: &'static str) -> Result<(), ContextError> {
        self.check_owner(operation)?;
        self.check_not_disposed(operation)?;
        if self.state() == LifecycleState::Initialized {
            self.handle.shared.set_state(LifecycleState::Running);
        }
        Ok(())
    }

    fn check_owner(&self, operation: &'static str) -> Result<(), ContextError> {
        let caller = thread::current().id();
        let owner = self.handle.shared.owner;
        if caller != owner {
            return Err(ContextError::WrongThread {
                operation,
                owner,
                caller,
            });
        }
        Ok(())
    }

    fn check_not_disposed(&self, operation: &'static str) -> Result<(), ContextError> {
        if self.state() == LifecycleState::Disposed {
            return Err(ContextError::AlreadyDisposed { operation });
        }
        Ok(())
    }
}

impl Drop for EngineContext {
    fn drop(&mut self) {
        if self.state() == LifecycleState::Disposed {
            return;
        }
        if self.handle.is_owning_thread() {
            log::warn!("engine context dropped without dispose; disposing now");
            if let Err(e) = self.dispose() {
                log::error!("dispose during drop failed: {e}");
            }
        } else {
            log::warn!("engine context dropped off its owning thread; abandoning pending work");
            let registry = &self.handle.shared.registry;
            registry.close();
            registry.cancel();
            registry.cancel_unstarted();
            self.pool.detach();
            self.handle.shared.set_state(LifecycleState::Disposed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::WaitError;
    use cadence_test_utils::exclusive_context;
    use std::sync::Mutex;
    use std::time::Duration;

    fn config() -> EngineConfig {
        EngineConfig {
            worker_count: Some(2),
            worker_name_prefix: "ctx-test".to_string(),
            ..EngineConfig::default()
        }
    }

    fn frame() -> FrameTime {
        FrameTime::default()
    }

    #[test]
    fn second_context_is_rejected() {
        let _guard = exclusive_context();
        let mut ctx = EngineContext::new(&config()).unwrap();
        assert!(context_is_live());
        assert_eq!(
            EngineContext::new(&config()).err(),
            Some(ContextError::DuplicateContext)
        );
        ctx.dispose().unwrap();
        assert!(!context_is_live());
        let mut again = EngineContext::new(&config()).unwrap();
        again.dispose().unwrap();
    }

    #[test]
    fn invalid_config_is_rejected_before_claiming() {
        let _guard = exclusive_context();
        let bad = EngineConfig {
            worker_name_prefix: String::new(),
            ..config()
        };
        assert!(matches!(
            EngineContext::new(&bad),
            Err(ContextError::InvalidConfig { .. })
        ));
        assert!(!context_is_live());
    }

    #[test]
    fn update_drains_then_sweeps_then_calls_back() {
        let _guard = exclusive_context();
        let mut ctx = EngineContext::new(&config()).unwrap();
        let handle = ctx.handle();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = Arc::clone(&order);
        handle.post(move || o.lock().unwrap().push("queued")).unwrap();
        let task = handle.spawn(|_| 7).unwrap();
        assert_eq!(task.status(), crate::tasks::TaskStatus::Created);

        let o = Arc::clone(&order);
        ctx.update(&frame(), |_| o.lock().unwrap().push("update"))
            .unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["queued", "update"]);
        assert_ne!(task.status(), crate::tasks::TaskStatus::Created);
        assert_eq!(ctx.state(), LifecycleState::Running);
        ctx.wait_for_pending_tasks(false).unwrap();
        assert_eq!(task.wait(), Ok(7));

        let stats = ctx.stats();
        assert_eq!(stats.updates, 1);
        assert_eq!(stats.work_items_drained, 1);
        assert_eq!(stats.tasks_started, 1);
        ctx.dispose().unwrap();
    }

    #[test]
    fn synchronous_fast_path_on_owner() {
        let _guard = exclusive_context();
        let mut ctx = EngineContext::new(&config()).unwrap();
        let handle = ctx.handle();

        let mut h = handle
            .queue_work_item(|| 5, WorkOptions::NONE)
            .unwrap()
            .unwrap();
        assert!(h.is_complete());
        assert_eq!(h.id(), None);
        assert_eq!(h.try_take(), Some(Ok(5)));

        let none = handle
            .queue_work_item(|| 5, WorkOptions::NONE.none_on_synchronous())
            .unwrap();
        assert!(none.is_none());
        assert_eq!(handle.pending_work_items(), 0);

        let mut forced = handle
            .queue_work_item(|| 6, WorkOptions::NONE.force_asynchronous())
            .unwrap()
            .unwrap();
        assert!(!forced.is_complete());
        assert_eq!(handle.pending_work_items(), 1);
        ctx.update(&frame(), |_| {}).unwrap();
        assert_eq!(forced.try_take(), Some(Ok(6)));
        ctx.dispose().unwrap();
    }

    #[test]
    fn owner_blocking_wait_is_refused() {
        let _guard = exclusive_context();
        let mut ctx = EngineContext::new(&config()).unwrap();
        let h = ctx
            .handle()
            .queue_work_item(|| 1, WorkOptions::NONE.force_asynchronous())
            .unwrap()
            .unwrap();
        assert_eq!(h.wait(), Err(WaitError::WouldBlockOwner));
        ctx.dispose().unwrap();
    }

    #[test]
    fn failing_work_item_aborts_update_and_resumes_next_time() {
        let _guard = exclusive_context();
        let mut ctx = EngineContext::new(&config()).unwrap();
        let handle = ctx.handle();
        let ran = Arc::new(Mutex::new(Vec::new()));

        handle.post(|| panic!("queued failure")).unwrap();
        let r = Arc::clone(&ran);
        handle.post(move || r.lock().unwrap().push("after")).unwrap();

        let mut updated = false;
        let err = ctx.update(&frame(), |_| updated = true).unwrap_err();
        assert_eq!(err, ContextError::WorkItemFailed(Fault::new("queued failure")));
        assert!(!updated);
        assert!(ran.lock().unwrap().is_empty());

        ctx.update(&frame(), |_| {}).unwrap();
        assert_eq!(*ran.lock().unwrap(), vec!["after"]);
        assert_eq!(ctx.stats().work_item_faults, 1);
        ctx.dispose().unwrap();
    }

    #[test]
    fn chained_work_flattens_through_the_queue() {
        let _guard = exclusive_context();
        let mut ctx = EngineContext::new(&config()).unwrap();
        let handle = ctx.handle();
        let inner_handle = handle.clone();
        let mut h = handle
            .queue_work_item_chained(
                move || {
                    inner_handle
                        .queue_work_item(|| "inner", WorkOptions::NONE.force_asynchronous())
                        .unwrap()
                        .unwrap()
                },
                WorkOptions::NONE.force_asynchronous(),
            )
            .unwrap()
            .unwrap();

        ctx.update(&frame(), |_| {}).unwrap();
        assert!(!h.is_complete());
        ctx.update(&frame(), |_| {}).unwrap();
        assert_eq!(h.try_take(), Some(Ok("inner")));
        ctx.dispose().unwrap();
    }

    #[test]
    fn spawn_during_and_after_shutdown_rejected() {
        let _guard = exclusive_context();
        let mut ctx = EngineContext::new(&config()).unwrap();
        let handle = ctx.handle();
        let (tx, rx) = crossbeam_channel::bounded(1);
        let h2 = handle.clone();
        ctx.on_shutdown(move || {
            let _ = tx.send(h2.spawn(|_| ()).err());
        })
        .unwrap();
        ctx.dispose().unwrap();
        assert_eq!(rx.recv().unwrap(), Some(ContextError::SpawnAfterShutdown));
        assert_eq!(
            handle.spawn(|_| ()).err(),
            Some(ContextError::AlreadyDisposed { operation: "spawn" })
        );
    }

    #[test]
    fn use_after_dispose_fails_loudly() {
        let _guard = exclusive_context();
        let mut ctx = EngineContext::new(&config()).unwrap();
        let handle = ctx.handle();
        ctx.dispose().unwrap();

        assert_eq!(
            ctx.update(&frame(), |_| {}),
            Err(ContextError::AlreadyDisposed { operation: "update" })
        );
        assert_eq!(
            ctx.draw(&frame(), |_| {}),
            Err(ContextError::AlreadyDisposed { operation: "draw" })
        );
        assert_eq!(
            handle.queue_work_item(|| 1, WorkOptions::NONE).err(),
            Some(ContextError::AlreadyDisposed {
                operation: "queue_work_item"
            })
        );
        assert_eq!(ctx.dispose(), Ok(ShutdownReport::default()));
    }

    #[test]
    fn wrong_thread_is_named() {
        let _guard = exclusive_context();
        let mut ctx = EngineContext::new(&config()).unwrap();
        let owner = ctx.owner();
        let err = thread::scope(|s| {
            s.spawn(|| ctx.update(&frame(), |_| {}).unwrap_err())
                .join()
                .unwrap()
        });
        match err {
            ContextError::WrongThread {
                operation,
                owner: o,
                caller,
            } => {
                assert_eq!(operation, "update");
                assert_eq!(o, owner);
                assert_ne!(caller, owner);
            }
            other => panic!("unexpected: {other:?}"),
        }
        ctx.dispose().unwrap();
    }

    #[test]
    fn dispose_waits_for_task_needing_owner_continuation() {
        let _guard = exclusive_context();
        let mut ctx = EngineContext::new(&config()).unwrap();
        let handle = ctx.handle();
        let h = handle.clone();
        let (started_tx, started_rx) = crossbeam_channel::bounded(1);
        let task = handle
            .spawn(move |_| {
                started_tx.send(()).unwrap();
                h.queue_work_item(|| 21 * 2, WorkOptions::NONE)
                    .unwrap()
                    .unwrap()
                    .wait()
            })
            .unwrap();
        ctx.update(&frame(), |_| {}).unwrap();
        started_rx.recv().unwrap();

        let report = ctx.dispose().unwrap();
        assert_eq!(task.wait(), Ok(Ok(42)));
        assert!(report.work_items_drained >= 1);
        assert_eq!(report.workers_joined, 2);
        assert_eq!(ctx.state(), LifecycleState::Disposed);
    }

    #[test]
    fn dispose_cancels_unstarted_tasks_and_runs_hooks_in_order() {
        let _guard = exclusive_context();
        let mut ctx = EngineContext::new(&config()).unwrap();
        let task = ctx.handle().spawn(|_| 1).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let o = Arc::clone(&order);
            ctx.on_shutdown(move || o.lock().unwrap().push(i)).unwrap();
        }
        ctx.on_shutdown(|| panic!("hook failure")).unwrap();

        let report = ctx.dispose().unwrap();
        assert_eq!(report.tasks_canceled, 1);
        assert_eq!(report.hooks_run, 4);
        assert_eq!(report.hook_faults, 1);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(task.wait(), Err(WaitError::Canceled));
    }

    #[test]
    fn wait_limit_catches_livelock() {
        let _guard = exclusive_context();
        let mut ctx = EngineContext::new(&config()).unwrap();
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);
        let _task = ctx
            .handle()
            .spawn(move |_| {
                let _ = release_rx.recv();
            })
            .unwrap();
        ctx.update(&frame(), |_| {}).unwrap();

        let err = ctx.wait_for_pending_tasks_with_limit(false, 10).unwrap_err();
        assert_eq!(err, ContextError::WaitLimitReached { iterations: 10 });

        release_tx.send(()).unwrap();
        ctx.wait_for_pending_tasks(false).unwrap();
        assert_eq!(ctx.handle().pending_tasks(), 0);
        ctx.dispose().unwrap();
    }

    #[test]
    fn wait_without_cancel_leaves_unstarted_tasks() {
        let _guard = exclusive_context();
        let mut ctx = EngineContext::new(&config()).unwrap();
        let task = ctx.handle().spawn(|_| 3).unwrap();
        assert_eq!(ctx.wait_for_pending_tasks(false), Ok(0));
        assert_eq!(task.status(), crate::tasks::TaskStatus::Created);
        ctx.update(&frame(), |_| {}).unwrap();
        ctx.wait_for_pending_tasks(false).unwrap();
        assert_eq!(task.wait(), Ok(3));
        ctx.dispose().unwrap();
    }

    #[test]
    fn wait_with_cancel_trips_token_for_later_spawns() {
        let _guard = exclusive_context();
        let mut ctx = EngineContext::new(&config()).unwrap();
        let handle = ctx.handle();
        let unstarted = handle.spawn(|_| 1).unwrap();
        assert!(!handle.cancellation_token().is_cancelled());

        ctx.wait_for_pending_tasks(true).unwrap();
        assert!(handle.cancellation_token().is_cancelled());
        assert_eq!(unstarted.status(), crate::tasks::TaskStatus::Canceled);
        assert_eq!(unstarted.wait(), Err(WaitError::Canceled));
        assert_eq!(ctx.state(), LifecycleState::Initialized);

        let ran = Arc::new(AtomicBool::new(false));
        let r = Arc::clone(&ran);
        let later = handle
            .spawn(move |_| r.store(true, Ordering::SeqCst))
            .unwrap();
        ctx.update(&frame(), |_| {}).unwrap();
        ctx.wait_for_pending_tasks(false).unwrap();
        assert_eq!(later.status(), crate::tasks::TaskStatus::Canceled);
        assert_eq!(later.wait(), Err(WaitError::Canceled));
        assert!(!ran.load(Ordering::SeqCst));
        ctx.dispose().unwrap();
    }

    #[test]
    fn owner_wait_on_task_blocked_by_continuation_is_refused() {
        let _guard = exclusive_context();
        let mut ctx = EngineContext::new(&config()).unwrap();
        let handle = ctx.handle();
        let h = handle.clone();
        let (queued_tx, queued_rx) = crossbeam_channel::bounded(1);
        let mut task = handle
            .spawn(move |_| {
                let pending = h
                    .queue_work_item(|| 5, WorkOptions::NONE)
                    .unwrap()
                    .unwrap();
                queued_tx.send(()).unwrap();
                pending.wait()
            })
            .unwrap();
        ctx.update(&frame(), |_| {}).unwrap();
        queued_rx.recv().unwrap();

        let before = Instant::now();
        assert_eq!(
            task.wait_timeout(Duration::from_secs(2)),
            Err(WaitError::WouldBlockOwner)
        );
        assert!(before.elapsed() < Duration::from_secs(1));

        ctx.wait_for_pending_tasks(false).unwrap();
        assert_eq!(task.wait(), Ok(Ok(5)));
        ctx.dispose().unwrap();
    }

    #[test]
    fn fault_observer_sees_fire_and_forget_faults() {
        let _guard = exclusive_context();
        let mut ctx = EngineContext::new(&config()).unwrap();
        let handle = ctx.handle();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        handle.set_fault_observer(Some(move |_: TaskId, fault: &Fault| {
            s.lock().unwrap().push(fault.message().to_string());
        }));
        drop(handle.spawn(|_| -> u8 { panic!("fire and forget") }).unwrap());
        ctx.update(&frame(), |_| {}).unwrap();
        ctx.wait_for_pending_tasks(false).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["fire and forget".to_string()]);
        ctx.dispose().unwrap();
    }

    #[test]
    fn drop_without_dispose_releases_claim() {
        let _guard = exclusive_context();
        {
            let ctx = EngineContext::new(&config()).unwrap();
            ctx.handle().spawn(|_| ()).unwrap();
        }
        assert!(!context_is_live());
    }
}
