//! Awaitable results of queued work items.
//!
//! A [`WorkHandle`] is returned by the `queue_work_item*` family. It is
//! either already resolved (the work ran synchronously on the owning
//! thread) or backed by a one-shot reply channel that the queued callback
//! fills when the owner drains it.

use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use cadence_core::{Fault, WaitError, WorkItemId};

/// Submission options for queued work.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkOptions {
    /// Always post to the queue, even when called on the owning thread.
    pub force_asynchronous_execution: bool,
    /// When the work runs synchronously, return `None` instead of a
    /// resolved handle.
    pub return_none_on_synchronous_execution: bool,
}

impl WorkOptions {
    /// No flags set.
    pub const NONE: Self = Self {
        force_asynchronous_execution: false,
        return_none_on_synchronous_execution: false,
    };

    /// Set [`force_asynchronous_execution`](Self::force_asynchronous_execution).
    pub fn force_asynchronous(mut self) -> Self {
        self.force_asynchronous_execution = true;
        self
    }

    /// Set [`return_none_on_synchronous_execution`](Self::return_none_on_synchronous_execution).
    pub fn none_on_synchronous(mut self) -> Self {
        self.return_none_on_synchronous_execution = true;
        self
    }
}

enum Slot<T> {
    Ready(Option<Result<T, WaitError>>),
    Pending(Receiver<Result<T, Fault>>),
    Chained(Receiver<Result<WorkHandle<T>, Fault>>),
}

/// Result of a queued work item.
///
/// Chained work (a work item that itself returns a `WorkHandle`) is
/// flattened: the handle resolves with the inner handle's result.
///
/// Blocking on an unresolved handle from the owning thread would deadlock,
/// since only that thread drains the queue; [`wait`](Self::wait) returns
/// [`WaitError::WouldBlockOwner`] instead.
pub struct WorkHandle<T> {
    id: Option<WorkItemId>,
    owner: ThreadId,
    slot: Slot<T>,
}

impl<T> WorkHandle<T> {
    pub(crate) fn ready(value: T, owner: ThreadId) -> Self {
        Self {
            id: None,
            owner,
            slot: Slot::Ready(Some(Ok(value))),
        }
    }

    pub(crate) fn pending(id: WorkItemId, rx: Receiver<Result<T, Fault>>, owner: ThreadId) -> Self {
        Self {
            id: Some(id),
            owner,
            slot: Slot::Pending(rx),
        }
    }

    pub(crate) fn chained(
        id: WorkItemId,
        rx: Receiver<Result<WorkHandle<T>, Fault>>,
        owner: ThreadId,
    ) -> Self {
        Self {
            id: Some(id),
            owner,
            slot: Slot::Chained(rx),
        }
    }

    /// Queue id of the work item, or `None` if it ran synchronously.
    pub fn id(&self) -> Option<WorkItemId> {
        self.id
    }

    /// Whether a result (or failure) is available without blocking.
    pub fn is_complete(&mut self) -> bool {
        self.settle();
        matches!(self.slot, Slot::Ready(_))
    }

    /// Take the result if it is available. Returns `None` while pending
    /// and after the result has already been taken.
    pub fn try_take(&mut self) -> Option<Result<T, WaitError>> {
        self.settle();
        match &mut self.slot {
            Slot::Ready(result) => result.take(),
            _ => None,
        }
    }

    /// Block until the result is available.
    pub fn wait(mut self) -> Result<T, WaitError> {
        self.wait_until(None)
    }

    /// Block for at most `timeout`. On [`WaitError::TimedOut`] the handle
    /// stays usable.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<T, WaitError> {
        self.wait_until(Some(Instant::now() + timeout))
    }

    fn wait_until(&mut self, deadline: Option<Instant>) -> Result<T, WaitError> {
        loop {
            self.settle();
            if let Slot::Ready(result) = &mut self.slot {
                return result.take().unwrap_or(Err(WaitError::Abandoned));
            }
            if thread::current().id() == self.owner {
                return Err(WaitError::WouldBlockOwner);
            }
            let next = match &self.slot {
                Slot::Ready(_) => continue,
                Slot::Pending(rx) => match recv_until(rx, deadline)? {
                    Some(Ok(value)) => Slot::Ready(Some(Ok(value))),
                    Some(Err(fault)) => Slot::Ready(Some(Err(WaitError::Faulted(fault)))),
                    None => Slot::Ready(Some(Err(WaitError::Abandoned))),
                },
                Slot::Chained(rx) => match recv_until(rx, deadline)? {
                    Some(Ok(inner)) => inner.slot,
                    Some(Err(fault)) => Slot::Ready(Some(Err(WaitError::Faulted(fault)))),
                    None => Slot::Ready(Some(Err(WaitError::Abandoned))),
                },
            };
            self.slot = next;
        }
    }

    /// Move any result already sitting in a reply channel into the slot.
    fn settle(&mut self) {
        loop {
            let next = match &self.slot {
                Slot::Ready(_) => return,
                Slot::Pending(rx) => match rx.try_recv() {
                    Ok(Ok(value)) => Slot::Ready(Some(Ok(value))),
                    Ok(Err(fault)) => Slot::Ready(Some(Err(WaitError::Faulted(fault)))),
                    Err(TryRecvError::Empty) => return,
                    Err(TryRecvError::Disconnected) => Slot::Ready(Some(Err(WaitError::Abandoned))),
                },
                Slot::Chained(rx) => match rx.try_recv() {
                    Ok(Ok(inner)) => inner.slot,
                    Ok(Err(fault)) => Slot::Ready(Some(Err(WaitError::Faulted(fault)))),
                    Err(TryRecvError::Empty) => return,
                    Err(TryRecvError::Disconnected) => Slot::Ready(Some(Err(WaitError::Abandoned))),
                },
            };
            self.slot = next;
        }
    }
}

/// `Ok(None)` means the sender was dropped without replying.
fn recv_until<M>(rx: &Receiver<M>, deadline: Option<Instant>) -> Result<Option<M>, WaitError> {
    match deadline {
        None => Ok(rx.recv().ok()),
        Some(deadline) => match rx.recv_deadline(deadline) {
            Ok(msg) => Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) => Err(WaitError::TimedOut),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
        },
    }
}

impl<T> std::fmt::Debug for WorkHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.slot {
            Slot::Ready(Some(Ok(_))) => "ready",
            Slot::Ready(Some(Err(_))) => "failed",
            Slot::Ready(None) => "taken",
            Slot::Pending(_) => "pending",
            Slot::Chained(_) => "chained",
        };
        f.debug_struct("WorkHandle")
            .field("id", &self.id)
            .field("state", &state)
            .finish()
    }
}
