//! Error types for the Cadence frame scheduler.
//!
//! Organized by failure class: contract violations on the engine context
//! ([`ContextError`]), failures observed while awaiting a result
//! ([`WaitError`]), and captured panics from user callbacks ([`Fault`]).

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::thread::ThreadId;

/// A panic captured from a queued work item or a background task body.
///
/// The panic payload is reduced to its message text so the fault can be
/// cloned, compared and carried across threads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fault {
    message: String,
}

impl Fault {
    /// Build a fault from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Build a fault from a payload returned by `std::panic::catch_unwind`.
    ///
    /// `&str` and `String` payloads keep their text; anything else is
    /// reported as an opaque panic.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic with non-string payload".to_string()
        };
        Self { message }
    }

    /// The captured panic message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panicked: {}", self.message)
    }
}

impl Error for Fault {}

/// Contract violations and failures reported by the engine context.
///
/// Every variant represents a caller bug or a failure that must be
/// observed at the call site. None of them are retried internally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContextError {
    /// An owning-thread-only operation was called from another thread.
    WrongThread {
        /// The operation that was attempted.
        operation: &'static str,
        /// The thread that owns the context.
        owner: ThreadId,
        /// The thread that made the call.
        caller: ThreadId,
    },
    /// The context has finished disposing; only property reads remain valid.
    AlreadyDisposed {
        /// The operation that was attempted.
        operation: &'static str,
    },
    /// Another engine context is already live in this process.
    DuplicateContext,
    /// A background task was spawned while the context was shutting down.
    SpawnAfterShutdown,
    /// A queued work item panicked while being drained. The remainder of
    /// that drain pass was skipped.
    WorkItemFailed(Fault),
    /// A bounded wait for pending tasks gave up before they finished.
    WaitLimitReached {
        /// Number of drain/yield iterations performed before giving up.
        iterations: usize,
    },
    /// Configuration failed validation.
    InvalidConfig {
        /// Description of the failed check.
        reason: String,
    },
    /// A worker thread could not be spawned.
    ThreadSpawnFailed {
        /// Description of which thread failed.
        reason: String,
    },
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongThread {
                operation,
                owner,
                caller,
            } => write!(
                f,
                "{operation} called from thread {caller:?}, but the context is owned by {owner:?}"
            ),
            Self::AlreadyDisposed { operation } => {
                write!(f, "{operation} called after the context was disposed")
            }
            Self::DuplicateContext => write!(f, "an engine context is already live"),
            Self::SpawnAfterShutdown => {
                write!(f, "cannot spawn background work while the context shuts down")
            }
            Self::WorkItemFailed(fault) => write!(f, "queued work item failed: {fault}"),
            Self::WaitLimitReached { iterations } => {
                write!(f, "pending tasks still running after {iterations} wait iterations")
            }
            Self::InvalidConfig { reason } => write!(f, "invalid config: {reason}"),
            Self::ThreadSpawnFailed { reason } => write!(f, "thread spawn failed: {reason}"),
        }
    }
}

impl Error for ContextError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::WorkItemFailed(fault) => Some(fault),
            _ => None,
        }
    }
}

impl From<Fault> for ContextError {
    fn from(fault: Fault) -> Self {
        Self::WorkItemFailed(fault)
    }
}

/// Errors returned while waiting on a work item or task result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitError {
    /// The work panicked.
    Faulted(Fault),
    /// The task was canceled before it started.
    Canceled,
    /// The producer was dropped without ever completing the result.
    Abandoned,
    /// The result can only be produced by the owning thread, which is the
    /// thread attempting to block on it.
    WouldBlockOwner,
    /// A timed wait expired before the result was available.
    TimedOut,
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Faulted(fault) => write!(f, "{fault}"),
            Self::Canceled => write!(f, "canceled before it started"),
            Self::Abandoned => write!(f, "abandoned without a result"),
            Self::WouldBlockOwner => {
                write!(f, "blocking on the owning thread would deadlock the executor")
            }
            Self::TimedOut => write!(f, "timed out waiting for a result"),
        }
    }
}

impl Error for WaitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Faulted(fault) => Some(fault),
            _ => None,
        }
    }
}

impl From<Fault> for WaitError {
    fn from(fault: Fault) -> Self {
        Self::Faulted(fault)
    }
}
