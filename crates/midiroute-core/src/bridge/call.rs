use std::fmt;
use std::sync::Arc;

use midiroute_event::MidiEvent;
use parking_lot::RwLock;
use thiserror::Error;

use crate::diagnostics::Diagnostic;

/// Handle of a callback in a [`CallbackRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u32);

impl CallbackId {
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

pub type Callback = Arc<dyn Fn(&MidiEvent) + Send + Sync>;

/// One unit of deferred work, executed on the async worker.
pub enum AsyncCall {
    /// Invoke a registered callback. Submitting this never allocates.
    Callback { id: CallbackId, event: MidiEvent },
    /// Emit a `tracing` record for a cycle-thread condition.
    Diagnostic(Diagnostic),
    /// Arbitrary work from a non-RT submitter that has already allocated.
    Task(Box<dyn FnOnce() + Send>),
}

impl AsyncCall {
    #[inline]
    pub fn callback(id: CallbackId, event: MidiEvent) -> Self {
        AsyncCall::Callback { id, event }
    }

    /// Not RT-safe (allocates).
    pub fn task(f: impl FnOnce() + Send + 'static) -> Self {
        AsyncCall::Task(Box::new(f))
    }
}

impl fmt::Debug for AsyncCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsyncCall::Callback { id, event } => f
                .debug_struct("Callback")
                .field("id", id)
                .field("event", event)
                .finish(),
            AsyncCall::Diagnostic(diag) => f.debug_tuple("Diagnostic").field(diag).finish(),
            AsyncCall::Task(_) => f.write_str("Task"),
        }
    }
}

/// Why a call was not queued. The call is handed back to the caller.
#[derive(Error)]
pub enum SubmitError {
    #[error("Async call queue is full")]
    QueueFull(AsyncCall),

    #[error("Async bridge is shut down")]
    Closed(AsyncCall),
}

impl SubmitError {
    pub fn into_call(self) -> AsyncCall {
        match self {
            SubmitError::QueueFull(call) | SubmitError::Closed(call) => call,
        }
    }
}

impl fmt::Debug for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::QueueFull(call) => f.debug_tuple("QueueFull").field(call).finish(),
            SubmitError::Closed(call) => f.debug_tuple("Closed").field(call).finish(),
        }
    }
}

/// Callbacks addressable by [`CallbackId`].
///
/// Registration happens off the cycle thread; only the worker reads it.
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: RwLock<Vec<Callback>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, f: impl Fn(&MidiEvent) + Send + Sync + 'static) -> CallbackId {
        let mut callbacks = self.callbacks.write();
        callbacks.push(Arc::new(f));
        CallbackId((callbacks.len() - 1) as u32)
    }

    pub fn get(&self, id: CallbackId) -> Option<Callback> {
        self.callbacks.read().get(id.0 as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.read().is_empty()
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("len", &self.len())
            .finish()
    }
}
