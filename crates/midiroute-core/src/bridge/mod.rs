//! Async call bridge.
//!
//! Lets the cycle thread request non-deterministic work (logging, callbacks)
//! without blocking. Submission is a lock-free push into a bounded
//! `ArrayQueue`; a dedicated worker thread (`midiroute-async`) executes calls
//! in FIFO order.
//!
//! ```text
//! cycle thread ──submit──> [ArrayQueue; capacity] ──pop──> worker thread
//!                  │                                         │
//!                  └── unpark ──────────────────────────────>┘
//! ```
//!
//! Shutdown never hangs: if the worker is still busy after the join timeout it
//! is detached and [`Error::JoinTimeout`] is returned.

mod call;
mod worker;

pub use call::{AsyncCall, Callback, CallbackId, CallbackRegistry, SubmitError};

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, Thread};
use std::time::{Duration, Instant};

use crossbeam::queue::ArrayQueue;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};

use crate::config::BridgeConfig;
use crate::{Error, Result};
use worker::Worker;

/// Called by the worker every heartbeat with the heartbeat count.
pub type HeartbeatHook = Box<dyn FnMut(u64) + Send>;

pub(crate) struct Shared {
    queue: ArrayQueue<AsyncCall>,
    accepting: AtomicBool,
    stop: AtomicBool,
    accepted: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
    heartbeats: AtomicU64,
    data_offset: AtomicU8,
    worker: OnceLock<Thread>,
}

impl Shared {
    fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            accepting: AtomicBool::new(true),
            stop: AtomicBool::new(false),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
            heartbeats: AtomicU64::new(0),
            data_offset: AtomicU8::new(0),
            worker: OnceLock::new(),
        }
    }

    fn is_idle(&self) -> bool {
        self.queue.is_empty()
            && self.completed.load(Ordering::Acquire) >= self.accepted.load(Ordering::Acquire)
    }

    fn discard_queued(&self) -> u64 {
        let mut discarded = 0;
        while self.queue.pop().is_some() {
            discarded += 1;
        }
        discarded
    }
}

/// Clonable submission handle. RT-safe (lock-free, never blocks).
#[derive(Clone)]
pub struct AsyncSubmitter {
    shared: Arc<Shared>,
}

impl AsyncSubmitter {
    /// Queues `call` for the worker.
    ///
    /// Fails immediately with [`SubmitError::QueueFull`] when the queue is at
    /// capacity, or [`SubmitError::Closed`] once shutdown has started.
    pub fn submit(&self, call: AsyncCall) -> std::result::Result<(), SubmitError> {
        if !self.shared.accepting.load(Ordering::Acquire) {
            self.shared.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(SubmitError::Closed(call));
        }
        match self.shared.queue.push(call) {
            Ok(()) => {
                self.shared.accepted.fetch_add(1, Ordering::AcqRel);
                if let Some(worker) = self.shared.worker.get() {
                    worker.unpark();
                }
                Ok(())
            }
            Err(call) => {
                self.shared.rejected.fetch_add(1, Ordering::Relaxed);
                Err(SubmitError::QueueFull(call))
            }
        }
    }

    #[inline]
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.queue.capacity()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        !self.shared.accepting.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for AsyncSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncSubmitter")
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Counts reported by a completed shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Calls executed over the bridge's lifetime.
    pub executed: u64,
    /// Calls still queued when the worker stopped (or that were never run
    /// because the worker was never started).
    pub discarded: u64,
}

pub struct AsyncBridge {
    shared: Arc<Shared>,
    callbacks: Arc<CallbackRegistry>,
    config: BridgeConfig,
    hook: Option<HeartbeatHook>,
    handle: Option<JoinHandle<()>>,
    done: Option<Receiver<()>>,
    shut_down: bool,
}

impl AsyncBridge {
    /// Creates the bridge. Calls may be submitted right away; they run once
    /// [`start`](Self::start) has spawned the worker.
    pub fn new(config: BridgeConfig, callbacks: Arc<CallbackRegistry>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared::new(config.capacity)),
            callbacks,
            config,
            hook: None,
            handle: None,
            done: None,
            shut_down: false,
        })
    }

    /// Installs a hook run on the worker every heartbeat. Must be set before
    /// [`start`](Self::start).
    pub fn set_heartbeat(&mut self, hook: impl FnMut(u64) + Send + 'static) {
        self.hook = Some(Box::new(hook));
    }

    /// Sets the numbering offset used when logging diagnostics.
    pub fn set_data_offset(&self, data_offset: u8) {
        self.shared.data_offset.store(data_offset, Ordering::Relaxed);
    }

    /// Spawns the worker thread. Idempotent.
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        if self.shut_down {
            return Err(Error::InvalidConfig(
                "async bridge cannot be restarted after shutdown".into(),
            ));
        }

        let (done_tx, done_rx) = bounded(1);
        let worker = Worker {
            shared: Arc::clone(&self.shared),
            callbacks: Arc::clone(&self.callbacks),
            interval: self.config.callback_interval(),
            hook: self.hook.take(),
            done: done_tx,
        };

        let handle = thread::Builder::new()
            .name("midiroute-async".to_string())
            .spawn(move || worker.run())?;

        let _ = self.shared.worker.set(handle.thread().clone());
        // Wake it for anything queued before it existed.
        handle.thread().unpark();

        tracing::debug!(
            "Async bridge started (capacity {}, interval {:?})",
            self.config.capacity,
            self.config.callback_interval()
        );
        self.handle = Some(handle);
        self.done = Some(done_rx);
        Ok(())
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn submitter(&self) -> AsyncSubmitter {
        AsyncSubmitter {
            shared: Arc::clone(&self.shared),
        }
    }

    #[inline]
    pub fn submit(&self, call: AsyncCall) -> std::result::Result<(), SubmitError> {
        self.submitter().submit(call)
    }

    pub fn callbacks(&self) -> &Arc<CallbackRegistry> {
        &self.callbacks
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    #[inline]
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    #[inline]
    pub fn completed(&self) -> u64 {
        self.shared.completed.load(Ordering::Acquire)
    }

    #[inline]
    pub fn heartbeats(&self) -> u64 {
        self.shared.heartbeats.load(Ordering::Acquire)
    }

    /// Submissions refused with `QueueFull` or `Closed`.
    #[inline]
    pub fn rejected(&self) -> u64 {
        self.shared.rejected.load(Ordering::Relaxed)
    }

    /// Calls that panicked on the worker.
    #[inline]
    pub fn panicked(&self) -> u64 {
        self.shared.panicked.load(Ordering::Relaxed)
    }

    /// Polls at the heartbeat interval until every accepted call has run.
    /// Returns `false` on timeout. Not RT-safe (sleeps).
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        let interval = self.config.callback_interval();
        loop {
            if self.shared.is_idle() {
                return true;
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return false;
            }
            thread::sleep(interval.min(timeout - elapsed));
        }
    }

    /// Stops accepting calls, lets the worker drain the queue, and joins it
    /// within the configured join timeout.
    ///
    /// On timeout the worker is detached and keeps running until its current
    /// call returns; [`Error::JoinTimeout`] is returned.
    pub fn shutdown(&mut self) -> Result<ShutdownReport> {
        if self.shut_down {
            return Ok(ShutdownReport {
                executed: self.completed(),
                discarded: 0,
            });
        }
        self.shut_down = true;
        self.shared.accepting.store(false, Ordering::Release);
        self.shared.stop.store(true, Ordering::Release);

        let (Some(handle), Some(done)) = (self.handle.take(), self.done.take()) else {
            let discarded = self.shared.discard_queued();
            if discarded > 0 {
                tracing::debug!("Async bridge never started, {} calls discarded", discarded);
            }
            return Ok(ShutdownReport {
                executed: self.completed(),
                discarded,
            });
        };

        handle.thread().unpark();
        let timeout = self.config.join_timeout();
        match done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                handle.join().map_err(|_| Error::WorkerPanicked)?;
                // Submissions that passed the accepting check while the worker exited.
                let discarded = self.shared.discard_queued();
                tracing::debug!("Async bridge shut down");
                Ok(ShutdownReport {
                    executed: self.completed(),
                    discarded,
                })
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "Async worker still busy after {:?}, detaching ({} calls pending)",
                    timeout,
                    self.pending()
                );
                drop(handle);
                Err(Error::JoinTimeout(timeout))
            }
        }
    }
}

impl Drop for AsyncBridge {
    fn drop(&mut self) {
        if !self.shut_down {
            if let Err(e) = self.shutdown() {
                tracing::warn!("Async bridge shutdown on drop failed: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for AsyncBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncBridge")
            .field("running", &self.is_running())
            .field("pending", &self.pending())
            .field("completed", &self.completed())
            .finish()
    }
}
