use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use super::call::{AsyncCall, CallbackRegistry};
use super::{HeartbeatHook, Shared};

pub(super) struct Worker {
    pub shared: Arc<Shared>,
    pub callbacks: Arc<CallbackRegistry>,
    pub interval: Duration,
    pub hook: Option<HeartbeatHook>,
    pub done: Sender<()>,
}

impl Worker {
    pub fn run(mut self) {
        let mut last_beat = Instant::now();
        tracing::debug!("Async worker started");

        loop {
            while let Some(call) = self.shared.queue.pop() {
                self.execute(call);
                self.beat_if_due(&mut last_beat);
            }

            if self.shared.stop.load(Ordering::Acquire) {
                // Calls accepted just before the stop flag was raised.
                while let Some(call) = self.shared.queue.pop() {
                    self.execute(call);
                }
                break;
            }

            thread::park_timeout(self.interval.saturating_sub(last_beat.elapsed()));
            self.beat_if_due(&mut last_beat);
        }

        tracing::debug!(
            "Async worker stopped after {} calls",
            self.shared.completed.load(Ordering::Relaxed)
        );
        let _ = self.done.send(());
    }

    fn beat_if_due(&mut self, last_beat: &mut Instant) {
        if last_beat.elapsed() < self.interval {
            return;
        }
        *last_beat = Instant::now();
        let count = self.shared.heartbeats.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(hook) = self.hook.as_mut() {
            if panic::catch_unwind(AssertUnwindSafe(|| hook(count))).is_err() {
                tracing::error!("Heartbeat hook panicked");
            }
        }
    }

    fn execute(&self, call: AsyncCall) {
        let data_offset = self.shared.data_offset.load(Ordering::Relaxed);
        let callbacks = &self.callbacks;

        let result = panic::catch_unwind(AssertUnwindSafe(|| match call {
            AsyncCall::Callback { id, event } => match callbacks.get(id) {
                Some(callback) => callback(&event),
                None => tracing::warn!("No callback registered with id {}", id.index()),
            },
            AsyncCall::Diagnostic(diag) => diag.log(data_offset),
            AsyncCall::Task(task) => task(),
        }));

        if result.is_err() {
            self.shared.panicked.fetch_add(1, Ordering::Relaxed);
            tracing::error!("Async call panicked");
        }
        self.shared.completed.fetch_add(1, Ordering::AcqRel);
    }
}
