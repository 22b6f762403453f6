//! Cross-thread control of a running engine.
//!
//! [`ControlHandle`] is the only way other threads talk to the cycle thread.
//! Commands go through a bounded lock-free queue that the engine drains at the
//! start of each cycle; reads come from atomics and `arc-swap` snapshots.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use crossbeam::queue::ArrayQueue;
use midiroute_event::{EventKind, MidiEvent};
use thiserror::Error;

use crate::config::MAX_ASYNC_CALLS;
use crate::diagnostics::{bump, Diagnostics, DiagnosticsSnapshot};
use crate::scene::{SceneId, SceneSummary, SwitchTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Switch(SwitchTarget),
    /// Feed an event into the next cycle as if it had arrived first.
    Inject(MidiEvent),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    #[error("Control queue is full")]
    QueueFull(ControlCommand),

    #[error("Sysex events cannot be injected (payload is cycle-scoped)")]
    SysexNotInjectable,
}

pub(crate) struct ControlShared {
    pub(crate) commands: ArrayQueue<ControlCommand>,
    pub(crate) current: Arc<AtomicU32>,
    pub(crate) scenes: ArcSwap<SceneSummary>,
    pub(crate) diagnostics: Arc<Diagnostics>,
}

impl ControlShared {
    pub(crate) fn new(
        current: Arc<AtomicU32>,
        scenes: SceneSummary,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            commands: ArrayQueue::new(MAX_ASYNC_CALLS),
            current,
            scenes: ArcSwap::from_pointee(scenes),
            diagnostics,
        }
    }
}

/// Clonable, thread-safe handle to a running engine. Never blocks.
#[derive(Clone)]
pub struct ControlHandle {
    shared: Arc<ControlShared>,
}

impl ControlHandle {
    pub(crate) fn new(shared: Arc<ControlShared>) -> Self {
        Self { shared }
    }

    fn send(&self, command: ControlCommand) -> Result<(), ControlError> {
        self.shared.commands.push(command).map_err(|command| {
            bump(&self.shared.diagnostics.control_dropped, 1);
            ControlError::QueueFull(command)
        })
    }

    /// Requests a switch to `scene`. Coalesces with other pending requests.
    pub fn switch_scene(&self, scene: SceneId) -> Result<(), ControlError> {
        self.switch(SwitchTarget::Exact(scene))
    }

    pub fn switch(&self, target: SwitchTarget) -> Result<(), ControlError> {
        self.send(ControlCommand::Switch(target))
    }

    pub fn inject(&self, event: MidiEvent) -> Result<(), ControlError> {
        if event.kind == EventKind::SysEx {
            return Err(ControlError::SysexNotInjectable);
        }
        self.send(ControlCommand::Inject(event))
    }

    /// The active scene, as last published by the cycle thread.
    pub fn current_scene(&self) -> SceneId {
        SceneId::from_bits(self.shared.current.load(Ordering::Acquire))
    }

    pub fn scenes(&self) -> Arc<SceneSummary> {
        self.shared.scenes.load_full()
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.shared.diagnostics.snapshot()
    }

    /// Commands waiting for the next cycle.
    pub fn pending(&self) -> usize {
        self.shared.commands.len()
    }
}

impl std::fmt::Debug for ControlHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlHandle")
            .field("current_scene", &self.current_scene())
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> ControlHandle {
        let current = Arc::new(AtomicU32::new(SceneId::new(2).to_bits()));
        ControlHandle::new(Arc::new(ControlShared::new(
            current,
            SceneSummary::default(),
            Arc::new(Diagnostics::new()),
        )))
    }

    #[test]
    fn test_reads_published_scene() {
        assert_eq!(handle().current_scene(), SceneId::new(2));
    }

    #[test]
    fn test_full_queue_fails_without_blocking() {
        let control = handle();
        for n in 0..MAX_ASYNC_CALLS {
            control.switch(SwitchTarget::Scene(n as u16)).unwrap();
        }
        assert_eq!(
            control.switch_scene(SceneId::new(1)),
            Err(ControlError::QueueFull(ControlCommand::Switch(
                SwitchTarget::Exact(SceneId::new(1))
            )))
        );
        assert_eq!(control.diagnostics().control_dropped, 1);
        assert_eq!(control.pending(), MAX_ASYNC_CALLS);
    }

    #[test]
    fn test_sysex_injection_rejected() {
        let control = handle();
        let mut ev = MidiEvent::dummy();
        ev.kind = EventKind::SysEx;
        assert_eq!(control.inject(ev), Err(ControlError::SysexNotInjectable));
        assert!(control.inject(MidiEvent::note_on(0, 0, 60, 1)).is_ok());
    }
}
