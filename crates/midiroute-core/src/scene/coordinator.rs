//! Scene switch state machine.
//!
//! ```text
//! Active(a) --request(b)--> Switching { from: a, to: b }
//! Switching { from: a, to: b } --request(c)--> Switching { from: a, to: c }
//! Switching { from: a, to: b } --complete--> Active(b)
//! ```
//!
//! Completion releases everything `a` left sounding before `b` emits anything,
//! so a stage switching mid-phrase never leaves notes stuck on.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use midiroute_event::{EventKind, MidiEvent};
use thiserror::Error;

use super::stage::StageContext;
use super::{SceneId, SceneTable, SwitchTarget};
use crate::buffer::EventBuffer;
use crate::engine::EmitSink;
use crate::tracker::FlushReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    Active(SceneId),
    Switching { from: SceneId, to: SceneId },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchError {
    #[error("Unknown scene target: {0:?}")]
    UnknownScene(SwitchTarget),
}

/// What one completed switch did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchOutcome {
    pub from: SceneId,
    pub to: SceneId,
    pub released: FlushReport,
    /// Init chain events emitted after the compensation events.
    pub init_events: u32,
    pub init_dropped: u32,
}

pub struct Coordinator {
    state: SwitchState,
    published: Arc<AtomicU32>,
    scratch: EventBuffer,
}

impl Coordinator {
    pub fn new(initial: SceneId) -> Self {
        Self {
            state: SwitchState::Active(initial),
            published: Arc::new(AtomicU32::new(initial.to_bits())),
            scratch: EventBuffer::new(),
        }
    }

    #[inline]
    pub fn state(&self) -> SwitchState {
        self.state
    }

    /// The scene currently routing events (the old one while switching).
    #[inline]
    pub fn active(&self) -> SceneId {
        match self.state {
            SwitchState::Active(scene) => scene,
            SwitchState::Switching { from, .. } => from,
        }
    }

    #[inline]
    pub fn pending(&self) -> Option<SceneId> {
        match self.state {
            SwitchState::Active(_) => None,
            SwitchState::Switching { to, .. } => Some(to),
        }
    }

    #[inline]
    pub fn is_switching(&self) -> bool {
        matches!(self.state, SwitchState::Switching { .. })
    }

    /// Shared cell holding [`SceneId::to_bits`] of the active scene.
    pub fn published(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.published)
    }

    /// Starts or retargets a switch. The latest request wins; `from` is kept.
    pub fn request_switch(&mut self, to: SceneId) {
        self.state = match self.state {
            SwitchState::Active(current) if current == to => return,
            SwitchState::Active(from) => SwitchState::Switching { from, to },
            SwitchState::Switching { from, .. } => SwitchState::Switching { from, to },
        };
    }

    /// Resolves `target` against the pending scene (or the active one) and
    /// requests it.
    pub fn request(
        &mut self,
        target: SwitchTarget,
        scenes: &SceneTable,
    ) -> Result<SceneId, SwitchError> {
        let base = self.pending().unwrap_or_else(|| self.active());
        let to = scenes
            .resolve(target, base)
            .ok_or(SwitchError::UnknownScene(target))?;
        self.request_switch(to);
        Ok(to)
    }

    /// Activates the scene the coordinator was created with and emits its
    /// init chain output. Returns the number of init events emitted.
    pub fn activate_initial(
        &mut self,
        scenes: &mut SceneTable,
        sink: &mut EmitSink<'_>,
        ctx: &mut StageContext<'_>,
        frame: u32,
    ) -> u32 {
        let scene = self.active();
        self.published.store(scene.to_bits(), Ordering::Release);
        let (emitted, _) = self.enter(scene, scenes, sink, ctx, frame);
        emitted
    }

    /// Finishes a pending switch: releases notes and pedals of `from`, deactivates
    /// it, then activates `to` and emits its init chain output.
    ///
    /// Returns `None` if nothing was pending, or if the switch was cancelled
    /// because the target equals `from` or no longer exists.
    pub fn complete(
        &mut self,
        scenes: &mut SceneTable,
        sink: &mut EmitSink<'_>,
        ctx: &mut StageContext<'_>,
        frame: u32,
    ) -> Option<SwitchOutcome> {
        let SwitchState::Switching { from, to } = self.state else {
            return None;
        };
        if from == to || !scenes.contains(to) {
            self.state = SwitchState::Active(from);
            return None;
        }

        let released = sink.compensate(from, frame);

        ctx.set_scene(from);
        if let Some(scene) = scenes.get_mut(from) {
            let (chain, init) = scene.chains_mut();
            chain.deactivate(ctx);
            init.deactivate(ctx);
        }

        self.state = SwitchState::Active(to);
        self.published.store(to.to_bits(), Ordering::Release);
        let (init_events, init_dropped) = self.enter(to, scenes, sink, ctx, frame);

        Some(SwitchOutcome {
            from,
            to,
            released,
            init_events,
            init_dropped,
        })
    }

    fn enter(
        &mut self,
        to: SceneId,
        scenes: &mut SceneTable,
        sink: &mut EmitSink<'_>,
        ctx: &mut StageContext<'_>,
        frame: u32,
    ) -> (u32, u32) {
        ctx.set_scene(to);
        let Some(scene) = scenes.get_mut(to) else {
            return (0, 0);
        };
        let (chain, init) = scene.chains_mut();
        chain.activate(ctx);
        init.activate(ctx);
        if init.is_empty() {
            return (0, 0);
        }

        self.scratch.begin_cycle();
        // The init chain is driven by one placeholder event.
        let _ = self.scratch.push(MidiEvent::dummy().with_frame(frame));
        init.process(&mut self.scratch, ctx);

        let (mut emitted, mut dropped) = (0, 0);
        for ev in self.scratch.iter() {
            if ev.kind == EventKind::Dummy {
                continue;
            }
            if sink.emit(*ev, to) {
                emitted += 1;
            } else {
                dropped += 1;
            }
        }
        (emitted, dropped)
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Emit, FnStage, Scene};
    use crate::tracker::StateTracker;

    const S: SceneId = SceneId::new(1);
    const T1: SceneId = SceneId::new(2);
    const T2: SceneId = SceneId::new(3);

    fn table() -> SceneTable {
        let mut scenes = SceneTable::new();
        scenes.insert(Scene::new(S, "start"));
        scenes.insert(Scene::new(T1, "first"));
        scenes.insert(
            Scene::new(T2, "second").init(Emit::new([MidiEvent::program(0, 0, 7)])),
        );
        scenes
    }

    #[test]
    fn test_same_scene_request_is_noop() {
        let mut coord = Coordinator::new(S);
        coord.request_switch(S);
        assert_eq!(coord.state(), SwitchState::Active(S));
    }

    #[test]
    fn test_latest_request_wins_and_keeps_from() {
        let mut coord = Coordinator::new(S);
        coord.request_switch(T1);
        coord.request_switch(T2);
        assert_eq!(coord.state(), SwitchState::Switching { from: S, to: T2 });
        assert_eq!(coord.active(), S);
        assert_eq!(coord.pending(), Some(T2));
    }

    #[test]
    fn test_relative_request_resolves_against_pending() {
        let scenes = table();
        let mut coord = Coordinator::new(S);
        assert_eq!(coord.request(SwitchTarget::NextScene, &scenes), Ok(T1));
        assert_eq!(coord.request(SwitchTarget::NextScene, &scenes), Ok(T2));
        assert_eq!(
            coord.request(SwitchTarget::Scene(9), &scenes),
            Err(SwitchError::UnknownScene(SwitchTarget::Scene(9)))
        );
        assert_eq!(coord.pending(), Some(T2));
    }

    #[test]
    fn test_complete_compensates_then_runs_init() {
        let mut scenes = table();
        let mut tracker = StateTracker::new();
        let mut out = EventBuffer::with_capacity(32);
        let mut coord = Coordinator::new(S);
        let published = coord.published();

        tracker.on_note_on(0, 0, 60, S);
        tracker.on_note_on(0, 0, 64, S);
        tracker.on_pedal_change(0, 0, 64, true, S);

        coord.request_switch(T1);
        coord.request_switch(T2);

        let mut ctx = StageContext::new(S);
        let mut sink = EmitSink::new(&mut out, &mut tracker);
        let outcome = coord.complete(&mut scenes, &mut sink, &mut ctx, 5).unwrap();
        assert_eq!(outcome.from, S);
        assert_eq!(outcome.to, T2);
        assert_eq!(outcome.released.notes, 2);
        assert_eq!(outcome.released.pedals, 1);
        assert_eq!(outcome.init_events, 1);
        assert_eq!(ctx.scene(), T2);
        assert_eq!(coord.state(), SwitchState::Active(T2));
        assert_eq!(SceneId::from_bits(published.load(Ordering::Acquire)), T2);

        assert_eq!(
            out.to_vec(),
            vec![
                MidiEvent::note_off(0, 0, 60, 0).with_frame(5),
                MidiEvent::note_off(0, 0, 64, 0).with_frame(5),
                MidiEvent::ctrl(0, 0, 64, 0).with_frame(5),
                MidiEvent::program(0, 0, 7),
            ]
        );
        assert_eq!(tracker.notes_for(S).count(), 0);
        assert_eq!(tracker.pedals_for(S).count(), 0);
    }

    #[test]
    fn test_switch_back_to_origin_cancels() {
        let mut scenes = table();
        let mut tracker = StateTracker::new();
        tracker.on_note_on(0, 0, 60, S);
        let mut out = EventBuffer::with_capacity(8);
        let mut coord = Coordinator::new(S);
        coord.request_switch(T1);
        coord.request_switch(S);

        let mut ctx = StageContext::new(S);
        let mut sink = EmitSink::new(&mut out, &mut tracker);
        assert!(coord.complete(&mut scenes, &mut sink, &mut ctx, 0).is_none());
        assert_eq!(coord.state(), SwitchState::Active(S));
        assert!(out.is_empty());
        assert_eq!(tracker.note_count(), 1);
    }

    #[test]
    fn test_activation_hooks_run() {
        use std::sync::atomic::AtomicUsize;

        struct Hooks(Arc<AtomicUsize>, Arc<AtomicUsize>);
        impl crate::scene::Stage for Hooks {
            fn process(&mut self, _: &mut EventBuffer, _: &mut StageContext<'_>) {}
            fn on_activate(&mut self, _: &mut StageContext<'_>) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
            fn on_deactivate(&mut self, _: &mut StageContext<'_>) {
                self.1.fetch_add(1, Ordering::SeqCst);
            }
        }

        let activated = Arc::new(AtomicUsize::new(0));
        let deactivated = Arc::new(AtomicUsize::new(0));
        let mut scenes = SceneTable::new();
        scenes.insert(
            Scene::new(S, "a").stage(Hooks(Arc::clone(&activated), Arc::clone(&deactivated))),
        );
        scenes.insert(Scene::new(T1, "b").stage(FnStage::new("noop", |_events, _ctx| {})));

        let mut tracker = StateTracker::new();
        let mut out = EventBuffer::with_capacity(8);
        let mut coord = Coordinator::new(S);
        let mut ctx = StageContext::new(S);
        let mut sink = EmitSink::new(&mut out, &mut tracker);
        coord.activate_initial(&mut scenes, &mut sink, &mut ctx, 0);
        coord.request_switch(T1);
        coord.complete(&mut scenes, &mut sink, &mut ctx, 0);
        assert_eq!(activated.load(Ordering::SeqCst), 1);
        assert_eq!(deactivated.load(Ordering::SeqCst), 1);
    }
}
