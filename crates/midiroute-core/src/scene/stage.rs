use midiroute_event::{MidiEvent, SysexArena};
use smallvec::SmallVec;

use super::{SceneId, SwitchTarget};
use crate::bridge::{AsyncCall, AsyncSubmitter, SubmitError};
use crate::buffer::EventBuffer;
use crate::diagnostics::{bump, Diagnostics};

/// One processing step of a scene or engine chain.
///
/// Stages run on the cycle thread and see the events of one input event at a
/// time, in arrival order. A stage may modify events in place, drop them with
/// [`EventBuffer::mark_dropped`] / [`EventBuffer::retain`], or push new ones.
///
/// # RT-Safety
/// `process` is called on the real-time thread:
/// - No allocations (state must be pre-allocated at construction)
/// - No blocking operations, no logging
/// - Non-deterministic work goes through [`StageContext::submit`]
pub trait Stage: Send {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn process(&mut self, events: &mut EventBuffer, ctx: &mut StageContext<'_>);

    /// Called when the owning scene becomes active.
    fn on_activate(&mut self, _ctx: &mut StageContext<'_>) {}

    /// Called when the owning scene is left, after its notes have been released.
    fn on_deactivate(&mut self, _ctx: &mut StageContext<'_>) {}
}

/// Per-cycle view handed to stages.
pub struct StageContext<'a> {
    scene: SceneId,
    in_ports: u16,
    out_ports: u16,
    data_offset: u8,
    arena: Option<&'a SysexArena>,
    submitter: Option<&'a AsyncSubmitter>,
    diagnostics: Option<&'a Diagnostics>,
    switch: Option<SwitchTarget>,
}

impl<'a> StageContext<'a> {
    /// A context with one port in each direction and nothing attached.
    pub fn new(scene: SceneId) -> Self {
        Self {
            scene,
            in_ports: 1,
            out_ports: 1,
            data_offset: 0,
            arena: None,
            submitter: None,
            diagnostics: None,
            switch: None,
        }
    }

    pub fn with_ports(mut self, in_ports: u16, out_ports: u16) -> Self {
        self.in_ports = in_ports;
        self.out_ports = out_ports;
        self
    }

    pub fn with_data_offset(mut self, data_offset: u8) -> Self {
        self.data_offset = data_offset;
        self
    }

    pub fn with_sysex(mut self, arena: &'a SysexArena) -> Self {
        self.arena = Some(arena);
        self
    }

    pub fn with_submitter(mut self, submitter: &'a AsyncSubmitter) -> Self {
        self.submitter = Some(submitter);
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: &'a Diagnostics) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// The scene whose chain is running (the active scene for engine chains).
    #[inline]
    pub fn scene(&self) -> SceneId {
        self.scene
    }

    #[inline]
    pub(crate) fn set_scene(&mut self, scene: SceneId) {
        self.scene = scene;
    }

    #[inline]
    pub fn in_ports(&self) -> u16 {
        self.in_ports
    }

    #[inline]
    pub fn out_ports(&self) -> u16 {
        self.out_ports
    }

    #[inline]
    pub fn data_offset(&self) -> u8 {
        self.data_offset
    }

    /// Requests a scene switch, replacing any earlier request in this cycle.
    #[inline]
    pub fn request_switch(&mut self, target: impl Into<SwitchTarget>) {
        self.switch = Some(target.into());
    }

    #[inline]
    pub fn pending_switch(&self) -> Option<SwitchTarget> {
        self.switch
    }

    #[inline]
    pub(crate) fn take_switch(&mut self) -> Option<SwitchTarget> {
        self.switch.take()
    }

    /// Hands `call` to the async worker. Never blocks; a full queue is counted
    /// and the call is returned.
    pub fn submit(&self, call: AsyncCall) -> Result<(), SubmitError> {
        let Some(submitter) = self.submitter else {
            return Err(SubmitError::Closed(call));
        };
        let result = submitter.submit(call);
        if let (Err(SubmitError::QueueFull(_)), Some(diag)) = (&result, self.diagnostics) {
            bump(&diag.queue_full, 1);
        }
        result
    }

    /// Payload of a sysex event from the current cycle.
    pub fn sysex(&self, ev: &MidiEvent) -> Option<&'a [u8]> {
        self.arena?.get(ev.sysex?)
    }

    pub fn diagnostics(&self) -> Option<&'a Diagnostics> {
        self.diagnostics
    }
}

/// Ordered list of stages.
#[derive(Default)]
pub struct Chain {
    stages: SmallVec<[Box<dyn Stage>; 4]>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: impl Stage + 'static) {
        self.stages.push(Box::new(stage));
    }

    pub fn push_boxed(&mut self, stage: Box<dyn Stage>) {
        self.stages.push(stage);
    }

    pub fn with(mut self, stage: impl Stage + 'static) -> Self {
        self.push(stage);
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.stages.iter().map(|stage| stage.name())
    }

    /// Runs every stage in order. Stops once the buffer is empty.
    pub fn process(&mut self, events: &mut EventBuffer, ctx: &mut StageContext<'_>) {
        for stage in self.stages.iter_mut() {
            if events.is_empty() {
                break;
            }
            stage.process(events, ctx);
        }
    }

    pub fn activate(&mut self, ctx: &mut StageContext<'_>) {
        for stage in self.stages.iter_mut() {
            stage.on_activate(ctx);
        }
    }

    pub fn deactivate(&mut self, ctx: &mut StageContext<'_>) {
        for stage in self.stages.iter_mut() {
            stage.on_deactivate(ctx);
        }
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::CallbackId;
    use crate::scene::{Discard, FnStage};

    #[test]
    fn test_chain_runs_in_order_and_stops_when_empty() {
        let mut chain = Chain::new()
            .with(FnStage::new("add", |events, _ctx| {
                for ev in events.iter_mut() {
                    ev.data1 += 1;
                }
            }))
            .with(Discard)
            .with(FnStage::new("unreachable", |_events, ctx| {
                ctx.request_switch(SceneId::new(9));
            }));
        assert_eq!(chain.len(), 3);

        let mut events = EventBuffer::with_capacity(4);
        events.push(MidiEvent::note_on(0, 0, 60, 100)).unwrap();
        let mut ctx = StageContext::new(SceneId::new(1));
        chain.process(&mut events, &mut ctx);
        assert!(events.is_empty());
        assert_eq!(ctx.pending_switch(), None);
    }

    #[test]
    fn test_latest_switch_request_wins() {
        let mut ctx = StageContext::new(SceneId::new(1));
        ctx.request_switch(SceneId::new(2));
        ctx.request_switch(SwitchTarget::NextScene);
        assert_eq!(ctx.take_switch(), Some(SwitchTarget::NextScene));
        assert_eq!(ctx.take_switch(), None);
    }

    #[test]
    fn test_detached_context_rejects_submit() {
        let ctx = StageContext::new(SceneId::new(1));
        let ev = MidiEvent::note_on(0, 0, 60, 100);
        assert!(matches!(
            ctx.submit(AsyncCall::callback(CallbackId::new(0), ev)),
            Err(SubmitError::Closed(_))
        ));
        assert_eq!(ctx.sysex(&ev), None);
    }
}
