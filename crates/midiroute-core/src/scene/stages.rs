//! Built-in stages.
//!
//! Musical transformations live outside the core; these cover filtering,
//! MIDI-controlled scene switching and hand-off to async callbacks.

use midiroute_event::{EventKind, EventKindSet, MidiEvent};
use smallvec::SmallVec;

use super::stage::{Stage, StageContext};
use super::SwitchTarget;
use crate::bridge::{AsyncCall, CallbackId};
use crate::buffer::EventBuffer;
use crate::diagnostics::bump;
use crate::engine::sanitize_event;

/// Leaves events untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pass;

impl Stage for Pass {
    fn name(&self) -> &str {
        "Pass"
    }

    fn process(&mut self, _events: &mut EventBuffer, _ctx: &mut StageContext<'_>) {}
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct Discard;

impl Stage for Discard {
    fn name(&self) -> &str {
        "Discard"
    }

    fn process(&mut self, events: &mut EventBuffer, _ctx: &mut StageContext<'_>) {
        events.retain(|_| false);
    }
}

/// Keeps (or rejects) events by kind.
#[derive(Debug, Clone, Copy)]
pub struct KindFilter {
    kinds: EventKindSet,
    keep: bool,
}

impl KindFilter {
    pub fn keep(kinds: impl Into<EventKindSet>) -> Self {
        Self {
            kinds: kinds.into(),
            keep: true,
        }
    }

    pub fn reject(kinds: impl Into<EventKindSet>) -> Self {
        Self {
            kinds: kinds.into(),
            keep: false,
        }
    }
}

impl Stage for KindFilter {
    fn name(&self) -> &str {
        "KindFilter"
    }

    fn process(&mut self, events: &mut EventBuffer, _ctx: &mut StageContext<'_>) {
        let (kinds, keep) = (self.kinds, self.keep);
        events.retain(|ev| kinds.contains(ev.kind) == keep);
    }
}

/// Keeps events on the listed ports.
#[derive(Debug, Clone, Copy)]
pub struct PortFilter {
    mask: [u64; 4],
    keep: bool,
}

impl PortFilter {
    /// Ports above 255 are ignored.
    pub fn keep(ports: impl IntoIterator<Item = u16>) -> Self {
        let mut mask = [0u64; 4];
        for port in ports.into_iter().filter(|p| *p < 256) {
            mask[(port / 64) as usize] |= 1 << (port % 64);
        }
        Self { mask, keep: true }
    }

    pub fn reject(ports: impl IntoIterator<Item = u16>) -> Self {
        Self {
            keep: false,
            ..Self::keep(ports)
        }
    }

    #[inline]
    fn matches(&self, port: u16) -> bool {
        port < 256 && self.mask[(port / 64) as usize] & (1 << (port % 64)) != 0
    }
}

impl Stage for PortFilter {
    fn name(&self) -> &str {
        "PortFilter"
    }

    fn process(&mut self, events: &mut EventBuffer, _ctx: &mut StageContext<'_>) {
        let filter = *self;
        events.retain(|ev| filter.matches(ev.port) == filter.keep);
    }
}

/// Keeps channel events on the listed channels (0-15). System events pass.
#[derive(Debug, Clone, Copy)]
pub struct ChannelFilter {
    mask: u16,
    keep: bool,
}

impl ChannelFilter {
    pub fn keep(channels: impl IntoIterator<Item = u8>) -> Self {
        let mask = channels
            .into_iter()
            .filter(|c| *c < 16)
            .fold(0u16, |mask, c| mask | (1 << c));
        Self { mask, keep: true }
    }

    pub fn reject(channels: impl IntoIterator<Item = u8>) -> Self {
        Self {
            keep: false,
            ..Self::keep(channels)
        }
    }
}

impl Stage for ChannelFilter {
    fn name(&self) -> &str {
        "ChannelFilter"
    }

    fn process(&mut self, events: &mut EventBuffer, _ctx: &mut StageContext<'_>) {
        let (mask, keep) = (self.mask, self.keep);
        events.retain(|ev| {
            if !ev.kind.is_channel_message() {
                return true;
            }
            let hit = ev.channel < 16 && mask & (1 << ev.channel) != 0;
            hit == keep
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SwitchMode {
    Scene,
    Subscene,
}

/// Switches scenes on program change. The program change itself is consumed.
#[derive(Debug, Clone, Copy)]
pub struct SceneSwitch {
    mode: SwitchMode,
    offset: i32,
}

impl SceneSwitch {
    /// Program `n` selects scene `n`.
    pub fn scenes() -> Self {
        Self {
            mode: SwitchMode::Scene,
            offset: 0,
        }
    }

    /// Program `n` selects subscene `n` of the current scene.
    pub fn subscenes() -> Self {
        Self {
            mode: SwitchMode::Subscene,
            offset: 0,
        }
    }

    /// Adds `offset` to the program number before selecting.
    pub fn offset(mut self, offset: i32) -> Self {
        self.offset = offset;
        self
    }
}

impl Stage for SceneSwitch {
    fn name(&self) -> &str {
        "SceneSwitch"
    }

    fn process(&mut self, events: &mut EventBuffer, ctx: &mut StageContext<'_>) {
        let (mode, offset) = (self.mode, self.offset);
        events.retain(|ev| {
            if ev.kind != EventKind::Program {
                return true;
            }
            let selected = ev
                .data2
                .checked_add(offset)
                .and_then(|n| u16::try_from(n).ok());
            if let Some(n) = selected {
                match mode {
                    SwitchMode::Scene => ctx.request_switch(SwitchTarget::Scene(n)),
                    SwitchMode::Subscene => ctx.request_switch(SwitchTarget::Subscene(n)),
                }
            }
            false
        });
    }
}

/// Submits each event to a registered callback on the async worker.
#[derive(Debug, Clone, Copy)]
pub struct Call {
    id: CallbackId,
    consume: bool,
}

impl Call {
    /// Events pass through after being submitted.
    pub fn new(id: CallbackId) -> Self {
        Self { id, consume: false }
    }

    /// Events are dropped after being submitted.
    pub fn consuming(id: CallbackId) -> Self {
        Self { id, consume: true }
    }
}

impl Stage for Call {
    fn name(&self) -> &str {
        "Call"
    }

    fn process(&mut self, events: &mut EventBuffer, ctx: &mut StageContext<'_>) {
        for ev in events.iter() {
            // QueueFull is counted by the context; the event still flows on.
            let _ = ctx.submit(AsyncCall::callback(self.id, *ev));
        }
        if self.consume {
            events.retain(|_| false);
        }
    }
}

/// Replaces the placeholder event of an init chain with fixed events.
///
/// `Dummy` events are dropped, then the stored events are appended.
#[derive(Debug, Clone)]
pub struct Emit {
    events: SmallVec<[MidiEvent; 4]>,
}

impl Emit {
    pub fn new(events: impl IntoIterator<Item = MidiEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
        }
    }
}

impl Stage for Emit {
    fn name(&self) -> &str {
        "Emit"
    }

    fn process(&mut self, events: &mut EventBuffer, _ctx: &mut StageContext<'_>) {
        events.retain(|ev| ev.kind != EventKind::Dummy);
        for ev in &self.events {
            if events.push(*ev).is_err() {
                break;
            }
        }
    }
}

/// Drops events that cannot be sent and clamps values to their MIDI range.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sanitize;

impl Stage for Sanitize {
    fn name(&self) -> &str {
        "Sanitize"
    }

    fn process(&mut self, events: &mut EventBuffer, ctx: &mut StageContext<'_>) {
        let out_ports = ctx.out_ports();
        let before = events.len();
        events.retain(|ev| sanitize_event(ev, out_ports));
        if let Some(diag) = ctx.diagnostics() {
            bump(&diag.sanitized, (before - events.len()) as u64);
        }
    }
}

/// Closure adapter.
pub struct FnStage<F> {
    name: &'static str,
    f: F,
}

impl<F> FnStage<F> {
    pub fn new(name: &'static str, f: F) -> Self
    where
        F: FnMut(&mut EventBuffer, &mut StageContext<'_>) + Send,
    {
        Self { name, f }
    }
}

impl<F> Stage for FnStage<F>
where
    F: FnMut(&mut EventBuffer, &mut StageContext<'_>) + Send,
{
    fn name(&self) -> &str {
        self.name
    }

    fn process(&mut self, events: &mut EventBuffer, ctx: &mut StageContext<'_>) {
        (self.f)(events, ctx)
    }
}
