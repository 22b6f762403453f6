//! Note/pedal state tracking for scene-switch compensation.
//!
//! Every event the engine emits is observed here together with the scene that
//! produced it. When that scene is left, [`StateTracker::flush`] synthesizes a
//! note-off for each sounding note and a release for each held pedal.

mod records;
mod store;

pub use records::{
    is_pedal, pedal_is_down, NoteRecord, PedalRecord, CC_ALL_NOTES_OFF, CC_ALL_SOUND_OFF,
    CC_HOLD_2, CC_SOSTENUTO, CC_SUSTAIN, PEDAL_CONTROLLERS,
};
pub use store::Spill;

use midiroute_event::{EventKind, MidiEvent};

use crate::buffer::EventBuffer;
use crate::config::{MAX_SIMULTANEOUS_NOTES, MAX_SUSTAIN_PEDALS};
use crate::scene::SceneId;
use store::RecordStore;

/// Result of flushing one scene's state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub notes: u32,
    pub pedals: u32,
    /// Compensation events that did not fit in the output buffer.
    pub dropped: u32,
}

impl FlushReport {
    #[inline]
    pub fn released(&self) -> u32 {
        self.notes + self.pedals
    }
}

#[derive(Debug)]
pub struct StateTracker {
    notes: RecordStore<NoteRecord>,
    pedals: RecordStore<PedalRecord>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::with_limits(MAX_SIMULTANEOUS_NOTES, MAX_SUSTAIN_PEDALS)
    }

    pub fn with_limits(notes: usize, pedals: usize) -> Self {
        Self {
            notes: RecordStore::with_limit(notes),
            pedals: RecordStore::with_limit(pedals),
        }
    }

    /// Records a sounding note. A repeated note-on for the same key keeps one
    /// record and moves it to `origin`.
    pub fn on_note_on(&mut self, port: u16, channel: u8, note: u8, origin: SceneId) -> Spill {
        if let Some(record) = self.notes.find_mut(|r| r.is_key(port, channel, note)) {
            record.origin = origin;
            return Spill::Fits;
        }
        self.notes.push(NoteRecord {
            port,
            channel,
            note,
            origin,
        })
    }

    /// Forgets a note. Returns `false` if it was not sounding.
    pub fn on_note_off(&mut self, port: u16, channel: u8, note: u8) -> bool {
        self.notes.remove_where(|r| r.is_key(port, channel, note)) > 0
    }

    pub fn on_pedal_change(
        &mut self,
        port: u16,
        channel: u8,
        controller: u8,
        is_down: bool,
        origin: SceneId,
    ) -> Spill {
        if !is_down {
            self.pedals
                .remove_where(|r| r.is_key(port, channel, controller));
            return Spill::Fits;
        }
        if let Some(record) = self.pedals.find_mut(|r| r.is_key(port, channel, controller)) {
            record.origin = origin;
            return Spill::Fits;
        }
        self.pedals.push(PedalRecord {
            port,
            channel,
            controller,
            origin,
        })
    }

    /// Updates state from one emitted event.
    pub fn observe(&mut self, ev: &MidiEvent, origin: SceneId) -> Spill {
        let Ok(data1) = u8::try_from(ev.data1) else {
            return Spill::Fits;
        };
        match ev.kind {
            EventKind::NoteOn if ev.data2 > 0 => {
                self.on_note_on(ev.port, ev.channel, data1, origin)
            }
            EventKind::NoteOn | EventKind::NoteOff => {
                self.on_note_off(ev.port, ev.channel, data1);
                Spill::Fits
            }
            EventKind::Ctrl if is_pedal(ev.data1) => self.on_pedal_change(
                ev.port,
                ev.channel,
                data1,
                pedal_is_down(ev.data2),
                origin,
            ),
            EventKind::Ctrl if ev.data1 == CC_ALL_NOTES_OFF || ev.data1 == CC_ALL_SOUND_OFF => {
                self.notes
                    .remove_where(|r| r.port == ev.port && r.channel == ev.channel);
                Spill::Fits
            }
            _ => Spill::Fits,
        }
    }

    pub fn notes_for(&self, origin: SceneId) -> impl Iterator<Item = &NoteRecord> + '_ {
        self.notes.iter().filter(move |r| r.origin == origin)
    }

    pub fn pedals_for(&self, origin: SceneId) -> impl Iterator<Item = &PedalRecord> + '_ {
        self.pedals.iter().filter(move |r| r.origin == origin)
    }

    #[inline]
    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    #[inline]
    pub fn pedal_count(&self) -> usize {
        self.pedals.len()
    }

    /// Appends a note-off per sounding note of `origin`, then a release per held
    /// pedal, and forgets them. Events that do not fit in `out` are dropped and
    /// counted; their records are removed either way.
    pub fn flush(&mut self, origin: SceneId, out: &mut EventBuffer, frame: u32) -> FlushReport {
        let mut report = FlushReport::default();

        self.notes.remove_where(|r| {
            if r.origin != origin {
                return false;
            }
            let off = MidiEvent::note_off(r.port, r.channel, r.note as i32, 0).with_frame(frame);
            if out.push(off).is_ok() {
                report.notes += 1;
            } else {
                report.dropped += 1;
            }
            true
        });

        self.pedals.remove_where(|r| {
            if r.origin != origin {
                return false;
            }
            let release =
                MidiEvent::ctrl(r.port, r.channel, r.controller as i32, 0).with_frame(frame);
            if out.push(release).is_ok() {
                report.pedals += 1;
            } else {
                report.dropped += 1;
            }
            true
        });

        report
    }

    /// Restores spare overflow capacity. Not RT-safe; call from a maintenance thread
    /// or between cycles.
    pub fn reserve_headroom(&mut self) {
        self.notes.reserve_headroom();
        self.pedals.reserve_headroom();
    }

    pub fn clear(&mut self) {
        self.notes.clear();
        self.pedals.clear();
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}
