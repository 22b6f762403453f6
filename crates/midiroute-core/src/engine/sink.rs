use midiroute_event::MidiEvent;

use super::sanitize::sanitize_event;
use crate::buffer::EventBuffer;
use crate::diagnostics::{bump, Diagnostics};
use crate::scene::SceneId;
use crate::tracker::{FlushReport, Spill, StateTracker};

/// The single path by which events reach the output buffer.
///
/// Every event is sanitized (if enabled), appended, and then observed by the
/// tracker under the scene that produced it. Events that never reach the
/// output are never tracked.
pub struct EmitSink<'a> {
    out: &'a mut EventBuffer,
    tracker: &'a mut StateTracker,
    diagnostics: Option<&'a Diagnostics>,
    out_ports: Option<u16>,
    overflowed: u32,
    spill: Spill,
}

impl<'a> EmitSink<'a> {
    pub fn new(out: &'a mut EventBuffer, tracker: &'a mut StateTracker) -> Self {
        Self {
            out,
            tracker,
            diagnostics: None,
            out_ports: None,
            overflowed: 0,
            spill: Spill::Fits,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: &'a Diagnostics) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// Sanitizes every emitted event for `out_ports` output ports.
    pub fn sanitizing(mut self, out_ports: u16) -> Self {
        self.out_ports = Some(out_ports);
        self
    }

    /// Returns `true` if the event was appended.
    pub fn emit(&mut self, mut ev: MidiEvent, origin: SceneId) -> bool {
        if let Some(out_ports) = self.out_ports {
            if !sanitize_event(&mut ev, out_ports) {
                if let Some(diag) = self.diagnostics {
                    bump(&diag.sanitized, 1);
                }
                return false;
            }
        }
        if self.out.push(ev).is_err() {
            self.overflowed += 1;
            if let Some(diag) = self.diagnostics {
                bump(&diag.buffer_overflows, 1);
            }
            return false;
        }
        let spill = self.tracker.observe(&ev, origin);
        if spill.exceeded() {
            self.spill = self.spill.max(spill);
            if let Some(diag) = self.diagnostics {
                bump(&diag.soft_limit_exceeded, 1);
            }
        }
        true
    }

    /// Appends release events for everything `origin` left sounding.
    pub fn compensate(&mut self, origin: SceneId, frame: u32) -> FlushReport {
        let report = self.tracker.flush(origin, self.out, frame);
        self.overflowed += report.dropped;
        if let Some(diag) = self.diagnostics {
            bump(&diag.notes_released, report.notes as u64);
            bump(&diag.pedals_released, report.pedals as u64);
            bump(&diag.buffer_overflows, report.dropped as u64);
        }
        report
    }

    /// Events lost to a full output buffer since this sink was created.
    #[inline]
    pub fn overflowed(&self) -> u32 {
        self.overflowed
    }

    /// Worst soft-limit outcome seen since this sink was created.
    #[inline]
    pub fn spill(&self) -> Spill {
        self.spill
    }

    pub fn tracker(&self) -> &StateTracker {
        &*self.tracker
    }

    pub fn len(&self) -> usize {
        self.out.len()
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: SceneId = SceneId::new(1);

    #[test]
    fn test_dropped_events_are_not_tracked() {
        let mut out = EventBuffer::with_capacity(1);
        let mut tracker = StateTracker::new();
        let diag = Diagnostics::new();
        let mut sink = EmitSink::new(&mut out, &mut tracker)
            .with_diagnostics(&diag)
            .sanitizing(1);

        assert!(!sink.emit(MidiEvent::note_on(3, 0, 60, 100), A));
        assert!(sink.emit(MidiEvent::note_on(0, 0, 61, 100), A));
        assert!(!sink.emit(MidiEvent::note_on(0, 0, 62, 100), A));
        assert_eq!(sink.overflowed(), 1);
        assert_eq!(sink.tracker().note_count(), 1);

        let snap = diag.snapshot();
        assert_eq!(snap.sanitized, 1);
        assert_eq!(snap.buffer_overflows, 1);
    }

    #[test]
    fn test_tracks_sanitized_value() {
        let mut out = EventBuffer::with_capacity(4);
        let mut tracker = StateTracker::new();
        let mut sink = EmitSink::new(&mut out, &mut tracker).sanitizing(1);
        // clamped to velocity 1, so it is a sounding note
        assert!(sink.emit(MidiEvent::note_on(0, 0, 60, 0), A));
        assert_eq!(sink.tracker().notes_for(A).count(), 1);
    }

    #[test]
    fn test_soft_limit_recorded() {
        let mut out = EventBuffer::with_capacity(8);
        let mut tracker = StateTracker::with_limits(1, 1);
        let diag = Diagnostics::new();
        let mut sink = EmitSink::new(&mut out, &mut tracker).with_diagnostics(&diag);
        sink.emit(MidiEvent::note_on(0, 0, 60, 100), A);
        sink.emit(MidiEvent::note_on(0, 0, 61, 100), A);
        assert_eq!(sink.spill(), Spill::SoftLimit);
        assert_eq!(diag.snapshot().soft_limit_exceeded, 1);
    }
}
