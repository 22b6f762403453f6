//! RT-safe MIDI event types with cycle-relative timing.

use core::fmt;
use core::ops::{BitOr, Not};

use serde::{Deserialize, Serialize};

use crate::sysex::SysexRef;
use crate::utils::note_name;

/// Message kind of a [`MidiEvent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventKind {
    NoteOn = 0,
    NoteOff,
    Ctrl,
    PitchBend,
    Aftertouch,
    PolyAftertouch,
    Program,
    SysEx,
    SysCmQFrame,
    SysCmSongPos,
    SysCmSongSel,
    SysCmTuneReq,
    SysRtClock,
    SysRtStart,
    SysRtContinue,
    SysRtStop,
    SysRtSensing,
    SysRtReset,
    /// Placeholder event; never sent to a backend.
    Dummy,
}

impl EventKind {
    pub const ALL: [EventKind; 19] = [
        EventKind::NoteOn,
        EventKind::NoteOff,
        EventKind::Ctrl,
        EventKind::PitchBend,
        EventKind::Aftertouch,
        EventKind::PolyAftertouch,
        EventKind::Program,
        EventKind::SysEx,
        EventKind::SysCmQFrame,
        EventKind::SysCmSongPos,
        EventKind::SysCmSongSel,
        EventKind::SysCmTuneReq,
        EventKind::SysRtClock,
        EventKind::SysRtStart,
        EventKind::SysRtContinue,
        EventKind::SysRtStop,
        EventKind::SysRtSensing,
        EventKind::SysRtReset,
        EventKind::Dummy,
    ];

    #[inline]
    pub const fn bit(self) -> u32 {
        1 << (self as u32)
    }

    /// Kinds that carry a MIDI channel.
    #[inline]
    pub const fn is_channel_message(self) -> bool {
        matches!(
            self,
            EventKind::NoteOn
                | EventKind::NoteOff
                | EventKind::Ctrl
                | EventKind::PitchBend
                | EventKind::Aftertouch
                | EventKind::PolyAftertouch
                | EventKind::Program
        )
    }

    #[inline]
    pub const fn is_system_common(self) -> bool {
        matches!(
            self,
            EventKind::SysEx
                | EventKind::SysCmQFrame
                | EventKind::SysCmSongPos
                | EventKind::SysCmSongSel
                | EventKind::SysCmTuneReq
        )
    }

    #[inline]
    pub const fn is_system_realtime(self) -> bool {
        matches!(
            self,
            EventKind::SysRtClock
                | EventKind::SysRtStart
                | EventKind::SysRtContinue
                | EventKind::SysRtStop
                | EventKind::SysRtSensing
                | EventKind::SysRtReset
        )
    }

    pub const fn name(self) -> &'static str {
        match self {
            EventKind::NoteOn => "NoteOn",
            EventKind::NoteOff => "NoteOff",
            EventKind::Ctrl => "Ctrl",
            EventKind::PitchBend => "PitchBend",
            EventKind::Aftertouch => "Aftertouch",
            EventKind::PolyAftertouch => "PolyAftertouch",
            EventKind::Program => "Program",
            EventKind::SysEx => "SysEx",
            EventKind::SysCmQFrame => "QFrame",
            EventKind::SysCmSongPos => "SongPos",
            EventKind::SysCmSongSel => "SongSel",
            EventKind::SysCmTuneReq => "TuneReq",
            EventKind::SysRtClock => "Clock",
            EventKind::SysRtStart => "Start",
            EventKind::SysRtContinue => "Continue",
            EventKind::SysRtStop => "Stop",
            EventKind::SysRtSensing => "Sensing",
            EventKind::SysRtReset => "Reset",
            EventKind::Dummy => "Dummy",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bit set of [`EventKind`]s, used by type filters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventKindSet(u32);

impl EventKindSet {
    pub const EMPTY: Self = Self(0);
    pub const NOTE: Self = Self(EventKind::NoteOn.bit() | EventKind::NoteOff.bit());
    pub const CHANNEL: Self = Self(
        EventKind::NoteOn.bit()
            | EventKind::NoteOff.bit()
            | EventKind::Ctrl.bit()
            | EventKind::PitchBend.bit()
            | EventKind::Aftertouch.bit()
            | EventKind::PolyAftertouch.bit()
            | EventKind::Program.bit(),
    );
    pub const SYSTEM: Self = Self(
        EventKind::SysEx.bit()
            | EventKind::SysCmQFrame.bit()
            | EventKind::SysCmSongPos.bit()
            | EventKind::SysCmSongSel.bit()
            | EventKind::SysCmTuneReq.bit()
            | EventKind::SysRtClock.bit()
            | EventKind::SysRtStart.bit()
            | EventKind::SysRtContinue.bit()
            | EventKind::SysRtStop.bit()
            | EventKind::SysRtSensing.bit()
            | EventKind::SysRtReset.bit(),
    );
    pub const ALL: Self = Self((1 << EventKind::ALL.len()) - 1);

    #[inline]
    pub const fn of(kind: EventKind) -> Self {
        Self(kind.bit())
    }

    #[inline]
    pub const fn with(self, kind: EventKind) -> Self {
        Self(self.0 | kind.bit())
    }

    #[inline]
    pub const fn contains(self, kind: EventKind) -> bool {
        self.0 & kind.bit() != 0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = EventKind> {
        EventKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

impl From<EventKind> for EventKindSet {
    fn from(kind: EventKind) -> Self {
        Self::of(kind)
    }
}

impl BitOr for EventKindSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOr<EventKind> for EventKindSet {
    type Output = Self;

    fn bitor(self, rhs: EventKind) -> Self {
        self.with(rhs)
    }
}

impl Not for EventKindSet {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0 & Self::ALL.0)
    }
}

/// A single MIDI event flowing through one processing cycle.
///
/// Events are plain values. `data1`/`data2` are wider than the wire format so
/// that stages can compute out-of-range values; the sanitize pass drops or
/// clamps those before anything reaches a backend.
///
/// | kind             | data1              | data2                 |
/// |------------------|--------------------|-----------------------|
/// | `NoteOn/NoteOff` | note               | velocity              |
/// | `Ctrl`           | controller         | value                 |
/// | `PitchBend`      | -                  | bend (-8192..=8191)   |
/// | `Aftertouch`     | -                  | pressure              |
/// | `PolyAftertouch` | note               | pressure              |
/// | `Program`        | -                  | program               |
/// | `SysCmQFrame`    | quarter-frame data | -                     |
/// | `SysCmSongPos`   | position (14 bit)  | -                     |
/// | `SysCmSongSel`   | song               | -                     |
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiEvent {
    pub kind: EventKind,
    pub port: u16,
    pub channel: u8,
    pub data1: i32,
    pub data2: i32,
    /// Frame offset within the current cycle (0 = first frame).
    pub frame: u32,
    /// Payload location for `SysEx` events, valid for the current cycle only.
    pub sysex: Option<SysexRef>,
}

impl MidiEvent {
    #[inline]
    pub const fn new(kind: EventKind, port: u16, channel: u8, data1: i32, data2: i32) -> Self {
        Self {
            kind,
            port,
            channel,
            data1,
            data2,
            frame: 0,
            sysex: None,
        }
    }

    #[inline]
    pub const fn note_on(port: u16, channel: u8, note: i32, velocity: i32) -> Self {
        Self::new(EventKind::NoteOn, port, channel, note, velocity)
    }

    #[inline]
    pub const fn note_off(port: u16, channel: u8, note: i32, velocity: i32) -> Self {
        Self::new(EventKind::NoteOff, port, channel, note, velocity)
    }

    #[inline]
    pub const fn ctrl(port: u16, channel: u8, controller: i32, value: i32) -> Self {
        Self::new(EventKind::Ctrl, port, channel, controller, value)
    }

    #[inline]
    pub const fn program(port: u16, channel: u8, program: i32) -> Self {
        Self::new(EventKind::Program, port, channel, 0, program)
    }

    /// `bend`: signed 14-bit (-8192 to 8191).
    #[inline]
    pub const fn pitch_bend(port: u16, channel: u8, bend: i32) -> Self {
        Self::new(EventKind::PitchBend, port, channel, 0, bend)
    }

    #[inline]
    pub const fn aftertouch(port: u16, channel: u8, pressure: i32) -> Self {
        Self::new(EventKind::Aftertouch, port, channel, 0, pressure)
    }

    #[inline]
    pub const fn poly_aftertouch(port: u16, channel: u8, note: i32, pressure: i32) -> Self {
        Self::new(EventKind::PolyAftertouch, port, channel, note, pressure)
    }

    /// System common or real-time message without payload bytes.
    #[inline]
    pub const fn system(kind: EventKind, port: u16, data1: i32) -> Self {
        Self::new(kind, port, 0, data1, 0)
    }

    #[inline]
    pub const fn sysex(port: u16, payload: SysexRef) -> Self {
        let mut event = Self::new(EventKind::SysEx, port, 0, 0, 0);
        event.sysex = Some(payload);
        event
    }

    #[inline]
    pub const fn dummy() -> Self {
        Self::new(EventKind::Dummy, 0, 0, 0, 0)
    }

    #[inline]
    pub const fn with_frame(mut self, frame: u32) -> Self {
        self.frame = frame;
        self
    }

    #[inline]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[inline]
    pub const fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    #[inline]
    pub fn is_note_on(&self) -> bool {
        self.kind == EventKind::NoteOn && self.data2 > 0
    }

    /// Note-off, including note-on with velocity 0.
    #[inline]
    pub fn is_note_off(&self) -> bool {
        self.kind == EventKind::NoteOff || (self.kind == EventKind::NoteOn && self.data2 <= 0)
    }

    #[inline]
    pub fn note(&self) -> Option<i32> {
        match self.kind {
            EventKind::NoteOn | EventKind::NoteOff | EventKind::PolyAftertouch => {
                Some(self.data1)
            }
            _ => None,
        }
    }

    #[inline]
    pub fn velocity(&self) -> Option<i32> {
        match self.kind {
            EventKind::NoteOn | EventKind::NoteOff => Some(self.data2),
            _ => None,
        }
    }

    #[inline]
    pub fn controller(&self) -> Option<i32> {
        (self.kind == EventKind::Ctrl).then_some(self.data1)
    }

    /// Controller value, program, pressure or bend, depending on kind.
    #[inline]
    pub fn value(&self) -> Option<i32> {
        match self.kind {
            EventKind::Ctrl
            | EventKind::Program
            | EventKind::PitchBend
            | EventKind::Aftertouch
            | EventKind::PolyAftertouch => Some(self.data2),
            _ => None,
        }
    }

    /// Formats the event with ports and channels shifted by `data_offset`.
    pub fn display(&self, data_offset: u8) -> EventDisplay<'_> {
        EventDisplay {
            event: self,
            offset: data_offset as i32,
        }
    }
}

impl Default for MidiEvent {
    fn default() -> Self {
        Self::dummy()
    }
}

pub struct EventDisplay<'a> {
    event: &'a MidiEvent,
    offset: i32,
}

impl fmt::Display for EventDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ev = self.event;
        let port = ev.port as i32 + self.offset;
        let channel = ev.channel as i32 + self.offset;
        match ev.kind {
            EventKind::NoteOn | EventKind::NoteOff => {
                let name = u8::try_from(ev.data1).ok().and_then(note_name);
                match name {
                    Some(name) => write!(
                        f,
                        "{} port={} ch={} note={} ({}) vel={}",
                        ev.kind, port, channel, ev.data1, name, ev.data2
                    ),
                    None => write!(
                        f,
                        "{} port={} ch={} note={} vel={}",
                        ev.kind, port, channel, ev.data1, ev.data2
                    ),
                }
            }
            EventKind::Ctrl => write!(
                f,
                "Ctrl port={} ch={} ctrl={} value={}",
                port, channel, ev.data1, ev.data2
            ),
            EventKind::PolyAftertouch => write!(
                f,
                "PolyAftertouch port={} ch={} note={} value={}",
                port, channel, ev.data1, ev.data2
            ),
            EventKind::PitchBend | EventKind::Aftertouch => {
                write!(f, "{} port={} ch={} value={}", ev.kind, port, channel, ev.data2)
            }
            EventKind::Program => write!(
                f,
                "Program port={} ch={} program={}",
                port,
                channel,
                i64::from(ev.data2) + i64::from(self.offset)
            ),
            EventKind::SysEx => match ev.sysex {
                Some(r) => write!(f, "SysEx port={} len={}", port, r.len()),
                None => write!(f, "SysEx port={} len=?", port),
            },
            EventKind::SysCmQFrame | EventKind::SysCmSongPos | EventKind::SysCmSongSel => {
                write!(f, "{} port={} data={}", ev.kind, port, ev.data1)
            }
            kind => write!(f, "{} port={}", kind, port),
        }
    }
}
