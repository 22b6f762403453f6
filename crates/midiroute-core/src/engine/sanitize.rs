//! Output sanitizing: drop what cannot be sent, clamp what can.

use midiroute_event::{EventKind, MidiEvent};

const PITCH_BEND_MIN: i32 = -8192;
const PITCH_BEND_MAX: i32 = 8191;
const SONG_POSITION_MAX: i32 = 0x3fff;

#[inline]
fn in_7bit(value: i32) -> bool {
    (0..=127).contains(&value)
}

/// Makes `ev` valid for a backend with `out_ports` output ports.
///
/// Returns `false` if the event must be dropped: port out of range, channel
/// above 15, note/controller/program outside 0-127, or a `Dummy` event.
/// Velocities, controller values, pressures, pitch bend and song position are
/// clamped to their ranges; a note-on keeps a velocity of at least 1.
pub fn sanitize_event(ev: &mut MidiEvent, out_ports: u16) -> bool {
    if ev.port >= out_ports {
        return false;
    }
    if ev.kind.is_channel_message() && ev.channel > 15 {
        return false;
    }
    match ev.kind {
        EventKind::NoteOn => {
            if !in_7bit(ev.data1) {
                return false;
            }
            ev.data2 = ev.data2.clamp(1, 127);
        }
        EventKind::NoteOff | EventKind::PolyAftertouch | EventKind::Ctrl => {
            if !in_7bit(ev.data1) {
                return false;
            }
            ev.data2 = ev.data2.clamp(0, 127);
        }
        EventKind::Program => {
            if !in_7bit(ev.data2) {
                return false;
            }
        }
        EventKind::Aftertouch => {
            ev.data2 = ev.data2.clamp(0, 127);
        }
        EventKind::PitchBend => {
            ev.data2 = ev.data2.clamp(PITCH_BEND_MIN, PITCH_BEND_MAX);
        }
        EventKind::SysCmSongPos => {
            ev.data1 = ev.data1.clamp(0, SONG_POSITION_MAX);
        }
        EventKind::SysCmQFrame | EventKind::SysCmSongSel => {
            if !in_7bit(ev.data1) {
                return false;
            }
        }
        EventKind::SysEx => {
            if ev.sysex.is_none() {
                return false;
            }
        }
        EventKind::Dummy => return false,
        EventKind::SysCmTuneReq
        | EventKind::SysRtClock
        | EventKind::SysRtStart
        | EventKind::SysRtContinue
        | EventKind::SysRtStop
        | EventKind::SysRtSensing
        | EventKind::SysRtReset => {}
    }
    true
}
