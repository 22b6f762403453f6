//! Raw MIDI byte codec.
//!
//! One backend packet holds exactly one complete message. Running status is not
//! supported, since every packet a backend delivers starts with a status byte.

use thiserror::Error;

use crate::event::{EventKind, MidiEvent};
use crate::sysex::{ArenaFull, SysexArena};

const PITCH_BEND_CENTER: i32 = 8192;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty MIDI packet")]
    Empty,

    #[error("packet starts with data byte {0:#04x}")]
    MissingStatus(u8),

    #[error("status {status:#04x} expects {expected} bytes, got {actual}")]
    Length {
        status: u8,
        expected: usize,
        actual: usize,
    },

    #[error("invalid data byte {byte:#04x} after status {status:#04x}")]
    InvalidData { status: u8, byte: u8 },

    #[error("unterminated sysex message")]
    UnterminatedSysex,

    #[error("unsupported status byte {0:#04x}")]
    Unsupported(u8),

    #[error(transparent)]
    ArenaFull(#[from] ArenaFull),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    #[error("{kind} events cannot be encoded")]
    NotEncodable { kind: EventKind },

    #[error("{kind} field out of range: {value}")]
    OutOfRange { kind: EventKind, value: i32 },

    #[error("sysex payload is not available in this cycle")]
    MissingSysex,

    #[error("output buffer too small: {needed} bytes needed")]
    BufferTooSmall { needed: usize },
}

#[inline]
fn data_byte(status: u8, byte: u8) -> Result<i32, DecodeError> {
    if byte < 0x80 {
        Ok(byte as i32)
    } else {
        Err(DecodeError::InvalidData { status, byte })
    }
}

#[inline]
fn expect_len(status: u8, bytes: &[u8], expected: usize) -> Result<(), DecodeError> {
    if bytes.len() == expected {
        Ok(())
    } else {
        Err(DecodeError::Length {
            status,
            expected,
            actual: bytes.len(),
        })
    }
}

/// Decodes one packet into an event. Sysex payloads are copied into `arena`.
///
/// A note-on with velocity 0 is decoded as a note-off.
pub fn decode(
    bytes: &[u8],
    frame: u32,
    port: u16,
    arena: &mut SysexArena,
) -> Result<MidiEvent, DecodeError> {
    let status = *bytes.first().ok_or(DecodeError::Empty)?;
    if status < 0x80 {
        return Err(DecodeError::MissingStatus(status));
    }

    let channel = status & 0x0F;
    let event = match status & 0xF0 {
        0x80 | 0x90 | 0xA0 | 0xB0 | 0xE0 => {
            expect_len(status, bytes, 3)?;
            let d1 = data_byte(status, bytes[1])?;
            let d2 = data_byte(status, bytes[2])?;
            match status & 0xF0 {
                0x80 => MidiEvent::note_off(port, channel, d1, d2),
                0x90 if d2 == 0 => MidiEvent::note_off(port, channel, d1, 0),
                0x90 => MidiEvent::note_on(port, channel, d1, d2),
                0xA0 => MidiEvent::poly_aftertouch(port, channel, d1, d2),
                0xB0 => MidiEvent::ctrl(port, channel, d1, d2),
                _ => MidiEvent::pitch_bend(port, channel, ((d2 << 7) | d1) - PITCH_BEND_CENTER),
            }
        }
        0xC0 | 0xD0 => {
            expect_len(status, bytes, 2)?;
            let d1 = data_byte(status, bytes[1])?;
            if status & 0xF0 == 0xC0 {
                MidiEvent::program(port, channel, d1)
            } else {
                MidiEvent::aftertouch(port, channel, d1)
            }
        }
        _ => decode_system(status, bytes, port, arena)?,
    };

    Ok(event.with_frame(frame))
}

fn decode_system(
    status: u8,
    bytes: &[u8],
    port: u16,
    arena: &mut SysexArena,
) -> Result<MidiEvent, DecodeError> {
    let realtime = |kind| -> Result<MidiEvent, DecodeError> {
        expect_len(status, bytes, 1)?;
        Ok(MidiEvent::system(kind, port, 0))
    };

    match status {
        0xF0 => {
            if bytes.len() < 2 || bytes[bytes.len() - 1] != 0xF7 {
                return Err(DecodeError::UnterminatedSysex);
            }
            if let Some(&byte) = bytes[1..bytes.len() - 1].iter().find(|b| **b >= 0x80) {
                return Err(DecodeError::InvalidData { status, byte });
            }
            let payload = arena.store(bytes)?;
            Ok(MidiEvent::sysex(port, payload))
        }
        0xF1 => {
            expect_len(status, bytes, 2)?;
            let d1 = data_byte(status, bytes[1])?;
            Ok(MidiEvent::system(EventKind::SysCmQFrame, port, d1))
        }
        0xF2 => {
            expect_len(status, bytes, 3)?;
            let lsb = data_byte(status, bytes[1])?;
            let msb = data_byte(status, bytes[2])?;
            Ok(MidiEvent::system(
                EventKind::SysCmSongPos,
                port,
                (msb << 7) | lsb,
            ))
        }
        0xF3 => {
            expect_len(status, bytes, 2)?;
            let d1 = data_byte(status, bytes[1])?;
            Ok(MidiEvent::system(EventKind::SysCmSongSel, port, d1))
        }
        0xF6 => realtime(EventKind::SysCmTuneReq),
        0xF8 => realtime(EventKind::SysRtClock),
        0xFA => realtime(EventKind::SysRtStart),
        0xFB => realtime(EventKind::SysRtContinue),
        0xFC => realtime(EventKind::SysRtStop),
        0xFE => realtime(EventKind::SysRtSensing),
        0xFF => realtime(EventKind::SysRtReset),
        _ => Err(DecodeError::Unsupported(status)),
    }
}

/// Number of bytes [`encode`] writes for `event`, if it is encodable.
pub fn encoded_len(event: &MidiEvent) -> Option<usize> {
    match event.kind {
        EventKind::NoteOn
        | EventKind::NoteOff
        | EventKind::Ctrl
        | EventKind::PitchBend
        | EventKind::PolyAftertouch
        | EventKind::SysCmSongPos => Some(3),
        EventKind::Program
        | EventKind::Aftertouch
        | EventKind::SysCmQFrame
        | EventKind::SysCmSongSel => Some(2),
        EventKind::SysEx => event.sysex.map(|r| r.len()),
        EventKind::Dummy => None,
        _ => Some(1),
    }
}

#[inline]
fn checked_7bit(kind: EventKind, value: i32) -> Result<u8, EncodeError> {
    if (0..=127).contains(&value) {
        Ok(value as u8)
    } else {
        Err(EncodeError::OutOfRange { kind, value })
    }
}

/// Encodes `event` into `out`, returning the number of bytes written.
///
/// RT-safe: writes into the caller's buffer only.
pub fn encode(event: &MidiEvent, arena: &SysexArena, out: &mut [u8]) -> Result<usize, EncodeError> {
    let kind = event.kind;
    let needed = encoded_len(event).ok_or(EncodeError::NotEncodable { kind })?;
    if out.len() < needed {
        return Err(EncodeError::BufferTooSmall { needed });
    }

    if kind.is_channel_message() {
        if event.channel > 15 {
            return Err(EncodeError::OutOfRange {
                kind,
                value: event.channel as i32,
            });
        }
        let channel = event.channel;
        match kind {
            EventKind::NoteOn
            | EventKind::NoteOff
            | EventKind::Ctrl
            | EventKind::PolyAftertouch => {
                let status = match kind {
                    EventKind::NoteOn => 0x90,
                    EventKind::NoteOff => 0x80,
                    EventKind::Ctrl => 0xB0,
                    _ => 0xA0,
                };
                out[0] = status | channel;
                out[1] = checked_7bit(kind, event.data1)?;
                out[2] = checked_7bit(kind, event.data2)?;
            }
            EventKind::PitchBend => {
                let unsigned = event
                    .data2
                    .checked_add(PITCH_BEND_CENTER)
                    .filter(|v| (0..=16383).contains(v))
                    .ok_or(EncodeError::OutOfRange {
                        kind,
                        value: event.data2,
                    })?;
                out[0] = 0xE0 | channel;
                out[1] = (unsigned & 0x7F) as u8;
                out[2] = ((unsigned >> 7) & 0x7F) as u8;
            }
            EventKind::Program => {
                out[0] = 0xC0 | channel;
                out[1] = checked_7bit(kind, event.data2)?;
            }
            _ => {
                out[0] = 0xD0 | channel;
                out[1] = checked_7bit(kind, event.data2)?;
            }
        }
        return Ok(needed);
    }

    match kind {
        EventKind::SysEx => {
            let payload = event
                .sysex
                .and_then(|r| arena.get(r))
                .ok_or(EncodeError::MissingSysex)?;
            out[..payload.len()].copy_from_slice(payload);
        }
        EventKind::SysCmQFrame => {
            out[0] = 0xF1;
            out[1] = checked_7bit(kind, event.data1)?;
        }
        EventKind::SysCmSongPos => {
            if !(0..=16383).contains(&event.data1) {
                return Err(EncodeError::OutOfRange {
                    kind,
                    value: event.data1,
                });
            }
            out[0] = 0xF2;
            out[1] = (event.data1 & 0x7F) as u8;
            out[2] = ((event.data1 >> 7) & 0x7F) as u8;
        }
        EventKind::SysCmSongSel => {
            out[0] = 0xF3;
            out[1] = checked_7bit(kind, event.data1)?;
        }
        EventKind::SysCmTuneReq => out[0] = 0xF6,
        EventKind::SysRtClock => out[0] = 0xF8,
        EventKind::SysRtStart => out[0] = 0xFA,
        EventKind::SysRtContinue => out[0] = 0xFB,
        EventKind::SysRtStop => out[0] = 0xFC,
        EventKind::SysRtSensing => out[0] = 0xFE,
        EventKind::SysRtReset => out[0] = 0xFF,
        _ => return Err(EncodeError::NotEncodable { kind }),
    }
    Ok(needed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena() -> SysexArena {
        SysexArena::with_capacity(256)
    }

    fn reencode(bytes: &[u8]) -> Vec<u8> {
        let mut arena = arena();
        let event = decode(bytes, 0, 0, &mut arena).unwrap();
        let mut out = [0u8; 64];
        let n = encode(&event, &arena, &mut out).unwrap();
        out[..n].to_vec()
    }

    #[test]
    fn test_decode_channel_messages() {
        let mut arena = arena();

        let ev = decode(&[0x91, 60, 100], 12, 3, &mut arena).unwrap();
        assert_eq!(ev, MidiEvent::note_on(3, 1, 60, 100).with_frame(12));

        let ev = decode(&[0xB5, 64, 127], 0, 0, &mut arena).unwrap();
        assert_eq!(ev, MidiEvent::ctrl(0, 5, 64, 127));

        let ev = decode(&[0xC0, 7], 0, 0, &mut arena).unwrap();
        assert_eq!(ev, MidiEvent::program(0, 0, 7));

        let ev = decode(&[0xE0, 0x00, 0x40], 0, 0, &mut arena).unwrap();
        assert_eq!(ev.data2, 0);
        let ev = decode(&[0xE0, 0x00, 0x00], 0, 0, &mut arena).unwrap();
        assert_eq!(ev.data2, -8192);
        let ev = decode(&[0xE0, 0x7F, 0x7F], 0, 0, &mut arena).unwrap();
        assert_eq!(ev.data2, 8191);
    }

    #[test]
    fn test_note_on_velocity_zero_decodes_as_note_off() {
        let ev = decode(&[0x90, 60, 0], 0, 0, &mut arena()).unwrap();
        assert_eq!(ev.kind, EventKind::NoteOff);
        assert_eq!(ev.data1, 60);
    }

    #[test]
    fn test_decode_rejects_malformed_packets() {
        let mut arena = arena();
        assert_eq!(decode(&[], 0, 0, &mut arena), Err(DecodeError::Empty));
        assert_eq!(
            decode(&[60, 100], 0, 0, &mut arena),
            Err(DecodeError::MissingStatus(60))
        );
        assert!(matches!(
            decode(&[0x90, 60], 0, 0, &mut arena),
            Err(DecodeError::Length { expected: 3, actual: 2, .. })
        ));
        assert!(matches!(
            decode(&[0x90, 60, 0x80], 0, 0, &mut arena),
            Err(DecodeError::InvalidData { byte: 0x80, .. })
        ));
        assert_eq!(
            decode(&[0xF0, 0x01, 0x02], 0, 0, &mut arena),
            Err(DecodeError::UnterminatedSysex)
        );
        assert_eq!(
            decode(&[0xF4], 0, 0, &mut arena),
            Err(DecodeError::Unsupported(0xF4))
        );
    }

    #[test]
    fn test_sysex_goes_through_arena() {
        let mut arena = arena();
        let bytes = [0xF0, 0x7E, 0x7F, 0x06, 0x01, 0xF7];
        let ev = decode(&bytes, 5, 1, &mut arena).unwrap();
        assert_eq!(ev.kind, EventKind::SysEx);
        assert_eq!(arena.get(ev.sysex.unwrap()), Some(&bytes[..]));

        let mut small = SysexArena::with_capacity(2);
        assert!(matches!(
            decode(&bytes, 0, 0, &mut small),
            Err(DecodeError::ArenaFull(_))
        ));
    }

    #[test]
    fn test_bytes_survive_decode_encode() {
        let packets: &[&[u8]] = &[
            &[0x80, 60, 64],
            &[0x9F, 127, 1],
            &[0xA2, 10, 20],
            &[0xB0, 7, 100],
            &[0xC3, 42],
            &[0xD4, 99],
            &[0xE0, 0x12, 0x34],
            &[0xF0, 0x43, 0x10, 0xF7],
            &[0xF1, 0x35],
            &[0xF2, 0x10, 0x20],
            &[0xF3, 5],
            &[0xF6],
            &[0xF8],
            &[0xFA],
            &[0xFB],
            &[0xFC],
            &[0xFE],
            &[0xFF],
        ];
        for packet in packets {
            assert_eq!(&reencode(packet)[..], *packet, "packet {:02x?}", packet);
        }
    }

    #[test]
    fn test_encode_rejects_out_of_range() {
        let arena = arena();
        let mut out = [0u8; 3];

        let ev = MidiEvent::note_on(0, 0, 128, 100);
        assert!(matches!(
            encode(&ev, &arena, &mut out),
            Err(EncodeError::OutOfRange { value: 128, .. })
        ));

        let ev = MidiEvent::ctrl(0, 16, 7, 100);
        assert!(matches!(
            encode(&ev, &arena, &mut out),
            Err(EncodeError::OutOfRange { value: 16, .. })
        ));

        let ev = MidiEvent::pitch_bend(0, 0, 8192);
        assert!(encode(&ev, &arena, &mut out).is_err());

        assert_eq!(
            encode(&MidiEvent::dummy(), &arena, &mut out),
            Err(EncodeError::NotEncodable {
                kind: EventKind::Dummy
            })
        );
    }

    #[test]
    fn test_encode_rejects_wide_pitch_bend() {
        let arena = arena();
        let mut out = [0u8; 3];
        for bend in [i32::MAX, i32::MIN, -8193] {
            let ev = MidiEvent::pitch_bend(0, 0, bend);
            assert_eq!(
                encode(&ev, &arena, &mut out),
                Err(EncodeError::OutOfRange {
                    kind: EventKind::PitchBend,
                    value: bend,
                })
            );
        }
        let ev = MidiEvent::pitch_bend(0, 0, -8192);
        assert_eq!(encode(&ev, &arena, &mut out), Ok(3));
        assert_eq!(out, [0xE0, 0x00, 0x00]);
    }

    #[test]
    fn test_encode_reports_small_buffer() {
        let arena = arena();
        let mut out = [0u8; 2];
        let ev = MidiEvent::note_on(0, 0, 60, 100);
        assert_eq!(
            encode(&ev, &arena, &mut out),
            Err(EncodeError::BufferTooSmall { needed: 3 })
        );
    }
}
