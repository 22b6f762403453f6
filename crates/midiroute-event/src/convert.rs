//! Conversions to `midi-msg` types for interop with the wider MIDI ecosystem.

use midi_msg::{Channel, ChannelVoiceMsg, ControlChange, MidiMsg};

use crate::event::{EventKind, MidiEvent};

#[inline]
fn seven_bit(value: i32) -> Option<u8> {
    u8::try_from(value).ok().filter(|v| *v < 0x80)
}

impl MidiEvent {
    /// Channel voice message for this event, or `None` for system messages and
    /// out-of-range values.
    pub fn to_channel_voice(&self) -> Option<ChannelVoiceMsg> {
        let msg = match self.kind {
            EventKind::NoteOn => ChannelVoiceMsg::NoteOn {
                note: seven_bit(self.data1)?,
                velocity: seven_bit(self.data2)?,
            },
            EventKind::NoteOff => ChannelVoiceMsg::NoteOff {
                note: seven_bit(self.data1)?,
                velocity: seven_bit(self.data2)?,
            },
            EventKind::Ctrl => ChannelVoiceMsg::ControlChange {
                control: ControlChange::CC {
                    control: seven_bit(self.data1)?,
                    value: seven_bit(self.data2)?,
                },
            },
            EventKind::Program => ChannelVoiceMsg::ProgramChange {
                program: seven_bit(self.data2)?,
            },
            EventKind::Aftertouch => ChannelVoiceMsg::ChannelPressure {
                pressure: seven_bit(self.data2)?,
            },
            EventKind::PolyAftertouch => ChannelVoiceMsg::PolyPressure {
                note: seven_bit(self.data1)?,
                pressure: seven_bit(self.data2)?,
            },
            EventKind::PitchBend => {
                let bend = self
                    .data2
                    .checked_add(8192)
                    .and_then(|b| u16::try_from(b).ok())
                    .filter(|b| *b < 16384)?;
                ChannelVoiceMsg::PitchBend { bend }
            }
            _ => return None,
        };
        Some(msg)
    }

    pub fn to_midi_msg(&self) -> Option<MidiMsg> {
        if self.channel > 15 {
            return None;
        }
        Some(MidiMsg::ChannelVoice {
            channel: Channel::from_u8(self.channel),
            msg: self.to_channel_voice()?,
        })
    }
}
