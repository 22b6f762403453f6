//! MIDI event types for the midiroute engine.
//!
//! Pure value types shared by every part of the router:
//!
//! - [`MidiEvent`]: `Copy` event with cycle-relative frame offset
//! - [`SysexArena`]: pre-allocated, cycle-scoped sysex payload storage
//! - [`codec`]: raw byte decode/encode for backend packets
//! - `midi-msg` conversions for interop

pub mod codec;
pub use codec::{decode, encode, encoded_len, DecodeError, EncodeError};

pub(crate) mod event;
pub use event::{EventDisplay, EventKind, EventKindSet, MidiEvent};

pub(crate) mod sysex;
pub use sysex::{ArenaFull, SysexArena, SysexRef};

pub(crate) mod convert;

pub(crate) mod utils;
pub use utils::{note_name, parse_note_name};

// Re-export essential upstream types (users shouldn't need to import midi-msg directly)
pub use midi_msg::{Channel, ChannelVoiceMsg, ControlChange, MidiMsg};
