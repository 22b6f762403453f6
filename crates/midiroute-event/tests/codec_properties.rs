//! Property tests for the raw MIDI codec.

use midiroute_event::{decode, encode, EventKind, MidiEvent, SysexArena};
use proptest::prelude::*;

fn channel_event() -> impl Strategy<Value = MidiEvent> {
    (0u8..16, 0i32..128, 0i32..128, 0u16..8, 0u32..4096).prop_flat_map(
        |(channel, d1, d2, port, frame)| {
            prop_oneof![
                Just(MidiEvent::note_on(port, channel, d1, d2.max(1))),
                Just(MidiEvent::note_off(port, channel, d1, d2)),
                Just(MidiEvent::ctrl(port, channel, d1, d2)),
                Just(MidiEvent::program(port, channel, d2)),
                Just(MidiEvent::aftertouch(port, channel, d2)),
                Just(MidiEvent::poly_aftertouch(port, channel, d1, d2)),
                (-8192i32..8192).prop_map(move |b| MidiEvent::pitch_bend(port, channel, b)),
            ]
            .prop_map(move |ev| ev.with_frame(frame))
        },
    )
}

proptest! {
    #[test]
    fn valid_channel_events_survive_encode_decode(event in channel_event()) {
        let mut arena = SysexArena::with_capacity(0);
        let mut out = [0u8; 3];
        let n = encode(&event, &arena, &mut out).unwrap();
        let back = decode(&out[..n], event.frame, event.port, &mut arena).unwrap();
        prop_assert_eq!(back, event);
    }

    #[test]
    fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..16)) {
        let mut arena = SysexArena::with_capacity(64);
        if let Ok(event) = decode(&bytes, 0, 0, &mut arena) {
            prop_assert_ne!(event.kind, EventKind::Dummy);
        }
    }
}
