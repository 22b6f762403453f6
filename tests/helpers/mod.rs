//! Test helpers and fixtures for midiroute integration tests.

use midiroute::prelude::*;
use midiroute::RawPacket;

pub const PIANO: SceneId = SceneId::new(1);
pub const SPLIT: SceneId = SceneId::new(2);

/// Keys below this note go to port 1 in the split scene.
pub const SPLIT_POINT: i32 = 60;

/// Routes test logs to the test writer. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("midiroute_core=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Two scenes on one input and two outputs: everything to port 0, or a
/// keyboard split across ports 0 and 1. Program changes select the scene.
pub fn keyboard_engine() -> Engine {
    init_tracing();
    Engine::builder()
        .ports(1, 2)
        .scene(Scene::new(PIANO, "Piano"))
        .scene(
            Scene::new(SPLIT, "Split")
                .stage(FnStage::new("split", |events, _| {
                    for ev in events.iter_mut() {
                        if ev.note().is_some_and(|n| n < SPLIT_POINT) {
                            ev.port = 1;
                        }
                    }
                }))
                .init(Emit::new([MidiEvent::program(1, 0, 12)])),
        )
        .pre(SceneSwitch::scenes())
        .build()
        .expect("Failed to create test engine")
}

pub fn note_on(frame: u32, note: u8) -> RawPacket {
    RawPacket::new(frame, 0, &[0x90, note, 100])
}

pub fn note_off(frame: u32, note: u8) -> RawPacket {
    RawPacket::new(frame, 0, &[0x80, note, 0])
}

pub fn program(frame: u32, program: u8) -> RawPacket {
    RawPacket::new(frame, 0, &[0xC0, program])
}
