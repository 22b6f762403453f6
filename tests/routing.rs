//! End-to-end routing through the umbrella crate with the dummy backend.

mod helpers;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use helpers::*;
use midiroute::prelude::*;
use midiroute::{Call, CallbackRegistry, RawPacket};

#[test]
fn split_scene_routes_by_key_and_releases_on_switch() {
    let mut engine = keyboard_engine();
    let mut backend = DummyBackend::new(1, 2);

    backend.queue_cycle([note_on(0, 48), note_on(4, 72)]);
    backend.queue_cycle([program(0, 2), note_on(8, 40), note_on(9, 64)]);
    backend.queue_cycle([program(2, 1)]);

    assert_eq!(engine.run(&mut backend).unwrap(), 3);
    let sent = backend.sent();

    assert_eq!(sent[0], vec![note_on(0, 48), note_on(4, 72)]);

    // Release of the piano notes, init program on port 1, then split output.
    assert_eq!(
        sent[1],
        vec![
            note_off(0, 48),
            note_off(0, 72),
            RawPacket::new(0, 1, &[0xC0, 12]),
            RawPacket::new(8, 1, &[0x90, 40, 100]),
            note_on(9, 64),
        ]
    );

    // Leaving the split releases each note on the port it was sent to.
    assert_eq!(
        sent[2],
        vec![RawPacket::new(2, 1, &[0x80, 40, 0]), note_off(2, 64)]
    );
    assert_eq!(engine.current_scene(), PIANO);
    assert_eq!(engine.tracker().note_count(), 0);

    let snap = engine.diagnostics();
    assert_eq!(snap.scene_switches, 2);
    assert_eq!(snap.notes_released, 4);
    assert_eq!(snap.lost_events(), 0);
    engine.shutdown().unwrap();
}

#[test]
fn engine_runs_on_its_own_thread() {
    let mut engine = keyboard_engine();
    let control = engine.control_handle();
    assert_eq!(control.scenes().len(), 2);

    let cycle_thread = thread::Builder::new()
        .name("test-cycle".into())
        .spawn(move || {
            let mut input = BackendBatch::new();
            let mut output = BackendBatch::new();
            input.push(0, 0, &[0x90, 50, 100]).unwrap();
            let deadline = Instant::now() + Duration::from_secs(5);
            while engine.current_scene() != SPLIT && Instant::now() < deadline {
                output.clear();
                engine.run_cycle(&input, &mut output);
                thread::sleep(Duration::from_millis(1));
            }
            engine.maintain();
            engine.shutdown().map(|_| engine.current_scene())
        })
        .unwrap();

    control.switch_scene(SPLIT).unwrap();
    let scene = cycle_thread.join().unwrap().unwrap();
    assert_eq!(scene, SPLIT);
    assert_eq!(control.current_scene(), SPLIT);
    assert!(control.diagnostics().cycles > 0);
}

#[test]
fn callbacks_run_off_the_cycle_thread() {
    init_tracing();
    let registry = Arc::new(CallbackRegistry::new());
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let record = Arc::clone(&seen);
    let id = registry.register(move |ev| {
        record
            .lock()
            .push((thread::current().name().map(String::from), ev.data1));
    });

    let mut engine = Engine::builder()
        .scene(Scene::new(PIANO, "Logger").stage(Call::new(id)))
        .callbacks(registry)
        .build()
        .unwrap();
    let out = engine.process_event(MidiEvent::note_on(0, 0, 61, 100));
    assert_eq!(out.len(), 1);
    assert!(engine.bridge().wait_idle(Duration::from_secs(5)));

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], (Some("midiroute-async".to_string()), 61));
    drop(seen);
    engine.shutdown().unwrap();
}

#[test]
fn errors_convert_into_umbrella_error() {
    fn build() -> midiroute::Result<Engine> {
        Ok(Engine::builder().build()?)
    }
    assert!(matches!(build(), Err(midiroute::Error::Core(_))));
}
