//! The cycle driver.
//!
//! One [`Engine::run_cycle`] call turns one backend input batch into one output
//! batch:
//!
//! ```text
//! control queue ─┐
//! input batch ───┴─> decode ─> [control] ─> pre ─> scene ─> post ─> sanitize ─> output batch
//!                                  │                                   │
//!                             (discarded)                    tracker observes
//! ```
//!
//! Scene switches requested by stages or the control queue complete between
//! input events, so compensation events precede everything the new scene emits.
//! Nothing on this path allocates, blocks or logs; conditions are counted and
//! reported through the async bridge.

mod builder;
pub(crate) mod sanitize;
mod sink;

pub use builder::EngineBuilder;
pub use sanitize::sanitize_event;
pub use sink::EmitSink;

use std::sync::Arc;

use midiroute_event::{decode, encode, EventKind, MidiEvent, SysexArena};
use ringbuf::traits::{Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use smallvec::SmallVec;

use crate::backend::{Backend, BackendBatch};
use crate::bridge::{AsyncBridge, AsyncCall, AsyncSubmitter, ShutdownReport, SubmitError};
use crate::buffer::EventBuffer;
use crate::config::EngineConfig;
use crate::control::{ControlCommand, ControlHandle, ControlShared};
use crate::diagnostics::{bump, Diagnostic, Diagnostics, DiagnosticsSnapshot};
use crate::scene::{
    Chain, Coordinator, SceneId, SceneSummary, SceneTable, StageContext, SwitchOutcome,
    SwitchTarget,
};
use crate::tracker::{Spill, StateTracker};
use crate::Result;

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    pub events_in: u32,
    pub events_out: u32,
    /// Events lost to full buffers.
    pub overflowed: u32,
    pub decode_errors: u32,
    pub encode_errors: u32,
    pub batch_violations: u32,
    pub unknown_scenes: u32,
    pub switches: SmallVec<[SwitchOutcome; 2]>,
}

fn report(submitter: &AsyncSubmitter, diagnostics: &Diagnostics, diag: Diagnostic) {
    if let Err(SubmitError::QueueFull(_)) = submitter.submit(AsyncCall::Diagnostic(diag)) {
        bump(&diagnostics.queue_full, 1);
    }
}

/// Scene state owned by the cycle thread.
struct Router {
    scenes: SceneTable,
    pre: Chain,
    post: Chain,
    control: Chain,
    coordinator: Coordinator,
    work: EventBuffer,
    control_work: EventBuffer,
    activated: bool,
}

impl Router {
    fn request(
        &mut self,
        target: SwitchTarget,
        cycle: &mut CycleReport,
        submitter: &AsyncSubmitter,
        diagnostics: &Diagnostics,
    ) {
        if self.coordinator.request(target, &self.scenes).is_err() {
            cycle.unknown_scenes += 1;
            bump(&diagnostics.unknown_scenes, 1);
            report(submitter, diagnostics, Diagnostic::UnknownScene { target });
        }
    }

    fn complete_switch(
        &mut self,
        sink: &mut EmitSink<'_>,
        ctx: &mut StageContext<'_>,
        frame: u32,
        cycle: &mut CycleReport,
        submitter: &AsyncSubmitter,
        diagnostics: &Diagnostics,
    ) {
        let Some(outcome) = self.coordinator.complete(&mut self.scenes, sink, ctx, frame) else {
            return;
        };
        bump(&diagnostics.scene_switches, 1);
        report(
            submitter,
            diagnostics,
            Diagnostic::SceneSwitched {
                from: outcome.from,
                to: outcome.to,
                notes: outcome.released.notes,
                pedals: outcome.released.pedals,
            },
        );
        cycle.switches.push(outcome);
    }

    /// Runs one input event through every chain and emits the survivors.
    fn route(&mut self, ev: MidiEvent, sink: &mut EmitSink<'_>, ctx: &mut StageContext<'_>) {
        let active = self.coordinator.active();
        ctx.set_scene(active);

        if !self.control.is_empty() {
            self.control_work.begin_cycle();
            let _ = self.control_work.push(ev);
            self.control.process(&mut self.control_work, ctx);
        }

        self.work.begin_cycle();
        let _ = self.work.push(ev);
        self.pre.process(&mut self.work, ctx);
        if let Some(scene) = self.scenes.get_mut(active) {
            scene.chain_mut().process(&mut self.work, ctx);
        }
        self.post.process(&mut self.work, ctx);

        for out in self.work.iter() {
            sink.emit(*out, active);
        }
    }
}

enum CycleInput<'a> {
    Batch(&'a BackendBatch),
    Events(&'a [MidiEvent]),
}

pub struct Engine {
    config: EngineConfig,
    router: Router,
    tracker: StateTracker,
    input: EventBuffer,
    output: EventBuffer,
    arena: SysexArena,
    encode_buf: Vec<u8>,
    bridge: AsyncBridge,
    submitter: AsyncSubmitter,
    control: Arc<ControlShared>,
    diagnostics: Arc<Diagnostics>,
    tap: Option<HeapProd<MidiEvent>>,
    cycle: u64,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Active scene; readable from any thread through [`ControlHandle`] too.
    pub fn current_scene(&self) -> SceneId {
        self.router.coordinator.active()
    }

    pub fn scenes(&self) -> Arc<SceneSummary> {
        self.control.scenes.load_full()
    }

    pub fn control_handle(&self) -> ControlHandle {
        ControlHandle::new(Arc::clone(&self.control))
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    pub fn tracker(&self) -> &StateTracker {
        &self.tracker
    }

    pub fn bridge(&self) -> &AsyncBridge {
        &self.bridge
    }

    pub fn submitter(&self) -> AsyncSubmitter {
        self.submitter.clone()
    }

    /// Mirrors every emitted event into an SPSC ring of `capacity` events for
    /// a monitor thread. Events that do not fit are skipped. Replaces any
    /// earlier tap.
    pub fn output_tap(&mut self, capacity: usize) -> HeapCons<MidiEvent> {
        let (producer, consumer) = HeapRb::<MidiEvent>::new(capacity).split();
        self.tap = Some(producer);
        consumer
    }

    /// Processes one backend cycle. RT-safe.
    pub fn run_cycle(&mut self, input: &BackendBatch, output: &mut BackendBatch) -> CycleReport {
        self.cycle_inner(CycleInput::Batch(input), Some(output))
    }

    /// Processes `events` as one cycle and returns the emitted events.
    ///
    /// Sysex events are dropped since their payloads live in a backend cycle's
    /// arena. Not RT-safe (allocates the result).
    pub fn process_events(&mut self, events: &[MidiEvent]) -> Vec<MidiEvent> {
        self.cycle_inner(CycleInput::Events(events), None);
        self.output.to_vec()
    }

    pub fn process_event(&mut self, event: MidiEvent) -> Vec<MidiEvent> {
        self.process_events(&[event])
    }

    /// Drives cycles until the backend runs out of input. Returns the number of
    /// cycles processed.
    pub fn run(&mut self, backend: &mut dyn Backend) -> Result<u64> {
        if backend.out_ports() < self.config.out_ports {
            tracing::warn!(
                "Backend has {} output ports, engine is configured for {}",
                backend.out_ports(),
                self.config.out_ports
            );
        }
        let mut input = BackendBatch::new();
        let mut output = BackendBatch::new();
        let mut cycles = 0;
        loop {
            input.clear();
            if !backend.next_cycle(&mut input)? {
                break;
            }
            output.clear();
            self.run_cycle(&input, &mut output);
            backend.send(&output)?;
            cycles += 1;
        }
        tracing::debug!("Backend finished after {} cycles", cycles);
        Ok(cycles)
    }

    /// Non-RT housekeeping between cycles: restores tracker headroom.
    pub fn maintain(&mut self) {
        self.tracker.reserve_headroom();
    }

    /// Shuts down the async bridge. See [`AsyncBridge::shutdown`].
    pub fn shutdown(&mut self) -> Result<ShutdownReport> {
        self.bridge.shutdown()
    }

    fn cycle_inner(
        &mut self,
        source: CycleInput<'_>,
        mut batch_out: Option<&mut BackendBatch>,
    ) -> CycleReport {
        let mut cycle = CycleReport {
            cycle: self.cycle,
            ..Default::default()
        };
        self.cycle += 1;

        self.input.begin_cycle();
        self.output.begin_cycle();
        self.arena.clear();

        let diagnostics = &*self.diagnostics;
        let submitter = &self.submitter;
        let router = &mut self.router;
        let mut dropped_in = 0u32;

        // Control commands first: injected events arrive before backend input.
        while let Some(command) = self.control.commands.pop() {
            match command {
                ControlCommand::Switch(target) => {
                    router.request(target, &mut cycle, submitter, diagnostics)
                }
                ControlCommand::Inject(ev) => {
                    if self.input.push(ev).is_err() {
                        dropped_in += 1;
                    }
                }
            }
        }

        match source {
            CycleInput::Batch(batch) => {
                cycle.batch_violations += batch.violations();
                for packet in batch.iter() {
                    match decode(packet.bytes, packet.frame, packet.port, &mut self.arena) {
                        Ok(ev) => {
                            if self.input.push(ev).is_err() {
                                dropped_in += 1;
                            }
                        }
                        Err(error) => {
                            cycle.decode_errors += 1;
                            report(
                                submitter,
                                diagnostics,
                                Diagnostic::DecodeFailed {
                                    cycle: cycle.cycle,
                                    port: packet.port,
                                    error,
                                },
                            );
                        }
                    }
                }
            }
            CycleInput::Events(events) => {
                for ev in events.iter().filter(|ev| ev.kind != EventKind::SysEx) {
                    if self.input.push(*ev).is_err() {
                        dropped_in += 1;
                    }
                }
            }
        }
        cycle.events_in = self.input.len() as u32;

        let mut ctx = StageContext::new(router.coordinator.active())
            .with_ports(self.config.in_ports, self.config.out_ports)
            .with_data_offset(self.config.data_offset)
            .with_sysex(&self.arena)
            .with_submitter(submitter)
            .with_diagnostics(diagnostics);
        let mut sink =
            EmitSink::new(&mut self.output, &mut self.tracker).with_diagnostics(diagnostics);
        if self.config.sanitize {
            sink = sink.sanitizing(self.config.out_ports);
        }

        let first_frame = self.input.iter().next().map_or(0, |ev| ev.frame);
        if !router.activated {
            router.activated = true;
            router
                .coordinator
                .activate_initial(&mut router.scenes, &mut sink, &mut ctx, first_frame);
        }
        router.complete_switch(
            &mut sink,
            &mut ctx,
            first_frame,
            &mut cycle,
            submitter,
            diagnostics,
        );

        for ev in self.input.iter() {
            router.route(*ev, &mut sink, &mut ctx);
            if let Some(target) = ctx.take_switch() {
                router.request(target, &mut cycle, submitter, diagnostics);
            }
            router.complete_switch(
                &mut sink,
                &mut ctx,
                ev.frame,
                &mut cycle,
                submitter,
                diagnostics,
            );
        }

        let spill = sink.spill();
        cycle.overflowed = dropped_in + sink.overflowed();
        drop(sink);

        // Encode and mirror.
        let mut events_out = 0;
        for ev in self.output.iter() {
            if let Some(tap) = self.tap.as_mut() {
                let _ = tap.try_push(*ev);
            }
            let Some(batch) = batch_out.as_deref_mut() else {
                events_out += 1;
                continue;
            };
            match encode(ev, &self.arena, &mut self.encode_buf) {
                Ok(len) => match batch.push(ev.frame, ev.port, &self.encode_buf[..len]) {
                    Ok(()) => events_out += 1,
                    Err(violation) => {
                        cycle.batch_violations += 1;
                        report(
                            submitter,
                            diagnostics,
                            Diagnostic::BatchViolation {
                                cycle: cycle.cycle,
                                violation,
                            },
                        );
                    }
                },
                Err(error) => {
                    cycle.encode_errors += 1;
                    report(
                        submitter,
                        diagnostics,
                        Diagnostic::EncodeFailed {
                            cycle: cycle.cycle,
                            kind: ev.kind,
                            error,
                        },
                    );
                }
            }
        }
        cycle.events_out = events_out;

        bump(&diagnostics.cycles, 1);
        bump(&diagnostics.events_in, cycle.events_in as u64);
        bump(&diagnostics.events_out, cycle.events_out as u64);
        bump(&diagnostics.decode_errors, cycle.decode_errors as u64);
        bump(&diagnostics.encode_errors, cycle.encode_errors as u64);
        bump(&diagnostics.batch_violations, cycle.batch_violations as u64);
        // Output-side overflows were counted by the sink.
        bump(&diagnostics.buffer_overflows, dropped_in as u64);

        if cycle.overflowed > 0 {
            report(
                submitter,
                diagnostics,
                Diagnostic::BufferOverflow {
                    cycle: cycle.cycle,
                    dropped: cycle.overflowed,
                },
            );
        }
        if spill.exceeded() {
            report(
                submitter,
                diagnostics,
                Diagnostic::SoftLimitExceeded {
                    notes: self.tracker.note_count(),
                    pedals: self.tracker.pedal_count(),
                    allocated: spill == Spill::Allocated,
                },
            );
        }

        cycle
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("scene", &self.current_scene())
            .field("scenes", &self.router.scenes.len())
            .field("cycle", &self.cycle)
            .finish()
    }
}
