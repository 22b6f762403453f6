//! Real-time MIDI routing core.
//!
//! Routes MIDI events from input ports to output ports through per-scene
//! processing chains, switches scenes without hanging notes, and offloads
//! anything non-real-time to a worker thread.
//!
//! # Overview
//!
//! - **Event buffer**: fixed-capacity, cycle-scoped event storage
//! - **Scenes**: per-scene stage chains plus global pre/post/control chains
//! - **Scene switching**: note-offs and pedal releases for whatever the old
//!   scene left sounding, emitted before the new scene's first event
//! - **Async bridge**: bounded lock-free queue drained by a worker thread
//! - **Control handle**: switch scenes and inject events from any thread
//!
//! # Example
//!
//! ```ignore
//! use midiroute_core::{DummyBackend, Engine, Pass, PortFilter, Scene, SceneId, SceneSwitch};
//!
//! let mut engine = Engine::builder()
//!     .ports(1, 2)
//!     .scene(Scene::new(SceneId::new(1), "Piano").stage(Pass))
//!     .scene(Scene::new(SceneId::new(2), "Split").stage(PortFilter::keep([1])))
//!     .control(SceneSwitch::scenes())
//!     .build()?;
//!
//! let mut backend = DummyBackend::new(1, 2);
//! backend.queue_bytes(0, &[0x90, 60, 100]);
//! engine.run(&mut backend)?;
//! engine.shutdown()?;
//! ```

pub mod error;
pub use error::{Error, Overflow, Result};

pub mod config;
pub use config::{BridgeConfig, EngineConfig};

pub mod buffer;
pub use buffer::EventBuffer;

pub mod diagnostics;
pub use diagnostics::{Diagnostic, Diagnostics, DiagnosticsSnapshot};

pub mod tracker;
pub use tracker::{FlushReport, Spill, StateTracker};

pub mod scene;
pub use scene::{
    Call, Chain, ChannelFilter, Coordinator, Discard, Emit, FnStage, KindFilter, Pass,
    PortFilter, Sanitize, Scene, SceneId, SceneSummary, SceneSwitch, SceneTable, Stage,
    StageContext, SwitchOutcome, SwitchState, SwitchTarget,
};

pub mod bridge;
pub use bridge::{
    AsyncBridge, AsyncCall, AsyncSubmitter, CallbackId, CallbackRegistry, ShutdownReport,
    SubmitError,
};

pub mod control;
pub use control::{ControlCommand, ControlError, ControlHandle};

pub mod backend;
pub use backend::{Backend, BackendBatch, BoundaryViolation, DummyBackend, Packet, RawPacket};

pub mod engine;
pub use engine::{sanitize_event, CycleReport, EmitSink, Engine, EngineBuilder};

// Event types, so users need a single import
pub use midiroute_event::{EventKind, EventKindSet, MidiEvent, SysexArena, SysexRef};
