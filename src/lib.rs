//! # midiroute - Real-time MIDI Router
//!
//! Routes MIDI from input ports to output ports through per-scene stage chains
//! and switches scenes on the fly without leaving notes hanging.
//!
//! ## Architecture
//!
//! midiroute is an umbrella crate that coordinates:
//! - **midiroute-event** - MIDI event values, raw byte codec, sysex arena
//! - **midiroute-core** - Cycle driver, scenes, note/pedal tracking, async bridge
//!
//! ## Quick Start
//!
//! ```ignore
//! use midiroute::prelude::*;
//!
//! let mut engine = Engine::builder()
//!     .ports(1, 1)
//!     .scene(Scene::new(SceneId::new(1), "Piano"))
//!     .scene(Scene::new(SceneId::new(2), "Pads").stage(ChannelFilter::keep([0, 1])))
//!     .pre(SceneSwitch::scenes())
//!     .build()?;
//!
//! // From the real-time thread, once per backend cycle:
//! let report = engine.run_cycle(&input, &mut output);
//!
//! // From any other thread:
//! let control = engine.control_handle();
//! control.switch_scene(SceneId::new(2))?;
//! ```

/// Re-export of midiroute-core for direct access
pub use midiroute_core as core;

/// Re-export of midiroute-event for direct access
pub use midiroute_event as event;

mod error;
pub use error::{Error, Result};

// Engine
pub use midiroute_core::{
    CycleReport, EmitSink, Engine, EngineBuilder, EngineConfig,

    // Scenes and stages
    Call, Chain, ChannelFilter, Discard, Emit, FnStage, KindFilter, Pass, PortFilter, Sanitize,
    Scene, SceneId, SceneSummary, SceneSwitch, SceneTable, Stage, StageContext, SwitchTarget,

    // Async bridge
    AsyncCall, AsyncSubmitter, BridgeConfig, CallbackId, CallbackRegistry, ShutdownReport,
    SubmitError,

    // Control
    ControlError, ControlHandle,

    // Backend boundary
    Backend, BackendBatch, BoundaryViolation, DummyBackend, RawPacket,

    // Diagnostics
    Diagnostic, DiagnosticsSnapshot,

    // Buffers and tracking
    EventBuffer, FlushReport, StateTracker,
};

// Event types
pub use midiroute_event::{
    decode, encode, note_name, parse_note_name, DecodeError, EncodeError, EventKind, EventKindSet,
    MidiEvent, SysexArena, SysexRef,
};

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::{
        Backend, BackendBatch, ChannelFilter, ControlHandle, DummyBackend, Emit, Engine,
        EventKind, EventKindSet, FnStage, KindFilter, MidiEvent, Pass, PortFilter, Scene,
        SceneId, SceneSwitch, Stage, StageContext, SwitchTarget,
    };
    pub use crate::{Error, Result};
}
