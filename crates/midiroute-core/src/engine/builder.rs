use std::sync::Arc;

use midiroute_event::SysexArena;

use super::{Engine, Router};
use crate::bridge::{AsyncBridge, CallbackRegistry, HeartbeatHook};
use crate::buffer::EventBuffer;
use crate::config::{BridgeConfig, EngineConfig, MAX_JACK_EVENTS, MAX_JACK_EVENT_SIZE};
use crate::control::ControlShared;
use crate::diagnostics::Diagnostics;
use crate::scene::{Chain, Coordinator, Scene, SceneId, SceneTable, Stage};
use crate::tracker::StateTracker;
use crate::{Error, Result};

/// Builder for [`Engine`].
///
/// ```ignore
/// let engine = Engine::builder()
///     .ports(2, 2)
///     .scene(Scene::new(SceneId::new(1), "Piano").stage(PortFilter::keep([0])))
///     .scene(Scene::new(SceneId::new(2), "Organ").stage(Pass))
///     .control(SceneSwitch::scenes())
///     .build()?;
/// ```
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    initial: Option<SceneId>,
    scenes: SceneTable,
    pre: Chain,
    post: Chain,
    control: Chain,
    callbacks: Option<Arc<CallbackRegistry>>,
    heartbeat: Option<HeartbeatHook>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration. The initial scene is taken from it.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.initial = Some(config.initial_scene);
        self.config = config;
        self
    }

    pub fn ports(mut self, in_ports: u16, out_ports: u16) -> Self {
        self.config.in_ports = in_ports;
        self.config.out_ports = out_ports;
        self
    }

    /// Scene active after startup (default: the lowest scene id).
    pub fn initial_scene(mut self, scene: SceneId) -> Self {
        self.initial = Some(scene);
        self
    }

    pub fn data_offset(mut self, data_offset: u8) -> Self {
        self.config.data_offset = data_offset;
        self
    }

    pub fn sanitize(mut self, enabled: bool) -> Self {
        self.config.sanitize = enabled;
        self
    }

    pub fn bridge(mut self, bridge: BridgeConfig) -> Self {
        self.config.bridge = bridge;
        self
    }

    /// Adds a scene. A later scene with the same id replaces the earlier one.
    pub fn scene(mut self, scene: Scene) -> Self {
        if let Some(old) = self.scenes.insert(scene) {
            tracing::warn!("Scene {} defined twice, keeping the later one", old.id());
        }
        self
    }

    /// Appends a stage run on every event before the active scene.
    pub fn pre(mut self, stage: impl Stage + 'static) -> Self {
        self.pre.push(stage);
        self
    }

    /// Appends a stage run on every event after the active scene.
    pub fn post(mut self, stage: impl Stage + 'static) -> Self {
        self.post.push(stage);
        self
    }

    /// Appends a control stage. Control stages see a copy of every input
    /// event; their output is discarded.
    pub fn control(mut self, stage: impl Stage + 'static) -> Self {
        self.control.push(stage);
        self
    }

    /// Callbacks that [`Call`](crate::scene::Call) stages refer to.
    pub fn callbacks(mut self, callbacks: Arc<CallbackRegistry>) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    /// Runs `hook` on the async worker every callback interval.
    pub fn heartbeat(mut self, hook: impl FnMut(u64) + Send + 'static) -> Self {
        self.heartbeat = Some(Box::new(hook));
        self
    }

    /// Validates the configuration, starts the async worker and returns the
    /// engine, ready for its first cycle.
    pub fn build(self) -> Result<Engine> {
        let Self {
            mut config,
            initial,
            scenes,
            pre,
            post,
            control,
            callbacks,
            heartbeat,
        } = self;

        let Some(first) = scenes.first() else {
            return Err(Error::InvalidConfig("at least one scene is required".into()));
        };
        let initial = initial.unwrap_or(first);
        if !scenes.contains(initial) {
            return Err(Error::UnknownScene(initial));
        }
        config.initial_scene = initial;
        config.validate()?;

        let mut bridge = AsyncBridge::new(config.bridge, callbacks.unwrap_or_default())?;
        bridge.set_data_offset(config.data_offset);
        if let Some(hook) = heartbeat {
            bridge.set_heartbeat(hook);
        }
        bridge.start()?;
        let submitter = bridge.submitter();

        let diagnostics = Arc::new(Diagnostics::new());
        let coordinator = Coordinator::new(initial);
        let control_shared = Arc::new(ControlShared::new(
            coordinator.published(),
            scenes.summary(),
            Arc::clone(&diagnostics),
        ));

        tracing::info!(
            "Engine ready: {} scenes, {} in / {} out ports, initial scene {}",
            scenes.len(),
            config.in_ports,
            config.out_ports,
            initial.display(config.data_offset)
        );

        Ok(Engine {
            router: Router {
                scenes,
                pre,
                post,
                control,
                coordinator,
                work: EventBuffer::new(),
                control_work: EventBuffer::new(),
                activated: false,
            },
            tracker: StateTracker::new(),
            input: EventBuffer::new(),
            output: EventBuffer::new(),
            arena: SysexArena::with_capacity(MAX_JACK_EVENTS * MAX_JACK_EVENT_SIZE),
            encode_buf: vec![0; MAX_JACK_EVENT_SIZE],
            bridge,
            submitter,
            control: control_shared,
            diagnostics,
            tap: None,
            cycle: 0,
            config,
        })
    }
}
