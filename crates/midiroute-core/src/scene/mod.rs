//! Scenes, stage chains and scene switching.
//!
//! - [`SceneId`], [`SwitchTarget`]: scene addressing
//! - [`Scene`], [`SceneTable`]: the routing configurations and their lookup
//! - [`Stage`], [`Chain`], [`StageContext`]: event processing steps
//! - [`Coordinator`]: the switch state machine

mod coordinator;
mod stage;
mod stages;
mod table;

pub use coordinator::{Coordinator, SwitchError, SwitchOutcome, SwitchState};
pub use stage::{Chain, Stage, StageContext};
pub use stages::{
    Call, ChannelFilter, Discard, Emit, FnStage, KindFilter, Pass, PortFilter, Sanitize,
    SceneSwitch,
};
pub use table::{Scene, SceneEntry, SceneSummary, SceneTable};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Scene number plus subscene number. A scene without subscenes uses subscene 0.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SceneId {
    pub scene: u16,
    pub subscene: u16,
}

impl SceneId {
    #[inline]
    pub const fn new(scene: u16) -> Self {
        Self { scene, subscene: 0 }
    }

    #[inline]
    pub const fn with_subscene(mut self, subscene: u16) -> Self {
        self.subscene = subscene;
        self
    }

    /// Packs the id for publishing through an `AtomicU32`.
    #[inline]
    pub const fn to_bits(self) -> u32 {
        ((self.scene as u32) << 16) | self.subscene as u32
    }

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self {
            scene: (bits >> 16) as u16,
            subscene: bits as u16,
        }
    }

    /// Formats the id with numbers shifted by `data_offset`.
    pub fn display(self, data_offset: u8) -> SceneIdDisplay {
        SceneIdDisplay {
            id: self,
            offset: data_offset as u32,
        }
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.display(0).fmt(f)
    }
}

pub struct SceneIdDisplay {
    id: SceneId,
    offset: u32,
}

impl fmt::Display for SceneIdDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scene = self.id.scene as u32 + self.offset;
        if self.id.subscene == 0 {
            write!(f, "{}", scene)
        } else {
            write!(f, "{}.{}", scene, self.id.subscene as u32 + self.offset)
        }
    }
}

/// Where a switch request should go.
///
/// Relative targets are resolved against the pending target when a switch is
/// already in progress, otherwise against the active scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchTarget {
    Exact(SceneId),
    /// First subscene of the given scene number.
    Scene(u16),
    /// Given subscene of the current scene number.
    Subscene(u16),
    NextScene,
    PrevScene,
    NextSubscene,
    PrevSubscene,
}

impl From<SceneId> for SwitchTarget {
    fn from(id: SceneId) -> Self {
        SwitchTarget::Exact(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_roundtrip_edges() {
        for id in [
            SceneId::default(),
            SceneId::new(u16::MAX).with_subscene(u16::MAX),
            SceneId::new(7).with_subscene(3),
        ] {
            assert_eq!(SceneId::from_bits(id.to_bits()), id);
        }
    }

    #[test]
    fn test_ordering_is_scene_then_subscene() {
        assert!(SceneId::new(1).with_subscene(9) < SceneId::new(2));
        assert!(SceneId::new(2) < SceneId::new(2).with_subscene(1));
    }

    #[test]
    fn test_display_offset() {
        assert_eq!(SceneId::new(3).to_string(), "3");
        assert_eq!(SceneId::new(3).display(1).to_string(), "4");
        assert_eq!(SceneId::new(3).with_subscene(1).display(1).to_string(), "4.2");
        assert_eq!(SceneId::new(0).with_subscene(2).to_string(), "0.2");
    }
}
