use serde::{Deserialize, Serialize};

use crate::scene::SceneId;

/// Sustain (damper) pedal.
pub const CC_SUSTAIN: i32 = 64;
/// Sostenuto pedal.
pub const CC_SOSTENUTO: i32 = 66;
/// Hold 2 pedal.
pub const CC_HOLD_2: i32 = 69;
pub const CC_ALL_SOUND_OFF: i32 = 120;
pub const CC_ALL_NOTES_OFF: i32 = 123;

/// Controllers treated as pedals for scene-switch compensation.
pub const PEDAL_CONTROLLERS: [i32; 3] = [CC_SUSTAIN, CC_SOSTENUTO, CC_HOLD_2];

#[inline]
pub fn is_pedal(controller: i32) -> bool {
    PEDAL_CONTROLLERS.contains(&controller)
}

/// Switch-type controllers read values below 64 as off.
#[inline]
pub fn pedal_is_down(value: i32) -> bool {
    value >= 64
}

/// A note that has been emitted as on and not yet released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteRecord {
    pub port: u16,
    pub channel: u8,
    pub note: u8,
    pub origin: SceneId,
}

impl NoteRecord {
    #[inline]
    pub(crate) fn is_key(&self, port: u16, channel: u8, note: u8) -> bool {
        self.port == port && self.channel == channel && self.note == note
    }
}

/// A pedal that has been emitted as down and not yet released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PedalRecord {
    pub port: u16,
    pub channel: u8,
    pub controller: u8,
    pub origin: SceneId,
}

impl PedalRecord {
    #[inline]
    pub(crate) fn is_key(&self, port: u16, channel: u8, controller: u8) -> bool {
        self.port == port && self.channel == channel && self.controller == controller
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pedal_controllers() {
        assert!(is_pedal(64));
        assert!(is_pedal(66));
        assert!(is_pedal(69));
        assert!(!is_pedal(67));
        assert!(!is_pedal(7));
    }

    #[test]
    fn test_pedal_threshold() {
        assert!(!pedal_is_down(0));
        assert!(!pedal_is_down(63));
        assert!(pedal_is_down(64));
        assert!(pedal_is_down(127));
    }
}
