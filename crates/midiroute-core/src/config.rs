//! Router configuration.
//!
//! The capacity and timing constants are process-wide and fixed for the
//! process lifetime. [`EngineConfig`] carries the per-engine settings chosen at
//! startup.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::scene::SceneId;
use crate::{Error, Result};

/// Total number of events that can be stored in the event buffer during one cycle.
pub const MAX_EVENTS: usize = 1024;

/// Soft limit of sounding notes remembered for scene-switch compensation.
/// Exceeding it spills into overflow storage, which may allocate (not RT-safe).
pub const MAX_SIMULTANEOUS_NOTES: usize = 64;

/// Soft limit of held sustain pedals remembered for scene-switch compensation.
pub const MAX_SUSTAIN_PEDALS: usize = 4;

/// Capacity of the async call queue.
pub const MAX_ASYNC_CALLS: usize = 256;

/// Worker join timeout on shutdown, in milliseconds.
pub const ASYNC_JOIN_TIMEOUT: u64 = 3000;

/// Worker heartbeat period, in milliseconds.
pub const ASYNC_CALLBACK_INTERVAL: u64 = 50;

/// Maximum number of raw packets per backend batch.
pub const MAX_JACK_EVENTS: usize = 128;

/// Maximum size of one raw backend packet, in bytes.
pub const MAX_JACK_EVENT_SIZE: usize = 4096;

/// Maximum number of ports per direction.
pub const MAX_PORTS: u16 = 256;

/// Async call bridge settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub capacity: usize,
    pub join_timeout_ms: u64,
    pub callback_interval_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            capacity: MAX_ASYNC_CALLS,
            join_timeout_ms: ASYNC_JOIN_TIMEOUT,
            callback_interval_ms: ASYNC_CALLBACK_INTERVAL,
        }
    }
}

impl BridgeConfig {
    #[inline]
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    #[inline]
    pub fn callback_interval(&self) -> Duration {
        Duration::from_millis(self.callback_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 || self.capacity > MAX_ASYNC_CALLS {
            return Err(Error::InvalidConfig(format!(
                "async queue capacity {} out of range (1-{})",
                self.capacity, MAX_ASYNC_CALLS
            )));
        }
        if self.join_timeout_ms == 0 {
            return Err(Error::InvalidConfig("join timeout must be non-zero".into()));
        }
        if self.callback_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "callback interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration for one routing engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub in_ports: u16,
    pub out_ports: u16,
    pub initial_scene: SceneId,
    /// 0 or 1; numbering offset for ports, channels and scenes in log output.
    pub data_offset: u8,
    /// Drop or clamp out-of-range events before they reach the backend.
    pub sanitize: bool,
    pub bridge: BridgeConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            in_ports: 1,
            out_ports: 1,
            initial_scene: SceneId::default(),
            data_offset: 1,
            sanitize: true,
            bridge: BridgeConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        for (what, count) in [("input", self.in_ports), ("output", self.out_ports)] {
            if count == 0 || count > MAX_PORTS {
                return Err(Error::InvalidConfig(format!(
                    "{} port count {} out of range (1-{})",
                    what, count, MAX_PORTS
                )));
            }
        }
        if self.data_offset > 1 {
            return Err(Error::InvalidConfig(format!(
                "data_offset must be 0 or 1, got {}",
                self.data_offset
            )));
        }
        self.bridge.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.bridge.capacity, MAX_ASYNC_CALLS);
        assert_eq!(config.bridge.join_timeout(), Duration::from_millis(3000));
        assert_eq!(config.bridge.callback_interval(), Duration::from_millis(50));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_ports() {
        let config = EngineConfig {
            out_ports: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = EngineConfig {
            in_ports: MAX_PORTS + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_data_offset() {
        let config = EngineConfig {
            data_offset: 2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bridge_capacity_bounded_by_constant() {
        let mut bridge = BridgeConfig::default();
        bridge.capacity = MAX_ASYNC_CALLS + 1;
        assert!(bridge.validate().is_err());
        bridge.capacity = 0;
        assert!(bridge.validate().is_err());
        bridge.capacity = 8;
        assert!(bridge.validate().is_ok());
    }

    #[test]
    fn test_config_persists_through_serde() {
        let config = EngineConfig {
            in_ports: 2,
            out_ports: 4,
            initial_scene: SceneId::new(3).with_subscene(1),
            data_offset: 0,
            sanitize: false,
            bridge: BridgeConfig {
                capacity: 32,
                join_timeout_ms: 100,
                callback_interval_ms: 5,
            },
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);

        let bytes = bincode::serialize(&config).unwrap();
        let back: EngineConfig = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, config);
    }
}
