//! Drop/overflow counters and deferred log records.
//!
//! The cycle thread only bumps atomics and submits [`Diagnostic`] values to the
//! async bridge; the `tracing` record is emitted by the worker thread.

use std::sync::atomic::{AtomicU64, Ordering};

use midiroute_event::{DecodeError, EncodeError, EventKind};
use serde::{Deserialize, Serialize};

use crate::backend::BoundaryViolation;
use crate::scene::{SceneId, SwitchTarget};

#[derive(Debug, Default)]
pub struct Diagnostics {
    pub(crate) cycles: AtomicU64,
    pub(crate) events_in: AtomicU64,
    pub(crate) events_out: AtomicU64,
    pub(crate) buffer_overflows: AtomicU64,
    pub(crate) batch_violations: AtomicU64,
    pub(crate) decode_errors: AtomicU64,
    pub(crate) encode_errors: AtomicU64,
    pub(crate) sanitized: AtomicU64,
    pub(crate) queue_full: AtomicU64,
    pub(crate) soft_limit_exceeded: AtomicU64,
    pub(crate) scene_switches: AtomicU64,
    pub(crate) notes_released: AtomicU64,
    pub(crate) pedals_released: AtomicU64,
    pub(crate) unknown_scenes: AtomicU64,
    pub(crate) control_dropped: AtomicU64,
}

#[inline]
pub(crate) fn bump(counter: &AtomicU64, n: u64) {
    if n > 0 {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        DiagnosticsSnapshot {
            cycles: get(&self.cycles),
            events_in: get(&self.events_in),
            events_out: get(&self.events_out),
            buffer_overflows: get(&self.buffer_overflows),
            batch_violations: get(&self.batch_violations),
            decode_errors: get(&self.decode_errors),
            encode_errors: get(&self.encode_errors),
            sanitized: get(&self.sanitized),
            queue_full: get(&self.queue_full),
            soft_limit_exceeded: get(&self.soft_limit_exceeded),
            scene_switches: get(&self.scene_switches),
            notes_released: get(&self.notes_released),
            pedals_released: get(&self.pedals_released),
            unknown_scenes: get(&self.unknown_scenes),
            control_dropped: get(&self.control_dropped),
        }
    }
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsSnapshot {
    pub cycles: u64,
    pub events_in: u64,
    pub events_out: u64,
    /// Events dropped because a cycle buffer was full.
    pub buffer_overflows: u64,
    /// Packets rejected at the backend boundary (count or size caps).
    pub batch_violations: u64,
    pub decode_errors: u64,
    pub encode_errors: u64,
    /// Events dropped by the sanitize pass.
    pub sanitized: u64,
    pub queue_full: u64,
    pub soft_limit_exceeded: u64,
    pub scene_switches: u64,
    pub notes_released: u64,
    pub pedals_released: u64,
    pub unknown_scenes: u64,
    pub control_dropped: u64,
}

impl DiagnosticsSnapshot {
    /// Events lost for any reason other than a stage dropping them.
    pub fn lost_events(&self) -> u64 {
        self.buffer_overflows + self.batch_violations + self.decode_errors + self.encode_errors
    }
}

/// A condition observed on the cycle thread, logged later by the async worker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Diagnostic {
    BufferOverflow {
        cycle: u64,
        dropped: u32,
    },
    BatchViolation {
        cycle: u64,
        violation: BoundaryViolation,
    },
    DecodeFailed {
        cycle: u64,
        port: u16,
        error: DecodeError,
    },
    EncodeFailed {
        cycle: u64,
        kind: EventKind,
        error: EncodeError,
    },
    SoftLimitExceeded {
        notes: usize,
        pedals: usize,
        allocated: bool,
    },
    SceneSwitched {
        from: SceneId,
        to: SceneId,
        notes: u32,
        pedals: u32,
    },
    UnknownScene {
        target: SwitchTarget,
    },
}

impl Diagnostic {
    pub fn log(&self, data_offset: u8) {
        match self {
            Diagnostic::BufferOverflow { cycle, dropped } => {
                tracing::warn!("Cycle {}: event buffer full, {} events dropped", cycle, dropped);
            }
            Diagnostic::BatchViolation { cycle, violation } => {
                tracing::warn!("Cycle {}: backend batch rejected packet: {}", cycle, violation);
            }
            Diagnostic::DecodeFailed { cycle, port, error } => {
                tracing::warn!(
                    "Cycle {}: dropped undecodable packet on port {}: {}",
                    cycle,
                    *port as u32 + data_offset as u32,
                    error
                );
            }
            Diagnostic::EncodeFailed { cycle, kind, error } => {
                tracing::warn!("Cycle {}: could not send {} event: {}", cycle, kind, error);
            }
            Diagnostic::SoftLimitExceeded {
                notes,
                pedals,
                allocated,
            } => {
                if *allocated {
                    tracing::warn!(
                        "Note/pedal tracker grew on the real-time thread ({} notes, {} pedals)",
                        notes,
                        pedals
                    );
                } else {
                    tracing::info!(
                        "Note/pedal tracker above soft limit ({} notes, {} pedals)",
                        notes,
                        pedals
                    );
                }
            }
            Diagnostic::SceneSwitched {
                from,
                to,
                notes,
                pedals,
            } => {
                tracing::info!(
                    "Switched scene {} -> {} (released {} notes, {} pedals)",
                    from.display(data_offset),
                    to.display(data_offset),
                    notes,
                    pedals
                );
            }
            Diagnostic::UnknownScene { target } => {
                tracing::warn!("Ignoring switch to unknown scene: {:?}", target);
            }
        }
    }
}
