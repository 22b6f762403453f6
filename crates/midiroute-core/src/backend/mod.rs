//! Backend boundary.
//!
//! A backend (JACK, ALSA, a test double) moves raw MIDI packets in and out of
//! the engine once per cycle through a [`BackendBatch`]: at most
//! [`MAX_JACK_EVENTS`] packets of at most [`MAX_JACK_EVENT_SIZE`] bytes each,
//! stored in one contiguous pre-allocated byte store.

mod dummy;

pub use dummy::{DummyBackend, RawPacket};

use thiserror::Error;

use crate::config::{MAX_JACK_EVENTS, MAX_JACK_EVENT_SIZE};
use crate::Result;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryViolation {
    #[error("too many packets in one cycle (max {max})")]
    TooManyEvents { max: usize },

    #[error("packet of {size} bytes exceeds {max} bytes")]
    EventTooLarge { size: usize, max: usize },

    #[error("empty packet")]
    EmptyEvent,
}

#[derive(Debug, Clone, Copy)]
struct PacketHeader {
    frame: u32,
    port: u16,
    offset: u32,
    len: u32,
}

/// One raw packet borrowed from a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet<'a> {
    pub frame: u32,
    pub port: u16,
    pub bytes: &'a [u8],
}

/// Capped, pre-allocated sequence of raw packets for one cycle.
pub struct BackendBatch {
    headers: Vec<PacketHeader>,
    bytes: Vec<u8>,
    max_events: usize,
    max_event_size: usize,
    violations: u32,
}

impl BackendBatch {
    pub fn new() -> Self {
        Self::with_limits(MAX_JACK_EVENTS, MAX_JACK_EVENT_SIZE)
    }

    pub fn with_limits(max_events: usize, max_event_size: usize) -> Self {
        Self {
            headers: Vec::with_capacity(max_events),
            bytes: Vec::with_capacity(max_events * max_event_size),
            max_events,
            max_event_size,
            violations: 0,
        }
    }

    /// Appends a packet. RT-safe: the byte store never grows past its
    /// initial capacity because every packet is size-checked first.
    pub fn push(
        &mut self,
        frame: u32,
        port: u16,
        data: &[u8],
    ) -> std::result::Result<(), BoundaryViolation> {
        let violation = if data.is_empty() {
            Some(BoundaryViolation::EmptyEvent)
        } else if data.len() > self.max_event_size {
            Some(BoundaryViolation::EventTooLarge {
                size: data.len(),
                max: self.max_event_size,
            })
        } else if self.headers.len() == self.max_events {
            Some(BoundaryViolation::TooManyEvents {
                max: self.max_events,
            })
        } else {
            None
        };
        if let Some(violation) = violation {
            self.violations += 1;
            return Err(violation);
        }

        self.headers.push(PacketHeader {
            frame,
            port,
            offset: self.bytes.len() as u32,
            len: data.len() as u32,
        });
        self.bytes.extend_from_slice(data);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = Packet<'_>> + '_ {
        self.headers.iter().map(move |h| Packet {
            frame: h.frame,
            port: h.port,
            bytes: &self.bytes[h.offset as usize..(h.offset + h.len) as usize],
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    #[inline]
    pub fn max_events(&self) -> usize {
        self.max_events
    }

    #[inline]
    pub fn max_event_size(&self) -> usize {
        self.max_event_size
    }

    /// Packets refused since the last [`clear`](Self::clear).
    #[inline]
    pub fn violations(&self) -> u32 {
        self.violations
    }

    #[inline]
    pub fn clear(&mut self) {
        self.headers.clear();
        self.bytes.clear();
        self.violations = 0;
    }
}

impl Default for BackendBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BackendBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendBatch")
            .field("len", &self.len())
            .field("bytes", &self.bytes.len())
            .field("violations", &self.violations)
            .finish()
    }
}

/// Driver that moves raw packets between the outside world and the engine.
pub trait Backend: Send {
    fn in_ports(&self) -> u16;

    fn out_ports(&self) -> u16;

    /// Fills `input` with the next cycle's packets (the batch arrives cleared).
    /// Returns `Ok(false)` once there are no more cycles.
    fn next_cycle(&mut self, input: &mut BackendBatch) -> Result<bool>;

    /// Delivers one cycle of output.
    fn send(&mut self, output: &BackendBatch) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_iter() {
        let mut batch = BackendBatch::with_limits(4, 8);
        batch.push(0, 0, &[0x90, 60, 100]).unwrap();
        batch.push(5, 1, &[0xC0, 3]).unwrap();
        let packets: Vec<Packet> = batch.iter().collect();
        assert_eq!(
            packets,
            vec![
                Packet {
                    frame: 0,
                    port: 0,
                    bytes: &[0x90, 60, 100]
                },
                Packet {
                    frame: 5,
                    port: 1,
                    bytes: &[0xC0, 3]
                },
            ]
        );
    }

    #[test]
    fn test_limits() {
        let mut batch = BackendBatch::with_limits(2, 4);
        assert_eq!(batch.push(0, 0, &[]), Err(BoundaryViolation::EmptyEvent));
        assert_eq!(
            batch.push(0, 0, &[0xF0, 1, 2, 3, 0xF7]),
            Err(BoundaryViolation::EventTooLarge { size: 5, max: 4 })
        );
        batch.push(0, 0, &[0xF8]).unwrap();
        batch.push(0, 0, &[0xF8]).unwrap();
        assert_eq!(
            batch.push(0, 0, &[0xF8]),
            Err(BoundaryViolation::TooManyEvents { max: 2 })
        );
        assert_eq!(batch.violations(), 3);
        assert_eq!(batch.len(), 2);

        batch.clear();
        assert!(batch.is_empty());
        assert_eq!(batch.violations(), 0);
    }

    #[test]
    fn test_default_limits() {
        let batch = BackendBatch::new();
        assert_eq!(batch.max_events(), MAX_JACK_EVENTS);
        assert_eq!(batch.max_event_size(), MAX_JACK_EVENT_SIZE);
        assert!(batch.bytes.capacity() >= MAX_JACK_EVENTS * MAX_JACK_EVENT_SIZE);
    }
}
