//! Cycle-scoped storage for system exclusive payloads.
//!
//! `MidiEvent` stays `Copy`: a sysex event only carries a [`SysexRef`] into the
//! arena owned by the current cycle. The arena is allocated once and cleared at
//! the start of every cycle, so storing a payload never allocates.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Location of a sysex payload inside a [`SysexArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SysexRef {
    offset: u32,
    len: u32,
}

impl SysexRef {
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("sysex arena full: {requested} bytes requested, {remaining} remaining")]
pub struct ArenaFull {
    pub requested: usize,
    pub remaining: usize,
}

#[derive(Debug, Clone)]
pub struct SysexArena {
    bytes: Vec<u8>,
}

impl SysexArena {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    /// RT-safe: copies into pre-allocated storage, fails instead of growing.
    #[inline]
    pub fn store(&mut self, data: &[u8]) -> Result<SysexRef, ArenaFull> {
        let remaining = self.remaining();
        if data.len() > remaining || self.bytes.len() + data.len() > u32::MAX as usize {
            return Err(ArenaFull {
                requested: data.len(),
                remaining,
            });
        }
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(data);
        Ok(SysexRef {
            offset,
            len: data.len() as u32,
        })
    }

    /// Returns `None` for references that do not point into the live region.
    #[inline]
    pub fn get(&self, payload: SysexRef) -> Option<&[u8]> {
        let start = payload.offset as usize;
        let end = start.checked_add(payload.len as usize)?;
        self.bytes.get(start..end)
    }

    #[inline]
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.bytes.capacity() - self.bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_get() {
        let mut arena = SysexArena::with_capacity(16);
        let a = arena.store(&[0xF0, 0x7E, 0xF7]).unwrap();
        let b = arena.store(&[0xF0, 0x01, 0x02, 0xF7]).unwrap();

        assert_eq!(arena.get(a), Some(&[0xF0, 0x7E, 0xF7][..]));
        assert_eq!(arena.get(b), Some(&[0xF0, 0x01, 0x02, 0xF7][..]));
        assert_eq!(arena.len(), 7);
        assert_eq!(b.len(), 4);
    }

    #[test]
    fn test_store_never_grows() {
        let mut arena = SysexArena::with_capacity(4);
        let capacity = arena.capacity();
        arena.store(&[0u8; 4][..capacity.min(4)]).unwrap();

        let err = arena.store(&[0xF0; 8]).unwrap_err();
        assert_eq!(err.requested, 8);
        assert_eq!(arena.capacity(), capacity);
    }

    #[test]
    fn test_clear_invalidates_refs() {
        let mut arena = SysexArena::with_capacity(8);
        let r = arena.store(&[0xF0, 0xF7]).unwrap();
        arena.clear();
        assert!(arena.get(r).is_none());
        assert_eq!(arena.remaining(), arena.capacity());
    }
}
