//! Fixed-capacity, cycle-scoped event buffer.
//!
//! Storage is allocated once at construction. Within a cycle the buffer only
//! writes into that storage: `push` fails with [`Overflow`] instead of growing,
//! and dropping events leaves tombstones that are compacted in place.

use midiroute_event::MidiEvent;

use crate::config::MAX_EVENTS;
use crate::error::Overflow;

pub struct EventBuffer {
    events: Vec<MidiEvent>,
    dropped: Vec<bool>,
    live: usize,
    capacity: usize,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::with_capacity(MAX_EVENTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            dropped: Vec::with_capacity(capacity),
            live: 0,
            capacity,
        }
    }

    /// Resets to empty. O(1), no allocation.
    #[inline]
    pub fn begin_cycle(&mut self) {
        self.events.clear();
        self.dropped.clear();
        self.live = 0;
    }

    #[inline]
    pub fn clear(&mut self) {
        self.begin_cycle();
    }

    /// Appends `event` in arrival order. RT-safe.
    #[inline]
    pub fn push(&mut self, event: MidiEvent) -> Result<(), Overflow> {
        if self.events.len() == self.capacity {
            if self.live == self.capacity {
                return Err(Overflow {
                    capacity: self.capacity,
                });
            }
            self.compact();
        }
        self.events.push(event);
        self.dropped.push(false);
        self.live += 1;
        Ok(())
    }

    /// Appends all live events of `other`; returns how many did not fit.
    pub fn extend_from(&mut self, other: &EventBuffer) -> usize {
        let mut overflowed = 0;
        for event in other.iter() {
            if self.push(*event).is_err() {
                overflowed += 1;
            }
        }
        overflowed
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.live == self.capacity
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Live events in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &MidiEvent> + '_ {
        self.events
            .iter()
            .zip(self.dropped.iter())
            .filter(|(_, dropped)| !**dropped)
            .map(|(event, _)| event)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut MidiEvent> + '_ {
        self.events
            .iter_mut()
            .zip(self.dropped.iter())
            .filter(|(_, dropped)| !**dropped)
            .map(|(event, _)| event)
    }

    #[inline]
    pub fn for_each(&self, f: impl FnMut(&MidiEvent)) {
        self.iter().for_each(f);
    }

    /// Live events with their slot positions, for use with [`mark_dropped`](Self::mark_dropped).
    pub fn enumerate(&self) -> impl Iterator<Item = (usize, &MidiEvent)> + '_ {
        self.events
            .iter()
            .enumerate()
            .filter(move |(pos, _)| !self.dropped[*pos])
    }

    /// Event in slot `pos`, if it is live.
    #[inline]
    pub fn get(&self, pos: usize) -> Option<&MidiEvent> {
        match self.dropped.get(pos) {
            Some(false) => self.events.get(pos),
            _ => None,
        }
    }

    /// Marks the event in slot `pos` as consumed. Returns `false` if the slot
    /// was empty or already dropped.
    #[inline]
    pub fn mark_dropped(&mut self, pos: usize) -> bool {
        match self.dropped.get_mut(pos) {
            Some(flag) if !*flag => {
                *flag = true;
                self.live -= 1;
                true
            }
            _ => false,
        }
    }

    /// Keeps only events for which `keep` returns `true`; `keep` may modify them.
    pub fn retain(&mut self, mut keep: impl FnMut(&mut MidiEvent) -> bool) {
        for (event, dropped) in self.events.iter_mut().zip(self.dropped.iter_mut()) {
            if !*dropped && !keep(event) {
                *dropped = true;
                self.live -= 1;
            }
        }
    }

    /// Removes tombstones in place, preserving order.
    pub fn compact(&mut self) {
        if self.live == self.events.len() {
            return;
        }
        let mut write = 0;
        for read in 0..self.events.len() {
            if !self.dropped[read] {
                self.events[write] = self.events[read];
                write += 1;
            }
        }
        self.events.truncate(write);
        self.dropped.truncate(write);
        self.dropped.fill(false);
    }

    /// Compacts and returns the surviving events in order.
    pub fn end_cycle(&mut self) -> &[MidiEvent] {
        self.compact();
        &self.events
    }

    /// Not RT-safe (allocates).
    pub fn to_vec(&self) -> Vec<MidiEvent> {
        self.iter().copied().collect()
    }
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBuffer")
            .field("len", &self.live)
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(n: i32) -> MidiEvent {
        MidiEvent::note_on(0, 0, n, 100)
    }

    #[test]
    fn test_push_preserves_arrival_order() {
        let mut buf = EventBuffer::with_capacity(8);
        for n in 0..5 {
            buf.push(note(n)).unwrap();
        }
        let notes: Vec<i32> = buf.iter().map(|e| e.data1).collect();
        assert_eq!(notes, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_overflow_keeps_exact_capacity() {
        let mut buf = EventBuffer::new();
        for n in 0..MAX_EVENTS {
            buf.push(note(n as i32 % 128)).unwrap();
        }
        assert!(buf.is_full());
        assert_eq!(
            buf.push(note(1)),
            Err(Overflow {
                capacity: MAX_EVENTS
            })
        );
        assert_eq!(buf.len(), MAX_EVENTS);
    }

    #[test]
    fn test_begin_cycle_keeps_storage() {
        let mut buf = EventBuffer::with_capacity(4);
        let before = buf.events.capacity();
        for n in 0..4 {
            buf.push(note(n)).unwrap();
        }
        buf.begin_cycle();
        assert!(buf.is_empty());
        assert_eq!(buf.events.capacity(), before);
        buf.push(note(9)).unwrap();
        assert_eq!(buf.to_vec(), vec![note(9)]);
    }

    #[test]
    fn test_mark_dropped_and_compact() {
        let mut buf = EventBuffer::with_capacity(8);
        for n in 0..4 {
            buf.push(note(n)).unwrap();
        }
        assert!(buf.mark_dropped(1));
        assert!(!buf.mark_dropped(1));
        assert!(!buf.mark_dropped(7));
        assert_eq!(buf.len(), 3);
        assert!(buf.get(1).is_none());

        let positions: Vec<usize> = buf.enumerate().map(|(pos, _)| pos).collect();
        assert_eq!(positions, vec![0, 2, 3]);

        let survivors: Vec<i32> = buf.end_cycle().iter().map(|e| e.data1).collect();
        assert_eq!(survivors, vec![0, 2, 3]);
    }

    #[test]
    fn test_push_reuses_dropped_slots_when_full() {
        let mut buf = EventBuffer::with_capacity(3);
        for n in 0..3 {
            buf.push(note(n)).unwrap();
        }
        buf.mark_dropped(0);
        buf.push(note(10)).unwrap();
        let notes: Vec<i32> = buf.iter().map(|e| e.data1).collect();
        assert_eq!(notes, vec![1, 2, 10]);
        assert!(buf.push(note(11)).is_err());
    }

    #[test]
    fn test_retain_can_modify() {
        let mut buf = EventBuffer::with_capacity(8);
        for n in 0..6 {
            buf.push(note(n)).unwrap();
        }
        buf.retain(|e| {
            e.data1 += 12;
            e.data1 % 2 == 0
        });
        let notes: Vec<i32> = buf.iter().map(|e| e.data1).collect();
        assert_eq!(notes, vec![12, 14, 16]);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_extend_from_reports_overflow() {
        let mut src = EventBuffer::with_capacity(4);
        for n in 0..4 {
            src.push(note(n)).unwrap();
        }
        let mut dst = EventBuffer::with_capacity(3);
        dst.push(note(100)).unwrap();
        assert_eq!(dst.extend_from(&src), 2);
        let notes: Vec<i32> = dst.iter().map(|e| e.data1).collect();
        assert_eq!(notes, vec![100, 0, 1]);
    }
}
