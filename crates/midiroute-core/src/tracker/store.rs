//! Two-tier record storage.
//!
//! `primary` is allocated once with capacity `limit` and never grows. Records
//! that do not fit go to `overflow`, which is pre-sized to `limit` as well;
//! growing it beyond that spare capacity is the only allocating path.
//!
//! Invariant: `overflow` is non-empty only while `primary` is full, so
//! `primary` followed by `overflow` is insertion order.

/// Where a newly stored record landed. Ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Spill {
    /// Stored within the soft limit (or nothing was stored).
    Fits,
    /// Above the soft limit, in pre-reserved overflow space.
    SoftLimit,
    /// Above the soft limit, and the overflow storage had to grow.
    Allocated,
}

impl Spill {
    #[inline]
    pub fn exceeded(self) -> bool {
        !matches!(self, Spill::Fits)
    }
}

#[derive(Debug)]
pub(crate) struct RecordStore<T> {
    primary: Vec<T>,
    overflow: Vec<T>,
    limit: usize,
}

impl<T> RecordStore<T> {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            primary: Vec::with_capacity(limit),
            overflow: Vec::with_capacity(limit),
            limit,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.primary.len() + self.overflow.len()
    }

    /// Spare overflow slots that can be filled without allocating.
    #[inline]
    pub fn headroom(&self) -> usize {
        self.overflow.capacity() - self.overflow.len()
    }

    pub fn push(&mut self, record: T) -> Spill {
        if self.primary.len() < self.limit {
            self.primary.push(record);
            return Spill::Fits;
        }
        if self.overflow.len() < self.overflow.capacity() {
            self.overflow.push(record);
            return Spill::SoftLimit;
        }
        self.grow(record);
        Spill::Allocated
    }

    #[cold]
    #[inline(never)]
    fn grow(&mut self, record: T) {
        self.overflow.push(record);
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.primary.iter().chain(self.overflow.iter())
    }

    pub fn find_mut(&mut self, mut pred: impl FnMut(&T) -> bool) -> Option<&mut T> {
        self.primary
            .iter_mut()
            .chain(self.overflow.iter_mut())
            .find(|record| pred(record))
    }

    /// Removes every record for which `take` returns `true`, visiting records
    /// in insertion order. Returns the number removed.
    pub fn remove_where(&mut self, mut take: impl FnMut(&T) -> bool) -> usize {
        let before = self.len();
        self.primary.retain(|record| !take(record));
        self.overflow.retain(|record| !take(record));
        self.refill_primary();
        before - self.len()
    }

    pub fn clear(&mut self) {
        self.primary.clear();
        self.overflow.clear();
    }

    /// Re-establishes `limit` spare overflow slots. Not RT-safe (may allocate).
    pub fn reserve_headroom(&mut self) {
        let spare = self.headroom();
        if spare < self.limit {
            self.overflow.reserve(self.limit - spare);
        }
    }

    fn refill_primary(&mut self) {
        let room = self.limit - self.primary.len();
        let moved = room.min(self.overflow.len());
        if moved > 0 {
            self.primary.extend(self.overflow.drain(..moved));
        }
    }
}
