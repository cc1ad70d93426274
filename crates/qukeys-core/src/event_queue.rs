use crate::types::{EventId, KeyEdge, KeyEvent, KeyPosition, LogicalKey, Timestamp};

/// Fixed-capacity FIFO of keyswitch events with random access.
///
/// Each field lives in its own array so a search over the queue touches only
/// the data it compares. Press/release state is one bit per slot. Entries are
/// shifted down on removal rather than kept in a ring, because the queue is
/// searched far more often than it is modified.
///
/// Index arguments must be below `len()`; callers loop up to `len()` and the
/// accessors do not re-check.
#[derive(Debug, Clone)]
pub struct EventQueue<const N: usize> {
    length: usize,
    ids: [EventId; N],
    positions: [KeyPosition; N],
    keys: [LogicalKey; N],
    timestamps: [Timestamp; N],
    release_bits: u32,
}

impl<const N: usize> Default for EventQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> EventQueue<N> {
    const FITS_BITFIELD: () = assert!(N > 0 && N <= 32, "event queue capacity must be 1..=32");

    pub fn new() -> Self {
        let () = Self::FITS_BITFIELD;
        Self {
            length: 0,
            ids: [0; N],
            positions: [KeyPosition::INVALID; N],
            keys: [LogicalKey::NoKey; N],
            timestamps: [0; N],
            release_bits: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn is_full(&self) -> bool {
        self.length == N
    }

    pub fn id(&self, index: usize) -> EventId {
        self.ids[index]
    }

    pub fn position(&self, index: usize) -> KeyPosition {
        self.positions[index]
    }

    /// The value the event carried when it was queued.
    pub fn key(&self, index: usize) -> LogicalKey {
        self.keys[index]
    }

    pub fn timestamp(&self, index: usize) -> Timestamp {
        self.timestamps[index]
    }

    pub fn is_release(&self, index: usize) -> bool {
        self.release_bits & (1 << index) != 0
    }

    pub fn is_press(&self, index: usize) -> bool {
        !self.is_release(index)
    }

    pub fn edge(&self, index: usize) -> KeyEdge {
        if self.is_release(index) {
            KeyEdge::Up
        } else {
            KeyEdge::Down
        }
    }

    /// Add `event` at the tail, stamped with `now`. The queue must not be full.
    pub fn append(&mut self, event: &KeyEvent, now: Timestamp) {
        debug_assert!(self.length < N, "append on a full event queue");
        let i = self.length;
        self.ids[i] = event.id;
        self.positions[i] = event.position;
        self.keys[i] = event.key;
        self.timestamps[i] = now;
        if event.is_release() {
            self.release_bits |= 1 << i;
        } else {
            self.release_bits &= !(1 << i);
        }
        self.length += 1;
    }

    /// Remove the entry at `index`, closing the gap. Out-of-range is a no-op.
    pub fn remove(&mut self, index: usize) {
        if index >= self.length {
            return;
        }
        self.length -= 1;
        for i in index..self.length {
            self.ids[i] = self.ids[i + 1];
            self.positions[i] = self.positions[i + 1];
            self.keys[i] = self.keys[i + 1];
            self.timestamps[i] = self.timestamps[i + 1];
        }
        // Bits below `index` stay put, bits above move down one.
        let high_mask = u32::MAX << index;
        let low_bits = self.release_bits & !high_mask;
        self.release_bits = ((self.release_bits >> 1) & high_mask) | low_bits;
    }

    pub fn shift(&mut self) {
        self.remove(0);
    }

    /// For an event the dedup guard has already seen: true when it is not
    /// older than the queue head, meaning someone re-delivered an event that
    /// is still queued here.
    pub fn should_abort(&self, event: &KeyEvent) -> bool {
        if self.length == 0 {
            return false;
        }
        event.id.wrapping_sub(self.ids[0]) >= 0
    }
}
