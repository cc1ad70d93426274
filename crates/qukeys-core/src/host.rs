use crate::types::{has_expired, KeyEvent, KeyPosition, LogicalKey, Timestamp};

/// What the engine needs from the firmware pipeline around it.
pub trait Host {
    /// Milliseconds at the start of the current cycle. Constant within a cycle.
    fn millis_at_cycle_start(&self) -> u32;

    /// The cycle clock truncated to the queue's timestamp width.
    fn timestamp(&self) -> Timestamp {
        self.millis_at_cycle_start() as Timestamp
    }

    /// More than `ttl` ms have passed between `start` and the current cycle.
    fn has_time_expired(&self, start: Timestamp, ttl: u16) -> bool {
        has_expired(self.timestamp(), start, ttl)
    }

    /// Currently effective key value at `position`.
    fn lookup_key(&self, position: KeyPosition) -> LogicalKey;

    /// Layer that `lookup_key` resolved `position` from.
    fn active_layer(&self, position: KeyPosition) -> u8;

    /// Feed a resolved event back into the pipeline. It keeps its original id.
    fn redispatch(&mut self, event: KeyEvent);
}
