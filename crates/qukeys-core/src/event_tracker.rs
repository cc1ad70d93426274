use crate::types::{is_newer, EventId, KeyEvent};

/// Remembers the newest event id a component has seen.
///
/// A component that holds events back and later re-dispatches them through the
/// host will see those events again. Checking `should_ignore` first lets it
/// pass its own re-dispatched events through instead of queueing them a
/// second time. If more than half the id range goes by without any event
/// reaching the tracker, a new event can be mistaken for an old one.
#[derive(Debug, Clone)]
pub struct KeyEventTracker {
    last_id_seen: EventId,
}

impl Default for KeyEventTracker {
    fn default() -> Self {
        Self { last_id_seen: -1 }
    }
}

impl KeyEventTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `event` is newer than anything seen so far. Records it if so.
    pub fn is_new(&mut self, event: &KeyEvent) -> bool {
        if is_newer(event.id, self.last_id_seen) {
            self.last_id_seen = event.id;
            return true;
        }
        false
    }

    pub fn should_ignore(&mut self, event: &KeyEvent) -> bool {
        !self.is_new(event)
    }

    pub fn last_id_seen(&self) -> EventId {
        self.last_id_seen
    }
}
