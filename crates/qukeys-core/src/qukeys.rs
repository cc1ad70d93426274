use crate::event_queue::EventQueue;
use crate::event_tracker::KeyEventTracker;
use crate::host::Host;
use crate::types::{HandlerResult, KeyEdge, KeyEvent, KeyPosition, LogicalKey, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, trace, warn};

pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

/// Layer value of a qukey that exists on every layer.
pub const LAYER_WILDCARD: i8 = -1;

/// A table-configured dual-role key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Qukey {
    pub layer: i8,
    pub position: KeyPosition,
    /// Value used when the key is held.
    pub alternate_key: LogicalKey,
}

impl Qukey {
    pub const fn new(layer: i8, position: KeyPosition, alternate_key: LogicalKey) -> Self {
        Self {
            layer,
            position,
            alternate_key,
        }
    }

    pub const fn on_all_layers(position: KeyPosition, alternate_key: LogicalKey) -> Self {
        Self::new(LAYER_WILDCARD, position, alternate_key)
    }

    fn matches(&self, position: KeyPosition, layer: u8) -> bool {
        self.position == position && (self.layer == LAYER_WILDCARD || self.layer == layer as i8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QukeysSettings {
    /// A qukey held alone this long (ms) takes its alternate value, or its
    /// primary value for a SpaceCadet-type key.
    #[serde(default = "default_hold_timeout")]
    pub hold_timeout: u16,
    /// Percent of a rollover that must overlap before it counts as a chord.
    /// 0 disables the rollover grace period.
    #[serde(default = "default_overlap_threshold")]
    pub overlap_threshold: u8,
    /// A qukey must be held this long (ms) before it may become alternate.
    #[serde(default = "default_minimum_hold_time")]
    pub minimum_hold_time: u8,
    /// Minimum gap (ms) after a printable keypress for a qukey to be
    /// alternate-eligible.
    #[serde(default = "default_minimum_prior_interval")]
    pub minimum_prior_interval: u8,
    /// Tap then press again within this window (ms) to hold the primary value.
    #[serde(default = "default_max_interval_for_tap_repeat")]
    pub max_interval_for_tap_repeat: u8,
}

fn default_hold_timeout() -> u16 {
    250
}

fn default_overlap_threshold() -> u8 {
    80
}

fn default_minimum_hold_time() -> u8 {
    50
}

fn default_minimum_prior_interval() -> u8 {
    75
}

fn default_max_interval_for_tap_repeat() -> u8 {
    200
}

impl Default for QukeysSettings {
    fn default() -> Self {
        Self {
            hold_timeout: default_hold_timeout(),
            overlap_threshold: default_overlap_threshold(),
            minimum_hold_time: default_minimum_hold_time(),
            minimum_prior_interval: default_minimum_prior_interval(),
            max_interval_for_tap_repeat: default_max_interval_for_tap_repeat(),
        }
    }
}

/// How long to keep delaying a qukey release while the rolled-over key is
/// still held.
///
/// The release is held back until the overlap makes up `threshold_percent` of
/// the time since the next key went down: `overlap * 100 / threshold`. A
/// threshold of 0 means no grace period at all and yields `None`. Saturates
/// at `u16::MAX`.
pub fn rollover_grace_period(overlap_duration: u16, threshold_percent: u8) -> Option<u16> {
    if threshold_percent == 0 {
        return None;
    }
    let timeout = u32::from(overlap_duration) * 100 / u32::from(threshold_percent);
    Some(u16::try_from(timeout).unwrap_or(u16::MAX))
}

/// Primary and alternate values of the qukey at the head of the queue.
#[derive(Debug, Clone, Copy)]
struct QueueHead {
    primary_key: LogicalKey,
    alternate_key: LogicalKey,
}

impl Default for QueueHead {
    fn default() -> Self {
        Self {
            primary_key: LogicalKey::Transparent,
            alternate_key: LogicalKey::Transparent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TapRepeatState {
    Idle,
    /// A qukey was just tapped at `position`; its release may still turn into
    /// a double-tap or a tap-repeat hold.
    Waiting {
        position: KeyPosition,
        start_time: Timestamp,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TapRepeatDecision {
    /// Flush the release at the head normally.
    Flush,
    /// Keep the release queued until more input or the timeout.
    Wait,
    /// Tap-repeat: the release and the second press were dropped.
    Merged,
}

/// The dual-role key engine.
///
/// Holds back keyswitch events in a bounded queue until it can tell whether
/// the qukey at the head was tapped (primary value) or held (alternate value),
/// then re-dispatches the head through the host with the chosen value.
pub struct Qukeys<const N: usize = DEFAULT_QUEUE_CAPACITY> {
    qukeys: Vec<Qukey>,
    event_queue: EventQueue<N>,
    active: bool,
    overlap_threshold: u8,
    hold_timeout: u16,
    minimum_hold_time: u8,
    minimum_prior_interval: u8,
    // Starts out of range of `minimum_prior_interval` so a qukey pressed right
    // after power-on is alternate-eligible.
    prior_keypress_timestamp: Timestamp,
    event_tracker: KeyEventTracker,
    queue_head: QueueHead,
    tap_repeat: TapRepeatState,
    tap_repeat_timeout: u8,
    // Values that flushed presses resolved to, so their releases match.
    live_keys: HashMap<KeyPosition, LogicalKey>,
}

impl<const N: usize> Default for Qukeys<N> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<const N: usize> Qukeys<N> {
    pub fn new(qukeys: Vec<Qukey>) -> Self {
        let settings = QukeysSettings::default();
        Self {
            qukeys,
            event_queue: EventQueue::new(),
            active: true,
            overlap_threshold: settings.overlap_threshold,
            hold_timeout: settings.hold_timeout,
            minimum_hold_time: settings.minimum_hold_time,
            minimum_prior_interval: settings.minimum_prior_interval,
            prior_keypress_timestamp: 256,
            event_tracker: KeyEventTracker::new(),
            queue_head: QueueHead::default(),
            tap_repeat: TapRepeatState::Idle,
            tap_repeat_timeout: settings.max_interval_for_tap_repeat,
            live_keys: HashMap::new(),
        }
    }

    pub fn with_settings(qukeys: Vec<Qukey>, settings: QukeysSettings) -> Self {
        let mut engine = Self::new(qukeys);
        engine.apply_settings(&settings);
        engine
    }

    pub fn qukeys_count(&self) -> usize {
        self.qukeys.len()
    }

    /// Read one entry of the static qukey table.
    pub fn qukey(&self, index: usize) -> Option<Qukey> {
        self.qukeys.get(index).copied()
    }

    pub fn apply_settings(&mut self, settings: &QukeysSettings) {
        self.set_hold_timeout(settings.hold_timeout);
        self.set_overlap_threshold(settings.overlap_threshold);
        self.set_minimum_hold_time(settings.minimum_hold_time);
        self.set_minimum_prior_interval(settings.minimum_prior_interval);
        self.set_max_interval_for_tap_repeat(settings.max_interval_for_tap_repeat);
    }

    pub fn settings(&self) -> QukeysSettings {
        QukeysSettings {
            hold_timeout: self.hold_timeout,
            overlap_threshold: self.overlap_threshold,
            minimum_hold_time: self.minimum_hold_time,
            minimum_prior_interval: self.minimum_prior_interval,
            max_interval_for_tap_repeat: self.tap_repeat_timeout,
        }
    }

    pub fn activate(&mut self) {
        if !self.active {
            info!("Qukeys: activated");
        }
        self.active = true;
    }

    /// Turn the engine off. Anything still queued drains with primary values.
    pub fn deactivate(&mut self) {
        if self.active {
            info!("Qukeys: deactivated ({} events queued)", self.event_queue.len());
        }
        self.active = false;
    }

    pub fn toggle(&mut self) {
        if self.active {
            self.deactivate();
        } else {
            self.activate();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn hold_timeout(&self) -> u16 {
        self.hold_timeout
    }

    pub fn set_hold_timeout(&mut self, hold_timeout: u16) {
        self.hold_timeout = hold_timeout;
    }

    pub fn overlap_threshold(&self) -> u8 {
        self.overlap_threshold
    }

    /// Only values below 100 are meaningful; anything else turns the rollover
    /// grace period off, same as 0.
    pub fn set_overlap_threshold(&mut self, percentage: u8) {
        self.overlap_threshold = if percentage < 100 { percentage } else { 0 };
    }

    pub fn minimum_hold_time(&self) -> u8 {
        self.minimum_hold_time
    }

    pub fn set_minimum_hold_time(&mut self, minimum_hold_time: u8) {
        self.minimum_hold_time = minimum_hold_time;
    }

    pub fn minimum_prior_interval(&self) -> u8 {
        self.minimum_prior_interval
    }

    pub fn set_minimum_prior_interval(&mut self, minimum_prior_interval: u8) {
        self.minimum_prior_interval = minimum_prior_interval;
    }

    pub fn max_interval_for_tap_repeat(&self) -> u8 {
        self.tap_repeat_timeout
    }

    pub fn set_max_interval_for_tap_repeat(&mut self, ttl: u8) {
        self.tap_repeat_timeout = ttl;
    }

    /// Number of events currently held back.
    pub fn queue_len(&self) -> usize {
        self.event_queue.len()
    }

    pub const fn queue_capacity(&self) -> usize {
        N
    }

    /// Offer a keyswitch event to the engine.
    ///
    /// New physical events are queued and `Deferred`; they come back through
    /// `Host::redispatch` once decided. Events the engine has already seen
    /// (its own re-dispatches) get `Continue`.
    pub fn handle_event<H: Host>(&mut self, event: &mut KeyEvent, host: &mut H) -> HandlerResult {
        if self.event_tracker.should_ignore(event) {
            if self.event_queue.should_abort(event) {
                warn!(
                    "Qukeys: event id={} re-delivered while still queued; dropping it",
                    event.id
                );
                return HandlerResult::Deferred;
            }
            return HandlerResult::Continue;
        }

        if !event.position.is_valid() || event.injected {
            return HandlerResult::Continue;
        }

        // Once deactivated, events still queue behind anything left over so
        // downstream order holds while the queue drains.
        if !self.active && self.event_queue.is_empty() {
            if let Some((primary_key, alternate_key)) = event.key.dual_use_parts() {
                self.queue_head = QueueHead {
                    primary_key,
                    alternate_key,
                };
                event.key = primary_key;
            }
            if event.is_release() {
                if let Some(key) = self.live_keys.remove(&event.position) {
                    event.key = key;
                }
            }
            return HandlerResult::Continue;
        }

        if self.event_queue.is_full() {
            warn!("Qukeys: queue full before append; forcing a flush");
            self.process_queue(host);
        }

        trace!(
            "Qukeys: enqueue {:?} {:?} id={}",
            event.position,
            event.edge,
            event.id
        );
        self.event_queue.append(event, host.timestamp());

        while self.process_queue(host) {}

        HandlerResult::Deferred
    }

    /// Run once per cycle: apply the hold timeout to the head, then resolve
    /// whatever else can be resolved.
    pub fn poll<H: Host>(&mut self, host: &mut H) {
        // Keep the prior keypress timestamp from drifting back into range
        // when the clock wraps.
        let prior_interval = u16::from(self.minimum_prior_interval);
        if host.has_time_expired(self.prior_keypress_timestamp, prior_interval) {
            self.prior_keypress_timestamp = host.timestamp().wrapping_sub(prior_interval + 1);
        }

        if self.event_queue.is_empty() {
            return;
        }

        if self.active
            && self.event_queue.is_press(0)
            && self.is_qukey(self.event_queue.position(0), host)
            && host.has_time_expired(self.event_queue.timestamp(0), self.hold_timeout)
        {
            let event_key = if self.queue_head.primary_key.is_modifier_key() {
                self.queue_head.primary_key
            } else {
                self.queue_head.alternate_key
            };
            debug!("Qukeys: hold timeout at {:?}", self.event_queue.position(0));
            self.flush_event(event_key, host);
        }

        while self.process_queue(host) {}
    }

    // Try to resolve the head of the queue. Returns true if something changed
    // and another pass may make more progress.
    fn process_queue<H: Host>(&mut self, host: &mut H) -> bool {
        if self.event_queue.is_empty() {
            return false;
        }

        let head_position = self.event_queue.position(0);

        if self.event_queue.is_release(0) {
            let tap_repeat_candidate = matches!(
                self.tap_repeat,
                TapRepeatState::Waiting { position, .. } if position == head_position
            );
            if self.event_queue.is_full() || !tap_repeat_candidate || !self.active {
                if tap_repeat_candidate {
                    self.tap_repeat = TapRepeatState::Idle;
                }
                self.flush_event(LogicalKey::NoKey, host);
                return true;
            }
            // Not full, so waiting here cannot overflow the queue.
            return match self.check_tap_repeat(host) {
                TapRepeatDecision::Flush => {
                    self.flush_event(LogicalKey::NoKey, host);
                    true
                }
                TapRepeatDecision::Wait => false,
                TapRepeatDecision::Merged => true,
            };
        }

        if !self.is_qukey(head_position, host) || !self.active {
            self.flush_event(self.queue_head.primary_key, host);
            return true;
        }

        // The head is a qukey press and `queue_head` is valid for it.
        let primary_key = self.queue_head.primary_key;
        let alternate_key = self.queue_head.alternate_key;
        let is_spacecadet = primary_key.is_modifier_key();

        // Fast typing: a qukey right after a printable key stays primary.
        if !is_spacecadet
            && !host.has_time_expired(
                self.prior_keypress_timestamp,
                u16::from(self.minimum_prior_interval),
            )
        {
            self.flush_event(primary_key, host);
            return true;
        }

        let mut next_keypress_index: Option<usize> = None;

        for i in 1..self.event_queue.len() {
            if self.event_queue.is_press(i) {
                // SpaceCadet keys only go alternate with zero rollover.
                if is_spacecadet {
                    self.flush_event(primary_key, host);
                    return true;
                }
                if next_keypress_index.is_none() {
                    next_keypress_index = Some(i);
                }
                continue;
            }

            if self.event_queue.position(i) == head_position {
                // The qukey itself was released.
                let grace = match next_keypress_index {
                    Some(next) => rollover_grace_period(
                        self.event_queue
                            .timestamp(i)
                            .wrapping_sub(self.event_queue.timestamp(next)),
                        self.overlap_threshold,
                    )
                    .map(|timeout| (self.event_queue.timestamp(next), timeout)),
                    None => None,
                };

                match grace {
                    None => {
                        let event_key = if is_spacecadet { alternate_key } else { primary_key };
                        // Its release might start a tap-repeat or double-tap.
                        self.tap_repeat = TapRepeatState::Waiting {
                            position: head_position,
                            start_time: self.event_queue.timestamp(0),
                        };
                        self.flush_event(event_key, host);
                        return true;
                    }
                    Some((overlap_start, timeout)) => {
                        if !host.has_time_expired(overlap_start, timeout) {
                            continue;
                        }
                        // Ordinary typing rollover, not a chord.
                        self.flush_event(primary_key, host);
                        return true;
                    }
                }
            }

            // Release of some other key. If that key was also pressed after
            // the qukey, the qukey was held across a full keystroke.
            let released = self.event_queue.position(i);
            let pressed_after_head = (1..i).any(|j| self.event_queue.position(j) == released);
            if pressed_after_head
                && host.has_time_expired(
                    self.event_queue.timestamp(0),
                    u16::from(self.minimum_hold_time),
                )
            {
                self.flush_event(alternate_key, host);
                return true;
            }
        }

        if self.event_queue.is_full() {
            warn!("Qukeys: queue full; resolving {:?} as primary", head_position);
            self.flush_event(primary_key, host);
            return true;
        }

        // Still waiting for another event or the hold timeout.
        false
    }

    // Called with a release of the tap-repeat candidate at the head of a
    // non-full queue.
    fn check_tap_repeat<H: Host>(&mut self, host: &mut H) -> TapRepeatDecision {
        let TapRepeatState::Waiting {
            position,
            mut start_time,
        } = self.tap_repeat
        else {
            return TapRepeatDecision::Flush;
        };

        let mut second_press_index: Option<usize> = None;

        for i in 1..self.event_queue.len() {
            if self.event_queue.is_press(i) {
                if self.event_queue.position(i) != position {
                    // Another key intervened; no tap-repeat.
                    self.tap_repeat = TapRepeatState::Idle;
                    return TapRepeatDecision::Flush;
                }
                // Pressed again quickly. Measure from the first release from
                // now on, so a double-tap is judged release to release.
                start_time = self.event_queue.timestamp(0);
                self.tap_repeat = TapRepeatState::Waiting {
                    position,
                    start_time,
                };
                second_press_index = Some(i);
            } else if self.event_queue.position(i) == position {
                // Second release before the timeout: a double-tap.
                debug!("Qukeys: double-tap at {:?}", position);
                self.tap_repeat = TapRepeatState::Idle;
                return TapRepeatDecision::Flush;
            }
        }

        if !host.has_time_expired(start_time, u16::from(self.tap_repeat_timeout)) {
            return TapRepeatDecision::Wait;
        }

        self.tap_repeat = TapRepeatState::Idle;
        match second_press_index {
            Some(index) => {
                // Drop the second press first so index 0 is still the release.
                debug!("Qukeys: tap-repeat at {:?}", position);
                self.event_queue.remove(index);
                self.event_queue.remove(0);
                TapRepeatDecision::Merged
            }
            None => TapRepeatDecision::Flush,
        }
    }

    // Remove the head of the queue and send it back through the host with
    // `event_key` (presses) or the value its press resolved to (releases).
    fn flush_event<H: Host>(&mut self, event_key: LogicalKey, host: &mut H) {
        let position = self.event_queue.position(0);
        let edge = self.event_queue.edge(0);
        let id = self.event_queue.id(0);

        let key = match edge {
            KeyEdge::Down => {
                if event_key.is_printable() {
                    self.prior_keypress_timestamp = self.event_queue.timestamp(0);
                }
                self.live_keys.insert(position, event_key);
                event_key
            }
            KeyEdge::Up => self
                .live_keys
                .remove(&position)
                .unwrap_or_else(|| self.event_queue.key(0)),
        };

        // Shift before re-dispatching so the event is no longer queued when it
        // comes back to `handle_event`.
        self.event_queue.shift();
        debug!("Qukeys: flush {:?} {:?} as {:?} id={}", position, edge, key, id);
        host.redispatch(KeyEvent::new(position, edge, key, id));
    }

    // Whether `position` is a qukey on its current layer. Refreshes
    // `queue_head` as a side effect, for qukeys and plain keys alike.
    fn is_qukey<H: Host>(&mut self, position: KeyPosition, host: &H) -> bool {
        let key = host.lookup_key(position);

        if let Some((primary_key, alternate_key)) = key.dual_use_parts() {
            self.queue_head = QueueHead {
                primary_key,
                alternate_key,
            };
            return true;
        }

        let layer = host.active_layer(position);
        let found = (0..self.qukeys.len())
            .filter_map(|i| self.qukey(i))
            .find(|q| q.matches(position, layer));

        self.queue_head = QueueHead {
            primary_key: key,
            alternate_key: found.map_or(LogicalKey::Transparent, |q| q.alternate_key),
        };
        found.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keycodes::*;
    use crate::pipeline::{Keymap, Pipeline};
    use crate::types::{layer_tap, mod_tap, EventId};

    const A: KeyPosition = KeyPosition::new(2, 1);
    const B: KeyPosition = KeyPosition::new(2, 2);
    const F: KeyPosition = KeyPosition::new(2, 4);
    const J: KeyPosition = KeyPosition::new(2, 7);
    const SHIFT: KeyPosition = KeyPosition::new(3, 0);
    const SPACE: KeyPosition = KeyPosition::new(3, 1);
    const FN: KeyPosition = KeyPosition::new(3, 2);

    use crate::types::KeyEdge::{Down, Up};

    fn keymap() -> Keymap {
        Keymap::new()
            .with(0, A, KEY_A)
            .with(0, B, KEY_B)
            .with(0, F, mod_tap(KEY_LEFT_CONTROL, KEY_F))
            .with(0, J, KEY_J)
            .with(0, SHIFT, KEY_LEFT_SHIFT)
            .with(0, SPACE, layer_tap(1, KEY_SPACE))
            .with(0, FN, LogicalKey::LayerShift(1))
            .with(1, B, KEY_2)
            .with(1, J, KEY_1)
    }

    fn table() -> Vec<Qukey> {
        vec![
            Qukey::on_all_layers(A, KEY_LEFT_GUI),
            Qukey::on_all_layers(SHIFT, KEY_9),
            Qukey::new(1, B, KEY_LEFT_ALT),
        ]
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(keymap(), Qukeys::new(table()))
    }

    struct TestHost {
        now: u32,
        keymap: HashMap<KeyPosition, LogicalKey>,
        redispatched: Vec<KeyEvent>,
    }

    impl Host for TestHost {
        fn millis_at_cycle_start(&self) -> u32 {
            self.now
        }

        fn lookup_key(&self, position: KeyPosition) -> LogicalKey {
            self.keymap.get(&position).copied().unwrap_or(LogicalKey::NoKey)
        }

        fn active_layer(&self, _position: KeyPosition) -> u8 {
            0
        }

        fn redispatch(&mut self, event: KeyEvent) {
            self.redispatched.push(event);
        }
    }

    #[test]
    fn test_grace_period() {
        assert_eq!(rollover_grace_period(20, 80), Some(25));
        assert_eq!(rollover_grace_period(0, 80), Some(0));
        assert_eq!(rollover_grace_period(80, 80), Some(100));
        assert_eq!(rollover_grace_period(20, 0), None);
        assert_eq!(rollover_grace_period(60_000, 1), Some(u16::MAX));
    }

    #[test]
    fn test_tap_is_primary() {
        let mut p = pipeline();
        p.press(A);
        p.advance(30);
        p.release(A);
        // The press goes out right away; the release waits out the
        // tap-repeat window.
        assert_eq!(p.emitted_keys(), vec![(Down, KEY_A)]);
        assert_eq!(p.engine().queue_len(), 1);

        p.advance(200);
        assert_eq!(p.emitted_keys(), vec![(Down, KEY_A), (Up, KEY_A)]);
        assert_eq!(p.output()[0].time, 30);
        assert_eq!(p.output()[1].time, 201);
        let ids: Vec<_> = p.output().iter().map(|e| e.event.id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(p.engine().queue_len(), 0);
    }

    #[test]
    fn test_hold_timeout_is_alternate() {
        let mut p = pipeline();
        p.press(A);
        p.advance(250);
        assert!(p.output().is_empty());
        p.advance(10);
        assert_eq!(p.emitted_keys(), vec![(Down, KEY_LEFT_GUI)]);
        assert_eq!(p.output()[0].time, 251);

        p.release(A);
        assert_eq!(p.emitted_keys(), vec![(Down, KEY_LEFT_GUI), (Up, KEY_LEFT_GUI)]);
        assert!(p.live_keys().is_empty());
    }

    #[test]
    fn test_spacecadet_hold_is_primary() {
        let mut p = pipeline();
        p.press(SHIFT);
        p.advance(260);
        assert_eq!(p.emitted_keys(), vec![(Down, KEY_LEFT_SHIFT)]);
    }

    #[test]
    fn test_spacecadet_tap_is_alternate() {
        let mut p = pipeline();
        p.press(SHIFT);
        p.advance(30);
        p.release(SHIFT);
        p.advance(250);
        assert_eq!(p.emitted_keys(), vec![(Down, KEY_9), (Up, KEY_9)]);
    }

    #[test]
    fn test_spacecadet_interrupted_by_any_press() {
        let mut p = pipeline();
        p.press(SHIFT);
        p.advance(10);
        p.press(J);
        assert_eq!(p.emitted_keys(), vec![(Down, KEY_LEFT_SHIFT), (Down, KEY_J)]);
        assert_eq!(p.engine().queue_len(), 0);
    }

    #[test]
    fn test_rollover_resolves_primary() {
        let mut p = pipeline();
        p.press(A);
        p.advance(20);
        p.press(J);
        p.advance(20);
        p.release(A);
        assert!(p.output().is_empty());

        // 20 ms of overlap at 80% buys a 25 ms grace period from J's press.
        p.advance(5);
        assert!(p.output().is_empty());
        p.advance(5);
        assert_eq!(
            p.emitted_keys(),
            vec![(Down, KEY_A), (Down, KEY_J), (Up, KEY_A)]
        );
        assert_eq!(p.output()[0].time, 46);

        p.release(J);
        assert_eq!(p.emitted_keys().last(), Some(&(Up, KEY_J)));
    }

    #[test]
    fn test_chord_resolves_alternate() {
        let mut p = pipeline();
        p.press(A);
        p.advance(100);
        p.press(J);
        p.advance(50);
        p.release(J);
        assert_eq!(
            p.emitted_keys(),
            vec![(Down, KEY_LEFT_GUI), (Down, KEY_J), (Up, KEY_J)]
        );
        p.release(A);
        assert_eq!(p.emitted_keys().last(), Some(&(Up, KEY_LEFT_GUI)));
    }

    #[test]
    fn test_release_within_grace_period_is_chord() {
        let mut p = pipeline();
        p.press(A);
        p.advance(100);
        p.press(J);
        p.advance(80);
        p.release(A);
        p.advance(10);
        p.release(J);
        assert_eq!(
            p.emitted_keys(),
            vec![
                (Down, KEY_LEFT_GUI),
                (Down, KEY_J),
                (Up, KEY_LEFT_GUI),
                (Up, KEY_J)
            ]
        );
    }

    #[test]
    fn test_zero_threshold_release_is_tap() {
        let mut p = pipeline();
        p.engine_mut().set_overlap_threshold(0);
        p.press(A);
        p.advance(100);
        p.press(J);
        p.advance(80);
        p.release(A);
        assert_eq!(p.emitted_keys(), vec![(Down, KEY_A), (Down, KEY_J)]);
        p.advance(10);
        p.release(J);
        p.advance(30);
        assert_eq!(
            p.emitted_keys(),
            vec![(Down, KEY_A), (Down, KEY_J), (Up, KEY_A), (Up, KEY_J)]
        );
    }

    #[test]
    fn test_short_hold_is_not_a_chord() {
        let mut p = pipeline();
        p.press(A);
        p.advance(10);
        p.press(J);
        p.advance(20);
        p.release(J);
        // J's full keystroke fit inside A's press, but A was held under the
        // minimum hold time, so nothing resolves yet.
        assert!(p.output().is_empty());
        p.advance(30);
        assert_eq!(p.emitted_keys()[0], (Down, KEY_LEFT_GUI));
    }

    #[test]
    fn test_fast_typing_keeps_qukey_primary() {
        let mut p = pipeline();
        p.press(J);
        p.advance(10);
        p.release(J);
        p.advance(10);
        p.press(A);
        assert_eq!(p.emitted_keys(), vec![(Down, KEY_J), (Up, KEY_J), (Down, KEY_A)]);

        // Already resolved; the hold timeout has nothing left to do.
        p.advance(300);
        assert_eq!(p.output().len(), 3);
        p.release(A);
        assert_eq!(p.emitted_keys().last(), Some(&(Up, KEY_A)));
    }

    #[test]
    fn test_fast_typing_guard_skips_spacecadet() {
        let mut p = pipeline();
        p.press(J);
        p.advance(10);
        p.release(J);
        p.advance(10);
        p.press(SHIFT);
        assert_eq!(p.output().len(), 2);
        p.advance(260);
        assert_eq!(p.emitted_keys()[2], (Down, KEY_LEFT_SHIFT));
        assert_eq!(p.output()[2].time, 271);
    }

    #[test]
    fn test_tap_repeat_holds_primary() {
        let mut p = pipeline();
        p.press(A);
        p.advance(30);
        p.release(A);
        p.advance(30);
        p.press(A);
        p.advance(300);
        // The first release and the second press were merged away.
        assert_eq!(p.emitted_keys(), vec![(Down, KEY_A)]);
        assert_eq!(p.engine().queue_len(), 0);

        p.release(A);
        assert_eq!(p.emitted_keys(), vec![(Down, KEY_A), (Up, KEY_A)]);
        let ids: Vec<_> = p.output().iter().map(|e| e.event.id).collect();
        assert_eq!(ids, vec![0, 3]);
    }

    #[test]
    fn test_double_tap() {
        let mut p = pipeline();
        p.press(A);
        p.advance(30);
        p.release(A);
        p.advance(30);
        p.press(A);
        p.advance(30);
        p.release(A);
        assert_eq!(p.emitted_keys(), vec![(Down, KEY_A), (Up, KEY_A), (Down, KEY_A)]);
        p.advance(200);
        assert_eq!(
            p.emitted_keys(),
            vec![(Down, KEY_A), (Up, KEY_A), (Down, KEY_A), (Up, KEY_A)]
        );
        assert_eq!(p.output()[3].time, 261);
    }

    #[test]
    fn test_other_key_cancels_tap_repeat() {
        let mut p = pipeline();
        p.press(A);
        p.advance(30);
        p.release(A);
        p.advance(10);
        p.press(J);
        assert_eq!(p.emitted_keys(), vec![(Down, KEY_A), (Up, KEY_A), (Down, KEY_J)]);
    }

    #[test]
    fn test_mod_tap_in_keymap() {
        let mut p = pipeline();
        p.press(F);
        p.advance(260);
        assert_eq!(p.emitted_keys(), vec![(Down, KEY_LEFT_CONTROL)]);
        p.release(F);

        p.advance(100);
        p.take_output();
        p.press(F);
        p.advance(20);
        p.release(F);
        p.advance(250);
        assert_eq!(p.emitted_keys(), vec![(Down, KEY_F), (Up, KEY_F)]);
    }

    #[test]
    fn test_layer_tap_shifts_layer() {
        let mut p = pipeline();
        p.press(SPACE);
        p.advance(100);
        p.press(J);
        p.advance(50);
        p.release(J);
        // J was looked up again after the layer shift went out.
        assert_eq!(
            p.emitted_keys(),
            vec![
                (Down, LogicalKey::LayerShift(1)),
                (Down, KEY_1),
                (Up, KEY_1)
            ]
        );
        p.release(SPACE);
        assert_eq!(p.emitted_keys().last(), Some(&(Up, LogicalKey::LayerShift(1))));
    }

    #[test]
    fn test_layer_specific_qukey() {
        let mut p = pipeline();
        p.press(B);
        assert_eq!(p.emitted_keys(), vec![(Down, KEY_B)]);
        p.release(B);
        p.advance(100);
        p.take_output();

        p.press(FN);
        p.press(B);
        assert_eq!(p.emitted_keys(), vec![(Down, LogicalKey::LayerShift(1))]);
        p.advance(260);
        assert_eq!(
            p.emitted_keys(),
            vec![(Down, LogicalKey::LayerShift(1)), (Down, KEY_LEFT_ALT)]
        );
    }

    #[test]
    fn test_deactivated_passes_primary_values() {
        let mut p = pipeline();
        p.engine_mut().deactivate();
        assert!(!p.engine().is_active());
        p.press(F);
        p.press(A);
        p.release(A);
        p.release(F);
        assert_eq!(
            p.emitted_keys(),
            vec![(Down, KEY_F), (Down, KEY_A), (Up, KEY_A), (Up, KEY_F)]
        );

        p.engine_mut().toggle();
        assert!(p.engine().is_active());
    }

    #[test]
    fn test_deactivate_drains_queue_in_order() {
        let mut p = pipeline();
        p.press(A);
        p.advance(10);
        p.engine_mut().deactivate();
        assert_eq!(p.engine().queue_len(), 1);

        p.press(J);
        assert_eq!(p.emitted_keys(), vec![(Down, KEY_A), (Down, KEY_J)]);
        assert_eq!(p.engine().queue_len(), 0);
    }

    #[test]
    fn test_deactivate_drains_on_poll() {
        let mut p = pipeline();
        p.press(A);
        p.engine_mut().deactivate();
        p.advance(1);
        assert_eq!(p.emitted_keys(), vec![(Down, KEY_A)]);
    }

    #[test]
    fn test_release_after_deactivate_forgets_resolved_value() {
        let mut p = pipeline();
        p.press(A);
        p.advance(260);
        assert_eq!(p.engine().live_keys.get(&A), Some(&KEY_LEFT_GUI));

        p.engine_mut().deactivate();
        p.release(A);
        assert_eq!(p.emitted_keys(), vec![(Down, KEY_LEFT_GUI), (Up, KEY_LEFT_GUI)]);
        assert!(p.engine().live_keys.is_empty());

        // A fresh press after reactivating resolves on its own.
        p.engine_mut().activate();
        p.advance(100);
        p.press(A);
        p.advance(30);
        p.release(A);
        p.advance(250);
        assert_eq!(&p.emitted_keys()[2..], &[(Down, KEY_A), (Up, KEY_A)]);
        assert!(p.engine().live_keys.is_empty());
    }

    #[test]
    fn test_forced_release_flush_ends_tap_repeat_wait() {
        let mut p = pipeline();
        p.press(A);
        p.advance(30);
        p.release(A);
        assert!(matches!(p.engine().tap_repeat, TapRepeatState::Waiting { position, .. } if position == A));

        p.engine_mut().deactivate();
        p.advance(1);
        assert_eq!(p.emitted_keys(), vec![(Down, KEY_A), (Up, KEY_A)]);
        assert_eq!(p.engine().tap_repeat, TapRepeatState::Idle);

        // A later tap of the same key starts its own window.
        p.engine_mut().activate();
        p.advance(100);
        p.press(A);
        p.advance(30);
        p.release(A);
        assert_eq!(
            p.engine().tap_repeat,
            TapRepeatState::Waiting {
                position: A,
                start_time: 131
            }
        );
    }

    #[test]
    fn test_full_queue_ends_tap_repeat_wait() {
        let others: Vec<KeyPosition> = (0..3).map(|c| KeyPosition::new(0, c)).collect();
        let mut p: Pipeline<4> = Pipeline::new(keymap(), Qukeys::new(table()));
        p.press(A);
        p.advance(30);
        p.release(A);
        assert_eq!(p.engine().queue_len(), 1);

        // Releases of keys that were never pressed queue up behind A's
        // release without ending the tap-repeat wait.
        for &pos in &others {
            p.release(pos);
        }
        assert_eq!(p.engine().queue_len(), 0);
        assert_eq!(p.emitted_keys()[1], (Up, KEY_A));
        assert_eq!(p.engine().tap_repeat, TapRepeatState::Idle);
    }

    #[test]
    fn test_event_ids_wrap_through_the_engine() {
        let mut p = pipeline();
        p.set_next_event_id(125);

        // Chord across the wrap: 125, 126, 127, -128.
        p.press(A);
        p.advance(100);
        p.press(J);
        p.advance(50);
        p.release(J);
        p.advance(10);
        p.release(A);
        p.advance(300);

        // Tap-repeat on the far side: -127 .. -124, the middle two merged.
        p.press(A);
        p.advance(30);
        p.release(A);
        p.advance(30);
        p.press(A);
        p.advance(300);
        p.release(A);

        assert_eq!(
            p.emitted_keys(),
            vec![
                (Down, KEY_LEFT_GUI),
                (Down, KEY_J),
                (Up, KEY_J),
                (Up, KEY_LEFT_GUI),
                (Down, KEY_A),
                (Up, KEY_A),
            ]
        );
        let ids: Vec<EventId> = p.output().iter().map(|e| e.event.id).collect();
        assert_eq!(ids, vec![125, 126, 127, -128, -127, -124]);
        assert_eq!(p.engine().queue_len(), 0);
        assert!(p.engine().live_keys.is_empty());
    }

    #[test]
    fn test_full_queue_forces_primary() {
        let mut keymap = keymap();
        let others: Vec<KeyPosition> = (0..7).map(|c| KeyPosition::new(0, c)).collect();
        for (i, &pos) in others.iter().enumerate() {
            keymap.set(0, pos, LogicalKey::Keyboard(0x1E + i as u8));
        }
        let mut p: Pipeline = Pipeline::new(keymap, Qukeys::new(table()));

        p.press(A);
        for &pos in &others[..6] {
            p.press(pos);
        }
        assert_eq!(p.engine().queue_len(), 7);
        assert!(p.output().is_empty());

        p.press(others[6]);
        assert_eq!(p.engine().queue_len(), 0);
        assert_eq!(p.output().len(), 8);
        assert_eq!(p.emitted_keys()[0], (Down, KEY_A));
    }

    #[test]
    fn test_smaller_queue_capacity() {
        let mut p: Pipeline<4> = Pipeline::new(keymap(), Qukeys::new(table()));
        assert_eq!(p.engine().queue_capacity(), 4);
        p.press(A);
        p.press(J);
        p.press(B);
        assert!(p.output().is_empty());
        p.press(F);
        assert_eq!(p.emitted_keys()[0], (Down, KEY_A));
        assert_eq!(p.emitted_keys()[1], (Down, KEY_J));
    }

    #[test]
    fn test_hold_timeout_across_clock_wrap() {
        let mut p = pipeline();
        p.set_time(65_500);
        p.press(A);
        p.advance(260);
        assert_eq!(p.emitted_keys(), vec![(Down, KEY_LEFT_GUI)]);
        assert_eq!(p.output()[0].time, 65_751);
    }

    #[test]
    fn test_redelivered_event_is_not_queued_twice() {
        let mut host = TestHost {
            now: 0,
            keymap: HashMap::from([(A, KEY_A)]),
            redispatched: Vec::new(),
        };
        let mut engine: Qukeys = Qukeys::new(table());

        let mut press = KeyEvent::new(A, Down, KEY_A, 0);
        assert_eq!(engine.handle_event(&mut press, &mut host), HandlerResult::Deferred);
        assert_eq!(engine.queue_len(), 1);

        let mut again = press;
        assert_eq!(engine.handle_event(&mut again, &mut host), HandlerResult::Deferred);
        assert_eq!(engine.queue_len(), 1);
        assert!(host.redispatched.is_empty());

        host.now = 300;
        engine.poll(&mut host);
        assert_eq!(host.redispatched.len(), 1);
        let mut flushed = host.redispatched[0];
        assert_eq!(flushed.key, KEY_LEFT_GUI);
        assert_eq!(flushed.id, 0);
        assert_eq!(engine.handle_event(&mut flushed, &mut host), HandlerResult::Continue);
        assert_eq!(flushed.key, KEY_LEFT_GUI);
    }

    #[test]
    fn test_injected_and_invalid_events_pass() {
        let mut host = TestHost {
            now: 0,
            keymap: HashMap::from([(A, KEY_A)]),
            redispatched: Vec::new(),
        };
        let mut engine: Qukeys = Qukeys::new(table());

        let mut injected = KeyEvent::new(A, Down, KEY_A, 0);
        injected.injected = true;
        assert_eq!(engine.handle_event(&mut injected, &mut host), HandlerResult::Continue);

        let mut invalid = KeyEvent::new(KeyPosition::INVALID, Down, KEY_B, 1);
        assert_eq!(engine.handle_event(&mut invalid, &mut host), HandlerResult::Continue);
        assert_eq!(engine.queue_len(), 0);
    }

    #[test]
    fn test_settings_round_trip() {
        let settings = QukeysSettings {
            hold_timeout: 400,
            overlap_threshold: 60,
            minimum_hold_time: 30,
            minimum_prior_interval: 0,
            max_interval_for_tap_repeat: 150,
        };
        let engine: Qukeys = Qukeys::with_settings(table(), settings);
        assert_eq!(engine.settings(), settings);
        assert_eq!(engine.qukeys_count(), 3);
        assert_eq!(engine.qukey(2), Some(Qukey::new(1, B, KEY_LEFT_ALT)));
        assert_eq!(engine.qukey(3), None);
    }
}
