use serde::{Deserialize, Serialize};

/// Identifier of a physical transition. Wraps; compare with [`is_newer`].
pub type EventId = i8;

/// Milliseconds at cycle start, truncated to the width the queue stores.
pub type Timestamp = u16;

/// Row and column of a keyswitch in the matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyPosition {
    pub row: u8,
    pub col: u8,
}

impl KeyPosition {
    /// Sentinel for "no key".
    pub const INVALID: Self = Self {
        row: u8::MAX,
        col: u8::MAX,
    };

    pub const fn new(row: u8, col: u8) -> Self {
        Self { row, col }
    }

    pub const fn is_valid(self) -> bool {
        !(self.row == u8::MAX && self.col == u8::MAX)
    }
}

impl Default for KeyPosition {
    fn default() -> Self {
        Self::INVALID
    }
}

/// What a key means once it reaches the host.
///
/// `ModTap` and `LayerTap` are dual-role keys encoded directly in the keymap;
/// everything else is a plain value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalKey {
    NoKey,
    Transparent,
    /// HID keyboard usage, modifiers included (0xE0..=0xE7).
    Keyboard(u8),
    /// Momentary layer shift.
    LayerShift(u8),
    /// Tap for `tap`, hold for the `modifier` usage.
    ModTap { modifier: u8, tap: u8 },
    /// Tap for `tap`, hold to shift to `layer`.
    LayerTap { layer: u8, tap: u8 },
}

pub const HID_FIRST_MODIFIER: u8 = 0xE0;
pub const HID_LAST_MODIFIER: u8 = 0xE7;

impl LogicalKey {
    pub const fn is_keyboard_modifier(self) -> bool {
        matches!(self, LogicalKey::Keyboard(code) if code >= HID_FIRST_MODIFIER && code <= HID_LAST_MODIFIER)
    }

    pub const fn is_layer_shift(self) -> bool {
        matches!(self, LogicalKey::LayerShift(_))
    }

    /// Keys meant to be chorded with another key: real modifiers and layer
    /// shifts. A dual-role key whose primary value is one of these is a
    /// SpaceCadet-type key.
    pub const fn is_modifier_key(self) -> bool {
        self.is_keyboard_modifier() || self.is_layer_shift()
    }

    /// Letters, digits and the punctuation block `-` through `/`.
    pub const fn is_printable(self) -> bool {
        match self {
            LogicalKey::Keyboard(code) => {
                (code >= 0x04 && code <= 0x27) || (code >= 0x2D && code <= 0x38)
            }
            _ => false,
        }
    }

    /// Primary and alternate values of an in-keymap dual-role key.
    pub const fn dual_use_parts(self) -> Option<(LogicalKey, LogicalKey)> {
        match self {
            LogicalKey::ModTap { modifier, tap } => {
                Some((LogicalKey::Keyboard(tap), LogicalKey::Keyboard(modifier)))
            }
            LogicalKey::LayerTap { layer, tap } => {
                Some((LogicalKey::Keyboard(tap), LogicalKey::LayerShift(layer)))
            }
            _ => None,
        }
    }
}

/// Build an in-keymap dual-role key: `tap_key` when tapped, `mod_key` when held.
/// Returns `NoKey` if either argument is not a keyboard usage of the right kind.
pub const fn mod_tap(mod_key: LogicalKey, tap_key: LogicalKey) -> LogicalKey {
    match (mod_key, tap_key) {
        (LogicalKey::Keyboard(modifier), LogicalKey::Keyboard(tap))
            if modifier >= HID_FIRST_MODIFIER && modifier <= HID_LAST_MODIFIER =>
        {
            LogicalKey::ModTap { modifier, tap }
        }
        _ => LogicalKey::NoKey,
    }
}

/// Build an in-keymap dual-role key: `tap_key` when tapped, shift to `layer` when held.
pub const fn layer_tap(layer: u8, tap_key: LogicalKey) -> LogicalKey {
    match tap_key {
        LogicalKey::Keyboard(tap) => LogicalKey::LayerTap { layer, tap },
        _ => LogicalKey::NoKey,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyEdge {
    Down,
    Up,
}

/// A keyswitch transition travelling through the host pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub position: KeyPosition,
    pub edge: KeyEdge,
    pub key: LogicalKey,
    pub id: EventId,
    /// Synthesized by some other component rather than the matrix.
    pub injected: bool,
}

impl KeyEvent {
    pub const fn new(position: KeyPosition, edge: KeyEdge, key: LogicalKey, id: EventId) -> Self {
        Self {
            position,
            edge,
            key,
            id,
            injected: false,
        }
    }

    pub const fn is_press(&self) -> bool {
        matches!(self.edge, KeyEdge::Down)
    }

    pub const fn is_release(&self) -> bool {
        matches!(self.edge, KeyEdge::Up)
    }
}

/// Outcome of offering an event to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerResult {
    /// Let the host keep processing the event.
    Continue,
    /// The engine took the event; it comes back later through `Host::redispatch`.
    Deferred,
}

/// `a` is newer than `b` under wrapping comparison.
///
/// Only meaningful while the true distance between the two ids is below half
/// the id range.
pub const fn is_newer(a: EventId, b: EventId) -> bool {
    a.wrapping_sub(b) > 0
}

/// Wrapping "more than `ttl` ms have passed since `start`".
///
/// Valid while the real elapsed time stays below half the timestamp range.
pub const fn has_expired(now: Timestamp, start: Timestamp, ttl: u16) -> bool {
    now.wrapping_sub(start) > ttl
}
