use crate::types::LogicalKey;

pub const KEY_NO_KEY: LogicalKey = LogicalKey::NoKey;
pub const KEY_TRANSPARENT: LogicalKey = LogicalKey::Transparent;

pub const KEY_A: LogicalKey = LogicalKey::Keyboard(0x04);
pub const KEY_B: LogicalKey = LogicalKey::Keyboard(0x05);
pub const KEY_C: LogicalKey = LogicalKey::Keyboard(0x06);
pub const KEY_D: LogicalKey = LogicalKey::Keyboard(0x07);
pub const KEY_E: LogicalKey = LogicalKey::Keyboard(0x08);
pub const KEY_F: LogicalKey = LogicalKey::Keyboard(0x09);
pub const KEY_G: LogicalKey = LogicalKey::Keyboard(0x0A);
pub const KEY_H: LogicalKey = LogicalKey::Keyboard(0x0B);
pub const KEY_I: LogicalKey = LogicalKey::Keyboard(0x0C);
pub const KEY_J: LogicalKey = LogicalKey::Keyboard(0x0D);
pub const KEY_K: LogicalKey = LogicalKey::Keyboard(0x0E);
pub const KEY_L: LogicalKey = LogicalKey::Keyboard(0x0F);
pub const KEY_M: LogicalKey = LogicalKey::Keyboard(0x10);
pub const KEY_N: LogicalKey = LogicalKey::Keyboard(0x11);
pub const KEY_O: LogicalKey = LogicalKey::Keyboard(0x12);
pub const KEY_P: LogicalKey = LogicalKey::Keyboard(0x13);
pub const KEY_Q: LogicalKey = LogicalKey::Keyboard(0x14);
pub const KEY_R: LogicalKey = LogicalKey::Keyboard(0x15);
pub const KEY_S: LogicalKey = LogicalKey::Keyboard(0x16);
pub const KEY_T: LogicalKey = LogicalKey::Keyboard(0x17);
pub const KEY_U: LogicalKey = LogicalKey::Keyboard(0x18);
pub const KEY_V: LogicalKey = LogicalKey::Keyboard(0x19);
pub const KEY_W: LogicalKey = LogicalKey::Keyboard(0x1A);
pub const KEY_X: LogicalKey = LogicalKey::Keyboard(0x1B);
pub const KEY_Y: LogicalKey = LogicalKey::Keyboard(0x1C);
pub const KEY_Z: LogicalKey = LogicalKey::Keyboard(0x1D);
pub const KEY_1: LogicalKey = LogicalKey::Keyboard(0x1E);
pub const KEY_2: LogicalKey = LogicalKey::Keyboard(0x1F);
pub const KEY_3: LogicalKey = LogicalKey::Keyboard(0x20);
pub const KEY_4: LogicalKey = LogicalKey::Keyboard(0x21);
pub const KEY_5: LogicalKey = LogicalKey::Keyboard(0x22);
pub const KEY_6: LogicalKey = LogicalKey::Keyboard(0x23);
pub const KEY_7: LogicalKey = LogicalKey::Keyboard(0x24);
pub const KEY_8: LogicalKey = LogicalKey::Keyboard(0x25);
pub const KEY_9: LogicalKey = LogicalKey::Keyboard(0x26);
pub const KEY_0: LogicalKey = LogicalKey::Keyboard(0x27);
pub const KEY_ENTER: LogicalKey = LogicalKey::Keyboard(0x28);
pub const KEY_ESCAPE: LogicalKey = LogicalKey::Keyboard(0x29);
pub const KEY_BACKSPACE: LogicalKey = LogicalKey::Keyboard(0x2A);
pub const KEY_TAB: LogicalKey = LogicalKey::Keyboard(0x2B);
pub const KEY_SPACE: LogicalKey = LogicalKey::Keyboard(0x2C);
pub const KEY_MINUS: LogicalKey = LogicalKey::Keyboard(0x2D);
pub const KEY_EQUALS: LogicalKey = LogicalKey::Keyboard(0x2E);
pub const KEY_LEFT_BRACKET: LogicalKey = LogicalKey::Keyboard(0x2F);
pub const KEY_RIGHT_BRACKET: LogicalKey = LogicalKey::Keyboard(0x30);
pub const KEY_BACKSLASH: LogicalKey = LogicalKey::Keyboard(0x31);
pub const KEY_SEMICOLON: LogicalKey = LogicalKey::Keyboard(0x33);
pub const KEY_QUOTE: LogicalKey = LogicalKey::Keyboard(0x34);
pub const KEY_BACKTICK: LogicalKey = LogicalKey::Keyboard(0x35);
pub const KEY_COMMA: LogicalKey = LogicalKey::Keyboard(0x36);
pub const KEY_PERIOD: LogicalKey = LogicalKey::Keyboard(0x37);
pub const KEY_SLASH: LogicalKey = LogicalKey::Keyboard(0x38);

pub const KEY_LEFT_CONTROL: LogicalKey = LogicalKey::Keyboard(0xE0);
pub const KEY_LEFT_SHIFT: LogicalKey = LogicalKey::Keyboard(0xE1);
pub const KEY_LEFT_ALT: LogicalKey = LogicalKey::Keyboard(0xE2);
pub const KEY_LEFT_GUI: LogicalKey = LogicalKey::Keyboard(0xE3);
pub const KEY_RIGHT_CONTROL: LogicalKey = LogicalKey::Keyboard(0xE4);
pub const KEY_RIGHT_SHIFT: LogicalKey = LogicalKey::Keyboard(0xE5);
pub const KEY_RIGHT_ALT: LogicalKey = LogicalKey::Keyboard(0xE6);
pub const KEY_RIGHT_GUI: LogicalKey = LogicalKey::Keyboard(0xE7);

/// Names accepted in configuration files, matched case-insensitively.
const KEY_NAMES: &[(&str, LogicalKey)] = &[
    ("a", KEY_A),
    ("b", KEY_B),
    ("c", KEY_C),
    ("d", KEY_D),
    ("e", KEY_E),
    ("f", KEY_F),
    ("g", KEY_G),
    ("h", KEY_H),
    ("i", KEY_I),
    ("j", KEY_J),
    ("k", KEY_K),
    ("l", KEY_L),
    ("m", KEY_M),
    ("n", KEY_N),
    ("o", KEY_O),
    ("p", KEY_P),
    ("q", KEY_Q),
    ("r", KEY_R),
    ("s", KEY_S),
    ("t", KEY_T),
    ("u", KEY_U),
    ("v", KEY_V),
    ("w", KEY_W),
    ("x", KEY_X),
    ("y", KEY_Y),
    ("z", KEY_Z),
    ("1", KEY_1),
    ("2", KEY_2),
    ("3", KEY_3),
    ("4", KEY_4),
    ("5", KEY_5),
    ("6", KEY_6),
    ("7", KEY_7),
    ("8", KEY_8),
    ("9", KEY_9),
    ("0", KEY_0),
    ("enter", KEY_ENTER),
    ("escape", KEY_ESCAPE),
    ("esc", KEY_ESCAPE),
    ("backspace", KEY_BACKSPACE),
    ("tab", KEY_TAB),
    ("space", KEY_SPACE),
    ("minus", KEY_MINUS),
    ("equals", KEY_EQUALS),
    ("leftbracket", KEY_LEFT_BRACKET),
    ("rightbracket", KEY_RIGHT_BRACKET),
    ("backslash", KEY_BACKSLASH),
    ("semicolon", KEY_SEMICOLON),
    ("quote", KEY_QUOTE),
    ("backtick", KEY_BACKTICK),
    ("comma", KEY_COMMA),
    ("period", KEY_PERIOD),
    ("slash", KEY_SLASH),
    ("leftcontrol", KEY_LEFT_CONTROL),
    ("leftshift", KEY_LEFT_SHIFT),
    ("leftalt", KEY_LEFT_ALT),
    ("leftgui", KEY_LEFT_GUI),
    ("rightcontrol", KEY_RIGHT_CONTROL),
    ("rightshift", KEY_RIGHT_SHIFT),
    ("rightalt", KEY_RIGHT_ALT),
    ("rightgui", KEY_RIGHT_GUI),
];

/// Resolve a configuration key name.
///
/// Besides the plain names above, `layer<N>` names a layer shift
/// (e.g. `layer2`). Underscores and case are ignored, so `Left_Shift`
/// and `leftshift` are the same key.
pub fn key_from_name(name: &str) -> Option<LogicalKey> {
    let normalized: String = name
        .chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect();

    if let Some(layer) = normalized.strip_prefix("layer") {
        return layer.parse::<u8>().ok().map(LogicalKey::LayerShift);
    }

    KEY_NAMES
        .iter()
        .find(|(n, _)| *n == normalized)
        .map(|(_, key)| *key)
}

/// Reverse lookup, used when printing resolved streams.
pub fn key_name(key: LogicalKey) -> Option<&'static str> {
    KEY_NAMES.iter().find(|(_, k)| *k == key).map(|(n, _)| *n)
}
