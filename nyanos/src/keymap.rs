//! Key layout table for the Nyan Keys 60% board.
//!
//! The FPGA scan IP reports one bit per physical key, in the row-major
//! order listed here. Each entry maps a key index to its HID usage on the
//! base layer and on the Fn layer, plus a modifier-mask bit for modifier
//! keys; the Fn layer is a table column, not per-key branching. Keys with
//! no alternate symbol carry their base usage in the Fn column.

/// Number of physical keys in the scan bitmap.
pub const KEY_COUNT: usize = 61;

/// "No usage" table entry; never emitted into a report.
pub const NO_KEY: u8 = 0x00;

/// USB HID usage IDs (Keyboard/Keypad page 0x07) used by the layout.
pub mod kc {
    pub const A: u8 = 0x04;
    pub const B: u8 = 0x05;
    pub const C: u8 = 0x06;
    pub const D: u8 = 0x07;
    pub const E: u8 = 0x08;
    pub const F: u8 = 0x09;
    pub const G: u8 = 0x0A;
    pub const H: u8 = 0x0B;
    pub const I: u8 = 0x0C;
    pub const J: u8 = 0x0D;
    pub const K: u8 = 0x0E;
    pub const L: u8 = 0x0F;
    pub const M: u8 = 0x10;
    pub const N: u8 = 0x11;
    pub const O: u8 = 0x12;
    pub const P: u8 = 0x13;
    pub const Q: u8 = 0x14;
    pub const R: u8 = 0x15;
    pub const S: u8 = 0x16;
    pub const T: u8 = 0x17;
    pub const U: u8 = 0x18;
    pub const V: u8 = 0x19;
    pub const W: u8 = 0x1A;
    pub const X: u8 = 0x1B;
    pub const Y: u8 = 0x1C;
    pub const Z: u8 = 0x1D;
    pub const N1: u8 = 0x1E;
    pub const N2: u8 = 0x1F;
    pub const N3: u8 = 0x20;
    pub const N4: u8 = 0x21;
    pub const N5: u8 = 0x22;
    pub const N6: u8 = 0x23;
    pub const N7: u8 = 0x24;
    pub const N8: u8 = 0x25;
    pub const N9: u8 = 0x26;
    pub const N0: u8 = 0x27;
    pub const ENTER: u8 = 0x28;
    pub const ESCAPE: u8 = 0x29;
    pub const BACKSPACE: u8 = 0x2A;
    pub const TAB: u8 = 0x2B;
    pub const SPACE: u8 = 0x2C;
    pub const MINUS: u8 = 0x2D;
    pub const EQUAL: u8 = 0x2E;
    pub const LBRACKET: u8 = 0x2F;
    pub const RBRACKET: u8 = 0x30;
    pub const BACKSLASH: u8 = 0x31;
    pub const SEMICOLON: u8 = 0x33;
    pub const QUOTE: u8 = 0x34;
    pub const GRAVE: u8 = 0x35;
    pub const COMMA: u8 = 0x36;
    pub const DOT: u8 = 0x37;
    pub const SLASH: u8 = 0x38;
    pub const CAPS_LOCK: u8 = 0x39;
    pub const F1: u8 = 0x3A;
    pub const F2: u8 = 0x3B;
    pub const F3: u8 = 0x3C;
    pub const F4: u8 = 0x3D;
    pub const F5: u8 = 0x3E;
    pub const F6: u8 = 0x3F;
    pub const F7: u8 = 0x40;
    pub const F8: u8 = 0x41;
    pub const F9: u8 = 0x42;
    pub const F10: u8 = 0x43;
    pub const F11: u8 = 0x44;
    pub const F12: u8 = 0x45;
    pub const PRINT_SCREEN: u8 = 0x46;
    pub const SCROLL_LOCK: u8 = 0x47;
    pub const PAUSE: u8 = 0x48;
    pub const INSERT: u8 = 0x49;
    pub const HOME: u8 = 0x4A;
    pub const PAGE_UP: u8 = 0x4B;
    pub const DELETE: u8 = 0x4C;
    pub const END: u8 = 0x4D;
    pub const PAGE_DOWN: u8 = 0x4E;
    pub const RIGHT: u8 = 0x4F;
    pub const LEFT: u8 = 0x50;
    pub const DOWN: u8 = 0x51;
    pub const UP: u8 = 0x52;
    pub const APP: u8 = 0x65;
    pub const LCTRL: u8 = 0xE0;
    pub const LSHIFT: u8 = 0xE1;
    pub const LALT: u8 = 0xE2;
    pub const LGUI: u8 = 0xE3;
    pub const RCTRL: u8 = 0xE4;
    pub const RSHIFT: u8 = 0xE5;
    pub const RALT: u8 = 0xE6;
}

/// Modifier byte bit masks (bit 0 = LCtrl .. bit 7 = RGui).
pub mod modifier {
    pub const NONE: u8 = 0x00;
    pub const LCTRL: u8 = 0x01;
    pub const LSHIFT: u8 = 0x02;
    pub const LALT: u8 = 0x04;
    pub const LGUI: u8 = 0x08;
    pub const RCTRL: u8 = 0x10;
    pub const RSHIFT: u8 = 0x20;
    pub const RALT: u8 = 0x40;
}

/// One physical key: base-layer usage, Fn-layer usage, modifier-mask bit.
pub struct KeyDef {
    pub base: u8,
    pub fn_code: u8,
    pub modifier: u8,
}

const fn key(base: u8, fn_code: u8) -> KeyDef {
    KeyDef {
        base,
        fn_code,
        modifier: modifier::NONE,
    }
}

const fn modkey(base: u8, mask: u8) -> KeyDef {
    KeyDef {
        base,
        fn_code: base,
        modifier: mask,
    }
}

/// Index of the Fn key. Never emitted; flips every other key to its
/// `fn_code` while held.
pub const FN_KEY: usize = 58;
/// Index of the left super/meta key, which honors the persistent disable
/// flag.
pub const SUPER_KEY: usize = 54;

/// The 61-key ANSI layout in scan-bitmap order.
pub static KEYMAP: [KeyDef; KEY_COUNT] = [
    // Row 0: Esc through Backspace
    key(kc::ESCAPE, kc::GRAVE),
    key(kc::N1, kc::F1),
    key(kc::N2, kc::F2),
    key(kc::N3, kc::F3),
    key(kc::N4, kc::F4),
    key(kc::N5, kc::F5),
    key(kc::N6, kc::F6),
    key(kc::N7, kc::F7),
    key(kc::N8, kc::F8),
    key(kc::N9, kc::F9),
    key(kc::N0, kc::F10),
    key(kc::MINUS, kc::F11),
    key(kc::EQUAL, kc::F12),
    key(kc::BACKSPACE, kc::DELETE),
    // Row 1: Tab through Backslash
    key(kc::TAB, kc::TAB),
    key(kc::Q, kc::Q),
    key(kc::W, kc::W),
    key(kc::E, kc::E),
    key(kc::R, kc::R),
    key(kc::T, kc::T),
    key(kc::Y, kc::Y),
    key(kc::U, kc::PAGE_UP),
    key(kc::I, kc::UP),
    key(kc::O, kc::PAGE_DOWN),
    key(kc::P, kc::PRINT_SCREEN),
    key(kc::LBRACKET, kc::SCROLL_LOCK),
    key(kc::RBRACKET, kc::PAUSE),
    key(kc::BACKSLASH, kc::INSERT),
    // Row 2: Caps through Enter
    key(kc::CAPS_LOCK, kc::CAPS_LOCK),
    key(kc::A, kc::A),
    key(kc::S, kc::S),
    key(kc::D, kc::D),
    key(kc::F, kc::F),
    key(kc::G, kc::G),
    key(kc::H, kc::H),
    key(kc::J, kc::LEFT),
    key(kc::K, kc::DOWN),
    key(kc::L, kc::RIGHT),
    key(kc::SEMICOLON, kc::HOME),
    key(kc::QUOTE, kc::END),
    key(kc::ENTER, kc::ENTER),
    // Row 3: LShift through RShift
    modkey(kc::LSHIFT, modifier::LSHIFT),
    key(kc::Z, kc::Z),
    key(kc::X, kc::X),
    key(kc::C, kc::C),
    key(kc::V, kc::V),
    key(kc::B, kc::B),
    key(kc::N, kc::N),
    key(kc::M, kc::M),
    key(kc::COMMA, kc::COMMA),
    key(kc::DOT, kc::DOT),
    key(kc::SLASH, kc::SLASH),
    modkey(kc::RSHIFT, modifier::RSHIFT),
    // Row 4: bottom row; index 54 = super, index 58 = Fn
    modkey(kc::LCTRL, modifier::LCTRL),
    modkey(kc::LGUI, modifier::LGUI),
    modkey(kc::LALT, modifier::LALT),
    key(kc::SPACE, kc::SPACE),
    modkey(kc::RALT, modifier::RALT),
    key(NO_KEY, NO_KEY), // Fn
    key(kc::APP, kc::APP),
    modkey(kc::RCTRL, modifier::RCTRL),
];
