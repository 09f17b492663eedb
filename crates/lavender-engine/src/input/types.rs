use std::fmt;

/// Keyboard key identifier.
///
/// Only keys the viewer reacts to get a variant. Everything else maps to
/// `Key::Unknown` with the platform code.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Key {
    Escape,
    Enter,
    Space,
    Shift,
    Control,

    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,

    A, B, C, D, E, F, G, H, I, J, K, L, M,
    N, O, P, Q, R, S, T, U, V, W, X, Y, Z,

    /// Platform-dependent key not represented here.
    Unknown(u32),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other(u16),
}

/// Pressed / released, for keys and buttons alike.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ButtonState {
    Pressed,
    Released,
}

/// Platform-agnostic input events emitted by the runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Key {
        key: Key,
        state: ButtonState,
        /// True when the event is a key repeat.
        repeat: bool,
    },

    /// Cursor position in physical pixels.
    CursorMoved { x: f32, y: f32 },

    /// Cursor left the window surface.
    CursorLeft,

    Button {
        button: MouseButton,
        state: ButtonState,
    },

    /// Scroll amount in lines.
    Wheel { dx: f32, dy: f32 },

    /// Window focus change.
    Focused(bool),
}
