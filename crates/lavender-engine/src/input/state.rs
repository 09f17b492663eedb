use std::collections::HashSet;

use glam::Vec2;

use super::snapshot::{InputSnapshot, Movement};
use super::types::{ButtonState, InputEvent, Key, MouseButton};

/// Current input state for a single window.
///
/// Holds "is down" information plus the most recent cursor and scroll
/// deltas. Deltas are last-value-wins and are cleared by
/// [`take_snapshot`](Self::take_snapshot).
#[derive(Debug, Default)]
pub struct InputState {
    /// Whether the window is focused.
    pub focused: bool,

    /// Cursor position in physical pixels.
    pub cursor: Option<Vec2>,

    pub keys_down: HashSet<Key>,
    pub buttons_down: HashSet<MouseButton>,

    mouse_delta: Vec2,
    scroll_delta: Vec2,
}

impl InputState {
    pub fn apply_event(&mut self, ev: &InputEvent) {
        match *ev {
            InputEvent::Focused(f) => {
                self.focused = f;
                if !f {
                    // Avoids stuck keys/buttons when focus changes mid-press.
                    self.keys_down.clear();
                    self.buttons_down.clear();
                }
            }

            InputEvent::CursorMoved { x, y } => {
                let pos = Vec2::new(x, y);
                if let Some(prev) = self.cursor {
                    self.mouse_delta = pos - prev;
                }
                self.cursor = Some(pos);
            }

            InputEvent::CursorLeft => {
                self.cursor = None;
            }

            InputEvent::Key { key, state, .. } => match state {
                ButtonState::Pressed => {
                    self.keys_down.insert(key);
                }
                ButtonState::Released => {
                    self.keys_down.remove(&key);
                }
            },

            InputEvent::Button { button, state } => match state {
                ButtonState::Pressed => {
                    self.buttons_down.insert(button);
                }
                ButtonState::Released => {
                    self.buttons_down.remove(&button);
                }
            },

            InputEvent::Wheel { dx, dy } => {
                self.scroll_delta = Vec2::new(dx, dy);
            }
        }
    }

    pub fn key_down(&self, key: Key) -> bool {
        self.keys_down.contains(&key)
    }

    pub fn button_down(&self, btn: MouseButton) -> bool {
        self.buttons_down.contains(&btn)
    }

    /// Movement axes from WASD (arrow keys as alternates).
    pub fn movement(&self) -> Movement {
        let axis = |pos: [Key; 2], neg: [Key; 2]| {
            let p = pos.iter().any(|k| self.key_down(*k)) as i8;
            let n = neg.iter().any(|k| self.key_down(*k)) as i8;
            f32::from(p - n)
        };
        Movement {
            forward: axis([Key::W, Key::ArrowUp], [Key::S, Key::ArrowDown]),
            right: axis([Key::D, Key::ArrowRight], [Key::A, Key::ArrowLeft]),
        }
    }

    /// Reads the current input and clears the deltas.
    pub fn take_snapshot(&mut self) -> InputSnapshot {
        InputSnapshot {
            movement: self.movement(),
            mouse_delta: std::mem::take(&mut self.mouse_delta),
            scroll_delta: std::mem::take(&mut self.scroll_delta),
            primary_button_down: self.button_down(MouseButton::Left),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(key: Key, state: ButtonState) -> InputEvent {
        InputEvent::Key {
            key,
            state,
            repeat: false,
        }
    }

    // ── movement ──────────────────────────────────────────────────────────

    #[test]
    fn opposite_keys_cancel() {
        let mut s = InputState::default();
        s.apply_event(&key(Key::W, ButtonState::Pressed));
        s.apply_event(&key(Key::S, ButtonState::Pressed));
        s.apply_event(&key(Key::D, ButtonState::Pressed));
        let m = s.movement();
        assert_eq!(m.forward, 0.0);
        assert_eq!(m.right, 1.0);
    }

    #[test]
    fn release_stops_movement() {
        let mut s = InputState::default();
        s.apply_event(&key(Key::A, ButtonState::Pressed));
        assert_eq!(s.movement().right, -1.0);
        s.apply_event(&key(Key::A, ButtonState::Released));
        assert!(s.movement().is_idle());
    }

    #[test]
    fn focus_loss_clears_held_input() {
        let mut s = InputState::default();
        s.apply_event(&key(Key::W, ButtonState::Pressed));
        s.apply_event(&InputEvent::Button {
            button: MouseButton::Left,
            state: ButtonState::Pressed,
        });
        s.apply_event(&InputEvent::Focused(false));
        assert!(s.keys_down.is_empty());
        assert!(s.buttons_down.is_empty());
    }

    // ── deltas ────────────────────────────────────────────────────────────

    #[test]
    fn mouse_delta_is_last_value_wins() {
        let mut s = InputState::default();
        s.apply_event(&InputEvent::CursorMoved { x: 10.0, y: 10.0 });
        s.apply_event(&InputEvent::CursorMoved { x: 15.0, y: 10.0 });
        s.apply_event(&InputEvent::CursorMoved { x: 15.0, y: 13.0 });
        assert_eq!(s.take_snapshot().mouse_delta, Vec2::new(0.0, 3.0));
    }

    #[test]
    fn first_cursor_position_produces_no_delta() {
        let mut s = InputState::default();
        s.apply_event(&InputEvent::CursorMoved { x: 100.0, y: 50.0 });
        assert_eq!(s.take_snapshot().mouse_delta, Vec2::ZERO);
    }

    #[test]
    fn snapshot_clears_deltas_but_not_held_state() {
        let mut s = InputState::default();
        s.apply_event(&InputEvent::Button {
            button: MouseButton::Left,
            state: ButtonState::Pressed,
        });
        s.apply_event(&InputEvent::Wheel { dx: 0.0, dy: 2.0 });
        s.apply_event(&InputEvent::CursorMoved { x: 0.0, y: 0.0 });
        s.apply_event(&InputEvent::CursorMoved { x: 4.0, y: 0.0 });

        let first = s.take_snapshot();
        assert_eq!(first.scroll_delta, Vec2::new(0.0, 2.0));
        assert_eq!(first.mouse_delta, Vec2::new(4.0, 0.0));
        assert!(first.primary_button_down);

        let second = s.take_snapshot();
        assert_eq!(second.scroll_delta, Vec2::ZERO);
        assert_eq!(second.mouse_delta, Vec2::ZERO);
        assert!(second.primary_button_down);
    }
}
