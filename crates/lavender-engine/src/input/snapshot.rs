use glam::Vec2;

/// Held movement keys, resolved to axes in `-1..=1`.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Movement {
    /// `+1` forward (W), `-1` backward (S).
    pub forward: f32,
    /// `+1` right (D), `-1` left (A).
    pub right: f32,
}

impl Movement {
    #[inline]
    pub fn is_idle(self) -> bool {
        self.forward == 0.0 && self.right == 0.0
    }

    /// Unit direction as `(right, forward)`, or zero when idle.
    #[inline]
    pub fn direction(self) -> Vec2 {
        Vec2::new(self.right, self.forward).normalize_or_zero()
    }
}

/// Input consumed by one engine tick.
///
/// Produced by [`InputState::take_snapshot`](super::InputState::take_snapshot);
/// deltas in here have already been cleared from the state.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct InputSnapshot {
    pub movement: Movement,
    /// Last cursor motion in physical pixels, `+y` down.
    pub mouse_delta: Vec2,
    /// Last scroll amount in lines, `+y` away from the user.
    pub scroll_delta: Vec2,
    pub primary_button_down: bool,
}
