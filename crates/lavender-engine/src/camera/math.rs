//! Shared camera helpers. Left-handed: `+X` right, `+Y` up, `+Z` forward.

use std::f32::consts::FRAC_PI_2;

use glam::{Quat, Vec2, Vec3};

use crate::input::Movement;

/// Pitch limit short of straight up/down, so the view basis never degenerates.
pub const MAX_PITCH: f32 = FRAC_PI_2 - 0.001;

#[inline]
pub fn forward(orientation: Quat) -> Vec3 {
    (orientation * Vec3::Z).normalize()
}

#[inline]
pub fn right(orientation: Quat) -> Vec3 {
    Vec3::Y.cross(forward(orientation)).normalize_or_zero()
}

#[inline]
pub fn up(orientation: Quat) -> Vec3 {
    let f = forward(orientation);
    f.cross(right(orientation)).normalize_or_zero()
}

/// Elevation of the forward vector above the horizon, in radians.
#[inline]
pub fn pitch(orientation: Quat) -> f32 {
    forward(orientation).y.clamp(-1.0, 1.0).asin()
}

/// Applies yaw about world up, then pitch about the yawed right axis,
/// keeping the resulting pitch inside `±MAX_PITCH`.
///
/// Positive `yaw` turns right; positive `pitch` looks up.
pub fn yaw_pitch(orientation: Quat, yaw: f32, pitch_input: f32) -> Quat {
    let yawed = (Quat::from_axis_angle(Vec3::Y, yaw) * orientation).normalize();

    let current = pitch(yawed);
    let desired = (current + pitch_input).clamp(-MAX_PITCH, MAX_PITCH);
    let axis = right(yawed);
    if axis == Vec3::ZERO {
        return yawed;
    }

    // A positive rotation about `right` tips forward downwards.
    let q_pitch = Quat::from_axis_angle(axis, current - desired);
    (q_pitch * yawed).normalize()
}

/// World-space displacement for held movement keys along the given axes.
pub fn translation(movement: Movement, forward_axis: Vec3, right_axis: Vec3, amount: f32) -> Vec3 {
    let dir: Vec2 = movement.direction();
    (forward_axis * dir.y + right_axis * dir.x) * amount
}

/// Width over height, or `1.0` for a degenerate viewport.
#[inline]
pub fn aspect_ratio(width: u32, height: u32) -> f32 {
    if width == 0 || height == 0 {
        1.0
    } else {
        width as f32 / height as f32
    }
}
