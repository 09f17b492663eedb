use glam::{Mat4, Quat, Vec3};

use super::math;
use super::{Camera, ResponsiveCamera};
use crate::config::InputSettings;
use crate::input::InputSnapshot;

/// Orbits a target point at a fixed distance. Drag orbits, scroll zooms.
#[derive(Debug, Clone)]
pub struct ArcballCamera {
    pub target: Vec3,
    pub distance: f32,
    pub orientation: Quat,
    pub aspect: f32,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    /// Orbit rate comes from `mouse_sensitivity`.
    pub settings: InputSettings,
    /// Distance scale per scroll line.
    pub zoom_sensitivity: f32,
    pub min_distance: f32,
    pub max_distance: f32,
}

impl Default for ArcballCamera {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            distance: 5.0,
            orientation: Quat::IDENTITY,
            aspect: 1.0,
            fov_y: 70.0,
            near: 0.1,
            far: 1000.0,
            settings: InputSettings::default(),
            zoom_sensitivity: 1.1,
            min_distance: 0.2,
            max_distance: 1000.0,
        }
    }
}

impl ArcballCamera {
    pub fn new(target: Vec3, distance: f32) -> Self {
        Self {
            target,
            distance,
            ..Self::default()
        }
    }

    /// Eye position on the orbit sphere.
    pub fn origin(&self) -> Vec3 {
        self.target - math::forward(self.orientation) * self.distance
    }
}

impl Camera for ArcballCamera {
    fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_lh(self.origin(), self.target, Vec3::Y)
    }

    fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_lh(self.fov_y.to_radians(), self.aspect, self.near, self.far)
    }

    fn resize_viewport(&mut self, width: u32, height: u32) {
        self.aspect = math::aspect_ratio(width, height);
    }
}

impl ResponsiveCamera for ArcballCamera {
    fn set_input_settings(&mut self, settings: InputSettings) {
        self.settings = settings;
    }

    fn update(&mut self, input: &InputSnapshot, _dt: f32) {
        if input.primary_button_down {
            let s = self.settings.mouse_sensitivity;
            self.orientation =
                math::yaw_pitch(self.orientation, input.mouse_delta.x * s, -input.mouse_delta.y * s);
        }

        if input.scroll_delta.y != 0.0 {
            let factor = self.zoom_sensitivity.powf(input.scroll_delta.y);
            self.distance = (self.distance / factor).clamp(self.min_distance, self.max_distance);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    #[test]
    fn orbit_keeps_distance_to_target() {
        let mut cam = ArcballCamera::new(Vec3::new(1.0, 0.0, 0.0), 5.0);
        let input = InputSnapshot {
            mouse_delta: Vec2::new(120.0, -80.0),
            primary_button_down: true,
            ..InputSnapshot::default()
        };
        for _ in 0..10 {
            cam.update(&input, 0.016);
        }
        assert!((cam.origin().distance(cam.target) - 5.0).abs() < 1e-4);
        // Dragging up tilts the view upwards, which drops the eye below the target.
        assert!(cam.origin().y < 0.0);
    }

    #[test]
    fn scroll_zoom_is_clamped() {
        let mut cam = ArcballCamera::default();
        let zoom_in = InputSnapshot {
            scroll_delta: Vec2::new(0.0, 1000.0),
            ..InputSnapshot::default()
        };
        cam.update(&zoom_in, 0.016);
        assert_eq!(cam.distance, cam.min_distance);

        let zoom_out = InputSnapshot {
            scroll_delta: Vec2::new(0.0, -1000.0),
            ..InputSnapshot::default()
        };
        cam.update(&zoom_out, 0.016);
        assert_eq!(cam.distance, cam.max_distance);
    }

    #[test]
    fn target_is_centred_in_view() {
        let cam = ArcballCamera::new(Vec3::new(0.0, 1.0, 2.0), 3.0);
        let v = cam.view_matrix().transform_point3(cam.target);
        assert!(v.x.abs() < 1e-5 && v.y.abs() < 1e-5);
        assert!((v.z - 3.0).abs() < 1e-5);
    }
}
