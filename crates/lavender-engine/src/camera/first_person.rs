use glam::{Mat4, Quat, Vec3};

use super::math;
use super::{Camera, ResponsiveCamera};
use crate::config::InputSettings;
use crate::input::InputSnapshot;

/// First-person camera. The view is the inverse of the camera's own
/// rigid transform, and mouse look follows the drag direction.
#[derive(Debug, Clone)]
pub struct FirstPersonCamera {
    pub origin: Vec3,
    pub orientation: Quat,
    pub aspect: f32,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    pub settings: InputSettings,
}

impl Default for FirstPersonCamera {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            aspect: 1.0,
            fov_y: 60.0,
            near: 0.1,
            far: 1000.0,
            settings: InputSettings::default(),
        }
    }
}

impl Camera for FirstPersonCamera {
    fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.orientation, self.origin).inverse()
    }

    fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_lh(self.fov_y.to_radians(), self.aspect, self.near, self.far)
    }

    fn resize_viewport(&mut self, width: u32, height: u32) {
        self.aspect = math::aspect_ratio(width, height);
    }
}

impl ResponsiveCamera for FirstPersonCamera {
    fn set_input_settings(&mut self, settings: InputSettings) {
        self.settings = settings;
    }

    fn update(&mut self, input: &InputSnapshot, dt: f32) {
        self.origin += math::translation(
            input.movement,
            math::forward(self.orientation),
            math::right(self.orientation),
            dt * self.settings.translation_speed,
        );

        if input.primary_button_down {
            // Grab-and-drag: the world follows the cursor.
            let s = self.settings.mouse_sensitivity;
            self.orientation =
                math::yaw_pitch(self.orientation, -input.mouse_delta.x * s, input.mouse_delta.y * s);
        }
    }
}
