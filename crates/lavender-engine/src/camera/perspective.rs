use glam::{Mat4, Quat, Vec3};

use super::math;
use super::{Camera, ResponsiveCamera};
use crate::config::InputSettings;
use crate::input::InputSnapshot;

/// Free-flying perspective camera: WASD moves, primary-button drag looks.
#[derive(Debug, Clone)]
pub struct PerspectiveCamera {
    pub origin: Vec3,
    pub orientation: Quat,
    pub aspect: f32,
    /// Vertical field of view in degrees.
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    pub settings: InputSettings,
}

impl Default for PerspectiveCamera {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            aspect: 1.0,
            fov_y: 70.0,
            near: 0.1,
            far: 1000.0,
            settings: InputSettings::default(),
        }
    }
}

impl PerspectiveCamera {
    pub fn new(origin: Vec3, settings: InputSettings) -> Self {
        Self {
            origin,
            settings,
            ..Self::default()
        }
    }
}

impl Camera for PerspectiveCamera {
    fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_lh(self.origin, self.origin + math::forward(self.orientation), Vec3::Y)
    }

    fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_lh(self.fov_y.to_radians(), self.aspect, self.near, self.far)
    }

    fn resize_viewport(&mut self, width: u32, height: u32) {
        self.aspect = math::aspect_ratio(width, height);
    }
}

impl ResponsiveCamera for PerspectiveCamera {
    fn set_input_settings(&mut self, settings: InputSettings) {
        self.settings = settings;
    }

    fn update(&mut self, input: &InputSnapshot, dt: f32) {
        let amount = dt * self.settings.translation_speed;
        self.origin += math::translation(
            input.movement,
            math::forward(self.orientation),
            math::right(self.orientation),
            amount,
        );

        if input.primary_button_down {
            let s = self.settings.mouse_sensitivity;
            self.orientation =
                math::yaw_pitch(self.orientation, input.mouse_delta.x * s, -input.mouse_delta.y * s);
        }
    }
}
