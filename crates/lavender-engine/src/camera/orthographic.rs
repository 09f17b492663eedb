use glam::{Mat4, Quat, Vec3};

use super::math;
use super::{Camera, ResponsiveCamera};
use crate::config::InputSettings;
use crate::input::InputSnapshot;

/// Orthographic camera for inspection views. Movement keys pan in the
/// view plane and scroll changes the visible height.
#[derive(Debug, Clone)]
pub struct OrthographicCamera {
    pub origin: Vec3,
    pub orientation: Quat,
    pub aspect: f32,
    /// World units visible from bottom to top of the viewport.
    pub height: f32,
    pub near: f32,
    pub far: f32,
    pub min_height: f32,
    pub max_height: f32,
    pub settings: InputSettings,
}

impl Default for OrthographicCamera {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            aspect: 1.0,
            height: 10.0,
            near: 0.1,
            far: 1000.0,
            min_height: 0.01,
            max_height: 10_000.0,
            settings: InputSettings::default(),
        }
    }
}

impl Camera for OrthographicCamera {
    fn view_matrix(&self) -> Mat4 {
        let forward = self.orientation * Vec3::Z;
        let up = self.orientation * Vec3::Y;
        Mat4::look_at_lh(self.origin, self.origin + forward, up)
    }

    fn projection_matrix(&self) -> Mat4 {
        let half_h = self.height * 0.5;
        let half_w = half_h * self.aspect;
        Mat4::orthographic_lh(-half_w, half_w, -half_h, half_h, self.near, self.far)
    }

    fn resize_viewport(&mut self, width: u32, height: u32) {
        self.aspect = math::aspect_ratio(width, height);
    }
}

impl ResponsiveCamera for OrthographicCamera {
    fn set_input_settings(&mut self, settings: InputSettings) {
        self.settings = settings;
    }

    fn update(&mut self, input: &InputSnapshot, dt: f32) {
        // Pan speed scales with zoom so it feels constant on screen.
        let amount = dt * self.settings.translation_speed * self.height * 0.1;
        self.origin += math::translation(
            input.movement,
            self.orientation * Vec3::Y,
            self.orientation * Vec3::X,
            amount,
        );

        if input.scroll_delta.y != 0.0 {
            let factor = self.settings.scroll_sensitivity.powf(input.scroll_delta.y * 0.1);
            self.height = (self.height / factor).clamp(self.min_height, self.max_height);
        }
    }
}
