//! Cameras.
//!
//! Every camera produces a left-handed view matrix and a projection with
//! depth in `[0, 1]`. Responsive cameras also consume one
//! [`InputSnapshot`] per frame.

mod arcball;
mod first_person;
pub mod math;
mod orthographic;
mod perspective;

use glam::Mat4;

use crate::config::InputSettings;
use crate::input::InputSnapshot;

pub use arcball::ArcballCamera;
pub use first_person::FirstPersonCamera;
pub use orthographic::OrthographicCamera;
pub use perspective::PerspectiveCamera;

pub trait Camera {
    fn view_matrix(&self) -> Mat4;
    fn projection_matrix(&self) -> Mat4;

    /// Called when the drawable size changes.
    fn resize_viewport(&mut self, width: u32, height: u32);
}

/// A camera driven by user input.
pub trait ResponsiveCamera: Camera {
    /// Replaces the speed and sensitivity the camera reacts with.
    fn set_input_settings(&mut self, settings: InputSettings);

    /// `dt` is the frame delta in seconds.
    fn update(&mut self, input: &InputSnapshot, dt: f32);
}
