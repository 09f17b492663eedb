//! The engine: a scene, the frame pipeline that draws it, and the camera it
//! is drawn through.

use crate::camera::ResponsiveCamera;
use crate::config::EngineConfig;
use crate::device::{FrameBackend, GpuDevice};
use crate::input::InputSnapshot;
use crate::render::{FillMode, FrameError, FrameOutcome, FramePipeline};
use crate::scene::{Renderable, Scene};

pub struct Engine {
    pipeline: FramePipeline,
    scene: Scene,
    camera: Box<dyn ResponsiveCamera>,
}

impl Engine {
    pub fn new(
        device: &dyn GpuDevice,
        config: EngineConfig,
        mut camera: Box<dyn ResponsiveCamera>,
    ) -> Result<Self, FrameError> {
        camera.set_input_settings(config.input);
        let mut pipeline = FramePipeline::new(device, &config)?;
        pipeline.commit_residency(device)?;
        Ok(Self {
            pipeline,
            scene: Scene::new(),
            camera,
        })
    }

    /// Adds a renderable and makes everything it draws with resident.
    ///
    /// Returns its index in the scene.
    pub fn add_renderable(
        &mut self,
        device: &dyn GpuDevice,
        renderable: impl Into<Renderable>,
    ) -> Result<usize, FrameError> {
        let mut renderable = renderable.into();
        self.pipeline.register_renderable(device, &mut renderable)?;
        self.pipeline.commit_residency(device)?;
        Ok(self.scene.add(renderable))
    }

    /// Runs one frame: applies input to the camera, then renders.
    pub fn tick<B: FrameBackend>(
        &mut self,
        backend: &mut B,
        input: &InputSnapshot,
        dt: f32,
    ) -> Result<FrameOutcome, FrameError> {
        self.camera.update(input, dt);
        self.pipeline.render_frame(backend, &self.scene, &*self.camera)
    }

    /// Switches between shaded and wireframe rendering from the next tick on.
    pub fn set_fill_mode(&mut self, device: &dyn GpuDevice, mode: FillMode) -> Result<(), FrameError> {
        self.pipeline.set_fill_mode(device, mode)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.camera.resize_viewport(width, height);
    }

    #[inline]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Mutable access for transform animation. Renderables cannot be removed.
    #[inline]
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    #[inline]
    pub fn pipeline(&self) -> &FramePipeline {
        &self.pipeline
    }

    #[inline]
    pub fn camera(&self) -> &dyn ResponsiveCamera {
        &*self.camera
    }

    /// Swaps the camera. The configured input settings carry over.
    pub fn set_camera(&mut self, mut camera: Box<dyn ResponsiveCamera>) {
        camera.set_input_settings(self.pipeline.config().input);
        self.camera = camera;
    }
}
