/// A swapchain image acquired for one frame.
///
/// Holding it blocks acquisition of further images, so it must be handed to
/// [`FrameBackend::submit`](super::FrameBackend::submit) in the same tick.
pub struct WgpuDrawable {
    pub(crate) surface_texture: wgpu::SurfaceTexture,
    pub(crate) view: wgpu::TextureView,
}

impl WgpuDrawable {
    pub fn size(&self) -> (u32, u32) {
        let t = &self.surface_texture.texture;
        (t.width(), t.height())
    }
}
