/// Initialization parameters for [`GraphicsContext`](super::GraphicsContext).
#[derive(Debug, Clone)]
pub struct GpuInit {
    /// Prefer an sRGB surface format when available.
    ///
    /// Material colours are authored in sRGB and the shader writes linear values.
    pub prefer_srgb: bool,

    /// FIFO is broadly supported and paces the frame loop to the display.
    pub present_mode: wgpu::PresentMode,

    /// If provided but unsupported on the current surface, a supported mode is selected.
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,

    pub required_features: wgpu::Features,
    pub required_limits: wgpu::Limits,

    /// Surface latency hint. Independent of the engine's frames in flight.
    pub desired_maximum_frame_latency: u32,

    /// Format of the depth target recreated on every resize.
    pub depth_format: wgpu::TextureFormat,

    /// Colour the drawable is cleared to before the first draw.
    pub clear_color: wgpu::Color,
}

impl Default for GpuInit {
    fn default() -> Self {
        Self {
            prefer_srgb: true,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: None,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            desired_maximum_frame_latency: 2,
            depth_format: wgpu::TextureFormat::Depth32Float,
            clear_color: wgpu::Color {
                r: 0.02,
                g: 0.02,
                b: 0.03,
                a: 1.0,
            },
        }
    }
}
