use std::num::NonZeroU64;

use crate::render::{FrameConstants, InstanceConstants, MaterialFactors, MATERIAL_TEXTURE_SLOTS};
use crate::scene::Vertex;

/// The fixed forward pipeline and the bind group layouts its bind groups use.
pub(crate) struct ForwardPipeline {
    pub(crate) pipeline: wgpu::RenderPipeline,
    /// Line-rasterized twin of `pipeline`. Present only when the device has
    /// `POLYGON_MODE_LINE`.
    pub(crate) wireframe: Option<wgpu::RenderPipeline>,
    pub(crate) frame_layout: wgpu::BindGroupLayout,
    pub(crate) instance_layout: wgpu::BindGroupLayout,
    pub(crate) material_layout: wgpu::BindGroupLayout,
}

pub(crate) const FRAME_GROUP: u32 = 0;
pub(crate) const INSTANCE_GROUP: u32 = 1;
pub(crate) const MATERIAL_GROUP: u32 = 2;

/// Vertex streams the pipeline declares.
pub(crate) const VERTEX_STREAMS: u8 = 1;

const VERTEX_ATTRS: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
    0 => Float32x3, // position
    1 => Float32x3, // normal
    2 => Float32x2  // uv
];

impl ForwardPipeline {
    pub(crate) fn new(
        device: &wgpu::Device,
        color_format: wgpu::TextureFormat,
        depth_format: wgpu::TextureFormat,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("lavender forward shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/forward.wgsl").into()),
        });

        let frame_layout = uniform_layout(
            device,
            "lavender frame constants bgl",
            wgpu::ShaderStages::VERTEX_FRAGMENT,
            size_of::<FrameConstants>(),
        );
        let instance_layout = uniform_layout(
            device,
            "lavender instance constants bgl",
            wgpu::ShaderStages::VERTEX,
            size_of::<InstanceConstants>(),
        );

        let mut material_entries = vec![dynamic_uniform_entry(
            0,
            wgpu::ShaderStages::FRAGMENT,
            size_of::<MaterialFactors>(),
        )];
        for slot in 0..MATERIAL_TEXTURE_SLOTS as u32 {
            material_entries.push(wgpu::BindGroupLayoutEntry {
                binding: 1 + slot,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        material_entries.push(wgpu::BindGroupLayoutEntry {
            binding: 1 + MATERIAL_TEXTURE_SLOTS as u32,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
        let material_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lavender material bgl"),
            entries: &material_entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("lavender forward pipeline layout"),
            bind_group_layouts: &[&frame_layout, &instance_layout, &material_layout],
            immediate_size: 0,
        });

        let targets = Targets {
            layout: &pipeline_layout,
            shader: &shader,
            color_format,
            depth_format,
        };
        let pipeline = targets.build(device, "lavender forward pipeline", wgpu::PolygonMode::Fill);
        let wireframe = device
            .features()
            .contains(wgpu::Features::POLYGON_MODE_LINE)
            .then(|| targets.build(device, "lavender wireframe pipeline", wgpu::PolygonMode::Line));
        if wireframe.is_none() {
            log::debug!("POLYGON_MODE_LINE unavailable; wireframe disabled");
        }

        Self {
            pipeline,
            wireframe,
            frame_layout,
            instance_layout,
            material_layout,
        }
    }
}

/// Everything the fill and wireframe pipelines share.
struct Targets<'a> {
    layout: &'a wgpu::PipelineLayout,
    shader: &'a wgpu::ShaderModule,
    color_format: wgpu::TextureFormat,
    depth_format: wgpu::TextureFormat,
}

impl Targets<'_> {
    fn build(
        &self,
        device: &wgpu::Device,
        label: &str,
        polygon_mode: wgpu::PolygonMode,
    ) -> wgpu::RenderPipeline {
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(self.layout),
            vertex: wgpu::VertexState {
                module: self.shader,
                entry_point: Some("vertex_main"),
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: Vertex::STRIDE,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &VERTEX_ATTRS,
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: self.shader,
                entry_point: Some("fragment_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.color_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Cw,
                // Open meshes (the cone) must show their inside.
                cull_mode: None,
                polygon_mode,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: self.depth_format,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        })
    }
}

fn dynamic_uniform_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    size: usize,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: true,
            min_binding_size: NonZeroU64::new(size as u64),
        },
        count: None,
    }
}

fn uniform_layout(
    device: &wgpu::Device,
    label: &str,
    visibility: wgpu::ShaderStages,
    size: usize,
) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[dynamic_uniform_entry(0, visibility, size)],
    })
}
