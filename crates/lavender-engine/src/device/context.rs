use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroU64;
use std::sync::Arc;

use anyhow::{Context, Result};
use winit::dpi::PhysicalSize;
use winit::window::Window;

use super::address::AddressSpace;
use super::backend::{
    AllocationId, BufferAllocation, BufferDesc, BufferId, BufferUsage, FrameBackend, GpuAddress,
    GpuDevice, StorageMode, TextureDesc, TextureHandle, TextureId,
};
use super::forward::{ForwardPipeline, FRAME_GROUP, INSTANCE_GROUP, MATERIAL_GROUP, VERTEX_STREAMS};
use super::surface::{self, DepthTarget};
use super::{DeviceError, GpuInit, SharedEvent, SurfaceErrorAction, WgpuDrawable};
use crate::render::{
    Command, CommandSequence, FillMode, FragmentBindPoint, FrameConstants, IndexFormat,
    InstanceConstants, MaterialFactors, VertexBindPoint, MATERIAL_TEXTURE_SLOTS,
};

struct GpuBuffer {
    buffer: wgpu::Buffer,
    allocation: BufferAllocation,
}

struct GpuTexture {
    view: wgpu::TextureView,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash)]
enum UniformGroup {
    Frame,
    Instance,
}

type MaterialKey = (BufferId, [Option<TextureId>; MATERIAL_TEXTURE_SLOTS]);

/// Buffers, textures and their address mappings.
struct ResourceTable {
    next_buffer: u32,
    next_texture: u32,
    space: AddressSpace,
    buffers: HashMap<BufferId, GpuBuffer>,
    textures: HashMap<TextureId, GpuTexture>,
    resident: HashSet<AllocationId>,
    uniform_groups: HashMap<(BufferId, UniformGroup), wgpu::BindGroup>,
    material_groups: HashMap<MaterialKey, wgpu::BindGroup>,
}

impl ResourceTable {
    fn new() -> Self {
        Self {
            next_buffer: 0,
            next_texture: 0,
            space: AddressSpace::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            resident: HashSet::new(),
            uniform_groups: HashMap::new(),
            material_groups: HashMap::new(),
        }
    }

    /// Resolves `address` into a resident buffer and an offset into it.
    fn resident_buffer(&self, address: GpuAddress, len: u64) -> Result<(&GpuBuffer, u64), DeviceError> {
        let (id, offset) = self
            .space
            .resolve_span(address, len)
            .ok_or(DeviceError::UnmappedAddress(address))?;
        if !self.resident.contains(&AllocationId::Buffer(id)) {
            return Err(DeviceError::NotResident(AllocationId::Buffer(id)));
        }
        let buffer = self.buffers.get(&id).ok_or(DeviceError::UnknownBuffer(id))?;
        Ok((buffer, offset))
    }
}

/// Material binding accumulated until the next indexed draw.
#[derive(Default)]
struct MaterialBinding {
    address: Option<GpuAddress>,
    textures: [Option<TextureId>; MATERIAL_TEXTURE_SLOTS],
}

/// wgpu implementation of the device seam, bound to one window.
///
/// Owns the core wgpu objects, the surface configuration, a depth target and
/// the fixed forward pipeline. Buffers are addressed through an emulated
/// virtual address space; commands carry addresses and are resolved back to
/// `(buffer, offset)` pairs when encoded.
pub struct GraphicsContext<'w> {
    _instance: wgpu::Instance,

    /// Lifetime is tied to the window via `'w`.
    surface: wgpu::Surface<'w>,

    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,

    /// Current drawable size in physical pixels.
    size: PhysicalSize<u32>,

    init: GpuInit,
    depth: DepthTarget,
    forward: ForwardPipeline,
    sampler: wgpu::Sampler,
    /// Bound in texture slots the material leaves empty.
    fallback: wgpu::TextureView,

    resources: RefCell<ResourceTable>,
}

impl<'w> GraphicsContext<'w> {
    /// Creates a context bound to a window.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(window: &'w Window, init: GpuInit) -> Result<Self> {
        let size = window.inner_size();
        anyhow::ensure!(size.width > 0 && size.height > 0, "window has zero size");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .context("failed to create wgpu surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let info = adapter.get_info();
        log::info!("adapter: {} ({:?}, {:?})", info.name, info.backend, info.device_type);

        // Line fill is optional; take it whenever the adapter offers it.
        let features = init.required_features | (adapter.features() & wgpu::Features::POLYGON_MODE_LINE);
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("lavender device"),
                required_features: features,
                required_limits: init.required_limits.clone(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface::choose_surface_format(&surface_caps, init.prefer_srgb)
            .context("no supported surface formats")?;
        let alpha_mode = surface::choose_alpha_mode(&surface_caps, init.alpha_mode);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode: init.present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: init.desired_maximum_frame_latency,
        };
        surface.configure(&device, &config);
        log::info!("surface: {:?} {}x{}", format, size.width, size.height);

        let depth = DepthTarget::new(&device, init.depth_format, size);
        let forward = ForwardPipeline::new(&device, format, init.depth_format);
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("lavender material sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let fallback = white_texture(&device, &queue);

        Ok(Self {
            _instance: instance,
            surface,
            adapter,
            device,
            queue,
            config,
            size,
            init,
            depth,
            forward,
            sampler,
            fallback,
            resources: RefCell::new(ResourceTable::new()),
        })
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Current drawable size (physical pixels).
    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Reconfigures the surface and recreates the depth target.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        let configured = surface::apply_resize(
            &self.surface,
            &self.device,
            &mut self.config,
            &mut self.size,
            new_size,
        );
        if configured {
            self.depth = DepthTarget::new(&self.device, self.init.depth_format, new_size);
        }
    }

    /// Converts a `SurfaceError` into a higher-level action.
    pub fn handle_surface_error(&mut self, err: wgpu::SurfaceError) -> SurfaceErrorAction {
        surface::map_surface_error(&self.surface, &self.device, &self.config, self.size, err)
    }

    fn uniform_group(
        &self,
        table: &mut ResourceTable,
        buffer: BufferId,
        group: UniformGroup,
    ) -> Result<wgpu::BindGroup, DeviceError> {
        if let Some(bg) = table.uniform_groups.get(&(buffer, group)) {
            return Ok(bg.clone());
        }
        let gpu = table.buffers.get(&buffer).ok_or(DeviceError::UnknownBuffer(buffer))?;
        let (layout, size, label) = match group {
            UniformGroup::Frame => (
                &self.forward.frame_layout,
                size_of::<FrameConstants>(),
                "lavender frame constants bg",
            ),
            UniformGroup::Instance => (
                &self.forward.instance_layout,
                size_of::<InstanceConstants>(),
                "lavender instance constants bg",
            ),
        };
        let bg = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &gpu.buffer,
                    offset: 0,
                    size: NonZeroU64::new(size as u64),
                }),
            }],
        });
        table.uniform_groups.insert((buffer, group), bg.clone());
        Ok(bg)
    }

    fn material_group(&self, table: &mut ResourceTable, key: MaterialKey) -> Result<wgpu::BindGroup, DeviceError> {
        if let Some(bg) = table.material_groups.get(&key) {
            return Ok(bg.clone());
        }
        let (buffer, textures) = key;
        let gpu = table.buffers.get(&buffer).ok_or(DeviceError::UnknownBuffer(buffer))?;

        let mut views = Vec::with_capacity(MATERIAL_TEXTURE_SLOTS);
        for slot in textures {
            let view = match slot {
                Some(id) => {
                    &table
                        .textures
                        .get(&id)
                        .ok_or(DeviceError::UnknownAllocation(AllocationId::Texture(id)))?
                        .view
                }
                None => &self.fallback,
            };
            views.push(view);
        }

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &gpu.buffer,
                offset: 0,
                size: NonZeroU64::new(size_of::<MaterialFactors>() as u64),
            }),
        }];
        for (slot, view) in views.into_iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: 1 + slot as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: 1 + MATERIAL_TEXTURE_SLOTS as u32,
            resource: wgpu::BindingResource::Sampler(&self.sampler),
        });

        let bg = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lavender material bg"),
            layout: &self.forward.material_layout,
            entries: &entries,
        });
        table.material_groups.insert(key, bg.clone());
        Ok(bg)
    }

    /// Translates `commands` into one render pass over `drawable`.
    fn encode(&self, commands: &CommandSequence, drawable: &WgpuDrawable) -> Result<wgpu::CommandBuffer, DeviceError> {
        let mut table = self.resources.borrow_mut();
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("lavender frame encoder"),
        });

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("lavender forward pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &drawable.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.init.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            let mut material = MaterialBinding::default();
            for cmd in commands.commands() {
                match cmd {
                    Command::SetRenderPipelineState => rpass.set_pipeline(&self.forward.pipeline),
                    // Depth state and argument tables are part of the pipeline object.
                    Command::SetDepthStencilState | Command::SetArgumentTable(_) => {}
                    Command::SetTriangleFillMode(FillMode::Fill) => rpass.set_pipeline(&self.forward.pipeline),
                    Command::SetTriangleFillMode(FillMode::Lines) => {
                        let wireframe = self
                            .forward
                            .wireframe
                            .as_ref()
                            .ok_or(DeviceError::InvalidCommands("line fill mode is not supported"))?;
                        rpass.set_pipeline(wireframe);
                    }
                    Command::SetVertexAddress { bind_point, address } => match bind_point {
                        VertexBindPoint::FrameConstants | VertexBindPoint::InstanceConstants => {
                            let (group, index, size) = match bind_point {
                                VertexBindPoint::FrameConstants => {
                                    (UniformGroup::Frame, FRAME_GROUP, size_of::<FrameConstants>())
                                }
                                _ => (
                                    UniformGroup::Instance,
                                    INSTANCE_GROUP,
                                    size_of::<InstanceConstants>(),
                                ),
                            };
                            let (id, offset) = {
                                let (buffer, offset) = table.resident_buffer(*address, size as u64)?;
                                (buffer.allocation.id, offset)
                            };
                            let bg = self.uniform_group(&mut table, id, group)?;
                            rpass.set_bind_group(index, &bg, &[dynamic_offset(offset)?]);
                        }
                        VertexBindPoint::VertexBuffer(stream) => {
                            if *stream >= VERTEX_STREAMS {
                                continue;
                            }
                            let (buffer, offset) = table.resident_buffer(*address, 1)?;
                            rpass.set_vertex_buffer(u32::from(*stream), buffer.buffer.slice(offset..));
                        }
                    },
                    Command::SetFragmentAddress {
                        bind_point: FragmentBindPoint::Material,
                        address,
                    } => {
                        material = MaterialBinding {
                            address: Some(*address),
                            ..MaterialBinding::default()
                        };
                    }
                    Command::SetFragmentTexture { slot, texture } => {
                        let id = AllocationId::Texture(*texture);
                        if !table.resident.contains(&id) {
                            return Err(DeviceError::NotResident(id));
                        }
                        material.textures[slot.index()] = Some(*texture);
                    }
                    Command::DrawIndexed {
                        index_count,
                        index_format,
                        index_buffer,
                        index_buffer_length,
                        ..
                    } => {
                        let address = material
                            .address
                            .ok_or(DeviceError::InvalidCommands("draw without a material"))?;
                        let (id, offset) = {
                            let (buffer, offset) =
                                table.resident_buffer(address, size_of::<MaterialFactors>() as u64)?;
                            (buffer.allocation.id, offset)
                        };
                        let bg = self.material_group(&mut table, (id, material.textures))?;
                        rpass.set_bind_group(MATERIAL_GROUP, &bg, &[dynamic_offset(offset)?]);

                        let (buffer, offset) = table.resident_buffer(*index_buffer, *index_buffer_length)?;
                        let format = match index_format {
                            IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
                            IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
                        };
                        rpass.set_index_buffer(
                            buffer.buffer.slice(offset..offset + *index_buffer_length),
                            format,
                        );
                        rpass.draw_indexed(0..*index_count, 0, 0..1);
                    }
                }
            }
        }

        Ok(encoder.finish())
    }
}

impl GpuDevice for GraphicsContext<'_> {
    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<BufferAllocation, DeviceError> {
        let length = desc.size.max(wgpu::COPY_BUFFER_ALIGNMENT).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        if length > self.device.limits().max_buffer_size {
            return Err(DeviceError::AllocationFailed {
                label: desc.label.to_string(),
                size: length,
            });
        }
        let usage = match desc.usage {
            BufferUsage::Uniform => wgpu::BufferUsages::UNIFORM,
            BufferUsage::Vertex => wgpu::BufferUsages::VERTEX,
            BufferUsage::Index => wgpu::BufferUsages::INDEX,
        } | wgpu::BufferUsages::COPY_DST;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label),
            size: length,
            usage,
            mapped_at_creation: false,
        });

        let mut table = self.resources.borrow_mut();
        let id = BufferId(table.next_buffer);
        table.next_buffer += 1;
        let allocation = BufferAllocation {
            id,
            gpu_address: table.space.reserve(id, length),
            length,
            storage: desc.storage,
        };
        table.buffers.insert(id, GpuBuffer { buffer, allocation });
        log::trace!("buffer '{}' {:?} at {:?} ({} bytes)", desc.label, id, allocation.gpu_address, length);
        Ok(allocation)
    }

    fn write_buffer(&self, buffer: BufferId, offset: u64, bytes: &[u8]) -> Result<(), DeviceError> {
        let table = self.resources.borrow();
        let gpu = table.buffers.get(&buffer).ok_or(DeviceError::UnknownBuffer(buffer))?;
        if gpu.allocation.storage == StorageMode::Private {
            return Err(DeviceError::PrivateStorage(buffer));
        }
        if offset + bytes.len() as u64 > gpu.allocation.length {
            return Err(DeviceError::WriteOutOfBounds {
                buffer,
                offset,
                len: bytes.len(),
                length: gpu.allocation.length,
            });
        }
        self.queue.write_buffer(&gpu.buffer, offset, bytes);
        Ok(())
    }

    fn release_buffer(&self, buffer: BufferId) {
        let mut table = self.resources.borrow_mut();
        if let Some(gpu) = table.buffers.remove(&buffer) {
            table.space.release(gpu.allocation.gpu_address);
            table.resident.remove(&AllocationId::Buffer(buffer));
            table.uniform_groups.retain(|(id, _), _| *id != buffer);
            table.material_groups.retain(|(id, _), _| *id != buffer);
            gpu.buffer.destroy();
        }
    }

    fn create_texture(&self, desc: &TextureDesc<'_>, rgba8: &[u8]) -> Result<TextureHandle, DeviceError> {
        let expected = desc.width as usize * desc.height as usize * 4;
        if rgba8.len() != expected {
            return Err(DeviceError::TextureSize {
                expected,
                actual: rgba8.len(),
            });
        }
        let format = if desc.srgb {
            wgpu::TextureFormat::Rgba8UnormSrgb
        } else {
            wgpu::TextureFormat::Rgba8Unorm
        };
        let view = upload_rgba8(
            &self.device,
            &self.queue,
            desc.label,
            desc.width,
            desc.height,
            format,
            rgba8,
        );

        let mut table = self.resources.borrow_mut();
        let id = TextureId(table.next_texture);
        table.next_texture += 1;
        table.textures.insert(id, GpuTexture { view });
        Ok(TextureHandle {
            id,
            width: desc.width,
            height: desc.height,
        })
    }

    fn make_resident(&self, allocations: &[AllocationId]) -> Result<(), DeviceError> {
        let mut table = self.resources.borrow_mut();
        for id in allocations {
            let known = match id {
                AllocationId::Buffer(b) => table.buffers.contains_key(b),
                AllocationId::Texture(t) => table.textures.contains_key(t),
            };
            if !known {
                return Err(DeviceError::UnknownAllocation(*id));
            }
        }
        table.resident = allocations.iter().copied().collect();
        Ok(())
    }

    fn signal_event(&self, event: &Arc<SharedEvent>, value: u64) {
        let event = Arc::clone(event);
        self.queue.on_submitted_work_done(move || event.signal(value));
    }

    fn poll(&self) {
        if let Err(err) = self.device.poll(wgpu::PollType::Poll) {
            log::warn!("device poll failed: {err}");
        }
    }

    fn min_uniform_alignment(&self) -> u64 {
        u64::from(self.device.limits().min_uniform_buffer_offset_alignment)
    }

    fn supports_line_fill(&self) -> bool {
        self.forward.wireframe.is_some()
    }
}

impl FrameBackend for GraphicsContext<'_> {
    type Drawable = WgpuDrawable;

    fn acquire_drawable(&mut self) -> Result<Option<WgpuDrawable>, DeviceError> {
        if self.size.width == 0 || self.size.height == 0 {
            return Ok(None);
        }
        match self.surface.get_current_texture() {
            Ok(surface_texture) => {
                let view = surface_texture
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                Ok(Some(WgpuDrawable {
                    surface_texture,
                    view,
                }))
            }
            Err(err) => match self.handle_surface_error(err) {
                SurfaceErrorAction::Reconfigured | SurfaceErrorAction::SkipFrame => Ok(None),
                SurfaceErrorAction::Fatal => Err(DeviceError::SurfaceLost),
            },
        }
    }

    fn submit(&mut self, commands: &CommandSequence, drawable: WgpuDrawable) -> Result<(), DeviceError> {
        if commands.is_open() {
            return Err(DeviceError::InvalidCommands("command sequence was not ended"));
        }
        let buffer = self.encode(commands, &drawable)?;
        self.queue.submit(std::iter::once(buffer));
        drawable.surface_texture.present();
        Ok(())
    }
}

/// Narrows a buffer offset to the `u32` wgpu takes for dynamic offsets.
fn dynamic_offset(offset: u64) -> Result<u32, DeviceError> {
    u32::try_from(offset).map_err(|_| DeviceError::OffsetOutOfRange(offset))
}

fn upload_rgba8(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    rgba8: &[u8],
) -> wgpu::TextureView {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        rgba8,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn white_texture(device: &wgpu::Device, queue: &wgpu::Queue) -> wgpu::TextureView {
    upload_rgba8(
        device,
        queue,
        "lavender fallback texture",
        1,
        1,
        wgpu::TextureFormat::Rgba8Unorm,
        &[255; 4],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── dynamic offsets ───────────────────────────────────────────────────

    #[test]
    fn dynamic_offsets_within_u32_pass_through() {
        assert_eq!(dynamic_offset(0).unwrap(), 0);
        assert_eq!(dynamic_offset(256 * 1024).unwrap(), 256 * 1024);
        assert_eq!(dynamic_offset(u64::from(u32::MAX)).unwrap(), u32::MAX);
    }

    #[test]
    fn dynamic_offsets_past_u32_are_rejected() {
        let offset = u64::from(u32::MAX) + 256;
        assert!(matches!(
            dynamic_offset(offset),
            Err(DeviceError::OffsetOutOfRange(o)) if o == offset
        ));
    }
}
