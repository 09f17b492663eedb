//! Per-frame scheduling: slot selection, fence wait, command recording,
//! submission and fence signal.

use std::mem;

use thiserror::Error;

use super::{
    Command, CommandAllocator, CommandSequence, FillMode, FragmentBindPoint, FrameConstants,
    FrameFence, InstanceConstants, MaterialTable, ResidencyError, ResidencySet, ShaderStage,
    VertexBindPoint, WaitOutcome,
};
use crate::camera::Camera;
use crate::config::{ConfigError, EngineConfig, FenceWaitPolicy, InstanceGrowth};
use crate::device::{AllocationId, DeviceError, FrameBackend, GpuDevice};
use crate::memory::{AlignedArena, ArenaError, DynamicScope, MultiBufferedArena, Slice};
use crate::scene::{DrawCall, Renderable, Scene};

#[derive(Debug, Error)]
pub enum FrameError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Arena(#[from] ArenaError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Residency(#[from] ResidencyError),

    #[error("{draws} draw calls exceed the per-frame instance capacity of {capacity}")]
    InstanceOverflow { draws: usize, capacity: usize },

    #[error("frame {frame_number}: GPU stalled for {consecutive} consecutive fence waits")]
    GpuStalled { frame_number: u64, consecutive: u32 },

    #[error("draw references non-resident allocation {0:?}")]
    NotResident(AllocationId),

    #[error("material '{0}' was drawn before being registered")]
    UnregisteredMaterial(String),

    #[error("device cannot rasterize with fill mode {0:?}")]
    UnsupportedFillMode(FillMode),
}

/// What happened to one call of [`FramePipeline::render_frame`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameOutcome {
    /// No drawable this tick. No frame number was consumed.
    Skipped,
    Submitted {
        frame_number: u64,
        frame_index: usize,
        /// Indexed draws recorded.
        draw_count: usize,
        wait: WaitOutcome,
    },
}

/// Owns every per-frame resource and drives one frame per call.
///
/// Frame `n` records into slot `n % frames_in_flight`. Before touching a
/// slot the pipeline waits for the frame that used it last, so CPU writes
/// never race GPU reads of the same slot.
#[derive(Debug)]
pub struct FramePipeline {
    config: EngineConfig,
    fence: FrameFence,
    frame_constants: MultiBufferedArena<FrameConstants>,
    instance_constants: MultiBufferedArena<InstanceConstants>,
    materials: MaterialTable,
    residency: ResidencySet,
    allocators: Vec<CommandAllocator>,
    /// Grown-out instance arenas, tagged with the last frame that used them.
    retired: Vec<(u64, AlignedArena<InstanceConstants>)>,
    consecutive_timeouts: u32,
    fill_mode: FillMode,
}

impl FramePipeline {
    pub fn new(device: &dyn GpuDevice, config: &EngineConfig) -> Result<Self, FrameError> {
        config.validate()?;
        let frames = config.frames_in_flight;
        let alignment = config.constants_alignment.max(device.min_uniform_alignment());

        let frame_constants = MultiBufferedArena::create(
            device,
            "frame constants",
            frames,
            DynamicScope::PerFrame,
            1,
            alignment,
        )?;
        let instance_constants = MultiBufferedArena::create(
            device,
            "instance constants",
            frames,
            DynamicScope::PerInstance {
                max_draws_per_frame: config.max_draws_per_frame,
            },
            1,
            alignment,
        )?;
        let materials = MaterialTable::new(device, config.material_capacity, alignment)?;

        let mut residency = ResidencySet::new();
        residency.add_allocations(frame_constants.allocations());
        residency.add_allocations(instance_constants.allocations());
        residency.add_allocation(materials.allocation_id());

        log::info!(
            "frame pipeline: {} frames in flight, {} draws per frame, {} materials",
            frames,
            config.max_draws_per_frame,
            config.material_capacity
        );

        Ok(Self {
            config: config.clone(),
            fence: FrameFence::new(config.fence_timeout),
            frame_constants,
            instance_constants,
            materials,
            residency,
            allocators: (0..frames).map(|_| CommandAllocator::new()).collect(),
            retired: Vec::new(),
            consecutive_timeouts: 0,
            fill_mode: FillMode::Fill,
        })
    }

    /// Binds the renderable's materials and stages its allocations for
    /// residency. Takes effect on the next commit.
    pub fn register_renderable(
        &mut self,
        device: &dyn GpuDevice,
        renderable: &mut Renderable,
    ) -> Result<(), FrameError> {
        for material in renderable.materials_mut() {
            self.materials.register(material)?;
        }
        self.materials.flush(device)?;
        self.residency.add_allocations(renderable.resources());
        log::debug!("registered '{}'", renderable.name());
        Ok(())
    }

    /// Rasterization mode recorded into every following frame.
    pub fn set_fill_mode(&mut self, device: &dyn GpuDevice, mode: FillMode) -> Result<(), FrameError> {
        if mode == FillMode::Lines && !device.supports_line_fill() {
            return Err(FrameError::UnsupportedFillMode(mode));
        }
        if mode != self.fill_mode {
            log::debug!("fill mode {:?} -> {:?}", self.fill_mode, mode);
        }
        self.fill_mode = mode;
        Ok(())
    }

    #[inline]
    pub fn fill_mode(&self) -> FillMode {
        self.fill_mode
    }

    pub fn commit_residency(&mut self, device: &dyn GpuDevice) -> Result<(), FrameError> {
        self.residency.commit(device)?;
        Ok(())
    }

    /// Renders `scene` as seen by `camera` into the backend's next drawable.
    pub fn render_frame<B: FrameBackend, C: Camera + ?Sized>(
        &mut self,
        backend: &mut B,
        scene: &Scene,
        camera: &C,
    ) -> Result<FrameOutcome, FrameError> {
        let draws = scene.draw_calls();
        self.prepare(&*backend, &draws)?;

        let Some(drawable) = backend.acquire_drawable()? else {
            log::trace!("frame {}: no drawable, skipping", self.fence.frame_number() + 1);
            return Ok(FrameOutcome::Skipped);
        };

        let frame_number = self.fence.advance();
        let frame_index = self.frame_index(frame_number);
        let wait = self
            .fence
            .wait_if_necessary(&*backend, frame_number, self.frames_in_flight());

        let result = self.encode_and_submit(backend, drawable, frame_number, frame_index, &draws, camera, wait);
        // Every consumed frame number gets a signal, submitted or not.
        self.fence.signal(&*backend, frame_number);

        let draw_count = result?;
        Ok(FrameOutcome::Submitted {
            frame_number,
            frame_index,
            draw_count,
            wait,
        })
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn fence(&self) -> &FrameFence {
        &self.fence
    }

    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.fence.frame_number()
    }

    #[inline]
    pub fn residency(&self) -> &ResidencySet {
        &self.residency
    }

    #[inline]
    pub fn materials(&self) -> &MaterialTable {
        &self.materials
    }

    #[inline]
    pub fn frame_constants(&self) -> &MultiBufferedArena<FrameConstants> {
        &self.frame_constants
    }

    #[inline]
    pub fn instance_constants(&self) -> &MultiBufferedArena<InstanceConstants> {
        &self.instance_constants
    }

    /// Last command sequence recorded for `frame_index`.
    pub fn commands(&self, frame_index: usize) -> Option<&CommandSequence> {
        self.allocators.get(frame_index).map(CommandAllocator::sequence)
    }

    /// Grown-out arenas waiting for their last frame to retire.
    pub fn retired_arenas(&self) -> usize {
        self.retired.len()
    }

    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts
    }

    fn frames_in_flight(&self) -> u64 {
        self.config.frames_in_flight as u64
    }

    fn frame_index(&self, frame_number: u64) -> usize {
        (frame_number % self.frames_in_flight()) as usize
    }

    /// Checks that can reject the frame before a frame number is consumed.
    fn prepare(&mut self, device: &dyn GpuDevice, draws: &[DrawCall<'_>]) -> Result<(), FrameError> {
        device.poll();
        self.release_retired(device);

        if self.config.instance_growth == InstanceGrowth::Fixed {
            let next_index = self.frame_index(self.fence.frame_number() + 1);
            let capacity = self.instance_constants.instance_capacity(next_index)?;
            if draws.len() > capacity {
                return Err(FrameError::InstanceOverflow {
                    draws: draws.len(),
                    capacity,
                });
            }
        }

        self.residency.commit(device)?;
        for draw in draws {
            if let Some(id) = draw.mesh.resources().find(|id| !self.residency.is_resident(*id)) {
                return Err(FrameError::NotResident(id));
            }
            let unbound = draw
                .mesh
                .submeshes
                .iter()
                .filter_map(|s| s.material.as_ref())
                .find(|m| m.binding().is_none());
            if let Some(material) = unbound {
                return Err(FrameError::UnregisteredMaterial(material.name.clone()));
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn encode_and_submit<B: FrameBackend, C: Camera + ?Sized>(
        &mut self,
        backend: &mut B,
        drawable: B::Drawable,
        frame_number: u64,
        frame_index: usize,
        draws: &[DrawCall<'_>],
        camera: &C,
        wait: WaitOutcome,
    ) -> Result<usize, FrameError> {
        self.apply_wait_policy(frame_number, wait)?;
        self.ensure_instance_capacity(&*backend, frame_number, frame_index, draws.len())?;
        let draw_count = self.record(&*backend, frame_number, frame_index, draws, camera)?;
        backend.submit(self.allocators[frame_index].sequence(), drawable)?;
        Ok(draw_count)
    }

    fn apply_wait_policy(&mut self, frame_number: u64, wait: WaitOutcome) -> Result<(), FrameError> {
        if wait != WaitOutcome::TimedOut {
            self.consecutive_timeouts = 0;
            return Ok(());
        }
        self.consecutive_timeouts += 1;
        if let FenceWaitPolicy::FailAfter(limit) = self.config.fence_policy {
            if self.consecutive_timeouts >= limit {
                return Err(FrameError::GpuStalled {
                    frame_number,
                    consecutive: self.consecutive_timeouts,
                });
            }
        }
        Ok(())
    }

    /// Grows the slot being recorded. The fence wait has already cleared it,
    /// and the old buffer stays resident until its last frame retires.
    fn ensure_instance_capacity(
        &mut self,
        device: &dyn GpuDevice,
        frame_number: u64,
        frame_index: usize,
        draws: usize,
    ) -> Result<(), FrameError> {
        let capacity = self.instance_constants.instance_capacity(frame_index)?;
        if draws <= capacity {
            return Ok(());
        }
        if self.config.instance_growth == InstanceGrowth::Fixed {
            return Err(FrameError::InstanceOverflow { draws, capacity });
        }
        if let Some(old) = self.instance_constants.grow_instances(device, frame_index, draws)? {
            let last_use = frame_number.saturating_sub(self.frames_in_flight());
            self.retired.push((last_use, old));
        }
        let grown = self.instance_constants.arena(frame_index)?.allocation_id();
        self.residency.add_allocation(grown);
        self.residency.commit(device)?;
        Ok(())
    }

    fn release_retired(&mut self, device: &dyn GpuDevice) {
        if self.retired.is_empty() {
            return;
        }
        let signaled = self.fence.signaled_value();
        let (ready, waiting): (Vec<_>, Vec<_>) = mem::take(&mut self.retired)
            .into_iter()
            .partition(|(last_use, _)| *last_use <= signaled);
        self.retired = waiting;
        for (last_use, arena) in ready {
            log::debug!(
                "releasing retired instance arena {:?} (last used by frame {})",
                arena.allocation().id,
                last_use
            );
            self.residency.evict(arena.allocation_id());
            arena.release(device);
        }
    }

    fn record<C: Camera + ?Sized>(
        &mut self,
        device: &dyn GpuDevice,
        frame_number: u64,
        frame_index: usize,
        draws: &[DrawCall<'_>],
        camera: &C,
    ) -> Result<usize, FrameError> {
        let frame_slice = Slice::frame(frame_index);
        self.frame_constants.write_at(
            frame_slice,
            0,
            &FrameConstants {
                view: camera.view_matrix(),
                projection: camera.projection_matrix(),
            },
        )?;
        let frame_address = self.frame_constants.address_at(frame_slice, 0)?;
        let default_material = self.materials.default_address();

        let allocator = &mut self.allocators[frame_index];
        allocator.reset();
        let seq = allocator.begin(frame_number, frame_index);

        seq.push(Command::SetRenderPipelineState);
        seq.push(Command::SetDepthStencilState);
        seq.push(Command::SetArgumentTable(ShaderStage::Vertex));
        seq.push(Command::SetArgumentTable(ShaderStage::Fragment));
        seq.push(Command::SetTriangleFillMode(self.fill_mode));
        seq.push(Command::SetVertexAddress {
            bind_point: VertexBindPoint::FrameConstants,
            address: frame_address,
        });

        for (instance, draw) in draws.iter().enumerate() {
            let slice = Slice::instance(frame_index, instance);
            self.instance_constants.write_at(
                slice,
                0,
                &InstanceConstants {
                    model: draw.model_matrix,
                },
            )?;
            seq.push(Command::SetVertexAddress {
                bind_point: VertexBindPoint::InstanceConstants,
                address: self.instance_constants.address_at(slice, 0)?,
            });

            for (stream, buffer) in draw.mesh.vertex_buffers.iter().enumerate() {
                seq.push(Command::SetVertexAddress {
                    bind_point: VertexBindPoint::VertexBuffer(stream as u8),
                    address: buffer.gpu_address,
                });
            }

            for submesh in &draw.mesh.submeshes {
                let material_address = match &submesh.material {
                    Some(m) => m
                        .binding()
                        .ok_or_else(|| FrameError::UnregisteredMaterial(m.name.clone()))?,
                    None => default_material,
                };
                seq.push(Command::SetFragmentAddress {
                    bind_point: FragmentBindPoint::Material,
                    address: material_address,
                });
                if let Some(material) = &submesh.material {
                    for (slot, texture) in material.textures() {
                        seq.push(Command::SetFragmentTexture {
                            slot,
                            texture: texture.id,
                        });
                    }
                }
                seq.push(Command::DrawIndexed {
                    primitive: submesh.primitive,
                    index_count: submesh.index_count,
                    index_format: submesh.index_format,
                    index_buffer: submesh.index_buffer.gpu_address,
                    index_buffer_length: submesh.index_buffer.length,
                });
            }
        }
        seq.end();
        let draw_count = seq.draw_count();

        self.frame_constants.flush(device, frame_index)?;
        self.instance_constants.flush(device, frame_index)?;
        self.materials.flush(device)?;
        Ok(draw_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PerspectiveCamera;
    use crate::device::{Completion, HeadlessDevice, TextureDesc};
    use crate::render::MaterialTexture;
    use crate::scene::{Material, Polytope};
    use glam::{Affine3A, Vec3};
    use std::thread;
    use std::time::Duration;

    fn small_config() -> EngineConfig {
        EngineConfig {
            max_draws_per_frame: 8,
            material_capacity: 16,
            ..EngineConfig::default()
        }
    }

    fn scene_of(dev: &HeadlessDevice, pipeline: &mut FramePipeline, count: usize) -> Scene {
        let mut scene = Scene::new();
        for i in 0..count {
            let material = Material::with_base_color(Vec3::new(i as f32 * 0.1, 0.5, 0.5));
            let mesh = Polytope::Box
                .mesh(dev, Some(material))
                .unwrap()
                .with_transform(Affine3A::from_translation(Vec3::X * i as f32));
            let mut renderable = Renderable::from(mesh);
            pipeline.register_renderable(dev, &mut renderable).unwrap();
            scene.add(renderable);
        }
        scene
    }

    fn submitted(outcome: FrameOutcome) -> (u64, usize, WaitOutcome) {
        match outcome {
            FrameOutcome::Submitted {
                frame_number,
                frame_index,
                wait,
                ..
            } => (frame_number, frame_index, wait),
            FrameOutcome::Skipped => panic!("frame was skipped"),
        }
    }

    // ── scheduling ────────────────────────────────────────────────────────

    #[test]
    fn missing_drawable_skips_without_consuming_a_frame() {
        let mut dev = HeadlessDevice::new();
        let mut pipeline = FramePipeline::new(&dev, &small_config()).unwrap();
        let scene = scene_of(&dev, &mut pipeline, 1);
        let camera = PerspectiveCamera::default();

        dev.set_drawable_available(false);
        let outcome = pipeline.render_frame(&mut dev, &scene, &camera).unwrap();
        assert_eq!(outcome, FrameOutcome::Skipped);
        assert_eq!(pipeline.frame_number(), 0);
        assert_eq!(dev.submission_count(), 0);

        dev.set_drawable_available(true);
        let (n, idx, _) = submitted(pipeline.render_frame(&mut dev, &scene, &camera).unwrap());
        assert_eq!((n, idx), (1, 1));
        assert_eq!(pipeline.fence().signaled_value(), 1);
    }

    #[test]
    fn frame_slots_rotate_modulo_frames_in_flight() {
        let mut dev = HeadlessDevice::new();
        let mut pipeline = FramePipeline::new(&dev, &small_config()).unwrap();
        let scene = scene_of(&dev, &mut pipeline, 2);
        let camera = PerspectiveCamera::default();

        let slots: Vec<usize> = (0..5)
            .map(|_| submitted(pipeline.render_frame(&mut dev, &scene, &camera).unwrap()).1)
            .collect();
        assert_eq!(slots, vec![1, 2, 0, 1, 2]);

        let frames = dev.submissions();
        assert_eq!(frames.len(), 5);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.frame_number, i as u64 + 1);
        }
    }

    #[test]
    fn commands_are_recorded_in_pipeline_order() {
        let mut dev = HeadlessDevice::new();
        let mut pipeline = FramePipeline::new(&dev, &small_config()).unwrap();
        let scene = scene_of(&dev, &mut pipeline, 1);
        let camera = PerspectiveCamera::default();
        pipeline.render_frame(&mut dev, &scene, &camera).unwrap();

        let cmds = dev.submissions().remove(0).commands;
        assert_eq!(cmds.len(), 10);
        assert_eq!(cmds[0], Command::SetRenderPipelineState);
        assert_eq!(cmds[1], Command::SetDepthStencilState);
        assert_eq!(cmds[2], Command::SetArgumentTable(ShaderStage::Vertex));
        assert_eq!(cmds[3], Command::SetArgumentTable(ShaderStage::Fragment));
        assert_eq!(cmds[4], Command::SetTriangleFillMode(FillMode::Fill));
        assert!(matches!(
            cmds[5],
            Command::SetVertexAddress {
                bind_point: VertexBindPoint::FrameConstants,
                ..
            }
        ));
        assert!(matches!(
            cmds[6],
            Command::SetVertexAddress {
                bind_point: VertexBindPoint::InstanceConstants,
                ..
            }
        ));
        assert!(matches!(
            cmds[7],
            Command::SetVertexAddress {
                bind_point: VertexBindPoint::VertexBuffer(0),
                ..
            }
        ));
        assert!(matches!(
            cmds[8],
            Command::SetFragmentAddress {
                bind_point: FragmentBindPoint::Material,
                ..
            }
        ));
        assert!(matches!(cmds[9], Command::DrawIndexed { .. }));
    }

    #[test]
    fn constants_land_in_the_recorded_slot() {
        let mut dev = HeadlessDevice::new();
        let mut pipeline = FramePipeline::new(&dev, &small_config()).unwrap();
        let scene = scene_of(&dev, &mut pipeline, 3);
        let camera = PerspectiveCamera::default();
        pipeline.render_frame(&mut dev, &scene, &camera).unwrap();

        let cmds = dev.submissions().remove(0).commands;
        let frame_address = cmds
            .iter()
            .find_map(|c| match c {
                Command::SetVertexAddress {
                    bind_point: VertexBindPoint::FrameConstants,
                    address,
                } => Some(*address),
                _ => None,
            })
            .unwrap();
        let bytes = dev.read_address(frame_address, size_of::<FrameConstants>()).unwrap();
        let constants: FrameConstants = bytemuck::pod_read_unaligned(&bytes);
        assert_eq!(constants.view, camera.view_matrix());

        let instance_addresses: Vec<_> = cmds
            .iter()
            .filter_map(|c| match c {
                Command::SetVertexAddress {
                    bind_point: VertexBindPoint::InstanceConstants,
                    address,
                } => Some(*address),
                _ => None,
            })
            .collect();
        assert_eq!(instance_addresses.len(), 3);
        for (i, address) in instance_addresses.iter().enumerate() {
            let bytes = dev.read_address(*address, size_of::<InstanceConstants>()).unwrap();
            let constants: InstanceConstants = bytemuck::pod_read_unaligned(&bytes);
            assert_eq!(constants.model.w_axis.x, i as f32);
        }
    }

    #[test]
    fn in_flight_slots_use_disjoint_constants() {
        let mut dev = HeadlessDevice::new();
        let mut pipeline = FramePipeline::new(&dev, &small_config()).unwrap();
        let scene = scene_of(&dev, &mut pipeline, 1);
        let camera = PerspectiveCamera::default();
        for _ in 0..3 {
            pipeline.render_frame(&mut dev, &scene, &camera).unwrap();
        }
        let mut addresses: Vec<_> = dev
            .submissions()
            .iter()
            .map(|f| f.commands[6].clone())
            .collect();
        addresses.dedup();
        assert_eq!(addresses.len(), 3);
    }

    #[test]
    fn textures_are_bound_per_submesh() {
        let mut dev = HeadlessDevice::new();
        let mut pipeline = FramePipeline::new(&dev, &small_config()).unwrap();
        let texture = dev
            .create_texture(
                &TextureDesc {
                    label: "albedo",
                    width: 1,
                    height: 1,
                    srgb: true,
                },
                &[255; 4],
            )
            .unwrap();
        let mut material = Material::default();
        material.base_color = material.base_color.with_texture(Some(texture));
        let mut renderable = Renderable::from(Polytope::Icosahedron.mesh(&dev, Some(material)).unwrap());
        pipeline.register_renderable(&dev, &mut renderable).unwrap();
        let mut scene = Scene::new();
        scene.add(renderable);

        pipeline
            .render_frame(&mut dev, &scene, &PerspectiveCamera::default())
            .unwrap();
        let cmds = dev.submissions().remove(0).commands;
        assert!(cmds.contains(&Command::SetFragmentTexture {
            slot: MaterialTexture::BaseColor,
            texture: texture.id,
        }));
    }

    // ── residency ─────────────────────────────────────────────────────────

    #[test]
    fn unregistered_renderable_is_rejected_before_submission() {
        let mut dev = HeadlessDevice::new();
        let mut pipeline = FramePipeline::new(&dev, &small_config()).unwrap();
        let mut scene = Scene::new();
        scene.add(Polytope::Cone.mesh(&dev, None).unwrap());

        let err = pipeline
            .render_frame(&mut dev, &scene, &PerspectiveCamera::default())
            .unwrap_err();
        assert!(matches!(err, FrameError::NotResident(_)));
        assert_eq!(pipeline.frame_number(), 0);
        assert_eq!(dev.submission_count(), 0);
    }

    #[test]
    fn pipeline_buffers_are_resident_after_first_frame() {
        let mut dev = HeadlessDevice::new();
        let mut pipeline = FramePipeline::new(&dev, &small_config()).unwrap();
        let scene = scene_of(&dev, &mut pipeline, 1);
        pipeline
            .render_frame(&mut dev, &scene, &PerspectiveCamera::default())
            .unwrap();
        for id in pipeline.instance_constants().allocations() {
            assert!(dev.is_resident(id));
        }
        assert!(dev.is_resident(pipeline.materials().allocation_id()));

        pipeline
            .render_frame(&mut dev, &scene, &PerspectiveCamera::default())
            .unwrap();
        assert_eq!(dev.residency_commits(), 1);
    }

    // ── instance capacity ─────────────────────────────────────────────────

    #[test]
    fn fixed_capacity_rejects_oversized_frames() {
        let mut dev = HeadlessDevice::new();
        let config = EngineConfig {
            max_draws_per_frame: 2,
            ..small_config()
        };
        let mut pipeline = FramePipeline::new(&dev, &config).unwrap();
        let scene = scene_of(&dev, &mut pipeline, 3);

        let err = pipeline
            .render_frame(&mut dev, &scene, &PerspectiveCamera::default())
            .unwrap_err();
        assert!(matches!(
            err,
            FrameError::InstanceOverflow {
                draws: 3,
                capacity: 2
            }
        ));
        assert_eq!(pipeline.frame_number(), 0);
    }

    #[test]
    fn amortized_growth_replaces_only_the_recorded_slot() {
        let mut dev = HeadlessDevice::new();
        let config = EngineConfig {
            max_draws_per_frame: 2,
            instance_growth: InstanceGrowth::Amortized,
            ..small_config()
        };
        let mut pipeline = FramePipeline::new(&dev, &config).unwrap();
        let scene = scene_of(&dev, &mut pipeline, 5);
        let camera = PerspectiveCamera::default();

        let (_, idx, _) = submitted(pipeline.render_frame(&mut dev, &scene, &camera).unwrap());
        assert_eq!(idx, 1);
        assert_eq!(pipeline.instance_constants().instance_capacity(1).unwrap(), 5);
        assert_eq!(pipeline.instance_constants().instance_capacity(2).unwrap(), 2);
        assert_eq!(pipeline.retired_arenas(), 1);

        for _ in 0..3 {
            pipeline.render_frame(&mut dev, &scene, &camera).unwrap();
        }
        for f in 0..3 {
            assert_eq!(pipeline.instance_constants().instance_capacity(f).unwrap(), 5);
        }
        assert_eq!(pipeline.retired_arenas(), 0);
        for id in pipeline.instance_constants().allocations() {
            assert!(pipeline.residency().is_resident(id));
        }
    }

    // ── fence policy ──────────────────────────────────────────────────────

    #[test]
    fn best_effort_keeps_rendering_through_timeouts() {
        let mut dev = HeadlessDevice::with_completion(Completion::Manual);
        let config = EngineConfig {
            fence_timeout: Duration::from_millis(1),
            ..small_config()
        };
        let mut pipeline = FramePipeline::new(&dev, &config).unwrap();
        let scene = scene_of(&dev, &mut pipeline, 1);
        let camera = PerspectiveCamera::default();

        let waits: Vec<WaitOutcome> = (0..5)
            .map(|_| submitted(pipeline.render_frame(&mut dev, &scene, &camera).unwrap()).2)
            .collect();
        assert_eq!(
            waits,
            vec![
                WaitOutcome::NotRequired,
                WaitOutcome::NotRequired,
                WaitOutcome::Signaled,
                WaitOutcome::TimedOut,
                WaitOutcome::TimedOut,
            ]
        );
        assert_eq!(pipeline.consecutive_timeouts(), 2);
        assert_eq!(dev.pending_signals(), 5);
    }

    #[test]
    fn fail_after_escalates_sustained_stalls() {
        let mut dev = HeadlessDevice::with_completion(Completion::Manual);
        let config = EngineConfig {
            fence_timeout: Duration::from_millis(1),
            fence_policy: FenceWaitPolicy::FailAfter(2),
            ..small_config()
        };
        let mut pipeline = FramePipeline::new(&dev, &config).unwrap();
        let scene = scene_of(&dev, &mut pipeline, 1);
        let camera = PerspectiveCamera::default();

        for _ in 0..4 {
            pipeline.render_frame(&mut dev, &scene, &camera).unwrap();
        }
        let err = pipeline.render_frame(&mut dev, &scene, &camera).unwrap_err();
        assert!(matches!(
            err,
            FrameError::GpuStalled {
                frame_number: 5,
                consecutive: 2
            }
        ));
        // The failed frame still signalled, keeping the counter in step.
        assert_eq!(dev.pending_signals(), 5);

        dev.complete_all();
        let (n, _, wait) = submitted(pipeline.render_frame(&mut dev, &scene, &camera).unwrap());
        assert_eq!((n, wait), (6, WaitOutcome::Signaled));
        assert_eq!(pipeline.consecutive_timeouts(), 0);
    }

    // ── fence gating ──────────────────────────────────────────────────────

    #[test]
    fn reused_slot_waits_for_its_previous_frame_to_retire() {
        let mut dev = HeadlessDevice::with_completion(Completion::Manual);
        let config = EngineConfig {
            fence_timeout: Duration::from_secs(5),
            ..small_config()
        };
        let mut pipeline = FramePipeline::new(&dev, &config).unwrap();
        let scene = scene_of(&dev, &mut pipeline, 1);
        let camera = PerspectiveCamera::default();

        for _ in 0..3 {
            pipeline.render_frame(&mut dev, &scene, &camera).unwrap();
        }
        assert_eq!(dev.pending_signals(), 3);

        let gpu = dev.clone();
        for (retiring, next) in [(1u64, 4u64), (2, 5)] {
            thread::scope(|s| {
                let worker = s.spawn(|| pipeline.render_frame(&mut dev, &scene, &camera));
                thread::sleep(Duration::from_millis(50));
                assert!(!worker.is_finished());
                assert_eq!(gpu.submission_count() as u64, next - 1);

                assert_eq!(gpu.complete_next(), Some(retiring));
                let outcome = worker.join().unwrap().unwrap();
                let (n, idx, wait) = submitted(outcome);
                assert_eq!((n, idx, wait), (next, (next % 3) as usize, WaitOutcome::Signaled));
            });
            assert_eq!(dev.submission_count() as u64, next);
        }
        assert_eq!(pipeline.consecutive_timeouts(), 0);
    }

    #[test]
    fn stalled_slot_times_out_after_the_configured_wait() {
        let mut dev = HeadlessDevice::with_completion(Completion::Manual);
        let config = EngineConfig {
            fence_timeout: Duration::from_millis(20),
            fence_policy: FenceWaitPolicy::FailAfter(1),
            ..small_config()
        };
        let mut pipeline = FramePipeline::new(&dev, &config).unwrap();
        let scene = scene_of(&dev, &mut pipeline, 1);
        let camera = PerspectiveCamera::default();
        for _ in 0..3 {
            pipeline.render_frame(&mut dev, &scene, &camera).unwrap();
        }

        let started = std::time::Instant::now();
        let err = pipeline.render_frame(&mut dev, &scene, &camera).unwrap_err();
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert!(matches!(
            err,
            FrameError::GpuStalled {
                frame_number: 4,
                consecutive: 1
            }
        ));
        assert_eq!(dev.submission_count(), 3);
        assert_eq!(pipeline.frame_number(), 4);
    }

    // ── fill mode ─────────────────────────────────────────────────────────

    #[test]
    fn fill_mode_is_recorded_into_following_frames() {
        let mut dev = HeadlessDevice::new();
        let mut pipeline = FramePipeline::new(&dev, &small_config()).unwrap();
        let scene = scene_of(&dev, &mut pipeline, 1);
        let camera = PerspectiveCamera::default();

        pipeline.set_fill_mode(&dev, FillMode::Lines).unwrap();
        assert_eq!(pipeline.fill_mode(), FillMode::Lines);
        pipeline.render_frame(&mut dev, &scene, &camera).unwrap();
        pipeline.render_frame(&mut dev, &scene, &camera).unwrap();
        pipeline.set_fill_mode(&dev, FillMode::Fill).unwrap();
        pipeline.render_frame(&mut dev, &scene, &camera).unwrap();

        let modes: Vec<_> = dev.submissions().into_iter().map(|f| f.commands[4].clone()).collect();
        assert_eq!(
            modes,
            vec![
                Command::SetTriangleFillMode(FillMode::Lines),
                Command::SetTriangleFillMode(FillMode::Lines),
                Command::SetTriangleFillMode(FillMode::Fill),
            ]
        );
    }

    #[test]
    fn line_fill_is_refused_without_device_support() {
        let dev = HeadlessDevice::new().with_line_fill(false);
        let mut pipeline = FramePipeline::new(&dev, &small_config()).unwrap();
        let err = pipeline.set_fill_mode(&dev, FillMode::Lines).unwrap_err();
        assert!(matches!(err, FrameError::UnsupportedFillMode(FillMode::Lines)));
        assert_eq!(pipeline.fill_mode(), FillMode::Fill);
        pipeline.set_fill_mode(&dev, FillMode::Fill).unwrap();
    }
}
