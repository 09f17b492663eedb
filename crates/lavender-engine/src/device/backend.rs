use std::fmt;
use std::sync::Arc;

use super::error::DeviceError;
use super::event::SharedEvent;
use crate::render::CommandSequence;

/// Identity of a GPU buffer created through a [`GpuDevice`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct BufferId(pub(crate) u32);

/// Identity of a GPU texture created through a [`GpuDevice`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TextureId(pub(crate) u32);

impl TextureId {
    /// Shader-visible resource id. `0` is reserved for "no texture".
    pub fn resource_id(self) -> u64 {
        u64::from(self.0) + 1
    }
}

/// Anything the GPU can be asked to keep resident.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum AllocationId {
    Buffer(BufferId),
    Texture(TextureId),
}

impl From<BufferId> for AllocationId {
    fn from(id: BufferId) -> Self {
        AllocationId::Buffer(id)
    }
}

impl From<TextureId> for AllocationId {
    fn from(id: TextureId) -> Self {
        AllocationId::Texture(id)
    }
}

/// Byte address in the device's virtual address space.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct GpuAddress(pub u64);

impl GpuAddress {
    #[inline]
    pub fn offset(self, bytes: u64) -> Self {
        GpuAddress(self.0 + bytes)
    }
}

impl fmt::Debug for GpuAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GpuAddress({:#x})", self.0)
    }
}

/// Where a buffer's backing memory lives.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StorageMode {
    /// CPU-writable, GPU-readable.
    Shared,
    /// GPU only. CPU access is refused.
    Private,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BufferUsage {
    Uniform,
    Vertex,
    Index,
}

#[derive(Debug, Clone)]
pub struct BufferDesc<'a> {
    pub label: &'a str,
    pub size: u64,
    pub usage: BufferUsage,
    pub storage: StorageMode,
}

/// A live buffer: identity, base address and length.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct BufferAllocation {
    pub id: BufferId,
    pub gpu_address: GpuAddress,
    pub length: u64,
    pub storage: StorageMode,
}

impl BufferAllocation {
    pub fn allocation_id(&self) -> AllocationId {
        AllocationId::Buffer(self.id)
    }
}

#[derive(Debug, Clone)]
pub struct TextureDesc<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    /// Sample as sRGB (colour data) rather than linear (data textures).
    pub srgb: bool,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct TextureHandle {
    pub id: TextureId,
    pub width: u32,
    pub height: u32,
}

/// Resource-side device contract shared by every backend.
///
/// All methods take `&self`; backends use interior mutability for their
/// resource tables. The rendering thread is the only caller.
pub trait GpuDevice {
    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<BufferAllocation, DeviceError>;

    /// Copies `bytes` into `buffer` at `offset`. Visible to the GPU from the
    /// next submission on.
    fn write_buffer(&self, buffer: BufferId, offset: u64, bytes: &[u8]) -> Result<(), DeviceError>;

    /// Drops the backend's reference to `buffer`. Its address range is never handed out again.
    fn release_buffer(&self, buffer: BufferId);

    /// Creates a 2D RGBA8 texture initialised from `rgba8` (tightly packed rows).
    fn create_texture(&self, desc: &TextureDesc<'_>, rgba8: &[u8]) -> Result<TextureHandle, DeviceError>;

    /// Replaces the queue's resident set with `allocations`.
    fn make_resident(&self, allocations: &[AllocationId]) -> Result<(), DeviceError>;

    /// Asks the GPU to set `event` to `value` once all work submitted so far
    /// has retired.
    fn signal_event(&self, event: &Arc<SharedEvent>, value: u64);

    /// Gives the backend a chance to process completed work and run pending
    /// event signals. Never blocks.
    fn poll(&self);

    /// Minimum alignment for uniform element starts.
    fn min_uniform_alignment(&self) -> u64 {
        256
    }

    /// Whether `SetTriangleFillMode(Lines)` can be encoded.
    fn supports_line_fill(&self) -> bool {
        false
    }
}

/// Presentation side of a backend: drawables and command submission.
pub trait FrameBackend: GpuDevice {
    type Drawable;

    /// Returns `Ok(None)` when no drawable is available this tick.
    fn acquire_drawable(&mut self) -> Result<Option<Self::Drawable>, DeviceError>;

    /// Encodes `commands`, waits for the drawable, commits and presents.
    fn submit(&mut self, commands: &CommandSequence, drawable: Self::Drawable) -> Result<(), DeviceError>;
}
