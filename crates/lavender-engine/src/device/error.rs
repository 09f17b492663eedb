use thiserror::Error;

use super::backend::{AllocationId, BufferId, GpuAddress};

/// High-level response after a surface error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// Surface was reconfigured; rendering may resume next frame.
    Reconfigured,
    /// Transient error; skip the current frame.
    SkipFrame,
    /// Fatal error (commonly OOM); terminate gracefully.
    Fatal,
}

/// Errors reported by a [`GpuDevice`](super::GpuDevice) implementation.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to allocate {size} bytes for '{label}'")]
    AllocationFailed { label: String, size: u64 },

    #[error("unknown buffer {0:?}")]
    UnknownBuffer(BufferId),

    #[error("unknown allocation {0:?}")]
    UnknownAllocation(AllocationId),

    #[error("write of {len} bytes at offset {offset} overruns buffer {buffer:?} ({length} bytes)")]
    WriteOutOfBounds {
        buffer: BufferId,
        offset: u64,
        len: usize,
        length: u64,
    },

    #[error("buffer {0:?} uses private storage and cannot be written from the CPU")]
    PrivateStorage(BufferId),

    #[error("address {0:?} does not map to any live buffer")]
    UnmappedAddress(GpuAddress),

    #[error("command references non-resident allocation {0:?}")]
    NotResident(AllocationId),

    #[error("texture data is {actual} bytes, expected {expected}")]
    TextureSize { expected: usize, actual: usize },

    #[error("buffer offset {0} does not fit a 32-bit dynamic offset")]
    OffsetOutOfRange(u64),

    #[error("index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },

    #[error("surface is unusable")]
    SurfaceLost,

    #[error("malformed command sequence: {0}")]
    InvalidCommands(&'static str),
}
