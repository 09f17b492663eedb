use thiserror::Error;

use crate::device::DeviceError;

/// Errors raised by [`AlignedArena`](super::AlignedArena) and
/// [`MultiBufferedArena`](super::MultiBufferedArena).
#[derive(Debug, Error)]
pub enum ArenaError {
    #[error("element index {index} out of range (count {count})")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("frame index {frame_index} out of range ({frames} frames in flight)")]
    FrameIndexOutOfRange { frame_index: usize, frames: usize },

    #[error("instance index {instance_index} out of range (capacity {capacity})")]
    InstanceIndexOutOfRange { instance_index: usize, capacity: usize },

    #[error("arena memory is GPU-private and cannot be accessed from the CPU")]
    AccessDenied,

    #[error("alignment {0} is not a power of two")]
    InvalidAlignment(u64),

    #[error("stride {stride} is smaller than the element size {size}")]
    InvalidStride { stride: u64, size: usize },

    #[error("arena needs at least one frame in flight")]
    NoFrames,

    #[error(transparent)]
    Device(#[from] DeviceError),
}
