//! Frame rendering.
//!
//! The [`FramePipeline`] turns a [`Scene`](crate::scene::Scene) and a camera
//! into one recorded [`CommandSequence`] per frame. Per-frame and
//! per-instance constants live in multi-buffered arenas indexed by frame
//! slot; a [`FrameFence`] keeps the CPU from rewriting a slot the GPU is
//! still reading, and a [`ResidencySet`] keeps every referenced allocation
//! resident.

mod commands;
mod constants;
mod fence;
mod materials;
mod pipeline;
mod residency;

pub use commands::{
    Command, CommandAllocator, CommandSequence, FillMode, FragmentBindPoint, IndexFormat,
    MaterialTexture, PrimitiveType, ShaderStage, VertexBindPoint,
};
pub use constants::{
    FrameConstants, InstanceConstants, MaterialArguments, MaterialFactors, MATERIAL_TEXTURE_SLOTS,
};
pub use fence::{FrameFence, WaitOutcome};
pub use materials::MaterialTable;
pub use pipeline::{FrameError, FrameOutcome, FramePipeline};
pub use residency::{ResidencyError, ResidencySet};
