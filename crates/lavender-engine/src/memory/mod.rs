//! GPU-visible constant storage.
//!
//! - [`AlignedArena`]: one buffer of equally strided, aligned elements
//! - [`MultiBufferedArena`]: one arena per frame in flight, indexed by slice

mod arena;
mod error;
mod multi_buffered;

pub use arena::{aligned_stride, AlignedArena, ArenaDesc};
pub use error::ArenaError;
pub use multi_buffered::{DynamicScope, MultiBufferedArena, Slice};

/// Rounds `value` up to the next multiple of `alignment` (a power of two).
#[inline]
pub fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}
