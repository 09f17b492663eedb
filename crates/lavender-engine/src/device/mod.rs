//! GPU device seam.
//!
//! This module is responsible for:
//! - the backend-neutral contract ([`GpuDevice`], [`FrameBackend`]) the
//!   memory and render layers program against
//! - the wgpu implementation ([`GraphicsContext`]): instance, adapter, device,
//!   queue, surface, depth target and the forward pipeline
//! - an in-memory implementation ([`HeadlessDevice`]) for tests
//! - the host-visible [`SharedEvent`] fence signals land on

mod address;
mod backend;
mod context;
mod error;
mod event;
mod forward;
mod frame;
mod headless;
mod init;
mod surface;

pub use backend::{
    AllocationId, BufferAllocation, BufferDesc, BufferId, BufferUsage, FrameBackend, GpuAddress,
    GpuDevice, StorageMode, TextureDesc, TextureHandle, TextureId,
};
pub use context::GraphicsContext;
pub use error::{DeviceError, SurfaceErrorAction};
pub use event::SharedEvent;
pub use frame::WgpuDrawable;
pub use headless::{Completion, HeadlessDevice, HeadlessDrawable, SubmittedFrame};
pub use init::GpuInit;
