//! Window + runtime loop.
//!
//! Owns the `winit` EventLoop and the window, and binds a
//! [`GraphicsContext`](crate::device::GraphicsContext) to it.

mod runtime;

pub use runtime::{Runtime, RuntimeConfig, RuntimeCtx};
pub use winit::window::CursorIcon;
