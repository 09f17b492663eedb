//! Core contracts between the runtime loop and the application.
//!
//! The runtime owns the window and the graphics context; the application
//! sees them only through the per-frame [`FrameCtx`].

mod app;
mod ctx;

pub use app::{App, AppControl};
pub use ctx::{FrameCtx, WindowCtx};
