use anyhow::Result;
use winit::event::WindowEvent;

use crate::device::GraphicsContext;

use super::ctx::FrameCtx;

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application contract implemented by the viewer.
pub trait App {
    /// Called once after the window and its graphics context exist, before
    /// the first frame. Scene content is created here.
    fn on_start(&mut self, gpu: &GraphicsContext<'_>) -> Result<()>;

    /// Called for every window event, after input translation.
    fn on_window_event(&mut self, event: &WindowEvent) -> AppControl {
        let _ = event;
        AppControl::Continue
    }

    /// Called after the surface has been resized, with the new drawable size
    /// in physical pixels.
    fn on_resize(&mut self, width: u32, height: u32) {
        let _ = (width, height);
    }

    /// Called once per redraw.
    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl;
}
