use winit::window::{CursorIcon, Window, WindowId};

use crate::device::GraphicsContext;
use crate::input::InputSnapshot;
use crate::time::FrameTime;
use crate::window::RuntimeCtx;

/// The window being drawn.
pub struct WindowCtx<'a> {
    pub id: WindowId,
    pub window: &'a Window,
}

impl WindowCtx<'_> {
    /// Drawable size in physical pixels.
    pub fn physical_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    pub fn set_cursor(&self, cursor: CursorIcon) {
        self.window.set_cursor(cursor);
    }

    pub fn set_title(&self, title: &str) {
        self.window.set_title(title);
    }
}

/// Per-frame context passed to [`App::on_frame`](super::App::on_frame).
///
/// `'a` is the callback invocation, `'w` the window borrow carried by the
/// graphics context.
pub struct FrameCtx<'a, 'w> {
    pub window: WindowCtx<'a>,
    pub gpu: &'a mut GraphicsContext<'w>,
    /// Input accumulated since the previous frame. Deltas are consumed.
    pub input: InputSnapshot,
    pub time: FrameTime,
    pub runtime: &'a mut RuntimeCtx,
}
