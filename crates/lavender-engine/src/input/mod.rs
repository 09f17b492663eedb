//! Input subsystem.
//!
//! Public API is platform-agnostic and does not expose winit types.
//! Runtime code translates platform events into `InputEvent`s, folds them
//! into an `InputState`, and hands one `InputSnapshot` to the engine per tick.

pub mod platform;

mod snapshot;
mod state;
mod types;

pub use snapshot::{InputSnapshot, Movement};
pub use state::InputState;
pub use types::{ButtonState, InputEvent, Key, MouseButton};
