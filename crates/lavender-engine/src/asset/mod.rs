//! Asset import: Wavefront OBJ models and their textures.

mod loader;
mod texture_cache;

pub use loader::{AssetLoader, LoadError};
pub use texture_cache::{TextureCache, TextureSemantic};
