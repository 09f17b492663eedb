use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::device::{GpuDevice, TextureDesc, TextureHandle};

/// How a texture's texels are interpreted.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureSemantic {
    /// Base colour and emissive maps, decoded from sRGB when sampled.
    Color,
    /// Roughness, metalness, normal, occlusion and opacity maps.
    Data,
}

impl TextureSemantic {
    #[inline]
    pub fn is_srgb(self) -> bool {
        self == TextureSemantic::Color
    }
}

/// Textures by source path. Entries are never evicted.
#[derive(Debug, Default)]
pub struct TextureCache {
    textures: HashMap<(PathBuf, TextureSemantic), TextureHandle>,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached texture or decodes and uploads `path`.
    ///
    /// A file that cannot be read or decoded yields `None` and a warning; the
    /// material then falls back to its constant factor.
    pub fn load(
        &mut self,
        device: &dyn GpuDevice,
        path: &Path,
        semantic: TextureSemantic,
    ) -> Option<TextureHandle> {
        let key = (path.to_path_buf(), semantic);
        if let Some(handle) = self.textures.get(&key) {
            return Some(*handle);
        }

        let image = match image::open(path) {
            Ok(image) => image,
            Err(err) => {
                log::warn!("texture '{}' could not be loaded: {err}", path.display());
                return None;
            }
        };
        let handle = upload(device, &path.display().to_string(), image, semantic)?;
        log::debug!("loaded texture '{}' ({}x{})", path.display(), handle.width, handle.height);
        self.textures.insert(key, handle);
        Some(handle)
    }

    /// Like [`load`](Self::load) for an encoded image already in memory.
    pub fn load_from_memory(
        &mut self,
        device: &dyn GpuDevice,
        name: &str,
        bytes: &[u8],
        semantic: TextureSemantic,
    ) -> Option<TextureHandle> {
        let key = (PathBuf::from(name), semantic);
        if let Some(handle) = self.textures.get(&key) {
            return Some(*handle);
        }

        let image = match image::load_from_memory(bytes) {
            Ok(image) => image,
            Err(err) => {
                log::warn!("texture '{name}' could not be decoded: {err}");
                return None;
            }
        };
        let handle = upload(device, name, image, semantic)?;
        self.textures.insert(key, handle);
        Some(handle)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

fn upload(
    device: &dyn GpuDevice,
    label: &str,
    image: image::DynamicImage,
    semantic: TextureSemantic,
) -> Option<TextureHandle> {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let desc = TextureDesc {
        label,
        width,
        height,
        srgb: semantic.is_srgb(),
    };
    match device.create_texture(&desc, rgba.as_raw()) {
        Ok(handle) => Some(handle),
        Err(err) => {
            log::warn!("texture '{label}' could not be uploaded: {err}");
            None
        }
    }
}
