use glam::Vec3;

use crate::device::{AllocationId, GpuAddress, TextureHandle};
use crate::render::{MaterialArguments, MaterialFactors, MaterialTexture, MATERIAL_TEXTURE_SLOTS};

/// A material input: constant factor, optionally modulated by a texture.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Parameter<F> {
    pub factor: F,
    pub texture: Option<TextureHandle>,
    pub uv_set: u8,
    pub is_srgb: bool,
}

impl<F> Parameter<F> {
    #[inline]
    pub const fn new(factor: F) -> Self {
        Self {
            factor,
            texture: None,
            uv_set: 0,
            is_srgb: true,
        }
    }

    #[inline]
    pub fn with_texture(mut self, texture: Option<TextureHandle>) -> Self {
        self.texture = texture;
        self
    }
}

/// Surface description shared by the submeshes that reference it.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub base_color: Parameter<Vec3>,
    pub roughness: Parameter<f32>,
    pub metalness: Parameter<f32>,
    pub normal: Parameter<f32>,
    pub occlusion: Parameter<f32>,
    pub opacity: Parameter<f32>,
    pub emissive: Parameter<Vec3>,
    pub(crate) binding: Option<GpuAddress>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::from("default"),
            base_color: Parameter::new(Vec3::ONE),
            roughness: Parameter::new(1.0),
            metalness: Parameter::new(0.0),
            normal: Parameter::new(1.0),
            occlusion: Parameter::new(1.0),
            opacity: Parameter::new(1.0),
            emissive: Parameter::new(Vec3::ZERO),
            binding: None,
        }
    }
}

impl Material {
    pub fn with_base_color(color: Vec3) -> Self {
        Self {
            base_color: Parameter::new(color),
            ..Self::default()
        }
    }

    pub fn texture(&self, slot: MaterialTexture) -> Option<TextureHandle> {
        match slot {
            MaterialTexture::BaseColor => self.base_color.texture,
            MaterialTexture::Roughness => self.roughness.texture,
            MaterialTexture::Metalness => self.metalness.texture,
            MaterialTexture::Normal => self.normal.texture,
            MaterialTexture::Occlusion => self.occlusion.texture,
            MaterialTexture::Opacity => self.opacity.texture,
            MaterialTexture::Emissive => self.emissive.texture,
        }
    }

    /// Bound texture slots in argument order.
    pub fn textures(&self) -> impl Iterator<Item = (MaterialTexture, TextureHandle)> + '_ {
        MaterialTexture::ALL
            .into_iter()
            .filter_map(|slot| self.texture(slot).map(|t| (slot, t)))
    }

    pub fn resources(&self) -> impl Iterator<Item = AllocationId> + '_ {
        self.textures().map(|(_, t)| AllocationId::Texture(t.id))
    }

    pub fn shader_arguments(&self) -> MaterialArguments {
        let mut textures = [0u64; MATERIAL_TEXTURE_SLOTS];
        for (slot, t) in self.textures() {
            textures[slot.index()] = t.id.resource_id();
        }
        MaterialArguments {
            factors: MaterialFactors {
                base_color: self.base_color.factor.extend(self.opacity.factor).to_array(),
                roughness: self.roughness.factor,
                metallic: self.metalness.factor,
                normal_scale: self.normal.factor,
                occlusion: self.occlusion.factor,
                emissive: self.emissive.factor.to_array(),
                _pad: 0.0,
            },
            textures,
        }
    }

    /// Address of this material's arguments in the material table, once registered.
    #[inline]
    pub fn binding(&self) -> Option<GpuAddress> {
        self.binding
    }

    #[inline]
    pub(crate) fn set_binding(&mut self, address: GpuAddress) {
        self.binding = Some(address);
    }
}
