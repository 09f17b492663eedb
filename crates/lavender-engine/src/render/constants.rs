//! Shader-visible constant layouts.
//!
//! These structs are copied byte for byte into GPU buffers and must match the
//! declarations in `device/shaders/forward.wgsl`.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Number of texture slots in [`MaterialArguments`].
pub const MATERIAL_TEXTURE_SLOTS: usize = 7;

/// Per-frame camera data.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct FrameConstants {
    pub view: Mat4,
    pub projection: Mat4,
}

/// Per-draw data.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct InstanceConstants {
    pub model: Mat4,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct MaterialFactors {
    pub base_color: [f32; 4],
    pub roughness: f32,
    pub metallic: f32,
    pub normal_scale: f32,
    pub occlusion: f32,
    pub emissive: [f32; 3],
    pub _pad: f32,
}

/// Factors plus texture resource ids, in
/// [`MaterialTexture`](super::MaterialTexture) order. Id `0` means no texture.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct MaterialArguments {
    pub factors: MaterialFactors,
    pub textures: [u64; MATERIAL_TEXTURE_SLOTS],
}
