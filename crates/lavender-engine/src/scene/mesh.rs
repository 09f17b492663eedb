use glam::{Affine3A, Mat4};

use super::{DrawCall, Material, Vertex};
use crate::device::{
    AllocationId, BufferAllocation, BufferDesc, BufferUsage, DeviceError, GpuDevice, StorageMode,
};
use crate::render::{IndexFormat, PrimitiveType};

/// A range of indices drawn with one material.
#[derive(Debug, Clone, PartialEq)]
pub struct Submesh {
    pub index_count: u32,
    pub index_buffer: BufferAllocation,
    pub index_format: IndexFormat,
    pub primitive: PrimitiveType,
    pub material: Option<Material>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub name: String,
    pub transform: Affine3A,
    pub vertex_buffers: Vec<BufferAllocation>,
    pub vertex_count: usize,
    pub submeshes: Vec<Submesh>,
}

impl Mesh {
    pub fn new(
        name: impl Into<String>,
        vertex_buffers: Vec<BufferAllocation>,
        vertex_count: usize,
        submeshes: Vec<Submesh>,
    ) -> Self {
        Self {
            name: name.into(),
            transform: Affine3A::IDENTITY,
            vertex_buffers,
            vertex_count,
            submeshes,
        }
    }

    /// Uploads interleaved vertices and a triangle list as a single-submesh mesh.
    ///
    /// Every index must name a vertex. Indices are stored as `u16` when the
    /// largest one fits.
    pub fn from_geometry(
        device: &dyn GpuDevice,
        name: &str,
        vertices: &[Vertex],
        indices: &[u32],
        material: Option<Material>,
    ) -> Result<Self, DeviceError> {
        let max_index = indices.iter().copied().max();
        if let Some(index) = max_index.filter(|&i| i as usize >= vertices.len()) {
            return Err(DeviceError::IndexOutOfRange {
                index,
                vertex_count: vertices.len(),
            });
        }

        let vertex_buffer = upload(
            device,
            &format!("{name} vertices"),
            BufferUsage::Vertex,
            bytemuck::cast_slice(vertices),
        )?;

        let narrow: Option<Vec<u16>> = indices.iter().map(|&i| u16::try_from(i).ok()).collect();
        let (index_format, index_bytes) = match narrow {
            Some(narrow) => (IndexFormat::Uint16, bytemuck::cast_slice::<u16, u8>(&narrow).to_vec()),
            None => (IndexFormat::Uint32, bytemuck::cast_slice::<u32, u8>(indices).to_vec()),
        };
        let index_buffer = upload(device, &format!("{name} indices"), BufferUsage::Index, &index_bytes)?;

        Ok(Self::new(
            name,
            vec![vertex_buffer],
            vertices.len(),
            vec![Submesh {
                index_count: indices.len() as u32,
                index_buffer,
                index_format,
                primitive: PrimitiveType::Triangle,
                material,
            }],
        ))
    }

    #[inline]
    pub fn with_transform(mut self, transform: Affine3A) -> Self {
        self.transform = transform;
        self
    }

    pub fn draw_calls(&self) -> Vec<DrawCall<'_>> {
        vec![DrawCall {
            mesh: self,
            model_matrix: Mat4::from(self.transform),
        }]
    }

    /// Vertex buffers, index buffers and material textures.
    pub fn resources(&self) -> impl Iterator<Item = AllocationId> + '_ {
        let vertex = self.vertex_buffers.iter().map(BufferAllocation::allocation_id);
        let per_submesh = self.submeshes.iter().flat_map(|s| {
            std::iter::once(s.index_buffer.allocation_id())
                .chain(s.material.iter().flat_map(Material::resources))
        });
        vertex.chain(per_submesh)
    }

    pub fn materials_mut(&mut self) -> impl Iterator<Item = &mut Material> + '_ {
        self.submeshes.iter_mut().filter_map(|s| s.material.as_mut())
    }
}

fn upload(
    device: &dyn GpuDevice,
    label: &str,
    usage: BufferUsage,
    bytes: &[u8],
) -> Result<BufferAllocation, DeviceError> {
    // Buffer copies must be a multiple of four bytes.
    let padded = bytes.len().next_multiple_of(4);
    let allocation = device.create_buffer(&BufferDesc {
        label,
        size: padded as u64,
        usage,
        storage: StorageMode::Shared,
    })?;
    if padded == bytes.len() {
        device.write_buffer(allocation.id, 0, bytes)?;
    } else {
        let mut data = bytes.to_vec();
        data.resize(padded, 0);
        device.write_buffer(allocation.id, 0, &data)?;
    }
    Ok(allocation)
}
