use crate::device::{AllocationId, GpuAddress, GpuDevice};
use crate::memory::{AlignedArena, ArenaError};
use crate::scene::Material;

use super::MaterialArguments;

/// Static table of material shader arguments.
///
/// Entries are written once when a material is first registered and never
/// change afterwards, so one buffer serves every frame in flight. Entry 0
/// holds the default material used by submeshes without one.
#[derive(Debug)]
pub struct MaterialTable {
    arena: AlignedArena<MaterialArguments>,
    len: usize,
}

impl MaterialTable {
    pub fn new(device: &dyn GpuDevice, capacity: usize, alignment: u64) -> Result<Self, ArenaError> {
        let mut arena = AlignedArena::create(device, "materials", capacity, alignment)?;
        arena.write(0, &Material::default().shader_arguments())?;
        Ok(Self { arena, len: 1 })
    }

    /// Writes `material`'s arguments into the next free entry and records its
    /// address on the material. Already registered materials are left alone,
    /// and materials with identical arguments share one entry.
    pub fn register(&mut self, material: &mut Material) -> Result<GpuAddress, ArenaError> {
        if let Some(address) = material.binding() {
            return Ok(address);
        }
        let args = material.shader_arguments();
        for index in 0..self.len {
            if self.arena.read(index)? == args {
                let address = self.arena.gpu_address(index)?;
                material.set_binding(address);
                return Ok(address);
            }
        }
        let index = self.len;
        self.arena.write(index, &args)?;
        let address = self.arena.gpu_address(index)?;
        self.len += 1;
        material.set_binding(address);
        log::debug!("material '{}' -> entry {}", material.name, index);
        Ok(address)
    }

    /// Address of the built-in default material.
    pub fn default_address(&self) -> GpuAddress {
        self.arena.allocation().gpu_address
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.arena.count()
    }

    pub fn allocation_id(&self) -> AllocationId {
        self.arena.allocation_id()
    }

    pub fn read(&self, index: usize) -> Result<MaterialArguments, ArenaError> {
        self.arena.read(index)
    }

    pub fn flush(&mut self, device: &dyn GpuDevice) -> Result<(), ArenaError> {
        self.arena.flush(device)
    }
}
