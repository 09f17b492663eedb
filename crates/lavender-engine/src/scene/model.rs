use glam::{Affine3A, Mat4};

use super::{DrawCall, Material, Mesh};
use crate::device::AllocationId;

/// A group of meshes sharing one model transform.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub name: String,
    pub transform: Affine3A,
    pub meshes: Vec<Mesh>,
}

impl Model {
    pub fn new(name: impl Into<String>, meshes: Vec<Mesh>) -> Self {
        Self {
            name: name.into(),
            transform: Affine3A::IDENTITY,
            meshes,
        }
    }

    #[inline]
    pub fn with_transform(mut self, transform: Affine3A) -> Self {
        self.transform = transform;
        self
    }

    /// One draw per mesh, with the model transform applied on top of the mesh's own.
    pub fn draw_calls(&self) -> Vec<DrawCall<'_>> {
        self.meshes
            .iter()
            .map(|mesh| DrawCall {
                mesh,
                model_matrix: Mat4::from(self.transform * mesh.transform),
            })
            .collect()
    }

    pub fn resources(&self) -> impl Iterator<Item = AllocationId> + '_ {
        self.meshes.iter().flat_map(Mesh::resources)
    }

    pub fn materials_mut(&mut self) -> impl Iterator<Item = &mut Material> + '_ {
        self.meshes.iter_mut().flat_map(Mesh::materials_mut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HeadlessDevice;
    use crate::scene::Polytope;
    use glam::{Quat, Vec3};

    #[test]
    fn model_transform_composes_before_mesh_transform() {
        let dev = HeadlessDevice::new();
        let mesh_t = Affine3A::from_translation(Vec3::X);
        let model_t = Affine3A::from_rotation_translation(Quat::from_rotation_y(1.0), Vec3::Y);
        let mesh = Polytope::Box.mesh(&dev, None).unwrap().with_transform(mesh_t);
        let model = Model::new("m", vec![mesh.clone(), mesh]).with_transform(model_t);

        let calls = model.draw_calls();
        assert_eq!(calls.len(), 2);
        let expected = Mat4::from(model_t) * Mat4::from(mesh_t);
        assert!(calls[0].model_matrix.abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn resources_span_all_meshes() {
        let dev = HeadlessDevice::new();
        let a = Polytope::Box.mesh(&dev, None).unwrap();
        let b = Polytope::Cone.mesh(&dev, None).unwrap();
        let model = Model::new("m", vec![a, b]);
        assert_eq!(model.resources().count(), 4);
    }
}
