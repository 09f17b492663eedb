use std::collections::BTreeSet;

use glam::{Affine3A, Mat4};

use super::{Material, Mesh, Model};
use crate::device::AllocationId;

/// One mesh paired with the matrix it is drawn with this frame.
#[derive(Debug, Copy, Clone)]
pub struct DrawCall<'a> {
    pub mesh: &'a Mesh,
    pub model_matrix: Mat4,
}

/// Anything the scene can draw.
#[derive(Debug, Clone, PartialEq)]
pub enum Renderable {
    Mesh(Mesh),
    Model(Model),
}

impl Renderable {
    pub fn name(&self) -> &str {
        match self {
            Renderable::Mesh(m) => &m.name,
            Renderable::Model(m) => &m.name,
        }
    }

    pub fn transform_mut(&mut self) -> &mut Affine3A {
        match self {
            Renderable::Mesh(m) => &mut m.transform,
            Renderable::Model(m) => &mut m.transform,
        }
    }

    pub fn draw_calls(&self) -> Vec<DrawCall<'_>> {
        match self {
            Renderable::Mesh(m) => m.draw_calls(),
            Renderable::Model(m) => m.draw_calls(),
        }
    }

    pub fn resources(&self) -> Vec<AllocationId> {
        match self {
            Renderable::Mesh(m) => m.resources().collect(),
            Renderable::Model(m) => m.resources().collect(),
        }
    }

    pub fn materials_mut(&mut self) -> Vec<&mut Material> {
        match self {
            Renderable::Mesh(m) => m.materials_mut().collect(),
            Renderable::Model(m) => m.materials_mut().collect(),
        }
    }
}

impl From<Mesh> for Renderable {
    fn from(mesh: Mesh) -> Self {
        Renderable::Mesh(mesh)
    }
}

impl From<Model> for Renderable {
    fn from(model: Model) -> Self {
        Renderable::Model(model)
    }
}

/// Insertion-ordered list of renderables. Entities are only ever added.
#[derive(Debug, Default)]
pub struct Scene {
    renderables: Vec<Renderable>,
}

impl Scene {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `renderable` and returns its index.
    pub fn add(&mut self, renderable: impl Into<Renderable>) -> usize {
        self.renderables.push(renderable.into());
        self.renderables.len() - 1
    }

    #[inline]
    pub fn renderables(&self) -> &[Renderable] {
        &self.renderables
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Renderable> {
        self.renderables.get_mut(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.renderables.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.renderables.is_empty()
    }

    /// Draw calls of every renderable, in insertion order.
    pub fn draw_calls(&self) -> Vec<DrawCall<'_>> {
        self.renderables.iter().flat_map(Renderable::draw_calls).collect()
    }

    /// Every allocation a draw from this scene can touch, without duplicates.
    pub fn resources(&self) -> Vec<AllocationId> {
        let set: BTreeSet<AllocationId> = self
            .renderables
            .iter()
            .flat_map(Renderable::resources)
            .collect();
        set.into_iter().collect()
    }
}
