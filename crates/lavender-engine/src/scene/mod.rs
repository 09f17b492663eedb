//! Scene content: meshes, materials, models and the renderable list.
//!
//! Responsibilities:
//! - hold GPU buffer handles for geometry and texture handles for materials
//! - expand renderables into per-frame [`DrawCall`]s
//! - report every allocation a draw can touch so it can be made resident

mod graph;
mod material;
mod mesh;
mod model;
mod polytope;
mod vertex;

pub use graph::{DrawCall, Renderable, Scene};
pub use material::{Material, Parameter};
pub use mesh::{Mesh, Submesh};
pub use model::Model;
pub use polytope::Polytope;
pub use vertex::Vertex;
