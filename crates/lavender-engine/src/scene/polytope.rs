use std::f32::consts::TAU;

use glam::{Vec2, Vec3};

use super::{Material, Mesh, Vertex};
use crate::device::{DeviceError, GpuDevice};

const CONE_SEGMENTS: u32 = 8;

/// Procedural shapes with unit extent, centred on the origin.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Polytope {
    Box,
    Icosahedron,
    /// Open cone, apex up.
    Cone,
}

impl Polytope {
    pub fn name(self) -> &'static str {
        match self {
            Polytope::Box => "box",
            Polytope::Icosahedron => "icosahedron",
            Polytope::Cone => "cone",
        }
    }

    /// Flat-shaded triangle list.
    pub fn geometry(self) -> (Vec<Vertex>, Vec<u32>) {
        match self {
            Polytope::Box => box_geometry(),
            Polytope::Icosahedron => icosahedron_geometry(),
            Polytope::Cone => cone_geometry(),
        }
    }

    pub fn mesh(self, device: &dyn GpuDevice, material: Option<Material>) -> Result<Mesh, DeviceError> {
        let (vertices, indices) = self.geometry();
        Mesh::from_geometry(device, self.name(), &vertices, &indices, material)
    }
}

fn box_geometry() -> (Vec<Vertex>, Vec<u32>) {
    // (normal, u axis, v axis)
    let faces = [
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, u, v) in faces {
        let base = vertices.len() as u32;
        for (du, dv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let p = (normal + u * du + v * dv) * 0.5;
            let uv = Vec2::new((du + 1.0) * 0.5, 1.0 - (dv + 1.0) * 0.5);
            vertices.push(Vertex::new(p.to_array(), normal.to_array(), uv.to_array()));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    (vertices, indices)
}

fn icosahedron_geometry() -> (Vec<Vertex>, Vec<u32>) {
    let t = (1.0 + 5f32.sqrt()) * 0.5;
    let corners = [
        Vec3::new(-1.0, t, 0.0),
        Vec3::new(1.0, t, 0.0),
        Vec3::new(-1.0, -t, 0.0),
        Vec3::new(1.0, -t, 0.0),
        Vec3::new(0.0, -1.0, t),
        Vec3::new(0.0, 1.0, t),
        Vec3::new(0.0, -1.0, -t),
        Vec3::new(0.0, 1.0, -t),
        Vec3::new(t, 0.0, -1.0),
        Vec3::new(t, 0.0, 1.0),
        Vec3::new(-t, 0.0, -1.0),
        Vec3::new(-t, 0.0, 1.0),
    ]
    .map(|c| c * (0.5 / t));

    const FACES: [[usize; 3]; 20] = [
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];

    let uvs = [[0.0, 1.0], [1.0, 1.0], [0.5, 0.0]];
    let mut vertices = Vec::with_capacity(60);
    for face in FACES {
        let [a, b, c] = face.map(|i| corners[i]);
        let normal = outward_normal(a, b, c);
        for (p, uv) in [a, b, c].into_iter().zip(uvs) {
            vertices.push(Vertex::new(p.to_array(), normal.to_array(), uv));
        }
    }
    let indices = (0..vertices.len() as u32).collect();
    (vertices, indices)
}

fn cone_geometry() -> (Vec<Vertex>, Vec<u32>) {
    let apex = Vec3::new(0.0, 0.5, 0.0);
    let rim = |i: u32| {
        let a = TAU * i as f32 / CONE_SEGMENTS as f32;
        Vec3::new(a.cos() * 0.5, -0.5, a.sin() * 0.5)
    };

    let mut vertices = Vec::with_capacity(CONE_SEGMENTS as usize * 3);
    for i in 0..CONE_SEGMENTS {
        let (a, b) = (rim(i), rim(i + 1));
        let normal = outward_normal(a, b, apex);
        let u0 = i as f32 / CONE_SEGMENTS as f32;
        let u1 = (i + 1) as f32 / CONE_SEGMENTS as f32;
        vertices.push(Vertex::new(a.to_array(), normal.to_array(), [u0, 1.0]));
        vertices.push(Vertex::new(b.to_array(), normal.to_array(), [u1, 1.0]));
        vertices.push(Vertex::new(apex.to_array(), normal.to_array(), [(u0 + u1) * 0.5, 0.0]));
    }
    let indices = (0..vertices.len() as u32).collect();
    (vertices, indices)
}

/// Face normal pointing away from the origin.
fn outward_normal(a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let n = (b - a).cross(c - a).normalize_or_zero();
    if n.dot(a + b + c) < 0.0 { -n } else { n }
}
