use std::path::{Path, PathBuf};

use glam::Vec3;
use thiserror::Error;

use super::texture_cache::{TextureCache, TextureSemantic};
use crate::device::{DeviceError, GpuDevice, TextureHandle};
use crate::scene::{Material, Mesh, Model, Parameter, Vertex};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to parse '{}'", .path.display())]
    Obj {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },

    #[error("'{}' contains no triangles", .0.display())]
    NoGeometry(PathBuf),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Imports Wavefront OBJ models, resolving MTL materials and their textures.
#[derive(Debug, Default)]
pub struct AssetLoader {
    textures: TextureCache,
}

impl AssetLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every object in `path` as one mesh of the returned model.
    ///
    /// Faces are triangulated and re-indexed so each vertex carries one
    /// position, normal and uv. A missing or broken MTL file leaves the
    /// meshes without materials; missing textures leave the factor alone.
    pub fn load_model(
        &mut self,
        device: &dyn GpuDevice,
        path: impl AsRef<Path>,
    ) -> Result<Model, LoadError> {
        let path = path.as_ref();
        let options = tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        };
        let (objects, materials) = tobj::load_obj(path, &options).map_err(|source| LoadError::Obj {
            path: path.to_path_buf(),
            source,
        })?;

        let materials = materials.unwrap_or_else(|err| {
            log::warn!("materials for '{}' could not be loaded: {err}", path.display());
            Vec::new()
        });
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let materials: Vec<Material> = materials
            .iter()
            .map(|m| self.convert_material(device, base_dir, m))
            .collect();

        let mut meshes = Vec::with_capacity(objects.len());
        for object in &objects {
            let mesh = &object.mesh;
            if mesh.indices.is_empty() {
                continue;
            }
            let vertices = build_vertices(mesh);
            let material = mesh.material_id.and_then(|i| materials.get(i).cloned());
            meshes.push(Mesh::from_geometry(
                device,
                &object.name,
                &vertices,
                &mesh.indices,
                material,
            )?);
        }
        if meshes.is_empty() {
            return Err(LoadError::NoGeometry(path.to_path_buf()));
        }

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("model"));
        log::info!(
            "loaded '{}': {} meshes, {} materials",
            path.display(),
            meshes.len(),
            materials.len()
        );
        Ok(Model::new(name, meshes))
    }

    #[inline]
    pub fn textures(&self) -> &TextureCache {
        &self.textures
    }

    fn convert_material(
        &mut self,
        device: &dyn GpuDevice,
        base_dir: &Path,
        mtl: &tobj::Material,
    ) -> Material {
        let mut material = Material {
            name: mtl.name.clone(),
            ..Material::default()
        };

        if let Some(kd) = mtl.diffuse {
            material.base_color.factor = Vec3::from_array(kd);
        }
        if let Some(ns) = mtl.shininess {
            material.roughness.factor = shininess_to_roughness(ns);
        }
        if let Some(d) = mtl.dissolve {
            material.opacity.factor = d;
        }
        if let Some(ke) = mtl.unknown_param.get("Ke").and_then(|v| parse_vec3(v)) {
            material.emissive.factor = ke;
        }

        let mut bind = |param_texture: Option<&str>, semantic: TextureSemantic| {
            param_texture.and_then(|name| self.texture(device, base_dir, name, semantic))
        };
        let base = bind(mtl.diffuse_texture.as_deref(), TextureSemantic::Color);
        let normal = bind(mtl.normal_texture.as_deref(), TextureSemantic::Data);
        let roughness = bind(mtl.shininess_texture.as_deref(), TextureSemantic::Data);
        let metalness = bind(mtl.specular_texture.as_deref(), TextureSemantic::Data);
        let opacity = bind(mtl.dissolve_texture.as_deref(), TextureSemantic::Data);
        let occlusion = bind(mtl.ambient_texture.as_deref(), TextureSemantic::Data);
        let emissive = bind(
            mtl.unknown_param.get("map_Ke").map(String::as_str),
            TextureSemantic::Color,
        );

        attach(&mut material.base_color, base, TextureSemantic::Color);
        attach(&mut material.normal, normal, TextureSemantic::Data);
        attach(&mut material.roughness, roughness, TextureSemantic::Data);
        attach(&mut material.metalness, metalness, TextureSemantic::Data);
        attach(&mut material.opacity, opacity, TextureSemantic::Data);
        attach(&mut material.occlusion, occlusion, TextureSemantic::Data);
        attach(&mut material.emissive, emissive, TextureSemantic::Color);
        material
    }

    fn texture(
        &mut self,
        device: &dyn GpuDevice,
        base_dir: &Path,
        statement: &str,
        semantic: TextureSemantic,
    ) -> Option<TextureHandle> {
        // Map statements may carry options ("-bm 0.5 bump.png"); the file comes last.
        let file = statement.split_whitespace().last()?;
        self.textures.load(device, &base_dir.join(file), semantic)
    }
}

fn attach<F>(param: &mut Parameter<F>, texture: Option<TextureHandle>, semantic: TextureSemantic) {
    if texture.is_some() {
        param.texture = texture;
        param.is_srgb = semantic.is_srgb();
    }
}

/// Maps a Phong specular exponent onto a perceptual roughness in `[0, 1]`.
fn shininess_to_roughness(ns: f32) -> f32 {
    (2.0 / (ns.max(0.0) + 2.0)).sqrt().clamp(0.0, 1.0)
}

fn parse_vec3(value: &str) -> Option<Vec3> {
    let mut it = value.split_whitespace().map(str::parse::<f32>);
    match (it.next(), it.next(), it.next()) {
        (Some(Ok(x)), Some(Ok(y)), Some(Ok(z))) => Some(Vec3::new(x, y, z)),
        _ => None,
    }
}

fn build_vertices(mesh: &tobj::Mesh) -> Vec<Vertex> {
    let positions: Vec<Vec3> = mesh
        .positions
        .chunks_exact(3)
        .map(|p| Vec3::new(p[0], p[1], p[2]))
        .collect();

    let normals: Vec<Vec3> = if mesh.normals.len() == mesh.positions.len() {
        mesh.normals
            .chunks_exact(3)
            .map(|n| Vec3::new(n[0], n[1], n[2]))
            .collect()
    } else {
        smooth_normals(&positions, &mesh.indices)
    };

    let has_uvs = mesh.texcoords.len() / 2 == positions.len();
    positions
        .iter()
        .enumerate()
        .map(|(i, p)| {
            // OBJ puts v = 0 at the bottom of the image; textures are uploaded top row first.
            let uv = if has_uvs {
                [mesh.texcoords[2 * i], 1.0 - mesh.texcoords[2 * i + 1]]
            } else {
                [0.0, 0.0]
            };
            Vertex::new(p.to_array(), normals[i].to_array(), uv)
        })
        .collect()
}

/// Area-weighted vertex normals for meshes exported without them.
fn smooth_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let (Some(pa), Some(pb), Some(pc)) = (positions.get(a), positions.get(b), positions.get(c))
        else {
            continue;
        };
        let face = (*pb - *pa).cross(*pc - *pa);
        normals[a] += face;
        normals[b] += face;
        normals[c] += face;
    }
    normals
        .into_iter()
        .map(|n| n.try_normalize().unwrap_or(Vec3::Y))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HeadlessDevice;
    use std::fs;

    const QUAD_OBJ: &str = "\
mtllib quad.mtl
o quad
v -1 -1 0
v 1 -1 0
v 1 1 0
v -1 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
usemtl red
f 1/1/1 2/2/1 3/3/1 4/4/1
";

    const QUAD_MTL: &str = "\
newmtl red
Kd 1 0 0
Ns 98
d 0.5
Ke 0.1 0.2 0.3
map_Kd albedo.png
map_Bump -bm 1.0 missing_normal.png
";

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lavender-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_png(path: &Path) {
        image::RgbaImage::from_pixel(2, 2, image::Rgba([255, 255, 255, 255]))
            .save(path)
            .unwrap();
    }

    // ── models ────────────────────────────────────────────────────────────

    #[test]
    fn quad_with_material_and_texture() {
        let dir = scratch_dir("quad");
        fs::write(dir.join("quad.obj"), QUAD_OBJ).unwrap();
        fs::write(dir.join("quad.mtl"), QUAD_MTL).unwrap();
        write_png(&dir.join("albedo.png"));

        let dev = HeadlessDevice::new();
        let mut loader = AssetLoader::new();
        let model = loader.load_model(&dev, dir.join("quad.obj")).unwrap();

        assert_eq!(model.name, "quad");
        assert_eq!(model.meshes.len(), 1);
        let submesh = &model.meshes[0].submeshes[0];
        assert_eq!(submesh.index_count, 6);

        let material = submesh.material.as_ref().unwrap();
        assert_eq!(material.name, "red");
        assert_eq!(material.base_color.factor, Vec3::X);
        assert!((material.roughness.factor - 0.02f32.sqrt()).abs() < 1e-5);
        assert_eq!(material.opacity.factor, 0.5);
        assert_eq!(material.emissive.factor, Vec3::new(0.1, 0.2, 0.3));

        let albedo = material.base_color.texture.unwrap();
        assert_eq!(dev.texture_is_srgb(albedo.id), Some(true));
        // The normal map is missing on disk.
        assert!(material.normal.texture.is_none());
        assert_eq!(loader.textures().len(), 1);
    }

    #[test]
    fn texture_v_is_flipped() {
        let dir = scratch_dir("uv");
        fs::write(dir.join("quad.obj"), QUAD_OBJ).unwrap();
        fs::write(dir.join("quad.mtl"), "newmtl red\nKd 1 0 0\n").unwrap();

        let dev = HeadlessDevice::new();
        let model = AssetLoader::new().load_model(&dev, dir.join("quad.obj")).unwrap();
        let mesh = &model.meshes[0];
        let buffer = mesh.vertex_buffers[0];
        let bytes = dev
            .read_buffer(buffer.id, 0, mesh.vertex_count * Vertex::STRIDE as usize)
            .unwrap();
        let vertices: Vec<Vertex> = bytes
            .chunks_exact(Vertex::STRIDE as usize)
            .map(bytemuck::pod_read_unaligned)
            .collect();

        let bottom_left = vertices
            .iter()
            .find(|v| v.position == [-1.0, -1.0, 0.0])
            .unwrap();
        assert_eq!(bottom_left.uv, [0.0, 1.0]);
        assert_eq!(bottom_left.normal, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn missing_mtl_leaves_meshes_unshaded() {
        let dir = scratch_dir("no-mtl");
        fs::write(dir.join("quad.obj"), QUAD_OBJ).unwrap();

        let dev = HeadlessDevice::new();
        let model = AssetLoader::new().load_model(&dev, dir.join("quad.obj")).unwrap();
        assert!(model.meshes[0].submeshes[0].material.is_none());
        assert_eq!(dev.texture_count(), 0);
    }

    // ── errors ────────────────────────────────────────────────────────────

    #[test]
    fn missing_file_is_an_obj_error() {
        let dev = HeadlessDevice::new();
        let path = std::env::temp_dir().join("lavender-does-not-exist.obj");
        let err = AssetLoader::new().load_model(&dev, &path).unwrap_err();
        assert!(matches!(err, LoadError::Obj { .. }));
    }

    #[test]
    fn file_without_faces_has_no_geometry() {
        let dir = scratch_dir("empty");
        fs::write(dir.join("points.obj"), "v 0 0 0\nv 1 0 0\n").unwrap();

        let dev = HeadlessDevice::new();
        let err = AssetLoader::new()
            .load_model(&dev, dir.join("points.obj"))
            .unwrap_err();
        assert!(matches!(err, LoadError::NoGeometry(_)));
    }

    // ── helpers ───────────────────────────────────────────────────────────

    #[test]
    fn smooth_normals_follow_winding() {
        let positions = [Vec3::ZERO, Vec3::X, Vec3::Y];
        let normals = smooth_normals(&positions, &[0, 1, 2]);
        assert!(normals.iter().all(|n| *n == Vec3::Z));
    }

    #[test]
    fn shininess_maps_into_unit_range() {
        assert_eq!(shininess_to_roughness(0.0), 1.0);
        assert!(shininess_to_roughness(1000.0) < 0.05);
        assert_eq!(parse_vec3("1 2"), None);
    }
}
