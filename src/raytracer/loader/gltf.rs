use crate::raytracer::error::SceneError;
use crate::raytracer::shape::Triangle;
use glam::{Mat4, Vec3};
use std::path::Path;

/// Loads every triangle primitive of a glTF file into world space, applying
/// the node hierarchy first and then `model_transform`.
pub fn load_model<P: AsRef<Path>>(
    path: P,
    model_transform: Mat4,
    material_id: u32,
) -> Result<Vec<Triangle>, SceneError> {
    let (document, buffers, _images) = gltf::import(path.as_ref())?;
    Ok(load_meshes(&document, &buffers, model_transform, material_id))
}

fn compute_global_transforms(document: &gltf::Document) -> Vec<Mat4> {
    let node_count = document.nodes().count();
    let mut global_transforms = vec![Mat4::IDENTITY; node_count];

    fn traverse(node: gltf::Node, parent_transform: Mat4, global_transforms: &mut [Mat4]) {
        let local = Mat4::from_cols_array_2d(&node.transform().matrix());
        let global = parent_transform * local;
        global_transforms[node.index()] = global;

        for child in node.children() {
            traverse(child, global, global_transforms);
        }
    }

    for scene in document.scenes() {
        for node in scene.nodes() {
            traverse(node, Mat4::IDENTITY, &mut global_transforms);
        }
    }

    global_transforms
}

fn load_meshes(
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
    model_transform: Mat4,
    material_id: u32,
) -> Vec<Triangle> {
    let global_transforms = compute_global_transforms(document);
    let mut triangles = Vec::new();

    for node in document.nodes() {
        let Some(mesh) = node.mesh() else {
            continue;
        };
        let transform = model_transform * global_transforms[node.index()];

        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                continue;
            }

            let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|b| &b[..]));

            let positions: Vec<Vec3> = reader
                .read_positions()
                .map(|iter| {
                    iter.map(|p| transform.transform_point3(Vec3::from_array(p)))
                        .collect()
                })
                .unwrap_or_default();

            if positions.is_empty() {
                continue;
            }

            let indices: Vec<u32> = reader
                .read_indices()
                .map(|iter| iter.into_u32().collect())
                .unwrap_or_else(|| (0..positions.len() as u32).collect());

            triangles.extend(
                indices
                    .chunks_exact(3)
                    .filter_map(|c| {
                        let v0 = *positions.get(c[0] as usize)?;
                        let v1 = *positions.get(c[1] as usize)?;
                        let v2 = *positions.get(c[2] as usize)?;
                        Some(Triangle::new(v0, v1, v2, material_id))
                    })
                    .filter(|t| !t.is_degenerate()),
            );
        }
    }

    triangles
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;

    /// Writes a one-triangle glTF (with its .bin buffer) into `dir`.
    pub(crate) fn write_triangle_gltf(dir: &Path, name: &str, translation: [f32; 3]) {
        let vertices: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let bytes: Vec<u8> = vertices.iter().flat_map(|v| v.to_le_bytes()).collect();
        fs::write(dir.join(format!("{name}.bin")), bytes).unwrap();

        let json = serde_json::json!({
            "asset": { "version": "2.0" },
            "buffers": [{ "uri": format!("{name}.bin"), "byteLength": 36 }],
            "bufferViews": [{ "buffer": 0, "byteLength": 36 }],
            "accessors": [{
                "bufferView": 0,
                "componentType": 5126,
                "count": 3,
                "type": "VEC3",
                "min": [0.0, 0.0, 0.0],
                "max": [1.0, 1.0, 0.0]
            }],
            "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 } }] }],
            "nodes": [{ "mesh": 0, "translation": translation }],
            "scenes": [{ "nodes": [0] }],
            "scene": 0
        });
        fs::write(dir.join(format!("{name}.gltf")), json.to_string()).unwrap();
    }

    #[test]
    fn test_node_and_model_transforms_compose() {
        let dir = tempfile::tempdir().unwrap();
        write_triangle_gltf(dir.path(), "tri", [0.0, 0.0, -2.0]);

        let model = Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0));
        let tris = load_model(dir.path().join("tri.gltf"), model, 3).unwrap();

        assert_eq!(tris.len(), 1);
        assert_eq!(tris[0].material_id, 3);
        assert_eq!(tris[0].v0, Vec3::new(10.0, 0.0, -2.0));
        assert_eq!(tris[0].v1, Vec3::new(11.0, 0.0, -2.0));
        assert!((tris[0].normal - Vec3::Z).length() < 1e-6);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_model(dir.path().join("nope.gltf"), Mat4::IDENTITY, 0).is_err());
    }
}
