use crate::raytracer::camera::Camera;
use crate::raytracer::error::{NetError, SceneError};
use crate::raytracer::loader::gltf::load_model;
use crate::raytracer::net::{PayloadReader, PayloadWriter};
use crate::raytracer::shape::Triangle;
use glam::{EulerRot, Mat4, Quat, Vec3, Vec4};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MATERIAL: &str = "default";

fn default_fov() -> f32 {
    60.0
}

fn default_grid() -> [u32; 3] {
    [4, 4, 4]
}

fn default_material() -> String {
    DEFAULT_MATERIAL.to_string()
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CameraDescription {
    pub position: [f32; 3],
    pub look_at: [f32; 3],
    #[serde(default = "default_fov")]
    pub fov: f32,
}

/// The JSON scene file shared by the scheduler and every worker.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SceneDescription {
    pub camera: CameraDescription,
    #[serde(default)]
    pub background: [f32; 3],
    #[serde(default)]
    pub materials: BTreeMap<String, [f32; 3]>,
    /// Partition regions per axis.
    #[serde(default = "default_grid")]
    pub grid: [u32; 3],
    #[serde(default)]
    pub models: Vec<ModelDescriptor>,
}

impl SceneDescription {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SceneError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn background(&self) -> Vec4 {
        Vec3::from_array(self.background).extend(1.0)
    }

    /// Material albedos indexed by material id, plus the name lookup used to
    /// resolve model descriptors. Ids follow name order so every process
    /// derives the same table.
    fn material_table(&self) -> (Vec<Vec3>, BTreeMap<&str, u32>) {
        let mut albedos = Vec::with_capacity(self.materials.len() + 1);
        let mut ids = BTreeMap::new();
        for (name, rgb) in &self.materials {
            ids.insert(name.as_str(), albedos.len() as u32);
            albedos.push(Vec3::from_array(*rgb));
        }
        if !ids.contains_key(DEFAULT_MATERIAL) {
            ids.insert(DEFAULT_MATERIAL, albedos.len() as u32);
            albedos.push(Vec3::splat(0.8));
        }
        (albedos, ids)
    }
}

/// One mesh placed in the scene. Travels scheduler to worker as a Model message.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ModelDescriptor {
    pub filename: String,
    #[serde(default)]
    pub position: [f32; 3],
    /// Euler angles in degrees, applied X then Y then Z.
    #[serde(default)]
    pub orientation: [f32; 3],
    #[serde(default = "default_material")]
    pub material: String,
}

impl ModelDescriptor {
    pub fn transform(&self) -> Mat4 {
        let [rx, ry, rz] = self.orientation;
        let rotation = Quat::from_euler(
            EulerRot::XYZ,
            rx.to_radians(),
            ry.to_radians(),
            rz.to_radians(),
        );
        Mat4::from_rotation_translation(rotation, Vec3::from_array(self.position))
    }

    pub fn to_payload(&self) -> Vec<u8> {
        PayloadWriter::new()
            .vec3(Vec3::from_array(self.position))
            .vec3(Vec3::from_array(self.orientation))
            .str(&self.material)
            .str(&self.filename)
            .finish()
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, NetError> {
        let mut r = PayloadReader::new(payload);
        let position = r.vec3()?.to_array();
        let orientation = r.vec3()?.to_array();
        let material = r.str()?;
        let filename = r.str()?;
        Ok(ModelDescriptor {
            filename,
            position,
            orientation,
            material,
        })
    }
}

/// Body of the SceneFile message: which scene to load and this worker's
/// place in the job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SceneAssignment {
    pub filename: String,
    pub width: u32,
    pub height: u32,
    pub worker_id: u32,
    pub worker_count: u32,
}

impl SceneAssignment {
    pub fn to_payload(&self) -> Vec<u8> {
        PayloadWriter::new()
            .str(&self.filename)
            .u32(self.width)
            .u32(self.height)
            .u32(self.worker_id)
            .u32(self.worker_count)
            .finish()
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, NetError> {
        let mut r = PayloadReader::new(payload);
        Ok(SceneAssignment {
            filename: r.str()?,
            width: r.u32()?,
            height: r.u32()?,
            worker_id: r.u32()?,
            worker_count: r.u32()?,
        })
    }
}

pub struct Scene {
    pub camera: Camera,
    pub background: Vec4,
    pub materials: Vec<Vec3>,
    pub triangles: Vec<Triangle>,
    pub grid: [u32; 3],
}

impl Scene {
    /// Loads the scene file and the given models. Model filenames are
    /// resolved against the scene file's directory.
    pub fn load(
        scene_path: &Path,
        models: &[ModelDescriptor],
        width: u32,
        height: u32,
    ) -> Result<Scene, SceneError> {
        let description = SceneDescription::from_file(scene_path)?;
        let base_dir = scene_path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::build(&description, models, &base_dir, width, height)
    }

    pub fn build(
        description: &SceneDescription,
        models: &[ModelDescriptor],
        base_dir: &Path,
        width: u32,
        height: u32,
    ) -> Result<Scene, SceneError> {
        let (materials, material_ids) = description.material_table();

        let mut triangles = Vec::new();
        for model in models {
            let material_id = *material_ids
                .get(model.material.as_str())
                .ok_or_else(|| SceneError::UnknownMaterial(model.material.clone()))?;
            let path = resolve(base_dir, &model.filename);
            let loaded = load_model(&path, model.transform(), material_id)?;
            info!("Loaded {} ({} triangles)", path.display(), loaded.len());
            triangles.extend(loaded);
        }

        let cam = &description.camera;
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        let camera = Camera::new(
            Vec3::from_array(cam.position),
            Vec3::from_array(cam.look_at),
            cam.fov,
            aspect,
        );

        Ok(Scene {
            camera,
            background: description.background(),
            materials,
            triangles,
            grid: description.grid,
        })
    }
}

fn resolve(base_dir: &Path, filename: &str) -> PathBuf {
    let path = Path::new(filename);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::raytracer::loader::gltf::tests::write_triangle_gltf;

    /// Writes `scene.json` plus one glTF triangle per model position into
    /// `dir` and returns the scene path.
    pub(crate) fn write_scene(dir: &Path, model_positions: &[[f32; 3]]) -> PathBuf {
        write_triangle_gltf(dir, "tri", [0.0, 0.0, 0.0]);
        let models: Vec<_> = model_positions
            .iter()
            .map(|p| ModelDescriptor {
                filename: "tri.gltf".to_string(),
                position: *p,
                orientation: [0.0; 3],
                material: "red".to_string(),
            })
            .collect();
        let description = serde_json::json!({
            "camera": { "position": [0.5, 0.5, 10.0], "look_at": [0.5, 0.5, 0.0], "fov": 40.0 },
            "background": [0.1, 0.2, 0.3],
            "materials": { "red": [1.0, 0.0, 0.0] },
            "grid": [2, 1, 1],
            "models": models,
        });
        let path = dir.join("scene.json");
        fs::write(&path, description.to_string()).unwrap();
        path
    }

    #[test]
    fn test_load_scene_with_models() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_scene(dir.path(), &[[0.0, 0.0, 0.0], [5.0, 0.0, 0.0]]);
        let description = SceneDescription::from_file(&path).unwrap();
        assert_eq!(description.models.len(), 2);

        let scene = Scene::load(&path, &description.models, 32, 16).unwrap();
        assert_eq!(scene.triangles.len(), 2);
        assert_eq!(scene.grid, [2, 1, 1]);
        assert_eq!(scene.background, Vec4::new(0.1, 0.2, 0.3, 1.0));
        assert_eq!(scene.triangles[1].v0, Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(scene.materials[scene.triangles[0].material_id as usize], Vec3::X);
        assert!((scene.camera.aspect_ratio - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_material_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_scene(dir.path(), &[]);
        let model = ModelDescriptor {
            filename: "tri.gltf".to_string(),
            position: [0.0; 3],
            orientation: [0.0; 3],
            material: "chrome".to_string(),
        };
        match Scene::load(&path, &[model], 8, 8) {
            Err(SceneError::UnknownMaterial(name)) => assert_eq!(name, "chrome"),
            Err(e) => panic!("unexpected error {e}"),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn test_orientation_is_in_degrees() {
        let model = ModelDescriptor {
            filename: String::new(),
            position: [1.0, 0.0, 0.0],
            orientation: [0.0, 90.0, 0.0],
            material: DEFAULT_MATERIAL.to_string(),
        };
        let p = model.transform().transform_point3(Vec3::X);
        assert!((p - Vec3::new(1.0, 0.0, -1.0)).length() < 1e-5);
    }

    #[test]
    fn test_model_payload_layout() {
        let model = ModelDescriptor {
            filename: "bunny.glb".to_string(),
            position: [1.0, 2.0, 3.0],
            orientation: [0.0, 45.0, 0.0],
            material: "red".to_string(),
        };
        let payload = model.to_payload();
        assert_eq!(payload.len(), 48 + "red\0".len() + "bunny.glb\0".len());
        assert_eq!(ModelDescriptor::from_payload(&payload).unwrap(), model);
    }
}
