use super::{RenderOutcome, Renderer, ResumeToken};
use crate::raytracer::partition::{PartitionGrid, RegionWalk};
use crate::raytracer::ray::Ray;
use crate::raytracer::scene::Scene;
use crate::raytracer::shape::hit_closest;
use glam::{Vec3, Vec4};
use log::trace;

/// Traces rays through the regions this worker owns and hands the ray off as
/// soon as it enters a region owned by somebody else.
pub struct PartitionedRenderer {
    grid: PartitionGrid,
    materials: Vec<Vec3>,
    background: Vec4,
    worker_id: usize,
}

impl PartitionedRenderer {
    pub fn new(grid: PartitionGrid, materials: Vec<Vec3>, background: Vec4, worker_id: usize) -> Self {
        Self {
            grid,
            materials,
            background,
            worker_id,
        }
    }

    pub fn from_scene(scene: &Scene, worker_id: usize, worker_count: usize) -> Self {
        let grid = PartitionGrid::build(&scene.triangles, scene.grid, worker_count);
        Self::new(grid, scene.materials.clone(), scene.background, worker_id)
    }

    pub fn grid(&self) -> &PartitionGrid {
        &self.grid
    }

    fn trace(&self, ray: &Ray, walk: RegionWalk<'_>) -> RenderOutcome {
        for span in walk {
            let Some(region) = self.grid.region(span.region) else {
                break;
            };
            match region.owner {
                None => continue,
                Some(owner) if owner != self.worker_id => {
                    trace!("ray exits into region {} (worker {})", span.region, owner);
                    return RenderOutcome::Exited(encode_token(span.t_enter, span.region));
                }
                Some(_) => {}
            }

            let local = ray.with_t_range(span.t_enter.max(ray.t_min), span.t_exit);
            if let Some(hit) = hit_closest(&region.triangles, &local) {
                let albedo = self
                    .materials
                    .get(hit.material_id as usize)
                    .copied()
                    .unwrap_or(Vec3::splat(0.8));
                let n_dot_l = hit.normal.dot(-ray.direction).max(0.0);
                let color = albedo * (0.2 + 0.8 * n_dot_l);
                if !color.is_finite() {
                    return RenderOutcome::Failed;
                }
                return RenderOutcome::Color(color.extend(1.0));
            }
        }
        RenderOutcome::Color(self.background)
    }
}

fn encode_token(t_enter: f32, region: u32) -> ResumeToken {
    ResumeToken::with_partition((t_enter as f64).to_le_bytes().to_vec(), region)
}

fn decode_token(token: &ResumeToken) -> Option<(f32, u32)> {
    let state: [u8; 8] = token.state().try_into().ok()?;
    let region = token.partition_id()?;
    Some((f64::from_le_bytes(state) as f32, region))
}

impl Renderer for PartitionedRenderer {
    fn render_origin(&self, ray: &Ray, _x: u32, _y: u32) -> RenderOutcome {
        self.trace(ray, self.grid.walk(ray))
    }

    fn resume(&self, ray: &Ray, _x: u32, _y: u32, token: &ResumeToken) -> RenderOutcome {
        match decode_token(token) {
            Some((t_enter, region)) => self.trace(ray, self.grid.walk_from(ray, region, t_enter)),
            None => RenderOutcome::Failed,
        }
    }

    fn background(&self) -> Vec4 {
        self.background
    }
}
