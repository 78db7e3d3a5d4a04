mod partitioned;
mod token;

use crate::raytracer::ray::Ray;
use glam::Vec4;

pub use partitioned::PartitionedRenderer;
pub use token::{Continuation, ResumeToken};

#[derive(Debug)]
pub enum RenderOutcome {
    Color(Vec4),
    /// The ray left the local partition; resume it wherever the token points.
    Exited(ResumeToken),
    Failed,
}

pub trait Renderer {
    fn render_origin(&self, ray: &Ray, x: u32, y: u32) -> RenderOutcome;
    fn resume(&self, ray: &Ray, x: u32, y: u32, token: &ResumeToken) -> RenderOutcome;

    /// Colour reported for pixels whose render failed.
    fn background(&self) -> Vec4 {
        Vec4::ZERO
    }
}

pub trait SpatialIndex {
    fn owner_of(&self, token: &ResumeToken) -> Option<usize>;
}
