mod aabb;
mod triangle;

use crate::raytracer::ray::{HitData, Ray};

pub use aabb::Aabb;
pub use triangle::Triangle;

pub trait Shape {
    fn bounds(&self) -> Aabb;
    fn hit(&self, ray: &Ray) -> Option<HitData>;
}

/// Closest hit over a slice of shapes.
pub fn hit_closest<S: Shape>(shapes: &[S], ray: &Ray) -> Option<HitData> {
    let mut ray = *ray;
    let mut closest = None;
    for shape in shapes {
        if let Some(hit) = shape.hit(&ray) {
            ray.t_max = hit.t;
            closest = Some(hit);
        }
    }
    closest
}
