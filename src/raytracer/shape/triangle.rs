use crate::raytracer::ray::{HitData, Ray};
use crate::raytracer::shape::{Aabb, Shape};
use glam::Vec3;

const AABB_EPSILON: f32 = 1e-5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triangle {
    pub v0: Vec3,
    pub v1: Vec3,
    pub v2: Vec3,
    pub normal: Vec3,
    pub material_id: u32,
}

impl Triangle {
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3, material_id: u32) -> Self {
        let normal = (v1 - v0).cross(v2 - v0).normalize_or_zero();
        Triangle {
            v0,
            v1,
            v2,
            normal,
            material_id,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.normal == Vec3::ZERO
    }
}

impl Shape for Triangle {
    fn bounds(&self) -> Aabb {
        let mut aabb = Aabb::from_point(self.v0);
        aabb.grow_point(self.v1);
        aabb.grow_point(self.v2);
        aabb.padded(AABB_EPSILON)
    }

    // Möller–Trumbore.
    #[inline]
    fn hit(&self, ray: &Ray) -> Option<HitData> {
        let edge1 = self.v1 - self.v0;
        let edge2 = self.v2 - self.v0;
        let h = ray.direction.cross(edge2);
        let a = edge1.dot(h);

        if a.abs() < 1e-8 {
            return None;
        }

        let f = 1.0 / a;
        let s = ray.origin - self.v0;
        let u = f * s.dot(h);

        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(edge1);
        let v = f * ray.direction.dot(q);

        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = f * edge2.dot(q);
        if t >= ray.t_min && t <= ray.t_max {
            Some(HitData {
                t,
                material_id: self.material_id,
                normal: self.normal,
            })
        } else {
            None
        }
    }
}
