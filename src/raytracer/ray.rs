use crate::raytracer::error::NetError;
use crate::raytracer::net::{PayloadReader, PayloadWriter};
use glam::Vec3;

pub const RAY_EPSILON: f32 = 0.001;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub inv_direction: Vec3,
    pub t_min: f32,
    pub t_max: f32,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Ray {
            origin,
            direction,
            inv_direction: Vec3::new(1.0 / direction.x, 1.0 / direction.y, 1.0 / direction.z),
            t_min: RAY_EPSILON,
            t_max: f32::INFINITY,
        }
    }

    pub fn with_t_range(mut self, t_min: f32, t_max: f32) -> Self {
        self.t_min = t_min;
        self.t_max = t_max;
        self
    }

    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    // Only origin and direction travel; the parametric range is renderer state.
    pub fn write(&self, w: PayloadWriter) -> PayloadWriter {
        w.vec3(self.origin).vec3(self.direction)
    }

    pub fn read(r: &mut PayloadReader) -> Result<Self, NetError> {
        let origin = r.vec3()?;
        let direction = r.vec3()?;
        Ok(Ray::new(origin, direction))
    }
}

pub struct HitData {
    pub t: f32,
    pub material_id: u32,
    pub normal: Vec3,
}
