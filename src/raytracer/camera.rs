use crate::raytracer::ray::Ray;
use glam::{Mat4, Vec3, Vec4};

#[derive(Clone, Debug)]
pub struct Camera {
    pub position: Vec3,
    pub look_at: Vec3,
    pub fov: f32,
    pub aspect_ratio: f32,
    inv_vp_matrix: Mat4,
}

impl Camera {
    pub fn new(position: Vec3, look_at: Vec3, fov: f32, aspect_ratio: f32) -> Self {
        let mut camera = Camera {
            position,
            look_at,
            fov,
            aspect_ratio,
            inv_vp_matrix: Mat4::IDENTITY,
        };
        camera.update_matrix();
        camera
    }

    pub fn forward(&self) -> Vec3 {
        (self.look_at - self.position).normalize_or_zero()
    }

    pub fn update_matrix(&mut self) {
        let forward = self.forward();
        // Looking straight up or down makes Y a degenerate up vector.
        let up = if forward.cross(Vec3::Y).length_squared() < 1e-6 {
            Vec3::Z
        } else {
            Vec3::Y
        };

        let fov_rad = self.fov.to_radians();
        let vp_matrix = Mat4::perspective_rh(fov_rad, self.aspect_ratio, 0.1, 1000.0)
            * Mat4::look_at_rh(self.position, self.position + forward, up);
        self.inv_vp_matrix = vp_matrix.inverse();
    }

    /// `u`, `v` in [0, 1], origin at the top-left of the image.
    pub fn generate_ray(&self, u: f32, v: f32) -> Ray {
        let ndc_x = 2.0 * u - 1.0;
        let ndc_y = 1.0 - 2.0 * v;
        let near_point = self.inv_vp_matrix * Vec4::new(ndc_x, ndc_y, -1.0, 1.0);
        let far_point = self.inv_vp_matrix * Vec4::new(ndc_x, ndc_y, 1.0, 1.0);

        let near_point = near_point.truncate() / near_point.w;
        let far_point = far_point.truncate() / far_point.w;

        Ray::new(near_point, (far_point - near_point).normalize())
    }

    /// Ray through the centre of pixel `(x, y)`.
    pub fn pixel_ray(&self, x: u32, y: u32, width: u32, height: u32) -> Ray {
        let u = (x as f32 + 0.5) / width as f32;
        let v = (y as f32 + 0.5) / height as f32;
        self.generate_ray(u, v)
    }
}
