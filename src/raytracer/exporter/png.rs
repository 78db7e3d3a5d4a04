use super::{Exporter, Framebuffer};
use glam::Vec3;
use image::{ImageBuffer, Rgb};
use log::info;
use std::path::{Path, PathBuf};

/// Writes the frame as an 8-bit sRGB PNG.
#[derive(Default)]
pub struct PngExporter;

impl PngExporter {
    fn output_path(path: &Path) -> PathBuf {
        if path.extension().is_some() {
            path.to_path_buf()
        } else {
            path.with_extension("png")
        }
    }
}

impl Exporter for PngExporter {
    fn export(&self, framebuffer: &Framebuffer, path: &Path) -> Result<(), image::ImageError> {
        let width = framebuffer.width();
        let colors = framebuffer.to_color_buffer();
        let img = ImageBuffer::from_fn(width as u32, framebuffer.height() as u32, |x, y| {
            Rgb(linear_to_srgb_u8(colors[y as usize * width + x as usize]))
        });

        let path = Self::output_path(path);
        img.save(&path)?;
        info!("Saved {}", path.display());
        Ok(())
    }
}

fn linear_to_srgb_u8(color: Vec3) -> [u8; 3] {
    fn encode(c: f32) -> u8 {
        let c = if c.is_finite() { c.clamp(0.0, 1.0) } else { 0.0 };
        let srgb = if c <= 0.0031308 {
            12.92 * c
        } else {
            1.055 * c.powf(1.0 / 2.4) - 0.055
        };
        (srgb * 255.0).round() as u8
    }

    [encode(color.x), encode(color.y), encode(color.z)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn test_srgb_endpoints() {
        assert_eq!(linear_to_srgb_u8(Vec3::ZERO), [0, 0, 0]);
        assert_eq!(linear_to_srgb_u8(Vec3::ONE), [255, 255, 255]);
        assert_eq!(linear_to_srgb_u8(Vec3::new(-1.0, 4.0, f32::NAN)), [0, 255, 0]);
        assert_eq!(linear_to_srgb_u8(Vec3::splat(0.5))[0], 188);
    }

    #[test]
    fn test_writes_png_with_added_extension() {
        let dir = tempfile::tempdir().unwrap();
        let mut fb = Framebuffer::new(4, 2, Vec4::ZERO);
        fb.set_pixel(3, 1, Vec4::ONE);

        PngExporter.export(&fb, &dir.path().join("frame")).unwrap();

        let img = image::open(dir.path().join("frame.png")).unwrap().into_rgb8();
        assert_eq!(img.dimensions(), (4, 2));
        assert_eq!(img.get_pixel(3, 1).0, [255, 255, 255]);
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0]);
    }
}
