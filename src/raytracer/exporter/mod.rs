mod png;

pub use png::PngExporter;

use super::framebuffer::Framebuffer;
use std::path::Path;

pub trait Exporter {
    fn export(&self, framebuffer: &Framebuffer, path: &Path) -> Result<(), image::ImageError>;
}
