use glam::{Vec3, Vec4};
use rayon::prelude::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelWrite {
    Fresh,
    Overwrite,
    OutOfBounds,
}

/// The job's output image: starts at a background colour and is filled in
/// one pixel at a time as worker results arrive.
pub struct Framebuffer {
    pixels: Vec<Vec4>,
    written: Vec<bool>,
    width: usize,
    height: usize,
}

impl Framebuffer {
    pub fn new(width: usize, height: usize, background: Vec4) -> Self {
        Self {
            pixels: vec![background; width * height],
            written: vec![false; width * height],
            width,
            height,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn set_pixel(&mut self, x: usize, y: usize, color: Vec4) -> PixelWrite {
        if x >= self.width || y >= self.height {
            return PixelWrite::OutOfBounds;
        }
        let idx = y * self.width + x;
        self.pixels[idx] = color;
        if self.written[idx] {
            PixelWrite::Overwrite
        } else {
            self.written[idx] = true;
            PixelWrite::Fresh
        }
    }

    #[cfg(test)]
    pub fn get_pixel(&self, x: usize, y: usize) -> Vec4 {
        self.pixels[y * self.width + x]
    }

    #[cfg(test)]
    pub fn written_count(&self) -> usize {
        self.written.iter().filter(|&&w| w).count()
    }

    #[cfg(test)]
    pub fn is_complete(&self) -> bool {
        self.written.iter().all(|&w| w)
    }

    pub fn to_color_buffer(&self) -> Vec<Vec3> {
        self.pixels.par_iter().map(|p| p.truncate()).collect()
    }
}
