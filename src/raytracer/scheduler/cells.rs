use crate::raytracer::error::NetError;
use crate::raytracer::net::{PayloadReader, PayloadWriter};

/// Inclusive pixel rectangle handed to a worker as one unit of work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cell {
    pub top: u32,
    pub left: u32,
    pub bottom: u32,
    pub right: u32,
}

impl Cell {
    pub fn width(&self) -> u32 {
        self.right - self.left + 1
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top + 1
    }

    pub fn pixel_count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    /// Pixels in scanline order.
    pub fn pixels(&self) -> impl Iterator<Item = (u32, u32)> {
        let (left, right) = (self.left, self.right);
        (self.top..=self.bottom).flat_map(move |y| (left..=right).map(move |x| (x, y)))
    }

    pub fn to_payload(&self) -> Vec<u8> {
        PayloadWriter::new()
            .u32(self.top)
            .u32(self.left)
            .u32(self.bottom)
            .u32(self.right)
            .finish()
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, NetError> {
        let mut r = PayloadReader::new(payload);
        let cell = Cell {
            top: r.u32()?,
            left: r.u32()?,
            bottom: r.u32()?,
            right: r.u32()?,
        };
        if cell.right < cell.left || cell.bottom < cell.top {
            return Err(NetError::Malformed("cell bounds"));
        }
        Ok(cell)
    }
}

/// Yields the cells of a `width x height` image in row-major order, clipping
/// the last column and row of cells to the image edge.
pub struct CellPartitioner {
    width: u32,
    height: u32,
    gran_x: u32,
    gran_y: u32,
    next_x: u32,
    next_y: u32,
}

impl CellPartitioner {
    pub fn new(width: u32, height: u32, gran_x: u32, gran_y: u32) -> Self {
        Self {
            width,
            height,
            gran_x: gran_x.max(1),
            gran_y: gran_y.max(1),
            next_x: 0,
            next_y: 0,
        }
    }

    pub fn total_cells(&self) -> usize {
        let across = self.width.div_ceil(self.gran_x) as usize;
        let down = self.height.div_ceil(self.gran_y) as usize;
        across * down
    }
}

impl Iterator for CellPartitioner {
    type Item = Cell;

    fn next(&mut self) -> Option<Cell> {
        if self.width == 0 || self.next_y >= self.height {
            return None;
        }

        let cell = Cell {
            top: self.next_y,
            left: self.next_x,
            bottom: self.next_y.saturating_add(self.gran_y - 1).min(self.height - 1),
            right: self.next_x.saturating_add(self.gran_x - 1).min(self.width - 1),
        };

        if cell.right == self.width - 1 {
            self.next_x = 0;
            self.next_y = cell.bottom + 1;
        } else {
            self.next_x = cell.right + 1;
        }

        Some(cell)
    }
}
