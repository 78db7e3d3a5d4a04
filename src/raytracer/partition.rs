use crate::raytracer::ray::Ray;
use crate::raytracer::renderer::{ResumeToken, SpatialIndex};
use crate::raytracer::shape::{Aabb, Shape, Triangle};
use glam::{IVec3, UVec3, Vec3};

const BOUNDS_PADDING: f32 = 1e-3;

pub struct Region {
    pub triangles: Vec<Triangle>,
    pub owner: Option<usize>,
}

/// Regular grid of regions over the scene bounds. Each non-empty region is
/// owned by exactly one worker; empty regions belong to nobody.
pub struct PartitionGrid {
    bounds: Aabb,
    dims: UVec3,
    region_size: Vec3,
    regions: Vec<Region>,
}

/// One region pierced by a ray, with the parametric span spent inside it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegionSpan {
    pub region: u32,
    pub t_enter: f32,
    pub t_exit: f32,
}

impl PartitionGrid {
    pub fn build(triangles: &[Triangle], dims: [u32; 3], worker_count: usize) -> Self {
        let dims = UVec3::from_array(dims).max(UVec3::ONE);

        let mut bounds = Aabb::EMPTY;
        for tri in triangles {
            bounds.grow(&tri.bounds());
        }
        let bounds = if bounds.is_empty() {
            bounds
        } else {
            bounds.padded(BOUNDS_PADDING)
        };
        let region_size = bounds.extent() / dims.as_vec3();

        let count = (dims.x * dims.y * dims.z) as usize;
        let mut regions: Vec<Region> = (0..count)
            .map(|_| Region {
                triangles: Vec::new(),
                owner: None,
            })
            .collect();

        let mut grid = PartitionGrid {
            bounds,
            dims,
            region_size,
            regions: Vec::new(),
        };

        for tri in triangles {
            let tb = tri.bounds();
            let lo = grid.cell_of(tb.min);
            let hi = grid.cell_of(tb.max);
            for z in lo.z..=hi.z {
                for y in lo.y..=hi.y {
                    for x in lo.x..=hi.x {
                        let cell = UVec3::new(x, y, z);
                        if grid.region_bounds(cell).overlaps(&tb) {
                            regions[grid.index_of(cell) as usize].triangles.push(*tri);
                        }
                    }
                }
            }
        }

        // Round-robin over non-empty regions in index order.
        let workers = worker_count.max(1);
        let mut next = 0;
        for region in regions.iter_mut().filter(|r| !r.triangles.is_empty()) {
            region.owner = Some(next % workers);
            next += 1;
        }

        grid.regions = regions;
        grid
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn region(&self, id: u32) -> Option<&Region> {
        self.regions.get(id as usize)
    }

    pub fn owner(&self, id: u32) -> Option<usize> {
        self.region(id).and_then(|r| r.owner)
    }

    /// Regions owned by `worker`, mostly for logging.
    pub fn owned_by(&self, worker: usize) -> usize {
        self.regions
            .iter()
            .filter(|r| r.owner == Some(worker))
            .count()
    }

    fn cell_of(&self, p: Vec3) -> UVec3 {
        let rel = ((p - self.bounds.min) / self.region_size).floor();
        let max = (self.dims - UVec3::ONE).as_vec3();
        rel.clamp(Vec3::ZERO, max).as_uvec3()
    }

    fn index_of(&self, cell: UVec3) -> u32 {
        cell.x + self.dims.x * (cell.y + self.dims.y * cell.z)
    }

    fn cell_from_index(&self, id: u32) -> UVec3 {
        let x = id % self.dims.x;
        let y = (id / self.dims.x) % self.dims.y;
        let z = id / (self.dims.x * self.dims.y);
        UVec3::new(x, y, z)
    }

    fn region_bounds(&self, cell: UVec3) -> Aabb {
        let min = self.bounds.min + cell.as_vec3() * self.region_size;
        Aabb::new(min, min + self.region_size)
    }

    /// Regions pierced by `ray`, front to back, starting where the ray
    /// enters the grid.
    pub fn walk(&self, ray: &Ray) -> RegionWalk<'_> {
        match self.bounds.intersect(ray) {
            Some((t_enter, t_exit)) if !self.bounds.is_empty() => {
                let cell = self.cell_of(ray.at(t_enter));
                RegionWalk::new(self, ray, cell, t_enter, t_exit)
            }
            _ => RegionWalk::finished(self),
        }
    }

    /// Restarts a walk inside `region` at `t_enter`, as recorded in a
    /// resumption token.
    pub fn walk_from(&self, ray: &Ray, region: u32, t_enter: f32) -> RegionWalk<'_> {
        if self.bounds.is_empty() || region as usize >= self.regions.len() {
            return RegionWalk::finished(self);
        }
        let t_exit = self
            .bounds
            .intersect(ray)
            .map_or(t_enter, |(_, t_far)| t_far)
            .max(t_enter);
        RegionWalk::new(self, ray, self.cell_from_index(region), t_enter, t_exit)
    }
}

impl SpatialIndex for PartitionGrid {
    fn owner_of(&self, token: &ResumeToken) -> Option<usize> {
        token.partition_id().and_then(|id| self.owner(id))
    }
}

/// 3D DDA over the grid.
pub struct RegionWalk<'a> {
    grid: &'a PartitionGrid,
    cell: IVec3,
    step: IVec3,
    t_next: Vec3,
    t_delta: Vec3,
    t_enter: f32,
    t_end: f32,
    done: bool,
}

impl<'a> RegionWalk<'a> {
    fn new(grid: &'a PartitionGrid, ray: &Ray, cell: UVec3, t_enter: f32, t_end: f32) -> Self {
        let step = IVec3::new(
            sign(ray.direction.x),
            sign(ray.direction.y),
            sign(ray.direction.z),
        );
        let cell_min = grid.bounds.min + cell.as_vec3() * grid.region_size;
        let next_plane = cell_min + step.max(IVec3::ZERO).as_vec3() * grid.region_size;

        let axis_t = |plane: f32, origin: f32, inv: f32, step: i32| {
            if step == 0 {
                f32::INFINITY
            } else {
                (plane - origin) * inv
            }
        };
        let t_next = Vec3::new(
            axis_t(next_plane.x, ray.origin.x, ray.inv_direction.x, step.x),
            axis_t(next_plane.y, ray.origin.y, ray.inv_direction.y, step.y),
            axis_t(next_plane.z, ray.origin.z, ray.inv_direction.z, step.z),
        );
        let t_delta = (grid.region_size * ray.inv_direction).abs();

        RegionWalk {
            grid,
            cell: cell.as_ivec3(),
            step,
            t_next,
            t_delta,
            t_enter,
            t_end,
            done: false,
        }
    }

    fn finished(grid: &'a PartitionGrid) -> Self {
        RegionWalk {
            grid,
            cell: IVec3::ZERO,
            step: IVec3::ZERO,
            t_next: Vec3::INFINITY,
            t_delta: Vec3::INFINITY,
            t_enter: 0.0,
            t_end: 0.0,
            done: true,
        }
    }
}

fn sign(v: f32) -> i32 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

impl Iterator for RegionWalk<'_> {
    type Item = RegionSpan;

    fn next(&mut self) -> Option<RegionSpan> {
        if self.done {
            return None;
        }

        let dims = self.grid.dims.as_ivec3();
        if self.cell.cmplt(IVec3::ZERO).any() || self.cell.cmpge(dims).any() {
            self.done = true;
            return None;
        }

        let axis = if self.t_next.x <= self.t_next.y && self.t_next.x <= self.t_next.z {
            0
        } else if self.t_next.y <= self.t_next.z {
            1
        } else {
            2
        };
        let t_exit = self.t_next[axis].min(self.t_end).max(self.t_enter);

        let span = RegionSpan {
            region: self.grid.index_of(self.cell.as_uvec3()),
            t_enter: self.t_enter,
            t_exit,
        };

        if t_exit >= self.t_end {
            self.done = true;
        } else {
            self.cell[axis] += self.step[axis];
            self.t_next[axis] += self.t_delta[axis];
            self.t_enter = t_exit;
        }

        Some(span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tri_at(x: f32) -> Triangle {
        Triangle::new(
            Vec3::new(x, 0.0, 0.0),
            Vec3::new(x + 0.5, 0.0, 0.0),
            Vec3::new(x, 0.5, 0.0),
            0,
        )
    }

    /// Four triangles spread along X so a 4x1x1 grid puts one in each region.
    fn strip(workers: usize) -> PartitionGrid {
        let tris: Vec<_> = (0..4).map(|i| tri_at(i as f32 * 2.0)).collect();
        PartitionGrid::build(&tris, [4, 1, 1], workers)
    }

    #[test]
    fn test_round_robin_owners() {
        let grid = strip(2);
        assert_eq!(grid.region_count(), 4);
        let owners: Vec<_> = (0..4).map(|id| grid.owner(id)).collect();
        assert_eq!(owners, vec![Some(0), Some(1), Some(0), Some(1)]);
        assert_eq!(grid.owned_by(0), 2);
    }

    #[test]
    fn test_empty_regions_have_no_owner() {
        let tris = [tri_at(0.0), tri_at(6.0)];
        let grid = PartitionGrid::build(&tris, [4, 1, 1], 3);
        assert_eq!(grid.owner(0), Some(0));
        assert_eq!(grid.owner(1), None);
        assert_eq!(grid.owner(2), None);
        assert_eq!(grid.owner(3), Some(1));
    }

    #[test]
    fn test_owner_of_reads_token_tail() {
        let grid = strip(2);
        let token = ResumeToken::with_partition(vec![0; 8], 3);
        assert_eq!(grid.owner_of(&token), Some(1));

        let bogus = ResumeToken::with_partition(Vec::new(), 99);
        assert_eq!(grid.owner_of(&bogus), None);
        assert_eq!(grid.owner_of(&ResumeToken::from_bytes(vec![1])), None);
    }

    #[test]
    fn test_walk_visits_regions_front_to_back() {
        let grid = strip(1);
        let ray = Ray::new(Vec3::new(-5.0, 0.25, 0.0), Vec3::X);
        let spans: Vec<_> = grid.walk(&ray).collect();
        assert_eq!(
            spans.iter().map(|s| s.region).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        for pair in spans.windows(2) {
            assert_eq!(pair[0].t_exit, pair[1].t_enter);
        }

        let back = Ray::new(Vec3::new(20.0, 0.25, 0.0), -Vec3::X);
        let regions: Vec<_> = grid.walk(&back).map(|s| s.region).collect();
        assert_eq!(regions, vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_walk_from_resumes_mid_grid() {
        let grid = strip(1);
        let ray = Ray::new(Vec3::new(-5.0, 0.25, 0.0), Vec3::X);
        let third = grid.walk(&ray).nth(2).unwrap();

        let resumed: Vec<_> = grid.walk_from(&ray, third.region, third.t_enter).collect();
        assert_eq!(resumed[0].region, 2);
        assert_eq!(resumed[0].t_enter, third.t_enter);
        assert_eq!(resumed.last().map(|s| s.region), Some(3));
    }

    #[test]
    fn test_miss_and_empty_grid_walk_nothing() {
        let grid = strip(1);
        let miss = Ray::new(Vec3::new(-5.0, 10.0, 0.0), Vec3::X);
        assert_eq!(grid.walk(&miss).count(), 0);

        let empty = PartitionGrid::build(&[], [2, 2, 2], 2);
        assert_eq!(empty.walk(&Ray::new(Vec3::ZERO, Vec3::X)).count(), 0);
        assert_eq!(empty.owner(0), None);
    }
}
