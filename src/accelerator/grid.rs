use glam::Vec3;

use super::SpatialAccelerator;
use crate::geometry::Bounds;
use crate::mesh::Mesh;

/// Padding added around the mesh bounds and each facet box
const GRID_FATTENING: f32 = 0.001;

/// Which part of a point's z-column a point query walks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointSearchDirection {
    #[default]
    All,
    /// Cells at or above the point
    Upward,
    /// Cells at or below the point
    Downward,
}

/// Uniform grid of facet buckets over a mesh
///
/// Cell `(i, j, k)` lives at `(i·r + j)·r + k`. A grid is built once per
/// mesh; any number of [`GridWalker`]s can then query it.
#[derive(Debug, Clone)]
pub struct Grid {
    resolution: usize,
    bounds: Bounds,
    cell_size: Vec3,
    cells: Vec<Vec<u32>>,
    facet_count: usize,
}

impl Grid {
    pub fn new(resolution: usize) -> Self {
        let resolution = resolution.max(1);
        Self {
            resolution,
            bounds: Bounds::empty(),
            cell_size: Vec3::ONE,
            cells: vec![Vec::new(); resolution.pow(3)],
            facet_count: 0,
        }
    }

    /// Bucket every facet of `mesh` into the cells its fattened box touches
    pub fn set_mesh(&mut self, mesh: &Mesh) {
        self.cells.iter_mut().for_each(Vec::clear);
        self.facet_count = mesh.facet_count();
        self.bounds = mesh.bounding_box().fattened(GRID_FATTENING);
        self.cell_size = (self.bounds.dimensions() / self.resolution as f32).max(Vec3::splat(f32::EPSILON));
        for facet in 0..mesh.facet_count() {
            let fb = mesh.facet_bounds(facet).fattened(GRID_FATTENING);
            let (lo, hi) = self.cell_range(&fb);
            for i in lo[0]..=hi[0] {
                for j in lo[1]..=hi[1] {
                    for k in lo[2]..=hi[2] {
                        let id = self.cell_id(i, j, k);
                        self.cells[id].push(facet as u32);
                    }
                }
            }
        }
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    #[inline]
    fn cell_id(&self, i: usize, j: usize, k: usize) -> usize {
        (i * self.resolution + j) * self.resolution + k
    }

    fn axis_cell(&self, value: f32, axis: usize) -> usize {
        let t = ((value - self.bounds.min[axis]) / self.cell_size[axis]).floor();
        t.clamp(0.0, (self.resolution - 1) as f32) as usize
    }

    /// Inclusive cell index range covered by `bounds`, clamped to the grid
    fn cell_range(&self, bounds: &Bounds) -> ([usize; 3], [usize; 3]) {
        let mut lo = [0; 3];
        let mut hi = [0; 3];
        for axis in 0..3 {
            lo[axis] = self.axis_cell(bounds.min[axis], axis);
            hi[axis] = self.axis_cell(bounds.max[axis], axis);
        }
        (lo, hi)
    }
}

/// Query cursor over a [`Grid`]
#[derive(Debug, Clone)]
pub struct GridWalker<'a> {
    grid: &'a Grid,
    direction: PointSearchDirection,
    seen: Vec<u32>,
    generation: u32,
    pending: Vec<usize>,
    cell: Option<usize>,
    cursor: usize,
}

impl<'a> GridWalker<'a> {
    pub fn new(grid: &'a Grid) -> Self {
        Self {
            grid,
            direction: PointSearchDirection::All,
            seen: vec![0; grid.facet_count],
            generation: 0,
            pending: Vec::new(),
            cell: None,
            cursor: 0,
        }
    }

    /// Restrict point queries to one half of the z-column
    pub fn with_direction(mut self, direction: PointSearchDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn set_direction(&mut self, direction: PointSearchDirection) {
        self.direction = direction;
    }

    fn begin_query(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if self.generation == 0 {
            self.seen.iter_mut().for_each(|s| *s = 0);
            self.generation = 1;
        }
        self.pending.clear();
        self.cell = None;
        self.cursor = 0;
    }

    fn push_cell(&mut self, id: usize) {
        if !self.grid.cells[id].is_empty() {
            self.pending.push(id);
        }
    }
}

impl SpatialAccelerator for GridWalker<'_> {
    fn set_bounds_query(&mut self, bounds: &Bounds) {
        self.begin_query();
        if bounds.is_empty() || !self.grid.bounds.intersects(bounds) {
            return;
        }
        let (lo, hi) = self.grid.cell_range(bounds);
        // pending is a stack; push in reverse to visit cells in index order
        for i in (lo[0]..=hi[0]).rev() {
            for j in (lo[1]..=hi[1]).rev() {
                for k in (lo[2]..=hi[2]).rev() {
                    let id = self.grid.cell_id(i, j, k);
                    self.push_cell(id);
                }
            }
        }
        self.cell = self.pending.pop();
    }

    fn set_point_query(&mut self, point: Vec3) {
        self.begin_query();
        let b = &self.grid.bounds;
        if point.x < b.min.x || point.x > b.max.x || point.y < b.min.y || point.y > b.max.y {
            return;
        }
        let i = self.grid.axis_cell(point.x, 0);
        let j = self.grid.axis_cell(point.y, 1);
        let kp = self.grid.axis_cell(point.z, 2);
        let last = self.grid.resolution - 1;
        let (k_lo, k_hi) = match self.direction {
            PointSearchDirection::All => (0, last),
            PointSearchDirection::Upward => {
                if point.z > b.max.z {
                    return;
                }
                (kp, last)
            }
            PointSearchDirection::Downward => {
                if point.z < b.min.z {
                    return;
                }
                (0, kp)
            }
        };
        for k in (k_lo..=k_hi).rev() {
            let id = self.grid.cell_id(i, j, k);
            self.push_cell(id);
        }
        self.cell = self.pending.pop();
    }

    fn next_facet(&mut self) -> Option<usize> {
        while let Some(cell) = self.cell {
            let bucket = &self.grid.cells[cell];
            if self.cursor >= bucket.len() {
                self.cell = self.pending.pop();
                self.cursor = 0;
                continue;
            }
            let facet = bucket[self.cursor] as usize;
            self.cursor += 1;
            if self.seen[facet] != self.generation {
                self.seen[facet] = self.generation;
                return Some(facet);
            }
        }
        None
    }
}
