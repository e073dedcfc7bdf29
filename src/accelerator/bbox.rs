use glam::Vec3;

use super::SpatialAccelerator;
use crate::geometry::Bounds;
use crate::mesh::Mesh;

/// Grid of explicit cell boxes with linear-scan lookups
///
/// Cells are stored x-fastest: `(z·r + y)·r + x`. Overlap tests use the weak
/// (ε-fattened) box intersection, so degenerate axes still work.
#[derive(Debug, Clone)]
pub struct BBoxBasedAccelerator {
    resolution: usize,
    cells: Vec<Bounds>,
    spatial_map: Vec<Vec<u32>>,
    seen: Vec<u32>,
    generation: u32,
    pending: Vec<usize>,
    cell: Option<usize>,
    cursor: usize,
}

impl BBoxBasedAccelerator {
    pub fn new(mesh: &Mesh, resolution: usize) -> Self {
        let resolution = resolution.max(1);
        let bounds = *mesh.bounding_box();
        let step = bounds.dimensions() / resolution as f32;
        let mut cells = Vec::with_capacity(resolution.pow(3));
        for z in 0..resolution {
            for y in 0..resolution {
                for x in 0..resolution {
                    let lo = Vec3::new(x as f32, y as f32, z as f32);
                    cells.push(Bounds::new(
                        bounds.min + step * lo,
                        bounds.min + step * (lo + Vec3::ONE),
                    ));
                }
            }
        }

        let mut spatial_map = vec![Vec::new(); cells.len()];
        for facet in 0..mesh.facet_count() {
            let fb = mesh.facet_bounds(facet);
            for (cell, cb) in cells.iter().enumerate() {
                if cb.weak_intersects(&fb) {
                    spatial_map[cell].push(facet as u32);
                }
            }
        }

        Self {
            resolution,
            cells,
            spatial_map,
            seen: vec![0; mesh.facet_count()],
            generation: 0,
            pending: Vec::new(),
            cell: None,
            cursor: 0,
        }
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

    fn start_iteration(&mut self) {
        self.cell = self.pending.pop();
        self.cursor = 0;
    }
}

impl SpatialAccelerator for BBoxBasedAccelerator {
    fn set_bounds_query(&mut self, bounds: &Bounds) {
        self.begin_query();
        for (i, cb) in self.cells.iter().enumerate() {
            if !self.spatial_map[i].is_empty() && cb.weak_intersects(bounds) {
                self.pending.push(i);
            }
        }
        self.start_iteration();
    }

    fn set_point_query(&mut self, point: Vec3) {
        self.begin_query();
        let per_slice = self.resolution * self.resolution;
        let mut columns: Vec<usize> = Vec::new();
        for (i, cb) in self.cells.iter().enumerate() {
            let column = i % per_slice;
            if !columns.contains(&column) && cb.fattened(crate::geometry::BBOX_TEST_EPS).contains(point) {
                columns.push(column);
            }
        }
        for column in columns {
            for z in 0..self.resolution {
                let cell = z * per_slice + column;
                if !self.spatial_map[cell].is_empty() {
                    self.pending.push(cell);
                }
            }
        }
        self.start_iteration();
    }

    fn next_facet(&mut self) -> Option<usize> {
        while let Some(cell) = self.cell {
            let bucket = &self.spatial_map[cell];
            if self.cursor >= bucket.len() {
                self.start_iteration();
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::tests::box_mesh;

    #[test]
    fn test_bbox_point_query_returns_column() {
        let mesh = box_mesh(Vec3::ZERO, Vec3::ONE);
        let mut accel = BBoxBasedAccelerator::new(&mesh, 4);
        accel.set_point_query(Vec3::new(0.1, 0.1, 0.5));
        let found = accel.collect_facets();
        // both bottom and top triangles over (0.1, 0.1)
        assert!(found.contains(&0) || found.contains(&1));
        assert!(found.contains(&2) || found.contains(&3));

        let mut unique = found.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), found.len());
    }

    #[test]
    fn test_bbox_query_outside_is_empty() {
        let mesh = box_mesh(Vec3::ZERO, Vec3::ONE);
        let mut accel = BBoxBasedAccelerator::new(&mesh, 3);
        accel.set_bounds_query(&Bounds::new(Vec3::splat(5.0), Vec3::splat(6.0)));
        assert_eq!(accel.next_facet(), None);
    }
}
