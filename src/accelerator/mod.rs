//! Spatial acceleration structures over mesh facets
//!
//! Every accelerator answers two kinds of queries: "which facets may overlap
//! this box" and "which facets may lie in the vertical column through this
//! point". Results are produced lazily through [`SpatialAccelerator::next_facet`];
//! one instance is reused for many queries so no per-query allocation is needed.
//!
//! Accelerators never miss a facet whose bounds overlap the query. They may
//! return extra candidates; callers run the exact test themselves.

mod bbox;
mod grid;
mod sweep;

pub use bbox::BBoxBasedAccelerator;
pub use grid::{Grid, GridWalker, PointSearchDirection};
pub use sweep::{SweepingAccelerator, SWEEP_RESOLUTION};

use glam::Vec3;

use crate::geometry::Bounds;
use crate::mesh::Mesh;

/// Candidate facet enumeration for box and point queries
pub trait SpatialAccelerator {
    /// Start a query for facets that may overlap `bounds`
    fn set_bounds_query(&mut self, bounds: &Bounds);

    /// Start a query for facets that may overlap facet `facet` of `mesh`
    fn set_facet_query(&mut self, mesh: &Mesh, facet: usize) {
        let bounds = mesh.facet_bounds(facet);
        self.set_bounds_query(&bounds);
    }

    /// Start a query for facets that may cover `point` in the xy plane
    fn set_point_query(&mut self, point: Vec3);

    /// Next candidate of the current query, `None` once exhausted
    fn next_facet(&mut self) -> Option<usize>;

    /// Drain the remaining candidates of the current query
    fn collect_facets(&mut self) -> Vec<usize> {
        let mut out = Vec::new();
        while let Some(f) = self.next_facet() {
            out.push(f);
        }
        out
    }
}

/// Returns every facet; baseline for the other accelerators
#[derive(Debug, Clone)]
pub struct DummyAccelerator {
    count: usize,
    current: usize,
}

impl DummyAccelerator {
    pub fn new(count: usize) -> Self {
        Self { count, current: 0 }
    }
}

impl SpatialAccelerator for DummyAccelerator {
    fn set_bounds_query(&mut self, _bounds: &Bounds) {
        self.current = 0;
    }

    fn set_point_query(&mut self, _point: Vec3) {
        self.current = 0;
    }

    fn next_facet(&mut self) -> Option<usize> {
        if self.current < self.count {
            self.current += 1;
            Some(self.current - 1)
        } else {
            None
        }
    }
}
