use std::collections::BTreeSet;

use glam::Vec3;

use super::SpatialAccelerator;
use crate::geometry::Bounds;
use crate::mesh::Mesh;

/// Number of buckets per axis
pub const SWEEP_RESOLUTION: usize = 2048;

/// Facet boxes are grown by this factor around their centers
const FACET_BOX_SCALE: f32 = 1.1;

#[derive(Debug, Clone, Copy, PartialEq)]
struct SegmentEvent {
    coord: f32,
    facet: u32,
    end: bool,
}

/// Per-axis sweep-and-prune buckets
///
/// Each axis is split into [`SWEEP_RESOLUTION`] buckets; a bucket lists every
/// facet whose (scaled) extent overlaps it. Box queries mark facets found on
/// x, then y, and confirm on z. Point queries only use x and y.
#[derive(Debug, Clone)]
pub struct SweepingAccelerator {
    minimal: Vec3,
    rescale: Vec3,
    buckets: [Vec<Vec<u32>>; 3],
    found_x: Vec<u32>,
    found_y: Vec<u32>,
    iteration: u32,
    indices: Vec<u32>,
    current: usize,
}

fn scaled_facet_bounds(mesh: &Mesh, facet: usize) -> Bounds {
    let b = mesh.facet_bounds(facet);
    let c = b.center();
    let half = b.dimensions() * 0.5 * FACET_BOX_SCALE;
    Bounds::new(c - half, c + half)
}

/// Fill `buckets` from events sorted by coordinate
fn build_index(events: &[SegmentEvent], offset: f32, mlt: f32, buckets: &mut [Vec<u32>]) {
    let mut enabled: BTreeSet<u32> = BTreeSet::new();
    let mut last_block = 0usize;
    for ev in events {
        let block = ((ev.coord - offset) * mlt).max(0.0) as usize;
        if block >= SWEEP_RESOLUTION {
            break;
        }
        if block != last_block {
            for bucket in &mut buckets[last_block + 1..=block] {
                bucket.extend(enabled.iter().copied());
            }
            last_block = block;
        }
        if ev.end {
            enabled.remove(&ev.facet);
        } else {
            buckets[last_block].push(ev.facet);
            enabled.insert(ev.facet);
        }
    }
}

impl SweepingAccelerator {
    pub fn new(mesh: &Mesh) -> Self {
        let facet_count = mesh.facet_count();
        let mut events: [Vec<SegmentEvent>; 3] = Default::default();
        for facet in 0..facet_count {
            let b = scaled_facet_bounds(mesh, facet);
            for (axis, list) in events.iter_mut().enumerate() {
                list.push(SegmentEvent { coord: b.min[axis], facet: facet as u32, end: false });
                list.push(SegmentEvent { coord: b.max[axis], facet: facet as u32, end: true });
            }
        }
        for list in &mut events {
            // starts before ends at equal coordinates so touching boxes overlap
            list.sort_by(|a, b| a.coord.total_cmp(&b.coord).then(a.end.cmp(&b.end)).then(a.facet.cmp(&b.facet)));
        }

        let mut minimal = Vec3::ZERO;
        let mut rescale = Vec3::ONE;
        for axis in 0..3 {
            if let (Some(first), Some(last)) = (events[axis].first(), events[axis].last()) {
                minimal[axis] = first.coord;
                let extent = ((last.coord - first.coord) * 1.01).max(f32::EPSILON);
                rescale[axis] = SWEEP_RESOLUTION as f32 / extent;
            }
        }

        let mut buckets: [Vec<Vec<u32>>; 3] = Default::default();
        for axis in 0..3 {
            buckets[axis] = vec![Vec::new(); SWEEP_RESOLUTION];
            build_index(&events[axis], minimal[axis], rescale[axis], &mut buckets[axis]);
        }

        Self {
            minimal,
            rescale,
            buckets,
            found_x: vec![0; facet_count],
            found_y: vec![0; facet_count],
            iteration: 1,
            indices: Vec::new(),
            current: 0,
        }
    }

    /// Bucket range of `[lo, hi]` on `axis`, `None` when entirely outside
    fn bucket_range(&self, axis: usize, lo: f32, hi: f32) -> Option<(usize, usize)> {
        let start = ((lo - self.minimal[axis]) * self.rescale[axis]).max(0.0);
        let end = (hi - self.minimal[axis]) * self.rescale[axis];
        if end < 0.0 || start >= SWEEP_RESOLUTION as f32 {
            return None;
        }
        Some((start as usize, (end as usize).min(SWEEP_RESOLUTION - 1)))
    }

    fn advance_iteration(&mut self, step: u32) {
        self.iteration = self.iteration.wrapping_add(step);
        if self.iteration < step {
            self.found_x.iter_mut().for_each(|v| *v = 0);
            self.found_y.iter_mut().for_each(|v| *v = 0);
            self.iteration = 1;
        }
    }
}

impl SpatialAccelerator for SweepingAccelerator {
    fn set_bounds_query(&mut self, bounds: &Bounds) {
        self.current = 0;
        self.indices.clear();
        if bounds.is_empty() {
            return;
        }
        let c = bounds.center();
        let half = bounds.dimensions() * 0.5 * FACET_BOX_SCALE;
        let (lo, hi) = (c - half, c + half);
        let id = self.iteration;

        if let Some((s, e)) = self.bucket_range(0, lo.x, hi.x) {
            for bucket in &self.buckets[0][s..=e] {
                for &f in bucket {
                    self.found_x[f as usize] = id;
                }
            }
        }
        if let Some((s, e)) = self.bucket_range(1, lo.y, hi.y) {
            for bucket in &self.buckets[1][s..=e] {
                for &f in bucket {
                    self.found_y[f as usize] = id;
                }
            }
        }
        if let Some((s, e)) = self.bucket_range(2, lo.z, hi.z) {
            for bucket in &self.buckets[2][s..=e] {
                for &f in bucket {
                    let f = f as usize;
                    if self.found_x[f] == id && self.found_y[f] == id {
                        self.found_x[f] = id + 1;
                        self.found_y[f] = id + 1;
                        self.indices.push(f as u32);
                    }
                }
            }
        }
        self.advance_iteration(2);
    }

    fn set_point_query(&mut self, point: Vec3) {
        self.current = 0;
        self.indices.clear();
        let id = self.iteration;
        let x = self.bucket_range(0, point.x, point.x);
        let y = self.bucket_range(1, point.y, point.y);
        if let (Some((xi, _)), Some((yi, _))) = (x, y) {
            for &f in &self.buckets[0][xi] {
                self.found_x[f as usize] = id;
            }
            for &f in &self.buckets[1][yi] {
                if self.found_x[f as usize] == id {
                    self.found_x[f as usize] = id + 1;
                    self.indices.push(f);
                }
            }
        }
        self.advance_iteration(2);
    }

    fn next_facet(&mut self) -> Option<usize> {
        let facet = self.indices.get(self.current).copied()?;
        self.current += 1;
        Some(facet as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::tests::box_mesh;

    #[test]
    fn test_build_index_spans_blocks() {
        let events = [
            SegmentEvent { coord: 0.0, facet: 0, end: false },
            SegmentEvent { coord: 0.5, facet: 1, end: false },
            SegmentEvent { coord: 2.5, facet: 0, end: true },
            SegmentEvent { coord: 3.5, facet: 1, end: true },
        ];
        let mut buckets = vec![Vec::new(); SWEEP_RESOLUTION];
        build_index(&events, 0.0, 1.0, &mut buckets);
        assert_eq!(buckets[0], vec![0, 1]);
        assert_eq!(buckets[1], vec![0, 1]);
        assert_eq!(buckets[2], vec![0, 1]);
        assert_eq!(buckets[3], vec![1]);
        assert!(buckets[4].is_empty());
    }

    #[test]
    fn test_far_query_finds_nothing() {
        let mesh = box_mesh(Vec3::ZERO, Vec3::ONE);
        let mut accel = SweepingAccelerator::new(&mesh);
        accel.set_bounds_query(&Bounds::new(Vec3::splat(10.0), Vec3::splat(11.0)));
        assert_eq!(accel.next_facet(), None);
        accel.set_point_query(Vec3::new(-5.0, 0.5, 0.5));
        assert_eq!(accel.next_facet(), None);
    }

    #[test]
    fn test_point_query_hits_top_and_bottom() {
        let mesh = box_mesh(Vec3::ZERO, Vec3::ONE);
        let mut accel = SweepingAccelerator::new(&mesh);
        accel.set_point_query(Vec3::new(0.5, 0.5, 0.5));
        let found = accel.collect_facets();
        for f in 0..4 {
            assert!(found.contains(&f));
        }
    }
}
