//! Hull-based bonds: midplane interfaces and forced bonds

use glam::Vec3;

use super::{check_support, split_geometry, Bond, BondDesc, BondGenerator};
use crate::error::{FractureError, Result};
use crate::geometry::{
    get_plane_segment_intersection, hulls_separating_plane, CollisionHull, CollisionHullBuilder,
    Plane, Triangle, EPS_PLANE, MAXIMUM_EXTENT,
};
use crate::triangle_processor::{convex_polygon_area, TriangleProcessor};

/// Share of each hull's depth range pushed through the plane by forced bonds
pub const DEFAULT_BOND_OVERLAPPING: f32 = 0.3;

/// Shift applied to the first hull when the separating plane is not finite
const SEPARATION_RETRY_SHIFT: f32 = 1e-6;

fn mean(points: &[Vec3]) -> Vec3 {
    if points.is_empty() {
        return Vec3::ZERO;
    }
    points.iter().copied().sum::<Vec3>() / points.len() as f32
}

/// Interface between two point sets through the midplane of their hulls
///
/// Points of either chunk lying past the midplane (or within half the gap
/// of it) are projected onto it; their planar hull is the interface.
/// Returns `None` when the hulls are farther apart than `max_separation` or
/// the interface is degenerate.
pub(super) fn process_with_midplanes(
    points0: &[Vec3],
    points1: &[Vec3],
    hull0: &CollisionHull,
    hull1: &CollisionHull,
    max_separation: f32,
) -> Option<Bond> {
    if points0.len() < 4 || points1.len() < 4 {
        return None;
    }
    let separation = hulls_separating_plane(hull0, hull1, max_separation)?;
    let midplane = separation.plane;
    let tolerance = separation.gap().max(0.0) * 0.5 + EPS_PLANE;

    let mut interface = Vec::new();
    for points in [points0, points1] {
        let side = midplane.distance(mean(points));
        interface.extend(points.iter().filter_map(|&p| {
            let dst = midplane.distance(p);
            (dst * side < 0.0 || dst.abs() <= tolerance).then(|| midplane.project(p))
        }));
    }

    let polygon = TriangleProcessor::new().build_convex_hull(&interface, midplane.n);
    let area = convex_polygon_area(&polygon);
    if polygon.len() < 3 || area <= 0.0 {
        return None;
    }
    Some(Bond {
        normal: midplane.n.to_array(),
        area,
        centroid: mean(&polygon).to_array(),
        user_data: 0,
    })
}

/// Signed distances of the points farthest from and closest to `plane`
fn distance_range(plane: &Plane, points: &[Vec3]) -> (f32, f32) {
    let mut farthest = 0.0f32;
    let mut closest = MAXIMUM_EXTENT;
    for &p in points {
        let d = plane.distance(p);
        if d.abs() > farthest.abs() {
            farthest = d;
        }
        if d.abs() < closest.abs() {
            closest = d;
        }
    }
    (farthest, closest)
}

/// Cross section of `hull` moved by `-n * offset` with `plane`
fn shifted_cross_section(hull: &CollisionHull, plane: &Plane, offset: f32) -> Vec<Vec3> {
    let shift = plane.n * offset;
    let mut section = Vec::new();
    for i in 0..hull.polygons.len() {
        let polygon: Vec<Vec3> = hull.polygon_points(i).map(|p| p - shift).collect();
        for j in 0..polygon.len() {
            let next = polygon[(j + 1) % polygon.len()];
            if let Some(point) = get_plane_segment_intersection(plane, polygon[j], next) {
                section.push(point);
            }
        }
    }
    section
}

/// Bond between two hulls regardless of their distance
///
/// Both hulls are pushed through their separating plane by `overlapping`
/// of their depth range; the bond is the average of the two cross
/// sections. Returns `None` when no plane or cross section exists.
pub(super) fn create_bond_forced(
    hull0: &CollisionHull,
    hull1: &CollisionHull,
    overlapping: f32,
) -> Option<Bond> {
    let separation = hulls_separating_plane(hull0, hull1, f32::INFINITY).or_else(|| {
        let mut shifted = hull0.clone();
        shifted.translate(Vec3::splat(SEPARATION_RETRY_SHIFT));
        hulls_separating_plane(&shifted, hull1, f32::INFINITY)
    })?;
    let plane = separation.plane;

    let processor = TriangleProcessor::new();
    let mut area = 0.0;
    let mut centroid = Vec3::ZERO;
    for hull in [hull0, hull1] {
        let (farthest, closest) = distance_range(&plane, &hull.points);
        let offset = closest + (farthest - closest) * overlapping;
        let section = processor.build_convex_hull(&shifted_cross_section(hull, &plane, offset), plane.n);
        if section.len() >= 3 {
            area += convex_polygon_area(&section);
            centroid += mean(&section);
        }
    }
    if area <= 0.0 {
        return None;
    }
    Some(Bond {
        normal: plane.n.to_array(),
        area: area * 0.5,
        centroid: (centroid * 0.5).to_array(),
        user_data: 0,
    })
}

impl<B: CollisionHullBuilder> BondGenerator<B> {
    /// Bonds between every pair of support chunks whose hulls are within
    /// `max_separation` of each other
    pub fn create_full_bond_list_averaged(
        &mut self,
        geometry: &[Triangle],
        offsets: &[u32],
        support: &[bool],
        max_separation: f32,
    ) -> Result<Vec<BondDesc>> {
        let chunk_count = split_geometry(geometry, offsets)?.len();
        check_support(support, chunk_count)?;
        self.build_geometry_cache(geometry, offsets)?;

        let mut result = Vec::new();
        for i in (0..chunk_count).filter(|&i| support[i]) {
            for j in (i + 1..chunk_count).filter(|&j| support[j]) {
                let bond = process_with_midplanes(
                    &self.hull_points_cache[i],
                    &self.hull_points_cache[j],
                    &self.hull_cache[i],
                    &self.hull_cache[j],
                    max_separation,
                );
                if let Some(bond) = bond {
                    result.push(BondDesc {
                        bond,
                        chunk_indices: [i as u32, j as u32],
                    });
                }
            }
        }
        log::debug!("averaged bonds: {} for {} chunks", result.len(), chunk_count);
        Ok(result)
    }

    /// Forced bond between two convex hulls, see [`DEFAULT_BOND_OVERLAPPING`]
    ///
    /// # Errors
    ///
    /// [`FractureError::BondNotFound`] when
    /// the hulls yield no interface.
    pub fn create_bond_forced_internal(
        &self,
        hull0: &CollisionHull,
        hull1: &CollisionHull,
        overlapping: f32,
    ) -> Result<Bond> {
        create_bond_forced(hull0, hull1, overlapping).ok_or(FractureError::BondNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bond::tests::boxes;
    use crate::geometry::{Bounds, ParryHullBuilder};

    fn box_hull(min: Vec3, max: Vec3) -> CollisionHull {
        CollisionHull::from_bounds(&Bounds::new(min, max))
    }

    #[test]
    fn test_midplane_between_touching_boxes() {
        let h0 = box_hull(Vec3::ZERO, Vec3::ONE);
        let h1 = box_hull(Vec3::X, Vec3::new(2.0, 1.0, 1.0));
        let bond = process_with_midplanes(&h0.points, &h1.points, &h0, &h1, 0.0).unwrap();
        assert!((bond.area - 1.0).abs() < 1e-4);
        assert!((Vec3::from(bond.normal) - Vec3::X).length() < 1e-4);
        assert!((Vec3::from(bond.centroid) - Vec3::new(1.0, 0.5, 0.5)).length() < 1e-4);
    }

    #[test]
    fn test_midplane_respects_max_separation() {
        let h0 = box_hull(Vec3::ZERO, Vec3::ONE);
        let h1 = box_hull(Vec3::new(1.2, 0.0, 0.0), Vec3::new(2.2, 1.0, 1.0));
        assert!(process_with_midplanes(&h0.points, &h1.points, &h0, &h1, 0.1).is_none());
        let bond = process_with_midplanes(&h0.points, &h1.points, &h0, &h1, 0.5).unwrap();
        assert!((bond.area - 1.0).abs() < 1e-4);
        assert!((bond.centroid[0] - 1.1).abs() < 1e-4);
    }

    #[test]
    fn test_forced_bond_between_distant_boxes() {
        let h0 = box_hull(Vec3::ZERO, Vec3::ONE);
        let h1 = box_hull(Vec3::new(3.0, 0.0, 0.0), Vec3::new(4.0, 1.0, 1.0));
        let generator = BondGenerator::new();
        let bond = generator.create_bond_forced_internal(&h0, &h1, DEFAULT_BOND_OVERLAPPING).unwrap();
        assert!((bond.area - 1.0).abs() < 1e-4);
        assert!(Vec3::from(bond.normal).dot(Vec3::X) > 0.99);
        assert!((bond.centroid[0] - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_forced_bond_averages_cross_sections() {
        // a 2x2 face against a 1x1 face
        let h0 = box_hull(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(0.0, 1.0, 1.0));
        let h1 = box_hull(Vec3::new(0.0, -0.5, -0.5), Vec3::new(1.0, 0.5, 0.5));
        let bond = create_bond_forced(&h0, &h1, DEFAULT_BOND_OVERLAPPING).unwrap();
        assert!((bond.area - 2.5).abs() < 1e-3);
    }

    #[test]
    fn test_forced_bond_without_geometry() {
        let h0 = box_hull(Vec3::ZERO, Vec3::ONE);
        assert!(create_bond_forced(&h0, &CollisionHull::default(), 0.3).is_none());
    }

    #[test]
    fn test_averaged_bond_list() {
        let (geometry, offsets) = boxes(&[
            (Vec3::ZERO, Vec3::ONE),
            (Vec3::X, Vec3::new(2.0, 1.0, 1.0)),
            (Vec3::Y, Vec3::new(1.0, 2.0, 1.0)),
        ]);
        let mut generator = BondGenerator::with_hull_builder(ParryHullBuilder);
        let bonds = generator
            .create_full_bond_list_averaged(&geometry, &offsets, &[true; 3], 0.0)
            .unwrap();
        let pairs: Vec<[u32; 2]> = bonds.iter().map(|b| b.chunk_indices).collect();
        assert!(pairs.contains(&[0, 1]));
        assert!(pairs.contains(&[0, 2]));
        for b in bonds.iter().filter(|b| b.chunk_indices[0] == 0) {
            assert!((b.bond.area - 1.0).abs() < 1e-3);
        }

        let bonds = generator
            .create_full_bond_list_averaged(&geometry, &offsets, &[true, false, true], 0.0)
            .unwrap();
        assert_eq!(bonds.len(), 1);
        assert_eq!(bonds[0].chunk_indices, [0, 2]);
    }
}
