//! Exact bonds from coplanar, opposite-facing triangles

use std::collections::BTreeMap;

use glam::Vec3;

use super::{check_support, split_geometry, Bond, BondDesc, BondGenerator, PlaneChunkIndexer, BOND_AREA_THRESHOLD};
use crate::error::Result;
use crate::geometry::{CollisionHullBuilder, Plane, Triangle, EPS_PLANE};
use crate::triangle_processor::{convex_polygon_area, TriangleProcessor};

#[derive(Debug, Default)]
struct Interface {
    normal: Vec3,
    area: f32,
    point_sum: Vec3,
    point_count: u32,
}

fn plane_order(a: &Plane, b: &Plane) -> std::cmp::Ordering {
    a.d.total_cmp(&b.d)
        .then(a.n.x.total_cmp(&b.n.x))
        .then(a.n.y.total_cmp(&b.n.y))
        .then(a.n.z.total_cmp(&b.n.z))
}

/// Interfaces between all pairs of support chunks
///
/// Every support triangle is indexed by its plane. For each triangle the
/// triangles lying on the same plane with opposite orientation are found by
/// binary search on `d`, and the overlap of each such pair is accumulated
/// into the bond of the two chunks. Bonds are ordered by chunk pair.
pub(super) fn exact_bonds(
    chunks: &[&[Triangle]],
    support: &[bool],
    planes: &mut Vec<PlaneChunkIndexer>,
) -> Vec<BondDesc> {
    planes.clear();
    for (chunk, triangles) in chunks.iter().enumerate().filter(|(i, _)| support[*i]) {
        for (tr, t) in triangles.iter().enumerate() {
            let plane = Plane::from_points(t.a.p, t.b.p, t.c.p);
            if plane.n == Vec3::ZERO {
                continue;
            }
            planes.push(PlaneChunkIndexer {
                chunk_id: chunk as i32,
                tr_id: tr as i32,
                plane,
            });
        }
    }
    planes.sort_by(|a, b| plane_order(&a.plane, &b.plane));

    let processor = TriangleProcessor::new();
    let mut interfaces: BTreeMap<(i32, i32), Interface> = BTreeMap::new();
    for entry in planes.iter() {
        let opposite = entry.plane.negated();
        let start = planes.partition_point(|p| p.plane.d + EPS_PLANE < opposite.d);
        let end = planes.partition_point(|p| p.plane.d - EPS_PLANE <= opposite.d);
        let tri = chunks[entry.chunk_id as usize][entry.tr_id as usize].positions();

        for other in &planes[start..end] {
            if other.chunk_id <= entry.chunk_id || !other.plane.is_same(&opposite) {
                continue;
            }
            let other_tri = chunks[other.chunk_id as usize][other.tr_id as usize].positions();
            let polygon = processor.triangle_intersection(&tri, &other_tri, entry.plane.n);
            let area = convex_polygon_area(&polygon);
            if area <= BOND_AREA_THRESHOLD {
                continue;
            }
            let interface = interfaces
                .entry((entry.chunk_id, other.chunk_id))
                .or_insert_with(|| Interface {
                    normal: entry.plane.n,
                    ..Default::default()
                });
            interface.area += area;
            interface.point_sum += polygon.iter().copied().sum::<Vec3>();
            interface.point_count += polygon.len() as u32;
        }
    }

    interfaces
        .into_iter()
        .map(|((c0, c1), i)| BondDesc {
            bond: Bond {
                normal: i.normal.to_array(),
                area: i.area,
                centroid: (i.point_sum / i.point_count as f32).to_array(),
                user_data: 0,
            },
            chunk_indices: [c0 as u32, c1 as u32],
        })
        .collect()
}

impl<B: CollisionHullBuilder> BondGenerator<B> {
    /// Bonds between every pair of support chunks sharing coplanar faces
    pub fn create_full_bond_list_exact(
        &mut self,
        geometry: &[Triangle],
        offsets: &[u32],
        support: &[bool],
    ) -> Result<Vec<BondDesc>> {
        let chunks = split_geometry(geometry, offsets)?;
        check_support(support, chunks.len())?;
        let bonds = exact_bonds(&chunks, support, &mut self.plane_cache);
        log::debug!(
            "exact bonds: {} from {} indexed triangles",
            bonds.len(),
            self.plane_cache.len()
        );
        Ok(bonds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bond::tests::boxes;
    use crate::error::FractureError;

    #[test]
    fn test_exact_bonds_of_box_column() {
        let (geometry, offsets) = boxes(&[
            (Vec3::ZERO, Vec3::ONE),
            (Vec3::Z, Vec3::new(1.0, 1.0, 2.0)),
            (Vec3::new(0.0, 0.0, 2.0), Vec3::new(1.0, 1.0, 3.0)),
        ]);
        let mut generator = BondGenerator::new();
        let bonds = generator
            .create_full_bond_list_exact(&geometry, &offsets, &[true; 3])
            .unwrap();
        assert_eq!(bonds.len(), 2);
        assert_eq!(bonds[0].chunk_indices, [0, 1]);
        assert_eq!(bonds[1].chunk_indices, [1, 2]);
        for (k, bond) in bonds.iter().enumerate() {
            assert!((bond.bond.area - 1.0).abs() < 1e-4);
            assert!((Vec3::from(bond.bond.normal) - Vec3::Z).length() < 1e-4);
            assert!((bond.bond.centroid[2] - (k + 1) as f32).abs() < 1e-4);
        }
    }

    #[test]
    fn test_exact_bonds_partial_overlap() {
        // the second box is shifted by half along y
        let (geometry, offsets) = boxes(&[
            (Vec3::ZERO, Vec3::ONE),
            (Vec3::new(1.0, 0.5, 0.0), Vec3::new(2.0, 1.5, 1.0)),
        ]);
        let mut generator = BondGenerator::new();
        let bonds = generator
            .create_full_bond_list_exact(&geometry, &offsets, &[true, true])
            .unwrap();
        assert_eq!(bonds.len(), 1);
        assert!((bonds[0].bond.area - 0.5).abs() < 1e-4);
        assert!((bonds[0].bond.centroid[0] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_exact_bonds_skip_non_support() {
        let (geometry, offsets) = boxes(&[(Vec3::ZERO, Vec3::ONE), (Vec3::X, Vec3::new(2.0, 1.0, 1.0))]);
        let mut generator = BondGenerator::new();
        let bonds = generator
            .create_full_bond_list_exact(&geometry, &offsets, &[true, false])
            .unwrap();
        assert!(bonds.is_empty());
        assert!(matches!(
            generator.create_full_bond_list_exact(&geometry, &offsets, &[true]),
            Err(FractureError::InvalidConfig(_))
        ));
    }
}
