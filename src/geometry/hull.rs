//! Convex collision hulls and separating planes between them
//!
//! Hull construction is delegated to a [`CollisionHullBuilder`]. The default
//! [`ParryHullBuilder`] runs parry's quickhull and falls back to the
//! axis-aligned box of the input when the point set is degenerate.

use glam::{Quat, Vec3};
use parry3d::math::Point;
use parry3d::transformation;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{Bounds, Plane, MAXIMUM_EXTENT};

/// One face of a collision hull
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HullPolygon {
    /// Plane equation `[nx, ny, nz, d]`, normal pointing outward
    pub plane: [f32; 4],
    /// Number of vertices of the face
    pub vertex_count: u32,
    /// First index of the face in [`CollisionHull::indices`]
    pub index_base: u32,
}

/// Convex polytope used as collision geometry for a chunk
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CollisionHull {
    pub points: Vec<Vec3>,
    pub indices: Vec<u32>,
    pub polygons: Vec<HullPolygon>,
}

impl CollisionHull {
    /// Box hull covering `bounds`, used when the input is degenerate
    pub fn from_bounds(bounds: &Bounds) -> Self {
        let (mn, mx) = (bounds.min, bounds.max);
        let points = vec![
            Vec3::new(mn.x, mn.y, mn.z),
            Vec3::new(mx.x, mn.y, mn.z),
            Vec3::new(mx.x, mx.y, mn.z),
            Vec3::new(mn.x, mx.y, mn.z),
            Vec3::new(mn.x, mn.y, mx.z),
            Vec3::new(mx.x, mn.y, mx.z),
            Vec3::new(mx.x, mx.y, mx.z),
            Vec3::new(mn.x, mx.y, mx.z),
        ];
        // Counter-clockwise seen from outside
        let faces: [[u32; 4]; 6] = [
            [0, 3, 2, 1],
            [4, 5, 6, 7],
            [0, 1, 5, 4],
            [2, 3, 7, 6],
            [1, 2, 6, 5],
            [0, 4, 7, 3],
        ];
        let mut hull = CollisionHull {
            points,
            indices: Vec::with_capacity(24),
            polygons: Vec::with_capacity(6),
        };
        for face in faces.iter() {
            let base = hull.indices.len() as u32;
            hull.indices.extend_from_slice(face);
            hull.polygons.push(HullPolygon {
                plane: [0.0; 4],
                vertex_count: 4,
                index_base: base,
            });
        }
        hull.recompute_planes();
        hull
    }

    /// Hull from parry's triangulated output, one polygon per triangle
    fn from_triangles(points: Vec<Vec3>, triangles: &[[u32; 3]]) -> Self {
        let mut hull = CollisionHull {
            points,
            indices: Vec::with_capacity(triangles.len() * 3),
            polygons: Vec::with_capacity(triangles.len()),
        };
        for tri in triangles {
            let base = hull.indices.len() as u32;
            hull.indices.extend_from_slice(tri);
            hull.polygons.push(HullPolygon {
                plane: [0.0; 4],
                vertex_count: 3,
                index_base: base,
            });
        }
        hull.recompute_planes();
        hull
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Vertex positions of polygon `index`, in winding order
    pub fn polygon_points(&self, index: usize) -> impl Iterator<Item = Vec3> + '_ {
        let poly = self.polygons[index];
        let base = poly.index_base as usize;
        self.indices[base..base + poly.vertex_count as usize]
            .iter()
            .map(move |&i| self.points[i as usize])
    }

    pub fn polygon_plane(&self, index: usize) -> Plane {
        let p = self.polygons[index].plane;
        Plane::new(Vec3::new(p[0], p[1], p[2]), p[3])
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::from_points(self.points.iter())
    }

    pub fn centroid(&self) -> Vec3 {
        if self.points.is_empty() {
            return Vec3::ZERO;
        }
        self.points.iter().copied().sum::<Vec3>() / self.points.len() as f32
    }

    /// Recompute face planes from the first three vertices of each face
    pub fn recompute_planes(&mut self) {
        for i in 0..self.polygons.len() {
            let pts: Vec<Vec3> = self.polygon_points(i).take(3).collect();
            if pts.len() < 3 {
                continue;
            }
            let plane = Plane::from_points(pts[0], pts[1], pts[2]);
            self.polygons[i].plane = [plane.n.x, plane.n.y, plane.n.z, plane.d];
        }
    }

    pub fn scale(&mut self, scale: Vec3) {
        for p in &mut self.points {
            *p *= scale;
        }
        if scale.x * scale.y * scale.z < 0.0 {
            self.flip_winding();
        }
        self.recompute_planes();
    }

    pub fn rotate(&mut self, rotation: Quat) {
        for p in &mut self.points {
            *p = rotation * *p;
        }
        self.recompute_planes();
    }

    pub fn translate(&mut self, offset: Vec3) {
        for p in &mut self.points {
            *p += offset;
        }
        for poly in &mut self.polygons {
            let n = Vec3::new(poly.plane[0], poly.plane[1], poly.plane[2]);
            poly.plane[3] -= n.dot(offset);
        }
    }

    fn flip_winding(&mut self) {
        for poly in &self.polygons {
            let base = poly.index_base as usize;
            self.indices[base..base + poly.vertex_count as usize].reverse();
        }
    }

    pub fn volume(&self) -> f32 {
        calculate_collision_hull_volume(self)
    }
}

/// Volume of a convex hull by fanning every face from the hull centroid
pub fn calculate_collision_hull_volume(hull: &CollisionHull) -> f32 {
    if hull.points.is_empty() {
        return 0.0;
    }
    let centroid = hull.centroid();
    let mut volume = 0.0;
    for i in 0..hull.polygons.len() {
        let pts: Vec<Vec3> = hull.polygon_points(i).collect();
        if pts.len() < 3 {
            continue;
        }
        let a = pts[0] - centroid;
        for j in 1..pts.len() - 1 {
            let b = pts[j] - centroid;
            let c = pts[j + 1] - centroid;
            volume += a.dot(b.cross(c));
        }
    }
    (volume / 6.0).abs()
}

/// Builds convex collision geometry from point sets
pub trait CollisionHullBuilder {
    /// Convex hull of `points`; never fails, degenerate input yields a box hull
    fn build_collision_geometry(&self, points: &[Vec3]) -> CollisionHull;
}

/// Quickhull-based builder backed by `parry3d`
#[derive(Debug, Clone, Copy, Default)]
pub struct ParryHullBuilder;

impl CollisionHullBuilder for ParryHullBuilder {
    fn build_collision_geometry(&self, points: &[Vec3]) -> CollisionHull {
        if points.is_empty() {
            return CollisionHull::default();
        }
        let bounds = Bounds::from_points(points.iter());
        if points.len() < 4 || bounds.is_empty() || bounds.dimensions().min_element() < 1e-6 {
            return CollisionHull::from_bounds(&bounds);
        }

        let parry_points: Vec<Point<f32>> = points
            .iter()
            .map(|p| Point::new(p.x, p.y, p.z))
            .collect();

        match transformation::try_convex_hull(&parry_points) {
            Ok((vertices, triangles)) if triangles.len() >= 4 => {
                let vertices = vertices.iter().map(|p| Vec3::new(p.x, p.y, p.z)).collect();
                CollisionHull::from_triangles(vertices, &triangles)
            }
            _ => {
                log::warn!(
                    "convex hull construction failed for {} points, using bounding box",
                    points.len()
                );
                CollisionHull::from_bounds(&bounds)
            }
        }
    }
}

/// Separating plane between two convex point sets
///
/// The plane normal points from the first set toward the second; the plane
/// sits halfway between their projected intervals. `min`/`max` hold the
/// projection intervals of both sets along the normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Separation {
    pub plane: Plane,
    pub min0: f32,
    pub max0: f32,
    pub min1: f32,
    pub max1: f32,
}

impl Separation {
    /// Distance between the intervals, negative when they overlap
    pub fn gap(&self) -> f32 {
        self.min1 - self.max0
    }
}

fn project_interval(points: &[Vec3], axis: Vec3) -> (f32, f32) {
    let mut mn = MAXIMUM_EXTENT;
    let mut mx = -MAXIMUM_EXTENT;
    for p in points {
        let d = p.dot(axis);
        mn = mn.min(d);
        mx = mx.max(d);
    }
    (mn, mx)
}

/// Best separating plane between two hulls, tested over face normals of
/// both hulls and the centroid axis
///
/// Returns `None` when either set is empty or the result is not finite,
/// and when the sets are farther apart than `max_distance` (hulls not in
/// proximity). Pass `f32::INFINITY` to always get a plane.
pub fn hulls_separating_plane(
    hull0: &CollisionHull,
    hull1: &CollisionHull,
    max_distance: f32,
) -> Option<Separation> {
    if hull0.points.is_empty() || hull1.points.is_empty() {
        return None;
    }

    let mut axes: Vec<Vec3> = Vec::with_capacity(hull0.polygons.len() + hull1.polygons.len() + 1);
    let centroid_axis = (hull1.centroid() - hull0.centroid()).normalize_or_zero();
    if centroid_axis != Vec3::ZERO {
        axes.push(centroid_axis);
    }
    for i in 0..hull0.polygons.len() {
        axes.push(hull0.polygon_plane(i).n);
    }
    for i in 0..hull1.polygons.len() {
        axes.push(hull1.polygon_plane(i).n);
    }

    let mut best: Option<Separation> = None;
    for axis in axes {
        if !axis.is_finite() || axis.length_squared() < 0.5 {
            continue;
        }
        let (min0, max0) = project_interval(&hull0.points, axis);
        let (min1, max1) = project_interval(&hull1.points, axis);
        // Orient so that hull0 lies on the negative side
        let candidate = if min1 - max0 >= min0 - max1 {
            Separation {
                plane: Plane::new(axis, -(max0 + min1) * 0.5),
                min0,
                max0,
                min1,
                max1,
            }
        } else {
            Separation {
                plane: Plane::new(-axis, (min0 + max1) * 0.5),
                min0: -max0,
                max0: -min0,
                min1: -max1,
                max1: -min1,
            }
        };
        let better = match &best {
            None => true,
            Some(b) => candidate.gap() > b.gap(),
        };
        if better {
            best = Some(candidate);
        }
    }

    best.filter(|s| s.plane.is_finite() && s.gap() <= max_distance)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube_points(min: Vec3, max: Vec3) -> Vec<Vec3> {
        let mut pts = Vec::new();
        for &x in &[min.x, max.x] {
            for &y in &[min.y, max.y] {
                for &z in &[min.z, max.z] {
                    pts.push(Vec3::new(x, y, z));
                }
            }
        }
        pts
    }

    #[test]
    fn test_box_hull_volume() {
        let hull = CollisionHull::from_bounds(&Bounds::new(Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0)));
        assert!((hull.volume() - 6.0).abs() < 1e-4);
        // Outward normals: the bottom face points down
        assert!(hull.polygon_plane(0).n.z < -0.99);
    }

    #[test]
    fn test_parry_hull_volume() {
        let mut pts = cube_points(Vec3::splat(-1.0), Vec3::splat(1.0));
        pts.push(Vec3::ZERO);
        let hull = ParryHullBuilder.build_collision_geometry(&pts);
        assert!((hull.volume() - 8.0).abs() < 1e-3);
    }

    #[test]
    fn test_degenerate_input_falls_back_to_box() {
        let pts = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        let hull = ParryHullBuilder.build_collision_geometry(&pts);
        assert_eq!(hull.polygons.len(), 6);
    }

    #[test]
    fn test_hull_transforms() {
        let mut hull = CollisionHull::from_bounds(&Bounds::new(Vec3::ZERO, Vec3::ONE));
        hull.scale(Vec3::new(2.0, 1.0, 1.0));
        assert!((hull.volume() - 2.0).abs() < 1e-4);
        hull.translate(Vec3::new(0.0, 0.0, 5.0));
        let plane = hull.polygon_plane(1);
        // Top face now at z = 6
        assert!(plane.distance(Vec3::new(0.5, 0.5, 6.0)).abs() < 1e-4);
        hull.rotate(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2));
        assert!((hull.volume() - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_separating_plane_between_touching_boxes() {
        let a = CollisionHull::from_bounds(&Bounds::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(0.0, 1.0, 1.0)));
        let b = CollisionHull::from_bounds(&Bounds::new(Vec3::new(0.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0)));
        let sep = hulls_separating_plane(&a, &b, 0.0).unwrap();
        assert!((sep.plane.n - Vec3::X).length() < 1e-5);
        assert!(sep.plane.d.abs() < 1e-5);
        assert!(sep.gap().abs() < 1e-5);
    }

    #[test]
    fn test_far_hulls_not_in_proximity() {
        let a = CollisionHull::from_bounds(&Bounds::new(Vec3::ZERO, Vec3::ONE));
        let b = CollisionHull::from_bounds(&Bounds::new(Vec3::new(3.0, 0.0, 0.0), Vec3::new(4.0, 1.0, 1.0)));
        assert!(hulls_separating_plane(&a, &b, 0.1).is_none());
        assert!(hulls_separating_plane(&a, &b, f32::INFINITY).is_some());
    }
}
