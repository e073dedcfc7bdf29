//! Planar polygon helpers for bond interfaces
//!
//! Triangle/triangle intersection of coplanar triangles, planar convex
//! hulls and CCW sorting. All routines project onto an axis plane chosen
//! from the common normal and keep the 3D points they produce.

use glam::{Vec2, Vec3};

use crate::geometry::{get_projected_point_with_winding, get_projection_direction};

/// Location of a 2D point relative to a triangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointLocation {
    Outside,
    Inside,
    OnEdge,
}

/// Stateless polygon processor
#[derive(Debug, Clone, Copy, Default)]
pub struct TriangleProcessor;

#[derive(Debug, Clone, Copy)]
struct ClipVertex {
    p2: Vec2,
    p3: Vec3,
}

impl TriangleProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Intersection polygon of two coplanar triangles sharing `normal`
    ///
    /// Triangle `b` is clipped against the edges of triangle `a` in the
    /// projection plane; the result is a convex polygon, CCW around `normal`,
    /// or empty when the triangles do not overlap.
    pub fn triangle_intersection(&self, a: &[Vec3; 3], b: &[Vec3; 3], normal: Vec3) -> Vec<Vec3> {
        let dir = get_projection_direction(normal);
        let project = |p: Vec3| get_projected_point_with_winding(p, dir);

        let mut clip: [Vec2; 3] = a.map(project);
        if signed_area_2d(&clip) < 0.0 {
            clip.swap(1, 2);
        }
        if signed_area_2d(&clip).abs() <= f32::EPSILON {
            return Vec::new();
        }

        let bp: [Vec2; 3] = b.map(project);
        if !bounds_2d_overlap(&clip, &bp) {
            return Vec::new();
        }

        let mut subject: Vec<ClipVertex> = b
            .iter()
            .zip(bp)
            .map(|(&p3, p2)| ClipVertex { p2, p3 })
            .collect();
        if signed_area_2d(&bp) < 0.0 {
            subject.swap(1, 2);
        }

        for k in 0..3 {
            let s = clip[k];
            let e = clip[(k + 1) % 3];
            subject = clip_by_edge(&subject, s, e);
            if subject.is_empty() {
                return Vec::new();
            }
        }
        subject.into_iter().map(|v| v.p3).collect()
    }

    /// Whether the 2D bounding boxes of two triangles overlap
    pub fn triangle_bounding_box_intersection(&self, a: &[Vec2; 3], b: &[Vec2; 3]) -> bool {
        bounds_2d_overlap(a, b)
    }

    pub fn is_point_inside(&self, point: Vec2, triangle: &[Vec2; 3]) -> PointLocation {
        let mut tri = *triangle;
        if signed_area_2d(&tri) < 0.0 {
            tri.swap(1, 2);
        }
        let mut on_edge = false;
        for k in 0..3 {
            let s = tri[k];
            let e = tri[(k + 1) % 3];
            let w = (e - s).perp_dot(point - s);
            if w < 0.0 {
                return PointLocation::Outside;
            }
            if w == 0.0 {
                on_edge = true;
            }
        }
        if on_edge {
            PointLocation::OnEdge
        } else {
            PointLocation::Inside
        }
    }

    /// Parameter along `s1..e1` where it crosses `s2..e2`
    pub fn segment_intersection(&self, s1: Vec2, e1: Vec2, s2: Vec2, e2: Vec2) -> Option<f32> {
        let d1 = e1 - s1;
        let d2 = e2 - s2;
        let denom = d1.perp_dot(d2);
        if denom.abs() < 1e-10 {
            return None;
        }
        let t1 = (s2 - s1).perp_dot(d2) / denom;
        let t2 = (s2 - s1).perp_dot(d1) / denom;
        if (0.0..=1.0).contains(&t1) && (0.0..=1.0).contains(&t2) {
            Some(t1)
        } else {
            None
        }
    }

    /// Sort coplanar points CCW around their centroid, seen from `normal`
    pub fn sort_to_ccw(&self, points: &mut [Vec3], normal: Vec3) {
        if points.len() < 3 {
            return;
        }
        let dir = get_projection_direction(normal);
        let center: Vec3 = points.iter().copied().sum::<Vec3>() / points.len() as f32;
        let c2 = get_projected_point_with_winding(center, dir);
        points.sort_by(|a, b| {
            let da = get_projected_point_with_winding(*a, dir) - c2;
            let db = get_projected_point_with_winding(*b, dir) - c2;
            da.y.atan2(da.x).total_cmp(&db.y.atan2(db.x))
        });
    }

    /// Convex hull of coplanar points, CCW around `normal`
    ///
    /// Monotone chain on the projected points; collinear points are dropped.
    pub fn build_convex_hull(&self, points: &[Vec3], normal: Vec3) -> Vec<Vec3> {
        let dir = get_projection_direction(normal);
        let mut pts: Vec<(Vec2, Vec3)> = points
            .iter()
            .map(|&p| (get_projected_point_with_winding(p, dir), p))
            .collect();
        pts.sort_by(|a, b| a.0.x.total_cmp(&b.0.x).then(a.0.y.total_cmp(&b.0.y)));
        pts.dedup_by(|a, b| (a.0 - b.0).abs().max_element() <= 1e-7);
        if pts.len() < 3 {
            return pts.into_iter().map(|p| p.1).collect();
        }

        let turns_left = |hull: &[(Vec2, Vec3)], p: Vec2| {
            let a = hull[hull.len() - 2].0;
            let b = hull[hull.len() - 1].0;
            (b - a).perp_dot(p - a) > 0.0
        };
        let mut hull: Vec<(Vec2, Vec3)> = Vec::with_capacity(pts.len() * 2);
        for &p in &pts {
            while hull.len() >= 2 && !turns_left(&hull, p.0) {
                hull.pop();
            }
            hull.push(p);
        }
        let lower_len = hull.len() + 1;
        for &p in pts.iter().rev().skip(1) {
            while hull.len() >= lower_len && !turns_left(&hull, p.0) {
                hull.pop();
            }
            hull.push(p);
        }
        hull.pop();
        hull.into_iter().map(|p| p.1).collect()
    }
}

/// Area of a planar convex polygon by fan summation
pub fn convex_polygon_area(points: &[Vec3]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut n = Vec3::ZERO;
    for k in 1..points.len() - 1 {
        n += (points[k] - points[0]).cross(points[k + 1] - points[0]);
    }
    n.length() * 0.5
}

fn signed_area_2d(tri: &[Vec2; 3]) -> f32 {
    (tri[1] - tri[0]).perp_dot(tri[2] - tri[0]) * 0.5
}

fn bounds_2d_overlap(a: &[Vec2; 3], b: &[Vec2; 3]) -> bool {
    let amin = a[0].min(a[1]).min(a[2]);
    let amax = a[0].max(a[1]).max(a[2]);
    let bmin = b[0].min(b[1]).min(b[2]);
    let bmax = b[0].max(b[1]).max(b[2]);
    !(amax.x < bmin.x || bmax.x < amin.x || amax.y < bmin.y || bmax.y < amin.y)
}

/// Keep the part of `poly` left of the directed line `s -> e`
fn clip_by_edge(poly: &[ClipVertex], s: Vec2, e: Vec2) -> Vec<ClipVertex> {
    let d = e - s;
    let side = |p: Vec2| d.perp_dot(p - s);
    let mut out = Vec::with_capacity(poly.len() + 1);
    for i in 0..poly.len() {
        let cur = poly[i];
        let next = poly[(i + 1) % poly.len()];
        let sc = side(cur.p2);
        let sn = side(next.p2);
        if sc >= 0.0 {
            out.push(cur);
        }
        if (sc >= 0.0) != (sn >= 0.0) {
            let t = sc / (sc - sn);
            out.push(ClipVertex {
                p2: cur.p2 + (next.p2 - cur.p2) * t,
                p3: cur.p3 + (next.p3 - cur.p3) * t,
            });
        }
    }
    if out.len() < 3 {
        out.clear();
    }
    out
}
