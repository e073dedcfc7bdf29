//! Geometry primitives shared by the mesh, fracture and bond modules
//!
//! Vertices, edges, facets and triangles follow the layout used by the
//! runtime destruction format: a facet is a contiguous run of edges in the
//! owning mesh, and triangles carry `user_data` which doubles as the
//! "interior surface" marker (non-zero means the triangle was created by a cut).

mod hull;
mod projection;

pub use hull::{
    calculate_collision_hull_volume, CollisionHull, CollisionHullBuilder, HullPolygon,
    ParryHullBuilder, Separation, hulls_separating_plane,
};
pub use projection::{
    get_projected_point, get_projected_point_with_winding, get_projection_direction,
    ProjectionDirection, ProjectionPlane,
};

use glam::{Vec2, Vec3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Sentinel vertex index marking "no edge"
pub const NOT_VALID_VERTEX: u32 = u32::MAX;

/// Material assigned to surfaces created by cutting
pub const MATERIAL_INTERIOR: i32 = 1000;

/// Smoothing group assigned to cut surfaces
pub const SMOOTHING_GROUP_INTERIOR: i32 = -1;

/// Absolute tolerance used when comparing plane equations
pub const EPS_PLANE: f32 = 1e-4;

/// Tolerance for weak bounding box overlap tests
pub const BBOX_TEST_EPS: f32 = 1e-5;

/// Largest coordinate magnitude considered finite geometry
pub const MAXIMUM_EXTENT: f32 = 1e9;

/// Position tolerance used when welding vertices
pub const VERTEX_POSITION_EPS: f32 = 1e-5;

/// Normal and UV tolerance used when welding vertices
pub const VERTEX_ATTRIBUTE_EPS: f32 = 1e-3;

/// A mesh vertex: position, normal and one UV set
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    /// Position
    pub p: Vec3,
    /// Normal
    pub n: Vec3,
    /// Texture coordinates
    pub uv: Vec2,
}

impl Vertex {
    pub fn new(p: Vec3, n: Vec3, uv: Vec2) -> Self {
        Self { p, n, uv }
    }

    /// Linear interpolation of all attributes, normal re-normalized
    pub fn lerp(&self, other: &Vertex, t: f32) -> Vertex {
        Vertex {
            p: self.p + (other.p - self.p) * t,
            n: (self.n + (other.n - self.n) * t).normalize_or_zero(),
            uv: self.uv + (other.uv - self.uv) * t,
        }
    }

    /// Welding equivalence: positions within 1e-5, normals and UVs within 1e-3
    pub fn is_weldable_with(&self, other: &Vertex) -> bool {
        (self.p - other.p).abs().max_element() <= VERTEX_POSITION_EPS
            && (self.n - other.n).abs().max_element() <= VERTEX_ATTRIBUTE_EPS
            && (self.uv - other.uv).abs().max_element() <= VERTEX_ATTRIBUTE_EPS
    }
}

/// Directed edge between two vertices of a mesh
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    /// Start vertex index
    pub s: u32,
    /// End vertex index
    pub e: u32,
}

impl Edge {
    pub fn new(s: u32, e: u32) -> Self {
        Self { s, e }
    }

    pub fn is_valid(&self) -> bool {
        self.s != NOT_VALID_VERTEX && self.e != NOT_VALID_VERTEX
    }
}

impl Default for Edge {
    fn default() -> Self {
        Self {
            s: NOT_VALID_VERTEX,
            e: NOT_VALID_VERTEX,
        }
    }
}

/// Polygon made of a contiguous run of edges in the owning mesh
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Facet {
    /// Index of the first edge in the mesh edge array
    pub first_edge: u32,
    /// Number of edges in the polygon loop
    pub edges_count: u32,
    pub material_id: i32,
    pub smoothing_group: i32,
    /// Signed cut-plane id for interior surfaces, 0 for original surface
    pub user_data: i64,
}

impl Facet {
    pub fn new(first_edge: u32, edges_count: u32) -> Self {
        Self {
            first_edge,
            edges_count,
            material_id: 0,
            smoothing_group: SMOOTHING_GROUP_INTERIOR,
            user_data: 0,
        }
    }

    /// Edge index range of this facet
    #[inline]
    pub fn edge_range(&self) -> std::ops::Range<usize> {
        self.first_edge as usize..(self.first_edge + self.edges_count) as usize
    }

    #[inline]
    pub fn is_interior(&self) -> bool {
        self.user_data != 0
    }
}

/// Resolved triangle passed between the fracture tool and the bond generator
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Triangle {
    pub a: Vertex,
    pub b: Vertex,
    pub c: Vertex,
    pub material_id: i32,
    pub smoothing_group: i32,
    /// Non-zero marks a triangle lying on a cut surface
    pub user_data: i64,
}

impl Triangle {
    pub fn new(a: Vertex, b: Vertex, c: Vertex) -> Self {
        Self {
            a,
            b,
            c,
            material_id: 0,
            smoothing_group: SMOOTHING_GROUP_INTERIOR,
            user_data: 0,
        }
    }

    /// Unnormalized normal `(b - a) × (c - a)`; its length is twice the area
    #[inline]
    pub fn normal(&self) -> Vec3 {
        (self.b.p - self.a.p).cross(self.c.p - self.a.p)
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.normal().length() * 0.5
    }

    #[inline]
    pub fn centroid(&self) -> Vec3 {
        (self.a.p + self.b.p + self.c.p) / 3.0
    }

    #[inline]
    pub fn is_interior(&self) -> bool {
        self.user_data != 0
    }

    pub fn positions(&self) -> [Vec3; 3] {
        [self.a.p, self.b.p, self.c.p]
    }
}

/// Triangle referencing vertices by index
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TriangleIndexed {
    pub ea: u32,
    pub eb: u32,
    pub ec: u32,
    pub material_id: i32,
    pub smoothing_group: i32,
    pub user_data: i64,
}

impl TriangleIndexed {
    pub fn new(ea: u32, eb: u32, ec: u32) -> Self {
        Self {
            ea,
            eb,
            ec,
            material_id: 0,
            smoothing_group: SMOOTHING_GROUP_INTERIOR,
            user_data: 0,
        }
    }
}

/// Axis-aligned bounding box
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    /// Inverted box that contains nothing; any `include` makes it valid
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(MAXIMUM_EXTENT),
            max: Vec3::splat(-MAXIMUM_EXTENT),
        }
    }

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_points<'a, I>(points: I) -> Self
    where
        I: IntoIterator<Item = &'a Vec3>,
    {
        let mut bounds = Self::empty();
        for p in points {
            bounds.include(*p);
        }
        bounds
    }

    #[inline]
    pub fn include(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn include_bounds(&mut self, other: &Bounds) {
        if other.is_empty() {
            return;
        }
        self.include(other.min);
        self.include(other.max);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn dimensions(&self) -> Vec3 {
        self.max - self.min
    }

    /// Box grown by `eps` in every direction
    pub fn fattened(&self, eps: f32) -> Bounds {
        Bounds {
            min: self.min - Vec3::splat(eps),
            max: self.max + Vec3::splat(eps),
        }
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// Strict overlap test
    pub fn intersects(&self, other: &Bounds) -> bool {
        !(self.max.x < other.min.x
            || other.max.x < self.min.x
            || self.max.y < other.min.y
            || other.max.y < self.min.y
            || self.max.z < other.min.z
            || other.max.z < self.min.z)
    }

    /// Overlap test tolerant to touching boxes (ε = 1e-5)
    pub fn weak_intersects(&self, other: &Bounds) -> bool {
        self.fattened(BBOX_TEST_EPS).intersects(other)
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::empty()
    }
}

/// Plane `n · p + d = 0`
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub n: Vec3,
    pub d: f32,
}

impl Plane {
    pub fn new(n: Vec3, d: f32) -> Self {
        Self { n, d }
    }

    /// Plane through `point` with the (normalized) `normal`
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let n = normal.normalize_or_zero();
        Self { n, d: -n.dot(point) }
    }

    /// Plane through three points, normal follows `(b - a) × (c - a)`
    pub fn from_points(a: Vec3, b: Vec3, c: Vec3) -> Self {
        let n = (b - a).cross(c - a).normalize_or_zero();
        Self { n, d: -n.dot(a) }
    }

    #[inline]
    pub fn distance(&self, p: Vec3) -> f32 {
        self.n.dot(p) + self.d
    }

    pub fn negated(&self) -> Plane {
        Plane {
            n: -self.n,
            d: -self.d,
        }
    }

    pub fn project(&self, p: Vec3) -> Vec3 {
        p - self.n * self.distance(p)
    }

    pub fn is_finite(&self) -> bool {
        self.n.is_finite() && self.d.is_finite()
    }

    /// Component-wise comparison with [`EPS_PLANE`] tolerance
    pub fn is_same(&self, other: &Plane) -> bool {
        (self.d - other.d).abs() <= EPS_PLANE
            && (self.n.x - other.n.x).abs() <= EPS_PLANE
            && (self.n.y - other.n.y).abs() <= EPS_PLANE
            && (self.n.z - other.n.z).abs() <= EPS_PLANE
    }

    /// Tolerant strict-weak ordering by `d`, then `n.x`, `n.y`, `n.z`
    pub fn tolerant_less(&self, other: &Plane) -> bool {
        if self.d + EPS_PLANE < other.d {
            return true;
        }
        if self.d - EPS_PLANE > other.d {
            return false;
        }
        if self.n.x + EPS_PLANE < other.n.x {
            return true;
        }
        if self.n.x - EPS_PLANE > other.n.x {
            return false;
        }
        if self.n.y + EPS_PLANE < other.n.y {
            return true;
        }
        if self.n.y - EPS_PLANE > other.n.y {
            return false;
        }
        self.n.z + EPS_PLANE < other.n.z
    }
}

/// Intersection of segment `a..b` with `plane`
///
/// Returns `None` when the segment is parallel to the plane or both
/// endpoints are on the same side.
pub fn get_plane_segment_intersection(plane: &Plane, a: Vec3, b: Vec3) -> Option<Vec3> {
    let dir = b - a;
    let denom = plane.n.dot(dir);
    if denom.abs() < 1e-4 {
        return None;
    }
    let t = -plane.distance(a) / denom;
    if !(0.0..=1.0).contains(&t) {
        return None;
    }
    Some(a + dir * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_include_and_overlap() {
        let mut a = Bounds::empty();
        assert!(a.is_empty());
        a.include(Vec3::ZERO);
        a.include(Vec3::ONE);
        assert!(!a.is_empty());

        let touching = Bounds::new(Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 1.0, 1.0));
        assert!(a.weak_intersects(&touching));

        let apart = Bounds::new(Vec3::new(1.1, 0.0, 0.0), Vec3::new(2.0, 1.0, 1.0));
        assert!(!a.weak_intersects(&apart));
    }

    #[test]
    fn test_plane_distance_and_negation() {
        let plane = Plane::from_point_normal(Vec3::new(0.0, 0.0, 1.0), Vec3::Z);
        assert!((plane.distance(Vec3::new(5.0, 3.0, 3.0)) - 2.0).abs() < 1e-6);
        let neg = plane.negated();
        assert!((neg.distance(Vec3::new(5.0, 3.0, 3.0)) + 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_plane_from_points_winding() {
        let plane = Plane::from_points(Vec3::ZERO, Vec3::X, Vec3::Y);
        assert!((plane.n - Vec3::Z).length() < 1e-6);
        assert!(plane.d.abs() < 1e-6);
    }

    #[test]
    fn test_tolerant_plane_ordering() {
        let a = Plane::new(Vec3::X, 0.5);
        let b = Plane::new(Vec3::X, 0.50005);
        assert!(a.is_same(&b));
        assert!(!a.tolerant_less(&b));
        assert!(!b.tolerant_less(&a));

        let c = Plane::new(Vec3::X, 0.6);
        assert!(a.tolerant_less(&c));
    }

    #[test]
    fn test_segment_intersection() {
        let plane = Plane::from_point_normal(Vec3::ZERO, Vec3::X);
        let hit = get_plane_segment_intersection(&plane, Vec3::new(-1.0, 1.0, 0.0), Vec3::new(1.0, 1.0, 0.0));
        assert!(hit.is_some());
        assert!((hit.unwrap() - Vec3::new(0.0, 1.0, 0.0)).length() < 1e-6);

        let miss = get_plane_segment_intersection(&plane, Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 0.0));
        assert!(miss.is_none());
    }

    #[test]
    fn test_vertex_weld_tolerance() {
        let a = Vertex::new(Vec3::ZERO, Vec3::Z, Vec2::ZERO);
        let mut b = a;
        b.p.x += 5e-6;
        assert!(a.is_weldable_with(&b));
        b.n = Vec3::X;
        assert!(!a.is_weldable_with(&b));
    }
}
