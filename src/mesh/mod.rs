//! Polygonal mesh container used by the fracture pipeline
//!
//! A [`Mesh`] owns three flat arrays: vertices, directed edges and facets.
//! Facets reference a contiguous run of edges; the edges of a facet form a
//! closed loop. Cutting, welding and volume queries all work on this layout.

mod noise;
mod primitives;

pub use noise::{fbm, FractalNoise};
pub use primitives::{
    get_big_box, get_cutting_box, get_noisy_cutting_box_pair, get_tangents,
    inverse_normal_and_set_user_data, set_cutting_box,
};

use std::collections::HashMap;

use glam::{Vec2, Vec3};

use crate::accelerator::SpatialAccelerator;
use crate::error::{FractureError, Result};
use crate::geometry::{Bounds, Edge, Facet, Triangle, Vertex};

/// Facet/edge/vertex mesh with a cached bounding box
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mesh {
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    facets: Vec<Facet>,
    bounds: Bounds,
}

impl Mesh {
    /// Create a mesh from prebuilt arrays (arbitrary polygons)
    pub fn new(vertices: Vec<Vertex>, edges: Vec<Edge>, facets: Vec<Facet>) -> Self {
        let mut mesh = Self {
            vertices,
            edges,
            facets,
            bounds: Bounds::empty(),
        };
        mesh.recalculate_bounding_box();
        mesh
    }

    /// Create a mesh from an indexed triangle buffer
    ///
    /// Produces one triangular facet per index triple with edges
    /// `(a,b), (b,c), (c,a)`. Missing normals or UVs default to zero.
    ///
    /// # Errors
    ///
    /// Returns [`FractureError::InvalidMesh`] when the index count is not a
    /// multiple of three, an index is out of range, or the attribute arrays
    /// do not match the position count.
    pub fn from_indexed_triangles(
        positions: &[Vec3],
        normals: Option<&[Vec3]>,
        uvs: Option<&[Vec2]>,
        indices: &[u32],
    ) -> Result<Self> {
        if indices.len() % 3 != 0 {
            return Err(FractureError::InvalidMesh(format!(
                "index count {} is not a multiple of 3",
                indices.len()
            )));
        }
        if normals.is_some_and(|n| n.len() != positions.len()) {
            return Err(FractureError::InvalidMesh(
                "normal count does not match position count".into(),
            ));
        }
        if uvs.is_some_and(|uv| uv.len() != positions.len()) {
            return Err(FractureError::InvalidMesh(
                "uv count does not match position count".into(),
            ));
        }
        if let Some(bad) = indices.iter().find(|&&i| i as usize >= positions.len()) {
            return Err(FractureError::InvalidMesh(format!(
                "vertex index {} out of range ({} vertices)",
                bad,
                positions.len()
            )));
        }

        let vertices = positions
            .iter()
            .enumerate()
            .map(|(i, &p)| Vertex {
                p,
                n: normals.map_or(Vec3::ZERO, |n| n[i]),
                uv: uvs.map_or(Vec2::ZERO, |uv| uv[i]),
            })
            .collect();

        let mut edges = Vec::with_capacity(indices.len());
        let mut facets = Vec::with_capacity(indices.len() / 3);
        for (i, tri) in indices.chunks_exact(3).enumerate() {
            edges.push(Edge::new(tri[0], tri[1]));
            edges.push(Edge::new(tri[1], tri[2]));
            edges.push(Edge::new(tri[2], tri[0]));
            facets.push(Facet::new(3 * i as u32, 3));
        }
        Ok(Self::new(vertices, edges, facets))
    }

    /// Create a mesh from resolved triangles, three vertices per triangle
    pub fn from_triangles(triangles: &[Triangle]) -> Self {
        let mut vertices = Vec::with_capacity(triangles.len() * 3);
        let mut edges = Vec::with_capacity(triangles.len() * 3);
        let mut facets = Vec::with_capacity(triangles.len());
        for tri in triangles {
            let base = vertices.len() as u32;
            vertices.extend_from_slice(&[tri.a, tri.b, tri.c]);
            edges.push(Edge::new(base, base + 1));
            edges.push(Edge::new(base + 1, base + 2));
            edges.push(Edge::new(base + 2, base));
            facets.push(Facet {
                first_edge: base,
                edges_count: 3,
                material_id: tri.material_id,
                smoothing_group: tri.smoothing_group,
                user_data: tri.user_data,
            });
        }
        Self::new(vertices, edges, facets)
    }

    /// Create a mesh from resolved triangles, sharing weldable vertices
    pub fn from_triangles_welded(triangles: &[Triangle]) -> Self {
        let corners: Vec<Vertex> = triangles.iter().flat_map(|t| [t.a, t.b, t.c]).collect();
        let (vertices, remap) = weld_vertices(&corners);
        let mut edges = Vec::with_capacity(corners.len());
        let mut facets = Vec::with_capacity(triangles.len());
        for (i, tri) in triangles.iter().enumerate() {
            let [a, b, c] = [remap[3 * i], remap[3 * i + 1], remap[3 * i + 2]];
            let first = edges.len() as u32;
            edges.push(Edge::new(a, b));
            edges.push(Edge::new(b, c));
            edges.push(Edge::new(c, a));
            facets.push(Facet {
                first_edge: first,
                edges_count: 3,
                material_id: tri.material_id,
                smoothing_group: tri.smoothing_group,
                user_data: tri.user_data,
            });
        }
        Self::new(vertices, edges, facets)
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn facets(&self) -> &[Facet] {
        &self.facets
    }

    /// Mutable vertex access; call [`Mesh::recalculate_bounding_box`] after moving vertices
    pub fn vertices_mut(&mut self) -> &mut [Vertex] {
        &mut self.vertices
    }

    pub fn facets_mut(&mut self) -> &mut [Facet] {
        &mut self.facets
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn facet_count(&self) -> usize {
        self.facets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facets.is_empty()
    }

    /// Edges forming the loop of `facet`
    pub fn facet_edges(&self, facet: usize) -> &[Edge] {
        &self.edges[self.facets[facet].edge_range()]
    }

    /// Loop vertices of `facet`, taken from edge starts
    pub fn facet_vertices(&self, facet: usize) -> impl Iterator<Item = &Vertex> + '_ {
        self.facet_edges(facet)
            .iter()
            .map(move |e| &self.vertices[e.s as usize])
    }

    /// Unit normal of `facet` by Newell's method
    pub fn facet_normal(&self, facet: usize) -> Vec3 {
        let edges = self.facet_edges(facet);
        let mut n = Vec3::ZERO;
        for e in edges {
            let a = self.vertices[e.s as usize].p;
            let b = self.vertices[e.e as usize].p;
            n.x += (a.y - b.y) * (a.z + b.z);
            n.y += (a.z - b.z) * (a.x + b.x);
            n.z += (a.x - b.x) * (a.y + b.y);
        }
        n.normalize_or_zero()
    }

    /// Bounding box of a single facet
    pub fn facet_bounds(&self, facet: usize) -> Bounds {
        let mut bounds = Bounds::empty();
        for v in self.facet_vertices(facet) {
            bounds.include(v.p);
        }
        bounds
    }

    /// Check facet ranges, edge indices and loop closure
    pub fn is_valid(&self) -> bool {
        if self.vertices.is_empty() || self.edges.is_empty() || self.facets.is_empty() {
            return false;
        }
        let vertex_count = self.vertices.len() as u32;
        if self
            .edges
            .iter()
            .any(|e| e.s >= vertex_count || e.e >= vertex_count)
        {
            return false;
        }
        self.facets.iter().all(|f| {
            let range = f.edge_range();
            if f.edges_count < 3 || range.end > self.edges.len() {
                return false;
            }
            let loop_edges = &self.edges[range];
            (0..loop_edges.len()).all(|k| loop_edges[k].e == loop_edges[(k + 1) % loop_edges.len()].s)
        })
    }

    pub fn recalculate_bounding_box(&mut self) {
        self.bounds = Bounds::from_points(self.vertices.iter().map(|v| &v.p));
    }

    pub fn bounding_box(&self) -> &Bounds {
        &self.bounds
    }

    pub fn is_triangulated(&self) -> bool {
        self.facets.iter().all(|f| f.edges_count == 3)
    }

    /// Enclosed volume; 0 unless every facet is a triangle
    pub fn volume(&self) -> f32 {
        if self.facets.is_empty() || !self.is_triangulated() {
            return 0.0;
        }
        let mut sum = 0.0f64;
        for f in 0..self.facets.len() {
            let edges = self.facet_edges(f);
            let a = self.vertices[edges[0].s as usize].p.as_dvec3();
            let b = self.vertices[edges[1].s as usize].p.as_dvec3();
            let c = self.vertices[edges[2].s as usize].p.as_dvec3();
            sum += a.dot(b.cross(c));
        }
        (sum.abs() / 6.0) as f32
    }

    /// Fan-triangulate every facet into resolved triangles
    pub fn to_triangles(&self) -> Vec<Triangle> {
        let mut out = Vec::with_capacity(self.edges.len());
        for (fi, facet) in self.facets.iter().enumerate() {
            let edges = self.facet_edges(fi);
            let first = self.vertices[edges[0].s as usize];
            for k in 1..edges.len().saturating_sub(1) {
                out.push(Triangle {
                    a: first,
                    b: self.vertices[edges[k].s as usize],
                    c: self.vertices[edges[k + 1].s as usize],
                    material_id: facet.material_id,
                    smoothing_group: facet.smoothing_group,
                    user_data: facet.user_data,
                });
            }
        }
        out
    }

    /// Apply `f` to every vertex, then refresh the bounding box
    pub fn transform_vertices<F: FnMut(&mut Vertex)>(&mut self, f: F) {
        self.vertices.iter_mut().for_each(f);
        self.recalculate_bounding_box();
    }

    /// Assign `material_id` to every facet
    pub fn set_material_id(&mut self, material_id: i32) {
        for f in &mut self.facets {
            f.material_id = material_id;
        }
    }

    /// Per-facet material ids; extra ids are ignored
    pub fn set_material_ids(&mut self, material_ids: &[i32]) {
        for (f, &m) in self.facets.iter_mut().zip(material_ids) {
            f.material_id = m;
        }
    }

    pub fn set_smoothing_groups(&mut self, groups: &[i32]) {
        for (f, &g) in self.facets.iter_mut().zip(groups) {
            f.smoothing_group = g;
        }
    }

    /// True when some welded edge is not matched by an opposite edge
    pub fn has_open_edges(&self) -> bool {
        let positions: Vec<Vec3> = self.vertices.iter().map(|v| v.p).collect();
        let (remap, _) = weld_positions(&positions, crate::geometry::VERTEX_POSITION_EPS);
        let mut balance: HashMap<(u32, u32), i32> = HashMap::new();
        for facet in &self.facets {
            for edge in &self.edges[facet.edge_range()] {
                let s = remap[edge.s as usize];
                let e = remap[edge.e as usize];
                if s == e {
                    continue;
                }
                let (key, delta) = if s < e { ((s, e), 1) } else { ((e, s), -1) };
                *balance.entry(key).or_insert(0) += delta;
            }
        }
        balance.values().any(|&b| b != 0)
    }

    /// Point-in-mesh test by parity of +z ray crossings
    ///
    /// `accelerator` must be built over this mesh; its point query supplies
    /// candidate facets in the column of `point`.
    pub fn is_point_inside(&self, point: Vec3, accelerator: &mut dyn SpatialAccelerator) -> bool {
        if !self.bounds.contains(point) {
            return false;
        }
        accelerator.set_point_query(point);
        let mut crossings = 0u32;
        while let Some(facet) = accelerator.next_facet() {
            let edges = self.facet_edges(facet);
            let a = self.vertices[edges[0].s as usize].p;
            for k in 1..edges.len().saturating_sub(1) {
                let b = self.vertices[edges[k].s as usize].p;
                let c = self.vertices[edges[k + 1].s as usize].p;
                if upward_ray_hits(point, a, b, c) {
                    crossings += 1;
                }
            }
        }
        crossings % 2 == 1
    }
}

/// Whether the +z ray from `p` crosses triangle `abc`
///
/// Uses a half-open edge rule so a ray through a shared edge is counted once.
fn upward_ray_hits(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> bool {
    let (mut a2, mut b2, c2) = (a.truncate(), b.truncate(), c.truncate());
    let (mut az, mut bz) = (a.z, b.z);
    let area = (b2 - a2).perp_dot(c2 - a2);
    if area == 0.0 {
        return false;
    }
    if area < 0.0 {
        std::mem::swap(&mut a2, &mut b2);
        std::mem::swap(&mut az, &mut bz);
    }
    let q = p.truncate();
    let covers = |s: Vec2, e: Vec2| {
        let d = e - s;
        let w = d.perp_dot(q - s);
        w > 0.0 || (w == 0.0 && (d.y < 0.0 || (d.y == 0.0 && d.x < 0.0)))
    };
    if !(covers(a2, b2) && covers(b2, c2) && covers(c2, a2)) {
        return false;
    }
    let total = (b2 - a2).perp_dot(c2 - a2);
    let wa = (b2 - q).perp_dot(c2 - q) / total;
    let wb = (c2 - q).perp_dot(a2 - q) / total;
    let wc = 1.0 - wa - wb;
    let z = wa * az + wb * bz + wc * c.z;
    z > p.z
}

/// Merge positions closer than `eps` on every axis
///
/// Returns a map from input index to welded id and the number of ids.
/// Ids are assigned in order of increasing x, so the result only depends
/// on the input positions.
pub(crate) fn weld_positions(points: &[Vec3], eps: f32) -> (Vec<u32>, usize) {
    let mut order: Vec<usize> = (0..points.len()).collect();
    order.sort_by(|&a, &b| {
        points[a]
            .x
            .total_cmp(&points[b].x)
            .then(points[a].y.total_cmp(&points[b].y))
            .then(points[a].z.total_cmp(&points[b].z))
    });
    let mut remap = vec![u32::MAX; points.len()];
    let mut next = 0u32;
    for (k, &i) in order.iter().enumerate() {
        if remap[i] != u32::MAX {
            continue;
        }
        remap[i] = next;
        for &j in &order[k + 1..] {
            if points[j].x - points[i].x > eps {
                break;
            }
            if remap[j] == u32::MAX && (points[j] - points[i]).abs().max_element() <= eps {
                remap[j] = next;
            }
        }
        next += 1;
    }
    (remap, next as usize)
}

/// Merge vertices that are weldable by position, normal and UV
///
/// Returns the unique vertices and a map from input index to unique index.
pub(crate) fn weld_vertices(vertices: &[Vertex]) -> (Vec<Vertex>, Vec<u32>) {
    let positions: Vec<Vec3> = vertices.iter().map(|v| v.p).collect();
    let (groups, group_count) = weld_positions(&positions, crate::geometry::VERTEX_POSITION_EPS);
    let mut members: Vec<Vec<u32>> = vec![Vec::new(); group_count];
    let mut unique: Vec<Vertex> = Vec::new();
    let mut remap = Vec::with_capacity(vertices.len());
    for (v, &g) in vertices.iter().zip(&groups) {
        let candidates = &mut members[g as usize];
        match candidates
            .iter()
            .find(|&&u| unique[u as usize].is_weldable_with(v))
        {
            Some(&u) => remap.push(u),
            None => {
                let u = unique.len() as u32;
                unique.push(*v);
                candidates.push(u);
                remap.push(u);
            }
        }
    }
    (unique, remap)
}
