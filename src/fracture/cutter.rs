//! Plane split of closed triangle meshes
//!
//! Splits a triangle soup by a plane, keeping both sides and closing each
//! with a cap built from the boundary loops the plane leaves behind. Corners
//! are welded by position first so neighbouring triangles agree on which side
//! a vertex lies and on where an edge crosses the plane.

use std::collections::{BTreeMap, HashMap, HashSet};

use glam::{Vec2, Vec3};

use super::triangulator::triangulate_loops;
use crate::geometry::{Plane, Triangle, Vertex, SMOOTHING_GROUP_INTERIOR, VERTEX_POSITION_EPS};
use crate::mesh::{get_tangents, weld_positions, FractalNoise};

/// Distance below which a vertex counts as lying on the cutting plane
const CUT_EPS: f32 = 1e-5;

/// Triangles thinner than this (twice the area) are not emitted
const MIN_DOUBLE_AREA: f32 = 1e-12;

/// Noise displacement applied to cap surfaces
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CapSurface {
    pub noise: FractalNoise,
    /// Subdivisions per cap triangle edge
    pub resolution: u32,
}

/// Both halves of a split, each a closed triangle soup
#[derive(Debug, Clone, Default)]
pub(crate) struct PlaneSplit {
    /// Part on the negative side of the plane; its cap carries `+cap_id`
    pub below: Vec<Triangle>,
    /// Part on the positive side; its cap carries `-cap_id`
    pub above: Vec<Triangle>,
}

/// Welded vertex table extended with plane crossing points
struct Topology {
    pos: Vec<Vec3>,
    on_plane: Vec<bool>,
    crossings: HashMap<(u32, u32), u32>,
}

impl Topology {
    fn crossing(&mut self, lo: u32, hi: u32, dist: &[f32]) -> (u32, f32) {
        let t = dist[lo as usize] / (dist[lo as usize] - dist[hi as usize]);
        if let Some(&id) = self.crossings.get(&(lo, hi)) {
            return (id, t);
        }
        let p = self.pos[lo as usize].lerp(self.pos[hi as usize], t);
        let id = self.pos.len() as u32;
        self.pos.push(p);
        self.on_plane.push(true);
        self.crossings.insert((lo, hi), id);
        (id, t)
    }
}

#[derive(Debug, Clone, Copy)]
struct SideTriangle {
    verts: [Vertex; 3],
    ids: [u32; 3],
    material_id: i32,
    smoothing_group: i32,
    user_data: i64,
}

impl SideTriangle {
    fn to_triangle(&self) -> Triangle {
        Triangle {
            a: self.verts[0],
            b: self.verts[1],
            c: self.verts[2],
            material_id: self.material_id,
            smoothing_group: self.smoothing_group,
            user_data: self.user_data,
        }
    }
}

#[inline]
fn undirected(a: u32, b: u32) -> (u32, u32) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Split `triangles` by `plane` and cap both halves
///
/// If no vertex lies strictly above the plane everything is returned as
/// `below` without a cap; if none lies strictly below, everything is `above`.
pub(crate) fn split_by_plane(
    triangles: &[Triangle],
    plane: &Plane,
    cap_id: i64,
    interior_material: i32,
    surface: Option<&CapSurface>,
) -> PlaneSplit {
    let corners: Vec<Vec3> = triangles.iter().flat_map(|t| t.positions()).collect();
    let (weld, count) = weld_positions(&corners, VERTEX_POSITION_EPS);
    let mut pos = vec![Vec3::ZERO; count];
    let mut assigned = vec![false; count];
    for (i, &w) in weld.iter().enumerate() {
        if !assigned[w as usize] {
            pos[w as usize] = corners[i];
            assigned[w as usize] = true;
        }
    }
    let dist: Vec<f32> = pos.iter().map(|&p| plane.distance(p)).collect();
    let side: Vec<i8> = dist
        .iter()
        .map(|&d| {
            if d > CUT_EPS {
                1
            } else if d < -CUT_EPS {
                -1
            } else {
                0
            }
        })
        .collect();

    if !side.contains(&1) {
        return PlaneSplit {
            below: triangles.to_vec(),
            above: Vec::new(),
        };
    }
    if !side.contains(&-1) {
        return PlaneSplit {
            below: Vec::new(),
            above: triangles.to_vec(),
        };
    }

    let mut topo = Topology {
        on_plane: side.iter().map(|&s| s == 0).collect(),
        pos,
        crossings: HashMap::new(),
    };

    let mut below: Vec<SideTriangle> = Vec::new();
    let mut above: Vec<SideTriangle> = Vec::new();
    for (ti, tri) in triangles.iter().enumerate() {
        let ids = [weld[3 * ti], weld[3 * ti + 1], weld[3 * ti + 2]];
        let mut verts = [tri.a, tri.b, tri.c];
        for k in 0..3 {
            verts[k].p = topo.pos[ids[k] as usize];
        }
        let s = ids.map(|w| side[w as usize]);
        let template = SideTriangle {
            verts,
            ids,
            material_id: tri.material_id,
            smoothing_group: tri.smoothing_group,
            user_data: tri.user_data,
        };

        let has_below = s.contains(&-1);
        let has_above = s.contains(&1);
        match (has_below, has_above) {
            (true, false) => below.push(template),
            (false, true) => above.push(template),
            (false, false) => {
                // lies in the plane: belongs to the half it faces away from
                if tri.normal().dot(plane.n) > 0.0 {
                    below.push(template);
                } else {
                    above.push(template);
                }
            }
            (true, true) => {
                clip_triangle(&template, &s, -1, &mut topo, &dist, &mut below);
                clip_triangle(&template, &s, 1, &mut topo, &dist, &mut above);
            }
        }
    }

    let loops = cap_loops(&below, &topo);
    let (t1, t2) = get_tangents(plane.n);
    // (t2, t1) is right-handed around the plane normal
    let mut points2d = Vec::new();
    let mut local_loops = Vec::with_capacity(loops.len());
    let mut local_to_topo = Vec::new();
    for ring in &loops {
        let mut local = Vec::with_capacity(ring.len());
        for &id in ring {
            let p = topo.pos[id as usize];
            local.push(points2d.len());
            points2d.push(Vec2::new(p.dot(t2), p.dot(t1)));
            local_to_topo.push(id);
        }
        local_loops.push(local);
    }
    let cap: Vec<[u32; 3]> = triangulate_loops(&points2d, &local_loops)
        .into_iter()
        .map(|t| t.map(|i| local_to_topo[i]))
        .collect();

    let boundary: HashSet<(u32, u32)> = loops
        .iter()
        .flat_map(|ring| (0..ring.len()).map(move |k| undirected(ring[k], ring[(k + 1) % ring.len()])))
        .collect();

    let (cap_faces, subdivisions) = match surface {
        Some(surface) if surface.resolution > 1 => {
            tessellate_cap(&cap, &topo.pos, &boundary, plane.n, surface)
        }
        _ => (
            cap.iter()
                .map(|t| t.map(|id| topo.pos[id as usize]))
                .collect(),
            HashMap::new(),
        ),
    };

    let emit_side = |tris: &[SideTriangle]| -> Vec<Triangle> {
        let mut out = Vec::with_capacity(tris.len());
        for t in tris {
            if subdivisions.is_empty() {
                out.push(t.to_triangle());
            } else {
                subdivide_side_triangle(t, &subdivisions, &mut out);
            }
        }
        out
    };
    let mut below_out = emit_side(&below);
    let mut above_out = emit_side(&above);

    let cap_vertex = |p: Vec3, n: Vec3| Vertex::new(p, n, Vec2::new(p.dot(t1), p.dot(t2)));
    for face in &cap_faces {
        let mut n = (face[1] - face[0]).cross(face[2] - face[0]);
        if n.length_squared() <= MIN_DOUBLE_AREA * MIN_DOUBLE_AREA {
            continue;
        }
        n = n.normalize();
        if surface.is_none() {
            n = plane.n;
        }
        below_out.push(Triangle {
            a: cap_vertex(face[0], n),
            b: cap_vertex(face[1], n),
            c: cap_vertex(face[2], n),
            material_id: interior_material,
            smoothing_group: SMOOTHING_GROUP_INTERIOR,
            user_data: cap_id,
        });
        above_out.push(Triangle {
            a: cap_vertex(face[0], -n),
            b: cap_vertex(face[2], -n),
            c: cap_vertex(face[1], -n),
            material_id: interior_material,
            smoothing_group: SMOOTHING_GROUP_INTERIOR,
            user_data: -cap_id,
        });
    }

    log::debug!(
        "plane split: {} triangles -> {} below, {} above, {} cap loops",
        triangles.len(),
        below_out.len(),
        above_out.len(),
        loops.len()
    );
    PlaneSplit {
        below: below_out,
        above: above_out,
    }
}

/// Clip one straddling triangle to the half `keep` (-1 below, 1 above)
fn clip_triangle(
    tri: &SideTriangle,
    side: &[i8; 3],
    keep: i8,
    topo: &mut Topology,
    dist: &[f32],
    out: &mut Vec<SideTriangle>,
) {
    let mut poly: Vec<(Vertex, u32)> = Vec::with_capacity(4);
    for k in 0..3 {
        let j = (k + 1) % 3;
        if side[k] != -keep {
            poly.push((tri.verts[k], tri.ids[k]));
        }
        if side[k] * side[j] == -1 {
            let (lo, hi) = if tri.ids[k] < tri.ids[j] { (k, j) } else { (j, k) };
            let (id, t) = topo.crossing(tri.ids[lo], tri.ids[hi], dist);
            let mut v = tri.verts[lo].lerp(&tri.verts[hi], t);
            v.p = topo.pos[id as usize];
            poly.push((v, id));
        }
    }
    for m in 1..poly.len().saturating_sub(1) {
        let (a, b, c) = (poly[0], poly[m], poly[m + 1]);
        if a.1 == b.1 || b.1 == c.1 || a.1 == c.1 {
            continue;
        }
        if (b.0.p - a.0.p).cross(c.0.p - a.0.p).length() <= MIN_DOUBLE_AREA {
            continue;
        }
        out.push(SideTriangle {
            verts: [a.0, b.0, c.0],
            ids: [a.1, b.1, c.1],
            ..*tri
        });
    }
}

/// Closed cap loops for the `below` half, counter-clockwise around the plane normal
///
/// Open on-plane edges of the lower half are reversed and chained. Chains
/// that do not close are dropped.
fn cap_loops(below: &[SideTriangle], topo: &Topology) -> Vec<Vec<u32>> {
    let mut balance: HashMap<(u32, u32), i32> = HashMap::new();
    for t in below {
        for k in 0..3 {
            let (a, b) = (t.ids[k], t.ids[(k + 1) % 3]);
            if !topo.on_plane[a as usize] || !topo.on_plane[b as usize] {
                continue;
            }
            *balance.entry((a, b)).or_insert(0) += 1;
            *balance.entry((b, a)).or_insert(0) -= 1;
        }
    }
    // reversed open edges: (end, start) of every unmatched boundary edge
    let mut next: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    let mut open: Vec<(u32, u32)> = Vec::new();
    for (&(a, b), &count) in &balance {
        for _ in 0..count.max(0) {
            open.push((b, a));
        }
    }
    open.sort_unstable();
    for &(s, e) in &open {
        next.entry(s).or_default().push(e);
    }

    let mut loops = Vec::new();
    for &(s, e) in &open {
        let Some(ends) = next.get_mut(&s) else { continue };
        let Some(pos) = ends.iter().position(|&x| x == e) else { continue };
        ends.remove(pos);

        let mut ring = vec![s];
        let mut cur = e;
        let mut closed = false;
        while ring.len() <= open.len() {
            if cur == s {
                closed = true;
                break;
            }
            ring.push(cur);
            match next.get_mut(&cur).and_then(|ends| if ends.is_empty() { None } else { Some(ends.remove(0)) }) {
                Some(n) => cur = n,
                None => break,
            }
        }
        if closed && ring.len() >= 3 {
            loops.push(ring);
        } else {
            log::warn!("dropping unclosed cap loop with {} vertices", ring.len());
        }
    }
    loops
}

/// Subdivide cap triangles and displace their interior along `normal`
///
/// Returns the displaced faces and, for every boundary edge, the points
/// inserted along it ordered from the lower to the higher vertex id.
#[allow(clippy::type_complexity)]
fn tessellate_cap(
    cap: &[[u32; 3]],
    pos: &[Vec3],
    boundary: &HashSet<(u32, u32)>,
    normal: Vec3,
    surface: &CapSurface,
) -> (Vec<[Vec3; 3]>, HashMap<(u32, u32), Vec<Vec3>>) {
    let r = surface.resolution;
    let rf = r as f32;
    let displace = |p: Vec3| p + normal * surface.noise.sample(p);
    let mut subdivisions: HashMap<(u32, u32), Vec<Vec3>> = HashMap::new();

    let mut edge_point = |x: u32, y: u32, k: u32| -> Vec3 {
        let (lo, hi, kk) = if x < y { (x, y, k) } else { (y, x, r - k) };
        let p = pos[lo as usize].lerp(pos[hi as usize], kk as f32 / rf);
        if boundary.contains(&(lo, hi)) {
            subdivisions.entry((lo, hi)).or_insert_with(|| {
                (1..r)
                    .map(|m| pos[lo as usize].lerp(pos[hi as usize], m as f32 / rf))
                    .collect()
            });
            p
        } else {
            displace(p)
        }
    };

    let mut faces = Vec::with_capacity(cap.len() * (r * r) as usize);
    for &[a, b, c] in cap {
        let (pa, pb, pc) = (pos[a as usize], pos[b as usize], pos[c as usize]);
        let mut grid: HashMap<(u32, u32), Vec3> = HashMap::new();
        for i in 0..=r {
            for j in 0..=(r - i) {
                let p = if i == 0 && j == 0 {
                    pa
                } else if i == r {
                    pb
                } else if j == r {
                    pc
                } else if j == 0 {
                    edge_point(a, b, i)
                } else if i == 0 {
                    edge_point(a, c, j)
                } else if i + j == r {
                    edge_point(b, c, j)
                } else {
                    displace(pa + (pb - pa) * (i as f32 / rf) + (pc - pa) * (j as f32 / rf))
                };
                grid.insert((i, j), p);
            }
        }
        let at = |i: u32, j: u32| grid[&(i, j)];
        for i in 0..r {
            for j in 0..(r - i) {
                faces.push([at(i, j), at(i + 1, j), at(i, j + 1)]);
                if i + j + 1 < r {
                    faces.push([at(i + 1, j), at(i + 1, j + 1), at(i, j + 1)]);
                }
            }
        }
    }
    (faces, subdivisions)
}

/// Re-triangulate a side triangle whose edges received cap subdivision points
fn subdivide_side_triangle(
    tri: &SideTriangle,
    subdivisions: &HashMap<(u32, u32), Vec<Vec3>>,
    out: &mut Vec<Triangle>,
) {
    let mut ring: Vec<Vertex> = Vec::with_capacity(3);
    let mut inserted = false;
    for k in 0..3 {
        let j = (k + 1) % 3;
        ring.push(tri.verts[k]);
        let (x, y) = (tri.ids[k], tri.ids[j]);
        if let Some(points) = subdivisions.get(&undirected(x, y)) {
            inserted = true;
            let count = points.len() + 1;
            for m in 0..points.len() {
                let (idx, t) = if x < y {
                    (m, (m + 1) as f32 / count as f32)
                } else {
                    (points.len() - 1 - m, (m + 1) as f32 / count as f32)
                };
                let mut v = tri.verts[k].lerp(&tri.verts[j], t);
                v.p = points[idx];
                ring.push(v);
            }
        }
    }
    if !inserted {
        out.push(tri.to_triangle());
        return;
    }
    let inv = 1.0 / 3.0;
    let center = Vertex {
        p: (tri.verts[0].p + tri.verts[1].p + tri.verts[2].p) * inv,
        n: (tri.verts[0].n + tri.verts[1].n + tri.verts[2].n).normalize_or_zero(),
        uv: (tri.verts[0].uv + tri.verts[1].uv + tri.verts[2].uv) * inv,
    };
    for k in 0..ring.len() {
        out.push(Triangle {
            a: center,
            b: ring[k],
            c: ring[(k + 1) % ring.len()],
            material_id: tri.material_id,
            smoothing_group: tri.smoothing_group,
            user_data: tri.user_data,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::tests::box_mesh;
    use crate::mesh::Mesh;

    fn cube() -> Vec<Triangle> {
        box_mesh(Vec3::splat(-1.0), Vec3::splat(1.0)).to_triangles()
    }

    fn volume(tris: &[Triangle]) -> f32 {
        Mesh::from_triangles(tris).volume()
    }

    #[test]
    fn test_axis_split_of_cube() {
        let plane = Plane::from_point_normal(Vec3::ZERO, Vec3::X);
        let split = split_by_plane(&cube(), &plane, 5, 1000, None);
        assert!((volume(&split.below) - 4.0).abs() < 1e-4);
        assert!((volume(&split.above) - 4.0).abs() < 1e-4);
        assert!(!Mesh::from_triangles(&split.below).has_open_edges());
        assert!(!Mesh::from_triangles(&split.above).has_open_edges());

        let below_cap: f32 = split.below.iter().filter(|t| t.user_data == 5).map(|t| t.area()).sum();
        let above_cap: f32 = split.above.iter().filter(|t| t.user_data == -5).map(|t| t.area()).sum();
        assert!((below_cap - 4.0).abs() < 1e-4);
        assert!((above_cap - 4.0).abs() < 1e-4);

        for t in split.below.iter().filter(|t| t.is_interior()) {
            assert_eq!(t.material_id, 1000);
            assert!(t.normal().normalize().dot(Vec3::X) > 0.999);
        }
        assert!(split.below.iter().all(|t| t.positions().iter().all(|p| p.x <= 1e-5)));
    }

    #[test]
    fn test_oblique_split_conserves_volume() {
        let plane = Plane::from_point_normal(Vec3::new(0.1, -0.2, 0.3), Vec3::new(0.3, 0.8, -0.5));
        let split = split_by_plane(&cube(), &plane, 9, 1000, None);
        let total = volume(&split.below) + volume(&split.above);
        assert!((total - 8.0).abs() < 1e-3);
        assert!(!Mesh::from_triangles(&split.below).has_open_edges());
        assert!(!Mesh::from_triangles(&split.above).has_open_edges());
    }

    #[test]
    fn test_repeated_oblique_splits_stay_closed() {
        use crate::random::{ChaChaRandom, RandomGenerator};

        for seed in 0..8 {
            let mut rng = ChaChaRandom::new(seed);
            let mut random_vec = || {
                Vec3::new(rng.random_value(), rng.random_value(), rng.random_value()) * 2.0 - Vec3::ONE
            };
            let mut pieces = vec![cube()];
            for cut in 0..4 {
                let point = random_vec() * 0.5;
                let normal = random_vec().normalize_or(Vec3::X);
                let plane = Plane::from_point_normal(point, normal);
                let mut next = Vec::new();
                for piece in &pieces {
                    let split = split_by_plane(piece, &plane, cut + 1, 1000, None);
                    next.extend([split.below, split.above].into_iter().filter(|p| !p.is_empty()));
                }
                pieces = next;
                for piece in &pieces {
                    assert!(!Mesh::from_triangles(piece).has_open_edges(), "seed {} cut {}", seed, cut);
                }
            }
            let total: f32 = pieces.iter().map(|p| volume(p)).sum();
            assert!((total - 8.0).abs() < 1e-3, "seed {}: volume {}", seed, total);
        }
    }

    #[test]
    fn test_split_through_vertices() {
        // plane through the diagonal edge shared by cube triangles
        let plane = Plane::from_point_normal(Vec3::ZERO, Vec3::new(1.0, -1.0, 0.0));
        let split = split_by_plane(&cube(), &plane, 1, 1000, None);
        assert!((volume(&split.below) - 4.0).abs() < 1e-4);
        assert!((volume(&split.above) - 4.0).abs() < 1e-4);
        assert!(!Mesh::from_triangles(&split.below).has_open_edges());
    }

    #[test]
    fn test_plane_missing_mesh() {
        let tris = cube();
        let plane = Plane::from_point_normal(Vec3::new(3.0, 0.0, 0.0), Vec3::X);
        let split = split_by_plane(&tris, &plane, 1, 1000, None);
        assert_eq!(split.below.len(), tris.len());
        assert!(split.above.is_empty());

        let plane = Plane::from_point_normal(Vec3::new(-3.0, 0.0, 0.0), Vec3::X);
        let split = split_by_plane(&tris, &plane, 1, 1000, None);
        assert!(split.below.is_empty());
        assert_eq!(split.above.len(), tris.len());
    }

    #[test]
    fn test_noisy_split_is_watertight() {
        let surface = CapSurface {
            noise: FractalNoise::new(0.1, 2.0, 2, 7),
            resolution: 4,
        };
        let plane = Plane::from_point_normal(Vec3::new(0.0, 0.0, 0.2), Vec3::Z);
        let split = split_by_plane(&cube(), &plane, 3, 1000, Some(&surface));
        let below = Mesh::from_triangles(&split.below);
        let above = Mesh::from_triangles(&split.above);
        assert!(!below.has_open_edges());
        assert!(!above.has_open_edges());
        assert!((below.volume() + above.volume() - 8.0).abs() < 1e-3);

        // the cap really is displaced
        let max_offset = split
            .below
            .iter()
            .filter(|t| t.user_data == 3)
            .flat_map(|t| t.positions())
            .map(|p| (p.z - 0.2).abs())
            .fold(0.0f32, f32::max);
        assert!(max_offset > 1e-4);
    }

    #[test]
    fn test_ring_mesh_cap_has_hole() {
        // square tube along z: outer 2x2, inner 1x1
        let outer = box_mesh(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0)).to_triangles();
        let inner: Vec<Triangle> = box_mesh(Vec3::new(-0.5, -0.5, -1.5), Vec3::new(0.5, 0.5, 1.5))
            .to_triangles()
            .into_iter()
            .map(|mut t| {
                std::mem::swap(&mut t.b, &mut t.c);
                t
            })
            .collect();
        let mut tris = outer;
        tris.extend(inner);
        let plane = Plane::from_point_normal(Vec3::ZERO, Vec3::Z);
        let split = split_by_plane(&tris, &plane, 2, 1000, None);
        let cap: f32 = split.below.iter().filter(|t| t.user_data == 2).map(|t| t.area()).sum();
        assert!((cap - 3.0).abs() < 1e-4);
    }
}
