//! Synthetic box meshes used as cutting tools

use glam::{Vec2, Vec3};

use super::noise::FractalNoise;
use super::Mesh;
use crate::geometry::{Edge, Facet, Vertex};

/// Orthonormal tangents `(t1, t2)` of `normal`
///
/// `t1 = n × ẑ`, or `n × x̂` when the normal is close to z; `t2 = t1 × n`.
pub fn get_tangents(normal: Vec3) -> (Vec3, Vec3) {
    let t1 = if normal.z.abs() < 0.9 {
        normal.cross(Vec3::Z)
    } else {
        normal.cross(Vec3::X)
    }
    .normalize_or_zero();
    let t2 = t1.cross(normal).normalize_or_zero();
    (t1, t2)
}

// Six outward quads over vertices 0..3 (cutting face) and 4..7 (far face).
const BOX_QUADS: [[u32; 4]; 6] = [
    [0, 1, 2, 3],
    [0, 3, 7, 4],
    [3, 2, 6, 7],
    [5, 6, 2, 1],
    [4, 5, 1, 0],
    [4, 7, 6, 5],
];

const BOX_UVS: [Vec2; 4] = [
    Vec2::new(0.0, 0.0),
    Vec2::new(10.0, 0.0),
    Vec2::new(10.0, 10.0),
    Vec2::new(0.0, 10.0),
];

fn box_corners(point: Vec3, t1: Vec3, t2: Vec3, near: Vec3, far: Vec3, size: f32) -> [Vec3; 8] {
    [
        point + (t1 + t2 + near) * size,
        point + (t2 - t1 + near) * size,
        point + (-t1 - t2 + near) * size,
        point + (t1 - t2 + near) * size,
        point + (t1 + t2 + far) * size,
        point + (t2 - t1 + far) * size,
        point + (-t1 - t2 + far) * size,
        point + (t1 - t2 + far) * size,
    ]
}

fn push_quad(edges: &mut Vec<Edge>, facets: &mut Vec<Facet>, quad: [u32; 4], material: i32, user_data: i64) {
    let first = edges.len() as u32;
    for k in 0..4 {
        edges.push(Edge::new(quad[k], quad[(k + 1) % 4]));
    }
    facets.push(Facet {
        first_edge: first,
        edges_count: 4,
        material_id: material,
        smoothing_group: -1,
        user_data,
    });
}

fn box_from_corners(corners: [Vec3; 8], vertex_normal: Vec3, material: i32, user_data: i64) -> Mesh {
    let vertices = corners
        .iter()
        .enumerate()
        .map(|(i, &p)| Vertex::new(p, vertex_normal, BOX_UVS[i % 4]))
        .collect();
    let mut edges = Vec::with_capacity(24);
    let mut facets = Vec::with_capacity(6);
    for quad in BOX_QUADS {
        push_quad(&mut edges, &mut facets, quad, material, user_data);
    }
    Mesh::new(vertices, edges, facets)
}

/// Box whose face at `point` is perpendicular to `normal`, extending `size` along it
///
/// The cutting face spans `±size` along both tangents. Every facet carries
/// `interior_material` and `user_data`.
pub fn get_cutting_box(point: Vec3, normal: Vec3, size: f32, user_data: i64, interior_material: i32) -> Mesh {
    let n = normal.normalize_or_zero();
    let (t1, t2) = get_tangents(n);
    let corners = box_corners(point, t1, t2, Vec3::ZERO, n, size);
    box_from_corners(corners, -n, interior_material, user_data)
}

/// Reposition an eight-vertex cutting box in place
///
/// Meshes with fewer than eight vertices are left untouched.
pub fn set_cutting_box(point: Vec3, normal: Vec3, mesh: &mut Mesh, size: f32, user_data: i64) {
    if mesh.vertex_count() < 8 {
        log::warn!("set_cutting_box: mesh has {} vertices, expected 8", mesh.vertex_count());
        return;
    }
    let n = normal.normalize_or_zero();
    let (t1, t2) = get_tangents(n);
    let corners = box_corners(point, t1, t2, Vec3::ZERO, n, size);
    for (v, p) in mesh.vertices_mut().iter_mut().zip(corners) {
        v.p = p;
        v.n = -n;
    }
    for f in mesh.facets_mut() {
        f.user_data = user_data;
    }
    mesh.recalculate_bounding_box();
}

/// Flip every vertex normal and stamp `user_data` on every facet
pub fn inverse_normal_and_set_user_data(mesh: &mut Mesh, user_data: i64) {
    for v in mesh.vertices_mut() {
        v.n = -v.n;
    }
    for f in mesh.facets_mut() {
        f.user_data = user_data;
    }
}

/// Axis-aligned cube of half-extent `size` around `point`
pub fn get_big_box(point: Vec3, size: f32, interior_material: i32) -> Mesh {
    let (t1, t2) = get_tangents(Vec3::Z);
    let corners = box_corners(point, t1, t2, -Vec3::Z, Vec3::Z, size);
    box_from_corners(corners, Vec3::ZERO, interior_material, 0)
}

/// Cutting box whose cutting face is a noise-displaced grid
///
/// The central `2·jagged_plane_size` square of the cutting face is a
/// `(resolution+1)²` grid; its interior points are pushed along `normal`
/// by fractal noise seeded with `seed`. The rest of the cutting face is a
/// frame joining the grid border to the outer box of half-extent `size`.
#[allow(clippy::too_many_arguments)]
pub fn get_noisy_cutting_box_pair(
    point: Vec3,
    normal: Vec3,
    size: f32,
    jagged_plane_size: f32,
    resolution: u32,
    user_data: i64,
    amplitude: f32,
    frequency: f32,
    octaves: u32,
    seed: i32,
    interior_material: i32,
) -> Mesh {
    let noise = FractalNoise::new(amplitude, frequency, octaves, seed);
    let n = normal.normalize_or_zero();
    let (t1, t2) = get_tangents(n);
    let res = resolution.max(1);
    let row = res + 1;
    let at = |i: u32, j: u32| i * row + j;

    let origin = point + (t1 + t2) * jagged_plane_size;
    let step1 = -t1 * 2.0 * jagged_plane_size / res as f32;
    let step2 = -t2 * 2.0 * jagged_plane_size / res as f32;

    let mut vertices = Vec::with_capacity((row * row + 8) as usize);
    for i in 0..row {
        for j in 0..row {
            let p = origin + step2 * i as f32 + step1 * j as f32;
            let uv = Vec2::new(j as f32, i as f32) * (10.0 / res as f32);
            vertices.push(Vertex::new(p, -n, uv));
        }
    }
    for i in 1..res {
        for j in 1..res {
            let v = &mut vertices[at(i, j) as usize];
            v.p += n * noise.sample(v.p);
        }
    }
    for i in 1..res {
        for j in 1..res {
            let c = vertices[at(i, j) as usize].p;
            let v1 = vertices[at(i + 1, j) as usize].p - c;
            let v2 = vertices[at(i, j + 1) as usize].p - c;
            let v3 = vertices[at(i - 1, j) as usize].p - c;
            let v4 = vertices[at(i, j - 1) as usize].p - c;
            let mut vn = (v1.cross(v2) + v2.cross(v3) + v3.cross(v4) + v4.cross(v1)).normalize_or_zero();
            if vn.dot(n) > 0.0 {
                vn = -vn;
            }
            vertices[at(i, j) as usize].n = vn;
        }
    }

    let mut edges = Vec::new();
    let mut facets = Vec::new();
    for i in 0..res {
        for j in 0..res {
            push_quad(
                &mut edges,
                &mut facets,
                [at(i, j), at(i, j + 1), at(i + 1, j + 1), at(i + 1, j)],
                interior_material,
                user_data,
            );
        }
    }

    let outer = row * row;
    for (k, p) in box_corners(point, t1, t2, Vec3::ZERO, n, size).iter().enumerate() {
        vertices.push(Vertex::new(*p, -n, BOX_UVS[k % 4]));
    }

    // Grid border walked from corner k+1 back to corner k, for k = 0..3.
    let sides: [Vec<u32>; 4] = [
        (0..=res).rev().map(|j| at(0, j)).collect(),
        (0..=res).rev().map(|i| at(i, res)).collect(),
        (0..=res).map(|j| at(res, j)).collect(),
        (0..=res).map(|i| at(i, 0)).collect(),
    ];
    for (k, side) in sides.iter().enumerate() {
        let mut ring = vec![outer + k as u32, outer + ((k + 1) % 4) as u32];
        ring.extend_from_slice(side);
        let first = edges.len() as u32;
        for m in 0..ring.len() {
            edges.push(Edge::new(ring[m], ring[(m + 1) % ring.len()]));
        }
        facets.push(Facet {
            first_edge: first,
            edges_count: ring.len() as u32,
            material_id: interior_material,
            smoothing_group: -1,
            user_data,
        });
    }
    for quad in &BOX_QUADS[1..] {
        push_quad(
            &mut edges,
            &mut facets,
            quad.map(|v| v + outer),
            interior_material,
            user_data,
        );
    }
    Mesh::new(vertices, edges, facets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tangents_are_orthonormal() {
        for n in [Vec3::X, Vec3::Y, Vec3::Z, Vec3::new(0.3, -0.5, 0.8).normalize()] {
            let (t1, t2) = get_tangents(n);
            assert!((t1.length() - 1.0).abs() < 1e-5);
            assert!((t2.length() - 1.0).abs() < 1e-5);
            assert!(t1.dot(n).abs() < 1e-5);
            assert!(t2.dot(n).abs() < 1e-5);
            assert!(t1.dot(t2).abs() < 1e-5);
        }
    }

    #[test]
    fn test_cutting_box_layout() {
        let mesh = get_cutting_box(Vec3::ZERO, Vec3::Z, 2.0, 7, 1000);
        assert!(mesh.is_valid());
        assert_eq!(mesh.vertex_count(), 8);
        assert_eq!(mesh.facet_count(), 6);
        assert!(mesh.facets().iter().all(|f| f.user_data == 7 && f.material_id == 1000));
        assert!(!mesh.has_open_edges());

        // cutting face faces away from the box
        assert!((mesh.facet_normal(0) + Vec3::Z).length() < 1e-5);
        let bounds = mesh.bounding_box();
        assert!(bounds.min.z.abs() < 1e-6);
        assert!((bounds.max.z - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_set_cutting_box_moves_existing_box() {
        let mut mesh = get_cutting_box(Vec3::ZERO, Vec3::Z, 1.0, 0, 1000);
        set_cutting_box(Vec3::new(5.0, 0.0, 0.0), Vec3::X, &mut mesh, 1.0, 3);
        let expected = get_cutting_box(Vec3::new(5.0, 0.0, 0.0), Vec3::X, 1.0, 3, 1000);
        for (a, b) in mesh.vertices().iter().zip(expected.vertices()) {
            assert!((a.p - b.p).length() < 1e-6);
            assert!((a.n - b.n).length() < 1e-6);
        }
        assert!(mesh.facets().iter().all(|f| f.user_data == 3));
    }

    #[test]
    fn test_inverse_normals() {
        let mut mesh = get_cutting_box(Vec3::ZERO, Vec3::Y, 1.0, 0, 1000);
        inverse_normal_and_set_user_data(&mut mesh, -4);
        assert!(mesh.vertices().iter().all(|v| (v.n - Vec3::Y).length() < 1e-6));
        assert!(mesh.facets().iter().all(|f| f.user_data == -4));
    }

    #[test]
    fn test_big_box_volume() {
        let mesh = Mesh::from_triangles(&get_big_box(Vec3::ONE, 2.0, 1000).to_triangles());
        assert!((mesh.volume() - 64.0).abs() < 1e-3);
        assert!(mesh.bounding_box().contains(Vec3::ONE));
    }

    #[test]
    fn test_noisy_box_is_closed_and_deterministic() {
        let a = get_noisy_cutting_box_pair(Vec3::ZERO, Vec3::X, 10.0, 1.0, 8, 5, 0.1, 1.0, 2, 42, 1000);
        let b = get_noisy_cutting_box_pair(Vec3::ZERO, Vec3::X, 10.0, 1.0, 8, 5, 0.1, 1.0, 2, 42, 1000);
        assert!(a.is_valid());
        assert!(!a.has_open_edges());
        assert_eq!(a, b);
        assert_eq!(a.vertex_count(), 81 + 8);

        let c = get_noisy_cutting_box_pair(Vec3::ZERO, Vec3::X, 10.0, 1.0, 8, 5, 0.1, 1.0, 2, 43, 1000);
        assert_ne!(a, c);

        // border of the jagged grid stays on the cutting plane
        for v in a.vertices().iter().take(9) {
            assert!(v.p.x.abs() < 1e-6);
        }
    }
}
