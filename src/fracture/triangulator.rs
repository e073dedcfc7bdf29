//! Ear-clipping triangulation of planar cap loops
//!
//! Loops are given in a 2D frame where outer boundaries run counter-clockwise
//! and holes clockwise. Holes are bridged into their enclosing outer loop
//! before clipping. Output triangles are counter-clockwise.

use glam::Vec2;

/// Loops with smaller absolute area are ignored
const MIN_LOOP_AREA: f32 = 1e-12;

fn signed_area(points: &[Vec2], ring: &[usize]) -> f32 {
    let mut area = 0.0;
    for k in 0..ring.len() {
        let a = points[ring[k]];
        let b = points[ring[(k + 1) % ring.len()]];
        area += a.perp_dot(b);
    }
    area * 0.5
}

fn point_in_ring(points: &[Vec2], ring: &[usize], p: Vec2) -> bool {
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let a = points[ring[i]];
        let b = points[ring[j]];
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Proper crossing of segments `a-b` and `c-d` (shared endpoints excluded)
fn segments_cross(a: Vec2, b: Vec2, c: Vec2, d: Vec2) -> bool {
    if a == c || a == d || b == c || b == d {
        return false;
    }
    let d1 = (b - a).perp_dot(c - a);
    let d2 = (b - a).perp_dot(d - a);
    let d3 = (d - c).perp_dot(a - c);
    let d4 = (d - c).perp_dot(b - c);
    (d1 > 0.0) != (d2 > 0.0) && (d3 > 0.0) != (d4 > 0.0) && d1 != 0.0 && d2 != 0.0
}

fn ring_edges_cross(points: &[Vec2], ring: &[usize], a: Vec2, b: Vec2) -> bool {
    (0..ring.len()).any(|k| {
        let c = points[ring[k]];
        let d = points[ring[(k + 1) % ring.len()]];
        segments_cross(a, b, c, d)
    })
}

/// Splice `hole` into `outer` through a bridge between mutually visible vertices
fn bridge_hole(points: &[Vec2], outer: &[usize], hole: &[usize], others: &[Vec<usize>]) -> Vec<usize> {
    let (hi, &hv) = hole
        .iter()
        .enumerate()
        .max_by(|a, b| points[*a.1].x.total_cmp(&points[*b.1].x))
        .unwrap_or((0, &hole[0]));
    let m = points[hv];

    let mut best: Option<(usize, f32)> = None;
    for (oi, &ov) in outer.iter().enumerate() {
        let v = points[ov];
        let dist = (v - m).length_squared();
        if best.is_some_and(|(_, d)| d <= dist) {
            continue;
        }
        let blocked = ring_edges_cross(points, outer, m, v)
            || ring_edges_cross(points, hole, m, v)
            || others.iter().any(|r| ring_edges_cross(points, r, m, v));
        if !blocked {
            best = Some((oi, dist));
        }
    }
    let oi = match best {
        Some((oi, _)) => oi,
        None => {
            log::warn!("cap hole has no visible bridge vertex; bridging to nearest");
            outer
                .iter()
                .enumerate()
                .min_by(|a, b| {
                    (points[*a.1] - m)
                        .length_squared()
                        .total_cmp(&(points[*b.1] - m).length_squared())
                })
                .map_or(0, |(i, _)| i)
        }
    };

    let mut merged = Vec::with_capacity(outer.len() + hole.len() + 2);
    merged.extend_from_slice(&outer[..=oi]);
    merged.extend_from_slice(&hole[hi..]);
    merged.extend_from_slice(&hole[..=hi]);
    merged.extend_from_slice(&outer[oi..]);
    merged
}

/// Sine of the smallest corner angle an ear tip may have
const FLAT_CORNER_SIN: f32 = 1e-6;

fn is_flat(a: Vec2, b: Vec2, c: Vec2) -> bool {
    (b - a).perp_dot(c - b) <= FLAT_CORNER_SIN * (b - a).length() * (c - b).length()
}

/// Whether `p` blocks the ear `a-b-c`
///
/// Points on the diagonal `c-a` block, since clipping would leave them as
/// T-junctions. Points on the line of the ear's own edges do not.
fn blocks_ear(p: Vec2, a: Vec2, b: Vec2, c: Vec2) -> bool {
    (b - a).perp_dot(p - a) > 0.0 && (c - b).perp_dot(p - b) > 0.0 && (a - c).perp_dot(p - c) >= 0.0
}

/// Ear clipping of a simple (possibly bridged) CCW polygon
///
/// Every ring vertex ends up in at least one triangle, so collinear
/// boundary points stay connected to the surfaces sharing that boundary.
fn ear_clip(points: &[Vec2], ring: &[usize], out: &mut Vec<[usize; 3]>) {
    let mut remaining: Vec<usize> = ring.to_vec();
    while remaining.len() > 3 {
        let n = remaining.len();
        let corner = |i: usize| {
            (
                remaining[(i + n - 1) % n],
                remaining[i],
                remaining[(i + 1) % n],
            )
        };
        let ear = (0..n).find(|&i| {
            let (ia, ib, ic) = corner(i);
            let (a, b, c) = (points[ia], points[ib], points[ic]);
            if is_flat(a, b, c) {
                return false;
            }
            !remaining.iter().any(|&iv| {
                let p = points[iv];
                p != a && p != b && p != c && blocks_ear(p, a, b, c)
            })
        });
        let i = match ear {
            Some(i) => i,
            None => {
                // no clean ear: force the sharpest convex corner
                let sharpest = (0..n)
                    .filter(|&i| {
                        let (ia, ib, ic) = corner(i);
                        !is_flat(points[ia], points[ib], points[ic])
                    })
                    .max_by(|&x, &y| {
                        let turn = |i: usize| {
                            let (ia, ib, ic) = corner(i);
                            (points[ib] - points[ia]).perp_dot(points[ic] - points[ib])
                        };
                        turn(x).total_cmp(&turn(y))
                    });
                match sharpest {
                    Some(i) => {
                        log::debug!("ear clipping stalled with {} vertices; forcing an ear", n);
                        i
                    }
                    None => {
                        log::warn!("cap loop with {} vertices has no area; skipped", n);
                        return;
                    }
                }
            }
        };
        let (ia, ib, ic) = corner(i);
        out.push([ia, ib, ic]);
        remaining.remove(i);
    }
    if remaining.len() == 3 {
        let (a, b, c) = (points[remaining[0]], points[remaining[1]], points[remaining[2]]);
        if (b - a).perp_dot(c - a) > 0.0 {
            out.push([remaining[0], remaining[1], remaining[2]]);
        }
    }
}

/// Triangulate a set of loops over `points`
///
/// Returns index triples into `points`.
pub(crate) fn triangulate_loops(points: &[Vec2], loops: &[Vec<usize>]) -> Vec<[usize; 3]> {
    let mut outers: Vec<(Vec<usize>, f32)> = Vec::new();
    let mut holes: Vec<Vec<usize>> = Vec::new();
    for ring in loops {
        if ring.len() < 3 {
            continue;
        }
        let area = signed_area(points, ring);
        if area > MIN_LOOP_AREA {
            outers.push((ring.clone(), area));
        } else if area < -MIN_LOOP_AREA {
            holes.push(ring.clone());
        }
    }

    let mut outer_holes: Vec<Vec<Vec<usize>>> = vec![Vec::new(); outers.len()];
    for hole in holes {
        let first = points[hole[0]];
        let owner = outers
            .iter()
            .enumerate()
            .filter(|(_, (ring, _))| point_in_ring(points, ring, first))
            .min_by(|a, b| a.1 .1.total_cmp(&b.1 .1))
            .map(|(i, _)| i);
        match owner {
            Some(i) => outer_holes[i].push(hole),
            None => log::warn!("cap hole outside every outer loop; dropped"),
        }
    }

    let mut triangles = Vec::new();
    for ((outer, _), mut holes) in outers.into_iter().zip(outer_holes) {
        holes.sort_by(|a, b| {
            let ax = a.iter().map(|&i| points[i].x).fold(f32::MIN, f32::max);
            let bx = b.iter().map(|&i| points[i].x).fold(f32::MIN, f32::max);
            bx.total_cmp(&ax)
        });
        let mut ring = outer;
        for k in 0..holes.len() {
            ring = bridge_hole(points, &ring, &holes[k], &holes[k + 1..]);
        }
        ear_clip(points, &ring, &mut triangles);
    }
    triangles
}
