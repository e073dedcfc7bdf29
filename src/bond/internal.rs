//! Bonds and chunk descriptors from the fracture tool's interior surfaces
//!
//! Every cut tags the triangles it creates with a signed plane id: the side
//! below the plane carries `+id`, the side above `-id`. Two chunks touching
//! through a cut therefore hold triangle groups with opposite ids.

use std::collections::HashSet;

use glam::Vec3;

use super::{
    check_support, exact, Bond, BondDesc, BondGenerator, ChunkDesc, INVALID_INDEX, SUPPORT_FLAG,
};
use crate::error::Result;
use crate::fracture::FractureTool;
use crate::geometry::{Bounds, CollisionHullBuilder, Triangle, VERTEX_POSITION_EPS};
use crate::mesh::Mesh;
use crate::triangle_processor::convex_polygon_area;

/// Interior surface of one chunk on one cut plane
#[derive(Debug, Clone, Copy)]
struct SurfaceGroup {
    chunk: usize,
    area: f32,
    normal: Vec3,
    centroid: Vec3,
    bounds: Bounds,
}

impl SurfaceGroup {
    fn from_triangles<'a>(chunk: usize, triangles: impl Iterator<Item = &'a Triangle>) -> Self {
        let mut group = SurfaceGroup {
            chunk,
            area: 0.0,
            normal: Vec3::ZERO,
            centroid: Vec3::ZERO,
            bounds: Bounds::empty(),
        };
        let mut count = 0;
        for t in triangles {
            let p = t.positions();
            group.area += convex_polygon_area(&p);
            group.normal = t.normal().normalize_or(group.normal);
            for v in p {
                group.centroid += v;
                group.bounds.include(v);
            }
            count += 3;
        }
        if count > 0 {
            group.centroid /= count as f32;
        }
        group
    }
}

/// Bounds touch over an area, not just along an edge or at a corner
fn surfaces_touch(a: &Bounds, b: &Bounds) -> bool {
    if !a.weak_intersects(b) {
        return false;
    }
    let overlap = a.max.min(b.max) - a.min.max(b.min);
    overlap.to_array().iter().filter(|&&o| o > VERTEX_POSITION_EPS).count() >= 2
}

fn mean_vertex(triangles: &[Triangle]) -> Vec3 {
    if triangles.is_empty() {
        return Vec3::ZERO;
    }
    let sum: Vec3 = triangles.iter().flat_map(|t| t.positions()).sum();
    sum / (3 * triangles.len()) as f32
}

impl<B: CollisionHullBuilder> BondGenerator<B> {
    /// Chunk descriptors and bonds of a finalized fracture
    ///
    /// Descriptors follow the tool's chunk order: centroid is the mean
    /// triangle vertex, volume the enclosed mesh volume and `user_data` the
    /// chunk index. Bonds pair the interior surfaces of support chunks cut
    /// by the same plane from opposite sides; the bond area is the smaller
    /// of the two surfaces and the normal points out of the chunk below the
    /// plane. Support pairs that touch without sharing a tagged surface are
    /// bonded through [`Self::create_full_bond_list_exact`]'s triangle test.
    ///
    /// # Errors
    ///
    /// - [`FractureError::NotFinalized`](crate::FractureError::NotFinalized) before finalization
    /// - [`FractureError::InvalidConfig`](crate::FractureError::InvalidConfig) when `is_support`
    ///   does not hold one flag per chunk
    pub fn build_desc_from_internal_fracture(
        &mut self,
        tool: &FractureTool,
        is_support: &[bool],
    ) -> Result<(Vec<BondDesc>, Vec<ChunkDesc>)> {
        let chunk_count = tool.chunk_count();
        check_support(is_support, chunk_count)?;

        let meshes = (0..chunk_count)
            .map(|i| tool.base_mesh(i))
            .collect::<Result<Vec<_>>>()?;

        let chunks: Vec<ChunkDesc> = tool
            .chunk_list()
            .iter()
            .enumerate()
            .map(|(i, info)| ChunkDesc {
                centroid: mean_vertex(&meshes[i]).to_array(),
                volume: Mesh::from_triangles(&meshes[i]).volume(),
                parent_chunk_index: tool
                    .chunk_index(info.parent)
                    .map_or(INVALID_INDEX, |p| p as u32),
                flags: if is_support[i] { SUPPORT_FLAG } else { 0 },
                user_data: i as u32,
            })
            .collect();

        // (|plane id|, chunk, plane id, triangle)
        let mut tagged: Vec<(i64, usize, i64, usize)> = Vec::new();
        for (chunk, triangles) in meshes.iter().enumerate() {
            for (tr, t) in triangles.iter().enumerate() {
                if t.user_data != 0 {
                    tagged.push((t.user_data.abs(), chunk, t.user_data, tr));
                }
            }
        }
        tagged.sort_unstable();

        let mut bonds = Vec::new();
        let mut bonded: HashSet<(usize, usize)> = HashSet::new();
        for block in tagged.chunk_by(|a, b| a.0 == b.0) {
            let mut forward = Vec::new();
            let mut backward = Vec::new();
            for group in block.chunk_by(|a, b| a.1 == b.1 && a.2 == b.2) {
                let (_, chunk, id, _) = group[0];
                let surface = SurfaceGroup::from_triangles(chunk, group.iter().map(|g| &meshes[chunk][g.3]));
                if id > 0 {
                    forward.push(surface);
                } else {
                    backward.push(surface);
                }
            }

            for f in &forward {
                for b in &backward {
                    if !is_support[f.chunk] || !is_support[b.chunk] || !surfaces_touch(&f.bounds, &b.bounds) {
                        continue;
                    }
                    bonds.push(BondDesc {
                        bond: Bond {
                            normal: f.normal.to_array(),
                            area: f.area.min(b.area),
                            centroid: ((f.centroid + b.centroid) * 0.5).to_array(),
                            user_data: 0,
                        },
                        chunk_indices: [f.chunk as u32, b.chunk as u32],
                    });
                    bonded.insert((f.chunk.min(b.chunk), f.chunk.max(b.chunk)));
                }
            }
        }
        let tagged_bonds = bonds.len();

        let mesh_bounds: Vec<Bounds> = meshes
            .iter()
            .map(|m| {
                let mut bounds = Bounds::empty();
                m.iter().flat_map(|t| t.positions()).for_each(|p| bounds.include(p));
                bounds
            })
            .collect();
        let support_ids: Vec<usize> = (0..chunk_count).filter(|&i| is_support[i]).collect();
        let list = tool.chunk_list();
        for (k, &i) in support_ids.iter().enumerate() {
            for &j in &support_ids[k + 1..] {
                if bonded.contains(&(i, j))
                    || !mesh_bounds[i].weak_intersects(&mesh_bounds[j])
                    || tool.is_ancestor_for_chunk(list[i].chunk_id, list[j].chunk_id)
                    || tool.is_ancestor_for_chunk(list[j].chunk_id, list[i].chunk_id)
                {
                    continue;
                }
                let pair = [meshes[i].as_slice(), meshes[j].as_slice()];
                for mut desc in exact::exact_bonds(&pair, &[true, true], &mut self.plane_cache) {
                    desc.chunk_indices = [i as u32, j as u32];
                    bonds.push(desc);
                }
            }
        }

        log::debug!(
            "internal bonds: {} from cut surfaces, {} from touching chunks",
            tagged_bonds,
            bonds.len() - tagged_bonds
        );
        Ok((bonds, chunks))
    }
}
