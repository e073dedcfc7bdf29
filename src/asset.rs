//! Asset assembly: support coverage, chunk ordering and the authoring pipeline
//!
//! The runtime expects chunk descriptors where every leaf-to-root chain holds
//! exactly one support chunk, chunks sharing a parent are contiguous, and all
//! support (or above-support) chunks come before sub-support chunks.
//!
//! # Example
//!
//! ```rust
//! use fracture_authoring::*;
//!
//! let mut tool = FractureTool::new();
//! tool.set_source_mesh(&get_big_box(Vec3::ZERO, 1.0, MATERIAL_INTERIOR)).unwrap();
//! let config = SlicingConfigBuilder::new().slices(1, 1, 0).build().unwrap();
//! tool.slicing(0, &config, false, &mut ChaChaRandom::new(3)).unwrap();
//!
//! let settings = FractureSettings::default();
//! let result = process_fracture(
//!     &mut tool,
//!     &mut BondGenerator::new(),
//!     &ParryHullBuilder,
//!     &settings,
//! )
//! .unwrap();
//! assert_eq!(result.chunk_descs.len(), 5);
//! assert_eq!(result.bond_descs.len(), 4);
//! ```

use glam::Vec3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::bond::{Bond, BondDesc, BondGenerator, ChunkDesc, INVALID_INDEX};
use crate::config::FractureSettings;
use crate::error::{FractureError, Result};
use crate::fracture::{FractureState, FractureTool};
use crate::geometry::{CollisionHull, CollisionHullBuilder, Triangle};

const PARENT: u8 = 0x01;
const SUPPORT: u8 = 0x02;
const SUPER_SUPPORT: u8 = 0x04;
const UPPER_SUPPORT: u8 = SUPPORT | SUPER_SUPPORT;

fn parent_of(chunks: &[ChunkDesc], index: usize) -> Option<usize> {
    let parent = chunks[index].parent_chunk_index as usize;
    (parent < chunks.len()).then_some(parent)
}

/// `index` followed by its ancestors, bounded by the chunk count
fn chain(chunks: &[ChunkDesc], index: usize) -> impl Iterator<Item = usize> + '_ {
    std::iter::successors(Some(index), move |&i| parent_of(chunks, i)).take(chunks.len())
}

/// Per-chunk annotation flags from a walk over all leaf-to-root chains
struct Coverage {
    annotation: Vec<u8>,
    redundant: bool,
    insufficient: bool,
}

impl Coverage {
    fn is_exact(&self) -> bool {
        !self.redundant && !self.insufficient
    }
}

/// Annotate parents, support and super-support chunks
///
/// With `test_only` the walk stops at the first chain without exactly one
/// support chunk. Otherwise the annotation is repaired: only the highest
/// support of each chain is kept, and uncovered chains receive support at
/// the highest chunk that has no supported descendant.
fn annotate_support(chunks: &[ChunkDesc], test_only: bool) -> Coverage {
    let mut coverage = Coverage {
        annotation: vec![0; chunks.len()],
        redundant: false,
        insufficient: false,
    };
    let annotation = &mut coverage.annotation;

    for i in 0..chunks.len() {
        if annotation[i] & PARENT != 0 {
            continue;
        }
        for ancestor in chain(chunks, i).skip(1) {
            annotation[ancestor] = PARENT;
        }
    }
    let leaves: Vec<usize> = (0..chunks.len()).filter(|&i| annotation[i] & PARENT == 0).collect();

    for &i in &leaves {
        let mut support: Option<usize> = None;
        for c in chain(chunks, i) {
            if chunks[c].is_support() {
                let visited = annotation[c] & SUPPORT != 0;
                annotation[c] |= SUPPORT;
                if let Some(lower) = support {
                    if test_only {
                        coverage.redundant = true;
                        return coverage;
                    }
                    coverage.redundant = true;
                    annotation[lower] &= !SUPPORT;
                    for k in chain(chunks, lower).skip(1) {
                        annotation[k] &= !SUPER_SUPPORT;
                        if k == c {
                            break;
                        }
                    }
                }
                support = Some(c);
                if visited {
                    break;
                }
            } else if support.is_some() {
                annotation[c] |= SUPER_SUPPORT;
            }
        }
        if support.is_none() {
            coverage.insufficient = true;
            if test_only {
                return coverage;
            }
        }
    }

    if coverage.redundant {
        log::info!("some leaf-to-root chains had more than one support chunk, extra support removed");
    }
    if !coverage.insufficient {
        return coverage;
    }

    for &i in &leaves {
        let mut found = false;
        for c in chain(chunks, i) {
            if annotation[c] & SUPPORT != 0 {
                found = true;
            } else if found {
                annotation[c] |= SUPER_SUPPORT;
            }
        }
    }
    for &i in &leaves {
        let mut previous: Option<usize> = None;
        for c in chain(chunks, i) {
            if annotation[c] & SUPPORT != 0 {
                break;
            }
            if annotation[c] & SUPER_SUPPORT != 0 {
                if let Some(p) = previous {
                    annotation[p] |= SUPPORT;
                }
                break;
            }
            if parent_of(chunks, c).is_none() {
                annotation[c] |= SUPPORT;
                break;
            }
            previous = Some(c);
        }
    }
    log::info!("some leaf-to-root chains had no support chunk, support added");
    coverage
}

/// Make every leaf-to-root chain hold exactly one support chunk
///
/// Redundant support below the highest support chunk of a chain is
/// removed; chains without support get it at the highest chunk whose
/// subtree holds no support yet. Returns `true` when the descriptors were
/// already exact and nothing changed.
pub fn ensure_exact_support_coverage(chunks: &mut [ChunkDesc]) -> bool {
    let coverage = annotate_support(chunks, false);
    for (chunk, flags) in chunks.iter_mut().zip(&coverage.annotation) {
        chunk.set_support(flags & SUPPORT != 0);
    }
    coverage.is_exact()
}

fn is_valid_chunk_order(chunks: &[ChunkDesc], annotation: &[u8]) -> bool {
    let mut finished = vec![false; chunks.len()];
    let mut current_parent = INVALID_INDEX;
    for (i, chunk) in chunks.iter().enumerate() {
        let parent = chunk.parent_chunk_index;
        if parent != current_parent {
            if let Some(done) = finished.get_mut(current_parent as usize) {
                *done = true;
            }
            current_parent = parent;
            match finished.get(current_parent as usize) {
                None | Some(true) => return false,
                Some(false) => {}
            }
        }
        if i + 1 < chunks.len()
            && annotation[i] & UPPER_SUPPORT == 0
            && annotation[i + 1] & UPPER_SUPPORT != 0
        {
            return false;
        }
    }
    true
}

/// Map from current to runtime chunk order
///
/// `map[old] = new`. The identity is returned when the order is already
/// valid; otherwise chunks are stably sorted with support and above-support
/// chunks first, then by parent index (roots first).
/// Returns `None` when the descriptors do not have exact support coverage,
/// see [`ensure_exact_support_coverage`].
pub fn build_chunk_reorder_map(chunks: &[ChunkDesc]) -> Option<Vec<u32>> {
    let coverage = annotate_support(chunks, true);
    if !coverage.is_exact() {
        log::warn!("chunk descriptors do not have exact support coverage, no reorder map built");
        return None;
    }
    if is_valid_chunk_order(chunks, &coverage.annotation) {
        return Some((0..chunks.len() as u32).collect());
    }

    let mut order: Vec<u32> = (0..chunks.len() as u32).collect();
    order.sort_by_key(|&i| {
        let upper = coverage.annotation[i as usize] & UPPER_SUPPORT != 0;
        (!upper, chunks[i as usize].parent_chunk_index.wrapping_add(1))
    });
    Some(invert_map(&order))
}

/// Reorder chunks by `map` (`map[old] = new`) and remap bond chunk indices
///
/// Parent and bond indices past the chunk count (roots, the world) are left
/// untouched. With `keep_bond_normal_chunk_order` a bond normal is negated
/// when the order of its two chunk indices flips.
///
/// # Errors
///
/// [`FractureError::InvalidConfig`] when `map` is not a permutation of the
/// chunk indices.
pub fn apply_chunk_reorder_map(
    chunks: &mut [ChunkDesc],
    bonds: &mut [BondDesc],
    map: &[u32],
    keep_bond_normal_chunk_order: bool,
) -> Result<()> {
    let count = chunks.len();
    let mut seen = vec![false; count];
    if map.len() != count
        || map
            .iter()
            .any(|&m| (m as usize) >= count || std::mem::replace(&mut seen[m as usize], true))
    {
        return Err(FractureError::InvalidConfig(format!(
            "reorder map of {} entries is not a permutation of {} chunks",
            map.len(),
            count
        )));
    }

    let remap = |index: u32| -> u32 {
        if (index as usize) < count {
            map[index as usize]
        } else {
            index
        }
    };

    let original = chunks.to_vec();
    for (old, chunk) in original.into_iter().enumerate() {
        let slot = &mut chunks[map[old] as usize];
        *slot = chunk;
        slot.parent_chunk_index = remap(chunk.parent_chunk_index);
    }

    for desc in bonds.iter_mut() {
        let [i0, i1] = desc.chunk_indices;
        let (n0, n1) = (remap(i0), remap(i1));
        if keep_bond_normal_chunk_order && (i0 < i1) != (n0 < n1) {
            desc.bond.normal = (-Vec3::from(desc.bond.normal)).to_array();
        }
        desc.chunk_indices = [n0, n1];
    }
    Ok(())
}

/// Inverse permutation: `inverse[map[i]] = i`
pub fn invert_map(map: &[u32]) -> Vec<u32> {
    let mut inverse = vec![0; map.len()];
    for (i, &m) in map.iter().enumerate() {
        inverse[m as usize] = i as u32;
    }
    inverse
}

/// Bond each listed chunk to the world
///
/// Each bond has area 1, the chunk centroid and `direction` as normal; its
/// second chunk index is [`INVALID_INDEX`].
pub fn add_world_bonds(
    bonds: &mut Vec<BondDesc>,
    chunks: &[ChunkDesc],
    world_bound_chunks: &[u32],
    direction: Vec3,
) -> Result<()> {
    if let Some(&bad) = world_bound_chunks.iter().find(|&&c| c as usize >= chunks.len()) {
        return Err(FractureError::ChunkNotFound(bad as i32));
    }
    let normal = direction.normalize_or_zero().to_array();
    bonds.extend(world_bound_chunks.iter().map(|&c| BondDesc {
        bond: Bond {
            normal,
            area: 1.0,
            centroid: chunks[c as usize].centroid,
            user_data: 0,
        },
        chunk_indices: [c, INVALID_INDEX],
    }));
    Ok(())
}

/// Everything the runtime needs from one fracture session
///
/// All per-chunk data is in asset order. `geometry_offsets` and
/// `collision_hull_offsets` hold `chunk_count + 1` entries; chunk `i` owns
/// `geometry[geometry_offsets[i]..geometry_offsets[i + 1]]`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthoringResult {
    pub chunk_descs: Vec<ChunkDesc>,
    pub bond_descs: Vec<BondDesc>,
    pub geometry: Vec<Triangle>,
    pub geometry_offsets: Vec<u32>,
    pub collision_hulls: Vec<CollisionHull>,
    pub collision_hull_offsets: Vec<u32>,
    /// Fracture tool chunk id of every asset chunk
    pub asset_to_fracture_chunk_id: Vec<i32>,
}

impl AuthoringResult {
    pub fn chunk_count(&self) -> usize {
        self.chunk_descs.len()
    }

    /// World-space triangles of asset chunk `index`
    pub fn chunk_geometry(&self, index: usize) -> &[Triangle] {
        match (self.geometry_offsets.get(index), self.geometry_offsets.get(index + 1)) {
            (Some(&start), Some(&end)) => &self.geometry[start as usize..end as usize],
            _ => &[],
        }
    }

    /// Bond the listed asset chunks to the world, see [`add_world_bonds`]
    pub fn add_world_bonds(&mut self, world_bound_chunks: &[u32], direction: Vec3) -> Result<()> {
        add_world_bonds(&mut self.bond_descs, &self.chunk_descs, world_bound_chunks, direction)
    }
}

fn support_flags(tool: &FractureTool, default_support_depth: i32) -> Vec<bool> {
    tool.chunk_list()
        .iter()
        .map(|info| {
            let depth = tool.chunk_depth(info.chunk_id).unwrap_or(0) as i32;
            if default_support_depth < 0 || depth < default_support_depth {
                info.is_leaf
            } else {
                depth == default_support_depth
            }
        })
        .collect()
}

/// Finalize a fracture session and assemble the asset data
///
/// The interior material and island removal of `settings` are applied to
/// the tool first, unless it is already finalized. Support chunks are the
/// chunks at `settings.default_support_depth` plus
/// shallower leaves, or all leaves when the depth is negative. Bonds come
/// from the interior surfaces of the fracture. Chunks are put in runtime
/// order; geometry and collision hulls are emitted in world space and chunk
/// volumes are taken from the hulls.
///
/// # Errors
///
/// [`FractureError::EmptyMesh`] when the tool has no source mesh.
pub fn process_fracture<B, C>(
    tool: &mut FractureTool,
    bond_generator: &mut BondGenerator<B>,
    collision_builder: &C,
    settings: &FractureSettings,
) -> Result<AuthoringResult>
where
    B: CollisionHullBuilder,
    C: CollisionHullBuilder + ?Sized,
{
    if tool.state() != FractureState::Finalized {
        tool.apply_settings(settings);
        if settings.remove_islands {
            let leaves: Vec<i32> = tool
                .chunk_list()
                .iter()
                .filter(|c| c.is_leaf && c.parent >= 0)
                .map(|c| c.chunk_id)
                .collect();
            let mut islands = 0;
            for chunk_id in leaves {
                islands += tool.island_detection_and_removing(chunk_id)?;
            }
            log::debug!("island removal produced {} pieces", islands);
        }
    }
    tool.finalize_fracturing()?;
    let chunk_count = tool.chunk_count();
    let support = support_flags(tool, settings.default_support_depth);
    let (mut bond_descs, mut chunk_descs) =
        bond_generator.build_desc_from_internal_fracture(tool, &support)?;

    ensure_exact_support_coverage(&mut chunk_descs);
    let map = build_chunk_reorder_map(&chunk_descs).ok_or(FractureError::IncompleteSupportCoverage)?;
    apply_chunk_reorder_map(&mut chunk_descs, &mut bond_descs, &map, true)?;
    let inverse = invert_map(&map);

    let mut result = AuthoringResult {
        geometry_offsets: vec![0],
        collision_hull_offsets: vec![0],
        ..Default::default()
    };
    for (asset_index, &tool_index) in inverse.iter().enumerate() {
        let triangles = tool.base_mesh(tool_index as usize)?;
        let points: Vec<Vec3> = triangles.iter().flat_map(|t| t.positions()).collect();
        let hull = collision_builder.build_collision_geometry(&points);
        chunk_descs[asset_index].volume = hull.volume();

        result.geometry.extend(triangles);
        result.geometry_offsets.push(result.geometry.len() as u32);
        result.collision_hulls.push(hull);
        result.collision_hull_offsets.push(result.collision_hulls.len() as u32);
        result
            .asset_to_fracture_chunk_id
            .push(tool.chunk_id(tool_index as usize).unwrap_or(-1));
    }
    result.chunk_descs = chunk_descs;
    result.bond_descs = bond_descs;

    log::debug!(
        "asset assembled: {} chunks, {} bonds, {} triangles",
        chunk_count,
        result.bond_descs.len(),
        result.geometry.len()
    );
    Ok(result)
}
