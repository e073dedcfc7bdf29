//! Bond generation between fractured chunks
//!
//! A bond describes the shared interface of two support chunks: its area,
//! centroid and normal. Bonds are found in one of three ways:
//!
//! - from the interior surfaces tagged by the fracture tool
//!   ([`BondGenerator::build_desc_from_internal_fracture`]),
//! - by intersecting coplanar, opposite-facing triangles of prefractured
//!   geometry ([`BondGenMode::Exact`]),
//! - by placing a midplane between the convex hulls of two chunks
//!   ([`BondGenMode::Average`]).
//!
//! ```rust
//! use fracture_authoring::*;
//!
//! let mut tool = FractureTool::new();
//! tool.set_source_mesh(&get_big_box(Vec3::ZERO, 2.0, MATERIAL_INTERIOR)).unwrap();
//! let config = SlicingConfigBuilder::new().slices(1, 0, 0).build().unwrap();
//! tool.slicing(0, &config, false, &mut ChaChaRandom::new(0)).unwrap();
//! tool.finalize_fracturing().unwrap();
//!
//! let support = [false, true, true];
//! let mut generator = BondGenerator::new();
//! let (bonds, chunks) = generator.build_desc_from_internal_fracture(&tool, &support).unwrap();
//! assert_eq!(chunks.len(), 3);
//! assert_eq!(bonds.len(), 1);
//! ```

mod average;
mod exact;
mod internal;

use glam::Vec3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::{BondGenMode, BondGenerationConfig};
use crate::error::{FractureError, Result};
use crate::geometry::{
    Bounds, CollisionHull, CollisionHullBuilder, ParryHullBuilder, Plane, Triangle,
};

pub use average::DEFAULT_BOND_OVERLAPPING;

/// Chunk flag marking a chunk as part of the support graph
pub const SUPPORT_FLAG: u32 = 1;

/// Index used for "no parent" and for the world side of a bond
pub const INVALID_INDEX: u32 = u32::MAX;

/// Minimum interface area accumulated per triangle pair
pub const BOND_AREA_THRESHOLD: f32 = 1e-5;

/// Chunk descriptor as consumed by the runtime asset
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChunkDesc {
    pub centroid: [f32; 3],
    pub volume: f32,
    /// Index of the parent descriptor, [`INVALID_INDEX`] for roots
    pub parent_chunk_index: u32,
    pub flags: u32,
    pub user_data: u32,
}

impl ChunkDesc {
    pub fn is_support(&self) -> bool {
        self.flags & SUPPORT_FLAG != 0
    }

    pub fn set_support(&mut self, support: bool) {
        if support {
            self.flags |= SUPPORT_FLAG;
        } else {
            self.flags &= !SUPPORT_FLAG;
        }
    }
}

/// Interface between two chunks
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bond {
    /// Unit normal pointing from the first chunk toward the second
    pub normal: [f32; 3],
    pub area: f32,
    pub centroid: [f32; 3],
    pub user_data: u32,
}

/// Bond together with the descriptor indices of the chunks it joins
///
/// The second index is [`INVALID_INDEX`] for bonds to the world.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BondDesc {
    pub bond: Bond,
    pub chunk_indices: [u32; 2],
}

/// Triangle of one chunk keyed by its supporting plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneChunkIndexer {
    pub chunk_id: i32,
    pub tr_id: i32,
    pub plane: Plane,
}

/// Generates bonds for fractured or prefractured chunk geometry
///
/// The generator keeps per-call caches (triangles, plane index, hull
/// points, bounds and hulls of every chunk); they are rebuilt by each batch
/// call and may be filled up front with [`Self::build_geometry_cache`].
#[derive(Debug, Clone, Default)]
pub struct BondGenerator<B: CollisionHullBuilder = ParryHullBuilder> {
    hull_builder: B,
    geometry_cache: Vec<Vec<Triangle>>,
    plane_cache: Vec<PlaneChunkIndexer>,
    hull_points_cache: Vec<Vec<Vec3>>,
    bounds_cache: Vec<Bounds>,
    hull_cache: Vec<CollisionHull>,
}

impl BondGenerator {
    /// Generator using the default [`ParryHullBuilder`]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: CollisionHullBuilder> BondGenerator<B> {
    pub fn with_hull_builder(hull_builder: B) -> Self {
        Self {
            hull_builder,
            geometry_cache: Vec::new(),
            plane_cache: Vec::new(),
            hull_points_cache: Vec::new(),
            bounds_cache: Vec::new(),
            hull_cache: Vec::new(),
        }
    }

    pub fn hull_builder(&self) -> &B {
        &self.hull_builder
    }

    /// Cache triangles, hull points, bounds and convex hulls of every chunk
    ///
    /// `offsets` holds `chunk_count + 1` entries; chunk `i` owns the
    /// triangles `offsets[i]..offsets[i + 1]` of `geometry`.
    pub fn build_geometry_cache(&mut self, geometry: &[Triangle], offsets: &[u32]) -> Result<()> {
        let chunks = split_geometry(geometry, offsets)?;
        self.reset_geometry_cache();
        for triangles in chunks {
            let points: Vec<Vec3> = triangles.iter().flat_map(|t| t.positions()).collect();
            self.bounds_cache.push(Bounds::from_points(points.iter()));
            self.hull_cache.push(self.hull_builder.build_collision_geometry(&points));
            self.hull_points_cache.push(points);
            self.geometry_cache.push(triangles.to_vec());
        }
        log::debug!("bond geometry cache built for {} chunks", self.geometry_cache.len());
        Ok(())
    }

    pub fn reset_geometry_cache(&mut self) {
        self.geometry_cache.clear();
        self.plane_cache.clear();
        self.hull_points_cache.clear();
        self.bounds_cache.clear();
        self.hull_cache.clear();
    }

    /// Bond between two standalone meshes
    ///
    /// [`BondGenMode::Exact`] intersects their opposite-facing triangles;
    /// [`BondGenMode::Average`] forces a bond between their convex hulls.
    ///
    /// # Errors
    ///
    /// [`FractureError::BondNotFound`] when the meshes share no interface,
    /// [`FractureError::EmptyMesh`] when either mesh has no triangles.
    pub fn create_bond_between_meshes(
        &mut self,
        mesh_a: &[Triangle],
        mesh_b: &[Triangle],
        config: &BondGenerationConfig,
    ) -> Result<Bond> {
        if mesh_a.is_empty() || mesh_b.is_empty() {
            return Err(FractureError::EmptyMesh);
        }
        match config.mode {
            BondGenMode::Exact => {
                let bonds = exact::exact_bonds(&[mesh_a, mesh_b], &[true, true], &mut self.plane_cache);
                bonds.first().map(|b| b.bond).ok_or(FractureError::BondNotFound)
            }
            BondGenMode::Average => {
                let hull_a = self.hull_of(mesh_a);
                let hull_b = self.hull_of(mesh_b);
                average::create_bond_forced(&hull_a, &hull_b, DEFAULT_BOND_OVERLAPPING)
                    .ok_or(FractureError::BondNotFound)
            }
        }
    }

    /// Bonds for the listed chunk pairs of `geometry`
    ///
    /// Pairs without a shared interface are skipped.
    pub fn create_bonds_between_meshes(
        &mut self,
        geometry: &[Triangle],
        offsets: &[u32],
        overlaps: &[(u32, u32)],
        config: &BondGenerationConfig,
    ) -> Result<Vec<BondDesc>> {
        let chunk_count = offsets.len().saturating_sub(1);
        if let Some(&(a, b)) = overlaps
            .iter()
            .find(|(a, b)| *a as usize >= chunk_count || *b as usize >= chunk_count)
        {
            return Err(FractureError::InvalidConfig(format!(
                "overlap ({a}, {b}) references a chunk past {chunk_count}"
            )));
        }
        self.build_geometry_cache(geometry, offsets)?;

        let mut result = Vec::with_capacity(overlaps.len());
        for &(a, b) in overlaps {
            let (ia, ib) = (a as usize, b as usize);
            let bond = match config.mode {
                BondGenMode::Exact => {
                    let pair = [self.geometry_cache[ia].as_slice(), self.geometry_cache[ib].as_slice()];
                    exact::exact_bonds(&pair, &[true, true], &mut self.plane_cache)
                        .first()
                        .map(|b| b.bond)
                }
                BondGenMode::Average => average::create_bond_forced(
                    &self.hull_cache[ia],
                    &self.hull_cache[ib],
                    DEFAULT_BOND_OVERLAPPING,
                ),
            };
            match bond {
                Some(bond) => result.push(BondDesc {
                    bond,
                    chunk_indices: [a, b],
                }),
                None => log::debug!("no bond between chunks {} and {}", a, b),
            }
        }
        log::debug!("{} bonds created for {} requested pairs", result.len(), overlaps.len());
        Ok(result)
    }

    /// Bonds between all support chunks of prefractured geometry
    ///
    /// With `mesh_groups` (one group id per chunk) only chunks of different
    /// groups are bonded.
    pub fn bonds_from_prefractured(
        &mut self,
        geometry: &[Triangle],
        offsets: &[u32],
        support: &[bool],
        mesh_groups: Option<&[u32]>,
        config: &BondGenerationConfig,
    ) -> Result<Vec<BondDesc>> {
        let chunk_count = offsets.len().saturating_sub(1);
        if let Some(groups) = mesh_groups {
            if groups.len() != chunk_count {
                return Err(FractureError::InvalidConfig(format!(
                    "{} mesh groups for {} chunks",
                    groups.len(),
                    chunk_count
                )));
            }
        }
        let mut bonds = match config.mode {
            BondGenMode::Exact => self.create_full_bond_list_exact(geometry, offsets, support)?,
            BondGenMode::Average => self.create_full_bond_list_averaged(
                geometry,
                offsets,
                support,
                config.max_separation,
            )?,
        };
        if let Some(groups) = mesh_groups {
            bonds.retain(|b| {
                groups[b.chunk_indices[0] as usize] != groups[b.chunk_indices[1] as usize]
            });
        }
        Ok(bonds)
    }

    fn hull_of(&self, triangles: &[Triangle]) -> CollisionHull {
        let points: Vec<Vec3> = triangles.iter().flat_map(|t| t.positions()).collect();
        self.hull_builder.build_collision_geometry(&points)
    }
}

/// Split flat chunk geometry at `offsets`
pub(crate) fn split_geometry<'a>(geometry: &'a [Triangle], offsets: &[u32]) -> Result<Vec<&'a [Triangle]>> {
    if offsets.is_empty() {
        return Err(FractureError::InvalidMesh("geometry offsets are empty".into()));
    }
    let mut chunks = Vec::with_capacity(offsets.len() - 1);
    for w in offsets.windows(2) {
        let (start, end) = (w[0] as usize, w[1] as usize);
        if start > end || end > geometry.len() {
            return Err(FractureError::InvalidMesh(format!(
                "geometry range {start}..{end} outside of {} triangles",
                geometry.len()
            )));
        }
        chunks.push(&geometry[start..end]);
    }
    Ok(chunks)
}

fn check_support(support: &[bool], chunk_count: usize) -> Result<()> {
    if support.len() != chunk_count {
        return Err(FractureError::InvalidConfig(format!(
            "{} support flags for {} chunks",
            support.len(),
            chunk_count
        )));
    }
    Ok(())
}
