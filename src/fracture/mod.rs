//! Fracture tool: chunk hierarchy, cutting and finalization
//!
//! A [`FractureTool`] owns the chunk tree produced by recursively cutting a
//! source mesh. Chunk 0 is always the source itself. All cutting happens in a
//! normalized frame where the source fits a unit cube; queries that hand
//! geometry back ([`FractureTool::base_mesh`], [`FractureTool::chunk_mesh`],
//! [`FractureTool::buffered_base_meshes`]) return world space.
//!
//! # Example
//!
//! ```
//! use fracture_authoring::*;
//!
//! let mut tool = FractureTool::new();
//! tool.set_source_mesh(&get_big_box(Vec3::ZERO, 2.0, MATERIAL_INTERIOR)).unwrap();
//!
//! let config = SlicingConfigBuilder::new().slices(1, 0, 0).build().unwrap();
//! let mut rng = ChaChaRandom::new(1);
//! tool.slicing(0, &config, false, &mut rng).unwrap();
//! tool.finalize_fracturing().unwrap();
//!
//! assert_eq!(tool.chunk_count(), 3);
//! ```

mod cutter;
mod islands;
mod sites;
mod slicing;
mod triangulator;
mod voronoi;

pub use sites::{VoronoiSitesGenerator, MAX_VORONOI_ATTEMPT_NUMBER};

pub(crate) use cutter::{split_by_plane, CapSurface};

use glam::Vec3;

use crate::config::FractureSettings;
use crate::error::{FractureError, Result};
use crate::geometry::{
    CollisionHullBuilder, ParryHullBuilder, Triangle, Vertex, MATERIAL_INTERIOR,
};
use crate::mesh::{weld_vertices, Mesh};

/// Added to slicing plane ids so they never collide with Voronoi cap ids
pub const SLICING_INDEXER_OFFSET: i64 = 1 << 32;

/// Grid resolution of the bounding-box accelerator used for containment tests
pub const DEFAULT_BB_ACCELERATOR_RES: usize = 10;

/// Triangles with a smaller area are dropped by [`FractureTool::finalize_fracturing`]
const DEGENERATE_AREA: f32 = 1e-10;

/// Lifecycle of a fracture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FractureState {
    /// No source mesh has been set
    #[default]
    Empty,
    /// Source mesh set, nothing cut yet
    Initialized,
    /// At least one cut has been applied
    Fractured,
    /// Geometry triangulated and welded; the chunk list is locked
    Finalized,
}

/// One node of the chunk hierarchy
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkInfo {
    /// Stable id; array position is not stable
    pub chunk_id: i32,
    /// Parent chunk id, -1 for the root
    pub parent: i32,
    pub is_leaf: bool,
    /// Geometry in the normalized frame of the tool
    pub mesh: Mesh,
}

/// Welded world-space geometry of all chunks
///
/// Triangles of chunk `i` are `indices[offsets[i]..offsets[i + 1]]`, three
/// indices per triangle into `vertices`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BufferedMeshes {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub offsets: Vec<u32>,
}

/// Builds and owns a hierarchy of fractured chunks
#[derive(Debug, Clone)]
pub struct FractureTool {
    chunks: Vec<ChunkInfo>,
    state: FractureState,
    /// World position of the normalized frame origin
    offset: Vec3,
    /// World size of one normalized unit
    scale: f32,
    plane_indexer_offset: i64,
    next_chunk_id: i32,
    interior_material_id: i32,
    remove_islands: bool,
}

impl Default for FractureTool {
    fn default() -> Self {
        Self {
            chunks: Vec::new(),
            state: FractureState::Empty,
            offset: Vec3::ZERO,
            scale: 1.0,
            plane_indexer_offset: 1,
            next_chunk_id: 0,
            interior_material_id: MATERIAL_INTERIOR,
            remove_islands: false,
        }
    }
}

impl FractureTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all chunks and return to [`FractureState::Empty`]
    ///
    /// The interior material and island settings are kept.
    pub fn reset(&mut self) {
        self.chunks.clear();
        self.state = FractureState::Empty;
        self.offset = Vec3::ZERO;
        self.scale = 1.0;
        self.plane_indexer_offset = 1;
        self.next_chunk_id = 0;
    }

    /// Start a new session from `mesh`
    ///
    /// The mesh is copied and normalized so that its bounding box is centered
    /// on the origin with a largest extent of 1. Facet user data is cleared.
    /// Open edges are reported with a warning but do not fail.
    ///
    /// # Errors
    ///
    /// [`FractureError::EmptyMesh`] for a mesh without facets and
    /// [`FractureError::InvalidMesh`] for broken indices or zero extent.
    pub fn set_source_mesh(&mut self, mesh: &Mesh) -> Result<()> {
        if mesh.is_empty() {
            return Err(FractureError::EmptyMesh);
        }
        if !mesh.is_valid() {
            return Err(FractureError::InvalidMesh(
                "facet edges or edge vertices out of range".into(),
            ));
        }
        let bounds = *mesh.bounding_box();
        let scale = bounds.dimensions().max_element();
        if !scale.is_finite() || scale <= 0.0 {
            return Err(FractureError::InvalidMesh("mesh has zero extent".into()));
        }
        if mesh.has_open_edges() {
            log::warn!("source mesh has open edges; fracture results may be incorrect");
        }

        self.reset();
        self.offset = bounds.center();
        self.scale = scale;

        let mut source = mesh.clone();
        let (offset, inv_scale) = (self.offset, 1.0 / scale);
        source.transform_vertices(|v| v.p = (v.p - offset) * inv_scale);
        for facet in source.facets_mut() {
            facet.user_data = 0;
        }
        self.create_chunk(-1, source, true);
        self.state = FractureState::Initialized;
        log::debug!(
            "source mesh set: {} facets, offset {:?}, scale {}",
            mesh.facet_count(),
            self.offset,
            self.scale
        );
        Ok(())
    }

    /// Material id given to surfaces created by later cuts
    pub fn set_interior_material_id(&mut self, material_id: i32) {
        self.interior_material_id = material_id;
    }

    pub fn interior_material_id(&self) -> i32 {
        self.interior_material_id
    }

    /// Replace `old_id` with `new_id` on every facet of every chunk
    pub fn replace_material_id(&mut self, old_id: i32, new_id: i32) {
        for chunk in &mut self.chunks {
            for facet in chunk.mesh.facets_mut() {
                if facet.material_id == old_id {
                    facet.material_id = new_id;
                }
            }
        }
        if self.interior_material_id == old_id {
            self.interior_material_id = new_id;
        }
    }

    /// Split disconnected parts of every new chunk into separate chunks
    pub fn set_remove_islands(&mut self, remove: bool) {
        self.remove_islands = remove;
    }

    /// Take the interior material and island removal from `settings`
    ///
    /// Cut surfaces carrying the previous interior material switch to the
    /// new one.
    pub fn apply_settings(&mut self, settings: &FractureSettings) {
        let previous = self.interior_material_id;
        if previous != settings.interior_material_id {
            for chunk in &mut self.chunks {
                for facet in chunk.mesh.facets_mut() {
                    if facet.is_interior() && facet.material_id == previous {
                        facet.material_id = settings.interior_material_id;
                    }
                }
            }
        }
        self.interior_material_id = settings.interior_material_id;
        self.remove_islands = settings.remove_islands;
    }

    pub fn state(&self) -> FractureState {
        self.state
    }

    pub fn chunk_index(&self, chunk_id: i32) -> Option<usize> {
        self.chunks.iter().position(|c| c.chunk_id == chunk_id)
    }

    pub fn chunk_id(&self, index: usize) -> Option<i32> {
        self.chunks.get(index).map(|c| c.chunk_id)
    }

    /// Depth of a chunk in the hierarchy, 0 for the root
    pub fn chunk_depth(&self, chunk_id: i32) -> Option<u32> {
        let mut index = self.chunk_index(chunk_id)?;
        let mut depth = 0;
        loop {
            let parent = self.chunks[index].parent;
            if parent < 0 {
                return Some(depth);
            }
            index = self.chunk_index(parent)?;
            depth += 1;
        }
    }

    /// Ids of all chunks at `depth`, in chunk list order
    pub fn chunks_id_at_depth(&self, depth: u32) -> Vec<i32> {
        self.chunks
            .iter()
            .filter(|c| self.chunk_depth(c.chunk_id) == Some(depth))
            .map(|c| c.chunk_id)
            .collect()
    }

    pub fn chunk_list(&self) -> &[ChunkInfo] {
        &self.chunks
    }

    pub fn chunk_info(&self, index: usize) -> Option<&ChunkInfo> {
        self.chunks.get(index)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Offset and scale mapping the normalized frame back to world space
    pub fn transformation(&self) -> (Vec3, f32) {
        (self.offset, self.scale)
    }

    /// Whether `ancestor` lies on the parent chain of `chunk_id`
    pub fn is_ancestor_for_chunk(&self, ancestor: i32, chunk_id: i32) -> bool {
        if ancestor == chunk_id {
            return false;
        }
        let mut current = chunk_id;
        while let Some(index) = self.chunk_index(current) {
            current = self.chunks[index].parent;
            if current == ancestor {
                return true;
            }
            if current < 0 {
                break;
            }
        }
        false
    }

    /// Remove every descendant of `chunk_id`; the chunk becomes a leaf
    ///
    /// Returns `true` if anything was removed.
    pub fn delete_all_children_of_chunk(&mut self, chunk_id: i32) -> bool {
        let before = self.chunks.len();
        let doomed: Vec<i32> = self
            .chunks
            .iter()
            .filter(|c| self.is_ancestor_for_chunk(chunk_id, c.chunk_id))
            .map(|c| c.chunk_id)
            .collect();
        self.chunks.retain(|c| !doomed.contains(&c.chunk_id));
        if let Some(index) = self.chunk_index(chunk_id) {
            self.chunks[index].is_leaf = true;
        }
        self.chunks.len() != before
    }

    /// Remove a chunk together with its descendants
    ///
    /// The root cannot be erased. A parent left without children becomes a
    /// leaf again.
    pub fn erase_chunk(&mut self, chunk_id: i32) -> Result<()> {
        if self.state == FractureState::Finalized {
            return Err(FractureError::AlreadyFinalized);
        }
        let index = self
            .chunk_index(chunk_id)
            .ok_or(FractureError::ChunkNotFound(chunk_id))?;
        let parent = self.chunks[index].parent;
        if parent < 0 {
            return Err(FractureError::InvalidOperation(
                "the source chunk cannot be erased".into(),
            ));
        }
        self.delete_all_children_of_chunk(chunk_id);
        self.chunks.retain(|c| c.chunk_id != chunk_id);
        self.refresh_leaf_flag(parent);
        Ok(())
    }

    /// Triangulate, clean and weld all chunks, then lock the chunk list
    ///
    /// Degenerate triangles are dropped. Chunks left without geometry are
    /// removed and their children attached to their parent.
    pub fn finalize_fracturing(&mut self) -> Result<()> {
        match self.state {
            FractureState::Empty => return Err(FractureError::EmptyMesh),
            FractureState::Finalized => return Ok(()),
            _ => {}
        }

        for chunk in &mut self.chunks {
            let triangles: Vec<Triangle> = chunk
                .mesh
                .to_triangles()
                .into_iter()
                .filter(|t| t.area() > DEGENERATE_AREA)
                .collect();
            chunk.mesh = Mesh::from_triangles_welded(&triangles);
        }

        let mut removed = 0;
        while let Some(index) = self
            .chunks
            .iter()
            .position(|c| c.parent >= 0 && c.mesh.is_empty())
        {
            let ChunkInfo { chunk_id, parent, .. } = self.chunks.remove(index);
            for chunk in &mut self.chunks {
                if chunk.parent == chunk_id {
                    chunk.parent = parent;
                }
            }
            self.refresh_leaf_flag(parent);
            removed += 1;
        }

        self.state = FractureState::Finalized;
        log::debug!(
            "fracturing finalized: {} chunks, {} empty chunks removed",
            self.chunks.len(),
            removed
        );
        Ok(())
    }

    /// World-space triangles of the chunk at `index`
    ///
    /// # Errors
    ///
    /// [`FractureError::NotFinalized`] before [`Self::finalize_fracturing`],
    /// [`FractureError::ChunkNotFound`] for an index past the chunk list.
    pub fn base_mesh(&self, index: usize) -> Result<Vec<Triangle>> {
        if self.state != FractureState::Finalized {
            return Err(FractureError::NotFinalized);
        }
        let chunk = self
            .chunks
            .get(index)
            .ok_or(FractureError::ChunkNotFound(index as i32))?;
        let mut triangles = chunk.mesh.to_triangles();
        for t in &mut triangles {
            for v in [&mut t.a, &mut t.b, &mut t.c] {
                v.p = self.to_world(v.p);
            }
        }
        Ok(triangles)
    }

    /// World-space copy of the mesh of chunk `chunk_id`
    pub fn chunk_mesh(&self, chunk_id: i32) -> Result<Mesh> {
        let index = self
            .chunk_index(chunk_id)
            .ok_or(FractureError::ChunkNotFound(chunk_id))?;
        let mut mesh = self.chunks[index].mesh.clone();
        let (offset, scale) = (self.offset, self.scale);
        mesh.transform_vertices(|v| v.p = v.p * scale + offset);
        Ok(mesh)
    }

    /// All chunks as one welded vertex buffer plus per-chunk index ranges
    pub fn buffered_base_meshes(&self) -> Result<BufferedMeshes> {
        let mut corners = Vec::new();
        let mut offsets = Vec::with_capacity(self.chunks.len() + 1);
        offsets.push(0);
        for index in 0..self.chunks.len() {
            for t in self.base_mesh(index)? {
                corners.extend([t.a, t.b, t.c]);
            }
            offsets.push(corners.len() as u32);
        }
        let (vertices, indices) = weld_vertices(&corners);
        Ok(BufferedMeshes {
            vertices,
            indices,
            offsets,
        })
    }

    /// Fraction of the volume of `a` inside the convex hull of `b`
    ///
    /// Both meshes must be closed and triangulated. Returns 0 when `a` has no
    /// volume.
    pub fn mesh_overlap(a: &Mesh, b: &Mesh) -> f32 {
        let volume = a.volume();
        if volume <= 0.0 {
            return 0.0;
        }
        let points: Vec<Vec3> = b.vertices().iter().map(|v| v.p).collect();
        let hull = ParryHullBuilder.build_collision_geometry(&points);
        let mut clipped = a.to_triangles();
        for i in 0..hull.polygons.len() {
            clipped = split_by_plane(&clipped, &hull.polygon_plane(i), 1, MATERIAL_INTERIOR, None).below;
            if clipped.is_empty() {
                return 0.0;
            }
        }
        (Mesh::from_triangles(&clipped).volume() / volume).min(1.0)
    }

    fn to_world(&self, p: Vec3) -> Vec3 {
        p * self.scale + self.offset
    }

    fn to_normalized(&self, p: Vec3) -> Vec3 {
        (p - self.offset) / self.scale
    }

    fn create_chunk(&mut self, parent: i32, mesh: Mesh, is_leaf: bool) -> i32 {
        let chunk_id = self.next_chunk_id;
        self.next_chunk_id += 1;
        self.chunks.push(ChunkInfo {
            chunk_id,
            parent,
            is_leaf,
            mesh,
        });
        chunk_id
    }

    fn refresh_leaf_flag(&mut self, chunk_id: i32) {
        let has_children = self.chunks.iter().any(|c| c.parent == chunk_id);
        if let Some(index) = self.chunk_index(chunk_id) {
            self.chunks[index].is_leaf = !has_children;
        }
    }

    /// Check that `chunk_id` can be cut and return its index
    fn ensure_can_cut(&self, chunk_id: i32, replace_chunk: bool) -> Result<usize> {
        match self.state {
            FractureState::Empty => return Err(FractureError::EmptyMesh),
            FractureState::Finalized => return Err(FractureError::AlreadyFinalized),
            _ => {}
        }
        if replace_chunk && chunk_id == 0 {
            return Err(FractureError::InvalidOperation(
                "the source chunk cannot be replaced".into(),
            ));
        }
        self.chunk_index(chunk_id)
            .ok_or(FractureError::ChunkNotFound(chunk_id))
    }

    /// Attach cut pieces of `chunk_id` to the hierarchy
    ///
    /// Pieces become children of the chunk, or its siblings when
    /// `replace_chunk` is set, in which case the chunk itself is erased.
    /// Returns the ids of the new chunks.
    pub(crate) fn commit_pieces(
        &mut self,
        chunk_id: i32,
        pieces: Vec<Vec<Triangle>>,
        replace_chunk: bool,
    ) -> Result<Vec<i32>> {
        let index = self.ensure_can_cut(chunk_id, replace_chunk)?;
        let parent = if replace_chunk {
            self.chunks[index].parent
        } else {
            chunk_id
        };

        self.delete_all_children_of_chunk(chunk_id);
        let mut created = Vec::with_capacity(pieces.len());
        for piece in pieces.into_iter().filter(|p| !p.is_empty()) {
            let mesh = Mesh::from_triangles_welded(&piece);
            created.push(self.create_chunk(parent, mesh, true));
        }
        if replace_chunk {
            self.chunks.retain(|c| c.chunk_id != chunk_id);
        }
        self.refresh_leaf_flag(parent);

        if self.remove_islands {
            let mut extra = Vec::new();
            for &id in &created {
                extra.extend(self.split_islands(id));
            }
            created.extend(extra);
        }
        self.state = FractureState::Fractured;
        Ok(created)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mesh::tests::box_mesh;

    pub(crate) fn tool_with_box(min: Vec3, max: Vec3) -> FractureTool {
        let mut tool = FractureTool::new();
        tool.set_source_mesh(&box_mesh(min, max)).unwrap();
        tool
    }

    /// Root with two children, the first of which has one child of its own
    fn small_tree() -> FractureTool {
        let mut tool = tool_with_box(Vec3::ZERO, Vec3::ONE);
        let mesh = tool.chunks[0].mesh.clone();
        tool.chunks[0].is_leaf = false;
        let a = tool.create_chunk(0, mesh.clone(), false);
        tool.create_chunk(0, mesh.clone(), true);
        tool.create_chunk(a, mesh, true);
        tool.state = FractureState::Fractured;
        tool
    }

    #[test]
    fn test_source_mesh_is_normalized() {
        let tool = tool_with_box(Vec3::new(2.0, 0.0, 0.0), Vec3::new(6.0, 2.0, 1.0));
        let (offset, scale) = tool.transformation();
        assert!((offset - Vec3::new(4.0, 1.0, 0.5)).length() < 1e-6);
        assert!((scale - 4.0).abs() < 1e-6);

        let bounds = tool.chunk_list()[0].mesh.bounding_box();
        assert!((bounds.min - Vec3::new(-0.5, -0.25, -0.125)).length() < 1e-6);
        assert!((bounds.max - Vec3::new(0.5, 0.25, 0.125)).length() < 1e-6);
        assert_eq!(tool.state(), FractureState::Initialized);
        assert_eq!(tool.chunk_id(0), Some(0));
        assert_eq!(tool.chunk_list()[0].parent, -1);
    }

    #[test]
    fn test_source_mesh_errors() {
        let mut tool = FractureTool::new();
        assert_eq!(tool.set_source_mesh(&Mesh::default()), Err(FractureError::EmptyMesh));
        assert_eq!(tool.finalize_fracturing(), Err(FractureError::EmptyMesh));
    }

    #[test]
    fn test_chunk_queries() {
        let tool = small_tree();
        assert_eq!(tool.chunk_count(), 4);
        assert_eq!(tool.chunk_depth(0), Some(0));
        assert_eq!(tool.chunk_depth(1), Some(1));
        assert_eq!(tool.chunk_depth(3), Some(2));
        assert_eq!(tool.chunk_depth(42), None);
        assert_eq!(tool.chunks_id_at_depth(1), vec![1, 2]);
        assert!(tool.is_ancestor_for_chunk(0, 3));
        assert!(tool.is_ancestor_for_chunk(1, 3));
        assert!(!tool.is_ancestor_for_chunk(2, 3));
        assert!(!tool.is_ancestor_for_chunk(3, 3));
        assert_eq!(tool.chunk_index(3), Some(3));
    }

    #[test]
    fn test_delete_children_and_erase() {
        let mut tool = small_tree();
        assert!(tool.delete_all_children_of_chunk(1));
        assert_eq!(tool.chunk_count(), 3);
        assert!(tool.chunk_list()[1].is_leaf);
        assert!(!tool.delete_all_children_of_chunk(1));

        tool.erase_chunk(1).unwrap();
        tool.erase_chunk(2).unwrap();
        assert_eq!(tool.chunk_count(), 1);
        assert!(tool.chunk_list()[0].is_leaf);
        assert!(matches!(tool.erase_chunk(0), Err(FractureError::InvalidOperation(_))));
        assert_eq!(tool.erase_chunk(9), Err(FractureError::ChunkNotFound(9)));
    }

    #[test]
    fn test_finalize_removes_empty_chunks() {
        let mut tool = small_tree();
        // chunk 1 loses its geometry; its child moves up to the root
        tool.chunks[1].mesh = Mesh::default();
        tool.finalize_fracturing().unwrap();
        assert_eq!(tool.chunk_count(), 3);
        assert_eq!(tool.chunk_index(1), None);
        let orphan = tool.chunk_index(3).unwrap();
        assert_eq!(tool.chunk_list()[orphan].parent, 0);
        assert!(!tool.chunk_list()[0].is_leaf);

        let err = tool.commit_pieces(0, vec![Vec::new()], false);
        assert_eq!(err, Err(FractureError::AlreadyFinalized));
    }

    fn assert_tree_invariants(tool: &FractureTool) {
        let list = tool.chunk_list();
        let mut ids: Vec<i32> = list.iter().map(|c| c.chunk_id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), list.len());
        assert_eq!(list.iter().filter(|c| c.parent < 0).count(), 1);

        for chunk in list {
            let mut current = chunk.chunk_id;
            let mut steps = 0;
            while current >= 0 {
                let index = tool.chunk_index(current).unwrap();
                current = list[index].parent;
                steps += 1;
                assert!(steps <= list.len(), "cycle through chunk {}", chunk.chunk_id);
            }
            if chunk.parent >= 0 {
                assert_eq!(
                    tool.chunk_depth(chunk.chunk_id).unwrap(),
                    tool.chunk_depth(chunk.parent).unwrap() + 1
                );
            }
            let has_children = list.iter().any(|c| c.parent == chunk.chunk_id);
            assert_eq!(chunk.is_leaf, !has_children, "leaf flag of chunk {}", chunk.chunk_id);
        }
    }

    fn sites_around(tool: &FractureTool, chunk_id: i32) -> [Vec3; 2] {
        let mesh = tool.chunk_mesh(chunk_id).unwrap();
        let bounds = mesh.bounding_box();
        let center = (bounds.min + bounds.max) * 0.5;
        [center - Vec3::X * 0.2, center + Vec3::X * 0.2]
    }

    #[test]
    fn test_tree_invariants_after_nested_fracture() {
        use crate::config::SlicingConfigBuilder;
        use crate::random::ChaChaRandom;

        // two separate boxes, so every slab splits into islands
        let mut source = box_mesh(Vec3::ZERO, Vec3::ONE).to_triangles();
        source.extend(box_mesh(Vec3::new(3.0, 0.0, 0.0), Vec3::new(4.0, 1.0, 1.0)).to_triangles());
        let mut tool = FractureTool::new();
        tool.set_source_mesh(&Mesh::from_triangles(&source)).unwrap();
        tool.set_remove_islands(true);
        let mut rng = ChaChaRandom::new(3);

        let halves = SlicingConfigBuilder::new().slices(0, 1, 0).build().unwrap();
        tool.slicing(0, &halves, false, &mut rng).unwrap();
        assert_tree_invariants(&tool);
        let level1 = tool.chunks_id_at_depth(1);
        assert_eq!(level1.len(), 4);

        let sites = sites_around(&tool, level1[0]);
        tool.voronoi_fracturing(level1[0], &sites, false).unwrap();
        let sites = sites_around(&tool, level1[1]);
        tool.voronoi_fracturing(level1[1], &sites, true).unwrap();
        assert_tree_invariants(&tool);
        assert_eq!(tool.chunk_index(level1[1]), None);
        assert_eq!(tool.chunks_id_at_depth(1).len(), 5);

        let level2 = tool.chunks_id_at_depth(2);
        assert_eq!(level2.len(), 2);
        let layers = SlicingConfigBuilder::new().slices(0, 0, 1).build().unwrap();
        tool.slicing(level2[0], &layers, false, &mut rng).unwrap();
        assert_tree_invariants(&tool);
        assert_eq!(tool.chunks_id_at_depth(3).len(), 2);

        // an emptied inner chunk hands its subtree to the root
        let index = tool.chunk_index(level1[0]).unwrap();
        tool.chunks[index].mesh = Mesh::default();
        tool.finalize_fracturing().unwrap();
        assert_tree_invariants(&tool);
        assert_eq!(tool.chunk_index(level1[0]), None);
        assert_eq!(tool.chunk_depth(level2[0]), Some(1));
        assert_eq!(tool.chunks_id_at_depth(2).len(), 2);
    }

    #[test]
    fn test_base_mesh_in_world_space() {
        let mut tool = tool_with_box(Vec3::new(1.0, 1.0, 1.0), Vec3::new(3.0, 5.0, 2.0));
        assert_eq!(tool.base_mesh(0), Err(FractureError::NotFinalized));
        tool.finalize_fracturing().unwrap();
        let tris = tool.base_mesh(0).unwrap();
        assert_eq!(tris.len(), 12);
        let volume = Mesh::from_triangles(&tris).volume();
        assert!((volume - 8.0).abs() < 1e-4);
        assert!(tris.iter().all(|t| t.user_data == 0));
        assert_eq!(tool.base_mesh(1), Err(FractureError::ChunkNotFound(1)));

        let mesh = tool.chunk_mesh(0).unwrap();
        assert!((mesh.bounding_box().max - Vec3::new(3.0, 5.0, 2.0)).length() < 1e-5);
    }

    #[test]
    fn test_buffered_base_meshes() {
        let mut tool = small_tree();
        tool.finalize_fracturing().unwrap();
        let buffers = tool.buffered_base_meshes().unwrap();
        assert_eq!(buffers.offsets.len(), tool.chunk_count() + 1);
        assert_eq!(*buffers.offsets.last().unwrap() as usize, buffers.indices.len());
        assert_eq!(buffers.indices.len(), 4 * 36);
        // four copies of one box share their corners where normals agree
        assert!(buffers.vertices.len() <= 24);
        assert!(buffers.indices.iter().all(|&i| (i as usize) < buffers.vertices.len()));
    }

    #[test]
    fn test_replace_material_id() {
        let mut tool = tool_with_box(Vec3::ZERO, Vec3::ONE);
        tool.replace_material_id(0, 7);
        assert!(tool.chunk_list()[0].mesh.facets().iter().all(|f| f.material_id == 7));
        tool.set_interior_material_id(5);
        assert_eq!(tool.interior_material_id(), 5);

        let settings = crate::config::FractureSettingsBuilder::new()
            .interior_material_id(9)
            .remove_islands(true)
            .build()
            .unwrap();
        tool.apply_settings(&settings);
        assert_eq!(tool.interior_material_id(), 9);
        assert!(tool.remove_islands);
    }

    #[test]
    fn test_mesh_overlap() {
        let a = box_mesh(Vec3::ZERO, Vec3::new(2.0, 1.0, 1.0));
        let b = box_mesh(Vec3::new(1.0, -1.0, -1.0), Vec3::new(4.0, 2.0, 2.0));
        assert!((FractureTool::mesh_overlap(&a, &b) - 0.5).abs() < 1e-3);
        let far = box_mesh(Vec3::splat(10.0), Vec3::splat(11.0));
        assert!(FractureTool::mesh_overlap(&a, &far).abs() < 1e-6);
        assert!((FractureTool::mesh_overlap(&a, &a) - 1.0).abs() < 1e-3);
    }
}
