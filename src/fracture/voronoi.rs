//! Voronoi fracture: one chunk per site cell

use glam::{Quat, Vec3};

use super::cutter::split_by_plane;
use super::FractureTool;
use crate::error::{FractureError, Result};
use crate::geometry::{Plane, Triangle};
use crate::mesh::weld_positions;

#[cfg(feature = "spatial-index")]
use crate::spatial::SiteIndex;

/// Sites closer than this in the cell frame are merged
const SITE_MERGE_EPS: f32 = 1e-6;

/// Cell sites in the (possibly scaled and rotated) frame where cells are bisected
struct CellFrame {
    sites: Vec<Vec3>,
    scale: Vec3,
    rotation: Quat,
    #[cfg(feature = "spatial-index")]
    index: SiteIndex,
}

impl CellFrame {
    fn new(sites: Vec<Vec3>, scale: Vec3, rotation: Quat) -> Self {
        Self {
            #[cfg(feature = "spatial-index")]
            index: SiteIndex::new(&sites),
            sites,
            scale,
            rotation,
        }
    }

    fn to_frame(&self, p: Vec3) -> Vec3 {
        (self.rotation.inverse() * p) / self.scale
    }

    /// Bisector between sites `i` and `j` in the normalized frame, with site `i` below
    fn bisector(&self, i: usize, j: usize) -> Plane {
        let (a, b) = (self.sites[i], self.sites[j]);
        let mid = self.rotation * (self.scale * (a + b) * 0.5);
        let normal = self.rotation * ((b - a) / self.scale);
        Plane::from_point_normal(mid, normal.normalize())
    }

    /// Largest distance in the cell frame from site `i` to a vertex of `cell`
    ///
    /// A site farther than twice this from site `i` has a bisector that
    /// misses the cell.
    fn reach(&self, i: usize, cell: &[Triangle]) -> f32 {
        let site = self.sites[i];
        cell.iter()
            .flat_map(|t| t.positions())
            .map(|p| self.to_frame(p).distance(site))
            .fold(0.0, f32::max)
    }

    /// Sites within `radius` of site `i` with their distances, nearest first
    fn neighbors(&self, i: usize, radius: f32) -> Vec<(usize, f32)> {
        let site = self.sites[i];
        #[cfg(feature = "spatial-index")]
        let candidates: Vec<usize> = self.index.within(site, radius);
        #[cfg(not(feature = "spatial-index"))]
        let candidates: Vec<usize> = (0..self.sites.len())
            .filter(|&j| self.sites[j].distance(site) <= radius)
            .collect();

        let mut neighbors: Vec<(usize, f32)> = candidates
            .into_iter()
            .filter(|&j| j != i)
            .map(|j| (j, self.sites[j].distance(site)))
            .collect();
        neighbors.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        neighbors
    }

    /// Clip `source` to the cell of site `i`
    ///
    /// Bisectors are applied nearest site first and the search stops once
    /// the next site is out of reach of the shrinking cell. Returns the cell
    /// and the number of bisectors applied.
    fn clip_cell(
        &self,
        i: usize,
        source: &[Triangle],
        plane_offset: i64,
        interior_material: i32,
    ) -> (Vec<Triangle>, usize) {
        let n = self.sites.len() as i64;
        let mut cell = source.to_vec();
        let mut reach = self.reach(i, &cell);
        let mut cuts = 0;
        for (j, distance) in self.neighbors(i, 2.0 * reach + SITE_MERGE_EPS) {
            if distance > 2.0 * reach + SITE_MERGE_EPS {
                break;
            }
            let cap_id = n * i.min(j) as i64 + i.max(j) as i64 + plane_offset;
            let cap_id = if j < i { -cap_id } else { cap_id };
            cell = split_by_plane(&cell, &self.bisector(i, j), cap_id, interior_material, None).below;
            cuts += 1;
            if cell.is_empty() {
                break;
            }
            reach = self.reach(i, &cell);
        }
        (cell, cuts)
    }
}

impl FractureTool {
    /// Split a chunk into the Voronoi cells of `sites`
    ///
    /// Sites are given in world space. Each cell becomes a new chunk; cells
    /// that do not intersect the chunk are skipped. A single site produces
    /// one child identical to the chunk.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for an empty site list and the same errors
    /// as [`FractureTool::slicing`] otherwise.
    pub fn voronoi_fracturing(
        &mut self,
        chunk_id: i32,
        sites: &[Vec3],
        replace_chunk: bool,
    ) -> Result<()> {
        self.voronoi_fracturing_scaled(chunk_id, sites, Vec3::ONE, Quat::IDENTITY, replace_chunk)
    }

    /// Voronoi fracture with cells stretched by `scale` along the axes of `rotation`
    ///
    /// Cells are built in a frame where the chunk is rotated by the inverse
    /// of `rotation` and shrunk by `scale`, which elongates the cells along
    /// the axes with a large scale.
    pub fn voronoi_fracturing_scaled(
        &mut self,
        chunk_id: i32,
        sites: &[Vec3],
        scale: Vec3,
        rotation: Quat,
        replace_chunk: bool,
    ) -> Result<()> {
        let index = self.ensure_can_cut(chunk_id, replace_chunk)?;
        if sites.is_empty() {
            return Err(FractureError::InvalidConfig(
                "voronoi fracturing needs at least one site".into(),
            ));
        }
        if !scale.is_finite() || scale.min_element() <= 0.0 {
            return Err(FractureError::InvalidConfig(format!(
                "voronoi cell scale must be positive (got {:?})",
                scale
            )));
        }
        let rotation = rotation.normalize();

        let frame_sites: Vec<Vec3> = sites
            .iter()
            .map(|&s| (rotation.inverse() * self.to_normalized(s)) / scale)
            .collect();
        let (weld, unique_count) = weld_positions(&frame_sites, SITE_MERGE_EPS);
        let mut seen = vec![false; unique_count];
        let mut unique = Vec::with_capacity(unique_count);
        for (site, &w) in frame_sites.iter().zip(&weld) {
            if !seen[w as usize] {
                seen[w as usize] = true;
                unique.push(*site);
            }
        }
        if unique.len() < sites.len() {
            log::debug!("merged {} coincident voronoi sites", sites.len() - unique.len());
        }

        let source = self.chunks[index].mesh.to_triangles();
        let frame = CellFrame::new(unique, scale, rotation);
        let n = frame.sites.len() as i64;

        let mut cells: Vec<Vec<Triangle>> = Vec::with_capacity(frame.sites.len());
        if frame.sites.len() == 1 {
            cells.push(source);
        } else {
            let mut total_cuts = 0;
            for i in 0..frame.sites.len() {
                let (cell, cuts) =
                    frame.clip_cell(i, &source, self.plane_indexer_offset, self.interior_material_id);
                total_cuts += cuts;
                cells.push(cell);
            }
            log::debug!("voronoi cells: {} bisector cuts for {} sites", total_cuts, n);
        }

        let created = self.commit_pieces(chunk_id, cells, replace_chunk)?;
        self.plane_indexer_offset += n * n;
        log::debug!(
            "voronoi fracturing chunk {}: {} sites, {} new chunks",
            chunk_id,
            n,
            created.len()
        );
        Ok(())
    }
}
