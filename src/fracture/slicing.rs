//! Slicing fracture: regular (optionally jittered and noisy) axis cuts

use glam::Vec3;

use super::cutter::{split_by_plane, CapSurface};
use super::{FractureTool, SLICING_INDEXER_OFFSET};
use crate::config::SlicingConfig;
use crate::error::Result;
use crate::geometry::{Bounds, Plane, Triangle};
use crate::mesh::FractalNoise;
use crate::random::RandomGenerator;

/// Parameters shared by every cut of one slicing call
struct SliceRun<'a> {
    bounds: Bounds,
    config: &'a SlicingConfig,
    surface: Option<CapSurface>,
    interior_material: i32,
    next_plane: i64,
}

impl SliceRun<'_> {
    /// Cut `piece` into slabs along `axis`
    fn slice_along(
        &mut self,
        piece: Vec<Triangle>,
        axis: usize,
        slices: u32,
        rng: &mut dyn RandomGenerator,
    ) -> Vec<Vec<Triangle>> {
        if slices == 0 {
            return vec![piece];
        }
        let direction = Vec3::AXES[axis];
        let extent = self.bounds.dimensions()[axis];
        let step = extent / (slices + 1) as f32;
        let mut center = self.bounds.center();
        center[axis] = self.bounds.min[axis] + step;

        let mut out = Vec::with_capacity(slices as usize + 1);
        let mut rest = piece;
        for _ in 0..slices {
            let jitter = Vec3::new(
                rng.random_value() * 2.0 - 1.0,
                rng.random_value() * 2.0 - 1.0,
                rng.random_value() * 2.0 - 1.0,
            ) * self.config.angle_variations;
            let normal = (direction + jitter).normalize_or(direction);
            let plane = Plane::from_point_normal(center, normal);
            let cap_id = self.next_plane + SLICING_INDEXER_OFFSET;
            self.next_plane += 1;

            let split = split_by_plane(
                &rest,
                &plane,
                cap_id,
                self.interior_material,
                self.surface.as_ref(),
            );
            if !split.below.is_empty() {
                out.push(split.below);
            }
            rest = split.above;
            center[axis] += step + rng.random_value() * self.config.offset_variations * step;
            if rest.is_empty() {
                break;
            }
        }
        if !rest.is_empty() {
            out.push(rest);
        }
        out
    }
}

impl FractureTool {
    /// Cut a chunk into slabs along x, then y, then z
    ///
    /// Every x slab is cut along y and every resulting piece along z. Slice
    /// planes are spaced `extent / (slices + 1)` apart, tilted by
    /// `angle_variations` and shifted by `offset_variations` using `rng`.
    /// With a non-zero noise amplitude the cut surfaces are displaced by
    /// fractal noise.
    ///
    /// The pieces replace any existing children of the chunk. With
    /// `replace_chunk` they become siblings of the chunk, which is removed.
    ///
    /// # Errors
    ///
    /// - [`FractureError::ChunkNotFound`](crate::FractureError::ChunkNotFound) for an unknown chunk
    /// - [`FractureError::InvalidOperation`](crate::FractureError::InvalidOperation) when replacing chunk 0
    /// - [`FractureError::AlreadyFinalized`](crate::FractureError::AlreadyFinalized) after finalization
    pub fn slicing(
        &mut self,
        chunk_id: i32,
        config: &SlicingConfig,
        replace_chunk: bool,
        rng: &mut dyn RandomGenerator,
    ) -> Result<()> {
        let index = self.ensure_can_cut(chunk_id, replace_chunk)?;
        let mesh = &self.chunks[index].mesh;

        let surface = if config.is_noisy() {
            let seed = (rng.random_value() * i32::MAX as f32) as i32;
            Some(CapSurface {
                noise: FractalNoise::new(
                    config.noise_amplitude,
                    config.noise_frequency,
                    config.noise_octave_number,
                    seed,
                ),
                resolution: config.surface_resolution,
            })
        } else {
            None
        };
        let mut run = SliceRun {
            bounds: *mesh.bounding_box(),
            config,
            surface,
            interior_material: self.interior_material_id,
            next_plane: self.plane_indexer_offset,
        };

        let mut pieces = vec![mesh.to_triangles()];
        for (axis, slices) in [config.x_slices, config.y_slices, config.z_slices]
            .into_iter()
            .enumerate()
        {
            let mut next = Vec::with_capacity(pieces.len() * (slices as usize + 1));
            for piece in pieces {
                next.extend(run.slice_along(piece, axis, slices, rng));
            }
            pieces = next;
        }

        let next_plane = run.next_plane;
        let created = self.commit_pieces(chunk_id, pieces, replace_chunk)?;
        self.plane_indexer_offset = next_plane;
        log::debug!("slicing chunk {}: {} new chunks", chunk_id, created.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::tool_with_box;
    use super::*;
    use crate::config::SlicingConfigBuilder;
    use crate::error::FractureError;
    use crate::mesh::Mesh;
    use crate::random::ChaChaRandom;

    fn world_volume(tool: &FractureTool, chunk_id: i32) -> f32 {
        tool.chunk_mesh(chunk_id).unwrap().volume()
    }

    #[test]
    fn test_single_slice_of_box() {
        let mut tool = tool_with_box(Vec3::splat(-1.0), Vec3::splat(1.0));
        let config = SlicingConfigBuilder::new().slices(1, 0, 0).build().unwrap();
        let mut rng = ChaChaRandom::new(0);
        tool.slicing(0, &config, false, &mut rng).unwrap();

        assert_eq!(tool.chunk_count(), 3);
        assert!(!tool.chunk_list()[0].is_leaf);
        for chunk in &tool.chunk_list()[1..] {
            assert_eq!(chunk.parent, 0);
            assert!(chunk.is_leaf);
            assert!((world_volume(&tool, chunk.chunk_id) - 4.0).abs() < 1e-3);
            assert!(!chunk.mesh.has_open_edges());
        }

        // slab carries +id, remainder -id
        let expected = 1 + SLICING_INDEXER_OFFSET;
        let slab = &tool.chunk_list()[1].mesh;
        assert!(slab.facets().iter().any(|f| f.user_data == expected));
        assert!(slab.bounding_box().max.x <= 1e-5);
        let rest = &tool.chunk_list()[2].mesh;
        assert!(rest.facets().iter().any(|f| f.user_data == -expected));
        assert_eq!(tool.state(), super::super::FractureState::Fractured);
    }

    #[test]
    fn test_grid_slicing_conserves_volume() {
        let mut tool = tool_with_box(Vec3::ZERO, Vec3::new(3.0, 2.0, 1.0));
        let config = SlicingConfigBuilder::new()
            .slices(2, 1, 1)
            .offset_variations(0.3)
            .unwrap()
            .angle_variations(0.1)
            .unwrap()
            .build()
            .unwrap();
        let mut rng = ChaChaRandom::new(11);
        tool.slicing(0, &config, false, &mut rng).unwrap();

        assert_eq!(tool.chunk_count(), 1 + config.piece_count());
        let total: f32 = tool.chunk_list()[1..]
            .iter()
            .map(|c| world_volume(&tool, c.chunk_id))
            .sum();
        assert!((total - 6.0).abs() < 1e-2);
    }

    #[test]
    fn test_slicing_is_deterministic() {
        let config = SlicingConfigBuilder::new()
            .slices(2, 2, 0)
            .angle_variations(0.2)
            .unwrap()
            .offset_variations(0.5)
            .unwrap()
            .build()
            .unwrap();
        let run = |seed| {
            let mut tool = tool_with_box(Vec3::ZERO, Vec3::ONE);
            tool.slicing(0, &config, false, &mut ChaChaRandom::new(seed)).unwrap();
            tool
        };
        let a = run(5);
        let b = run(5);
        assert_eq!(a.chunk_list(), b.chunk_list());
        let c = run(6);
        assert_ne!(a.chunk_list(), c.chunk_list());
    }

    #[test]
    fn test_noisy_slicing_is_watertight() {
        let mut tool = tool_with_box(Vec3::splat(-1.0), Vec3::splat(1.0));
        let config = SlicingConfigBuilder::new()
            .slices(0, 0, 1)
            .noise(0.05, 3.0, 2)
            .unwrap()
            .surface_resolution(4)
            .unwrap()
            .build()
            .unwrap();
        tool.slicing(0, &config, false, &mut ChaChaRandom::new(3)).unwrap();
        assert_eq!(tool.chunk_count(), 3);
        let mut total = 0.0;
        for chunk in &tool.chunk_list()[1..] {
            let mesh = Mesh::from_triangles(&chunk.mesh.to_triangles());
            assert!(!mesh.has_open_edges());
            total += world_volume(&tool, chunk.chunk_id);
        }
        assert!((total - 8.0).abs() < 1e-2);
    }

    #[test]
    fn test_replace_chunk() {
        let mut tool = tool_with_box(Vec3::ZERO, Vec3::ONE);
        let config = SlicingConfigBuilder::new().slices(1, 0, 0).build().unwrap();
        let mut rng = ChaChaRandom::new(0);
        assert!(matches!(
            tool.slicing(0, &config, true, &mut rng),
            Err(FractureError::InvalidOperation(_))
        ));
        assert_eq!(tool.chunk_count(), 1);

        tool.slicing(0, &config, false, &mut rng).unwrap();
        let config = SlicingConfigBuilder::new().slices(0, 1, 0).build().unwrap();
        tool.slicing(1, &config, true, &mut rng).unwrap();

        // chunk 1 is replaced by its two halves
        assert_eq!(tool.chunk_index(1), None);
        assert_eq!(tool.chunk_count(), 4);
        assert!(tool.chunk_list()[1..].iter().all(|c| c.parent == 0 && c.is_leaf));
        assert_eq!(tool.chunks_id_at_depth(1), vec![2, 3, 4]);
    }

    #[test]
    fn test_reslicing_replaces_children() {
        let mut tool = tool_with_box(Vec3::ZERO, Vec3::ONE);
        let mut rng = ChaChaRandom::new(0);
        let config = SlicingConfigBuilder::new().slices(3, 0, 0).build().unwrap();
        tool.slicing(0, &config, false, &mut rng).unwrap();
        assert_eq!(tool.chunk_count(), 5);
        let config = SlicingConfigBuilder::new().slices(1, 0, 0).build().unwrap();
        tool.slicing(0, &config, false, &mut rng).unwrap();
        assert_eq!(tool.chunk_count(), 3);
    }

    #[test]
    fn test_unknown_chunk() {
        let mut tool = tool_with_box(Vec3::ZERO, Vec3::ONE);
        let config = SlicingConfig::default();
        let err = tool.slicing(7, &config, false, &mut ChaChaRandom::new(0));
        assert_eq!(err, Err(FractureError::ChunkNotFound(7)));
    }
}
