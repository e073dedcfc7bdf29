//! Island detection: split disconnected parts of a chunk into separate chunks

use super::FractureTool;
use crate::error::{FractureError, Result};
use crate::geometry::{Triangle, VERTEX_POSITION_EPS};
use crate::mesh::{weld_positions, Mesh};

fn find(parent: &mut [u32], mut x: u32) -> u32 {
    while parent[x as usize] != x {
        parent[x as usize] = parent[parent[x as usize] as usize];
        x = parent[x as usize];
    }
    x
}

/// Group triangles into connected components through shared welded corners
///
/// Components are ordered by their first triangle.
fn connected_components(triangles: &[Triangle]) -> Vec<Vec<Triangle>> {
    let corners: Vec<_> = triangles.iter().flat_map(|t| t.positions()).collect();
    let (weld, count) = weld_positions(&corners, VERTEX_POSITION_EPS);
    let mut parent: Vec<u32> = (0..count as u32).collect();
    for tri in weld.chunks_exact(3) {
        for k in 1..3 {
            let (a, b) = (find(&mut parent, tri[0]), find(&mut parent, tri[k]));
            if a != b {
                parent[b as usize] = a;
            }
        }
    }

    let mut component_of_root = vec![usize::MAX; count];
    let mut components: Vec<Vec<Triangle>> = Vec::new();
    for (t, tri) in triangles.iter().enumerate() {
        let root = find(&mut parent, weld[3 * t]) as usize;
        if component_of_root[root] == usize::MAX {
            component_of_root[root] = components.len();
            components.push(Vec::new());
        }
        components[component_of_root[root]].push(*tri);
    }
    components
}

impl FractureTool {
    /// Split a chunk into its connected components
    ///
    /// The first component stays in the chunk; every other one becomes a new
    /// chunk with the same parent and leaf flag. Chunk 0 is never split.
    /// Returns the number of components, or 0 when the chunk is connected.
    pub fn island_detection_and_removing(&mut self, chunk_id: i32) -> Result<usize> {
        match self.state {
            super::FractureState::Empty => return Err(FractureError::EmptyMesh),
            super::FractureState::Finalized => return Err(FractureError::AlreadyFinalized),
            _ => {}
        }
        if self.chunk_index(chunk_id).is_none() {
            return Err(FractureError::ChunkNotFound(chunk_id));
        }
        let created = self.split_islands(chunk_id);
        Ok(if created.is_empty() { 0 } else { created.len() + 1 })
    }

    /// Split `chunk_id` into islands, returning the ids of the new chunks
    pub(super) fn split_islands(&mut self, chunk_id: i32) -> Vec<i32> {
        if chunk_id == 0 {
            return Vec::new();
        }
        let Some(index) = self.chunk_index(chunk_id) else {
            return Vec::new();
        };
        let mut components = connected_components(&self.chunks[index].mesh.to_triangles());
        if components.len() < 2 {
            return Vec::new();
        }

        let rest = components.split_off(1);
        self.chunks[index].mesh = Mesh::from_triangles_welded(&components[0]);
        let (parent, is_leaf) = (self.chunks[index].parent, self.chunks[index].is_leaf);
        let created: Vec<i32> = rest
            .iter()
            .map(|piece| self.create_chunk(parent, Mesh::from_triangles_welded(piece), is_leaf))
            .collect();
        log::debug!("chunk {} split into {} islands", chunk_id, created.len() + 1);
        created
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::tool_with_box;
    use super::*;
    use crate::config::SlicingConfigBuilder;
    use crate::mesh::tests::box_mesh;
    use crate::random::ChaChaRandom;
    use glam::Vec3;

    fn two_boxes() -> Vec<Triangle> {
        let mut tris = box_mesh(Vec3::ZERO, Vec3::ONE).to_triangles();
        tris.extend(box_mesh(Vec3::new(3.0, 0.0, 0.0), Vec3::new(4.0, 1.0, 1.0)).to_triangles());
        tris
    }

    #[test]
    fn test_connected_components() {
        let components = connected_components(&two_boxes());
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].len(), 12);
        assert!(components[1].iter().all(|t| t.a.p.x >= 3.0));
    }

    #[test]
    fn test_split_islands_of_chunk() {
        let mut tool = tool_with_box(Vec3::ZERO, Vec3::ONE);
        tool.commit_pieces(0, vec![two_boxes()], false).unwrap();
        assert_eq!(tool.chunk_count(), 2);

        assert_eq!(tool.island_detection_and_removing(1).unwrap(), 2);
        assert_eq!(tool.chunk_count(), 3);
        assert!(tool.chunk_list()[1..].iter().all(|c| c.parent == 0 && c.is_leaf));
        assert_eq!(tool.chunk_list()[1].mesh.facet_count(), 12);

        // connected now
        assert_eq!(tool.island_detection_and_removing(1).unwrap(), 0);
        // root is never split
        assert_eq!(tool.island_detection_and_removing(0).unwrap(), 0);
        assert_eq!(
            tool.island_detection_and_removing(9),
            Err(FractureError::ChunkNotFound(9))
        );
    }

    #[test]
    fn test_remove_islands_while_slicing() {
        let config = SlicingConfigBuilder::new().slices(0, 1, 0).build().unwrap();
        let run = |remove: bool| {
            let mut tool = FractureTool::new();
            tool.set_source_mesh(&Mesh::from_triangles(&two_boxes())).unwrap();
            tool.set_remove_islands(remove);
            tool.slicing(0, &config, false, &mut ChaChaRandom::new(0)).unwrap();
            tool
        };
        // each slab holds one half of both boxes
        assert_eq!(run(false).chunk_count(), 3);
        let tool = run(true);
        assert_eq!(tool.chunk_count(), 5);
        for chunk in &tool.chunk_list()[1..] {
            assert_eq!(connected_components(&chunk.mesh.to_triangles()).len(), 1);
            assert!((tool.chunk_mesh(chunk.chunk_id).unwrap().volume() - 0.5).abs() < 1e-4);
        }
    }
}
