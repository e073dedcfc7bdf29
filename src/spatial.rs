//! Spatial indexing of Voronoi sites
//!
//! This module is only available with the `spatial-index` feature.

use glam::Vec3;
use kiddo::immutable::float::kdtree::ImmutableKdTree;
use kiddo::SquaredEuclidean;

/// KD-tree over Voronoi sites
///
/// Voronoi fracturing uses it to find the sites whose bisector planes can
/// still reach a chunk, instead of clipping every cell against every site.
///
/// # Performance
///
/// - Construction: O(n log n)
/// - Query: O(log n + k) for k returned sites
#[derive(Clone)]
pub struct SiteIndex {
    tree: ImmutableKdTree<f32, usize, 3, 32>,
}

impl SiteIndex {
    /// Build the index from site positions
    ///
    /// # Example
    ///
    /// ```
    /// use fracture_authoring::SiteIndex;
    /// use glam::Vec3;
    ///
    /// let sites = vec![Vec3::ZERO, Vec3::X, Vec3::new(5.0, 0.0, 0.0)];
    /// let index = SiteIndex::new(&sites);
    /// assert_eq!(index.find_nearest(Vec3::new(0.9, 0.0, 0.0)), 1);
    /// ```
    pub fn new(sites: &[Vec3]) -> Self {
        let points: Vec<[f32; 3]> = sites.iter().map(|s| [s.x, s.y, s.z]).collect();
        Self {
            tree: ImmutableKdTree::new_from_slice(&points),
        }
    }

    /// Index of the site closest to `position`
    pub fn find_nearest(&self, position: Vec3) -> usize {
        let query = [position.x, position.y, position.z];
        let result = self.tree.nearest_one::<SquaredEuclidean>(&query);
        result.item
    }

    /// Indices of all sites within `radius` of `center`, nearest first
    pub fn within(&self, center: Vec3, radius: f32) -> Vec<usize> {
        let query = [center.x, center.y, center.z];
        self.tree
            .within::<SquaredEuclidean>(&query, radius * radius)
            .into_iter()
            .map(|n| n.item)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_nearest_site() {
        let sites = vec![
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(-1.0, 0.0, 0.0),
        ];
        let index = SiteIndex::new(&sites);
        assert_eq!(index.find_nearest(Vec3::new(0.9, 0.1, 0.0)), 0);
        assert_eq!(index.find_nearest(Vec3::new(0.0, 0.95, 0.0)), 1);
        assert_eq!(index.find_nearest(Vec3::new(0.0, 0.1, 0.9)), 2);
        assert_eq!(index.find_nearest(Vec3::new(-0.8, 0.0, 0.0)), 3);
    }

    #[test]
    fn test_within_radius() {
        let sites: Vec<Vec3> = (0..10).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect();
        let index = SiteIndex::new(&sites);
        let mut found = index.within(Vec3::new(4.0, 0.0, 0.0), 2.5);
        found.sort_unstable();
        assert_eq!(found, vec![2, 3, 4, 5, 6]);
        assert!(index.within(Vec3::new(4.0, 10.0, 0.0), 1.0).is_empty());
    }
}
