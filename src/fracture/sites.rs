//! Voronoi site generation inside a mesh
//!
//! Sites are sampled in world space by rejection: a candidate is kept only
//! when it lies inside the base mesh and, if one is set, inside the stencil
//! mesh. Sampling gives up after [`MAX_VORONOI_ATTEMPT_NUMBER`] consecutive
//! misses, so a call may produce fewer sites than requested.

use std::f32::consts::TAU;

use glam::Vec3;

use super::DEFAULT_BB_ACCELERATOR_RES;
use crate::accelerator::{BBoxBasedAccelerator, SpatialAccelerator, SweepingAccelerator};
use crate::mesh::{get_tangents, Mesh};
use crate::random::RandomGenerator;

/// Consecutive rejected samples after which generation stops
pub const MAX_VORONOI_ATTEMPT_NUMBER: u32 = 450;

/// Mesh plus the accelerator used for its point-in-mesh test
struct Containment {
    mesh: Mesh,
    accelerator: Box<dyn SpatialAccelerator>,
}

impl Containment {
    fn new(mesh: &Mesh) -> Self {
        Self {
            accelerator: Box::new(BBoxBasedAccelerator::new(mesh, DEFAULT_BB_ACCELERATOR_RES)),
            mesh: mesh.clone(),
        }
    }

    /// Stencils are arbitrary user meshes, often far denser than a chunk
    fn stencil(mesh: &Mesh) -> Self {
        Self {
            accelerator: Box::new(SweepingAccelerator::new(mesh)),
            mesh: mesh.clone(),
        }
    }

    fn contains(&mut self, point: Vec3) -> bool {
        self.mesh.is_point_inside(point, self.accelerator.as_mut())
    }
}

/// Generates Voronoi sites for [`FractureTool::voronoi_fracturing`](super::FractureTool::voronoi_fracturing)
///
/// # Example
///
/// ```
/// use fracture_authoring::*;
///
/// let mesh = get_big_box(Vec3::ZERO, 1.0, MATERIAL_INTERIOR);
/// let mut rng = ChaChaRandom::new(3);
/// let mut generator = VoronoiSitesGenerator::new(&mesh, &mut rng);
/// generator.uniformly_generate_sites_in_mesh(10);
/// assert_eq!(generator.voronoi_sites().len(), 10);
/// ```
pub struct VoronoiSitesGenerator<'a> {
    base: Containment,
    stencil: Option<Containment>,
    rng: &'a mut dyn RandomGenerator,
    sites: Vec<Vec3>,
}

impl<'a> VoronoiSitesGenerator<'a> {
    pub fn new(mesh: &Mesh, rng: &'a mut dyn RandomGenerator) -> Self {
        Self {
            base: Containment::new(mesh),
            stencil: None,
            rng,
            sites: Vec::new(),
        }
    }

    /// Replace the base mesh; clears the generated sites
    pub fn set_base_mesh(&mut self, mesh: &Mesh) {
        self.sites.clear();
        self.base = Containment::new(mesh);
    }

    /// Additionally require generated sites to lie inside `stencil`
    pub fn set_stencil(&mut self, stencil: &Mesh) {
        self.stencil = Some(Containment::stencil(stencil));
    }

    pub fn clear_stencil(&mut self) {
        self.stencil = None;
    }

    pub fn voronoi_sites(&self) -> &[Vec3] {
        &self.sites
    }

    pub fn add_site(&mut self, site: Vec3) {
        self.sites.push(site);
    }

    fn accepts(&mut self, point: Vec3) -> bool {
        self.base.contains(point) && self.stencil.as_mut().map_or(true, |s| s.contains(point))
    }

    /// Draw up to `count` accepted points from `sample`
    ///
    /// `sample` may reject a candidate itself by returning `None`.
    fn rejection_sample<F>(&mut self, count: u32, mut sample: F) -> Vec<Vec3>
    where
        F: FnMut(&mut dyn RandomGenerator) -> Option<Vec3>,
    {
        let mut out = Vec::with_capacity(count as usize);
        let mut attempts = 0;
        while (out.len() as u32) < count && attempts < MAX_VORONOI_ATTEMPT_NUMBER {
            match sample(&mut *self.rng) {
                Some(p) if self.accepts(p) => {
                    out.push(p);
                    attempts = 0;
                }
                _ => attempts += 1,
            }
        }
        if (out.len() as u32) < count {
            log::debug!(
                "site sampling gave up after {} misses: {} of {} sites",
                MAX_VORONOI_ATTEMPT_NUMBER,
                out.len(),
                count
            );
        }
        out
    }

    /// Uniformly distributed sites inside the mesh
    pub fn uniformly_generate_sites_in_mesh(&mut self, count: u32) {
        let bounds = *self.base.mesh.bounding_box();
        let extent = bounds.dimensions();
        let sites = self.rejection_sample(count, |rng| {
            let r = Vec3::new(rng.random_value(), rng.random_value(), rng.random_value());
            Some(r * extent + bounds.min)
        });
        self.sites.extend(sites);
    }

    /// `clusters` cluster centers, each surrounded by `sites_per_cluster`
    /// sites within `cluster_radius`
    ///
    /// The centers themselves are not kept as sites.
    pub fn clustered_sites_generation(
        &mut self,
        clusters: u32,
        sites_per_cluster: u32,
        cluster_radius: f32,
    ) {
        let bounds = *self.base.mesh.bounding_box();
        let (middle, half) = (bounds.center(), bounds.dimensions() * 0.5);
        let mut centers = self.rejection_sample(clusters, |rng| {
            let r = Vec3::new(rng.random_value(), rng.random_value(), rng.random_value());
            Some(middle + (r * 2.0 - Vec3::ONE) * half)
        });
        while let Some(center) = centers.pop() {
            let sites = self.rejection_sample(sites_per_cluster, |rng| {
                let dir = Vec3::new(rng.random_value(), rng.random_value(), rng.random_value())
                    * 2.0
                    - Vec3::ONE;
                let dist = (rng.random_value() + 0.001) * cluster_radius;
                Some(center + dir.normalize_or_zero() * dist)
            });
            self.sites.extend(sites);
        }
    }

    /// Up to `count` sites inside the sphere of `radius` around `center`
    pub fn generate_in_sphere(&mut self, count: u32, radius: f32, center: Vec3) {
        let radius_sq = radius * radius;
        let sites = self.rejection_sample(count, |rng| {
            let p = Vec3::new(
                (rng.random_value() - 0.5) * 2.0 * radius,
                (rng.random_value() - 0.5) * 2.0 * radius,
                (rng.random_value() - 0.5) * 2.0 * radius,
            );
            (p.length_squared() < radius_sq).then_some(p + center)
        });
        self.sites.extend(sites);
    }

    /// Remove each site inside the sphere with probability `probability`
    pub fn delete_in_sphere(&mut self, radius: f32, center: Vec3, probability: f32) {
        let radius_sq = radius * radius;
        let mut i = 0;
        while i < self.sites.len() {
            if (self.sites[i] - center).length_squared() < radius_sq
                && self.rng.random_value() <= probability
            {
                self.sites.swap_remove(i);
            } else {
                i += 1;
            }
        }
    }

    /// Rings of sites in the plane through `center` with the given normal
    ///
    /// Rings are spaced `radius / radial_steps` apart (the center itself is
    /// not a site); each holds `angular_steps` sites, rotated by
    /// `angle_offset` per ring. `variability` in `[0, 1]` jitters angle
    /// and radius. Sites are not tested against the mesh.
    #[allow(clippy::too_many_arguments)]
    pub fn radial_pattern(
        &mut self,
        center: Vec3,
        normal: Vec3,
        radius: f32,
        angular_steps: u32,
        radial_steps: u32,
        angle_offset: f32,
        variability: f32,
    ) {
        if angular_steps == 0 || radial_steps == 0 {
            return;
        }
        let (t1, t2) = get_tangents(normal);
        let radial_step = radius / radial_steps as f32;
        let angle_step = TAU / angular_steps as f32;
        let base = 1.0 - 0.5 * variability;
        for ring in 1..radial_steps {
            let ring_radius = radial_step * ring as f32;
            let mut angle = angle_offset * (ring - 1) as f32;
            for _ in 0..angular_steps {
                let angle_var = self.rng.random_value() * variability + base;
                let radius_var = self.rng.random_value() * variability + base;
                let (sin, cos) = (angle * angle_var).sin_cos();
                self.sites
                    .push((cos * t1 + sin * t2) * ring_radius * radius_var + center);
                angle += angle_step;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accelerator::tests::uv_sphere;
    use crate::mesh::tests::box_mesh;
    use crate::random::ChaChaRandom;

    fn unit_box() -> Mesh {
        box_mesh(Vec3::splat(-1.0), Vec3::splat(1.0))
    }

    #[test]
    fn test_uniform_sites_inside_mesh() {
        let mesh = uv_sphere(1.0, 16, 24);
        let mut rng = ChaChaRandom::new(1);
        let mut generator = VoronoiSitesGenerator::new(&mesh, &mut rng);
        generator.uniformly_generate_sites_in_mesh(50);
        assert_eq!(generator.voronoi_sites().len(), 50);
        assert!(generator.voronoi_sites().iter().all(|p| p.length() < 1.0));
    }

    #[test]
    fn test_stencil_restricts_sites() {
        let mut rng = ChaChaRandom::new(2);
        let mut generator = VoronoiSitesGenerator::new(&unit_box(), &mut rng);
        generator.set_stencil(&box_mesh(Vec3::ZERO, Vec3::splat(2.0)));
        generator.uniformly_generate_sites_in_mesh(20);
        assert_eq!(generator.voronoi_sites().len(), 20);
        assert!(generator
            .voronoi_sites()
            .iter()
            .all(|p| p.min_element() >= 0.0 && p.max_element() <= 1.0));

        // disjoint stencil: nothing can be accepted
        generator.set_stencil(&box_mesh(Vec3::splat(5.0), Vec3::splat(6.0)));
        generator.uniformly_generate_sites_in_mesh(5);
        assert_eq!(generator.voronoi_sites().len(), 20);
        generator.clear_stencil();
        generator.uniformly_generate_sites_in_mesh(5);
        assert_eq!(generator.voronoi_sites().len(), 25);
    }

    #[test]
    fn test_sphere_stencil() {
        let mut rng = ChaChaRandom::new(9);
        let base = box_mesh(Vec3::splat(-1.0), Vec3::ONE);
        let mut generator = VoronoiSitesGenerator::new(&base, &mut rng);
        generator.set_stencil(&uv_sphere(0.5, 12, 18));
        generator.uniformly_generate_sites_in_mesh(30);
        assert_eq!(generator.voronoi_sites().len(), 30);
        assert!(generator.voronoi_sites().iter().all(|p| p.length() < 0.5));
    }

    #[test]
    fn test_clustered_sites() {
        let mut rng = ChaChaRandom::new(3);
        let mut generator = VoronoiSitesGenerator::new(&unit_box(), &mut rng);
        generator.clustered_sites_generation(3, 4, 0.2);
        assert_eq!(generator.voronoi_sites().len(), 12);
        assert!(generator.voronoi_sites().iter().all(|p| p.abs().max_element() <= 1.0));
    }

    #[test]
    fn test_sphere_generation_and_deletion() {
        let mut rng = ChaChaRandom::new(4);
        let mut generator = VoronoiSitesGenerator::new(&unit_box(), &mut rng);
        let center = Vec3::new(0.5, 0.0, 0.0);
        generator.generate_in_sphere(30, 0.3, center);
        assert_eq!(generator.voronoi_sites().len(), 30);
        assert!(generator.voronoi_sites().iter().all(|p| p.distance(center) < 0.3));

        generator.add_site(Vec3::new(-0.8, 0.0, 0.0));
        generator.delete_in_sphere(0.31, center, 1.0);
        assert_eq!(generator.voronoi_sites(), &[Vec3::new(-0.8, 0.0, 0.0)]);
    }

    #[test]
    fn test_sphere_outside_mesh_gives_up() {
        let mut rng = ChaChaRandom::new(5);
        let mut generator = VoronoiSitesGenerator::new(&unit_box(), &mut rng);
        generator.generate_in_sphere(10, 0.5, Vec3::splat(10.0));
        assert!(generator.voronoi_sites().is_empty());
    }

    #[test]
    fn test_radial_pattern() {
        let mut rng = ChaChaRandom::new(6);
        let mut generator = VoronoiSitesGenerator::new(&unit_box(), &mut rng);
        let center = Vec3::new(0.1, 0.2, 0.0);
        generator.radial_pattern(center, Vec3::Z, 1.0, 6, 4, 0.3, 0.0);
        let sites = generator.voronoi_sites();
        assert_eq!(sites.len(), 6 * 3);
        for (k, site) in sites.iter().enumerate() {
            let ring = (k / 6 + 1) as f32 * 0.25;
            assert!((site.z - center.z).abs() < 1e-6);
            assert!((site.distance(center) - ring).abs() < 1e-5);
        }
    }

    #[test]
    fn test_set_base_mesh_clears_sites() {
        let mut rng = ChaChaRandom::new(7);
        let mut generator = VoronoiSitesGenerator::new(&unit_box(), &mut rng);
        generator.add_site(Vec3::ZERO);
        generator.set_base_mesh(&box_mesh(Vec3::ZERO, Vec3::ONE));
        assert!(generator.voronoi_sites().is_empty());
        generator.uniformly_generate_sites_in_mesh(3);
        assert!(generator.voronoi_sites().iter().all(|p| p.min_element() >= 0.0));
    }
}
