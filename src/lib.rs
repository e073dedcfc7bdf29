//! Mesh fracturing and bond generation for destruction authoring
//!
//! Takes a closed triangle mesh, cuts it recursively into a hierarchy of
//! chunks (slicing or Voronoi), finds the bonds between support chunks and
//! emits chunk/bond descriptors, collision hulls and render geometry for a
//! runtime destruction engine.
//!
//! # Quick Start
//!
//! ```rust
//! use fracture_authoring::*;
//!
//! let mut tool = FractureTool::new();
//! tool.set_source_mesh(&get_big_box(Vec3::ZERO, 1.0, MATERIAL_INTERIOR)).unwrap();
//!
//! // Scatter 8 Voronoi sites inside the source and cut it into cells
//! let mut rng = ChaChaRandom::new(42);
//! let source = tool.chunk_mesh(0).unwrap();
//! let mut sites = VoronoiSitesGenerator::new(&source, &mut rng);
//! sites.uniformly_generate_sites_in_mesh(8);
//! let sites = sites.voronoi_sites().to_vec();
//! tool.voronoi_fracturing(0, &sites, false).unwrap();
//!
//! // Finalize and assemble the asset
//! let result = process_fracture(
//!     &mut tool,
//!     &mut BondGenerator::new(),
//!     &ParryHullBuilder,
//!     &FractureSettings::default(),
//! )
//! .unwrap();
//! println!("{} chunks, {} bonds", result.chunk_count(), result.bond_descs.len());
//! ```
//!
//! # Features
//!
//! - `spatial-index` (default): KD-tree pruning of Voronoi neighbors
//! - `serde`: Enables serialization support for configuration and descriptors

// Modules
pub mod error;
pub mod config;
pub mod geometry;
pub mod mesh;
pub mod accelerator;
pub mod triangle_processor;
pub mod random;
pub mod fracture;
pub mod bond;
pub mod asset;

#[cfg(feature = "spatial-index")]
pub mod spatial;

// Re-export core types for convenience
pub use error::{FractureError, Result};
pub use config::{
    BondGenMode, BondGenerationConfig, FractureSettings, FractureSettingsBuilder, SlicingConfig,
    SlicingConfigBuilder,
};
pub use geometry::{
    Bounds, CollisionHull, CollisionHullBuilder, Edge, Facet, ParryHullBuilder, Plane, Triangle,
    TriangleIndexed, Vertex, MATERIAL_INTERIOR,
};
pub use mesh::{get_big_box, Mesh};
pub use accelerator::{
    BBoxBasedAccelerator, DummyAccelerator, SpatialAccelerator, SweepingAccelerator,
};
pub use random::{ChaChaRandom, RandomGenerator};
pub use fracture::{ChunkInfo, FractureState, FractureTool, VoronoiSitesGenerator};
pub use bond::{Bond, BondDesc, BondGenerator, ChunkDesc, INVALID_INDEX, SUPPORT_FLAG};
pub use asset::{
    add_world_bonds, apply_chunk_reorder_map, build_chunk_reorder_map,
    ensure_exact_support_coverage, invert_map, process_fracture, AuthoringResult,
};

#[cfg(feature = "spatial-index")]
pub use spatial::SiteIndex;

// Re-export glam types used throughout the API
pub use glam::{Quat, Vec2, Vec3};
