//! Error types for fracture authoring

use thiserror::Error;

/// Errors that can occur while fracturing meshes or assembling assets
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FractureError {
    /// Configuration validation failed
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Requested chunk ID does not exist
    #[error("chunk not found: {0}")]
    ChunkNotFound(i32),
    /// Operation arguments are inconsistent (e.g. replacing the source chunk)
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    /// A cut was requested after the chunk hierarchy was finalized
    #[error("fracture session is already finalized")]
    AlreadyFinalized,
    /// Output was requested before `finalize_fracturing`
    #[error("fracture session is not finalized")]
    NotFinalized,
    /// Input mesh has no geometry
    #[error("mesh is empty")]
    EmptyMesh,
    /// Input mesh violates the facet/edge/vertex index invariants
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),
    /// No shared interface could be found between two meshes
    #[error("no bond could be created between the given meshes")]
    BondNotFound,
    /// Chunk descriptors do not have exactly one support chunk per leaf chain
    #[error("chunk descriptors do not have exact support coverage")]
    IncompleteSupportCoverage,
}

/// Result type alias for fracture operations
pub type Result<T> = std::result::Result<T, FractureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            FractureError::ChunkNotFound(7).to_string(),
            "chunk not found: 7"
        );
        assert_eq!(
            FractureError::InvalidConfig("x_slices must be >= 0".into()).to_string(),
            "invalid configuration: x_slices must be >= 0"
        );
    }
}
