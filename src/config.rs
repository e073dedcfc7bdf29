//! Fracture and bond generation configuration
//!
//! This module provides the configuration types consumed by the fracture tool,
//! the bond generator and the asset assembly step, together with validating
//! builders.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use glam::Vec3;

use crate::error::{FractureError, Result};
use crate::geometry::MATERIAL_INTERIOR;

/// Largest slice count accepted per axis
const MAX_SLICES: u32 = 1024;

/// Largest cap surface subdivision accepted for noisy slicing
const MAX_SURFACE_RESOLUTION: u32 = 256;

/// Slicing fracture configuration
///
/// A zero `noise_amplitude` gives flat cuts; any other value displaces the cut
/// surfaces with fractal noise.
///
/// # Example
///
/// ```rust
/// use fracture_authoring::*;
///
/// let config = SlicingConfigBuilder::new()
///     .slices(2, 1, 0)
///     .angle_variations(0.1)
///     .unwrap()
///     .build()
///     .unwrap();
/// assert_eq!(config.x_slices, 2);
/// ```
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlicingConfig {
    /// Number of cuts along each local axis
    pub x_slices: u32,
    pub y_slices: u32,
    pub z_slices: u32,

    /// Random spread of the distance between cuts, fraction of the spacing in `[0, 1]`
    pub offset_variations: f32,

    /// Random tilt of each cut direction, in `[0, 1]`
    pub angle_variations: f32,

    /// Amplitude of cut surface noise; 0 disables noise
    pub noise_amplitude: f32,

    /// Frequency of cut surface noise
    pub noise_frequency: f32,

    /// Octave count of cut surface noise
    pub noise_octave_number: u32,

    /// Subdivisions per cut surface triangle edge
    pub surface_resolution: u32,
}

impl SlicingConfig {
    /// Total number of pieces a full slicing pass produces
    pub fn piece_count(&self) -> usize {
        (self.x_slices as usize + 1) * (self.y_slices as usize + 1) * (self.z_slices as usize + 1)
    }

    #[inline]
    pub fn is_noisy(&self) -> bool {
        self.noise_amplitude != 0.0
    }
}

impl Default for SlicingConfig {
    fn default() -> Self {
        Self {
            x_slices: 1,
            y_slices: 1,
            z_slices: 1,
            offset_variations: 0.0,
            angle_variations: 0.0,
            noise_amplitude: 0.0,
            noise_frequency: 1.0,
            noise_octave_number: 1,
            surface_resolution: 1,
        }
    }
}

/// Builder for [`SlicingConfig`] with validation
#[derive(Debug, Clone, Default)]
pub struct SlicingConfigBuilder {
    config: SlicingConfig,
}

impl SlicingConfigBuilder {
    /// Create a new builder with default values
    ///
    /// Defaults:
    /// - one slice on each axis
    /// - no offset or angle variation
    /// - noise disabled (frequency 1, one octave, resolution 1)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of slices along x, y and z
    pub fn slices(mut self, x: u32, y: u32, z: u32) -> Self {
        self.config.x_slices = x;
        self.config.y_slices = y;
        self.config.z_slices = z;
        self
    }

    /// # Errors
    ///
    /// Returns `InvalidConfig` if the value is outside `[0, 1]`
    pub fn offset_variations(mut self, value: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&value) {
            return Err(FractureError::InvalidConfig(format!(
                "offset variations must be in [0, 1] (got {})",
                value
            )));
        }
        self.config.offset_variations = value;
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns `InvalidConfig` if the value is outside `[0, 1]`
    pub fn angle_variations(mut self, value: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&value) {
            return Err(FractureError::InvalidConfig(format!(
                "angle variations must be in [0, 1] (got {})",
                value
            )));
        }
        self.config.angle_variations = value;
        Ok(self)
    }

    /// Enable noisy cut surfaces
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the amplitude is not finite, the frequency is
    /// not positive or the octave count is zero
    pub fn noise(mut self, amplitude: f32, frequency: f32, octaves: u32) -> Result<Self> {
        if !amplitude.is_finite() {
            return Err(FractureError::InvalidConfig(format!(
                "noise amplitude must be finite (got {})",
                amplitude
            )));
        }
        if frequency.is_nan() || frequency <= 0.0 {
            return Err(FractureError::InvalidConfig(format!(
                "noise frequency must be positive (got {})",
                frequency
            )));
        }
        if octaves == 0 {
            return Err(FractureError::InvalidConfig(
                "noise octave number must be >= 1".to_string(),
            ));
        }
        self.config.noise_amplitude = amplitude;
        self.config.noise_frequency = frequency;
        self.config.noise_octave_number = octaves;
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns `InvalidConfig` if the resolution is 0 or above 256
    pub fn surface_resolution(mut self, resolution: u32) -> Result<Self> {
        if resolution == 0 || resolution > MAX_SURFACE_RESOLUTION {
            return Err(FractureError::InvalidConfig(format!(
                "surface resolution must be in [1, {}] (got {})",
                MAX_SURFACE_RESOLUTION, resolution
            )));
        }
        self.config.surface_resolution = resolution;
        Ok(self)
    }

    /// Build the configuration
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a slice count exceeds 1024
    pub fn build(self) -> Result<SlicingConfig> {
        let c = &self.config;
        if c.x_slices > MAX_SLICES || c.y_slices > MAX_SLICES || c.z_slices > MAX_SLICES {
            return Err(FractureError::InvalidConfig(format!(
                "slice counts must be <= {} (got {}, {}, {})",
                MAX_SLICES, c.x_slices, c.y_slices, c.z_slices
            )));
        }
        Ok(self.config)
    }
}

/// How bonds are derived for meshes without fracture history
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BondGenMode {
    /// Search for common coplanar surface
    #[default]
    Exact,
    /// Approximate the interface on the midplane between convex hulls
    Average,
}

/// Bond generation configuration
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BondGenerationConfig {
    pub mode: BondGenMode,
    /// Largest hull gap still bonded in [`BondGenMode::Average`] mode
    pub max_separation: f32,
}

impl BondGenerationConfig {
    pub fn exact() -> Self {
        Self {
            mode: BondGenMode::Exact,
            max_separation: 0.0,
        }
    }

    pub fn average(max_separation: f32) -> Self {
        Self {
            mode: BondGenMode::Average,
            max_separation: max_separation.max(0.0),
        }
    }
}

/// Settings for assembling an asset out of a fracture session
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FractureSettings {
    /// Material put on surfaces created by cuts
    pub interior_material_id: i32,

    /// Split disconnected pieces into separate chunks after each fracture
    pub remove_islands: bool,

    /// Depth of the support chunks, `-1` marks the leaves as support
    pub default_support_depth: i32,

    /// Normal used for bonds to the world
    pub world_bond_direction: Vec3,
}

impl Default for FractureSettings {
    fn default() -> Self {
        Self {
            interior_material_id: MATERIAL_INTERIOR,
            remove_islands: false,
            default_support_depth: -1,
            world_bond_direction: Vec3::Y,
        }
    }
}

/// Builder for [`FractureSettings`] with validation
///
/// # Example
///
/// ```rust
/// use fracture_authoring::*;
///
/// let settings = FractureSettingsBuilder::new()
///     .interior_material_id(7)
///     .remove_islands(true)
///     .default_support_depth(1)
///     .unwrap()
///     .build()
///     .unwrap();
/// assert_eq!(settings.default_support_depth, 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FractureSettingsBuilder {
    settings: FractureSettings,
}

impl FractureSettingsBuilder {
    /// Create a new builder with default values
    ///
    /// Defaults:
    /// - interior_material_id: 1000
    /// - remove_islands: false
    /// - default_support_depth: -1 (leaves are support)
    /// - world_bond_direction: +y
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interior_material_id(mut self, material_id: i32) -> Self {
        self.settings.interior_material_id = material_id;
        self
    }

    pub fn remove_islands(mut self, remove: bool) -> Self {
        self.settings.remove_islands = remove;
        self
    }

    /// # Errors
    ///
    /// Returns `InvalidConfig` if depth < -1
    pub fn default_support_depth(mut self, depth: i32) -> Result<Self> {
        if depth < -1 {
            return Err(FractureError::InvalidConfig(format!(
                "support depth must be >= -1 (got {})",
                depth
            )));
        }
        self.settings.default_support_depth = depth;
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns `InvalidConfig` if the direction has zero length
    pub fn world_bond_direction(mut self, direction: Vec3) -> Result<Self> {
        let normalized = direction.normalize_or_zero();
        if normalized == Vec3::ZERO {
            return Err(FractureError::InvalidConfig(format!(
                "world bond direction must be non-zero (got {})",
                direction
            )));
        }
        self.settings.world_bond_direction = normalized;
        Ok(self)
    }

    pub fn build(self) -> Result<FractureSettings> {
        Ok(self.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slicing_defaults() {
        let config = SlicingConfigBuilder::new().build().unwrap();
        assert_eq!(config, SlicingConfig::default());
        assert_eq!(config.piece_count(), 8);
        assert!(!config.is_noisy());
        assert_eq!(config.noise_frequency, 1.0);
        assert_eq!(config.surface_resolution, 1);
    }

    #[test]
    fn test_slicing_builder_custom() {
        let config = SlicingConfigBuilder::new()
            .slices(3, 0, 1)
            .offset_variations(0.5)
            .unwrap()
            .noise(0.1, 4.0, 3)
            .unwrap()
            .surface_resolution(8)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.piece_count(), 8);
        assert!(config.is_noisy());
        assert_eq!(config.noise_octave_number, 3);
    }

    #[test]
    fn test_slicing_builder_rejects_invalid() {
        assert!(SlicingConfigBuilder::new().angle_variations(1.5).is_err());
        assert!(SlicingConfigBuilder::new().offset_variations(-0.1).is_err());
        assert!(SlicingConfigBuilder::new().noise(0.1, 0.0, 1).is_err());
        assert!(SlicingConfigBuilder::new().noise(0.1, 1.0, 0).is_err());
        assert!(SlicingConfigBuilder::new().surface_resolution(0).is_err());
        assert!(SlicingConfigBuilder::new().slices(2000, 0, 0).build().is_err());
    }

    #[test]
    fn test_bond_config_constructors() {
        assert_eq!(BondGenerationConfig::default().mode, BondGenMode::Exact);
        let avg = BondGenerationConfig::average(-1.0);
        assert_eq!(avg.mode, BondGenMode::Average);
        assert_eq!(avg.max_separation, 0.0);
    }

    #[test]
    fn test_settings_builder() {
        let settings = FractureSettingsBuilder::new().build().unwrap();
        assert_eq!(settings.interior_material_id, MATERIAL_INTERIOR);
        assert_eq!(settings.default_support_depth, -1);

        assert!(FractureSettingsBuilder::new().default_support_depth(-2).is_err());
        assert!(FractureSettingsBuilder::new().world_bond_direction(Vec3::ZERO).is_err());
        let s = FractureSettingsBuilder::new()
            .world_bond_direction(Vec3::new(0.0, 0.0, 3.0))
            .unwrap()
            .build()
            .unwrap();
        assert!((s.world_bond_direction - Vec3::Z).length() < 1e-6);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_config_serialization() {
        let config = SlicingConfigBuilder::new().slices(2, 2, 2).build().unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let restored: SlicingConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, restored);

        let settings = FractureSettings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let restored: FractureSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(settings, restored);
    }
}
