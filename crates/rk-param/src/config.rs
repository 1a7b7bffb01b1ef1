//! Model configuration
//!
//! Default values handed to features at construction time. The project
//! holds one immutable copy; nothing in the core reads process-wide state.

use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading or saving a configuration file
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialize(String),
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

/// Primitive feature defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrimitiveConfig {
    /// Box length, width and height
    pub box_size: Vec3,
    /// Cylinder radius
    pub cylinder_radius: f32,
    /// Cylinder height
    pub cylinder_height: f32,
}

impl Default for PrimitiveConfig {
    fn default() -> Self {
        Self {
            box_size: Vec3::splat(10.0),
            cylinder_radius: 5.0,
            cylinder_height: 10.0,
        }
    }
}

/// Blend feature defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlendConfig {
    /// Blend radius
    pub radius: f32,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self { radius: 1.0 }
    }
}

/// Linear instance feature defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceConfig {
    /// Number of instances
    pub count: i64,
    /// Spacing between consecutive instances
    pub offset: Vec3,
    /// Whether the first instance is the source itself
    pub include_source: bool,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            count: 2,
            offset: Vec3::new(20.0, 0.0, 0.0),
            include_source: true,
        }
    }
}

/// Update walk settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UpdateConfig {
    /// Log per-pass mapping counts at debug level
    pub log_mapping_passes: bool,
}

/// Complete model configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub primitives: PrimitiveConfig,
    pub blend: BlendConfig,
    pub instance: InstanceConfig,
    pub update: UpdateConfig,
}

impl ModelConfig {
    /// Load configuration from a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_ron(&content)
    }

    /// Save configuration to a RON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = self.to_ron()?;
        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Io(e.to_string()))
    }

    pub fn from_ron(content: &str) -> Result<Self, ConfigError> {
        ron::from_str(content).map_err(|e| ConfigError::Deserialize(e.to_string()))
    }

    pub fn to_ron(&self) -> Result<String, ConfigError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Serialize(e.to_string()))
    }
}
