//! Shape engine trait definitions
//!
//! These traits define the interface that all geometry backends must
//! implement. Engines own concrete shapes; callers only hold handles.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::builder::BuilderHistory;
use crate::topology::{ShapeHandle, Topology};

/// Error type for shape engine operations
#[derive(Debug, Clone, Error)]
pub enum ShapeError {
    #[error("Kernel failure: {0}")]
    KernelFailure(String),

    #[error("Unknown shape {0}")]
    UnknownShape(ShapeHandle),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Engine not available: {0}")]
    NotAvailable(String),
}

/// Result type for shape engine operations
pub type ShapeResult<T> = Result<T, ShapeError>;

/// Boolean operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BooleanType {
    /// Union (add)
    Union,
    /// Subtraction (cut)
    Subtract,
    /// Intersection (common)
    Intersect,
}

impl BooleanType {
    pub fn name(&self) -> &'static str {
        match self {
            BooleanType::Union => "Union",
            BooleanType::Subtract => "Subtract",
            BooleanType::Intersect => "Intersect",
        }
    }
}

/// Output of one engine build
#[derive(Debug, Clone)]
pub struct Build {
    /// Root of the result
    pub shape: ShapeHandle,
    /// Sub-shape tree of the result
    pub topology: Topology,
    /// How result sub-shapes relate to input sub-shapes
    pub history: BuilderHistory,
}

/// The shape engine trait
///
/// Implementations build shapes and report builder history so that
/// identifiers can be carried from inputs to results.
pub trait ShapeEngine {
    /// Get the name of this engine
    fn name(&self) -> &str;

    /// Check if the engine can build anything
    fn is_available(&self) -> bool;

    /// Axis-aligned box with its minimum corner at `origin`
    fn make_box(&mut self, origin: Vec3, size: Vec3) -> ShapeResult<Build>;

    /// Z-aligned cylinder with its bottom center at `origin`
    fn make_cylinder(&mut self, origin: Vec3, radius: f32, height: f32) -> ShapeResult<Build>;

    /// Boolean of the targets against the tools
    ///
    /// # Arguments
    /// * `op` - The boolean operation type
    /// * `targets` - Shapes being operated on
    /// * `tools` - Shapes operating on the targets
    fn boolean(
        &mut self,
        op: BooleanType,
        targets: &[ShapeHandle],
        tools: &[ShapeHandle],
    ) -> ShapeResult<Build>;

    /// Round the given edges of `target`
    ///
    /// # Arguments
    /// * `target` - Shape owning the edges
    /// * `edges` - Edges to blend
    /// * `radius` - Blend radius
    fn blend(&mut self, target: ShapeHandle, edges: &[ShapeHandle], radius: f32)
    -> ShapeResult<Build>;

    /// Linear pattern of `source`, `count` copies spaced by `offset`
    ///
    /// When `include_source` is set the first instance is the source itself.
    fn instance_linear(
        &mut self,
        source: ShapeHandle,
        offset: Vec3,
        count: u32,
        include_source: bool,
    ) -> ShapeResult<Build>;

    /// Topology snapshot of an existing shape
    fn topology(&self, shape: ShapeHandle) -> ShapeResult<Topology>;
}

/// A null engine that always returns errors (used when no engine is available)
#[derive(Debug, Default)]
pub struct NullEngine;

impl NullEngine {
    fn unavailable<T>() -> ShapeResult<T> {
        Err(ShapeError::NotAvailable("No shape engine available".into()))
    }
}

impl ShapeEngine for NullEngine {
    fn name(&self) -> &str {
        "null"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn make_box(&mut self, _origin: Vec3, _size: Vec3) -> ShapeResult<Build> {
        Self::unavailable()
    }

    fn make_cylinder(&mut self, _origin: Vec3, _radius: f32, _height: f32) -> ShapeResult<Build> {
        Self::unavailable()
    }

    fn boolean(
        &mut self,
        _op: BooleanType,
        _targets: &[ShapeHandle],
        _tools: &[ShapeHandle],
    ) -> ShapeResult<Build> {
        Self::unavailable()
    }

    fn blend(
        &mut self,
        _target: ShapeHandle,
        _edges: &[ShapeHandle],
        _radius: f32,
    ) -> ShapeResult<Build> {
        Self::unavailable()
    }

    fn instance_linear(
        &mut self,
        _source: ShapeHandle,
        _offset: Vec3,
        _count: u32,
        _include_source: bool,
    ) -> ShapeResult<Build> {
        Self::unavailable()
    }

    fn topology(&self, shape: ShapeHandle) -> ShapeResult<Topology> {
        Err(ShapeError::UnknownShape(shape))
    }
}

/// Get the default shape engine based on available features
pub fn default_engine() -> Box<dyn ShapeEngine> {
    #[cfg(feature = "mock")]
    {
        Box::new(crate::mock::MockEngine::new())
    }

    #[cfg(not(feature = "mock"))]
    {
        Box::new(NullEngine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_engine_errors() {
        let mut engine = NullEngine;
        assert!(!engine.is_available());
        assert_eq!(engine.name(), "null");
        assert!(matches!(
            engine.make_box(Vec3::ZERO, Vec3::ONE),
            Err(ShapeError::NotAvailable(_))
        ));
        assert!(matches!(
            engine.topology(ShapeHandle(1)),
            Err(ShapeError::UnknownShape(_))
        ));
    }

    #[test]
    fn test_boolean_names() {
        assert_eq!(BooleanType::Union.name(), "Union");
        assert_eq!(BooleanType::Subtract.name(), "Subtract");
        assert_eq!(BooleanType::Intersect.name(), "Intersect");
    }
}
