//! Shape Engine boundary
//!
//! This crate provides:
//! - Opaque shape handles and topology snapshots of built shapes
//! - Builder history (same / modified / generated / instanced / deleted)
//! - The `ShapeEngine` trait every geometry backend implements
//! - A deterministic mock engine over axis-aligned solids for tests

pub mod builder;
#[cfg(feature = "mock")]
pub mod mock;
pub mod topology;
pub mod traits;

// Re-exports for convenience
pub use builder::BuilderHistory;
#[cfg(feature = "mock")]
pub use mock::{Aabb, MockEngine};
pub use topology::{ShapeHandle, ShapeKind, TopoNode, Topology};
pub use traits::{
    BooleanType, Build, NullEngine, ShapeEngine, ShapeError, ShapeResult, default_engine,
};
