//! Parametric feature graph with persistent topological naming
//!
//! This crate provides:
//! - A dependency graph of features with dirty propagation and an update walk
//! - Per-feature identity stores and evolution ledgers
//! - Identifier mapping passes (carry-forward, split/merge, instance, derived)
//! - A project-wide Shape History for tracing identifiers across edits
//! - Picks that survive regeneration, and their resolution
//! - RON persistence of whole projects

pub mod config;
pub mod feature;
pub mod graph;
pub mod history;
pub mod id;
pub mod identity;
pub mod payload;
pub mod pick;
pub mod project;

// Re-exports for convenience
pub use config::{ConfigError, ModelConfig};
pub use feature::{
    Descriptor, Feature, FeatureError, FeatureKind, FeatureOps, FeatureResult, FeatureState,
    ModelState, ParameterError, ParameterValue,
};
pub use graph::{FeatureGraph, GraphEdge, GraphError};
pub use history::{HistorySlice, ShapeHistory};
pub use id::{DerivationKey, FeatureId, Identifier};
pub use identity::{EvolutionLedger, IdentityError, IdentityStore, Source};
pub use payload::{InputType, UpdatePayload};
pub use pick::{Pick, PickError, Resolved, Resolver};
pub use project::{Project, ProjectError, StateChange, UpdateReport};
