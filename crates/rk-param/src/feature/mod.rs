//! Features
//!
//! A feature is one node of the model: typed parameters, picks into its
//! inputs, and the named result of its last regeneration. Concrete kinds
//! implement [`FeatureOps`]; [`Feature`] wraps them with identity and state.

mod blend;
mod boolean;
mod instance;
pub mod parameter;
mod primitive;

pub use blend::BlendFeature;
pub use boolean::BooleanFeature;
pub use instance::InstanceLinearFeature;
pub use parameter::{Constraint, Parameter, ParameterError, ParameterValue, Parameters};
pub use primitive::{BoxFeature, CylinderFeature};

use rk_kernel::{BooleanType, Build, ShapeEngine, ShapeError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::ModelConfig;
use crate::id::FeatureId;
use crate::identity::{
    EvolutionLedger, IdMapper, IdentityError, IdentityStore, MappingPlan, MappingSummary, Upstream,
};
use crate::payload::UpdatePayload;
use crate::pick::{Pick, Resolved, Resolver};

/// Errors that fail a regeneration
#[derive(Debug, Clone, Error)]
pub enum FeatureError {
    #[error("Shape engine error: {0}")]
    Shape(#[from] ShapeError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Parameter error: {0}")]
    Parameter(#[from] ParameterError),

    #[error("Input '{tag}' expects {expected} feature(s), found {found}")]
    InputArity {
        tag: String,
        expected: String,
        found: usize,
    },

    #[error("Nothing to operate on: {0}")]
    EmptySelection(String),

    #[error("Input feature {0} has no result")]
    MissingShape(FeatureId),
}

pub type FeatureResult<T> = Result<T, FeatureError>;

/// What a feature does to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descriptor {
    /// Makes new geometry
    Create,
    /// Reworks the geometry of its inputs
    Alter,
    /// Adds nothing to the model geometry
    None,
}

/// Regeneration state of a feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelState {
    Clean,
    #[default]
    Dirty,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureState {
    pub model: ModelState,
    /// Past the current leaf and skipped by updates
    pub inactive: bool,
    /// Has no active children
    pub leaf: bool,
}

impl Default for FeatureState {
    fn default() -> Self {
        Self {
            model: ModelState::Dirty,
            inactive: false,
            leaf: true,
        }
    }
}

/// Everything a feature sees while regenerating
pub struct RegenContext<'a, 'p> {
    /// Seed for derived identifiers
    pub seed: FeatureId,
    pub payload: &'p UpdatePayload<'a>,
    pub engine: &'p mut dyn ShapeEngine,
    pub config: &'p ModelConfig,
}

/// A complete, named result ready to publish
#[derive(Debug, Clone)]
pub struct Regenerated {
    pub store: IdentityStore,
    pub ledger: EvolutionLedger,
    pub summary: MappingSummary,
    /// Soft failures that did not stop the regeneration
    pub messages: Vec<String>,
}

/// Behaviour of one feature kind
pub trait FeatureOps {
    fn type_name(&self) -> &'static str;

    fn descriptor(&self) -> Descriptor;

    fn parameters(&self) -> &Parameters;

    fn parameters_mut(&mut self) -> &mut Parameters;

    fn picks(&self) -> Vec<&Pick> {
        Vec::new()
    }

    fn picks_mut(&mut self) -> Vec<&mut Pick> {
        Vec::new()
    }

    /// Build and name a new result. Must not touch the published one.
    fn regenerate(&self, ctx: &mut RegenContext<'_, '_>) -> FeatureResult<Regenerated>;
}

/// Every feature kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureKind {
    Box(BoxFeature),
    Cylinder(CylinderFeature),
    Boolean(BooleanFeature),
    Blend(BlendFeature),
    InstanceLinear(InstanceLinearFeature),
}

impl FeatureKind {
    fn ops(&self) -> &dyn FeatureOps {
        match self {
            FeatureKind::Box(f) => f,
            FeatureKind::Cylinder(f) => f,
            FeatureKind::Boolean(f) => f,
            FeatureKind::Blend(f) => f,
            FeatureKind::InstanceLinear(f) => f,
        }
    }

    fn ops_mut(&mut self) -> &mut dyn FeatureOps {
        match self {
            FeatureKind::Box(f) => f,
            FeatureKind::Cylinder(f) => f,
            FeatureKind::Boolean(f) => f,
            FeatureKind::Blend(f) => f,
            FeatureKind::InstanceLinear(f) => f,
        }
    }
}

/// A node of the feature graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    id: FeatureId,
    name: String,
    kind: FeatureKind,
    #[serde(default)]
    store: IdentityStore,
    #[serde(default)]
    ledger: EvolutionLedger,
    #[serde(skip)]
    state: FeatureState,
    #[serde(skip)]
    last_update_log: String,
}

impl Feature {
    pub fn new(name: impl Into<String>, kind: FeatureKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            store: IdentityStore::new(),
            ledger: EvolutionLedger::new(),
            state: FeatureState::default(),
            last_update_log: String::new(),
        }
    }

    pub fn new_box(name: impl Into<String>, config: &ModelConfig) -> Self {
        Self::new(name, FeatureKind::Box(BoxFeature::new(config)))
    }

    pub fn new_cylinder(name: impl Into<String>, config: &ModelConfig) -> Self {
        Self::new(name, FeatureKind::Cylinder(CylinderFeature::new(config)))
    }

    pub fn new_boolean(name: impl Into<String>, op: BooleanType) -> Self {
        Self::new(name, FeatureKind::Boolean(BooleanFeature::new(op)))
    }

    pub fn new_blend(name: impl Into<String>, config: &ModelConfig) -> Self {
        Self::new(name, FeatureKind::Blend(BlendFeature::new(config)))
    }

    pub fn new_instance_linear(name: impl Into<String>, config: &ModelConfig) -> Self {
        Self::new(
            name,
            FeatureKind::InstanceLinear(InstanceLinearFeature::new(config)),
        )
    }

    pub fn id(&self) -> FeatureId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn kind(&self) -> &FeatureKind {
        &self.kind
    }

    /// Mutable access to the kind. Callers are responsible for dirtying.
    pub fn kind_mut(&mut self) -> &mut FeatureKind {
        &mut self.kind
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.ops().type_name()
    }

    pub fn descriptor(&self) -> Descriptor {
        self.kind.ops().descriptor()
    }

    pub fn parameters(&self) -> &Parameters {
        self.kind.ops().parameters()
    }

    /// Set a parameter. Returns whether the value changed.
    pub fn set_parameter(
        &mut self,
        name: &str,
        value: ParameterValue,
    ) -> Result<bool, ParameterError> {
        self.kind.ops_mut().parameters_mut().set(name, value)
    }

    pub fn picks(&self) -> Vec<&Pick> {
        self.kind.ops().picks()
    }

    /// Point picks on `from` at `to`, returning how many moved
    pub fn retarget_picks(&mut self, from: FeatureId, to: FeatureId) -> usize {
        self.kind
            .ops_mut()
            .picks_mut()
            .into_iter()
            .map(|pick| pick.retarget(from, to))
            .filter(|moved| *moved)
            .count()
    }

    pub fn state(&self) -> FeatureState {
        self.state
    }

    pub fn model_state(&self) -> ModelState {
        self.state.model
    }

    pub fn is_dirty(&self) -> bool {
        self.state.model == ModelState::Dirty
    }

    pub fn is_failed(&self) -> bool {
        self.state.model == ModelState::Failed
    }

    pub fn is_inactive(&self) -> bool {
        self.state.inactive
    }

    pub fn is_leaf(&self) -> bool {
        self.state.leaf
    }

    pub(crate) fn set_model_state(&mut self, model: ModelState) {
        self.state.model = model;
    }

    pub(crate) fn set_inactive(&mut self, inactive: bool) {
        self.state.inactive = inactive;
    }

    pub(crate) fn set_leaf(&mut self, leaf: bool) {
        self.state.leaf = leaf;
    }

    pub fn store(&self) -> &IdentityStore {
        &self.store
    }

    pub fn ledger(&self) -> &EvolutionLedger {
        &self.ledger
    }

    /// Messages from the last regeneration, one per line
    pub fn last_update_log(&self) -> &str {
        &self.last_update_log
    }

    /// Rebuild the result from `payload`.
    ///
    /// The new store and ledger replace the old ones only on success. On
    /// failure both are emptied and the error is written to the update log.
    /// State transitions are left to the caller.
    pub fn regenerate(
        &mut self,
        payload: &UpdatePayload<'_>,
        engine: &mut dyn ShapeEngine,
        config: &ModelConfig,
    ) -> FeatureResult<()> {
        let mut ctx = RegenContext {
            seed: self.id,
            payload,
            engine,
            config,
        };
        match self.kind.ops().regenerate(&mut ctx) {
            Ok(output) => {
                if config.update.log_mapping_passes {
                    tracing::debug!(
                        "{} '{}': carried {}, split {}, merged {}, instanced {}, derived {}",
                        self.type_name(),
                        self.name,
                        output.summary.carried,
                        output.summary.split,
                        output.summary.merged,
                        output.summary.instanced,
                        output.summary.derived
                    );
                }
                self.store = output.store;
                self.ledger = output.ledger;
                self.last_update_log = output.messages.join("\n");
                Ok(())
            }
            Err(e) => {
                self.store.reset();
                self.ledger.clear();
                self.last_update_log = format!("Error: {e}");
                Err(e)
            }
        }
    }
}

/// Name a fresh build and package it as a result
pub(crate) fn name_build(
    seed: FeatureId,
    build: Build,
    plan: MappingPlan,
    upstream: &[Upstream<'_>],
    messages: Vec<String>,
) -> FeatureResult<Regenerated> {
    let mut store = IdentityStore::new();
    store.set_result(build.topology);
    let mut ledger = EvolutionLedger::new();
    let summary = IdMapper::new(seed, &build.history, upstream).run(plan, &mut store, &mut ledger)?;
    Ok(Regenerated {
        store,
        ledger,
        summary,
        messages,
    })
}

pub(crate) fn selection_message(error: impl std::fmt::Display) -> String {
    format!("Error: selection not valid ({error})")
}

/// Resolve the picks of one input role.
///
/// A feature under `tag` with no pick of its own contributes its whole
/// result. Failed picks are reported in `messages`; only an empty outcome
/// is an error.
pub(crate) fn resolve_role(
    payload: &UpdatePayload<'_>,
    tag: &str,
    picks: &[Pick],
    messages: &mut Vec<String>,
) -> FeatureResult<Vec<Resolved>> {
    let features = payload.at_least_one(tag)?;
    let resolver = Resolver::new(payload);

    for pick in picks {
        if !features.iter().any(|f| f.id() == pick.feature) {
            messages.push(selection_message(format!(
                "feature {} is not a '{tag}' input",
                pick.feature
            )));
        }
    }

    let mut resolved: Vec<Resolved> = Vec::new();
    for feature in features {
        let fallback = [Pick::whole(feature.id(), tag)];
        let own: Vec<&Pick> = picks.iter().filter(|p| p.feature == feature.id()).collect();
        let (found, failures) = if own.is_empty() {
            resolver.resolve_all(&fallback)
        } else {
            resolver.resolve_all(own)
        };
        messages.extend(failures.into_iter().map(selection_message));
        for r in found {
            if !resolved.iter().any(|x| x.shape == r.shape) {
                resolved.push(r);
            }
        }
    }

    if resolved.is_empty() {
        return Err(FeatureError::EmptySelection(format!(
            "no valid '{tag}' selection"
        )));
    }
    Ok(resolved)
}
