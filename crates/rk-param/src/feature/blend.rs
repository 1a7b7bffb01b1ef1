//! Edge blend feature

use rk_kernel::{ShapeHandle, ShapeKind};
use serde::{Deserialize, Serialize};

use super::{
    Constraint, Descriptor, FeatureError, FeatureOps, FeatureResult, Parameter, ParameterValue,
    Parameters, RegenContext, Regenerated, name_build, selection_message,
};
use crate::config::ModelConfig;
use crate::identity::MappingPlan;
use crate::payload::InputType;
use crate::pick::{Pick, Resolver};

/// Rounds picked edges of a single target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendFeature {
    parameters: Parameters,
    #[serde(default)]
    pub edges: Vec<Pick>,
}

impl BlendFeature {
    pub const RADIUS: &'static str = "radius";

    pub fn new(config: &ModelConfig) -> Self {
        Self {
            parameters: Parameters::new().with(
                Parameter::new(Self::RADIUS, ParameterValue::Float(config.blend.radius))
                    .with_constraint(Constraint::Positive),
            ),
            edges: Vec::new(),
        }
    }
}

impl FeatureOps for BlendFeature {
    fn type_name(&self) -> &'static str {
        "Blend"
    }

    fn descriptor(&self) -> Descriptor {
        Descriptor::Alter
    }

    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn picks(&self) -> Vec<&Pick> {
        self.edges.iter().collect()
    }

    fn picks_mut(&mut self) -> Vec<&mut Pick> {
        self.edges.iter_mut().collect()
    }

    fn regenerate(&self, ctx: &mut RegenContext<'_, '_>) -> FeatureResult<Regenerated> {
        let radius = self.parameters.float(Self::RADIUS)?;
        let target = ctx.payload.single(InputType::TARGET)?;
        let root = target
            .store()
            .root_shape()
            .ok_or(FeatureError::MissingShape(target.id()))?;

        let mut messages = Vec::new();
        let (resolved, failures) = Resolver::new(ctx.payload).resolve_all(&self.edges);
        messages.extend(failures.into_iter().map(selection_message));

        let mut edges: Vec<ShapeHandle> = Vec::new();
        for r in resolved {
            if r.feature != target.id() {
                messages.push(selection_message(format!(
                    "{} is not on the blend target",
                    r.id
                )));
            } else if r.kind != ShapeKind::Edge {
                messages.push(selection_message(format!("{} is a {}, not an edge", r.id, r.kind)));
            } else if !edges.contains(&r.shape) {
                edges.push(r.shape);
            }
        }
        if edges.is_empty() {
            return Err(FeatureError::EmptySelection("no valid edge to blend".into()));
        }

        let build = ctx.engine.blend(root, &edges, radius)?;
        let upstream = ctx.payload.upstream(&[InputType::TARGET]);
        name_build(ctx.seed, build, MappingPlan::Boolean, &upstream, messages)
    }
}
