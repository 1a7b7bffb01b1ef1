//! Linear instance feature

use serde::{Deserialize, Serialize};

use super::{
    Constraint, Descriptor, FeatureError, FeatureOps, FeatureResult, Parameter, ParameterError,
    ParameterValue, Parameters, RegenContext, Regenerated, name_build, resolve_role,
};
use crate::config::ModelConfig;
use crate::identity::MappingPlan;
use crate::payload::InputType;
use crate::pick::Pick;

/// Evenly spaced copies of one source shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceLinearFeature {
    parameters: Parameters,
    /// Sub-shape to pattern; the whole source result when empty
    #[serde(default)]
    pub source: Vec<Pick>,
}

impl InstanceLinearFeature {
    pub const COUNT: &'static str = "count";
    pub const OFFSET: &'static str = "offset";
    pub const INCLUDE_SOURCE: &'static str = "include_source";

    pub fn new(config: &ModelConfig) -> Self {
        let defaults = &config.instance;
        Self {
            parameters: Parameters::new()
                .with(
                    Parameter::new(Self::COUNT, ParameterValue::Integer(defaults.count))
                        .with_constraint(Constraint::Positive),
                )
                .with(Parameter::new(Self::OFFSET, ParameterValue::Vector(defaults.offset)))
                .with(Parameter::new(
                    Self::INCLUDE_SOURCE,
                    ParameterValue::Boolean(defaults.include_source),
                )),
            source: Vec::new(),
        }
    }
}

impl FeatureOps for InstanceLinearFeature {
    fn type_name(&self) -> &'static str {
        "InstanceLinear"
    }

    fn descriptor(&self) -> Descriptor {
        Descriptor::Create
    }

    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn picks(&self) -> Vec<&Pick> {
        self.source.iter().collect()
    }

    fn picks_mut(&mut self) -> Vec<&mut Pick> {
        self.source.iter_mut().collect()
    }

    fn regenerate(&self, ctx: &mut RegenContext<'_, '_>) -> FeatureResult<Regenerated> {
        let p = &self.parameters;
        let count = p.integer(Self::COUNT)?;
        let count = u32::try_from(count).map_err(|_| ParameterError::OutOfRange {
            name: Self::COUNT.to_string(),
            value: count.to_string(),
        })?;
        let offset = p.vector(Self::OFFSET)?;
        let include_source = p.boolean(Self::INCLUDE_SOURCE)?;

        ctx.payload.single(InputType::SOURCE)?;
        let mut messages = Vec::new();
        let resolved = resolve_role(ctx.payload, InputType::SOURCE, &self.source, &mut messages)?;
        let [source] = resolved.as_slice() else {
            return Err(FeatureError::EmptySelection(format!(
                "expected one source shape, found {}",
                resolved.len()
            )));
        };

        let build = ctx
            .engine
            .instance_linear(source.shape, offset, count, include_source)?;
        let upstream = ctx.payload.upstream(&[InputType::SOURCE]);
        name_build(ctx.seed, build, MappingPlan::Instance, &upstream, messages)
    }
}
