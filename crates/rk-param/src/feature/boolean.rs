//! Boolean feature

use rk_kernel::{BooleanType, ShapeHandle};
use serde::{Deserialize, Serialize};

use super::{
    Descriptor, FeatureOps, FeatureResult, Parameters, RegenContext, Regenerated, name_build,
    resolve_role,
};
use crate::identity::MappingPlan;
use crate::payload::InputType;
use crate::pick::Pick;

/// Union, subtraction or intersection of target and tool inputs.
///
/// Inputs with no pick contribute their whole result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BooleanFeature {
    pub op: BooleanType,
    #[serde(default)]
    parameters: Parameters,
    #[serde(default)]
    pub targets: Vec<Pick>,
    #[serde(default)]
    pub tools: Vec<Pick>,
}

impl BooleanFeature {
    pub fn new(op: BooleanType) -> Self {
        Self {
            op,
            parameters: Parameters::new(),
            targets: Vec::new(),
            tools: Vec::new(),
        }
    }
}

impl FeatureOps for BooleanFeature {
    fn type_name(&self) -> &'static str {
        self.op.name()
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
        self.targets.iter().chain(&self.tools).collect()
    }

    fn picks_mut(&mut self) -> Vec<&mut Pick> {
        self.targets.iter_mut().chain(&mut self.tools).collect()
    }

    fn regenerate(&self, ctx: &mut RegenContext<'_, '_>) -> FeatureResult<Regenerated> {
        let mut messages = Vec::new();
        let targets: Vec<ShapeHandle> =
            resolve_role(ctx.payload, InputType::TARGET, &self.targets, &mut messages)?
                .into_iter()
                .map(|r| r.shape)
                .collect();
        let tools: Vec<ShapeHandle> =
            resolve_role(ctx.payload, InputType::TOOL, &self.tools, &mut messages)?
                .into_iter()
                .map(|r| r.shape)
                .collect();

        let build = ctx.engine.boolean(self.op, &targets, &tools)?;
        let upstream = ctx.payload.upstream(&[InputType::TARGET, InputType::TOOL]);
        name_build(ctx.seed, build, MappingPlan::Boolean, &upstream, messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::feature::{BoxFeature, Feature, FeatureKind, ParameterValue};
    use crate::history::ShapeHistory;
    use crate::payload::UpdatePayload;
    use glam::Vec3;
    use rk_kernel::{MockEngine, ShapeKind};

    fn primitive(engine: &mut MockEngine, origin: Vec3) -> Feature {
        let mut feature = Feature::new_box("box", &ModelConfig::default());
        feature
            .set_parameter(BoxFeature::ORIGIN, ParameterValue::Vector(origin))
            .unwrap();
        let history = ShapeHistory::new();
        feature
            .regenerate(&UpdatePayload::new(&history), engine, &ModelConfig::default())
            .unwrap();
        feature
    }

    #[test]
    fn test_union_carries_input_faces() {
        let mut engine = MockEngine::new();
        let a = primitive(&mut engine, Vec3::ZERO);
        let b = primitive(&mut engine, Vec3::new(5.0, 0.0, 0.0));
        let history = ShapeHistory::new();
        let mut payload = UpdatePayload::new(&history);
        payload.insert(InputType::TARGET, &a);
        payload.insert(InputType::TOOL, &b);

        let mut union = Feature::new_boolean("union", BooleanType::Union);
        union
            .regenerate(&payload, &mut engine, &ModelConfig::default())
            .unwrap();
        assert_eq!(union.type_name(), "Union");

        let store = union.store();
        for entry in a.store().entries() {
            if entry.kind == ShapeKind::Face {
                assert!(store.has_id(entry.id));
            }
        }
        assert!(store.nil_shapes().is_empty());
        assert!(store.ensure_no_duplicates().is_ok());
        assert_eq!(union.ledger().sources_of(store.root()).len(), 2);
    }

    #[test]
    fn test_foreign_pick_is_soft_failure() {
        let mut engine = MockEngine::new();
        let a = primitive(&mut engine, Vec3::ZERO);
        let b = primitive(&mut engine, Vec3::new(5.0, 0.0, 0.0));
        let stranger = primitive(&mut engine, Vec3::splat(50.0));
        let history = ShapeHistory::new();
        let mut payload = UpdatePayload::new(&history);
        payload.insert(InputType::TARGET, &a);
        payload.insert(InputType::TOOL, &b);

        let mut union = Feature::new_boolean("union", BooleanType::Union);
        if let FeatureKind::Boolean(boolean) = union.kind_mut() {
            boolean.tools.push(Pick::whole(stranger.id(), InputType::TOOL));
        }
        union
            .regenerate(&payload, &mut engine, &ModelConfig::default())
            .unwrap();
        assert!(union.last_update_log().contains("selection not valid"));
        assert!(!union.store().is_null());
    }
}
