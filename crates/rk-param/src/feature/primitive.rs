//! Primitive features

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::{
    Constraint, Descriptor, FeatureOps, FeatureResult, Parameter, ParameterValue, Parameters,
    RegenContext, Regenerated, name_build,
};
use crate::config::ModelConfig;
use crate::identity::MappingPlan;

/// Axis-aligned box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxFeature {
    parameters: Parameters,
}

impl BoxFeature {
    pub const LENGTH: &'static str = "length";
    pub const WIDTH: &'static str = "width";
    pub const HEIGHT: &'static str = "height";
    pub const ORIGIN: &'static str = "origin";

    pub fn new(config: &ModelConfig) -> Self {
        let size = config.primitives.box_size;
        let dimension = |name, value| {
            Parameter::new(name, ParameterValue::Float(value)).with_constraint(Constraint::Positive)
        };
        Self {
            parameters: Parameters::new()
                .with(dimension(Self::LENGTH, size.x))
                .with(dimension(Self::WIDTH, size.y))
                .with(dimension(Self::HEIGHT, size.z))
                .with(Parameter::new(Self::ORIGIN, ParameterValue::Vector(Vec3::ZERO))),
        }
    }
}

impl FeatureOps for BoxFeature {
    fn type_name(&self) -> &'static str {
        "Box"
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

    fn regenerate(&self, ctx: &mut RegenContext<'_, '_>) -> FeatureResult<Regenerated> {
        let p = &self.parameters;
        let size = Vec3::new(p.float(Self::LENGTH)?, p.float(Self::WIDTH)?, p.float(Self::HEIGHT)?);
        let build = ctx.engine.make_box(p.vector(Self::ORIGIN)?, size)?;
        name_build(ctx.seed, build, MappingPlan::Primitive, &[], Vec::new())
    }
}

/// Z-aligned cylinder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CylinderFeature {
    parameters: Parameters,
}

impl CylinderFeature {
    pub const RADIUS: &'static str = "radius";
    pub const HEIGHT: &'static str = "height";
    pub const ORIGIN: &'static str = "origin";

    pub fn new(config: &ModelConfig) -> Self {
        let defaults = &config.primitives;
        Self {
            parameters: Parameters::new()
                .with(
                    Parameter::new(Self::RADIUS, ParameterValue::Float(defaults.cylinder_radius))
                        .with_constraint(Constraint::Positive),
                )
                .with(
                    Parameter::new(Self::HEIGHT, ParameterValue::Float(defaults.cylinder_height))
                        .with_constraint(Constraint::Positive),
                )
                .with(Parameter::new(Self::ORIGIN, ParameterValue::Vector(Vec3::ZERO))),
        }
    }
}

impl FeatureOps for CylinderFeature {
    fn type_name(&self) -> &'static str {
        "Cylinder"
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

    fn regenerate(&self, ctx: &mut RegenContext<'_, '_>) -> FeatureResult<Regenerated> {
        let p = &self.parameters;
        let build = ctx.engine.make_cylinder(
            p.vector(Self::ORIGIN)?,
            p.float(Self::RADIUS)?,
            p.float(Self::HEIGHT)?,
        )?;
        name_build(ctx.seed, build, MappingPlan::Primitive, &[], Vec::new())
    }
}
