//! Input tags and update payloads
//!
//! An edge of the feature graph carries an [`InputType`]: the set of roles
//! the upstream feature plays for the downstream one. At regeneration time
//! the in-edges are flattened into an [`UpdatePayload`].

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::feature::{Feature, FeatureError, FeatureResult};
use crate::history::ShapeHistory;
use crate::id::FeatureId;
use crate::identity::Upstream;

/// Deduplicated set of input role tags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputType {
    tags: BTreeSet<String>,
}

impl InputType {
    /// Shape being operated on
    pub const TARGET: &'static str = "target";
    /// Shape operating on the target
    pub const TOOL: &'static str = "tool";
    /// Shape being patterned
    pub const SOURCE: &'static str = "source";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn target() -> Self {
        Self::new().with(Self::TARGET)
    }

    pub fn tool() -> Self {
        Self::new().with(Self::TOOL)
    }

    pub fn source() -> Self {
        Self::new().with(Self::SOURCE)
    }

    pub fn with(mut self, tag: impl Into<String>) -> Self {
        self.insert(tag);
        self
    }

    /// Tag for one of several inputs of the same role, e.g. "tool2"
    pub fn indexed(tag: &str, index: usize) -> String {
        format!("{tag}{index}")
    }

    pub fn insert(&mut self, tag: impl Into<String>) {
        self.tags.insert(tag.into());
    }

    pub fn remove(&mut self, tag: &str) -> bool {
        self.tags.remove(tag)
    }

    pub fn has(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Add every tag of `other`
    pub fn merge(&mut self, other: &InputType) {
        self.tags.extend(other.tags.iter().cloned());
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags: Vec<&str> = self.tags().collect();
        f.write_str(&tags.join(", "))
    }
}

/// Read-only view of a feature's inputs during one regeneration
pub struct UpdatePayload<'a> {
    inputs: Vec<(String, &'a Feature)>,
    history: &'a ShapeHistory,
}

impl<'a> UpdatePayload<'a> {
    pub fn new(history: &'a ShapeHistory) -> Self {
        Self {
            inputs: Vec::new(),
            history,
        }
    }

    pub fn insert(&mut self, tag: impl Into<String>, feature: &'a Feature) {
        self.inputs.push((tag.into(), feature));
    }

    pub fn history(&self) -> &'a ShapeHistory {
        self.history
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Features under `tag`, in input order
    pub fn features(&self, tag: &str) -> Vec<&'a Feature> {
        let mut out: Vec<&'a Feature> = Vec::new();
        for (input_tag, feature) in &self.inputs {
            if input_tag == tag && !out.iter().any(|f| f.id() == feature.id()) {
                out.push(*feature);
            }
        }
        out
    }

    /// Any input feature by id
    pub fn feature(&self, id: FeatureId) -> Option<&'a Feature> {
        self.inputs
            .iter()
            .map(|(_, feature)| *feature)
            .find(|feature| feature.id() == id)
    }

    /// The one feature under `tag`
    pub fn single(&self, tag: &str) -> FeatureResult<&'a Feature> {
        let features = self.features(tag);
        match features.as_slice() {
            [feature] => Ok(*feature),
            _ => Err(FeatureError::InputArity {
                tag: tag.to_string(),
                expected: "exactly 1".to_string(),
                found: features.len(),
            }),
        }
    }

    /// One or more features under `tag`
    pub fn at_least_one(&self, tag: &str) -> FeatureResult<Vec<&'a Feature>> {
        let features = self.features(tag);
        if features.is_empty() {
            return Err(FeatureError::InputArity {
                tag: tag.to_string(),
                expected: "at least 1".to_string(),
                found: 0,
            });
        }
        Ok(features)
    }

    /// Upstream stores for identifier mapping, ordered by `tags` then input order
    pub fn upstream(&self, tags: &[&str]) -> Vec<Upstream<'a>> {
        let mut out: Vec<Upstream<'a>> = Vec::new();
        for tag in tags {
            for feature in self.features(tag) {
                if !out.iter().any(|u| u.feature == feature.id()) {
                    out.push(Upstream::new(feature.id(), feature.store()));
                }
            }
        }
        out
    }
}
