//! Project context
//!
//! Owns the feature graph, every feature and the Shape History, and drives
//! regeneration. All structural edits go through here so dirtiness and
//! history stay consistent.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use rk_kernel::ShapeEngine;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::feature::{Feature, FeatureError, ModelState, ParameterError, ParameterValue};
use crate::graph::{FeatureGraph, GraphEdge, GraphError};
use crate::history::ShapeHistory;
use crate::id::{FeatureId, Identifier};
use crate::identity::{EvolutionLedger, Source};
use crate::payload::{InputType, UpdatePayload};
use crate::pick::{Pick, PickError, Resolved, Resolver};

/// Project-related errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProjectError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("Parameter error: {0}")]
    Parameter(#[from] ParameterError),
    #[error("Feature not found: {0}")]
    FeatureNotFound(FeatureId),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialize(String),
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

pub type ProjectResult<T> = Result<T, ProjectError>;

/// Dirty/failure transition of one feature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub feature: FeatureId,
    /// Result no longer matches the inputs
    pub dirty: bool,
    pub failed: bool,
}

/// Outcome of one update walk
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateReport {
    /// Features regenerated successfully, in walk order
    pub regenerated: Vec<FeatureId>,
    /// Features that failed, in walk order
    pub failed: Vec<FeatureId>,
}

impl UpdateReport {
    /// Total regeneration attempts
    pub fn attempted(&self) -> usize {
        self.regenerated.len() + self.failed.len()
    }
}

/// Serialization format
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProjectData {
    version: u32,
    name: String,
    features: Vec<Feature>,
    edges: Vec<GraphEdge>,
    history: ShapeHistory,
}

/// A parametric model
#[derive(Debug, Clone)]
pub struct Project {
    /// File format version
    pub version: u32,
    pub name: String,
    config: Arc<ModelConfig>,
    graph: FeatureGraph,
    features: HashMap<FeatureId, Feature>,
    history: ShapeHistory,
    notifications: Vec<StateChange>,
}

impl Serialize for Project {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let data = ProjectData {
            version: self.version,
            name: self.name.clone(),
            features: self.features().cloned().collect(),
            edges: self.graph.edges().to_vec(),
            history: self.history.clone(),
        };
        data.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Project {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let data = ProjectData::deserialize(deserializer)?;
        Project::from_data(data, Arc::new(ModelConfig::default())).map_err(serde::de::Error::custom)
    }
}

impl Default for Project {
    fn default() -> Self {
        Self::new("New Project", Arc::new(ModelConfig::default()))
    }
}

impl Project {
    pub fn new(name: impl Into<String>, config: Arc<ModelConfig>) -> Self {
        Self {
            version: 1,
            name: name.into(),
            config,
            graph: FeatureGraph::new(),
            features: HashMap::new(),
            history: ShapeHistory::new(),
            notifications: Vec::new(),
        }
    }

    fn from_data(data: ProjectData, config: Arc<ModelConfig>) -> ProjectResult<Self> {
        let mut project = Self::new(data.name, config);
        project.version = data.version;
        project.history = data.history;
        for feature in data.features {
            project.graph.add_node(feature.id())?;
            project.features.insert(feature.id(), feature);
        }
        for edge in data.edges {
            project.graph.connect(edge.source, edge.target, edge.input)?;
        }
        project.update_leaf_status();
        Ok(project)
    }

    // ============== Persistence ==============

    /// Save project to a file
    pub fn save(&self, path: impl AsRef<Path>) -> ProjectResult<()> {
        let content = self.to_bytes()?;
        std::fs::write(path.as_ref(), content).map_err(|e| ProjectError::Io(e.to_string()))
    }

    pub fn to_bytes(&self) -> ProjectResult<Vec<u8>> {
        let content = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ProjectError::Serialize(e.to_string()))?;
        Ok(content.into_bytes())
    }

    /// Load project from a file. Every feature comes back dirty.
    pub fn load(path: impl AsRef<Path>, config: Arc<ModelConfig>) -> ProjectResult<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ProjectError::Io(e.to_string()))?;
        Self::load_from_bytes(content.as_bytes(), config)
    }

    pub fn load_from_bytes(data: &[u8], config: Arc<ModelConfig>) -> ProjectResult<Self> {
        let content =
            std::str::from_utf8(data).map_err(|e| ProjectError::Deserialize(e.to_string()))?;
        let data: ProjectData =
            ron::from_str(content).map_err(|e| ProjectError::Deserialize(e.to_string()))?;
        Self::from_data(data, config)
    }

    // ============== Accessors ==============

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn graph(&self) -> &FeatureGraph {
        &self.graph
    }

    pub fn history(&self) -> &ShapeHistory {
        &self.history
    }

    pub fn feature(&self, id: FeatureId) -> Option<&Feature> {
        self.features.get(&id)
    }

    /// Features in insertion order
    pub fn features(&self) -> impl Iterator<Item = &Feature> {
        self.graph.nodes().iter().filter_map(|id| self.features.get(id))
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    fn require(&self, id: FeatureId) -> ProjectResult<()> {
        if self.features.contains_key(&id) {
            Ok(())
        } else {
            Err(ProjectError::FeatureNotFound(id))
        }
    }

    /// Drain queued state transitions
    pub fn take_notifications(&mut self) -> Vec<StateChange> {
        std::mem::take(&mut self.notifications)
    }

    fn notify(&mut self, feature: &Feature) {
        self.notifications.push(StateChange {
            feature: feature.id(),
            dirty: feature.model_state() != ModelState::Clean,
            failed: feature.is_failed(),
        });
    }

    // ============== Structure ==============

    pub fn add_feature(&mut self, feature: Feature) -> ProjectResult<FeatureId> {
        let id = feature.id();
        self.graph.add_node(id)?;
        tracing::debug!("Added {} '{}' ({})", feature.type_name(), feature.name(), id);
        self.notify(&feature);
        self.features.insert(id, feature);
        self.update_leaf_status();
        Ok(id)
    }

    /// Connect `source -> target`. The target and its descendants become dirty.
    pub fn connect(
        &mut self,
        source: FeatureId,
        target: FeatureId,
        input: InputType,
    ) -> ProjectResult<()> {
        self.graph.connect(source, target, input)?;
        self.set_dirty(target)?;
        self.update_leaf_status();
        Ok(())
    }

    /// Remove every edge of `id`, dirtying it and its former children
    pub fn disconnect_all(&mut self, id: FeatureId) -> ProjectResult<()> {
        self.require(id)?;
        let children = self.graph.children(id);
        self.graph.disconnect_all(id)?;
        self.set_dirty(id)?;
        for child in children {
            self.set_dirty(child)?;
        }
        self.update_leaf_status();
        Ok(())
    }

    /// Remove every input edge of `id`
    pub fn clear_inputs(&mut self, id: FeatureId) -> ProjectResult<()> {
        self.graph.remove_in_edges(id)?;
        self.set_dirty(id)?;
        self.update_leaf_status();
        Ok(())
    }

    /// Drop one tag from every input edge of `id`
    pub fn remove_parent_tag(&mut self, id: FeatureId, tag: &str) -> ProjectResult<()> {
        if self.graph.remove_parent_tag(id, tag)? {
            self.set_dirty(id)?;
            self.update_leaf_status();
        }
        Ok(())
    }

    /// Delete a feature.
    ///
    /// Children are reconnected to the removed feature's preferred parent
    /// (its `target` input, else its first input) and their picks follow.
    pub fn remove_feature(&mut self, id: FeatureId) -> ProjectResult<Feature> {
        self.require(id)?;
        let preferred = self
            .graph
            .in_edges(id)
            .find(|e| e.input.has(InputType::TARGET))
            .or_else(|| self.graph.in_edges(id).next())
            .map(|e| e.source);
        let children: Vec<(FeatureId, InputType)> = self
            .graph
            .out_edges(id)
            .map(|e| (e.target, e.input.clone()))
            .collect();

        for (child, _) in &children {
            self.set_dirty(*child)?;
        }
        self.graph.remove_node(id)?;
        if let Some(parent) = preferred {
            for (child, input) in children {
                self.graph.connect(parent, child, input)?;
                if let Some(feature) = self.features.get_mut(&child) {
                    let moved = feature.retarget_picks(id, parent);
                    tracing::debug!("Retargeted {} pick(s) of '{}'", moved, feature.name());
                }
            }
        }
        self.history.remove_feature(id);
        let removed = self
            .features
            .remove(&id)
            .ok_or(ProjectError::FeatureNotFound(id))?;
        tracing::debug!("Removed {} '{}'", removed.type_name(), removed.name());
        self.update_leaf_status();
        Ok(removed)
    }

    // ============== Editing ==============

    /// Set a parameter, dirtying the feature when the value changed
    pub fn set_parameter(
        &mut self,
        id: FeatureId,
        name: &str,
        value: ParameterValue,
    ) -> ProjectResult<bool> {
        let feature = self
            .features
            .get_mut(&id)
            .ok_or(ProjectError::FeatureNotFound(id))?;
        let changed = feature.set_parameter(name, value)?;
        if changed {
            self.set_dirty(id)?;
        }
        Ok(changed)
    }

    /// Apply an arbitrary edit to a feature and dirty it
    pub fn edit_feature<R>(
        &mut self,
        id: FeatureId,
        edit: impl FnOnce(&mut Feature) -> R,
    ) -> ProjectResult<R> {
        let feature = self
            .features
            .get_mut(&id)
            .ok_or(ProjectError::FeatureNotFound(id))?;
        let out = edit(feature);
        self.set_dirty(id)?;
        Ok(out)
    }

    /// Mark `id` and everything downstream dirty. Already dirty
    /// descendants are not revisited.
    pub fn set_dirty(&mut self, id: FeatureId) -> ProjectResult<()> {
        self.require(id)?;
        self.propagate_dirty(id);
        Ok(())
    }

    fn propagate_dirty(&mut self, id: FeatureId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(feature) = self.features.get_mut(&current) else {
                continue;
            };
            if current != id && feature.is_dirty() {
                continue;
            }
            if !feature.is_dirty() {
                feature.set_model_state(ModelState::Dirty);
                let change = StateChange {
                    feature: current,
                    dirty: true,
                    failed: false,
                };
                self.notifications.push(change);
            }
            stack.extend(self.graph.children(current));
        }
    }

    // ============== Update ==============

    /// Regenerate every dirty, active feature in topological order.
    ///
    /// Failures are recorded on the feature and never stop the walk.
    pub fn update(&mut self, engine: &mut dyn ShapeEngine) -> UpdateReport {
        let mut report = UpdateReport::default();
        let order = self.graph.topological_order();
        let pending = order
            .iter()
            .filter(|id| self.features.get(id).is_some_and(|f| f.is_dirty() && !f.is_inactive()))
            .count();
        if pending == 0 {
            return report;
        }
        tracing::info!("Updating {} of {} features", pending, self.features.len());

        for id in order {
            let runnable = self
                .features
                .get(&id)
                .is_some_and(|f| f.is_dirty() && !f.is_inactive());
            if !runnable {
                continue;
            }
            let Some(mut feature) = self.features.remove(&id) else {
                continue;
            };

            let outcome = {
                let mut payload = UpdatePayload::new(&self.history);
                for edge in self.graph.in_edges(id) {
                    if let Some(parent) = self.features.get(&edge.source) {
                        for tag in edge.input.tags() {
                            payload.insert(tag, parent);
                        }
                    }
                }
                feature.regenerate(&payload, engine, &self.config)
            };

            match outcome {
                Ok(()) => {
                    self.history.record_regeneration(
                        id,
                        feature.ledger(),
                        feature.store().all_identifiers(),
                    );
                    feature.set_model_state(ModelState::Clean);
                    tracing::debug!(
                        "Regenerated {} '{}': {} identifiers",
                        feature.type_name(),
                        feature.name(),
                        feature.store().len()
                    );
                    for line in feature.last_update_log().lines() {
                        tracing::warn!("{} '{}': {}", feature.type_name(), feature.name(), line);
                    }
                    report.regenerated.push(id);
                }
                Err(e) => {
                    self.history
                        .record_regeneration(id, &EvolutionLedger::new(), []);
                    feature.set_model_state(ModelState::Failed);
                    match &e {
                        FeatureError::Identity(violation) => tracing::error!(
                            "{} '{}' left its identity store inconsistent: {}",
                            feature.type_name(),
                            feature.name(),
                            violation
                        ),
                        _ => tracing::warn!("Feature {} failed: {}", feature.name(), e),
                    }
                    report.failed.push(id);
                }
            }
            self.notify(&feature);
            self.features.insert(id, feature);

            if report.failed.last() == Some(&id) {
                for child in self.graph.children(id) {
                    // children come later in the walk
                    self.propagate_dirty(child);
                }
            }
        }

        tracing::info!(
            "Update finished: {} regenerated, {} failed",
            report.regenerated.len(),
            report.failed.len()
        );
        report
    }

    // ============== Rollback ==============

    /// Deactivate everything downstream of `id`
    pub fn set_current_leaf(&mut self, id: FeatureId) -> ProjectResult<()> {
        self.require(id)?;
        let downstream = self.graph.descendants(id);
        for feature in self.features.values_mut() {
            feature.set_inactive(downstream.contains(&feature.id()));
        }
        self.update_leaf_status();
        Ok(())
    }

    /// Reactivate every feature
    pub fn set_current_leaf_to_end(&mut self) {
        for feature in self.features.values_mut() {
            feature.set_inactive(false);
        }
        self.update_leaf_status();
    }

    /// A feature is a leaf when none of its active children alter it
    pub fn update_leaf_status(&mut self) {
        let leaves: Vec<(FeatureId, bool)> = self
            .graph
            .nodes()
            .iter()
            .map(|id| {
                let leaf = self
                    .graph
                    .children(*id)
                    .iter()
                    .filter_map(|c| self.features.get(c))
                    .filter(|c| !c.is_inactive())
                    .all(|c| c.descriptor() == crate::feature::Descriptor::Create);
                (*id, leaf)
            })
            .collect();
        for (id, leaf) in leaves {
            if let Some(feature) = self.features.get_mut(&id) {
                feature.set_leaf(leaf);
            }
        }
    }

    // ============== Picks & diagnostics ==============

    /// Capture a pick on a current result
    pub fn capture_pick(&self, feature: FeatureId, id: Identifier, tag: &str) -> Pick {
        Pick::capture(&self.history, feature, id, tag)
    }

    /// Resolve a pick against the current model
    pub fn resolve_pick(&self, pick: &Pick) -> Result<Resolved, PickError> {
        let mut payload = UpdatePayload::new(&self.history);
        if let Some(feature) = self.features.get(&pick.feature) {
            payload.insert(pick.tag.clone(), feature);
        }
        Resolver::new(&payload).resolve(pick)
    }

    /// Vertices an identifier devolved from, itself first
    pub fn shape_track_up(&self, feature: FeatureId, id: Identifier) -> Vec<Source> {
        self.history.devolve_history(feature, id).entries().to_vec()
    }

    /// Vertices that evolved from an identifier, nearest first
    pub fn shape_track_down(&self, feature: FeatureId, id: Identifier) -> Vec<Source> {
        self.history.evolve_history(feature, id)
    }

    /// Graphviz description of the feature graph
    pub fn dump_graphviz(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph \"{}\" {{", self.name);
        for feature in self.features() {
            let state = match feature.model_state() {
                ModelState::Clean => "",
                ModelState::Dirty => ", style=dashed",
                ModelState::Failed => ", color=red",
            };
            let _ = writeln!(
                out,
                "  \"{}\" [label=\"{}\\n{}\\n{:?}\"{}];",
                feature.id(),
                feature.name(),
                Identifier::from_uuid(feature.id()).short(),
                feature.descriptor(),
                state
            );
        }
        for edge in self.graph.edges() {
            let _ = writeln!(
                out,
                "  \"{}\" -> \"{}\" [label=\"{}\"];",
                edge.source, edge.target, edge.input
            );
        }
        out.push_str("}\n");
        out
    }
}
