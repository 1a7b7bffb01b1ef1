//! Feature dependency graph
//!
//! Directed, acyclic, and ordered: nodes and edges remember insertion order
//! so topological walks are reproducible.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::FeatureId;
use crate::payload::InputType;

/// Graph-related errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("Connecting {from} -> {to} would create a cycle")]
    Cycle { from: FeatureId, to: FeatureId },
    #[error("Feature not found: {0}")]
    FeatureNotFound(FeatureId),
    #[error("Feature already in graph: {0}")]
    DuplicateFeature(FeatureId),
}

pub type GraphResult<T> = Result<T, GraphError>;

/// Edge from an upstream feature to the feature consuming it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: FeatureId,
    pub target: FeatureId,
    pub input: InputType,
}

#[derive(Debug, Clone, Default)]
pub struct FeatureGraph {
    nodes: Vec<FeatureId>,
    edges: Vec<GraphEdge>,
}

impl FeatureGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: FeatureId) -> bool {
        self.nodes.contains(&id)
    }

    /// Features in insertion order
    pub fn nodes(&self) -> &[FeatureId] {
        &self.nodes
    }

    /// Edges in insertion order
    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn add_node(&mut self, id: FeatureId) -> GraphResult<()> {
        if self.contains(id) {
            return Err(GraphError::DuplicateFeature(id));
        }
        self.nodes.push(id);
        Ok(())
    }

    /// Remove a feature and every edge touching it
    pub fn remove_node(&mut self, id: FeatureId) -> GraphResult<()> {
        self.require(id)?;
        self.nodes.retain(|n| *n != id);
        self.edges.retain(|e| e.source != id && e.target != id);
        Ok(())
    }

    fn require(&self, id: FeatureId) -> GraphResult<()> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(GraphError::FeatureNotFound(id))
        }
    }

    /// Add `source -> target` carrying `input`.
    ///
    /// Connecting an already connected pair merges the tags into the
    /// existing edge. Fails without touching the graph if `target` already
    /// reaches `source`.
    pub fn connect(
        &mut self,
        source: FeatureId,
        target: FeatureId,
        input: InputType,
    ) -> GraphResult<()> {
        self.require(source)?;
        self.require(target)?;
        if source == target || self.reaches(target, source) {
            return Err(GraphError::Cycle {
                from: source,
                to: target,
            });
        }

        if let Some(edge) = self
            .edges
            .iter_mut()
            .find(|e| e.source == source && e.target == target)
        {
            edge.input.merge(&input);
        } else {
            self.edges.push(GraphEdge {
                source,
                target,
                input,
            });
        }
        Ok(())
    }

    /// Remove every edge into and out of `id`
    pub fn disconnect_all(&mut self, id: FeatureId) -> GraphResult<()> {
        self.require(id)?;
        self.edges.retain(|e| e.source != id && e.target != id);
        Ok(())
    }

    /// Remove every edge into `id`
    pub fn remove_in_edges(&mut self, id: FeatureId) -> GraphResult<()> {
        self.require(id)?;
        self.edges.retain(|e| e.target != id);
        Ok(())
    }

    /// Drop `tag` from every in-edge of `id`, removing edges left without tags.
    /// Returns whether anything changed.
    pub fn remove_parent_tag(&mut self, id: FeatureId, tag: &str) -> GraphResult<bool> {
        self.require(id)?;
        let mut changed = false;
        for edge in self.edges.iter_mut().filter(|e| e.target == id) {
            changed |= edge.input.remove(tag);
        }
        self.edges.retain(|e| e.target != id || !e.input.is_empty());
        Ok(changed)
    }

    pub fn in_edges(&self, id: FeatureId) -> impl Iterator<Item = &GraphEdge> {
        self.edges.iter().filter(move |e| e.target == id)
    }

    pub fn out_edges(&self, id: FeatureId) -> impl Iterator<Item = &GraphEdge> {
        self.edges.iter().filter(move |e| e.source == id)
    }

    /// Direct upstream features, in edge order
    pub fn parents(&self, id: FeatureId) -> Vec<FeatureId> {
        self.in_edges(id).map(|e| e.source).collect()
    }

    /// Direct downstream features, in edge order
    pub fn children(&self, id: FeatureId) -> Vec<FeatureId> {
        self.out_edges(id).map(|e| e.target).collect()
    }

    /// Every feature downstream of `id`, nearest first
    pub fn descendants(&self, id: FeatureId) -> Vec<FeatureId> {
        self.walk(id, |n| self.children(n))
    }

    /// Every feature upstream of `id`, nearest first
    pub fn ancestors(&self, id: FeatureId) -> Vec<FeatureId> {
        self.walk(id, |n| self.parents(n))
    }

    fn walk(&self, start: FeatureId, next: impl Fn(FeatureId) -> Vec<FeatureId>) -> Vec<FeatureId> {
        let mut order = Vec::new();
        let mut seen = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for neighbour in next(node) {
                if seen.insert(neighbour) {
                    order.push(neighbour);
                    queue.push_back(neighbour);
                }
            }
        }
        order
    }

    /// Whether a directed path leads from `from` to `to`
    pub fn reaches(&self, from: FeatureId, to: FeatureId) -> bool {
        from == to || self.descendants(from).contains(&to)
    }

    /// Every feature with parents before children; unrelated features keep
    /// insertion order.
    pub fn topological_order(&self) -> Vec<FeatureId> {
        let index: HashMap<FeatureId, usize> =
            self.nodes.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let mut in_degree = vec![0usize; self.nodes.len()];
        for edge in &self.edges {
            if let Some(i) = index.get(&edge.target) {
                in_degree[*i] += 1;
            }
        }

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(i) = ready.pop_first() {
            let id = self.nodes[i];
            order.push(id);
            for edge in self.out_edges(id) {
                if let Some(j) = index.get(&edge.target) {
                    in_degree[*j] -= 1;
                    if in_degree[*j] == 0 {
                        ready.insert(*j);
                    }
                }
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn graph_of(n: usize) -> (FeatureGraph, Vec<FeatureId>) {
        let mut graph = FeatureGraph::new();
        let ids: Vec<FeatureId> = (0..n).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            graph.add_node(*id).unwrap();
        }
        (graph, ids)
    }

    #[test]
    fn test_cycle_is_rejected() {
        let (mut graph, ids) = graph_of(3);
        graph.connect(ids[0], ids[1], InputType::target()).unwrap();
        graph.connect(ids[1], ids[2], InputType::target()).unwrap();

        assert_eq!(
            graph.connect(ids[1], ids[0], InputType::target()),
            Err(GraphError::Cycle {
                from: ids[1],
                to: ids[0]
            })
        );
        assert!(graph.connect(ids[2], ids[0], InputType::tool()).is_err());
        assert!(graph.connect(ids[0], ids[0], InputType::tool()).is_err());
        assert_eq!(graph.edges().len(), 2);
    }

    #[test]
    fn test_connect_merges_tags() {
        let (mut graph, ids) = graph_of(2);
        graph.connect(ids[0], ids[1], InputType::target()).unwrap();
        graph.connect(ids[0], ids[1], InputType::tool()).unwrap();
        assert_eq!(graph.edges().len(), 1);
        assert_eq!(graph.edges()[0].input.to_string(), "target, tool");

        assert!(graph.remove_parent_tag(ids[1], InputType::TARGET).unwrap());
        assert_eq!(graph.edges().len(), 1);
        graph.remove_parent_tag(ids[1], InputType::TOOL).unwrap();
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn test_unknown_and_duplicate_nodes() {
        let (mut graph, ids) = graph_of(1);
        let stranger = Uuid::new_v4();
        assert_eq!(graph.add_node(ids[0]), Err(GraphError::DuplicateFeature(ids[0])));
        assert_eq!(
            graph.connect(ids[0], stranger, InputType::target()),
            Err(GraphError::FeatureNotFound(stranger))
        );
    }

    #[test]
    fn test_topological_order_is_stable() {
        let (mut graph, ids) = graph_of(4);
        // 3 -> 0, 1 and 2 unrelated
        graph.connect(ids[3], ids[0], InputType::target()).unwrap();
        assert_eq!(graph.topological_order(), vec![ids[1], ids[2], ids[3], ids[0]]);

        graph.connect(ids[0], ids[1], InputType::target()).unwrap();
        assert_eq!(graph.topological_order(), vec![ids[2], ids[3], ids[0], ids[1]]);
    }

    #[test]
    fn test_walks() {
        let (mut graph, ids) = graph_of(4);
        graph.connect(ids[0], ids[1], InputType::target()).unwrap();
        graph.connect(ids[1], ids[2], InputType::target()).unwrap();
        graph.connect(ids[0], ids[3], InputType::tool()).unwrap();

        assert_eq!(graph.descendants(ids[0]), vec![ids[1], ids[3], ids[2]]);
        assert_eq!(graph.ancestors(ids[2]), vec![ids[1], ids[0]]);
        assert!(graph.reaches(ids[0], ids[2]));
        assert!(!graph.reaches(ids[3], ids[2]));

        graph.disconnect_all(ids[1]).unwrap();
        assert_eq!(graph.edges().len(), 1);
        graph.remove_node(ids[3]).unwrap();
        assert!(graph.edges().is_empty());
        assert_eq!(graph.len(), 3);
    }
}
