//! Shape History
//!
//! Project-wide graph of identifier evolution. Vertices are (feature, id)
//! pairs, and an edge says the later identifier evolved from the earlier
//! one. Every regeneration rewrites the edges into the regenerated feature
//! and marks which of its vertices are live. Vertices that are no longer
//! produced stay behind as stale so old picks can still be traced.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::id::{FeatureId, Identifier};
use crate::identity::{EvolutionLedger, Source};
use crate::pick::PickError;

/// Devolved trace of a sub-shape back to its origins, newest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySlice {
    entries: Vec<Source>,
}

impl HistorySlice {
    pub fn new(entries: Vec<Source>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[Source] {
        &self.entries
    }

    /// The vertex the slice was taken from
    pub fn head(&self) -> Option<Source> {
        self.entries.first().copied()
    }

    /// Newest recorded identifier of `feature` in this trace
    pub fn id_in(&self, feature: FeatureId) -> Option<Identifier> {
        self.entries
            .iter()
            .find(|entry| entry.feature == feature)
            .map(|entry| entry.id)
    }

    /// Drop every entry of a feature
    pub fn forget(&mut self, feature: FeatureId) {
        self.entries.retain(|entry| entry.feature != feature);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
struct Node {
    live: bool,
    parents: BTreeSet<Source>,
    children: BTreeSet<Source>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HistoryData {
    vertices: Vec<(Source, bool)>,
    edges: Vec<(Source, Source)>,
}

/// Evolution graph over (feature, identifier) vertices
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(into = "HistoryData", from = "HistoryData")]
pub struct ShapeHistory {
    nodes: BTreeMap<Source, Node>,
}

impl ShapeHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vertices
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.children.len()).sum()
    }

    pub fn contains(&self, vertex: Source) -> bool {
        self.nodes.contains_key(&vertex)
    }

    /// True if the vertex is part of its feature's current result
    pub fn is_live(&self, vertex: Source) -> bool {
        self.nodes.get(&vertex).is_some_and(|n| n.live)
    }

    pub fn has_feature(&self, feature: FeatureId) -> bool {
        self.nodes.keys().any(|v| v.feature == feature)
    }

    /// Identifiers recorded for a feature, live or stale
    pub fn vertices_of(&self, feature: FeatureId) -> Vec<Identifier> {
        self.nodes
            .keys()
            .filter(|v| v.feature == feature)
            .map(|v| v.id)
            .collect()
    }

    pub fn parents(&self, vertex: Source) -> impl Iterator<Item = Source> + '_ {
        self.nodes
            .get(&vertex)
            .into_iter()
            .flat_map(|n| n.parents.iter().copied())
    }

    pub fn children(&self, vertex: Source) -> impl Iterator<Item = Source> + '_ {
        self.nodes
            .get(&vertex)
            .into_iter()
            .flat_map(|n| n.children.iter().copied())
    }

    /// Record that `to` evolved from `from`
    pub fn record_evolution(&mut self, from: Source, to: Source) {
        self.nodes.entry(from).or_default().children.insert(to);
        let node = self.nodes.entry(to).or_insert_with(|| Node {
            live: true,
            ..Default::default()
        });
        node.parents.insert(from);
    }

    /// Fold one successful or failed regeneration into the history.
    ///
    /// Edges into the feature are replaced by the ledger's, its vertices are
    /// marked stale, then the `live` identifiers are marked live again.
    pub fn record_regeneration(
        &mut self,
        feature: FeatureId,
        ledger: &EvolutionLedger,
        live: impl IntoIterator<Item = Identifier>,
    ) {
        let own: Vec<Source> = self
            .nodes
            .keys()
            .filter(|v| v.feature == feature)
            .copied()
            .collect();
        for vertex in own {
            let parents = match self.nodes.get_mut(&vertex) {
                Some(node) => {
                    node.live = false;
                    std::mem::take(&mut node.parents)
                }
                None => continue,
            };
            for parent in parents {
                if let Some(node) = self.nodes.get_mut(&parent) {
                    node.children.remove(&vertex);
                }
            }
        }

        for id in live {
            self.nodes.entry(Source::new(feature, id)).or_default().live = true;
        }
        for (out, sources) in ledger.iter() {
            let to = Source::new(feature, out);
            for source in sources {
                self.record_evolution(*source, to);
            }
        }
    }

    /// Delete every vertex of a feature and the edges touching them
    pub fn remove_feature(&mut self, feature: FeatureId) {
        let own: Vec<Source> = self
            .nodes
            .keys()
            .filter(|v| v.feature == feature)
            .copied()
            .collect();
        for vertex in &own {
            if let Some(node) = self.nodes.remove(vertex) {
                for parent in node.parents {
                    if let Some(p) = self.nodes.get_mut(&parent) {
                        p.children.remove(vertex);
                    }
                }
                for child in node.children {
                    if let Some(c) = self.nodes.get_mut(&child) {
                        c.parents.remove(vertex);
                    }
                }
            }
        }
    }

    /// Trace an identifier back to its origins.
    ///
    /// Breadth-first over parent edges, starting with the vertex itself.
    pub fn devolve_history(&self, feature: FeatureId, id: Identifier) -> HistorySlice {
        HistorySlice::new(self.walk(Source::new(feature, id), |v| self.parents(v).collect()))
    }

    /// Every vertex that evolved from an identifier, nearest first
    pub fn evolve_history(&self, feature: FeatureId, id: Identifier) -> Vec<Source> {
        let mut reached = self.walk(Source::new(feature, id), |v| self.children(v).collect());
        reached.remove(0);
        reached
    }

    fn walk(&self, start: Source, next: impl Fn(Source) -> Vec<Source>) -> Vec<Source> {
        let mut order = vec![start];
        let mut seen = BTreeSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(vertex) = queue.pop_front() {
            for neighbour in next(vertex) {
                if seen.insert(neighbour) {
                    order.push(neighbour);
                    queue.push_back(neighbour);
                }
            }
        }
        order
    }

    /// Map a devolved trace onto the current result of `target`.
    ///
    /// Anchors on the newest live vertex of the slice and follows evolution
    /// edges forward until they reach `target`. Exactly one live vertex is a
    /// match, several are ambiguous, none means the shape is gone.
    pub fn resolve_forward(
        &self,
        slice: &HistorySlice,
        target: FeatureId,
    ) -> Result<Identifier, PickError> {
        let picked = slice.head().map(|h| h.id).unwrap_or_default();
        let Some(anchor) = slice.entries().iter().copied().find(|v| self.is_live(*v)) else {
            let known = slice.entries().iter().any(|v| self.contains(*v));
            return Err(if known {
                PickError::Deleted {
                    feature: target,
                    id: picked,
                }
            } else {
                PickError::NotFound {
                    feature: target,
                    id: picked,
                }
            });
        };
        if anchor.feature == target {
            return Ok(anchor.id);
        }

        let mut candidates = BTreeSet::new();
        let mut seen = BTreeSet::from([anchor]);
        let mut queue = VecDeque::from([anchor]);
        while let Some(vertex) = queue.pop_front() {
            for child in self.children(vertex) {
                if !seen.insert(child) {
                    continue;
                }
                if child.feature == target {
                    if self.is_live(child) {
                        candidates.insert(child.id);
                    }
                    continue;
                }
                queue.push_back(child);
            }
        }

        let mut candidates: Vec<Identifier> = candidates.into_iter().collect();
        match candidates.len() {
            1 => Ok(candidates.remove(0)),
            0 if self.has_feature(target) => Err(PickError::Deleted {
                feature: target,
                id: picked,
            }),
            0 => Err(PickError::NotFound {
                feature: target,
                id: picked,
            }),
            _ => Err(PickError::Ambiguous {
                feature: target,
                candidates,
            }),
        }
    }
}

impl From<ShapeHistory> for HistoryData {
    fn from(history: ShapeHistory) -> Self {
        let vertices = history.nodes.iter().map(|(v, n)| (*v, n.live)).collect();
        let edges = history
            .nodes
            .iter()
            .flat_map(|(v, n)| n.children.iter().map(move |c| (*v, *c)))
            .collect();
        HistoryData { vertices, edges }
    }
}

impl From<HistoryData> for ShapeHistory {
    fn from(data: HistoryData) -> Self {
        let mut history = ShapeHistory::default();
        for (vertex, live) in data.vertices {
            history.nodes.entry(vertex).or_default().live = live;
        }
        for (from, to) in data.edges {
            history.nodes.entry(from).or_default().children.insert(to);
            history.nodes.entry(to).or_default().parents.insert(from);
        }
        history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    struct Fixture {
        history: ShapeHistory,
        box_feature: FeatureId,
        cut: FeatureId,
        a: Identifier,
        s1: Identifier,
    }

    /// Box creates A, Cut evolves A into s1
    fn fixture() -> Fixture {
        let (box_feature, cut) = (Uuid::new_v4(), Uuid::new_v4());
        let (a, s1) = (Identifier::new_random(), Identifier::new_random());
        let mut history = ShapeHistory::new();

        let mut ledger = EvolutionLedger::new();
        ledger.record_creation(a);
        history.record_regeneration(box_feature, &ledger, [a]);

        let mut ledger = EvolutionLedger::new();
        ledger.record(s1, Source::new(box_feature, a));
        history.record_regeneration(cut, &ledger, [s1]);

        Fixture {
            history,
            box_feature,
            cut,
            a,
            s1,
        }
    }

    fn regenerate_cut(f: &mut Fixture, outputs: &[Identifier], from_a: bool) {
        let mut ledger = EvolutionLedger::new();
        for out in outputs {
            if from_a {
                ledger.record(*out, Source::new(f.box_feature, f.a));
            } else {
                ledger.record_creation(*out);
            }
        }
        f.history
            .record_regeneration(f.cut, &ledger, outputs.iter().copied());
    }

    #[test]
    fn test_devolve_reaches_origin() {
        let f = fixture();
        let slice = f.history.devolve_history(f.cut, f.s1);
        assert_eq!(
            slice.entries(),
            &[Source::new(f.cut, f.s1), Source::new(f.box_feature, f.a)]
        );
        assert_eq!(slice.id_in(f.box_feature), Some(f.a));
        assert_eq!(f.history.edge_count(), 1);
        assert_eq!(
            f.history.evolve_history(f.box_feature, f.a),
            vec![Source::new(f.cut, f.s1)]
        );
    }

    #[test]
    fn test_resolve_live_head() {
        let f = fixture();
        let slice = f.history.devolve_history(f.cut, f.s1);
        assert_eq!(f.history.resolve_forward(&slice, f.cut), Ok(f.s1));
    }

    #[test]
    fn test_resolve_after_one_to_one_change() {
        let mut f = fixture();
        let slice = f.history.devolve_history(f.cut, f.s1);
        let s2 = Identifier::new_random();
        regenerate_cut(&mut f, &[s2], true);

        assert!(!f.history.is_live(Source::new(f.cut, f.s1)));
        assert_eq!(f.history.resolve_forward(&slice, f.cut), Ok(s2));
    }

    #[test]
    fn test_resolve_after_split_is_ambiguous() {
        let mut f = fixture();
        let slice = f.history.devolve_history(f.cut, f.s1);
        let (s2, s3) = (Identifier::new_random(), Identifier::new_random());
        regenerate_cut(&mut f, &[s2, s3], true);

        match f.history.resolve_forward(&slice, f.cut) {
            Err(PickError::Ambiguous { candidates, .. }) => {
                assert_eq!(candidates.len(), 2);
                assert!(candidates.contains(&s2) && candidates.contains(&s3));
            }
            other => panic!("expected ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_deleted_and_not_found() {
        let mut f = fixture();
        let slice = f.history.devolve_history(f.cut, f.s1);
        regenerate_cut(&mut f, &[Identifier::new_random()], false);
        assert!(matches!(
            f.history.resolve_forward(&slice, f.cut),
            Err(PickError::Deleted { .. })
        ));

        let unknown = HistorySlice::new(vec![Source::new(Uuid::new_v4(), Identifier::new_random())]);
        let stranger = Uuid::new_v4();
        assert!(matches!(
            f.history.resolve_forward(&unknown, stranger),
            Err(PickError::NotFound { .. })
        ));
    }

    #[test]
    fn test_remove_feature() {
        let mut f = fixture();
        f.history.remove_feature(f.cut);
        assert!(!f.history.has_feature(f.cut));
        assert_eq!(f.history.edge_count(), 0);
        assert!(f.history.is_live(Source::new(f.box_feature, f.a)));
    }

    #[test]
    fn test_serialization_round_trip() {
        let f = fixture();
        let text = ron::to_string(&f.history).unwrap();
        let loaded: ShapeHistory = ron::from_str(&text).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.edge_count(), 1);
        let slice = loaded.devolve_history(f.cut, f.s1);
        assert_eq!(slice.len(), 2);
        assert_eq!(loaded.resolve_forward(&slice, f.cut), Ok(f.s1));
    }
}
