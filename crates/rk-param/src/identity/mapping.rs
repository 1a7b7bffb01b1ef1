//! Identifier mapping
//!
//! Passes that name the sub-shapes of a fresh result from the upstream
//! stores and the builder history. Every pass only fills sub-shapes that are
//! still nil, and a [`MappingPlan`] fixes the pass order:
//!
//! - carry-forward: a sub-shape the engine reports unchanged keeps its id
//! - split/merge: modified or generated sub-shapes get fresh ids derived
//!   from their ancestors
//! - instance: pattern copies get ids keyed by (source id, index)
//! - root, parent and tag derivation name whatever is left

use std::collections::BTreeMap;

use rk_kernel::{BuilderHistory, ShapeHandle, ShapeKind};

use crate::id::{DerivationKey, FeatureId, Identifier};
use crate::identity::ledger::{EvolutionLedger, Source};
use crate::identity::store::{IdentityError, IdentityStore};

/// Store of an input feature, in input order
#[derive(Debug, Clone, Copy)]
pub struct Upstream<'a> {
    pub feature: FeatureId,
    pub store: &'a IdentityStore,
}

impl<'a> Upstream<'a> {
    pub fn new(feature: FeatureId, store: &'a IdentityStore) -> Self {
        Self { feature, store }
    }
}

/// Pass order used by a feature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingPlan {
    /// Results with no inputs, named from role tags
    Primitive,
    /// Booleans, blends and other results that rework their inputs
    Boolean,
    /// Patterns of a single source
    Instance,
}

/// Sub-shapes named by each pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MappingSummary {
    pub carried: usize,
    pub split: usize,
    pub merged: usize,
    pub instanced: usize,
    pub derived: usize,
}

impl MappingSummary {
    pub fn total(&self) -> usize {
        self.carried + self.split + self.merged + self.instanced + self.derived
    }
}

/// Names a fresh result
pub struct IdMapper<'a> {
    seed: FeatureId,
    history: &'a BuilderHistory,
    upstream: &'a [Upstream<'a>],
}

impl<'a> IdMapper<'a> {
    pub fn new(seed: FeatureId, history: &'a BuilderHistory, upstream: &'a [Upstream<'a>]) -> Self {
        Self {
            seed,
            history,
            upstream,
        }
    }

    /// Run every pass of `plan`, then check the store invariants
    pub fn run(
        &self,
        plan: MappingPlan,
        store: &mut IdentityStore,
        ledger: &mut EvolutionLedger,
    ) -> Result<MappingSummary, IdentityError> {
        let mut summary = MappingSummary::default();
        match plan {
            MappingPlan::Primitive => {
                summary.derived += self.tag_match(store, ledger)?;
                summary.derived += self.root_match(store, ledger)?;
                summary.derived += self.parent_match(store, ledger)?;
            }
            MappingPlan::Boolean => {
                summary.carried += self.carry_forward(store, ledger)?;
                let (split, merged) = self.split_merge(store, ledger)?;
                summary.split += split;
                summary.merged += merged;
                summary.derived += self.root_match(store, ledger)?;
                summary.derived += self.parent_match(store, ledger)?;
                summary.derived += self.tag_match(store, ledger)?;
            }
            MappingPlan::Instance => {
                summary.carried += self.carry_forward(store, ledger)?;
                summary.instanced += self.instance_match(store, ledger)?;
                summary.derived += self.root_match(store, ledger)?;
                summary.derived += self.parent_match(store, ledger)?;
                summary.derived += self.tag_match(store, ledger)?;
            }
        }
        store.ensure_no_nils()?;
        store.ensure_no_duplicates()?;
        Ok(summary)
    }

    /// First upstream store that names `shape`
    fn source_of(&self, shape: ShapeHandle) -> Option<Source> {
        self.upstream.iter().find_map(|up| {
            let id = up.store.id_of(shape);
            (!id.is_nil()).then_some(Source::new(up.feature, id))
        })
    }

    /// Unchanged sub-shapes keep the upstream identifier
    pub fn carry_forward(
        &self,
        store: &mut IdentityStore,
        ledger: &mut EvolutionLedger,
    ) -> Result<usize, IdentityError> {
        let mut count = 0;
        for shape in store.nil_shapes() {
            let input = self.history.same_as(shape).unwrap_or(shape);
            let Some(source) = self.source_of(input) else {
                continue;
            };
            if store.has_id(source.id) {
                continue;
            }
            store.assign_id(shape, source.id)?;
            ledger.record(source.id, source);
            count += 1;
        }
        Ok(count)
    }

    /// Modified and generated sub-shapes, grouped by their ancestor ids.
    ///
    /// One ancestor shared by several outputs is a split, several ancestors
    /// feeding one output a merge. Returns (split, merged) counts.
    pub fn split_merge(
        &self,
        store: &mut IdentityStore,
        ledger: &mut EvolutionLedger,
    ) -> Result<(usize, usize), IdentityError> {
        let mut splits: BTreeMap<(Source, ShapeKind), Vec<ShapeHandle>> = BTreeMap::new();
        let mut merges: BTreeMap<(Vec<Source>, ShapeKind), Vec<ShapeHandle>> = BTreeMap::new();
        {
            let Some(topology) = store.topology() else {
                return Ok((0, 0));
            };
            for node in topology.sub_shapes() {
                if !store.id_of(node.shape).is_nil() {
                    continue;
                }
                let mut sources: Vec<Source> = self
                    .history
                    .ancestors(node.shape)
                    .into_iter()
                    .filter_map(|ancestor| self.source_of(ancestor))
                    .collect();
                sources.sort();
                sources.dedup();
                match sources.len() {
                    0 => {}
                    1 => splits
                        .entry((sources[0], node.kind))
                        .or_default()
                        .push(node.shape),
                    _ => merges
                        .entry((sources, node.kind))
                        .or_default()
                        .push(node.shape),
                }
            }
        }

        let mut split_count = 0;
        for ((source, kind), shapes) in splits {
            let siblings = shapes.len();
            for (ordinal, shape) in shapes.into_iter().enumerate() {
                let key = DerivationKey::new("split")
                    .feature(source.feature)
                    .id(source.id)
                    .text(kind.name())
                    .index(ordinal)
                    .index(siblings);
                let id = Identifier::derive(self.seed, &key);
                store.assign_id(shape, id)?;
                ledger.record(id, source);
                split_count += 1;
            }
        }

        let mut merge_count = 0;
        for ((sources, kind), shapes) in merges {
            for (ordinal, shape) in shapes.into_iter().enumerate() {
                let mut key = DerivationKey::new("merge").text(kind.name());
                for source in &sources {
                    key = key.feature(source.feature).id(source.id);
                }
                let id = Identifier::derive(self.seed, &key.index(ordinal));
                store.assign_id(shape, id)?;
                for source in &sources {
                    ledger.record(id, *source);
                }
                merge_count += 1;
            }
        }
        Ok((split_count, merge_count))
    }

    /// Pattern copies, keyed by source id and instance index
    pub fn instance_match(
        &self,
        store: &mut IdentityStore,
        ledger: &mut EvolutionLedger,
    ) -> Result<usize, IdentityError> {
        let mut count = 0;
        for shape in store.nil_shapes() {
            let Some((original, index)) = self.history.instance_of(shape) else {
                continue;
            };
            let Some(source) = self.source_of(original) else {
                continue;
            };
            let key = DerivationKey::new("instance")
                .feature(source.feature)
                .id(source.id)
                .index(index as usize);
            let id = Identifier::derive(self.seed, &key);
            if store.has_id(id) {
                continue;
            }
            store.assign_id(shape, id)?;
            ledger.record(id, source);
            count += 1;
        }
        Ok(count)
    }

    /// A still unnamed root is named after its kind
    pub fn root_match(
        &self,
        store: &mut IdentityStore,
        ledger: &mut EvolutionLedger,
    ) -> Result<usize, IdentityError> {
        let Some(topology) = store.topology() else {
            return Ok(0);
        };
        let root = topology.root();
        let Some(kind) = topology.kind(root) else {
            return Ok(0);
        };
        if !store.id_of(root).is_nil() {
            return Ok(0);
        }
        let id = Identifier::derive(self.seed, &DerivationKey::new("root").text(kind.name()));
        store.assign_id(root, id)?;
        ledger.record_creation(id);
        Ok(1)
    }

    /// Name sub-shapes from the ids of their parents.
    ///
    /// Edges and wires key on their faces, vertices on their edges, other
    /// kinds on their direct parents. Kinds are walked top-down so parents
    /// are named first.
    pub fn parent_match(
        &self,
        store: &mut IdentityStore,
        ledger: &mut EvolutionLedger,
    ) -> Result<usize, IdentityError> {
        let mut count = 0;
        for kind in ShapeKind::ALL {
            let mut groups: BTreeMap<Vec<Identifier>, Vec<ShapeHandle>> = BTreeMap::new();
            {
                let Some(topology) = store.topology() else {
                    return Ok(0);
                };
                for node in topology.of_kind(kind) {
                    if !store.id_of(node.shape).is_nil() {
                        continue;
                    }
                    let parents: Vec<ShapeHandle> = match kind {
                        ShapeKind::Edge | ShapeKind::Wire => topology
                            .ancestors_of_kind(node.shape, ShapeKind::Face)
                            .into_iter()
                            .collect(),
                        ShapeKind::Vertex => topology
                            .ancestors_of_kind(node.shape, ShapeKind::Edge)
                            .into_iter()
                            .collect(),
                        _ => topology.parents(node.shape).to_vec(),
                    };
                    if parents.is_empty() {
                        continue;
                    }
                    let mut ids: Vec<Identifier> = parents.iter().map(|p| store.id_of(*p)).collect();
                    if ids.iter().any(Identifier::is_nil) {
                        continue;
                    }
                    ids.sort();
                    ids.dedup();
                    groups.entry(ids).or_default().push(node.shape);
                }
            }

            for (parents, shapes) in groups {
                for (ordinal, shape) in shapes.into_iter().enumerate() {
                    let mut key = DerivationKey::new("derived").text(kind.name());
                    for parent in &parents {
                        key = key.id(*parent);
                    }
                    let id = Identifier::derive(self.seed, &key.index(ordinal));
                    store.assign_id(shape, id)?;
                    ledger.record_creation(id);
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    /// Name tagged sub-shapes from their role tag
    pub fn tag_match(
        &self,
        store: &mut IdentityStore,
        ledger: &mut EvolutionLedger,
    ) -> Result<usize, IdentityError> {
        let mut groups: BTreeMap<String, Vec<ShapeHandle>> = BTreeMap::new();
        {
            let Some(topology) = store.topology() else {
                return Ok(0);
            };
            for node in topology.sub_shapes() {
                if let Some(tag) = &node.tag
                    && store.id_of(node.shape).is_nil()
                {
                    groups.entry(tag.clone()).or_default().push(node.shape);
                }
            }
        }

        let mut count = 0;
        for (tag, shapes) in groups {
            for (ordinal, shape) in shapes.into_iter().enumerate() {
                let key = DerivationKey::new("tag").text(&tag).index(ordinal);
                let id = Identifier::derive(self.seed, &key);
                store.assign_id(shape, id)?;
                ledger.record_creation(id);
                count += 1;
            }
        }
        Ok(count)
    }
}
