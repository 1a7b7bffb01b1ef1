//! Identity Store
//!
//! Bidirectional mapping between persistent identifiers and the concrete
//! sub-shapes of one feature's current result.

use std::collections::{BTreeSet, HashMap};

use rk_kernel::{ShapeHandle, ShapeKind, Topology};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::Identifier;

/// Identity invariant violations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IdentityError {
    #[error("{kind} {shape} has no identifier")]
    NilIdentifier { shape: ShapeHandle, kind: ShapeKind },

    #[error("Identifier {id} is assigned to both {first} and {second}")]
    DuplicateIdentifier {
        id: Identifier,
        first: ShapeHandle,
        second: ShapeHandle,
    },

    #[error("Shape {0} is not part of the current result")]
    UnknownShape(ShapeHandle),
}

/// One persisted store record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEntry {
    pub id: Identifier,
    pub kind: ShapeKind,
}

/// Serialized form of a store: handles are engine-local and not saved
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreData {
    root: Identifier,
    entries: Vec<StoreEntry>,
}

/// Identifier <-> sub-shape mapping for one feature result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(into = "StoreData", from = "StoreData")]
pub struct IdentityStore {
    topology: Option<Topology>,
    ids: HashMap<ShapeHandle, Identifier>,
    shapes: HashMap<Identifier, ShapeHandle>,
    root: Identifier,
    /// Records loaded from disk, until the next regeneration binds a result
    persisted: Vec<StoreEntry>,
}

impl IdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the backing shape tree.
    ///
    /// Assignments for sub-shapes that survive in the new tree are kept, the
    /// rest are dropped. New sub-shapes start with the nil identifier.
    pub fn set_result(&mut self, topology: Topology) {
        self.ids.retain(|shape, _| topology.contains(*shape));
        self.shapes.retain(|_, shape| topology.contains(*shape));
        for node in topology.sub_shapes() {
            self.ids.entry(node.shape).or_insert(Identifier::NIL);
        }
        self.root = self.ids.get(&topology.root()).copied().unwrap_or_default();
        self.topology = Some(topology);
        self.persisted.clear();
    }

    /// Drop the result and every assignment
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// True when no result is bound
    pub fn is_null(&self) -> bool {
        self.topology.is_none()
    }

    pub fn topology(&self) -> Option<&Topology> {
        self.topology.as_ref()
    }

    pub fn root_shape(&self) -> Option<ShapeHandle> {
        self.topology.as_ref().map(Topology::root)
    }

    /// Identifier of the whole result
    pub fn root(&self) -> Identifier {
        self.root
    }

    pub fn set_root(&mut self, id: Identifier) {
        self.root = id;
    }

    pub fn assign_id(&mut self, shape: ShapeHandle, id: Identifier) -> Result<(), IdentityError> {
        let topology = self
            .topology
            .as_ref()
            .ok_or(IdentityError::UnknownShape(shape))?;
        if !topology.contains(shape) {
            return Err(IdentityError::UnknownShape(shape));
        }
        let is_root = topology.root() == shape;

        if let Some(previous) = self.ids.insert(shape, id)
            && self.shapes.get(&previous) == Some(&shape)
        {
            self.shapes.remove(&previous);
        }
        if !id.is_nil() {
            self.shapes.entry(id).or_insert(shape);
        }
        if is_root {
            self.root = id;
        }
        Ok(())
    }

    /// Identifier of a sub-shape, nil when unknown or unassigned
    pub fn id_of(&self, shape: ShapeHandle) -> Identifier {
        self.ids.get(&shape).copied().unwrap_or_default()
    }

    pub fn shape_of(&self, id: Identifier) -> Option<ShapeHandle> {
        self.shapes.get(&id).copied()
    }

    pub fn has_id(&self, id: Identifier) -> bool {
        self.shapes.contains_key(&id)
    }

    pub fn has_shape(&self, shape: ShapeHandle) -> bool {
        self.ids.contains_key(&shape)
    }

    pub fn kind_of(&self, id: Identifier) -> Option<ShapeKind> {
        let shape = self.shape_of(id)?;
        self.topology.as_ref()?.kind(shape)
    }

    /// Sub-shapes still without an identifier, in pre-order
    pub fn nil_shapes(&self) -> Vec<ShapeHandle> {
        let Some(topology) = &self.topology else {
            return Vec::new();
        };
        topology
            .sub_shapes()
            .map(|n| n.shape)
            .filter(|shape| self.id_of(*shape).is_nil())
            .collect()
    }

    /// Every assigned identifier
    ///
    /// Before a loaded store is regenerated this reports the persisted ones.
    pub fn all_identifiers(&self) -> BTreeSet<Identifier> {
        if self.topology.is_none() {
            return self.persisted.iter().map(|e| e.id).collect();
        }
        self.ids.values().filter(|id| !id.is_nil()).copied().collect()
    }

    /// Assigned identifiers with their kinds, sorted by identifier
    pub fn entries(&self) -> Vec<StoreEntry> {
        let Some(topology) = &self.topology else {
            return self.persisted.clone();
        };
        let mut entries: Vec<StoreEntry> = topology
            .sub_shapes()
            .filter_map(|node| {
                let id = self.id_of(node.shape);
                (!id.is_nil()).then_some(StoreEntry {
                    id,
                    kind: node.kind,
                })
            })
            .collect();
        entries.sort_by_key(|e| e.id);
        entries
    }

    /// Number of sub-shapes with an identifier
    pub fn len(&self) -> usize {
        self.all_identifiers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every sub-shape of the result carries a non-nil identifier
    pub fn ensure_no_nils(&self) -> Result<(), IdentityError> {
        let Some(topology) = &self.topology else {
            return Ok(());
        };
        match topology
            .sub_shapes()
            .find(|node| self.id_of(node.shape).is_nil())
        {
            Some(node) => Err(IdentityError::NilIdentifier {
                shape: node.shape,
                kind: node.kind,
            }),
            None => Ok(()),
        }
    }

    /// No identifier names two sub-shapes
    pub fn ensure_no_duplicates(&self) -> Result<(), IdentityError> {
        let Some(topology) = &self.topology else {
            return Ok(());
        };
        let mut seen: HashMap<Identifier, ShapeHandle> = HashMap::new();
        for node in topology.sub_shapes() {
            let id = self.id_of(node.shape);
            if id.is_nil() {
                continue;
            }
            if let Some(first) = seen.insert(id, node.shape) {
                return Err(IdentityError::DuplicateIdentifier {
                    id,
                    first,
                    second: node.shape,
                });
            }
        }
        Ok(())
    }
}

impl From<IdentityStore> for StoreData {
    fn from(store: IdentityStore) -> Self {
        StoreData {
            root: store.root,
            entries: store.entries(),
        }
    }
}

impl From<StoreData> for IdentityStore {
    fn from(data: StoreData) -> Self {
        IdentityStore {
            root: data.root,
            persisted: data.entries,
            ..Default::default()
        }
    }
}
