//! Builder history reported by a shape engine
//!
//! Every build returns how the result sub-shapes relate to the input
//! sub-shapes. Identifier mapping reads this to carry names forward.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::topology::ShapeHandle;

/// Input/output relations of one build
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuilderHistory {
    /// result -> input it is identical to
    same: HashMap<ShapeHandle, ShapeHandle>,
    /// result -> inputs it is a modified version of
    modified: HashMap<ShapeHandle, Vec<ShapeHandle>>,
    /// result -> inputs it was generated from (e.g. a blend face from an edge)
    generated: HashMap<ShapeHandle, Vec<ShapeHandle>>,
    /// result -> (source sub-shape, instance index)
    instances: HashMap<ShapeHandle, (ShapeHandle, u32)>,
    /// inputs with no counterpart in the result
    deleted: BTreeSet<ShapeHandle>,
}

impl BuilderHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_same(&mut self, result: ShapeHandle, input: ShapeHandle) {
        self.same.insert(result, input);
    }

    pub fn record_modified(&mut self, result: ShapeHandle, input: ShapeHandle) {
        push_unique(self.modified.entry(result).or_default(), input);
    }

    pub fn record_generated(&mut self, result: ShapeHandle, input: ShapeHandle) {
        push_unique(self.generated.entry(result).or_default(), input);
    }

    pub fn record_instance(&mut self, result: ShapeHandle, source: ShapeHandle, index: u32) {
        self.instances.insert(result, (source, index));
    }

    pub fn record_deleted(&mut self, input: ShapeHandle) {
        self.deleted.insert(input);
    }

    /// Input sub-shape this result is identical to
    pub fn same_as(&self, result: ShapeHandle) -> Option<ShapeHandle> {
        self.same.get(&result).copied()
    }

    pub fn modified_from(&self, result: ShapeHandle) -> &[ShapeHandle] {
        self.modified.get(&result).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn generated_from(&self, result: ShapeHandle) -> &[ShapeHandle] {
        self.generated.get(&result).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Modified-from followed by generated-from, without repeats
    pub fn ancestors(&self, result: ShapeHandle) -> Vec<ShapeHandle> {
        let mut out = Vec::new();
        for input in self
            .modified_from(result)
            .iter()
            .chain(self.generated_from(result))
        {
            push_unique(&mut out, *input);
        }
        out
    }

    pub fn instance_of(&self, result: ShapeHandle) -> Option<(ShapeHandle, u32)> {
        self.instances.get(&result).copied()
    }

    pub fn is_deleted(&self, input: ShapeHandle) -> bool {
        self.deleted.contains(&input)
    }

    pub fn deleted(&self) -> impl Iterator<Item = ShapeHandle> + '_ {
        self.deleted.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.same.is_empty()
            && self.modified.is_empty()
            && self.generated.is_empty()
            && self.instances.is_empty()
            && self.deleted.is_empty()
    }
}

fn push_unique(list: &mut Vec<ShapeHandle>, handle: ShapeHandle) {
    if !list.contains(&handle) {
        list.push(handle);
    }
}
