//! Shape handles and topology snapshots
//!
//! A [`Topology`] is an immutable view of the sub-shape tree of one built
//! shape. Sub-shapes may be shared (an edge belongs to two faces), so the
//! tree is really a DAG; traversal visits each sub-shape once.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::traits::{ShapeError, ShapeResult};

/// Opaque handle to a concrete shape owned by a shape engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShapeHandle(pub u64);

impl fmt::Display for ShapeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Topological kind of a shape, ordered from the top of the tree down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShapeKind {
    Compound,
    Solid,
    Shell,
    Face,
    Wire,
    Edge,
    Vertex,
}

impl ShapeKind {
    /// All kinds, top-down
    pub const ALL: [ShapeKind; 7] = [
        ShapeKind::Compound,
        ShapeKind::Solid,
        ShapeKind::Shell,
        ShapeKind::Face,
        ShapeKind::Wire,
        ShapeKind::Edge,
        ShapeKind::Vertex,
    ];

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            ShapeKind::Compound => "Compound",
            ShapeKind::Solid => "Solid",
            ShapeKind::Shell => "Shell",
            ShapeKind::Face => "Face",
            ShapeKind::Wire => "Wire",
            ShapeKind::Edge => "Edge",
            ShapeKind::Vertex => "Vertex",
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One sub-shape in a topology snapshot
#[derive(Debug, Clone)]
pub struct TopoNode {
    /// Engine handle
    pub shape: ShapeHandle,
    /// Topological kind
    pub kind: ShapeKind,
    /// Ordered direct children
    pub children: Vec<ShapeHandle>,
    /// Role tag assigned by primitive constructors (e.g. "face.xmin")
    pub tag: Option<String>,
    /// Representative point, used for display and picking
    pub point: Option<Vec3>,
}

impl TopoNode {
    /// Create a node without tag or point
    pub fn new(shape: ShapeHandle, kind: ShapeKind, children: Vec<ShapeHandle>) -> Self {
        Self {
            shape,
            kind,
            children,
            tag: None,
            point: None,
        }
    }

    /// Attach a role tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Attach a representative point
    pub fn with_point(mut self, point: Vec3) -> Self {
        self.point = Some(point);
        self
    }
}

/// Immutable sub-shape tree of one built shape
#[derive(Debug, Clone)]
pub struct Topology {
    root: ShapeHandle,
    /// Nodes in pre-order from the root, each sub-shape once
    nodes: Vec<TopoNode>,
    index: HashMap<ShapeHandle, usize>,
    parents: HashMap<ShapeHandle, Vec<ShapeHandle>>,
}

impl Topology {
    /// Build a snapshot from a root and a bag of nodes.
    ///
    /// Nodes not reachable from the root are dropped. A child that has no
    /// node is an error.
    pub fn new(root: ShapeHandle, nodes: Vec<TopoNode>) -> ShapeResult<Self> {
        let mut bag: HashMap<ShapeHandle, TopoNode> =
            nodes.into_iter().map(|n| (n.shape, n)).collect();

        let mut ordered = Vec::with_capacity(bag.len());
        let mut visited = HashSet::new();
        let mut stack = vec![root];
        while let Some(handle) = stack.pop() {
            if !visited.insert(handle) {
                continue;
            }
            let node = bag.remove(&handle).ok_or(ShapeError::UnknownShape(handle))?;
            for child in node.children.iter().rev() {
                if !visited.contains(child) {
                    stack.push(*child);
                }
            }
            ordered.push(node);
        }

        let index = ordered
            .iter()
            .enumerate()
            .map(|(i, n)| (n.shape, i))
            .collect();

        let mut parents: HashMap<ShapeHandle, Vec<ShapeHandle>> = HashMap::new();
        for node in &ordered {
            for child in &node.children {
                let list = parents.entry(*child).or_default();
                if !list.contains(&node.shape) {
                    list.push(node.shape);
                }
            }
        }

        Ok(Self {
            root,
            nodes: ordered,
            index,
            parents,
        })
    }

    /// Root handle
    pub fn root(&self) -> ShapeHandle {
        self.root
    }

    /// Number of distinct sub-shapes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, shape: ShapeHandle) -> bool {
        self.index.contains_key(&shape)
    }

    pub fn node(&self, shape: ShapeHandle) -> Option<&TopoNode> {
        self.index.get(&shape).map(|&i| &self.nodes[i])
    }

    pub fn kind(&self, shape: ShapeHandle) -> Option<ShapeKind> {
        self.node(shape).map(|n| n.kind)
    }

    pub fn tag(&self, shape: ShapeHandle) -> Option<&str> {
        self.node(shape).and_then(|n| n.tag.as_deref())
    }

    pub fn children(&self, shape: ShapeHandle) -> &[ShapeHandle] {
        self.node(shape).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Direct parents of a sub-shape (empty for the root)
    pub fn parents(&self, shape: ShapeHandle) -> &[ShapeHandle] {
        self.parents.get(&shape).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All sub-shapes in pre-order, root first
    pub fn sub_shapes(&self) -> impl Iterator<Item = &TopoNode> {
        self.nodes.iter()
    }

    /// Sub-shapes of one kind, in pre-order
    pub fn of_kind(&self, kind: ShapeKind) -> impl Iterator<Item = &TopoNode> {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }

    /// Nearest ancestors of the given kind.
    ///
    /// Walks up through intermediate kinds (an edge reaches its faces through
    /// wires) and stops at the first ancestor of `kind` on each path.
    pub fn ancestors_of_kind(&self, shape: ShapeHandle, kind: ShapeKind) -> BTreeSet<ShapeHandle> {
        let mut found = BTreeSet::new();
        let mut visited = HashSet::new();
        let mut stack: Vec<ShapeHandle> = self.parents(shape).to_vec();
        while let Some(handle) = stack.pop() {
            if !visited.insert(handle) {
                continue;
            }
            if self.kind(handle) == Some(kind) {
                found.insert(handle);
            } else {
                stack.extend_from_slice(self.parents(handle));
            }
        }
        found
    }

    /// Every sub-shape strictly below `shape`
    pub fn descendants(&self, shape: ShapeHandle) -> Vec<ShapeHandle> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        let mut stack: Vec<ShapeHandle> = self.children(shape).iter().rev().copied().collect();
        while let Some(handle) = stack.pop() {
            if !visited.insert(handle) {
                continue;
            }
            out.push(handle);
            stack.extend(self.children(handle).iter().rev());
        }
        out
    }
}
