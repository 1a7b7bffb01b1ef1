//! MockEngine: deterministic test double implementing ShapeEngine.
//!
//! Shapes are axis-aligned boxes and z-aligned cylinders kept in an arena.
//! Booleans are approximated from bounding boxes but report builder history
//! the way a real kernel would:
//! - Union keeps every input face unchanged and merges the input solids.
//! - Subtract by a slab that crosses the target splits it into two pieces.
//!   Otherwise the tool faces inside the target become new pocket faces.
//! - Intersect builds the overlap box, each face modified from the input
//!   face it lies on.
//!
//! Handles come from a counter, so replaying the same calls on a fresh
//! engine yields the same handles.

use std::collections::{HashMap, HashSet};

use glam::Vec3;

use crate::builder::BuilderHistory;
use crate::topology::{ShapeHandle, ShapeKind, TopoNode, Topology};
use crate::traits::{BooleanType, Build, ShapeEngine, ShapeError, ShapeResult};

const AXES: [&str; 3] = ["x", "y", "z"];
const SIDES: [&str; 2] = ["min", "max"];

/// Index of a box face in `MockShape::box_faces`
fn face_slot(axis: usize, side: usize) -> usize {
    axis * 2 + side
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Overlap with positive volume
    pub fn intersection(&self, other: &Aabb) -> Option<Aabb> {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);
        min.cmplt(max).all().then_some(Aabb { min, max })
    }

    pub fn translated(&self, offset: Vec3) -> Aabb {
        Aabb {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    /// Axis along which `tool` cuts this box into two disjoint pieces.
    ///
    /// The tool must lie strictly inside along that axis and cover the box
    /// completely along the other two.
    pub fn split_axis(&self, tool: &Aabb) -> Option<usize> {
        (0..3).find(|&axis| {
            tool.min[axis] > self.min[axis]
                && tool.max[axis] < self.max[axis]
                && (0..3)
                    .filter(|&other| other != axis)
                    .all(|other| tool.min[other] <= self.min[other] && tool.max[other] >= self.max[other])
        })
    }

    fn side(&self, axis: usize, side: usize) -> f32 {
        if side == 0 { self.min[axis] } else { self.max[axis] }
    }

    fn corner(&self, sides: [usize; 3]) -> Vec3 {
        Vec3::new(
            self.side(0, sides[0]),
            self.side(1, sides[1]),
            self.side(2, sides[2]),
        )
    }
}

#[derive(Debug, Clone)]
struct MockShape {
    kind: ShapeKind,
    children: Vec<ShapeHandle>,
    tag: Option<String>,
    point: Vec3,
    /// Set on solids
    bounds: Option<Aabb>,
    /// Faces of a box solid, indexed by `face_slot`
    box_faces: Option<[ShapeHandle; 6]>,
}

impl MockShape {
    fn new(kind: ShapeKind, children: Vec<ShapeHandle>, point: Vec3) -> Self {
        Self {
            kind,
            children,
            tag: None,
            point,
            bounds: None,
            box_faces: None,
        }
    }

    fn with_tag(mut self, tag: Option<String>) -> Self {
        self.tag = tag;
        self
    }
}

/// Slab cut applied to a box target
struct Cut {
    axis: usize,
    tool: Aabb,
    target_faces: [ShapeHandle; 6],
    tool_faces: [ShapeHandle; 6],
}

/// Deterministic test double for the shape engine
#[derive(Debug, Default)]
pub struct MockEngine {
    next_handle: u64,
    shapes: HashMap<ShapeHandle, MockShape>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of shapes ever built, sub-shapes included
    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    /// Bounds of a solid
    pub fn bounds(&self, shape: ShapeHandle) -> Option<Aabb> {
        self.shapes.get(&shape).and_then(|s| s.bounds)
    }

    /// Representative point of any shape
    pub fn point(&self, shape: ShapeHandle) -> Option<Vec3> {
        self.shapes.get(&shape).map(|s| s.point)
    }

    fn alloc(&mut self, shape: MockShape) -> ShapeHandle {
        self.next_handle += 1;
        let handle = ShapeHandle(self.next_handle);
        self.shapes.insert(handle, shape);
        handle
    }

    fn get(&self, handle: ShapeHandle) -> ShapeResult<&MockShape> {
        self.shapes
            .get(&handle)
            .ok_or(ShapeError::UnknownShape(handle))
    }

    /// Create a box with 8 vertices, 12 edges, 6 faces.
    ///
    /// Tagged boxes name every sub-shape after the box sides it touches.
    fn build_box(&mut self, bounds: Aabb, tagged: bool) -> (ShapeHandle, [ShapeHandle; 6]) {
        let tag = |text: String| tagged.then_some(text);

        // indexed by sx * 4 + sy * 2 + sz
        let mut vertices = [ShapeHandle(0); 8];
        for sx in 0..2 {
            for sy in 0..2 {
                for sz in 0..2 {
                    let name = format!("vertex.x{}.y{}.z{}", SIDES[sx], SIDES[sy], SIDES[sz]);
                    let shape = MockShape::new(ShapeKind::Vertex, Vec::new(), bounds.corner([sx, sy, sz]))
                        .with_tag(tag(name));
                    vertices[sx * 4 + sy * 2 + sz] = self.alloc(shape);
                }
            }
        }

        // each edge joins two faces on different axes
        let mut edges: Vec<([usize; 2], ShapeHandle)> = Vec::with_capacity(12);
        for (a1, a2) in [(0, 1), (0, 2), (1, 2)] {
            let a3 = 3 - a1 - a2;
            for s1 in 0..2 {
                for s2 in 0..2 {
                    let mut ends = Vec::with_capacity(2);
                    let mut midpoint = Vec3::ZERO;
                    for s3 in 0..2 {
                        let mut sides = [0; 3];
                        sides[a1] = s1;
                        sides[a2] = s2;
                        sides[a3] = s3;
                        ends.push(vertices[sides[0] * 4 + sides[1] * 2 + sides[2]]);
                        midpoint += bounds.corner(sides) * 0.5;
                    }
                    let name = format!("edge.{}{}.{}{}", AXES[a1], SIDES[s1], AXES[a2], SIDES[s2]);
                    let edge = self.alloc(MockShape::new(ShapeKind::Edge, ends, midpoint).with_tag(tag(name)));
                    edges.push(([face_slot(a1, s1), face_slot(a2, s2)], edge));
                }
            }
        }

        let mut faces = [ShapeHandle(0); 6];
        for axis in 0..3 {
            for side in 0..2 {
                let slot = face_slot(axis, side);
                let children = edges
                    .iter()
                    .filter(|(slots, _)| slots.contains(&slot))
                    .map(|(_, edge)| *edge)
                    .collect();
                let mut point = bounds.center();
                point[axis] = bounds.side(axis, side);
                let name = format!("face.{}{}", AXES[axis], SIDES[side]);
                faces[slot] = self.alloc(MockShape::new(ShapeKind::Face, children, point).with_tag(tag(name)));
            }
        }

        let mut solid = MockShape::new(ShapeKind::Solid, faces.to_vec(), bounds.center())
            .with_tag(tag("solid".to_string()));
        solid.bounds = Some(bounds);
        solid.box_faces = Some(faces);
        (self.alloc(solid), faces)
    }

    /// Create a cylinder with 3 faces, 3 edges (two circles and a seam), 2 vertices
    fn build_cylinder(&mut self, origin: Vec3, radius: f32, height: f32) -> ShapeHandle {
        let top = origin + Vec3::Z * height;
        let rim = Vec3::X * radius;
        let tagged = |shape: MockShape, name: &str| shape.with_tag(Some(name.to_string()));

        let v_bottom = self.alloc(tagged(
            MockShape::new(ShapeKind::Vertex, Vec::new(), origin + rim),
            "vertex.bottom",
        ));
        let v_top = self.alloc(tagged(
            MockShape::new(ShapeKind::Vertex, Vec::new(), top + rim),
            "vertex.top",
        ));
        let e_bottom = self.alloc(tagged(
            MockShape::new(ShapeKind::Edge, vec![v_bottom], origin),
            "edge.bottom",
        ));
        let e_top = self.alloc(tagged(
            MockShape::new(ShapeKind::Edge, vec![v_top], top),
            "edge.top",
        ));
        let e_seam = self.alloc(tagged(
            MockShape::new(ShapeKind::Edge, vec![v_bottom, v_top], (origin + top) * 0.5 + rim),
            "edge.seam",
        ));
        let f_bottom = self.alloc(tagged(
            MockShape::new(ShapeKind::Face, vec![e_bottom], origin),
            "face.bottom",
        ));
        let f_top = self.alloc(tagged(
            MockShape::new(ShapeKind::Face, vec![e_top], top),
            "face.top",
        ));
        let f_lateral = self.alloc(tagged(
            MockShape::new(ShapeKind::Face, vec![e_bottom, e_top, e_seam], (origin + top) * 0.5 + rim),
            "face.lateral",
        ));

        let bounds = Aabb::new(
            origin - Vec3::new(radius, radius, 0.0),
            top + Vec3::new(radius, radius, 0.0),
        );
        let mut solid = tagged(
            MockShape::new(ShapeKind::Solid, vec![f_bottom, f_top, f_lateral], bounds.center()),
            "solid",
        );
        solid.bounds = Some(bounds);
        self.alloc(solid)
    }

    /// Flatten compounds down to their solids
    fn solids_of(&self, handle: ShapeHandle) -> ShapeResult<Vec<ShapeHandle>> {
        let shape = self.get(handle)?;
        match shape.kind {
            ShapeKind::Solid => Ok(vec![handle]),
            ShapeKind::Compound => {
                let mut solids = Vec::new();
                for child in &shape.children {
                    solids.extend(self.solids_of(*child)?);
                }
                Ok(solids)
            }
            kind => Err(ShapeError::InvalidInput(format!(
                "expected a solid or compound, got {kind} {handle}"
            ))),
        }
    }

    fn solids_of_all(&self, handles: &[ShapeHandle]) -> ShapeResult<Vec<ShapeHandle>> {
        let mut solids = Vec::new();
        for handle in handles {
            for solid in self.solids_of(*handle)? {
                if !solids.contains(&solid) {
                    solids.push(solid);
                }
            }
        }
        Ok(solids)
    }

    fn solid_bounds(&self, solid: ShapeHandle) -> ShapeResult<Aabb> {
        self.get(solid)?
            .bounds
            .ok_or_else(|| ShapeError::InvalidInput(format!("{solid} has no bounds")))
    }

    /// Record `root` and everything below it as unchanged
    fn record_same_tree(&self, root: ShapeHandle, history: &mut BuilderHistory) {
        let mut visited = HashSet::new();
        let mut stack = vec![root];
        while let Some(handle) = stack.pop() {
            if !visited.insert(handle) {
                continue;
            }
            history.record_same(handle, handle);
            if let Some(shape) = self.shapes.get(&handle) {
                stack.extend(shape.children.iter().copied());
            }
        }
    }

    /// Copy a shape tree with fresh handles, keeping shared sub-shapes shared
    fn deep_copy(
        &mut self,
        handle: ShapeHandle,
        offset: Vec3,
        copies: &mut HashMap<ShapeHandle, ShapeHandle>,
    ) -> ShapeResult<ShapeHandle> {
        if let Some(copy) = copies.get(&handle) {
            return Ok(*copy);
        }
        let original = self.get(handle)?.clone();
        let mut children = Vec::with_capacity(original.children.len());
        for child in &original.children {
            children.push(self.deep_copy(*child, offset, copies)?);
        }
        let box_faces = original
            .box_faces
            .map(|faces| faces.map(|face| copies.get(&face).copied().unwrap_or(face)));
        let copy = MockShape {
            kind: original.kind,
            children,
            tag: None,
            point: original.point + offset,
            bounds: original.bounds.map(|b| b.translated(offset)),
            box_faces,
        };
        let copied = self.alloc(copy);
        copies.insert(handle, copied);
        Ok(copied)
    }

    fn compound(&mut self, children: Vec<ShapeHandle>) -> ShapeHandle {
        let point = children
            .first()
            .and_then(|c| self.shapes.get(c))
            .map(|s| s.point)
            .unwrap_or(Vec3::ZERO);
        self.alloc(MockShape::new(ShapeKind::Compound, children, point))
    }

    fn finish(&self, root: ShapeHandle, history: BuilderHistory) -> ShapeResult<Build> {
        Ok(Build {
            shape: root,
            topology: self.topology(root)?,
            history,
        })
    }

    fn union(
        &mut self,
        solids: &[ShapeHandle],
        history: &mut BuilderHistory,
    ) -> ShapeResult<ShapeHandle> {
        let mut faces: Vec<ShapeHandle> = Vec::new();
        let mut bounds: Option<Aabb> = None;
        for solid in solids {
            let b = self.solid_bounds(*solid)?;
            bounds = Some(match bounds {
                Some(acc) => acc.union(&b),
                None => b,
            });
            for face in &self.get(*solid)?.children {
                if !faces.contains(face) {
                    faces.push(*face);
                    self.record_same_tree(*face, history);
                }
            }
        }
        let bounds = bounds.ok_or_else(|| ShapeError::InvalidInput("union needs inputs".into()))?;

        let mut shape = MockShape::new(ShapeKind::Solid, faces, bounds.center());
        shape.bounds = Some(bounds);
        let result = self.alloc(shape);
        for solid in solids {
            history.record_modified(result, *solid);
        }
        Ok(result)
    }

    fn subtract(
        &mut self,
        targets: &[ShapeHandle],
        tools: &[ShapeHandle],
        history: &mut BuilderHistory,
    ) -> ShapeResult<Vec<ShapeHandle>> {
        let mut pieces = Vec::new();
        for target in targets {
            let bounds = self.solid_bounds(*target)?;
            let mut cut = None;
            if let Some(target_faces) = self.get(*target)?.box_faces {
                for tool in tools {
                    let tool_bounds = self.solid_bounds(*tool)?;
                    if let (Some(axis), Some(tool_faces)) =
                        (bounds.split_axis(&tool_bounds), self.get(*tool)?.box_faces)
                    {
                        cut = Some(Cut {
                            axis,
                            tool: tool_bounds,
                            target_faces,
                            tool_faces,
                        });
                        break;
                    }
                }
            }
            match cut {
                Some(cut) => pieces.extend(self.split(*target, bounds, &cut, history)),
                None => pieces.push(self.pocket(*target, bounds, tools, history)?),
            }
        }
        Ok(pieces)
    }

    fn split(
        &mut self,
        target: ShapeHandle,
        bounds: Aabb,
        cut: &Cut,
        history: &mut BuilderHistory,
    ) -> [ShapeHandle; 2] {
        let mut lower = bounds;
        lower.max[cut.axis] = cut.tool.min[cut.axis];
        let mut upper = bounds;
        upper.min[cut.axis] = cut.tool.max[cut.axis];

        let mut pieces = [ShapeHandle(0); 2];
        for (index, piece_bounds) in [lower, upper].into_iter().enumerate() {
            let (piece, faces) = self.build_box(piece_bounds, false);
            history.record_modified(piece, target);
            for axis in 0..3 {
                for side in 0..2 {
                    let slot = face_slot(axis, side);
                    if axis != cut.axis || side == index {
                        // side faces split across both pieces, the outer end face survives on one
                        history.record_modified(faces[slot], cut.target_faces[slot]);
                    } else {
                        // the cut face lies on the tool face looking at this piece
                        history.record_generated(faces[slot], cut.tool_faces[face_slot(axis, 1 - side)]);
                    }
                }
            }
            pieces[index] = piece;
        }
        pieces
    }

    fn pocket(
        &mut self,
        target: ShapeHandle,
        bounds: Aabb,
        tools: &[ShapeHandle],
        history: &mut BuilderHistory,
    ) -> ShapeResult<ShapeHandle> {
        let original = self.get(target)?.clone();
        let mut faces = original.children.clone();
        for face in &faces {
            self.record_same_tree(*face, history);
        }

        for tool in tools {
            let tool_bounds = self.solid_bounds(*tool)?;
            if bounds.intersection(&tool_bounds).is_none() {
                continue;
            }
            let tool_shape = self.get(*tool)?.clone();
            let inner: Vec<ShapeHandle> = match tool_shape.box_faces {
                Some(tool_faces) => (0..6)
                    .filter(|slot| {
                        let axis = slot / 2;
                        let coord = tool_bounds.side(axis, slot % 2);
                        coord > bounds.min[axis] && coord < bounds.max[axis]
                    })
                    .map(|slot| tool_faces[slot])
                    .collect(),
                None => tool_shape.children.clone(),
            };
            let mut copies = HashMap::new();
            for face in inner {
                let copy = self.deep_copy(face, Vec3::ZERO, &mut copies)?;
                history.record_generated(copy, face);
                faces.push(copy);
            }
        }

        let mut shape = MockShape::new(ShapeKind::Solid, faces, bounds.center());
        shape.bounds = Some(bounds);
        shape.box_faces = original.box_faces;
        let result = self.alloc(shape);
        history.record_modified(result, target);
        Ok(result)
    }

    fn intersect(
        &mut self,
        solids: &[ShapeHandle],
        history: &mut BuilderHistory,
    ) -> ShapeResult<ShapeHandle> {
        let mut inputs = Vec::with_capacity(solids.len());
        for solid in solids {
            inputs.push((*solid, self.solid_bounds(*solid)?, self.get(*solid)?.box_faces));
        }
        let mut overlap = inputs
            .first()
            .map(|(_, b, _)| *b)
            .ok_or_else(|| ShapeError::InvalidInput("intersection needs inputs".into()))?;
        for (_, b, _) in &inputs[1..] {
            overlap = overlap
                .intersection(b)
                .ok_or_else(|| ShapeError::KernelFailure("intersection is empty".into()))?;
        }

        let (result, faces) = self.build_box(overlap, false);
        for (solid, _, _) in &inputs {
            history.record_modified(result, *solid);
        }
        for axis in 0..3 {
            for side in 0..2 {
                let slot = face_slot(axis, side);
                let coord = overlap.side(axis, side);
                let Some((solid, _, box_faces)) =
                    inputs.iter().find(|(_, b, _)| b.side(axis, side) == coord)
                else {
                    continue;
                };
                match box_faces {
                    Some(input_faces) => history.record_modified(faces[slot], input_faces[slot]),
                    None => history.record_generated(faces[slot], *solid),
                }
            }
        }
        Ok(result)
    }

    fn blend_solid(
        &mut self,
        solid: ShapeHandle,
        edges: &[ShapeHandle],
        radius: f32,
        history: &mut BuilderHistory,
    ) -> ShapeResult<ShapeHandle> {
        let bounds = self.solid_bounds(solid)?;
        if radius * 2.0 >= bounds.size().min_element() {
            return Err(ShapeError::KernelFailure(format!(
                "blend radius {radius} is too large for {solid}"
            )));
        }

        let mut face_children = Vec::new();
        for face in &self.get(solid)?.children {
            face_children.push((*face, self.get(*face)?.children.clone()));
        }

        let mut blend_faces = Vec::with_capacity(edges.len());
        for edge in edges {
            let edge_shape = self.get(*edge)?.clone();
            let blend_face = self.alloc(MockShape::new(ShapeKind::Face, Vec::new(), edge_shape.point));
            history.record_generated(blend_face, *edge);
            history.record_deleted(*edge);

            let mut tangents = Vec::with_capacity(2);
            for (face, children) in face_children.iter_mut() {
                let Some(position) = children.iter().position(|c| c == edge) else {
                    continue;
                };
                let face_point = self.get(*face)?.point;
                let tangent = self.alloc(MockShape::new(
                    ShapeKind::Edge,
                    edge_shape.children.clone(),
                    edge_shape.point.lerp(face_point, 0.1),
                ));
                children[position] = tangent;
                tangents.push(tangent);
            }
            if let Some(shape) = self.shapes.get_mut(&blend_face) {
                shape.children = tangents;
            }
            blend_faces.push(blend_face);
        }

        let mut faces = Vec::with_capacity(face_children.len() + blend_faces.len());
        for (face, children) in face_children {
            let (original_children, point) = {
                let original = self.get(face)?;
                (original.children.clone(), original.point)
            };
            if original_children == children {
                self.record_same_tree(face, history);
                faces.push(face);
                continue;
            }
            for child in children.iter().filter(|c| original_children.contains(c)) {
                self.record_same_tree(*child, history);
            }
            let modified = self.alloc(MockShape::new(ShapeKind::Face, children, point));
            history.record_modified(modified, face);
            faces.push(modified);
        }
        faces.extend(blend_faces);

        let mut shape = MockShape::new(ShapeKind::Solid, faces, bounds.center());
        shape.bounds = Some(bounds);
        let result = self.alloc(shape);
        history.record_modified(result, solid);
        Ok(result)
    }
}

impl ShapeEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn make_box(&mut self, origin: Vec3, size: Vec3) -> ShapeResult<Build> {
        if !size.cmpgt(Vec3::ZERO).all() {
            return Err(ShapeError::KernelFailure(format!(
                "box dimensions must be positive, got {size}"
            )));
        }
        let (solid, _) = self.build_box(Aabb::new(origin, origin + size), true);
        self.finish(solid, BuilderHistory::new())
    }

    fn make_cylinder(&mut self, origin: Vec3, radius: f32, height: f32) -> ShapeResult<Build> {
        if radius <= 0.0 || height <= 0.0 {
            return Err(ShapeError::KernelFailure(format!(
                "cylinder radius and height must be positive, got {radius} and {height}"
            )));
        }
        let solid = self.build_cylinder(origin, radius, height);
        self.finish(solid, BuilderHistory::new())
    }

    fn boolean(
        &mut self,
        op: BooleanType,
        targets: &[ShapeHandle],
        tools: &[ShapeHandle],
    ) -> ShapeResult<Build> {
        if targets.is_empty() || tools.is_empty() {
            return Err(ShapeError::InvalidInput(format!(
                "{} needs at least one target and one tool",
                op.name()
            )));
        }
        let target_solids = self.solids_of_all(targets)?;
        let tool_solids = self.solids_of_all(tools)?;

        let mut history = BuilderHistory::new();
        let results = match op {
            BooleanType::Union => {
                let all: Vec<ShapeHandle> = target_solids.iter().chain(&tool_solids).copied().collect();
                vec![self.union(&all, &mut history)?]
            }
            BooleanType::Subtract => self.subtract(&target_solids, &tool_solids, &mut history)?,
            BooleanType::Intersect => {
                let all: Vec<ShapeHandle> = target_solids.iter().chain(&tool_solids).copied().collect();
                vec![self.intersect(&all, &mut history)?]
            }
        };

        let root = if results.len() == 1 {
            results[0]
        } else {
            let root = self.compound(results);
            for target in targets {
                if self.get(*target)?.kind == ShapeKind::Compound {
                    history.record_modified(root, *target);
                }
            }
            root
        };
        self.finish(root, history)
    }

    fn blend(
        &mut self,
        target: ShapeHandle,
        edges: &[ShapeHandle],
        radius: f32,
    ) -> ShapeResult<Build> {
        if edges.is_empty() {
            return Err(ShapeError::InvalidInput("blend needs at least one edge".into()));
        }
        if radius <= 0.0 {
            return Err(ShapeError::InvalidInput(format!(
                "blend radius must be positive, got {radius}"
            )));
        }

        let mut history = BuilderHistory::new();
        let mut consumed: HashSet<ShapeHandle> = HashSet::new();
        let mut results = Vec::new();
        for solid in self.solids_of(target)? {
            let mut owned: Vec<ShapeHandle> = Vec::new();
            for face in &self.get(solid)?.children {
                for edge in &self.get(*face)?.children {
                    if edges.contains(edge) && !owned.contains(edge) {
                        owned.push(*edge);
                    }
                }
            }
            if owned.is_empty() {
                self.record_same_tree(solid, &mut history);
                results.push(solid);
                continue;
            }
            consumed.extend(owned.iter().copied());
            results.push(self.blend_solid(solid, &owned, radius, &mut history)?);
        }

        if let Some(missing) = edges.iter().find(|e| !consumed.contains(*e)) {
            return Err(ShapeError::InvalidInput(format!(
                "edge {missing} is not part of {target}"
            )));
        }

        let root = if self.get(target)?.kind == ShapeKind::Solid && results.len() == 1 {
            results[0]
        } else {
            let root = self.compound(results);
            history.record_modified(root, target);
            root
        };
        self.finish(root, history)
    }

    fn instance_linear(
        &mut self,
        source: ShapeHandle,
        offset: Vec3,
        count: u32,
        include_source: bool,
    ) -> ShapeResult<Build> {
        if count == 0 {
            return Err(ShapeError::InvalidInput("instance count must be at least 1".into()));
        }
        self.get(source)?;

        let mut history = BuilderHistory::new();
        let mut children = Vec::with_capacity(count as usize);
        for index in 0..count {
            if index == 0 && include_source {
                self.record_same_tree(source, &mut history);
                children.push(source);
                continue;
            }
            let mut copies = HashMap::new();
            let copy = self.deep_copy(source, offset * index as f32, &mut copies)?;
            for (original, copied) in copies {
                history.record_instance(copied, original, index);
            }
            children.push(copy);
        }
        let root = self.compound(children);
        self.finish(root, history)
    }

    fn topology(&self, shape: ShapeHandle) -> ShapeResult<Topology> {
        let mut nodes = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![shape];
        while let Some(handle) = stack.pop() {
            if !visited.insert(handle) {
                continue;
            }
            let mock = self.get(handle)?;
            stack.extend(mock.children.iter().copied());
            let mut node = TopoNode::new(handle, mock.kind, mock.children.clone()).with_point(mock.point);
            node.tag = mock.tag.clone();
            nodes.push(node);
        }
        Topology::new(shape, nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tagged(build: &Build, tag: &str) -> ShapeHandle {
        build
            .topology
            .sub_shapes()
            .find(|n| n.tag.as_deref() == Some(tag))
            .map(|n| n.shape)
            .unwrap()
    }

    fn count(build: &Build, kind: ShapeKind) -> usize {
        build.topology.of_kind(kind).count()
    }

    #[test]
    fn test_box_topology() {
        let mut engine = MockEngine::new();
        let build = engine.make_box(Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0)).unwrap();

        assert_eq!(count(&build, ShapeKind::Solid), 1);
        assert_eq!(count(&build, ShapeKind::Face), 6);
        assert_eq!(count(&build, ShapeKind::Edge), 12);
        assert_eq!(count(&build, ShapeKind::Vertex), 8);
        assert!(build.history.is_empty());

        for edge in build.topology.of_kind(ShapeKind::Edge) {
            assert_eq!(build.topology.parents(edge.shape).len(), 2);
            assert_eq!(edge.children.len(), 2);
        }

        let tags: HashSet<&str> = build
            .topology
            .sub_shapes()
            .filter_map(|n| n.tag.as_deref())
            .collect();
        assert_eq!(tags.len(), 27);

        let top = tagged(&build, "face.zmax");
        let point = engine.point(top).unwrap();
        assert_relative_eq!(point.z, 3.0);
        assert_relative_eq!(point.x, 0.5);
    }

    #[test]
    fn test_box_rejects_bad_size() {
        let mut engine = MockEngine::new();
        let result = engine.make_box(Vec3::ZERO, Vec3::new(1.0, 0.0, 1.0));
        assert!(matches!(result, Err(ShapeError::KernelFailure(_))));
    }

    #[test]
    fn test_cylinder_topology() {
        let mut engine = MockEngine::new();
        let build = engine.make_cylinder(Vec3::ZERO, 1.0, 4.0).unwrap();
        assert_eq!(count(&build, ShapeKind::Face), 3);
        assert_eq!(count(&build, ShapeKind::Edge), 3);
        assert_eq!(count(&build, ShapeKind::Vertex), 2);

        let bounds = engine.bounds(build.shape).unwrap();
        assert_relative_eq!(bounds.size().x, 2.0);
        assert_relative_eq!(bounds.size().z, 4.0);
    }

    #[test]
    fn test_union_keeps_faces_and_merges_solids() {
        let mut engine = MockEngine::new();
        let a = engine.make_box(Vec3::ZERO, Vec3::ONE).unwrap();
        let b = engine.make_box(Vec3::splat(0.5), Vec3::ONE).unwrap();
        let result = engine
            .boolean(BooleanType::Union, &[a.shape], &[b.shape])
            .unwrap();

        assert_eq!(count(&result, ShapeKind::Face), 12);
        let a_face = tagged(&a, "face.xmin");
        assert!(result.topology.contains(a_face));
        assert_eq!(result.history.same_as(a_face), Some(a_face));
        assert_eq!(result.history.modified_from(result.shape), &[a.shape, b.shape]);
    }

    #[test]
    fn test_subtract_slab_splits_target() {
        let mut engine = MockEngine::new();
        let target = engine.make_box(Vec3::ZERO, Vec3::splat(10.0)).unwrap();
        let tool = engine
            .make_box(Vec3::new(4.0, -1.0, -1.0), Vec3::new(2.0, 12.0, 12.0))
            .unwrap();
        let result = engine
            .boolean(BooleanType::Subtract, &[target.shape], &[tool.shape])
            .unwrap();

        assert_eq!(result.topology.kind(result.shape), Some(ShapeKind::Compound));
        let pieces = result.topology.children(result.shape).to_vec();
        assert_eq!(pieces.len(), 2);
        for piece in &pieces {
            assert_eq!(result.history.modified_from(*piece), &[target.shape]);
        }
        let lower = engine.bounds(pieces[0]).unwrap();
        assert_relative_eq!(lower.max.x, 4.0);
        let upper = engine.bounds(pieces[1]).unwrap();
        assert_relative_eq!(upper.min.x, 6.0);

        // the bottom face is split into one face per piece
        let bottom = tagged(&target, "face.zmin");
        let from_bottom: Vec<_> = result
            .topology
            .of_kind(ShapeKind::Face)
            .filter(|n| result.history.modified_from(n.shape).contains(&bottom))
            .collect();
        assert_eq!(from_bottom.len(), 2);

        // each cut face comes from the tool face looking at it
        let tool_xmin = tagged(&tool, "face.xmin");
        let cut: Vec<_> = result
            .topology
            .of_kind(ShapeKind::Face)
            .filter(|n| result.history.generated_from(n.shape).contains(&tool_xmin))
            .collect();
        assert_eq!(cut.len(), 1);
        assert_relative_eq!(engine.point(cut[0].shape).unwrap().x, 4.0);
    }

    #[test]
    fn test_subtract_pocket_generates_tool_faces() {
        let mut engine = MockEngine::new();
        let target = engine.make_box(Vec3::ZERO, Vec3::splat(10.0)).unwrap();
        let tool = engine
            .make_box(Vec3::new(2.0, 2.0, 8.0), Vec3::new(2.0, 2.0, 5.0))
            .unwrap();
        let result = engine
            .boolean(BooleanType::Subtract, &[target.shape], &[tool.shape])
            .unwrap();

        assert_eq!(result.topology.kind(result.shape), Some(ShapeKind::Solid));
        // 6 target faces kept, 5 tool faces inside (the tool's top sticks out)
        assert_eq!(count(&result, ShapeKind::Face), 11);
        let top = tagged(&target, "face.zmax");
        assert_eq!(result.history.same_as(top), Some(top));
        let generated = result
            .topology
            .of_kind(ShapeKind::Face)
            .filter(|n| !result.history.generated_from(n.shape).is_empty())
            .count();
        assert_eq!(generated, 5);
    }

    #[test]
    fn test_intersect() {
        let mut engine = MockEngine::new();
        let a = engine.make_box(Vec3::ZERO, Vec3::splat(2.0)).unwrap();
        let b = engine.make_box(Vec3::ONE, Vec3::splat(2.0)).unwrap();
        let result = engine
            .boolean(BooleanType::Intersect, &[a.shape], &[b.shape])
            .unwrap();
        let bounds = engine.bounds(result.shape).unwrap();
        assert_relative_eq!(bounds.min.x, 1.0);
        assert_relative_eq!(bounds.max.x, 2.0);

        let a_max = tagged(&a, "face.xmax");
        let b_min = tagged(&b, "face.xmin");
        let faces: Vec<_> = result.topology.of_kind(ShapeKind::Face).map(|n| n.shape).collect();
        assert!(faces.iter().any(|f| result.history.modified_from(*f) == [a_max]));
        assert!(faces.iter().any(|f| result.history.modified_from(*f) == [b_min]));

        let far = engine.make_box(Vec3::splat(10.0), Vec3::ONE).unwrap();
        let empty = engine.boolean(BooleanType::Intersect, &[a.shape], &[far.shape]);
        assert!(matches!(empty, Err(ShapeError::KernelFailure(_))));
    }

    #[test]
    fn test_blend_edge() {
        let mut engine = MockEngine::new();
        let target = engine.make_box(Vec3::ZERO, Vec3::splat(10.0)).unwrap();
        let edge = tagged(&target, "edge.xmax.zmax");
        let result = engine.blend(target.shape, &[edge], 1.0).unwrap();

        assert!(result.history.is_deleted(edge));
        assert!(!result.topology.contains(edge));
        assert_eq!(count(&result, ShapeKind::Face), 7);
        assert_eq!(count(&result, ShapeKind::Edge), 13);

        let blend_face = result
            .topology
            .of_kind(ShapeKind::Face)
            .find(|n| result.history.generated_from(n.shape) == [edge])
            .unwrap();
        assert_eq!(blend_face.children.len(), 2);

        let xmax = tagged(&target, "face.xmax");
        let modified = result
            .topology
            .of_kind(ShapeKind::Face)
            .filter(|n| result.history.modified_from(n.shape) == [xmax])
            .count();
        assert_eq!(modified, 1);
        let bottom = tagged(&target, "face.zmin");
        assert!(result.topology.contains(bottom));
    }

    #[test]
    fn test_blend_failures() {
        let mut engine = MockEngine::new();
        let target = engine.make_box(Vec3::ZERO, Vec3::splat(2.0)).unwrap();
        let other = engine.make_box(Vec3::ZERO, Vec3::splat(2.0)).unwrap();
        let edge = tagged(&target, "edge.xmin.ymin");

        let too_big = engine.blend(target.shape, &[edge], 1.5);
        assert!(matches!(too_big, Err(ShapeError::KernelFailure(_))));

        let foreign = tagged(&other, "edge.xmin.ymin");
        let wrong = engine.blend(target.shape, &[foreign], 0.1);
        assert!(matches!(wrong, Err(ShapeError::InvalidInput(_))));
    }

    #[test]
    fn test_instance_linear() {
        let mut engine = MockEngine::new();
        let source = engine.make_box(Vec3::ZERO, Vec3::ONE).unwrap();
        let result = engine
            .instance_linear(source.shape, Vec3::X * 3.0, 3, true)
            .unwrap();

        let instances = result.topology.children(result.shape).to_vec();
        assert_eq!(instances.len(), 3);
        assert_eq!(instances[0], source.shape);
        assert_eq!(result.history.same_as(source.shape), Some(source.shape));
        assert_eq!(result.history.instance_of(instances[2]), Some((source.shape, 2)));

        let bounds = engine.bounds(instances[2]).unwrap();
        assert_relative_eq!(bounds.min.x, 6.0);
        assert_eq!(count(&result, ShapeKind::Face), 18);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let run = || {
            let mut engine = MockEngine::new();
            let a = engine.make_box(Vec3::ZERO, Vec3::splat(4.0)).unwrap();
            let b = engine.make_cylinder(Vec3::splat(1.0), 0.5, 6.0).unwrap();
            let c = engine
                .boolean(BooleanType::Subtract, &[a.shape], &[b.shape])
                .unwrap();
            c.topology.sub_shapes().map(|n| n.shape).collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }
}
