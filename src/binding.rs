//! Property Bindings
//!
//! This module connects parsed track paths to live properties on a host
//! scene: [`PropertyBinding`] resolves one path against one root object,
//! [`CompositeBinding`] fans a path out over an [`ObjectGroup`] so a single
//! track can drive many objects uniformly.
//!
//! # Overview
//!
//! Binding is lazy and never fatal. A fresh binding holds only the root and
//! the parsed path; the first read or write resolves it against the
//! [`AnimationGraph`]. Resolution walks three steps:
//!
//! 1. **Node lookup**: the root itself (empty node name, `"."`, or a name
//!    match), then the skeleton's named bones, then a depth-first search of
//!    the child hierarchy.
//! 2. **Object descent**: when the path carries an allow-listed object
//!    segment (`material`, `materials[i]`, `bones[i]`, `map`), the target is
//!    redirected into that sub-object. Bone indices may be names, resolved
//!    through the host's bone dictionary before falling back to a number.
//! 3. **Property resolution**: the host maps the property name to a handle
//!    and a [`PropertyShape`], which classifies the binding into a
//!    [`BindMode`] and pairs it with the object's [`Versioning`] flag.
//!
//! Any failing step logs one warning and leaves the binding **broken**: all
//! further reads and writes are no-ops until [`PropertyBinding::unbind`]
//! returns it to the lazy initial state. One broken binding never stops the
//! rest of a clip from animating.

use crate::errors::Result;
use crate::path::TrackPath;
use crate::target::{AnimationGraph, PropertyShape, Versioning};

// ============================================================================
// Node lookup
// ============================================================================

/// Resolves a node name against a root object: the root itself for an empty
/// name, `"."` or a name match, then the skeleton's named bones, then a
/// depth-first search of the children.
#[must_use]
pub fn find_node<G: AnimationGraph>(graph: &G, root: G::Obj, name: &str) -> Option<G::Obj> {
    if name.is_empty() || name == "." || graph.name_of(root) == Some(name) {
        return Some(root);
    }
    if let Some(bone) = graph.find_bone(root, name) {
        return Some(bone);
    }

    let mut scratch: Vec<G::Obj> = Vec::new();
    let mut stack: Vec<G::Obj> = Vec::new();
    graph.children_of(root, &mut scratch);
    stack.extend(scratch.iter().rev().copied());
    while let Some(node) = stack.pop() {
        if graph.name_of(node) == Some(name) {
            return Some(node);
        }
        scratch.clear();
        graph.children_of(node, &mut scratch);
        stack.extend(scratch.iter().rev().copied());
    }
    None
}

// ============================================================================
// Resolved slots
// ============================================================================

/// How a bound property is accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    /// A lone scalar.
    Direct,
    /// A whole array property.
    EntireArray,
    /// One element of an array property.
    ArrayElement,
    /// A composite value exchanged as flat components.
    Convertible,
    /// A string property, served by the text channel.
    Text,
}

/// A successfully resolved binding target. The hot read/write path is a
/// match over `(mode, versioning)`, two copy enums fixed at bind time.
struct ResolvedSlot<G: AnimationGraph> {
    target: G::Obj,
    prop: G::Prop,
    mode: BindMode,
    versioning: Versioning,
    element: usize,
}

impl<G: AnimationGraph> ResolvedSlot<G> {
    fn get(&self, graph: &G, out: &mut [f32]) {
        match self.mode {
            BindMode::ArrayElement => {
                if let Some(first) = out.first_mut() {
                    *first = graph.read_element(self.target, self.prop, self.element);
                }
            }
            // Whole-value shapes share the flat transfer.
            BindMode::Direct | BindMode::EntireArray | BindMode::Convertible => {
                graph.read(self.target, self.prop, out);
            }
            BindMode::Text => {}
        }
    }

    fn set(&self, graph: &mut G, values: &[f32]) {
        match self.mode {
            BindMode::ArrayElement => {
                if let Some(&value) = values.first() {
                    graph.write_element(self.target, self.prop, self.element, value);
                }
            }
            BindMode::Direct | BindMode::EntireArray | BindMode::Convertible => {
                graph.write(self.target, self.prop, values);
            }
            BindMode::Text => return,
        }
        self.touch(graph);
    }

    fn get_text(&self, graph: &G, out: &mut String) {
        if self.mode == BindMode::Text {
            graph.read_text(self.target, self.prop, out);
        }
    }

    fn set_text(&self, graph: &mut G, value: &str) {
        if self.mode == BindMode::Text {
            graph.write_text(self.target, self.prop, value);
            self.touch(graph);
        }
    }

    fn touch(&self, graph: &mut G) {
        match self.versioning {
            Versioning::None => {}
            Versioning::NeedsUpdate => graph.mark_needs_update(self.target),
            Versioning::WorldMatrix => graph.mark_world_matrix_dirty(self.target),
        }
    }
}

// ============================================================================
// PropertyBinding
// ============================================================================

enum BindState<G: AnimationGraph> {
    Unbound,
    Bound(ResolvedSlot<G>),
    Broken,
}

/// A lazy connection from one track path to one property on one root.
pub struct PropertyBinding<G: AnimationGraph> {
    root: G::Obj,
    path: String,
    parsed: TrackPath,
    state: BindState<G>,
}

impl<G: AnimationGraph> PropertyBinding<G> {
    /// Creates an unbound binding for `path` under `root`. Fails only on a
    /// malformed path; resolution happens on first use.
    pub fn new(root: G::Obj, path: &str) -> Result<Self> {
        Ok(Self::from_parts(root, path.to_string(), TrackPath::parse(path)?))
    }

    /// Creates a binding from an already-parsed path.
    pub(crate) fn from_parts(root: G::Obj, path: String, parsed: TrackPath) -> Self {
        Self {
            root,
            path,
            parsed,
            state: BindState::Unbound,
        }
    }

    /// The root object this binding resolves under.
    #[inline]
    #[must_use]
    pub fn root(&self) -> G::Obj {
        self.root
    }

    /// The original path string.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The parsed form of the path.
    #[inline]
    #[must_use]
    pub fn parsed(&self) -> &TrackPath {
        &self.parsed
    }

    /// Whether the binding currently targets a live property.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        matches!(self.state, BindState::Bound(_))
    }

    /// Whether resolution failed and the binding is a no-op.
    #[must_use]
    pub fn is_broken(&self) -> bool {
        matches!(self.state, BindState::Broken)
    }

    /// Resolves the binding now. A failure is logged once and leaves the
    /// binding broken.
    pub fn bind(&mut self, graph: &G) {
        self.state = match self.resolve(graph) {
            Some(slot) => BindState::Bound(slot),
            None => BindState::Broken,
        };
    }

    /// Returns the binding to its lazy initial state, so it re-resolves on
    /// next use (after a scene change, for instance).
    pub fn unbind(&mut self) {
        self.state = BindState::Unbound;
    }

    fn ensure(&mut self, graph: &G) {
        if matches!(self.state, BindState::Unbound) {
            self.bind(graph);
        }
    }

    /// Reads the bound property into `out`. Unresolvable bindings leave
    /// `out` untouched.
    pub fn get_value(&mut self, graph: &G, out: &mut [f32]) {
        self.ensure(graph);
        if let BindState::Bound(slot) = &self.state {
            slot.get(graph, out);
        }
    }

    /// Writes `values` to the bound property and bumps the host's change
    /// flag per the bind-time versioning classification.
    pub fn set_value(&mut self, graph: &mut G, values: &[f32]) {
        self.ensure(graph);
        if let BindState::Bound(slot) = &self.state {
            slot.set(graph, values);
        }
    }

    /// Reads a string-valued property into `out`.
    pub fn get_text(&mut self, graph: &G, out: &mut String) {
        self.ensure(graph);
        if let BindState::Bound(slot) = &self.state {
            slot.get_text(graph, out);
        }
    }

    /// Writes a string-valued property.
    pub fn set_text(&mut self, graph: &mut G, value: &str) {
        self.ensure(graph);
        if let BindState::Bound(slot) = &self.state {
            slot.set_text(graph, value);
        }
    }

    fn resolve(&self, graph: &G) -> Option<ResolvedSlot<G>> {
        let Some(node) = find_node(graph, self.root, &self.parsed.node) else {
            log::warn!(
                "binding '{}': no node '{}' under root {:?}",
                self.path,
                self.parsed.node,
                self.root
            );
            return None;
        };

        let target = match self.parsed.object.as_deref() {
            Some(object) => self.descend(graph, node, object)?,
            None => node,
        };

        let Some((prop, shape)) = graph.resolve_property(target, &self.parsed.property) else {
            log::warn!(
                "binding '{}': {:?} has no animatable property '{}'",
                self.path,
                target,
                self.parsed.property
            );
            return None;
        };

        let (mode, element) = match self.parsed.property_index.as_deref() {
            Some(index) => {
                // Symbolic indices (morph target names) resolve through the
                // host's dictionary before the numeric reading applies.
                let element = graph
                    .named_element_index(target, &self.parsed.property, index)
                    .or_else(|| index.parse().ok());
                let Some(element) = element else {
                    log::warn!(
                        "binding '{}': index '{}' does not resolve on property '{}'",
                        self.path,
                        index,
                        self.parsed.property
                    );
                    return None;
                };
                if let PropertyShape::Array { len } = shape {
                    if element >= len {
                        log::warn!(
                            "binding '{}': index {element} is out of bounds for '{}' of length {len}",
                            self.path,
                            self.parsed.property
                        );
                        return None;
                    }
                }
                (BindMode::ArrayElement, element)
            }
            None => {
                let mode = match shape {
                    PropertyShape::Scalar => BindMode::Direct,
                    PropertyShape::Convertible { .. } => BindMode::Convertible,
                    PropertyShape::Array { .. } => BindMode::EntireArray,
                    PropertyShape::Text => BindMode::Text,
                };
                (mode, 0)
            }
        };

        log::debug!("binding '{}' resolved as {mode:?} on {target:?}", self.path);
        Some(ResolvedSlot {
            target,
            prop,
            mode,
            versioning: graph.versioning(target),
            element,
        })
    }

    fn descend(&self, graph: &G, node: G::Obj, object: &str) -> Option<G::Obj> {
        let index = self.parsed.object_index.as_deref();
        let resolved = match (object, index) {
            ("material", None) => graph.material_of(node),
            ("materials", Some(index)) => index
                .parse()
                .ok()
                .and_then(|i| graph.material_in_slot(node, i)),
            ("bones", Some(index)) => graph
                .bone_index(node, index)
                .or_else(|| index.parse().ok())
                .and_then(|i| graph.bone_at(node, i)),
            ("map", None) => graph.texture_map_of(node),
            _ => None,
        };
        if resolved.is_none() {
            log::warn!(
                "binding '{}': can not resolve object '{}{}' on {:?}",
                self.path,
                object,
                index.map(|i| format!("[{i}]")).unwrap_or_default(),
                node
            );
        }
        resolved
    }
}

// ============================================================================
// Object groups & composite bindings
// ============================================================================

/// A shared collection of root objects animated in unison. Mutations bump a
/// generation counter so composite bindings rebuild their member list lazily.
pub struct ObjectGroup<G: AnimationGraph> {
    members: Vec<G::Obj>,
    generation: u64,
}

impl<G: AnimationGraph> ObjectGroup<G> {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self {
            members: Vec::new(),
            generation: 0,
        }
    }

    /// Creates a group over the given members.
    #[must_use]
    pub fn from_members(members: Vec<G::Obj>) -> Self {
        Self {
            members,
            generation: 0,
        }
    }

    /// Adds a member. No effect if already present.
    pub fn add(&mut self, obj: G::Obj) {
        if !self.members.contains(&obj) {
            self.members.push(obj);
            self.generation += 1;
        }
    }

    /// Removes a member, preserving the order of the rest. Returns whether
    /// it was present.
    pub fn remove(&mut self, obj: G::Obj) -> bool {
        let before = self.members.len();
        self.members.retain(|&m| m != obj);
        if self.members.len() != before {
            self.generation += 1;
            true
        } else {
            false
        }
    }

    /// The current members, in insertion order.
    #[inline]
    #[must_use]
    pub fn members(&self) -> &[G::Obj] {
        &self.members
    }

    /// Bumped on every membership change.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl<G: AnimationGraph> Default for ObjectGroup<G> {
    fn default() -> Self {
        Self::new()
    }
}

/// One track path bound across every member of an [`ObjectGroup`]: reads
/// come from the first member that resolves, writes fan out to all members.
pub struct CompositeBinding<G: AnimationGraph> {
    path: String,
    parsed: TrackPath,
    bindings: Vec<PropertyBinding<G>>,
    seen_generation: u64,
}

impl<G: AnimationGraph> CompositeBinding<G> {
    /// Creates a composite binding for `path`. Fails only on a malformed
    /// path.
    pub fn new(path: &str) -> Result<Self> {
        Ok(Self::from_parts(path.to_string(), TrackPath::parse(path)?))
    }

    /// Builds from a path that was already parsed elsewhere.
    pub(crate) fn from_parts(path: String, parsed: TrackPath) -> Self {
        Self {
            path,
            parsed,
            bindings: Vec::new(),
            // forces the first refresh against any group
            seen_generation: u64::MAX,
        }
    }

    /// The path string this composite resolves.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    fn refresh(&mut self, group: &ObjectGroup<G>) {
        if self.seen_generation != group.generation() {
            self.bindings = group
                .members()
                .iter()
                .map(|&member| {
                    PropertyBinding::from_parts(member, self.path.clone(), self.parsed.clone())
                })
                .collect();
            self.seen_generation = group.generation();
        }
    }

    /// Reads from the first member whose binding resolves.
    pub fn get_value(&mut self, group: &ObjectGroup<G>, graph: &G, out: &mut [f32]) {
        self.refresh(group);
        for binding in &mut self.bindings {
            binding.ensure(graph);
            if binding.is_bound() {
                binding.get_value(graph, out);
                return;
            }
        }
    }

    /// Writes to every member.
    pub fn set_value(&mut self, group: &ObjectGroup<G>, graph: &mut G, values: &[f32]) {
        self.refresh(group);
        for binding in &mut self.bindings {
            binding.set_value(graph, values);
        }
    }

    /// Reads a string property from the first member whose binding resolves.
    pub fn get_text(&mut self, group: &ObjectGroup<G>, graph: &G, out: &mut String) {
        self.refresh(group);
        for binding in &mut self.bindings {
            binding.ensure(graph);
            if binding.is_bound() {
                binding.get_text(graph, out);
                return;
            }
        }
    }

    /// Writes a string property to every member.
    pub fn set_text(&mut self, group: &ObjectGroup<G>, graph: &mut G, value: &str) {
        self.refresh(group);
        for binding in &mut self.bindings {
            binding.set_text(graph, value);
        }
    }

    /// Resolves every member's binding now.
    pub fn bind(&mut self, group: &ObjectGroup<G>, graph: &G) {
        self.refresh(group);
        for binding in &mut self.bindings {
            binding.bind(graph);
        }
    }

    /// Returns every member's binding to the lazy initial state.
    pub fn unbind(&mut self) {
        for binding in &mut self.bindings {
            binding.unbind();
        }
    }
}
