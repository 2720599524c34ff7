//! Animation Target Seam
//!
//! This module defines [`AnimationGraph`], the trait a host scene structure
//! implements so the animation runtime can resolve track paths against it and
//! read or write animated properties.
//!
//! # Overview
//!
//! The runtime never owns the animated objects. It addresses them through two
//! opaque handle types chosen by the host:
//!
//! - `Obj`: one animatable object (a node, a material, a texture, a bone)
//! - `Prop`: one resolved property slot on such an object
//!
//! Binding walks the graph once (name lookup, sub-object descent, property
//! resolution) and afterwards touches the host only through `read`/`write`
//! calls on the resolved pair, so the per-frame cost does not depend on the
//! shape of the host structure.
//!
//! # Value model
//!
//! All numeric properties cross this boundary as flat `f32` spans:
//! a scalar is one value, a color three, a quaternion four, a morph weight
//! array as many as it has targets. Boolean properties use `0.0` / `1.0`
//! (anything non-zero reads back as true). String-valued properties go
//! through the separate text channel.

use std::fmt::Debug;
use std::hash::Hash;

/// The shape of a resolved property, as reported by
/// [`AnimationGraph::resolve_property`].
///
/// The shape decides how a binding moves data for that property:
/// whole-value copies, per-element access, or the text channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyShape {
    /// A single number or boolean. One `f32` crosses the boundary.
    Scalar,
    /// A fixed-size composite value (a vector, a color, a quaternion)
    /// exchanged as `size` consecutive components.
    Convertible {
        /// Component count of the composite value.
        size: usize,
    },
    /// An indexable array of numbers, `len` elements long. Bindings may
    /// address the whole array or a single element of it.
    Array {
        /// Current element count of the array.
        len: usize,
    },
    /// A string-valued property, served by [`AnimationGraph::read_text`] and
    /// [`AnimationGraph::write_text`].
    Text,
}

impl PropertyShape {
    /// Number of `f32` components a whole-value transfer of this shape moves.
    /// Text shapes report zero.
    #[inline]
    #[must_use]
    pub fn span(&self) -> usize {
        match self {
            PropertyShape::Scalar => 1,
            PropertyShape::Convertible { size } => *size,
            PropertyShape::Array { len } => *len,
            PropertyShape::Text => 0,
        }
    }
}

/// Which change flag a property write must bump on the host.
///
/// Classified per object at bind time and applied by every subsequent write
/// through that binding, so hosts with dirty-flag update schemes (material
/// re-upload, world matrix recomputation) observe animated writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Versioning {
    /// No flag to bump.
    #[default]
    None,
    /// Bump via [`AnimationGraph::mark_needs_update`] (materials, textures).
    NeedsUpdate,
    /// Bump via [`AnimationGraph::mark_world_matrix_dirty`] (node transforms).
    WorldMatrix,
}

/// Host-side scene access for the animation runtime.
///
/// Only `name_of`, `children_of`, `resolve_property`, `read` and `write` are
/// required; everything else has a refusing or no-op default so a host exposes
/// exactly the capabilities it has. A default that stays unimplemented simply
/// means track paths needing that capability fail to bind (reported once,
/// then ignored).
pub trait AnimationGraph {
    /// Handle to an animatable object.
    type Obj: Copy + Eq + Hash + Debug;
    /// Handle to a resolved property slot on an object.
    type Prop: Copy;

    // ========================================================================
    // Discovery
    // ========================================================================

    /// Returns the name of an object, if it has one. Node names are what
    /// track paths match against.
    fn name_of(&self, obj: Self::Obj) -> Option<&str>;

    /// Appends the children of `obj` to `out`, in order. Leaf objects append
    /// nothing.
    fn children_of(&self, obj: Self::Obj, out: &mut Vec<Self::Obj>);

    /// Looks up a bone by name in the skeleton attached to `root`, if any.
    /// Consulted before the subtree walk so skinned hierarchies resolve bone
    /// tracks without the bones being graph children.
    fn find_bone(&self, _root: Self::Obj, _name: &str) -> Option<Self::Obj> {
        None
    }

    // ========================================================================
    // Sub-object access
    // ========================================================================

    /// The material of a renderable object (the `.material` hop).
    fn material_of(&self, _obj: Self::Obj) -> Option<Self::Obj> {
        None
    }

    /// One material of a multi-material object (the `.materials[i]` hop).
    fn material_in_slot(&self, _obj: Self::Obj, _index: usize) -> Option<Self::Obj> {
        None
    }

    /// A bone of the skeleton attached to `obj`, by index (the `.bones[i]`
    /// hop).
    fn bone_at(&self, _obj: Self::Obj, _index: usize) -> Option<Self::Obj> {
        None
    }

    /// Resolves a bone name to its index in the skeleton attached to `obj`,
    /// so `.bones[Head]` style paths can address bones symbolically.
    fn bone_index(&self, _obj: Self::Obj, _name: &str) -> Option<usize> {
        None
    }

    /// The color texture reachable from `obj` (the `.map` hop). Hosts
    /// typically route this through the object's material.
    fn texture_map_of(&self, _obj: Self::Obj) -> Option<Self::Obj> {
        None
    }

    /// Resolves a symbolic array index (a morph target name) to its position
    /// in the named array property.
    fn named_element_index(
        &self,
        _obj: Self::Obj,
        _property: &str,
        _name: &str,
    ) -> Option<usize> {
        None
    }

    // ========================================================================
    // Properties
    // ========================================================================

    /// Resolves a property name on an object to a property handle and its
    /// shape. `None` means the object has no such animatable property.
    fn resolve_property(&self, obj: Self::Obj, name: &str) -> Option<(Self::Prop, PropertyShape)>;

    /// Reads the current value of a property into `out`. Fills
    /// `min(out.len(), span)` components and leaves the rest untouched.
    fn read(&self, obj: Self::Obj, prop: Self::Prop, out: &mut [f32]);

    /// Writes a property from `values`. Hosts consume
    /// `min(values.len(), span)` components.
    fn write(&mut self, obj: Self::Obj, prop: Self::Prop, values: &[f32]);

    /// Reads one element of an array-shaped property. Hosts whose
    /// `resolve_property` reports [`PropertyShape::Array`] override this;
    /// the default returns `0.0`.
    fn read_element(&self, _obj: Self::Obj, _prop: Self::Prop, _index: usize) -> f32 {
        0.0
    }

    /// Writes one element of an array-shaped property. Hosts whose
    /// `resolve_property` reports [`PropertyShape::Array`] override this;
    /// the default drops the write.
    fn write_element(&mut self, _obj: Self::Obj, _prop: Self::Prop, _index: usize, _value: f32) {}

    /// Reads a string-valued property into `out` (cleared first). Hosts whose
    /// `resolve_property` reports [`PropertyShape::Text`] override this.
    fn read_text(&self, _obj: Self::Obj, _prop: Self::Prop, out: &mut String) {
        out.clear();
    }

    /// Writes a string-valued property.
    fn write_text(&mut self, _obj: Self::Obj, _prop: Self::Prop, _value: &str) {}

    // ========================================================================
    // Change flags
    // ========================================================================

    /// Which change flag writes to properties of `obj` must bump.
    fn versioning(&self, _obj: Self::Obj) -> Versioning {
        Versioning::None
    }

    /// Bump hook for [`Versioning::NeedsUpdate`] objects.
    fn mark_needs_update(&mut self, _obj: Self::Obj) {}

    /// Bump hook for [`Versioning::WorldMatrix`] objects.
    fn mark_world_matrix_dirty(&mut self, _obj: Self::Obj) {}
}
