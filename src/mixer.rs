//! Animation Mixing
//!
//! This module implements [`AnimationMixer`], the per-scene player that owns
//! every [`AnimationAction`], advances them all with one `update` call per
//! frame, and blends their weighted samples into the target graph's
//! properties.
//!
//! # Overview
//!
//! Each animated property is backed by exactly one mix slot, shared by every
//! action that touches the same `(root, track path)` pair. A slot couples a
//! resolved binding with a [`PropertyMixer`] (or a [`TextMixer`] for string
//! tracks), the small accumulator that implements weighted blending:
//!
//! 1. While actions advance, each one folds its sample into the slot with
//!    [`PropertyMixer::accumulate`] (or the additive variant). Contributions
//!    are normalized progressively, so the result never depends on action
//!    order beyond floating-point rounding.
//! 2. After all actions ran, [`PropertyMixer::apply`] tops the blend up with
//!    the property's unanimated rest value when the accumulated weight is
//!    short of one, folds in the additive sum, and reports whether the result
//!    changed since the previous frame. Only changed slots write back to the
//!    graph.
//!
//! The mixer captures a property's rest value the first time an action using
//! it becomes active and restores it once no active action uses it anymore,
//! so stopping all animation returns the graph to its unanimated pose.
//!
//! Actions, slots and object groups live in slot maps; the handles this
//! module exports stay valid until the entry is explicitly discarded. Loop
//! and finish notifications are queued as [`MixerEvent`]s and collected with
//! [`AnimationMixer::take_events`].

use glam::Quat;
use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};
use uuid::Uuid;

use crate::action::AnimationAction;
use crate::binding::{CompositeBinding, ObjectGroup, PropertyBinding};
use crate::clip::AnimationClip;
use crate::errors::Result;
use crate::path::TrackPath;
use crate::target::AnimationGraph;
use crate::track::TrackKind;

new_key_type! {
    /// Stable handle to an action owned by an [`AnimationMixer`].
    pub struct ActionHandle;
    /// Stable handle to an [`ObjectGroup`] registered with a mixer.
    pub struct GroupHandle;
}

new_key_type! {
    pub(crate) struct SlotKey;
}

/// A playback notification queued during [`AnimationMixer::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixerEvent {
    /// An action crossed one or more loop boundaries this frame.
    Loop {
        action: ActionHandle,
        /// Whole loops crossed, negative when playing backwards.
        loop_delta: i32,
    },
    /// An action ran out of repetitions and stopped advancing.
    Finished {
        action: ActionHandle,
        /// `1` when the action finished past its end, `-1` past its start.
        direction: i32,
    },
}

// ============================================================================
// Blend kernels
// ============================================================================

/// The blending rule a [`PropertyMixer`] applies when folding samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixKernel {
    /// Component-wise linear blend, for every plain numeric kind.
    Lerp,
    /// Spherical blend treating each four components as a quaternion.
    Slerp,
    /// Winner-takes-all switch, for flags that must never average.
    Select,
}

impl MixKernel {
    /// The kernel a track of `kind` blends with.
    #[must_use]
    pub fn for_kind(kind: TrackKind) -> Self {
        match kind {
            TrackKind::Quaternion => MixKernel::Slerp,
            TrackKind::Boolean | TrackKind::String => MixKernel::Select,
            _ => MixKernel::Lerp,
        }
    }
}

#[inline]
fn quat_at(buf: &[f32], i: usize) -> Quat {
    Quat::from_xyzw(buf[i], buf[i + 1], buf[i + 2], buf[i + 3])
}

#[inline]
fn put_quat(buf: &mut [f32], i: usize, q: Quat) {
    buf[i] = q.x;
    buf[i + 1] = q.y;
    buf[i + 2] = q.z;
    buf[i + 3] = q.w;
}

// ============================================================================
// PropertyMixer
// ============================================================================

/// Weighted accumulator for one numeric property.
///
/// The buffer holds four equally sized regions:
///
/// ```text
/// [ accu0 | accu1 | orig | add ]
/// ```
///
/// `accu0` and `accu1` are double-buffered blend results; the mixer writes
/// into one per frame and compares both to detect change. `orig` is the
/// property's saved rest value and `add` the running additive sum.
///
/// Blending is progressive: with cumulative weight `W` already folded in, a
/// new sample of weight `w` is mixed at `w / (W + w)`, which makes the final
/// result a weighted average independent of accumulation order.
#[derive(Debug, Clone)]
pub struct PropertyMixer {
    buffer: Vec<f32>,
    size: usize,
    kernel: MixKernel,
    cumulative_weight: f32,
    cumulative_weight_additive: f32,
}

impl PropertyMixer {
    /// Creates an accumulator for `size` components blended with `kernel`.
    #[must_use]
    pub fn new(size: usize, kernel: MixKernel) -> Self {
        Self {
            buffer: vec![0.0; size * 4],
            size,
            kernel,
            cumulative_weight: 0.0,
            cumulative_weight_additive: 0.0,
        }
    }

    /// Number of components per value.
    #[inline]
    #[must_use]
    pub fn value_size(&self) -> usize {
        self.size
    }

    /// The blending rule in use.
    #[inline]
    #[must_use]
    pub fn kernel(&self) -> MixKernel {
        self.kernel
    }

    /// Folds `incoming` into the accumulation region selected by
    /// `accu_index`, weighted by `weight`.
    pub fn accumulate(&mut self, accu_index: usize, weight: f32, incoming: &[f32]) {
        let size = self.size;
        let offset = accu_index * size;
        if self.cumulative_weight == 0.0 {
            // first contribution seeds the region as-is, the bookkeeping
            // weight scales it during apply
            for (dst, &src) in self.buffer[offset..offset + size].iter_mut().zip(incoming) {
                *dst = src;
            }
            self.cumulative_weight = weight;
        } else {
            self.cumulative_weight += weight;
            let mix = weight / self.cumulative_weight;
            Self::mix_region(
                self.kernel,
                &mut self.buffer[offset..offset + size],
                incoming,
                mix,
            );
        }
    }

    /// Folds `incoming` into the additive sum, weighted by `weight`.
    pub fn accumulate_additive(&mut self, weight: f32, incoming: &[f32]) {
        let size = self.size;
        if self.cumulative_weight_additive == 0.0 {
            self.set_additive_identity();
        }
        let (_, tail) = self.buffer.split_at_mut(3 * size);
        Self::mix_region_additive(self.kernel, &mut tail[..size], incoming, weight);
        self.cumulative_weight_additive += weight;
    }

    /// Completes the frame's blend in the region selected by `accu_index`
    /// and resets the cumulative weights.
    ///
    /// When the accumulated weight falls short of one, the remainder is
    /// filled from the saved rest value; the additive sum is then applied on
    /// top. Returns `true` when the result differs from the previous frame's,
    /// which is the signal to write it back to the graph.
    pub fn apply(&mut self, accu_index: usize) -> bool {
        let size = self.size;
        let weight = self.cumulative_weight;
        let weight_additive = self.cumulative_weight_additive;
        self.cumulative_weight = 0.0;
        self.cumulative_weight_additive = 0.0;

        let offset = accu_index * size;
        let (accus, rest) = self.buffer.split_at_mut(2 * size);
        if weight < 1.0 {
            // accu := accu + orig * (1 - weight)
            let orig = &rest[..size];
            Self::mix_region(self.kernel, &mut accus[offset..offset + size], orig, 1.0 - weight);
        }
        if weight_additive > 0.0 {
            // the additive sum carries its weights already
            let add = &rest[size..2 * size];
            Self::mix_region_additive(self.kernel, &mut accus[offset..offset + size], add, 1.0);
        }

        let (accu0, accu1) = accus.split_at(size);
        accu0 != accu1
    }

    /// The blend result for `accu_index`, valid after [`Self::apply`].
    #[inline]
    #[must_use]
    pub fn accu(&self, accu_index: usize) -> &[f32] {
        &self.buffer[accu_index * self.size..(accu_index + 1) * self.size]
    }

    /// The saved rest value.
    #[inline]
    pub(crate) fn orig(&self) -> &[f32] {
        &self.buffer[2 * self.size..3 * self.size]
    }

    /// The rest value region, for the binding to read into.
    #[inline]
    pub(crate) fn orig_mut(&mut self) -> &mut [f32] {
        &mut self.buffer[2 * self.size..3 * self.size]
    }

    /// Re-arms the accumulator around the freshly saved rest value: both
    /// accumulation regions start out equal to it, the additive sum is reset
    /// to identity and the cumulative weights to zero.
    pub(crate) fn seed_from_original(&mut self) {
        let size = self.size;
        let (accus, rest) = self.buffer.split_at_mut(2 * size);
        let orig = &rest[..size];
        accus[..size].copy_from_slice(orig);
        accus[size..].copy_from_slice(orig);
        self.set_additive_identity();
        self.cumulative_weight = 0.0;
        self.cumulative_weight_additive = 0.0;
    }

    fn set_additive_identity(&mut self) {
        let size = self.size;
        let (head, tail) = self.buffer.split_at_mut(3 * size);
        let add = &mut tail[..size];
        match self.kernel {
            MixKernel::Lerp => add.fill(0.0),
            MixKernel::Slerp => {
                add.fill(0.0);
                // identity rotation per four-component block
                let mut i = 3;
                while i < size {
                    add[i] = 1.0;
                    i += 4;
                }
            }
            // switched values add nothing; their identity is the rest value
            MixKernel::Select => add.copy_from_slice(&head[2 * size..3 * size]),
        }
    }

    /// `dst := dst * (1 - t) + src * t` under the kernel's blending rule.
    fn mix_region(kernel: MixKernel, dst: &mut [f32], src: &[f32], t: f32) {
        match kernel {
            MixKernel::Lerp => {
                let s = 1.0 - t;
                for (d, &v) in dst.iter_mut().zip(src) {
                    *d = *d * s + v * t;
                }
            }
            MixKernel::Slerp => {
                let blocks = dst.len().min(src.len()) / 4;
                for block in 0..blocks {
                    let i = block * 4;
                    let blended = quat_at(dst, i).slerp(quat_at(src, i), t);
                    put_quat(dst, i, blended);
                }
            }
            MixKernel::Select => {
                if t >= 0.5 {
                    for (d, &v) in dst.iter_mut().zip(src) {
                        *d = v;
                    }
                }
            }
        }
    }

    /// `dst := dst + src * t` under the kernel's additive rule.
    fn mix_region_additive(kernel: MixKernel, dst: &mut [f32], src: &[f32], t: f32) {
        match kernel {
            MixKernel::Lerp => {
                for (d, &v) in dst.iter_mut().zip(src) {
                    *d += v * t;
                }
            }
            MixKernel::Slerp => {
                let blocks = dst.len().min(src.len()) / 4;
                for block in 0..blocks {
                    let i = block * 4;
                    let current = quat_at(dst, i);
                    let offset = current.mul_quat(quat_at(src, i));
                    put_quat(dst, i, current.slerp(offset, t));
                }
            }
            MixKernel::Select => {
                if t >= 0.5 {
                    for (d, &v) in dst.iter_mut().zip(src) {
                        *d = v;
                    }
                }
            }
        }
    }
}

// ============================================================================
// TextMixer
// ============================================================================

/// [`PropertyMixer`] counterpart for string tracks.
///
/// Strings cannot be averaged, so every operation is a weighted switch: a
/// contribution wins its slot when its progressive mix factor reaches one
/// half, exactly like the numeric [`MixKernel::Select`] rule.
#[derive(Debug, Clone, Default)]
pub struct TextMixer {
    accu: [String; 2],
    orig: String,
    add: String,
    cumulative_weight: f32,
    cumulative_weight_additive: f32,
}

impl TextMixer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds `incoming` into the accumulation slot selected by `accu_index`.
    pub fn accumulate(&mut self, accu_index: usize, weight: f32, incoming: &str) {
        if self.cumulative_weight == 0.0 {
            self.replace(accu_index, incoming);
            self.cumulative_weight = weight;
        } else {
            self.cumulative_weight += weight;
            if weight / self.cumulative_weight >= 0.5 {
                self.replace(accu_index, incoming);
            }
        }
    }

    /// Folds `incoming` into the additive slot.
    pub fn accumulate_additive(&mut self, weight: f32, incoming: &str) {
        if self.cumulative_weight_additive == 0.0 {
            // identity for a switched value is the rest value
            self.add.clone_from(&self.orig);
        }
        if weight >= 0.5 {
            self.add.clear();
            self.add.push_str(incoming);
        }
        self.cumulative_weight_additive += weight;
    }

    /// Completes the frame's switch and reports whether the winning value
    /// changed since the previous frame.
    pub fn apply(&mut self, accu_index: usize) -> bool {
        let weight = self.cumulative_weight;
        let weight_additive = self.cumulative_weight_additive;
        self.cumulative_weight = 0.0;
        self.cumulative_weight_additive = 0.0;

        if weight < 1.0 && 1.0 - weight >= 0.5 {
            let Self { accu, orig, .. } = self;
            accu[accu_index].clone_from(orig);
        }
        if weight_additive > 0.0 {
            let Self { accu, add, .. } = self;
            accu[accu_index].clone_from(add);
        }
        self.accu[0] != self.accu[1]
    }

    /// The winning value for `accu_index`, valid after [`Self::apply`].
    #[inline]
    #[must_use]
    pub fn accu(&self, accu_index: usize) -> &str {
        &self.accu[accu_index]
    }

    pub(crate) fn orig(&self) -> &str {
        &self.orig
    }

    pub(crate) fn orig_mut(&mut self) -> &mut String {
        &mut self.orig
    }

    /// See [`PropertyMixer::seed_from_original`].
    pub(crate) fn seed_from_original(&mut self) {
        let Self { accu, orig, add, .. } = self;
        accu[0].clone_from(orig);
        accu[1].clone_from(orig);
        add.clone_from(orig);
        self.cumulative_weight = 0.0;
        self.cumulative_weight_additive = 0.0;
    }

    fn replace(&mut self, accu_index: usize, value: &str) {
        self.accu[accu_index].clear();
        self.accu[accu_index].push_str(value);
    }
}

// ============================================================================
// Mix slots
// ============================================================================

/// The accumulator flavor stored in a slot, matching the track's data.
pub(crate) enum SlotMix {
    Numeric(PropertyMixer),
    Text(TextMixer),
}

/// How a slot reaches its property: one object, or every member of a group.
enum SlotBinding<G: AnimationGraph> {
    Single(PropertyBinding<G>),
    Group(GroupHandle, CompositeBinding<G>),
}

impl<G: AnimationGraph> SlotBinding<G> {
    fn read(&mut self, groups: &SlotMap<GroupHandle, ObjectGroup<G>>, graph: &G, out: &mut [f32]) {
        match self {
            SlotBinding::Single(binding) => binding.get_value(graph, out),
            SlotBinding::Group(handle, composite) => {
                if let Some(group) = groups.get(*handle) {
                    composite.get_value(group, graph, out);
                }
            }
        }
    }

    fn write(
        &mut self,
        groups: &SlotMap<GroupHandle, ObjectGroup<G>>,
        graph: &mut G,
        values: &[f32],
    ) {
        match self {
            SlotBinding::Single(binding) => binding.set_value(graph, values),
            SlotBinding::Group(handle, composite) => {
                if let Some(group) = groups.get(*handle) {
                    composite.set_value(group, graph, values);
                }
            }
        }
    }

    fn read_text(
        &mut self,
        groups: &SlotMap<GroupHandle, ObjectGroup<G>>,
        graph: &G,
        out: &mut String,
    ) {
        match self {
            SlotBinding::Single(binding) => binding.get_text(graph, out),
            SlotBinding::Group(handle, composite) => {
                if let Some(group) = groups.get(*handle) {
                    composite.get_text(group, graph, out);
                }
            }
        }
    }

    fn write_text(
        &mut self,
        groups: &SlotMap<GroupHandle, ObjectGroup<G>>,
        graph: &mut G,
        value: &str,
    ) {
        match self {
            SlotBinding::Single(binding) => binding.set_text(graph, value),
            SlotBinding::Group(handle, composite) => {
                if let Some(group) = groups.get(*handle) {
                    composite.set_text(group, graph, value);
                }
            }
        }
    }
}

/// One shared `(root, track path)` property channel.
pub(crate) struct MixSlot<G: AnimationGraph> {
    binding: SlotBinding<G>,
    pub(crate) mix: SlotMix,
    /// Reverse lookup key for the slot index, used when the slot is removed.
    index_key: (RootKey<G::Obj>, String),
    /// Actions referencing this slot, active or not.
    ref_count: u32,
    /// Active actions referencing this slot.
    use_count: u32,
    /// Whether `orig` currently holds a captured rest value.
    saved: bool,
    /// Deferred restore, executed on the next update.
    needs_restore: bool,
}

/// Hash key distinguishing the two kinds of binding root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RootKey<O> {
    Object(O),
    Group(GroupHandle),
}

struct ActionEntry<G: AnimationGraph> {
    action: AnimationAction,
    root: RootKey<G::Obj>,
    slot_keys: Vec<SlotKey>,
}

/// Bookkeeping counters, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MixerStats {
    /// Actions the mixer owns.
    pub actions: usize,
    /// Actions currently scheduled for playback.
    pub active_actions: usize,
    /// Property slots the mixer owns.
    pub bindings: usize,
    /// Property slots used by at least one active action.
    pub bindings_in_use: usize,
    /// Fade and warp ramps currently running.
    pub control_ramps: usize,
    /// Registered object groups.
    pub groups: usize,
}

// ============================================================================
// AnimationMixer
// ============================================================================

/// Player for a target graph, usually one per scene.
///
/// Actions are created with [`Self::clip_action`] and configured through
/// [`Self::action_mut`]; [`Self::update`] advances global time and writes the
/// blended result into the graph.
pub struct AnimationMixer<G: AnimationGraph> {
    root: G::Obj,
    time: f32,
    time_scale: f32,
    /// Flipped at the start of every update to double-buffer blend results.
    accu_index: usize,

    actions: SlotMap<ActionHandle, ActionEntry<G>>,
    /// Scheduled actions in activation order.
    active: Vec<ActionHandle>,
    /// Memoizes `clip_action` per `(clip identity, root)`.
    action_index: FxHashMap<(Uuid, RootKey<G::Obj>), ActionHandle>,

    slots: SlotMap<SlotKey, MixSlot<G>>,
    slot_index: FxHashMap<(RootKey<G::Obj>, String), SlotKey>,

    groups: SlotMap<GroupHandle, ObjectGroup<G>>,
    events: Vec<MixerEvent>,
}

impl<G: AnimationGraph> AnimationMixer<G> {
    /// Creates a mixer whose actions bind below `root` by default.
    #[must_use]
    pub fn new(root: G::Obj) -> Self {
        Self {
            root,
            time: 0.0,
            time_scale: 1.0,
            accu_index: 0,
            actions: SlotMap::with_key(),
            active: Vec::new(),
            action_index: FxHashMap::default(),
            slots: SlotMap::with_key(),
            slot_index: FxHashMap::default(),
            groups: SlotMap::with_key(),
            events: Vec::new(),
        }
    }

    /// The default binding root.
    #[inline]
    #[must_use]
    pub fn root(&self) -> G::Obj {
        self.root
    }

    /// Global mixer time, in scaled seconds.
    #[inline]
    #[must_use]
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Global playback speed. All action time scales nest inside this.
    #[inline]
    #[must_use]
    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    pub fn set_time_scale(&mut self, time_scale: f32) {
        self.time_scale = time_scale;
    }

    // ------------------------------------------------------------------------
    // Action creation and lookup
    // ------------------------------------------------------------------------

    /// Returns the action for `clip` under the mixer's root, creating and
    /// caching it on first use.
    ///
    /// Fails when a track name in the clip does not parse.
    pub fn clip_action(&mut self, clip: &AnimationClip) -> Result<ActionHandle> {
        let root = RootKey::Object(self.root);
        self.make_action(clip, root)
    }

    /// Like [`Self::clip_action`], but binds below `root` instead of the
    /// mixer's default root.
    pub fn clip_action_with_root(
        &mut self,
        clip: &AnimationClip,
        root: G::Obj,
    ) -> Result<ActionHandle> {
        self.make_action(clip, RootKey::Object(root))
    }

    /// Like [`Self::clip_action`], but drives every member of `group` at
    /// once through one set of shared slots.
    pub fn clip_action_for_group(
        &mut self,
        clip: &AnimationClip,
        group: GroupHandle,
    ) -> Result<ActionHandle> {
        self.make_action(clip, RootKey::Group(group))
    }

    /// The cached action for `clip` under the mixer's root, if one exists.
    #[must_use]
    pub fn existing_action(&self, clip: &AnimationClip) -> Option<ActionHandle> {
        let key = (clip.uuid(), RootKey::Object(self.root));
        self.action_index.get(&key).copied()
    }

    fn make_action(&mut self, clip: &AnimationClip, root: RootKey<G::Obj>) -> Result<ActionHandle> {
        let memo_key = (clip.uuid(), root);
        if let Some(&handle) = self.action_index.get(&memo_key) {
            return Ok(handle);
        }

        // parse every path up front so a bad track cannot leave half the
        // slots referenced
        let mut parsed_paths = Vec::with_capacity(clip.tracks().len());
        for track in clip.tracks() {
            parsed_paths.push(TrackPath::parse(track.name())?);
        }

        let mut slot_keys = Vec::with_capacity(clip.tracks().len());
        for (track, parsed) in clip.tracks().iter().zip(parsed_paths) {
            let index_key = (root, track.name().to_string());
            let slot_key = match self.slot_index.get(&index_key).copied() {
                Some(key) => {
                    if let Some(slot) = self.slots.get_mut(key) {
                        slot.ref_count += 1;
                    }
                    key
                }
                None => {
                    let binding = match root {
                        RootKey::Object(obj) => SlotBinding::Single(PropertyBinding::from_parts(
                            obj,
                            track.name().to_string(),
                            parsed,
                        )),
                        RootKey::Group(group) => SlotBinding::Group(
                            group,
                            CompositeBinding::from_parts(track.name().to_string(), parsed),
                        ),
                    };
                    let mix = match track.kind() {
                        TrackKind::String => SlotMix::Text(TextMixer::new()),
                        kind => SlotMix::Numeric(PropertyMixer::new(
                            track.value_size(),
                            MixKernel::for_kind(kind),
                        )),
                    };
                    let key = self.slots.insert(MixSlot {
                        binding,
                        mix,
                        index_key: index_key.clone(),
                        ref_count: 1,
                        use_count: 0,
                        saved: false,
                        needs_restore: false,
                    });
                    self.slot_index.insert(index_key, key);
                    key
                }
            };
            slot_keys.push(slot_key);
        }

        let action = AnimationAction::new(clip.duplicate(), clip.blend_mode());
        let handle = self.actions.insert(ActionEntry {
            action,
            root,
            slot_keys,
        });
        self.action_index.insert(memo_key, handle);
        log::debug!(
            "created action {handle:?} for clip '{}' ({} tracks)",
            clip.name(),
            clip.tracks().len()
        );
        Ok(handle)
    }

    /// Read access to an action's playback state.
    #[must_use]
    pub fn action(&self, handle: ActionHandle) -> Option<&AnimationAction> {
        self.actions.get(handle).map(|entry| &entry.action)
    }

    /// Mutable access to an action's playback state.
    #[must_use]
    pub fn action_mut(&mut self, handle: ActionHandle) -> Option<&mut AnimationAction> {
        self.actions.get_mut(handle).map(|entry| &mut entry.action)
    }

    /// Forgets an action entirely: unschedules it, drops it from the cache
    /// and releases its property slots.
    pub fn discard_action(&mut self, handle: ActionHandle) {
        self.deactivate(handle);
        if let Some(entry) = self.actions.remove(handle) {
            self.action_index
                .remove(&(entry.action.clip().uuid(), entry.root));
            for key in entry.slot_keys {
                if let Some(slot) = self.slots.get_mut(key) {
                    slot.ref_count = slot.ref_count.saturating_sub(1);
                }
            }
            log::debug!("discarded action {handle:?}");
        }
    }

    // ------------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------------

    /// Schedules the action for playback. A finished or unconfigured action
    /// also needs [`AnimationAction::reset`] (through [`Self::action_mut`])
    /// to actually produce output again.
    pub fn play(&mut self, handle: ActionHandle) {
        self.activate(handle);
    }

    /// Unschedules the action and resets its playback state. The affected
    /// properties return to their rest values on the next update unless
    /// another active action drives them.
    pub fn stop(&mut self, handle: ActionHandle) {
        self.deactivate(handle);
        if let Some(entry) = self.actions.get_mut(handle) {
            entry.action.reset();
        }
    }

    /// Stops every scheduled action.
    pub fn stop_all(&mut self) {
        let scheduled: Vec<ActionHandle> = self.active.clone();
        for handle in scheduled {
            self.stop(handle);
        }
    }

    /// Whether the action is scheduled, regardless of whether it currently
    /// produces output.
    #[must_use]
    pub fn is_scheduled(&self, handle: ActionHandle) -> bool {
        self.active.contains(&handle)
    }

    /// Whether the action is scheduled and actually advancing: enabled, not
    /// paused, not waiting on a start time, with a nonzero time scale.
    #[must_use]
    pub fn is_running(&self, handle: ActionHandle) -> bool {
        let Some(entry) = self.actions.get(handle) else {
            return false;
        };
        let action = &entry.action;
        action.enabled()
            && !action.paused()
            && action.time_scale() != 0.0
            && action.start_time().is_none()
            && self.active.contains(&handle)
    }

    /// Defers the action's first frame until mixer time `at`.
    pub fn start_at(&mut self, handle: ActionHandle, at: f32) {
        if let Some(entry) = self.actions.get_mut(handle) {
            entry.action.start_at(at);
        }
    }

    /// Copies timing state so `handle` plays in lockstep with `with`.
    pub fn sync_actions(&mut self, handle: ActionHandle, with: ActionHandle) {
        if let Some([entry, reference]) = self.actions.get_disjoint_mut([handle, with]) {
            entry.action.sync_with(&reference.action);
        }
    }

    // ------------------------------------------------------------------------
    // Fades and warps
    // ------------------------------------------------------------------------

    /// Ramps the action's weight from zero to one over `duration` seconds,
    /// starting now.
    pub fn fade_in(&mut self, handle: ActionHandle, duration: f32) {
        let now = self.time;
        if let Some(entry) = self.actions.get_mut(handle) {
            entry.action.schedule_fade(now, duration, 0.0, 1.0);
        }
    }

    /// Ramps the action's weight from one to zero over `duration` seconds,
    /// starting now.
    pub fn fade_out(&mut self, handle: ActionHandle, duration: f32) {
        let now = self.time;
        if let Some(entry) = self.actions.get_mut(handle) {
            entry.action.schedule_fade(now, duration, 1.0, 0.0);
        }
    }

    /// Fades `from` out while fading `to` in over the same interval.
    ///
    /// With `warp` set, both actions additionally warp their time scales
    /// across the ratio of the two clip durations, so a stride of one clip
    /// morphs into a stride of the other instead of sliding.
    pub fn cross_fade(&mut self, from: ActionHandle, to: ActionHandle, duration: f32, warp: bool) {
        let now = self.time;
        let Some([out_entry, in_entry]) = self.actions.get_disjoint_mut([from, to]) else {
            return;
        };
        out_entry.action.schedule_fade(now, duration, 1.0, 0.0);
        in_entry.action.schedule_fade(now, duration, 0.0, 1.0);
        if warp {
            let out_duration = out_entry.action.clip().duration();
            let in_duration = in_entry.action.clip().duration();
            out_entry
                .action
                .schedule_warp(now, 1.0, out_duration / in_duration, duration);
            in_entry
                .action
                .schedule_warp(now, in_duration / out_duration, 1.0, duration);
        }
    }

    /// Ramps the action's effective time scale from `start_scale` to
    /// `end_scale` over `duration` seconds, starting now.
    pub fn warp(&mut self, handle: ActionHandle, start_scale: f32, end_scale: f32, duration: f32) {
        let now = self.time;
        if let Some(entry) = self.actions.get_mut(handle) {
            entry.action.schedule_warp(now, start_scale, end_scale, duration);
        }
    }

    /// Decelerates the action to a standstill over `duration` seconds.
    pub fn halt(&mut self, handle: ActionHandle, duration: f32) {
        let now = self.time;
        if let Some(entry) = self.actions.get_mut(handle) {
            let current = entry.action.effective_time_scale();
            entry.action.schedule_warp(now, current, 0.0, duration);
        }
    }

    // ------------------------------------------------------------------------
    // Object groups
    // ------------------------------------------------------------------------

    /// Registers a group so clips can be bound against all its members with
    /// [`Self::clip_action_for_group`].
    pub fn add_group(&mut self, group: ObjectGroup<G>) -> GroupHandle {
        self.groups.insert(group)
    }

    #[must_use]
    pub fn group(&self, handle: GroupHandle) -> Option<&ObjectGroup<G>> {
        self.groups.get(handle)
    }

    /// Mutable access for membership changes. Bindings notice the bumped
    /// generation and rebuild lazily.
    #[must_use]
    pub fn group_mut(&mut self, handle: GroupHandle) -> Option<&mut ObjectGroup<G>> {
        self.groups.get_mut(handle)
    }

    /// Unregisters a group. Actions bound to it keep their slots but stop
    /// reaching any object.
    pub fn remove_group(&mut self, handle: GroupHandle) -> Option<ObjectGroup<G>> {
        self.groups.remove(handle)
    }

    // ------------------------------------------------------------------------
    // Frame advance
    // ------------------------------------------------------------------------

    /// Advances global time by `delta` (scaled by the mixer's time scale),
    /// runs every scheduled action and writes the blended values into
    /// `graph`.
    pub fn update(&mut self, delta: f32, graph: &mut G) {
        let delta = delta * self.time_scale;
        self.time += delta;
        let time = self.time;
        let direction = if delta > 0.0 {
            1.0
        } else if delta < 0.0 {
            -1.0
        } else {
            0.0
        };
        self.accu_index ^= 1;
        let accu_index = self.accu_index;

        self.run_maintenance(graph);

        // advance every scheduled action, accumulating into the slots
        {
            let Self {
                actions,
                active,
                slots,
                events,
                ..
            } = self;
            for &handle in active.iter() {
                if let Some(entry) = actions.get_mut(handle) {
                    let ActionEntry {
                        action, slot_keys, ..
                    } = entry;
                    action.update(
                        handle, time, delta, direction, accu_index, slot_keys, slots, events,
                    );
                }
            }
        }

        // complete each used slot's blend and write back what changed
        let Self { slots, groups, .. } = self;
        for slot in slots.values_mut() {
            if slot.use_count == 0 {
                continue;
            }
            let MixSlot { binding, mix, .. } = slot;
            match mix {
                SlotMix::Numeric(mix) => {
                    if mix.apply(accu_index) {
                        binding.write(groups, graph, mix.accu(accu_index));
                    }
                }
                SlotMix::Text(mix) => {
                    if mix.apply(accu_index) {
                        binding.write_text(groups, graph, mix.accu(accu_index));
                    }
                }
            }
        }
    }

    /// Rewinds everything to zero and advances to `time` in one step.
    pub fn set_time(&mut self, time: f32, graph: &mut G) {
        self.time = 0.0;
        for entry in self.actions.values_mut() {
            entry.action.set_time(0.0);
        }
        self.update(time, graph);
    }

    /// Drains the events queued since the last call.
    pub fn take_events(&mut self) -> Vec<MixerEvent> {
        std::mem::take(&mut self.events)
    }

    /// Current bookkeeping counters.
    #[must_use]
    pub fn stats(&self) -> MixerStats {
        let control_ramps: usize = self
            .actions
            .values()
            .map(|entry| {
                usize::from(entry.action.is_fading()) + usize::from(entry.action.is_warping())
            })
            .sum();
        MixerStats {
            actions: self.actions.len(),
            active_actions: self.active.len(),
            bindings: self.slots.len(),
            bindings_in_use: self
                .slots
                .values()
                .filter(|slot| slot.use_count > 0)
                .count(),
            control_ramps,
            groups: self.groups.len(),
        }
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn activate(&mut self, handle: ActionHandle) {
        if self.active.contains(&handle) {
            return;
        }
        let Some(entry) = self.actions.get(handle) else {
            return;
        };
        for &key in &entry.slot_keys {
            if let Some(slot) = self.slots.get_mut(key) {
                slot.use_count += 1;
            }
        }
        self.active.push(handle);
        log::debug!("activated action {handle:?}");
    }

    fn deactivate(&mut self, handle: ActionHandle) {
        let Some(position) = self.active.iter().position(|&h| h == handle) else {
            return;
        };
        self.active.remove(position);
        if let Some(entry) = self.actions.get(handle) {
            for &key in &entry.slot_keys {
                if let Some(slot) = self.slots.get_mut(key) {
                    slot.use_count = slot.use_count.saturating_sub(1);
                    if slot.use_count == 0 {
                        slot.needs_restore = true;
                    }
                }
            }
        }
        log::debug!("deactivated action {handle:?}");
    }

    /// Start-of-update housekeeping: restore slots that lost their last
    /// active user, capture rest values for slots that just gained one, and
    /// drop slots no action references anymore.
    fn run_maintenance(&mut self, graph: &mut G) {
        let Self {
            slots,
            slot_index,
            groups,
            ..
        } = self;
        let mut unreferenced: Vec<SlotKey> = Vec::new();
        for (key, slot) in slots.iter_mut() {
            if slot.needs_restore {
                slot.needs_restore = false;
                // a reactivation between updates cancels the restore
                if slot.use_count == 0 && slot.saved {
                    slot.saved = false;
                    let MixSlot { binding, mix, .. } = slot;
                    match mix {
                        SlotMix::Numeric(mix) => binding.write(groups, graph, mix.orig()),
                        SlotMix::Text(mix) => binding.write_text(groups, graph, mix.orig()),
                    }
                }
            }
            if slot.use_count > 0 && !slot.saved {
                slot.saved = true;
                let MixSlot { binding, mix, .. } = slot;
                match mix {
                    SlotMix::Numeric(mix) => {
                        binding.read(groups, graph, mix.orig_mut());
                        mix.seed_from_original();
                    }
                    SlotMix::Text(mix) => {
                        binding.read_text(groups, graph, mix.orig_mut());
                        mix.seed_from_original();
                    }
                }
            }
            if slot.ref_count == 0 {
                unreferenced.push(key);
            }
        }
        for key in unreferenced {
            if let Some(slot) = slots.remove(key) {
                slot_index.remove(&slot.index_key);
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(got: &[f32], want: &[f32]) {
        assert_eq!(got.len(), want.len());
        for (g, w) in got.iter().zip(want) {
            assert!((g - w).abs() < 1e-5, "got {got:?}, want {want:?}");
        }
    }

    #[test]
    fn lerp_accumulation_is_a_weighted_average() {
        let mut mix = PropertyMixer::new(2, MixKernel::Lerp);
        mix.orig_mut().copy_from_slice(&[0.0, 0.0]);
        mix.seed_from_original();

        mix.accumulate(0, 0.25, &[4.0, 8.0]);
        mix.accumulate(0, 0.75, &[8.0, 0.0]);
        assert!(mix.apply(0));
        // (4*0.25 + 8*0.75) / 1.0 and (8*0.25 + 0*0.75) / 1.0
        assert_close(mix.accu(0), &[7.0, 2.0]);
    }

    #[test]
    fn underweight_blend_fills_from_rest_value() {
        let mut mix = PropertyMixer::new(1, MixKernel::Lerp);
        mix.orig_mut()[0] = 10.0;
        mix.seed_from_original();

        mix.accumulate(0, 0.25, &[2.0]);
        assert!(mix.apply(0));
        // 25% of the sample, 75% of the rest value
        assert_close(mix.accu(0), &[0.25 * 2.0 + 0.75 * 10.0]);
    }

    #[test]
    fn additive_sum_stacks_on_top_of_the_blend() {
        let mut mix = PropertyMixer::new(1, MixKernel::Lerp);
        mix.orig_mut()[0] = 1.0;
        mix.seed_from_original();

        mix.accumulate(0, 1.0, &[5.0]);
        mix.accumulate_additive(0.3, &[2.0]);
        mix.accumulate_additive(0.5, &[4.0]);
        assert!(mix.apply(0));
        assert_close(mix.accu(0), &[5.0 + 0.3 * 2.0 + 0.5 * 4.0]);
    }

    #[test]
    fn unchanged_result_reports_no_write() {
        let mut mix = PropertyMixer::new(1, MixKernel::Lerp);
        mix.orig_mut()[0] = 3.0;
        mix.seed_from_original();

        // full-weight contributions equal to the rest value on both frames
        mix.accumulate(1, 1.0, &[3.0]);
        assert!(!mix.apply(1));
        mix.accumulate(0, 1.0, &[3.0]);
        assert!(!mix.apply(0));

        // a different value on the next frame must report a change
        mix.accumulate(1, 1.0, &[4.0]);
        assert!(mix.apply(1));
        assert_close(mix.accu(1), &[4.0]);
    }

    #[test]
    fn select_kernel_switches_instead_of_blending() {
        let mut mix = PropertyMixer::new(1, MixKernel::Select);
        mix.orig_mut()[0] = 0.0;
        mix.seed_from_original();

        // the second contribution's progressive share is only one third
        mix.accumulate(0, 1.0, &[1.0]);
        mix.accumulate(0, 0.5, &[0.0]);
        assert!(mix.apply(0));
        assert_close(mix.accu(0), &[1.0]);
    }

    #[test]
    fn quaternion_identity_leaves_additive_base_unchanged() {
        let mut mix = PropertyMixer::new(4, MixKernel::Slerp);
        mix.orig_mut().copy_from_slice(&[0.0, 0.0, 0.0, 1.0]);
        mix.seed_from_original();

        mix.accumulate(0, 1.0, &[0.0, 0.0, 0.0, 1.0]);
        // additive identity contributes nothing at any weight
        mix.accumulate_additive(0.0, &[0.0, 0.0, 0.0, 1.0]);
        assert!(!mix.apply(0));
        assert_close(mix.accu(0), &[0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn text_mixer_majority_wins() {
        let mut mix = TextMixer::new();
        mix.orig_mut().push_str("rest");
        mix.seed_from_original();

        mix.accumulate(0, 0.4, "walk");
        assert!(!mix.apply(0), "a minority contribution loses to the rest value");
        assert_eq!(mix.accu(0), "rest");

        mix.accumulate(1, 0.9, "run");
        assert!(mix.apply(1));
        assert_eq!(mix.accu(1), "run");
    }
}
