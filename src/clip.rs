//! Animation Clips
//!
//! This module defines [`AnimationClip`], a named, reusable set of keyframe
//! tracks, together with the clip-level utilities (duration management,
//! sub-range extraction, additive rebasing).
//!
//! # Overview
//!
//! A clip is pure data: it can be sampled by any number of actions on any
//! number of roots simultaneously. Identity is a v4 UUID, preserved through
//! serialization and refreshed by [`Clone`], so two clips loaded from the
//! same source stay distinguishable from a clip and its copy.
//!
//! A negative duration at construction means "derive it", setting the
//! duration to the end of the longest track.

use glam::Quat;
use uuid::Uuid;

use crate::track::{KeyframeTrack, TrackKind, TrackSampler, TrackValues};

/// How actions playing a clip contribute to the blend result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    /// Weighted average with every other normal contribution.
    #[default]
    Normal,
    /// Weighted offset applied on top of the normal result.
    Additive,
}

impl BlendMode {
    /// Serialized name of this mode.
    #[must_use]
    pub fn mode_name(self) -> &'static str {
        match self {
            BlendMode::Normal => "normal",
            BlendMode::Additive => "additive",
        }
    }

    /// Resolves a serialized mode name.
    #[must_use]
    pub fn from_mode_name(name: &str) -> Option<Self> {
        match name {
            "normal" => Some(BlendMode::Normal),
            "additive" => Some(BlendMode::Additive),
            _ => None,
        }
    }
}

/// A named set of keyframe tracks forming one animation.
#[derive(Debug)]
pub struct AnimationClip {
    pub(crate) name: String,
    pub(crate) duration: f32,
    pub(crate) blend_mode: BlendMode,
    pub(crate) uuid: Uuid,
    pub(crate) user_data: serde_json::Value,
    pub(crate) tracks: Vec<KeyframeTrack>,
}

impl AnimationClip {
    /// Creates a clip. A negative `duration` derives it from the tracks.
    #[must_use]
    pub fn new(name: impl Into<String>, duration: f32, tracks: Vec<KeyframeTrack>) -> Self {
        let mut clip = Self {
            name: name.into(),
            duration,
            blend_mode: BlendMode::default(),
            uuid: Uuid::new_v4(),
            user_data: serde_json::Value::Null,
            tracks,
        };
        if clip.duration < 0.0 {
            clip.reset_duration();
        }
        clip
    }

    /// The clip name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Playback length in seconds.
    #[inline]
    #[must_use]
    pub fn duration(&self) -> f32 {
        self.duration
    }

    /// Overrides the playback length.
    pub fn set_duration(&mut self, duration: f32) {
        self.duration = duration;
    }

    /// The clip's identity.
    #[inline]
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// The default blend mode of actions created for this clip.
    #[inline]
    #[must_use]
    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    /// Sets the default blend mode.
    pub fn set_blend_mode(&mut self, mode: BlendMode) {
        self.blend_mode = mode;
    }

    /// Free-form data carried along with the clip (and serialized with it).
    #[inline]
    #[must_use]
    pub fn user_data(&self) -> &serde_json::Value {
        &self.user_data
    }

    /// Mutable access to the free-form data.
    pub fn user_data_mut(&mut self) -> &mut serde_json::Value {
        &mut self.user_data
    }

    /// The keyframe tracks.
    #[inline]
    #[must_use]
    pub fn tracks(&self) -> &[KeyframeTrack] {
        &self.tracks
    }

    /// Mutable access to the tracks, for in-place editing.
    pub fn tracks_mut(&mut self) -> &mut [KeyframeTrack] {
        &mut self.tracks
    }

    /// Appends a track. The duration is not adjusted automatically; call
    /// [`AnimationClip::reset_duration`] when tracks may outrun the clip.
    pub fn add_track(&mut self, track: KeyframeTrack) {
        self.tracks.push(track);
    }

    /// Sets the duration to the end of the longest track.
    pub fn reset_duration(&mut self) {
        self.duration = self
            .tracks
            .iter()
            .map(KeyframeTrack::end_time)
            .fold(0.0, f32::max);
    }

    /// Trims every track to the clip's `[0, duration]` range.
    pub fn trim(&mut self) {
        let duration = self.duration;
        for track in &mut self.tracks {
            track.trim(0.0, duration);
        }
    }

    /// Removes redundant keyframes from every track.
    pub fn optimize(&mut self) {
        for track in &mut self.tracks {
            track.optimize();
        }
    }

    /// Validates every track, reporting problems via `log::warn!`. Returns
    /// whether all tracks are clean.
    #[must_use]
    pub fn validate(&self) -> bool {
        let mut valid = true;
        for track in &self.tracks {
            valid &= track.validate();
        }
        valid
    }

    /// Finds a clip by name in a slice.
    #[must_use]
    pub fn find_by_name<'a>(clips: &'a [AnimationClip], name: &str) -> Option<&'a AnimationClip> {
        clips.iter().find(|clip| clip.name == name)
    }

    /// Copy that keeps the identity, for mixer-held playback state. Track
    /// buffers are shared.
    pub(crate) fn duplicate(&self) -> Self {
        Self {
            name: self.name.clone(),
            duration: self.duration,
            blend_mode: self.blend_mode,
            uuid: self.uuid,
            user_data: self.user_data.clone(),
            tracks: self.tracks.clone(),
        }
    }
}

/// Cloning produces an independent clip with a fresh identity; everything
/// else is carried over (track buffers are shared, not copied).
impl Clone for AnimationClip {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            duration: self.duration,
            blend_mode: self.blend_mode,
            uuid: Uuid::new_v4(),
            user_data: self.user_data.clone(),
            tracks: self.tracks.clone(),
        }
    }
}

// ============================================================================
// Clip utilities
// ============================================================================

/// Cuts the frame range `[start_frame, end_frame)` out of `source` as a new
/// clip named `name`. Key times are interpreted as frames at `fps`. Tracks
/// left without keys are dropped, and the remaining keys are shifted so the
/// new clip starts at time zero.
#[must_use]
pub fn subclip(
    source: &AnimationClip,
    name: impl Into<String>,
    start_frame: f32,
    end_frame: f32,
    fps: f32,
) -> AnimationClip {
    let mut clip = source.clone();
    clip.name = name.into();

    let mut kept_tracks = Vec::with_capacity(clip.tracks.len());
    for mut track in std::mem::take(&mut clip.tracks) {
        let kept: Vec<usize> = track
            .times()
            .iter()
            .enumerate()
            .filter(|&(_, &t)| {
                let frame = t * fps;
                frame >= start_frame && frame < end_frame
            })
            .map(|(i, _)| i)
            .collect();
        if kept.is_empty() {
            continue;
        }
        if kept.len() != track.times().len() {
            track.gather_keys(&kept);
        }
        kept_tracks.push(track);
    }
    clip.tracks = kept_tracks;

    let min_start = clip
        .tracks
        .iter()
        .map(|track| track.times()[0])
        .fold(f32::INFINITY, f32::min);
    if min_start.is_finite() {
        for track in &mut clip.tracks {
            track.shift(-min_start);
        }
    }
    clip.reset_duration();
    clip
}

/// Rebases `clip` against a reference pose so it can play additively: the
/// reference value (the pose at `reference_frame` of `reference`, or of the
/// clip itself when `None`) is subtracted from every key. Quaternion tracks
/// are premultiplied by the conjugated reference rotation instead. Boolean
/// and string tracks are left alone. The clip's blend mode switches to
/// [`BlendMode::Additive`].
pub fn make_clip_additive(
    clip: &mut AnimationClip,
    reference_frame: f32,
    reference: Option<&AnimationClip>,
    fps: f32,
) {
    let fps = if fps <= 0.0 { 30.0 } else { fps };
    let reference_time = reference_frame / fps;

    // Sample the reference pose first; the reference may be the clip itself.
    let reference_tracks = reference.map_or(&clip.tracks, |r| &r.tracks);
    let mut reference_values: Vec<(String, TrackKind, Vec<f32>)> =
        Vec::with_capacity(reference_tracks.len());
    for track in reference_tracks {
        if matches!(track.kind(), TrackKind::Boolean | TrackKind::String) {
            continue;
        }
        if let TrackSampler::Curve(mut interpolant) = track.sampler() {
            let value = interpolant.evaluate(reference_time).to_vec();
            reference_values.push((track.name().to_string(), track.kind(), value));
        }
    }

    for (name, kind, mut reference_value) in reference_values {
        let Some(track) = clip
            .tracks
            .iter_mut()
            .find(|t| t.name() == name && t.kind() == kind)
        else {
            continue;
        };
        let TrackValues::Numeric(values) = track.values() else {
            continue;
        };

        let stride = track.value_size();
        let mut rebased = values.to_vec();
        if kind == TrackKind::Quaternion {
            // Premultiply every rotation by the conjugated reference.
            for block in reference_value.chunks_exact_mut(4) {
                conjugate_in_place(block);
            }
            for key in rebased.chunks_exact_mut(stride) {
                for (block, reference) in key
                    .chunks_exact_mut(4)
                    .zip(reference_value.chunks_exact(4))
                {
                    let q = Quat::from_xyzw(block[0], block[1], block[2], block[3]);
                    let r = Quat::from_xyzw(reference[0], reference[1], reference[2], reference[3]);
                    let out = r.mul_quat(q);
                    block.copy_from_slice(&[out.x, out.y, out.z, out.w]);
                }
            }
        } else {
            let span = stride.min(reference_value.len());
            for key in rebased.chunks_exact_mut(stride) {
                for k in 0..span {
                    key[k] -= reference_value[k];
                }
            }
        }
        track.set_numeric_values(rebased);
    }

    clip.blend_mode = BlendMode::Additive;
}

fn conjugate_in_place(block: &mut [f32]) {
    let q = Quat::from_xyzw(block[0], block[1], block[2], block[3])
        .normalize()
        .conjugate();
    block[0] = q.x;
    block[1] = q.y;
    block[2] = q.z;
    block[3] = q.w;
}
