//! Keyframe Tracks
//!
//! This module defines [`KeyframeTrack`], a named, typed sequence of
//! keyframes addressing one animated property.
//!
//! # Overview
//!
//! A track couples a [`TrackPath`](crate::path::TrackPath)-style name with a
//! sorted time buffer and a flat value buffer. The track kind fixes how the
//! values are interpreted and which interpolation modes are available:
//!
//! | kind       | storage        | components | interpolation            |
//! |------------|----------------|------------|--------------------------|
//! | Number     | `f32`          | derived    | step, linear, smooth, bezier |
//! | Vector     | `f32`          | derived    | step, linear, smooth, bezier |
//! | Color      | `f32`          | derived    | step, linear, smooth, bezier |
//! | Quaternion | `f32`          | 4 per unit | step, linear (spherical) |
//! | Boolean    | `f32` (0/1)    | 1          | step                     |
//! | String     | `String`       | 1          | step                     |
//!
//! Construction is the validation gate: an unnamed track, an empty time
//! buffer or a value buffer that does not divide evenly over the keys is
//! rejected outright. Everything after construction degrades softly:
//! requesting an unsupported interpolation falls back to the kind's default
//! with a warning, and [`KeyframeTrack::validate`] reports data problems
//! without refusing to play.
//!
//! Buffers are shared (`Arc`), so cloning a track or creating samplers from
//! it copies no keyframe data. The editing operations (`shift`, `scale`,
//! `trim`, `optimize`) rebuild the buffers they change, leaving previously
//! created samplers on the old data.

use std::sync::Arc;

use crate::errors::{MixError, Result};
use crate::interpolant::{Basis, Interpolant};

// ============================================================================
// Kinds & Modes
// ============================================================================

/// The value type a track animates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// A scalar number (opacity, intensity, a morph weight).
    Number,
    /// A fixed-size numeric tuple (position, scale).
    Vector,
    /// An RGB color.
    Color,
    /// A unit quaternion rotation, blended spherically.
    Quaternion,
    /// A flag, stored as `0.0` / `1.0` and switched, never blended.
    Boolean,
    /// A string value, switched at key times.
    String,
}

impl TrackKind {
    /// The interpolation a fresh track of this kind uses.
    #[must_use]
    pub fn default_interpolation(self) -> InterpolationMode {
        match self {
            TrackKind::Boolean | TrackKind::String => InterpolationMode::Step,
            _ => InterpolationMode::Linear,
        }
    }

    /// Whether this kind can carry the given interpolation at all. Bezier
    /// additionally needs tangent data on the track.
    #[must_use]
    pub fn supports(self, mode: InterpolationMode) -> bool {
        match self {
            TrackKind::Number | TrackKind::Vector | TrackKind::Color => true,
            TrackKind::Quaternion => {
                matches!(mode, InterpolationMode::Step | InterpolationMode::Linear)
            }
            TrackKind::Boolean | TrackKind::String => matches!(mode, InterpolationMode::Step),
        }
    }

    /// Canonical type name used by the serialized clip format.
    #[must_use]
    pub fn type_name(self) -> &'static str {
        match self {
            TrackKind::Number => "number",
            TrackKind::Vector => "vector",
            TrackKind::Color => "color",
            TrackKind::Quaternion => "quaternion",
            TrackKind::Boolean => "bool",
            TrackKind::String => "string",
        }
    }

    /// Resolves a serialized type name, accepting the historical aliases.
    #[must_use]
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "number" | "scalar" => Some(TrackKind::Number),
            "vector" | "vector2" | "vector3" | "vector4" => Some(TrackKind::Vector),
            "color" => Some(TrackKind::Color),
            "quaternion" => Some(TrackKind::Quaternion),
            "bool" | "boolean" => Some(TrackKind::Boolean),
            "string" => Some(TrackKind::String),
            _ => None,
        }
    }
}

/// How values between two keys are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationMode {
    /// Hold the previous key's value.
    Step,
    /// Blend linearly (spherically for quaternion tracks).
    Linear,
    /// Cubic spline through the neighboring keys.
    Smooth,
    /// Hermite blend driven by per-key tangent handles.
    Bezier,
}

impl InterpolationMode {
    /// Serialized name of this mode.
    #[must_use]
    pub fn mode_name(self) -> &'static str {
        match self {
            InterpolationMode::Step => "step",
            InterpolationMode::Linear => "linear",
            InterpolationMode::Smooth => "smooth",
            InterpolationMode::Bezier => "bezier",
        }
    }

    /// Resolves a serialized mode name.
    #[must_use]
    pub fn from_mode_name(name: &str) -> Option<Self> {
        match name {
            "step" => Some(InterpolationMode::Step),
            "linear" => Some(InterpolationMode::Linear),
            "smooth" => Some(InterpolationMode::Smooth),
            "bezier" => Some(InterpolationMode::Bezier),
            _ => None,
        }
    }
}

// ============================================================================
// Storage
// ============================================================================

/// The value buffer of a track. Numeric kinds (booleans included) share the
/// flat `f32` representation; string tracks keep their own buffer.
#[derive(Debug, Clone)]
pub enum TrackValues {
    /// Flat per-key components.
    Numeric(Arc<[f32]>),
    /// One string per key.
    Text(Arc<[String]>),
}

/// Per-key Hermite handles enabling [`InterpolationMode::Bezier`]. Each
/// buffer holds a `(time, value)` pair per key and component.
#[derive(Debug, Clone)]
pub struct TangentData {
    pub(crate) in_tangents: Arc<[f32]>,
    pub(crate) out_tangents: Arc<[f32]>,
}

impl TangentData {
    /// Incoming handles, `keys * value_size * 2` values.
    #[must_use]
    pub fn in_tangents(&self) -> &[f32] {
        &self.in_tangents
    }

    /// Outgoing handles, `keys * value_size * 2` values.
    #[must_use]
    pub fn out_tangents(&self) -> &[f32] {
        &self.out_tangents
    }
}

// ============================================================================
// Track
// ============================================================================

/// A named, typed keyframe sequence for one animated property.
#[derive(Debug, Clone)]
pub struct KeyframeTrack {
    name: String,
    kind: TrackKind,
    times: Arc<[f32]>,
    values: TrackValues,
    interpolation: InterpolationMode,
    tangents: Option<TangentData>,
}

impl KeyframeTrack {
    /// Creates a scalar track.
    pub fn number(name: impl Into<String>, times: Vec<f32>, values: Vec<f32>) -> Result<Self> {
        Self::numeric(name.into(), TrackKind::Number, times, values)
    }

    /// Creates a vector track. The component count is derived from the
    /// buffer lengths.
    pub fn vector(name: impl Into<String>, times: Vec<f32>, values: Vec<f32>) -> Result<Self> {
        Self::numeric(name.into(), TrackKind::Vector, times, values)
    }

    /// Creates a color track.
    pub fn color(name: impl Into<String>, times: Vec<f32>, values: Vec<f32>) -> Result<Self> {
        Self::numeric(name.into(), TrackKind::Color, times, values)
    }

    /// Creates a quaternion track. Values come in `x, y, z, w` quadruples.
    pub fn quaternion(name: impl Into<String>, times: Vec<f32>, values: Vec<f32>) -> Result<Self> {
        Self::numeric(name.into(), TrackKind::Quaternion, times, values)
    }

    /// Creates a boolean track (one flag per key).
    pub fn boolean(name: impl Into<String>, times: Vec<f32>, values: Vec<bool>) -> Result<Self> {
        let flags: Vec<f32> = values.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect();
        let track = Self::numeric(name.into(), TrackKind::Boolean, times, flags)?;
        // one flag per key, nothing wider
        if track.value_size() != 1 {
            return Err(MixError::RaggedSamples {
                keys: track.times.len(),
                got: values.len(),
            });
        }
        Ok(track)
    }

    /// Creates a string track (one value per key).
    pub fn string(name: impl Into<String>, times: Vec<f32>, values: Vec<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(MixError::UnnamedTrack);
        }
        if times.is_empty() {
            return Err(MixError::EmptyTrack(name));
        }
        if values.len() != times.len() {
            return Err(MixError::RaggedSamples {
                keys: times.len(),
                got: values.len(),
            });
        }
        Ok(Self {
            name,
            kind: TrackKind::String,
            times: times.into(),
            values: TrackValues::Text(values.into()),
            interpolation: InterpolationMode::Step,
            tangents: None,
        })
    }

    fn numeric(name: String, kind: TrackKind, times: Vec<f32>, values: Vec<f32>) -> Result<Self> {
        if name.is_empty() {
            return Err(MixError::UnnamedTrack);
        }
        if times.is_empty() {
            return Err(MixError::EmptyTrack(name));
        }
        if values.is_empty() || values.len() % times.len() != 0 {
            return Err(MixError::RaggedSamples {
                keys: times.len(),
                got: values.len(),
            });
        }
        let size = values.len() / times.len();
        if kind == TrackKind::Quaternion && size % 4 != 0 {
            return Err(MixError::BadRotationSize(size));
        }
        Ok(Self {
            name,
            kind,
            times: times.into(),
            values: TrackValues::Numeric(values.into()),
            interpolation: kind.default_interpolation(),
            tangents: None,
        })
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// The track name, addressing the animated property.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The value type of this track.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// The sorted key times.
    #[inline]
    #[must_use]
    pub fn times(&self) -> &[f32] {
        &self.times
    }

    /// The value buffer.
    #[inline]
    #[must_use]
    pub fn values(&self) -> &TrackValues {
        &self.values
    }

    /// The interpolation mode in effect.
    #[inline]
    #[must_use]
    pub fn interpolation(&self) -> InterpolationMode {
        self.interpolation
    }

    /// The tangent handles, when Bezier data has been attached.
    #[inline]
    #[must_use]
    pub fn tangents(&self) -> Option<&TangentData> {
        self.tangents.as_ref()
    }

    /// Components per key.
    #[must_use]
    pub fn value_size(&self) -> usize {
        match &self.values {
            TrackValues::Numeric(v) => v.len() / self.times.len(),
            TrackValues::Text(_) => 1,
        }
    }

    /// Time of the last key.
    #[must_use]
    pub fn end_time(&self) -> f32 {
        self.times.last().copied().unwrap_or(0.0)
    }

    // ------------------------------------------------------------------------
    // Interpolation
    // ------------------------------------------------------------------------

    /// Switches the interpolation mode. An unsupported request (cubic on a
    /// quaternion track, bezier without tangents, anything but step on a
    /// boolean or string track) logs a warning and falls back to the kind's
    /// default instead of failing.
    pub fn set_interpolation(&mut self, mode: InterpolationMode) {
        let supported = self.kind.supports(mode)
            && (mode != InterpolationMode::Bezier || self.tangents.is_some());
        if supported {
            self.interpolation = mode;
        } else {
            log::warn!(
                "unsupported interpolation {:?} for {:?} track '{}', using {:?}",
                mode,
                self.kind,
                self.name,
                self.kind.default_interpolation()
            );
            self.interpolation = self.kind.default_interpolation();
        }
    }

    /// Attaches per-key Hermite handles, enabling
    /// [`InterpolationMode::Bezier`]. Each buffer must hold
    /// `keys * value_size * 2` values. Only numeric kinds carry tangents.
    pub fn set_tangents(&mut self, in_tangents: Vec<f32>, out_tangents: Vec<f32>) -> Result<()> {
        if !self.kind.supports(InterpolationMode::Bezier) {
            return Err(MixError::UnsupportedInterpolation {
                mode: InterpolationMode::Bezier,
                kind: self.kind,
            });
        }
        let expected = self.times.len() * self.value_size() * 2;
        for buf in [&in_tangents, &out_tangents] {
            if buf.len() != expected {
                return Err(MixError::TangentMismatch {
                    expected,
                    got: buf.len(),
                });
            }
        }
        self.tangents = Some(TangentData {
            in_tangents: in_tangents.into(),
            out_tangents: out_tangents.into(),
        });
        Ok(())
    }

    /// Creates the evaluator for this track: an [`Interpolant`] over the
    /// shared buffers for numeric kinds, a discrete [`StringSampler`] for
    /// string tracks. No keyframe data is copied.
    #[must_use]
    pub fn sampler(&self) -> TrackSampler {
        match &self.values {
            TrackValues::Numeric(values) => TrackSampler::Curve(Interpolant::assemble(
                self.times.clone(),
                values.clone(),
                self.value_size(),
                self.numeric_basis(),
            )),
            TrackValues::Text(values) => {
                TrackSampler::Text(StringSampler::new(self.times.clone(), values.clone()))
            }
        }
    }

    fn numeric_basis(&self) -> Basis {
        let spherical = self.kind == TrackKind::Quaternion;
        match self.interpolation {
            InterpolationMode::Step => Basis::Discrete,
            InterpolationMode::Linear if spherical => Basis::Spherical,
            InterpolationMode::Linear => Basis::Linear,
            InterpolationMode::Smooth if spherical => Basis::Spherical,
            InterpolationMode::Smooth => Basis::Cubic,
            InterpolationMode::Bezier => match &self.tangents {
                Some(t) => Basis::Bezier {
                    in_tangents: t.in_tangents.clone(),
                    out_tangents: t.out_tangents.clone(),
                },
                None => Basis::Linear,
            },
        }
    }

    // ------------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------------

    /// Moves all keys in time by `delta` seconds.
    pub fn shift(&mut self, delta: f32) {
        if delta != 0.0 {
            let times: Vec<f32> = self.times.iter().map(|t| t + delta).collect();
            self.times = times.into();
        }
    }

    /// Scales all key times by `factor` (converting frames to seconds, for
    /// instance). Tangent time offsets scale along so curve shapes are
    /// preserved.
    pub fn scale(&mut self, factor: f32) {
        if factor != 1.0 {
            let times: Vec<f32> = self.times.iter().map(|t| t * factor).collect();
            self.times = times.into();
            if let Some(tangents) = &self.tangents {
                self.tangents = Some(TangentData {
                    in_tangents: scale_handle_times(&tangents.in_tangents, factor),
                    out_tangents: scale_handle_times(&tangents.out_tangents, factor),
                });
            }
        }
    }

    /// Removes keys before `start_time` and after `end_time`. At least one
    /// key always survives, so a fully out-of-range trim leaves a one-key
    /// track rather than an empty one.
    pub fn trim(&mut self, start_time: f32, end_time: f32) {
        let n = self.times.len();
        let mut from = 0usize;
        while from != n && self.times[from] < start_time {
            from += 1;
        }
        let mut to = n;
        while to != 0 && self.times[to - 1] > end_time {
            to -= 1;
        }
        if from != 0 || to != n {
            if from >= to {
                let last = to.max(1);
                from = last - 1;
                to = last;
            }
            self.slice_keys(from, to);
        }
    }

    /// Removes redundant keyframes: interior keys equal to both neighbors
    /// and keys scheduled at the same instant as their successor. First and
    /// last keys are always kept. Curvature-carrying modes (smooth, bezier)
    /// only drop time duplicates, since an equal-valued key can still shape
    /// the curve.
    pub fn optimize(&mut self) {
        let n = self.times.len();
        if n < 2 {
            return;
        }
        let last = n - 1;
        let curvature = matches!(
            self.interpolation,
            InterpolationMode::Smooth | InterpolationMode::Bezier
        );

        let mut kept: Vec<usize> = Vec::with_capacity(n);
        kept.push(0);
        for i in 1..last {
            let time = self.times[i];
            let mut keep = false;
            if time != self.times[i + 1] && (i != 1 || time != self.times[0]) {
                keep = curvature || !self.matches_neighbors(i);
            }
            if keep {
                kept.push(i);
            }
        }
        kept.push(last);

        if kept.len() != n {
            self.gather_keys(&kept);
        }
    }

    /// Reports data problems (NaN times or values, out-of-order keys) via
    /// `log::warn!` and returns whether the track is clean. Never refuses to
    /// play: callers decide what to do with a dirty track.
    pub fn validate(&self) -> bool {
        let mut valid = true;

        let mut prev: Option<f32> = None;
        for (i, &time) in self.times.iter().enumerate() {
            if time.is_nan() {
                log::warn!("track '{}': time at key {i} is NaN", self.name);
                valid = false;
                break;
            }
            if let Some(prev) = prev {
                if prev > time {
                    log::warn!(
                        "track '{}': out of order key {i} ({time} after {prev})",
                        self.name
                    );
                    valid = false;
                    break;
                }
            }
            prev = Some(time);
        }

        if let TrackValues::Numeric(values) = &self.values {
            for (i, &value) in values.iter().enumerate() {
                if value.is_nan() {
                    log::warn!("track '{}': value at index {i} is NaN", self.name);
                    valid = false;
                    break;
                }
            }
        }

        valid
    }

    /// Replaces the numeric value buffer, preserving its length. Used by the
    /// clip utilities when rebasing values.
    pub(crate) fn set_numeric_values(&mut self, values: Vec<f32>) {
        if let TrackValues::Numeric(old) = &self.values {
            debug_assert_eq!(old.len(), values.len());
            self.values = TrackValues::Numeric(values.into());
        }
    }

    /// Whether key `i`'s value equals both of its neighbors'.
    fn matches_neighbors(&self, i: usize) -> bool {
        match &self.values {
            TrackValues::Numeric(values) => {
                let stride = self.value_size();
                let offset = i * stride;
                (0..stride).all(|j| {
                    let value = values[offset + j];
                    value == values[offset - stride + j] && value == values[offset + stride + j]
                })
            }
            TrackValues::Text(values) => values[i] == values[i - 1] && values[i] == values[i + 1],
        }
    }

    /// Keeps the key range `[from, to)`, rebuilding every buffer.
    fn slice_keys(&mut self, from: usize, to: usize) {
        let stride = self.value_size();
        self.times = Arc::from(&self.times[from..to]);
        match &self.values {
            TrackValues::Numeric(values) => {
                self.values = TrackValues::Numeric(Arc::from(&values[from * stride..to * stride]));
            }
            TrackValues::Text(values) => {
                self.values = TrackValues::Text(Arc::from(&values[from..to]));
            }
        }
        if let Some(tangents) = &self.tangents {
            let hs = stride * 2;
            self.tangents = Some(TangentData {
                in_tangents: Arc::from(&tangents.in_tangents[from * hs..to * hs]),
                out_tangents: Arc::from(&tangents.out_tangents[from * hs..to * hs]),
            });
        }
    }

    /// Keeps exactly the listed keys, in order, rebuilding every buffer.
    pub(crate) fn gather_keys(&mut self, kept: &[usize]) {
        let stride = self.value_size();
        let times: Vec<f32> = kept.iter().map(|&i| self.times[i]).collect();
        self.times = times.into();
        match &self.values {
            TrackValues::Numeric(values) => {
                let mut out = Vec::with_capacity(kept.len() * stride);
                for &i in kept {
                    out.extend_from_slice(&values[i * stride..(i + 1) * stride]);
                }
                self.values = TrackValues::Numeric(out.into());
            }
            TrackValues::Text(values) => {
                let out: Vec<String> = kept.iter().map(|&i| values[i].clone()).collect();
                self.values = TrackValues::Text(out.into());
            }
        }
        if let Some(tangents) = &self.tangents {
            let hs = stride * 2;
            let gather = |buf: &[f32]| -> Arc<[f32]> {
                let mut out = Vec::with_capacity(kept.len() * hs);
                for &i in kept {
                    out.extend_from_slice(&buf[i * hs..(i + 1) * hs]);
                }
                out.into()
            };
            self.tangents = Some(TangentData {
                in_tangents: gather(&tangents.in_tangents),
                out_tangents: gather(&tangents.out_tangents),
            });
        }
    }
}

/// Scales the time component of every `(dt, dv)` tangent pair.
fn scale_handle_times(tangents: &[f32], factor: f32) -> Arc<[f32]> {
    let mut out = tangents.to_vec();
    for pair in out.chunks_exact_mut(2) {
        pair[0] *= factor;
    }
    out.into()
}

// ============================================================================
// Samplers
// ============================================================================

/// The per-playback evaluator of a track.
#[derive(Debug, Clone)]
pub enum TrackSampler {
    /// Numeric evaluation through an [`Interpolant`].
    Curve(Interpolant),
    /// Discrete string lookup.
    Text(StringSampler),
}

impl TrackSampler {
    /// Components the sampler produces per evaluation.
    #[must_use]
    pub fn value_size(&self) -> usize {
        match self {
            TrackSampler::Curve(ip) => ip.value_size(),
            TrackSampler::Text(_) => 1,
        }
    }
}

/// Discrete sampler for string tracks: returns the value of the key at or
/// before the requested time, clamping to the first key before the start.
/// Like [`Interpolant`], it keeps a cursor so coherent playback resolves
/// without a search.
#[derive(Debug, Clone)]
pub struct StringSampler {
    times: Arc<[f32]>,
    values: Arc<[String]>,
    /// Right-key index of the last lookup: `times[cursor - 1] <= t < times[cursor]`.
    cursor: usize,
}

impl StringSampler {
    fn new(times: Arc<[f32]>, values: Arc<[String]>) -> Self {
        Self {
            times,
            values,
            cursor: 0,
        }
    }

    /// Samples the track at `t`.
    #[must_use]
    pub fn evaluate(&mut self, t: f32) -> &str {
        self.cursor = self.locate(t);
        &self.values[self.cursor.saturating_sub(1)]
    }

    /// Finds the right-key index for `t`: the cached one when still valid,
    /// else one step in the direction of movement, else a binary search.
    fn locate(&self, t: f32) -> usize {
        let times = &*self.times;
        let n = times.len();
        let mut i1 = self.cursor;

        let below = i1 > 0 && t < times[i1 - 1];
        let above = i1 < n && !(t < times[i1]);
        if !below && !above {
            return i1;
        }
        if above {
            i1 += 1;
            if i1 == n || t < times[i1] {
                return i1;
            }
        } else {
            i1 -= 1;
            if i1 == 0 || times[i1 - 1] <= t {
                return i1;
            }
        }
        times.partition_point(|&x| x <= t)
    }
}
