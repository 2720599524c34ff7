//! Keyframe Interpolation
//!
//! This module implements [`Interpolant`], the sampling primitive every
//! animated track evaluates through.
//!
//! # Overview
//!
//! An interpolant owns a sorted time buffer, a flat sample buffer with
//! `value_size` components per key, and a single reusable result slot. At
//! every call to [`Interpolant::evaluate`] it locates the interval containing
//! the requested time and blends the two (or four) surrounding samples
//! according to its [`Basis`].
//!
//! Interval lookup is optimized for coherent playback: the index of the last
//! interval is cached, a bounded linear scan handles ordinary forward and
//! backward movement, and only large jumps (scrubbing, loop wrap) fall back
//! to a binary search.
//!
//! # Bases
//!
//! - [`Basis::Discrete`]: holds the previous key's value (step).
//! - [`Basis::Linear`]: component-wise linear blend.
//! - [`Basis::Spherical`]: great-arc blend for quaternion data, four
//!   components at a time.
//! - [`Basis::Cubic`]: a Catmull-Rom style spline over neighboring keys with
//!   configurable [`Ending`] behavior at the track boundaries.
//! - [`Basis::Bezier`]: a Hermite blend driven by per-key handle data, each
//!   handle honored as an endpoint derivative.

use std::sync::Arc;

use glam::Quat;

use crate::errors::{MixError, Result};

/// How a cubic interpolant extends the curve past its first or last key.
///
/// Selected per end and consulted whenever the evaluated interval touches a
/// track boundary. Playback code switches these when loop behavior changes
/// (a clamped end wants a flat tangent, a repeating interior wants the curve
/// continued from the opposite end).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ending {
    /// Natural spline end: zero curvature at the boundary key.
    #[default]
    ZeroCurvature,
    /// Flat end: zero slope at the boundary key.
    ZeroSlope,
    /// Continue the curve using the key from the opposite end of the track.
    WrapAround,
}

/// The blending rule an [`Interpolant`] applies inside an interval.
#[derive(Debug, Clone)]
pub enum Basis {
    /// Hold the left key's value for the whole interval.
    Discrete,
    /// Component-wise linear blend between the two keys.
    Linear,
    /// Spherical linear blend, treating every four components as a
    /// quaternion (shortest arc).
    Spherical,
    /// Cubic spline over the two keys and their neighbors.
    Cubic,
    /// Hermite blend with explicit per-key handles. Each handle is a
    /// `(time offset, value offset)` pair per component; its slope becomes
    /// the endpoint derivative for the interval (zero when the time offset
    /// vanishes).
    Bezier {
        /// Incoming handles, `keys * value_size * 2` values.
        in_tangents: Arc<[f32]>,
        /// Outgoing handles, `keys * value_size * 2` values.
        out_tangents: Arc<[f32]>,
    },
}

/// Where a time lookup landed relative to the key buffer.
enum Locate {
    /// The cached interval already contains the time.
    Unchanged(usize),
    /// A different interval contains the time (right-key index).
    Interval(usize),
    /// The time lies before the first key.
    Before,
    /// The time lies at or after the last key.
    After,
}

/// A sampled curve: sorted key times, flat per-key values and a cached
/// evaluation state.
///
/// Cheap to construct from shared buffers; the buffers themselves are never
/// copied or modified.
#[derive(Debug, Clone)]
pub struct Interpolant {
    times: Arc<[f32]>,
    values: Arc<[f32]>,
    value_size: usize,
    basis: Basis,
    ending_start: Ending,
    ending_end: Ending,
    /// Right-key index of the last evaluated interval. `0` means no valid
    /// interval is cached; `times.len()` means the last lookup ran past the
    /// end.
    cached_index: usize,
    // Cubic scratch, refreshed whenever the interval changes.
    weight_prev: f32,
    weight_next: f32,
    offset_prev: usize,
    offset_next: usize,
    result: Box<[f32]>,
}

impl Interpolant {
    /// Creates a step interpolant.
    pub fn discrete(times: Arc<[f32]>, values: Arc<[f32]>, value_size: usize) -> Result<Self> {
        check_buffers(&times, &values, value_size)?;
        Ok(Self::assemble(times, values, value_size, Basis::Discrete))
    }

    /// Creates a component-wise linear interpolant.
    pub fn linear(times: Arc<[f32]>, values: Arc<[f32]>, value_size: usize) -> Result<Self> {
        check_buffers(&times, &values, value_size)?;
        Ok(Self::assemble(times, values, value_size, Basis::Linear))
    }

    /// Creates a quaternion interpolant. `value_size` must be a multiple of
    /// four.
    pub fn spherical(times: Arc<[f32]>, values: Arc<[f32]>, value_size: usize) -> Result<Self> {
        check_buffers(&times, &values, value_size)?;
        if value_size % 4 != 0 {
            return Err(MixError::BadRotationSize(value_size));
        }
        Ok(Self::assemble(times, values, value_size, Basis::Spherical))
    }

    /// Creates a cubic spline interpolant. Both endings default to
    /// [`Ending::ZeroCurvature`]; see [`Interpolant::set_endings`].
    pub fn cubic(times: Arc<[f32]>, values: Arc<[f32]>, value_size: usize) -> Result<Self> {
        check_buffers(&times, &values, value_size)?;
        Ok(Self::assemble(times, values, value_size, Basis::Cubic))
    }

    /// Creates a handle-driven Hermite interpolant. Each tangent buffer
    /// carries `keys * value_size` `(time, value)` pairs.
    pub fn bezier(
        times: Arc<[f32]>,
        values: Arc<[f32]>,
        value_size: usize,
        in_tangents: Arc<[f32]>,
        out_tangents: Arc<[f32]>,
    ) -> Result<Self> {
        check_buffers(&times, &values, value_size)?;
        let expected = times.len() * value_size * 2;
        for buf in [&in_tangents, &out_tangents] {
            if buf.len() != expected {
                return Err(MixError::TangentMismatch {
                    expected,
                    got: buf.len(),
                });
            }
        }
        let basis = Basis::Bezier {
            in_tangents,
            out_tangents,
        };
        Ok(Self::assemble(times, values, value_size, basis))
    }

    /// Assembles an interpolant from buffers whose arithmetic has already
    /// been checked (the track constructors are the validation gate).
    pub(crate) fn assemble(
        times: Arc<[f32]>,
        values: Arc<[f32]>,
        value_size: usize,
        basis: Basis,
    ) -> Self {
        Self {
            times,
            values,
            value_size,
            basis,
            ending_start: Ending::default(),
            ending_end: Ending::default(),
            cached_index: 0,
            weight_prev: 0.0,
            weight_next: 0.0,
            offset_prev: 0,
            offset_next: 0,
            result: vec![0.0; value_size].into_boxed_slice(),
        }
    }

    /// Number of components per key.
    #[inline]
    #[must_use]
    pub fn value_size(&self) -> usize {
        self.value_size
    }

    /// The sorted key times backing this interpolant.
    #[inline]
    #[must_use]
    pub fn times(&self) -> &[f32] {
        &self.times
    }

    /// The flat sample buffer backing this interpolant.
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// The blending rule in effect.
    #[inline]
    #[must_use]
    pub fn basis(&self) -> &Basis {
        &self.basis
    }

    /// Sets the boundary behavior of a cubic interpolant. Ignored by the
    /// other bases. Takes effect the next time the evaluated interval
    /// changes.
    pub fn set_endings(&mut self, start: Ending, end: Ending) {
        self.ending_start = start;
        self.ending_end = end;
    }

    /// Samples the curve at `t`.
    ///
    /// Returns this interpolant's single result slot: the slice stays valid
    /// until the next `evaluate` call, which overwrites it in place. Callers
    /// that need the value past that point must copy it out.
    ///
    /// Times at or outside the key range return the verbatim first or last
    /// sample.
    #[must_use]
    pub fn evaluate(&mut self, t: f32) -> &[f32] {
        let n = self.times.len();

        // Static track: one key, nothing to blend.
        if n == 1 {
            copy_into(&mut self.result, &self.values, self.value_size, 0);
            return &self.result;
        }

        match self.locate(t) {
            Locate::Unchanged(i1) => self.interpolate(i1, t),
            Locate::Interval(i1) => {
                self.cached_index = i1;
                self.interval_changed(i1);
                self.interpolate(i1, t)
            }
            Locate::Before => {
                self.cached_index = 0;
                copy_into(&mut self.result, &self.values, self.value_size, 0);
                &self.result
            }
            Locate::After => {
                self.cached_index = n;
                copy_into(&mut self.result, &self.values, self.value_size, n - 1);
                &self.result
            }
        }
    }

    /// Finds the interval containing `t`, preferring the cached one, then a
    /// short linear scan in the direction of movement, then a binary search
    /// over the remaining range.
    fn locate(&self, t: f32) -> Locate {
        let pp = &*self.times;
        let n = pp.len();
        let i1 = self.cached_index;

        // Move forward when t is not strictly left of the cached right key
        // (or when the cache sits past the end).
        let forward = match pp.get(i1) {
            Some(&t1) => !(t < t1),
            None => true,
        };

        if forward {
            if i1 >= n {
                // Stale past-the-end cache: either still past the end, or
                // time moved backwards.
                if !(t < pp[n - 1]) {
                    return Locate::After;
                }
                return Self::locate_backward(pp, t, i1);
            }
            Self::locate_forward(pp, t, i1)
        } else {
            // t < times[i1]; the cached interval is valid if t also sits at
            // or right of the left key.
            if i1 >= 1 && pp[i1 - 1] <= t {
                return Locate::Unchanged(i1);
            }
            Self::locate_backward(pp, t, i1)
        }
    }

    /// Scans at most two intervals ahead of `i1`, then binary-searches the
    /// rest of the buffer. Entry condition: `t >= times[i1]`.
    fn locate_forward(pp: &[f32], t: f32, mut i1: usize) -> Locate {
        let n = pp.len();
        let give_up_at = i1 + 2;
        loop {
            if i1 == give_up_at {
                let idx = i1 + pp[i1..].partition_point(|&x| x <= t);
                return Self::classify(idx, n);
            }
            i1 += 1;
            if i1 == n {
                // Ran off the end; every key time was <= t.
                return Locate::After;
            }
            if t < pp[i1] {
                return Locate::Interval(i1);
            }
        }
    }

    /// Scans at most two intervals behind `i1`, then binary-searches the
    /// range in front of it. Entry condition: `t < times[i1 - 1]` (or the
    /// cache was past the end with `t` before the last key).
    fn locate_backward(pp: &[f32], t: f32, mut i1: usize) -> Locate {
        let n = pp.len();
        // A loop wrap usually lands in the first interval; aim the scan
        // there directly.
        if t < pp[1] {
            i1 = 2;
        }
        let give_up_at = i1.saturating_sub(2);
        loop {
            if i1 == give_up_at {
                let idx = pp[..i1].partition_point(|&x| x <= t);
                return Self::classify(idx, n);
            }
            i1 -= 1;
            if i1 == 0 {
                return Locate::Before;
            }
            if pp[i1 - 1] <= t {
                return Locate::Interval(i1);
            }
        }
    }

    fn classify(i1: usize, n: usize) -> Locate {
        if i1 == 0 {
            Locate::Before
        } else if i1 >= n {
            Locate::After
        } else {
            Locate::Interval(i1)
        }
    }

    /// Refreshes the cubic scratch state for a new interval, applying the
    /// ending policies when the interval touches a track boundary.
    fn interval_changed(&mut self, i1: usize) {
        if !matches!(self.basis, Basis::Cubic) {
            return;
        }
        let pp = &self.times;
        let n = pp.len();
        let t0 = pp[i1 - 1];
        let t1 = pp[i1];

        let (i_prev, t_prev) = if i1 >= 2 {
            (i1 - 2, pp[i1 - 2])
        } else {
            match self.ending_start {
                // f'(t0) = 0
                Ending::ZeroSlope => (i1, 2.0 * t0 - t1),
                // continue from the other end of the curve
                Ending::WrapAround => (n - 2, t0 + pp[n - 2] - pp[n - 1]),
                // f''(t0) = 0, natural spline
                Ending::ZeroCurvature => (i1, t1),
            }
        };
        let (i_next, t_next) = if i1 + 1 < n {
            (i1 + 1, pp[i1 + 1])
        } else {
            match self.ending_end {
                Ending::ZeroSlope => (i1, 2.0 * t1 - t0),
                Ending::WrapAround => (1, t1 + pp[1] - pp[0]),
                Ending::ZeroCurvature => (i1 - 1, t0),
            }
        };

        let half_dt = (t1 - t0) * 0.5;
        self.weight_prev = half_dt / (t0 - t_prev);
        self.weight_next = half_dt / (t_next - t1);
        self.offset_prev = i_prev * self.value_size;
        self.offset_next = i_next * self.value_size;
    }

    fn interpolate(&mut self, i1: usize, t: f32) -> &[f32] {
        let t0 = self.times[i1 - 1];
        let t1 = self.times[i1];
        let size = self.value_size;
        match &self.basis {
            Basis::Discrete => copy_into(&mut self.result, &self.values, size, i1 - 1),
            Basis::Linear => lerp_into(&mut self.result, &self.values, size, i1, t0, t, t1),
            Basis::Spherical => slerp_into(&mut self.result, &self.values, size, i1, t0, t, t1),
            Basis::Cubic => hermite_into(
                &mut self.result,
                &self.values,
                size,
                i1,
                t0,
                t,
                t1,
                self.weight_prev,
                self.weight_next,
                self.offset_prev,
                self.offset_next,
            ),
            Basis::Bezier {
                in_tangents,
                out_tangents,
            } => bezier_into(
                &mut self.result,
                &self.values,
                in_tangents,
                out_tangents,
                size,
                i1,
                t0,
                t,
                t1,
            ),
        }
        &self.result
    }
}

fn check_buffers(times: &[f32], values: &[f32], value_size: usize) -> Result<()> {
    if times.is_empty() {
        return Err(MixError::NoKeyframes);
    }
    if value_size == 0 || values.len() != times.len() * value_size {
        return Err(MixError::RaggedSamples {
            keys: times.len(),
            got: values.len(),
        });
    }
    Ok(())
}

#[inline]
fn copy_into(result: &mut [f32], values: &[f32], size: usize, key: usize) {
    let offset = key * size;
    result[..size].copy_from_slice(&values[offset..offset + size]);
}

fn lerp_into(result: &mut [f32], values: &[f32], size: usize, i1: usize, t0: f32, t: f32, t1: f32) {
    let o1 = i1 * size;
    let o0 = o1 - size;
    let w1 = (t - t0) / (t1 - t0);
    let w0 = 1.0 - w1;
    for i in 0..size {
        result[i] = values[o0 + i] * w0 + values[o1 + i] * w1;
    }
}

fn slerp_into(
    result: &mut [f32],
    values: &[f32],
    size: usize,
    i1: usize,
    t0: f32,
    t: f32,
    t1: f32,
) {
    let o1 = i1 * size;
    let o0 = o1 - size;
    let alpha = (t - t0) / (t1 - t0);
    for q in (0..size).step_by(4) {
        let a = Quat::from_xyzw(
            values[o0 + q],
            values[o0 + q + 1],
            values[o0 + q + 2],
            values[o0 + q + 3],
        );
        let b = Quat::from_xyzw(
            values[o1 + q],
            values[o1 + q + 1],
            values[o1 + q + 2],
            values[o1 + q + 3],
        );
        // glam takes the shortest arc and falls back to nlerp when the
        // rotations are nearly parallel.
        let blended = a.slerp(b, alpha);
        result[q] = blended.x;
        result[q + 1] = blended.y;
        result[q + 2] = blended.z;
        result[q + 3] = blended.w;
    }
}

#[allow(clippy::too_many_arguments)]
fn hermite_into(
    result: &mut [f32],
    values: &[f32],
    size: usize,
    i1: usize,
    t0: f32,
    t: f32,
    t1: f32,
    w_prev: f32,
    w_next: f32,
    o_prev: usize,
    o_next: usize,
) {
    let o1 = i1 * size;
    let o0 = o1 - size;

    let p = (t - t0) / (t1 - t0);
    let pp = p * p;
    let ppp = pp * p;

    let s_p = -w_prev * ppp + 2.0 * w_prev * pp - w_prev * p;
    let s0 = (1.0 + w_prev) * ppp + (-1.5 - 2.0 * w_prev) * pp + (-0.5 + w_prev) * p + 1.0;
    let s1 = (-1.0 - w_next) * ppp + (1.5 + w_next) * pp + 0.5 * p;
    let s_n = w_next * ppp - w_next * pp;

    for i in 0..size {
        result[i] = s_p * values[o_prev + i]
            + s0 * values[o0 + i]
            + s1 * values[o1 + i]
            + s_n * values[o_next + i];
    }
}

#[allow(clippy::too_many_arguments)]
fn bezier_into(
    result: &mut [f32],
    values: &[f32],
    in_tangents: &[f32],
    out_tangents: &[f32],
    size: usize,
    i1: usize,
    t0: f32,
    t: f32,
    t1: f32,
) {
    let o1 = i1 * size;
    let o0 = o1 - size;
    let dt = t1 - t0;

    let p = (t - t0) / dt;
    let p2 = p * p;
    let p3 = p2 * p;

    let h00 = 2.0 * p3 - 3.0 * p2 + 1.0;
    let h10 = p3 - 2.0 * p2 + p;
    let h01 = -2.0 * p3 + 3.0 * p2;
    let h11 = p3 - p2;

    for i in 0..size {
        let v0 = values[o0 + i];
        let v1 = values[o1 + i];
        let m0 = handle_slope(out_tangents, i1 - 1, size, i);
        let m1 = handle_slope(in_tangents, i1, size, i);
        result[i] = h00 * v0 + h10 * dt * m0 + h01 * v1 + h11 * dt * m1;
    }
}

/// Slope of one handle, `(time, value)` pairs laid out per key and
/// component. A degenerate handle (vanishing time offset) reads as flat.
#[inline]
fn handle_slope(tangents: &[f32], key: usize, size: usize, component: usize) -> f32 {
    let at = (key * size + component) * 2;
    let dt = tangents[at];
    let dv = tangents[at + 1];
    if dt.abs() > 1e-6 { dv / dt } else { 0.0 }
}
