//! Animation Actions
//!
//! This module defines [`AnimationAction`], the per-playback state machine
//! scheduling one clip on one root.
//!
//! # Overview
//!
//! An action owns a sampler per clip track plus all playback state: local
//! time, loop accounting, pause/enable flags, weight and time scale. The
//! mixer drives it once per frame; the action advances its local time per
//! its [`LoopMode`], refreshes the effective weight and time scale, and
//! accumulates every track's sample into the mixer's property slots.
//!
//! Weight and time scale each split into a *set* value and an *effective*
//! value. The effective value is what a frame actually uses: it drops to
//! zero while disabled (weight) or paused (time scale), and is further
//! shaped by an optional two-key control ramp: a **fade** for weight, a
//! **warp** for time scale. Ramps are scheduled against global mixer time,
//! evaluate with boundary clamping, and discard themselves once their end
//! passes; a ramp that resolves to zero disables (fade) or pauses (warp)
//! the action.
//!
//! # States
//!
//! `idle → scheduled → running ⇄ paused`, plus *finished* once a Once clip
//! clamps or a repetition budget runs out. Finishing disables the action
//! (or pauses it when `clamp_when_finished` is set, holding the boundary
//! pose) and emits exactly one [`MixerEvent::Finished`].

use slotmap::SlotMap;

use crate::clip::{AnimationClip, BlendMode};
use crate::interpolant::Ending;
use crate::mixer::{ActionHandle, MixSlot, MixerEvent, SlotKey, SlotMix};
use crate::target::AnimationGraph;
use crate::track::{KeyframeTrack, TrackSampler};

/// How an action's local time behaves at the clip boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    /// Play through once and clamp at the boundary.
    Once,
    /// Wrap around, counting repetitions.
    #[default]
    Repeat,
    /// Wrap around, reversing direction every pass.
    PingPong,
}

/// A two-key linear ramp over global mixer time, clamped at both ends.
/// Backs the fade (weight) and warp (time scale) controls.
#[derive(Debug, Clone)]
struct ControlInterpolant {
    times: [f32; 2],
    values: [f32; 2],
}

impl ControlInterpolant {
    fn new(times: [f32; 2], values: [f32; 2]) -> Self {
        Self { times, values }
    }

    fn evaluate(&self, t: f32) -> f32 {
        let [t0, t1] = self.times;
        let [v0, v1] = self.values;
        if t <= t0 || t1 <= t0 {
            v0
        } else if t >= t1 {
            v1
        } else {
            v0 + (v1 - v0) * ((t - t0) / (t1 - t0))
        }
    }

    fn end_time(&self) -> f32 {
        self.times[1]
    }
}

/// Scheduled playback of one clip on one root.
///
/// Created through [`AnimationMixer::clip_action`](crate::AnimationMixer::clip_action)
/// and addressed by [`ActionHandle`] afterwards.
#[derive(Debug)]
pub struct AnimationAction {
    clip: AnimationClip,
    samplers: Vec<TrackSampler>,

    // === Playback state ===
    time: f32,
    time_scale: f32,
    effective_time_scale: f32,
    weight: f32,
    effective_weight: f32,
    loop_mode: LoopMode,
    repetitions: u32,
    loop_count: i32,
    start_time: Option<f32>,
    paused: bool,
    enabled: bool,
    clamp_when_finished: bool,
    zero_slope_at_start: bool,
    zero_slope_at_end: bool,
    blend_mode: BlendMode,

    // === Control ramps ===
    weight_curve: Option<ControlInterpolant>,
    warp_curve: Option<ControlInterpolant>,
}

impl AnimationAction {
    pub(crate) fn new(clip: AnimationClip, blend_mode: BlendMode) -> Self {
        let samplers = clip.tracks().iter().map(KeyframeTrack::sampler).collect();
        Self {
            clip,
            samplers,
            time: 0.0,
            time_scale: 1.0,
            effective_time_scale: 1.0,
            weight: 1.0,
            effective_weight: 1.0,
            loop_mode: LoopMode::default(),
            repetitions: u32::MAX,
            loop_count: -1,
            start_time: None,
            paused: false,
            enabled: true,
            clamp_when_finished: false,
            zero_slope_at_start: true,
            zero_slope_at_end: true,
            blend_mode,
            weight_curve: None,
            warp_curve: None,
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// The clip this action plays.
    #[inline]
    #[must_use]
    pub fn clip(&self) -> &AnimationClip {
        &self.clip
    }

    /// Local clip time in seconds, clamped or wrapped per the loop mode.
    #[inline]
    #[must_use]
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Jumps the local clip time.
    pub fn set_time(&mut self, time: f32) {
        self.time = time;
    }

    /// The set playback rate (1 is natural speed, negative runs backwards).
    #[inline]
    #[must_use]
    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// Sets the playback rate without touching a running warp.
    pub fn set_time_scale(&mut self, time_scale: f32) {
        self.time_scale = time_scale;
    }

    /// The playback rate actually in effect (zero while paused, shaped by a
    /// running warp).
    #[inline]
    #[must_use]
    pub fn effective_time_scale(&self) -> f32 {
        self.effective_time_scale
    }

    /// Sets the playback rate and cancels any running warp.
    pub fn set_effective_time_scale(&mut self, time_scale: f32) {
        self.time_scale = time_scale;
        self.effective_time_scale = if self.paused { 0.0 } else { time_scale };
        self.stop_warping();
    }

    /// The set blend weight.
    #[inline]
    #[must_use]
    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// Sets the blend weight without touching a running fade.
    pub fn set_weight(&mut self, weight: f32) {
        self.weight = weight;
    }

    /// The blend weight actually in effect (zero while disabled, shaped by
    /// a running fade).
    #[inline]
    #[must_use]
    pub fn effective_weight(&self) -> f32 {
        self.effective_weight
    }

    /// Sets the blend weight and cancels any running fade.
    pub fn set_effective_weight(&mut self, weight: f32) {
        self.weight = weight;
        self.effective_weight = if self.enabled { weight } else { 0.0 };
        self.stop_fading();
    }

    /// The loop mode in effect.
    #[inline]
    #[must_use]
    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    /// Sets the loop mode and the repetition budget (`u32::MAX` repeats
    /// without bound; `Once` ignores the budget).
    pub fn set_loop(&mut self, mode: LoopMode, repetitions: u32) {
        self.loop_mode = mode;
        self.repetitions = repetitions;
    }

    /// The repetition budget.
    #[inline]
    #[must_use]
    pub fn repetitions(&self) -> u32 {
        self.repetitions
    }

    /// Completed loops since the last reset, once playback has started.
    #[must_use]
    pub fn loop_count(&self) -> Option<u32> {
        u32::try_from(self.loop_count).ok()
    }

    /// Whether the action is paused (effective time scale zero).
    #[inline]
    #[must_use]
    pub fn paused(&self) -> bool {
        self.paused
    }

    /// Pauses or resumes local time.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Whether the action is enabled (disabled actions keep their state but
    /// contribute zero weight).
    #[inline]
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Enables or disables the action without resetting it.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether a finished Once action holds the boundary pose instead of
    /// disabling.
    #[inline]
    #[must_use]
    pub fn clamp_when_finished(&self) -> bool {
        self.clamp_when_finished
    }

    /// Sets the finish behavior: hold the boundary pose (`true`) or disable.
    pub fn set_clamp_when_finished(&mut self, clamp: bool) {
        self.clamp_when_finished = clamp;
    }

    /// Forces flat tangents where the clip starts, for smooth tracks.
    pub fn set_zero_slope_at_start(&mut self, zero_slope: bool) {
        self.zero_slope_at_start = zero_slope;
    }

    /// Forces flat tangents where the clip ends, for smooth tracks.
    pub fn set_zero_slope_at_end(&mut self, zero_slope: bool) {
        self.zero_slope_at_end = zero_slope;
    }

    /// How this action composes with others.
    #[inline]
    #[must_use]
    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    /// The deferred start, in global mixer time, if one is scheduled.
    #[inline]
    #[must_use]
    pub fn start_time(&self) -> Option<f32> {
        self.start_time
    }

    // ------------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------------

    /// Defers the start until the given global mixer time: the action stays
    /// at rest, then begins advancing as if started exactly then.
    pub fn start_at(&mut self, time: f32) {
        self.start_time = Some(time);
    }

    /// Returns the action to its initial playback state: time zero, loop
    /// accounting forgotten, any fade or warp cancelled. Scheduling on the
    /// mixer is not affected.
    pub fn reset(&mut self) {
        self.paused = false;
        self.enabled = true;
        self.time = 0.0;
        self.loop_count = -1;
        self.start_time = None;
        self.stop_fading();
        self.stop_warping();
    }

    /// Adjusts the time scale so one pass of the clip takes `duration`
    /// seconds, cancelling any running warp.
    pub fn set_duration(&mut self, duration: f32) {
        self.time_scale = self.clip.duration() / duration;
        self.stop_warping();
    }

    /// Adopts another action's local time and time scale, cancelling any
    /// running warp. Both actions then play in phase.
    pub fn sync_with(&mut self, other: &AnimationAction) {
        self.time = other.time;
        self.time_scale = other.time_scale;
        self.stop_warping();
    }

    /// Cancels a running fade, freezing the weight at its set value.
    pub fn stop_fading(&mut self) {
        self.weight_curve = None;
    }

    /// Cancels a running warp, freezing the time scale at its set value.
    pub fn stop_warping(&mut self) {
        self.warp_curve = None;
    }

    /// Whether a fade is currently shaping the weight.
    #[must_use]
    pub fn is_fading(&self) -> bool {
        self.weight_curve.is_some()
    }

    /// Whether a warp is currently shaping the time scale.
    #[must_use]
    pub fn is_warping(&self) -> bool {
        self.warp_curve.is_some()
    }

    pub(crate) fn schedule_fade(&mut self, now: f32, duration: f32, from: f32, to: f32) {
        self.weight_curve = Some(ControlInterpolant::new([now, now + duration], [from, to]));
    }

    pub(crate) fn schedule_warp(
        &mut self,
        now: f32,
        start_scale: f32,
        end_scale: f32,
        duration: f32,
    ) {
        // The ramp stores ratios against the set time scale, which stays
        // the multiplier in effect. A halted (zero) base scale resets to 1
        // first; the ratios are undefined against zero.
        if self.time_scale == 0.0 {
            self.time_scale = 1.0;
        }
        let time_scale = self.time_scale;
        self.warp_curve = Some(ControlInterpolant::new(
            [now, now + duration],
            [start_scale / time_scale, end_scale / time_scale],
        ));
    }

    // ------------------------------------------------------------------------
    // Per-frame update
    // ------------------------------------------------------------------------

    /// Advances the action by one frame and accumulates its contribution
    /// into the mixer's property slots.
    pub(crate) fn update<G: AnimationGraph>(
        &mut self,
        handle: ActionHandle,
        time: f32,
        mut delta: f32,
        direction: f32,
        accu_index: usize,
        slot_keys: &[SlotKey],
        slots: &mut SlotMap<SlotKey, MixSlot<G>>,
        events: &mut Vec<MixerEvent>,
    ) {
        if !self.enabled {
            // keep the weight ramp evaluating while disabled
            self.update_weight(time);
            return;
        }

        if let Some(start_time) = self.start_time {
            let running_for = (time - start_time) * direction;
            if running_for < 0.0 || direction == 0.0 {
                delta = 0.0;
            } else {
                // unschedule and catch up from the scheduled instant
                self.start_time = None;
                delta = direction * running_for;
            }
        }

        delta *= self.update_time_scale(time);
        let clip_time = self.update_time(delta, handle, events);

        // update_time may have disabled the action, zeroing the weight
        let weight = self.update_weight(time);
        if weight > 0.0 {
            let additive = self.blend_mode == BlendMode::Additive;
            for (sampler, &key) in self.samplers.iter_mut().zip(slot_keys) {
                let Some(slot) = slots.get_mut(key) else {
                    continue;
                };
                match (sampler, &mut slot.mix) {
                    (TrackSampler::Curve(interpolant), SlotMix::Numeric(mix)) => {
                        let value = interpolant.evaluate(clip_time);
                        if additive {
                            mix.accumulate_additive(weight, value);
                        } else {
                            mix.accumulate(accu_index, weight, value);
                        }
                    }
                    (TrackSampler::Text(sampler), SlotMix::Text(mix)) => {
                        let value = sampler.evaluate(clip_time);
                        if additive {
                            mix.accumulate_additive(weight, value);
                        } else {
                            mix.accumulate(accu_index, weight, value);
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    fn update_weight(&mut self, time: f32) -> f32 {
        let mut weight = 0.0;
        if self.enabled {
            weight = self.weight;
            if let Some(curve) = &self.weight_curve {
                let value = curve.evaluate(time);
                let expired = time > curve.end_time();
                weight *= value;
                if expired {
                    self.weight_curve = None;
                    if value == 0.0 {
                        // faded out, disable
                        self.enabled = false;
                    }
                }
            }
        }
        self.effective_weight = weight;
        weight
    }

    fn update_time_scale(&mut self, time: f32) -> f32 {
        let mut time_scale = 0.0;
        if !self.paused {
            time_scale = self.time_scale;
            if let Some(curve) = &self.warp_curve {
                let value = curve.evaluate(time);
                let expired = time > curve.end_time();
                time_scale *= value;
                if expired {
                    self.warp_curve = None;
                    if time_scale == 0.0 {
                        // motion has halted, pause
                        self.paused = true;
                    } else {
                        // warp done, adopt the final rate
                        self.time_scale = time_scale;
                    }
                }
            }
        }
        self.effective_time_scale = time_scale;
        time_scale
    }

    fn update_time(
        &mut self,
        delta: f32,
        handle: ActionHandle,
        events: &mut Vec<MixerEvent>,
    ) -> f32 {
        let duration = self.clip.duration();
        let ping_pong = self.loop_mode == LoopMode::PingPong;
        let mut time = self.time + delta;

        if delta == 0.0 {
            if self.loop_count == -1 {
                return time;
            }
            return if ping_pong && (self.loop_count & 1) == 1 {
                duration - time
            } else {
                time
            };
        }

        if self.loop_mode == LoopMode::Once {
            if self.loop_count == -1 {
                // just started
                self.loop_count = 0;
                self.set_endings(true, true, false);
            }
            if time >= duration {
                time = duration;
            } else if time < 0.0 {
                time = 0.0;
            } else {
                self.time = time;
                return time;
            }
            if self.clamp_when_finished {
                self.paused = true;
            } else {
                self.enabled = false;
            }
            self.time = time;
            events.push(MixerEvent::Finished {
                action: handle,
                direction: if delta < 0.0 { -1 } else { 1 },
            });
            return time;
        }

        // Repeat and PingPong
        if self.loop_count == -1 {
            if delta >= 0.0 {
                self.loop_count = 0;
                self.set_endings(true, self.repetitions == 0, ping_pong);
            } else {
                // a reverse start's first pass through zero counts as a
                // repetition, so the counter stays unset here
                self.set_endings(self.repetitions == 0, true, ping_pong);
            }
        }
        let mut count = i64::from(self.loop_count);

        if time >= duration || time < 0.0 {
            // wrap around
            let loop_delta = (time / duration).floor();
            time -= duration * loop_delta;
            count += i64::from(loop_delta.abs() as i32);

            let pending = i64::from(self.repetitions) - count;
            if pending <= 0 {
                // repetition budget exhausted
                if self.clamp_when_finished {
                    self.paused = true;
                } else {
                    self.enabled = false;
                }
                time = if delta > 0.0 { duration } else { 0.0 };
                self.time = time;
                events.push(MixerEvent::Finished {
                    action: handle,
                    direction: if delta > 0.0 { 1 } else { -1 },
                });
            } else {
                if pending == 1 {
                    // entering the last round
                    let at_start = delta < 0.0;
                    self.set_endings(at_start, !at_start, ping_pong);
                } else {
                    self.set_endings(false, false, ping_pong);
                }
                self.loop_count = count as i32;
                self.time = time;
                events.push(MixerEvent::Loop {
                    action: handle,
                    loop_delta: loop_delta as i32,
                });
            }
        } else {
            self.time = time;
        }

        if ping_pong && (count & 1) == 1 {
            // the pong round plays the clip mirrored
            return duration - time;
        }
        time
    }

    /// Reconfigures every smooth sampler's boundary tangents for the
    /// current position in the loop schedule.
    fn set_endings(&mut self, at_start: bool, at_end: bool, ping_pong: bool) {
        let (start, end) = if ping_pong {
            (Ending::ZeroSlope, Ending::ZeroSlope)
        } else {
            let start = if at_start {
                if self.zero_slope_at_start {
                    Ending::ZeroSlope
                } else {
                    Ending::ZeroCurvature
                }
            } else {
                Ending::WrapAround
            };
            let end = if at_end {
                if self.zero_slope_at_end {
                    Ending::ZeroSlope
                } else {
                    Ending::ZeroCurvature
                }
            } else {
                Ending::WrapAround
            };
            (start, end)
        };
        for sampler in &mut self.samplers {
            if let TrackSampler::Curve(interpolant) = sampler {
                interpolant.set_endings(start, end);
            }
        }
    }
}
