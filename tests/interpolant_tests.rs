//! Interpolant Tests
//!
//! Tests for:
//! - Linear/discrete/spherical sampling and exact boundary behavior
//! - Interval cache coherence under forward, backward and jumping access
//! - Cubic ending policies (natural, zero slope, wrap around)
//! - Handle-driven Hermite (bezier) sampling
//! - Constructor validation errors

use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

use glam::Quat;
use keymix::{Ending, Interpolant, MixError};

const EPSILON: f32 = 1e-5;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn arc(values: &[f32]) -> Arc<[f32]> {
    values.to_vec().into()
}

// ============================================================================
// Linear sampling
// ============================================================================

#[test]
fn linear_midpoint_is_exact() {
    let mut ip = Interpolant::linear(arc(&[0.0, 1.0]), arc(&[0.0, 10.0]), 1).unwrap();
    let val = ip.evaluate(0.5)[0];
    assert!(approx(val, 5.0), "expected 5.0, got {val}");
}

#[test]
fn key_times_return_verbatim_samples() {
    // values chosen to expose any re-interpolation rounding
    let mut ip = Interpolant::linear(arc(&[0.25, 0.75]), arc(&[0.1, 0.3]), 1).unwrap();
    assert_eq!(ip.evaluate(0.25)[0], 0.1);
    assert_eq!(ip.evaluate(0.75)[0], 0.3);
}

#[test]
fn out_of_range_clamps_to_end_samples() {
    let mut ip = Interpolant::linear(arc(&[1.0, 2.0]), arc(&[10.0, 20.0]), 1).unwrap();
    assert_eq!(ip.evaluate(0.0)[0], 10.0);
    assert_eq!(ip.evaluate(5.0)[0], 20.0);
}

#[test]
fn single_key_is_constant() {
    let mut ip = Interpolant::linear(arc(&[0.0]), arc(&[42.0]), 1).unwrap();
    assert_eq!(ip.evaluate(-1.0)[0], 42.0);
    assert_eq!(ip.evaluate(0.0)[0], 42.0);
    assert_eq!(ip.evaluate(7.0)[0], 42.0);
}

#[test]
fn multi_component_values_blend_per_component() {
    let mut ip = Interpolant::linear(
        arc(&[0.0, 1.0]),
        arc(&[0.0, 0.0, 0.0, 10.0, 20.0, 30.0]),
        3,
    )
    .unwrap();
    let val = ip.evaluate(0.5);
    assert!(approx(val[0], 5.0));
    assert!(approx(val[1], 10.0));
    assert!(approx(val[2], 15.0));
}

// ============================================================================
// Discrete sampling
// ============================================================================

#[test]
fn discrete_holds_the_left_key() {
    let mut ip =
        Interpolant::discrete(arc(&[0.0, 1.0, 2.0]), arc(&[0.0, 100.0, 200.0]), 1).unwrap();
    assert_eq!(ip.evaluate(0.0)[0], 0.0);
    assert_eq!(ip.evaluate(0.99)[0], 0.0);
    assert_eq!(ip.evaluate(1.0)[0], 100.0);
    assert_eq!(ip.evaluate(1.5)[0], 100.0);
    assert_eq!(ip.evaluate(2.0)[0], 200.0);
}

// ============================================================================
// Interval cache
// ============================================================================

#[test]
fn coherent_scan_matches_random_access() {
    let times = [0.0, 1.0, 2.0, 3.0, 4.0];
    let values = [0.0, 10.0, 5.0, 20.0, 15.0];
    let mut scanning = Interpolant::linear(arc(&times), arc(&values), 1).unwrap();

    for i in 0..=80 {
        let t = i as f32 * 0.05;
        let scanned = scanning.evaluate(t)[0];
        let mut fresh = Interpolant::linear(arc(&times), arc(&values), 1).unwrap();
        let expected = fresh.evaluate(t)[0];
        assert!(
            approx(scanned, expected),
            "t={t}: scanned {scanned} != fresh {expected}"
        );
    }
}

#[test]
fn backward_scan_matches_random_access() {
    let times = [0.0, 1.0, 2.0, 3.0];
    let values = [0.0, 10.0, 20.0, 30.0];
    let mut scanning = Interpolant::linear(arc(&times), arc(&values), 1).unwrap();

    // park the cache at the end, then walk back through every interval
    let _ = scanning.evaluate(3.0);
    for i in (0..=30).rev() {
        let t = i as f32 * 0.1;
        let scanned = scanning.evaluate(t)[0];
        assert!(
            approx(scanned, t * 10.0),
            "t={t}: expected {}, got {scanned}",
            t * 10.0
        );
    }
}

#[test]
fn jumps_across_the_buffer_stay_correct() {
    let times = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
    let values = [0.0, 10.0, 20.0, 30.0, 40.0, 50.0];
    let mut ip = Interpolant::linear(arc(&times), arc(&values), 1).unwrap();

    // loop-wrap style jump: near the end, then back to the first interval
    assert!(approx(ip.evaluate(4.9)[0], 49.0));
    assert!(approx(ip.evaluate(0.1)[0], 1.0));
    // scrub forward far past the cached interval
    assert!(approx(ip.evaluate(3.7)[0], 37.0));
    // and clamp off both ends
    assert_eq!(ip.evaluate(9.0)[0], 50.0);
    assert_eq!(ip.evaluate(-2.0)[0], 0.0);
}

// ============================================================================
// Spherical sampling
// ============================================================================

#[test]
fn spherical_midpoint_is_half_the_arc() {
    let a = Quat::IDENTITY;
    let b = Quat::from_rotation_y(FRAC_PI_2);
    let mut values = Vec::new();
    values.extend_from_slice(&a.to_array());
    values.extend_from_slice(&b.to_array());

    let mut ip = Interpolant::spherical(arc(&[0.0, 1.0]), arc(&values), 4).unwrap();
    let out = ip.evaluate(0.5);
    let got = Quat::from_xyzw(out[0], out[1], out[2], out[3]);
    let expected = a.slerp(b, 0.5);
    let angle = got.angle_between(expected);
    assert!(angle < 1e-4, "slerp mismatch: angle={angle}");
}

#[test]
fn spherical_takes_the_shortest_arc() {
    // same rotation, opposite sign convention on the second key
    let a = Quat::from_rotation_y(0.2);
    let b = Quat::from_rotation_y(0.4);
    let negated = [-b.x, -b.y, -b.z, -b.w];
    let mut values = Vec::new();
    values.extend_from_slice(&a.to_array());
    values.extend_from_slice(&negated);

    let mut ip = Interpolant::spherical(arc(&[0.0, 1.0]), arc(&values), 4).unwrap();
    let out = ip.evaluate(0.5);
    let got = Quat::from_xyzw(out[0], out[1], out[2], out[3]);
    let expected = Quat::from_rotation_y(0.3);
    let angle = got.angle_between(expected);
    assert!(angle < 1e-3, "expected the short way around, angle={angle}");
}

// ============================================================================
// Cubic ending policies
// ============================================================================

#[test]
fn cubic_two_keys_natural_spline_is_the_straight_line() {
    let mut ip = Interpolant::cubic(arc(&[0.0, 1.0]), arc(&[0.0, 10.0]), 1).unwrap();
    assert!(approx(ip.evaluate(0.5)[0], 5.0));
    assert!(approx(ip.evaluate(0.1)[0], 1.0));
    assert!(approx(ip.evaluate(0.9)[0], 9.0));
}

#[test]
fn cubic_boundaries_are_exact() {
    let mut ip =
        Interpolant::cubic(arc(&[0.0, 1.0, 2.0]), arc(&[0.25, 10.5, 3.75]), 1).unwrap();
    assert_eq!(ip.evaluate(0.0)[0], 0.25);
    assert!(approx(ip.evaluate(1.0)[0], 10.5));
    assert_eq!(ip.evaluate(2.0)[0], 3.75);
}

#[test]
fn cubic_zero_slope_ending_flattens_the_start() {
    let mut natural = Interpolant::cubic(arc(&[0.0, 1.0]), arc(&[0.0, 10.0]), 1).unwrap();
    let mut flat = Interpolant::cubic(arc(&[0.0, 1.0]), arc(&[0.0, 10.0]), 1).unwrap();
    flat.set_endings(Ending::ZeroSlope, Ending::ZeroSlope);

    let natural_early = natural.evaluate(0.1)[0];
    let flat_early = flat.evaluate(0.1)[0];
    assert!(approx(natural_early, 1.0));
    assert!(
        flat_early < 0.5,
        "zero slope should hug the first key, got {flat_early}"
    );
    // the boundary keys themselves stay exact
    assert_eq!(flat.evaluate(0.0)[0], 0.0);
    assert_eq!(flat.evaluate(1.0)[0], 10.0);
}

#[test]
fn cubic_wrap_around_ending_changes_the_interior_only() {
    let times = [0.0, 1.0, 2.0];
    let values = [0.0, 10.0, 4.0];
    let mut natural = Interpolant::cubic(arc(&times), arc(&values), 1).unwrap();
    let mut wrapped = Interpolant::cubic(arc(&times), arc(&values), 1).unwrap();
    wrapped.set_endings(Ending::WrapAround, Ending::WrapAround);

    let natural_early = natural.evaluate(0.25)[0];
    let wrapped_early = wrapped.evaluate(0.25)[0];
    assert!(
        (natural_early - wrapped_early).abs() > 1e-4,
        "wrap around should pull the boundary tangent, both gave {natural_early}"
    );
    assert_eq!(wrapped.evaluate(0.0)[0], 0.0);
    assert_eq!(wrapped.evaluate(2.0)[0], 4.0);
}

// ============================================================================
// Handle-driven Hermite
// ============================================================================

#[test]
fn bezier_flat_handles_cross_at_the_midpoint() {
    // one (dt, dv) pair per key and component; dv = 0 keeps the slope flat
    let in_tangents = arc(&[-0.1, 0.0, -0.1, 0.0]);
    let out_tangents = arc(&[0.1, 0.0, 0.1, 0.0]);
    let mut ip = Interpolant::bezier(
        arc(&[0.0, 1.0]),
        arc(&[0.0, 10.0]),
        1,
        in_tangents,
        out_tangents,
    )
    .unwrap();
    assert!(approx(ip.evaluate(0.5)[0], 5.0));
    assert_eq!(ip.evaluate(0.0)[0], 0.0);
    assert_eq!(ip.evaluate(1.0)[0], 10.0);
}

#[test]
fn bezier_out_handle_steers_the_curve() {
    // steep outgoing handle on the first key: slope 30
    let in_tangents = arc(&[-0.1, 0.0, -0.1, 0.0]);
    let out_tangents = arc(&[0.1, 3.0, 0.1, 0.0]);
    let mut ip = Interpolant::bezier(
        arc(&[0.0, 1.0]),
        arc(&[0.0, 10.0]),
        1,
        in_tangents,
        out_tangents,
    )
    .unwrap();
    let early = ip.evaluate(0.25)[0];
    assert!(
        early > 2.5 + EPSILON,
        "steep handle should overshoot the linear blend, got {early}"
    );
    assert_eq!(ip.evaluate(1.0)[0], 10.0);
}

#[test]
fn bezier_degenerate_handles_read_flat() {
    // vanishing time offsets must not divide by zero
    let in_tangents = arc(&[0.0, 5.0, 0.0, 5.0]);
    let out_tangents = arc(&[0.0, 5.0, 0.0, 5.0]);
    let mut ip = Interpolant::bezier(
        arc(&[0.0, 1.0]),
        arc(&[0.0, 10.0]),
        1,
        in_tangents,
        out_tangents,
    )
    .unwrap();
    assert!(approx(ip.evaluate(0.5)[0], 5.0));
}

// ============================================================================
// Constructor validation
// ============================================================================

#[test]
fn empty_time_buffer_is_rejected() {
    let err = Interpolant::linear(arc(&[]), arc(&[]), 1).unwrap_err();
    assert!(matches!(err, MixError::NoKeyframes));
}

#[test]
fn ragged_sample_buffer_is_rejected() {
    let err = Interpolant::linear(arc(&[0.0, 1.0]), arc(&[1.0, 2.0, 3.0]), 2).unwrap_err();
    assert!(matches!(err, MixError::RaggedSamples { keys: 2, got: 3 }));
}

#[test]
fn spherical_requires_quaternion_strides() {
    let err =
        Interpolant::spherical(arc(&[0.0, 1.0]), arc(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0]), 3)
            .unwrap_err();
    assert!(matches!(err, MixError::BadRotationSize(3)));
}

#[test]
fn bezier_tangent_buffers_must_match_the_keys() {
    let err = Interpolant::bezier(
        arc(&[0.0, 1.0]),
        arc(&[0.0, 10.0]),
        1,
        arc(&[0.0, 0.0]),
        arc(&[0.1, 0.0, 0.1, 0.0]),
    )
    .unwrap_err();
    assert!(matches!(err, MixError::TangentMismatch { expected: 4, got: 2 }));
}
