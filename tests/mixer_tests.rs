//! Animation Mixer Tests
//!
//! Tests for:
//! - Action memoization per clip and root
//! - Shared property slots and weighted blending across actions
//! - Additive layering on top of a normal blend
//! - Rest-pose capture on activation and restore on stop
//! - Change detection gating the write back
//! - Group-driven playback, discarding, events, stats, set_time

mod common;

use common::Rig;
use keymix::{
    AnimationClip, AnimationMixer, BlendMode, KeyframeTrack, LoopMode, MixerEvent, ObjectGroup,
};

const EPSILON: f32 = 1e-5;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn position_clip(name: &str, track_name: &str, from_x: f32, to_x: f32) -> AnimationClip {
    AnimationClip::new(
        name,
        -1.0,
        vec![KeyframeTrack::vector(
            track_name,
            vec![0.0, 1.0],
            vec![from_x, 0.0, 0.0, to_x, 0.0, 0.0],
        )
        .unwrap()],
    )
}

fn mesh_x(rig: &Rig) -> f32 {
    rig.node("Mesh").position[0]
}

// ============================================================================
// Action memoization
// ============================================================================

#[test]
fn clip_action_memoizes_per_clip_and_root() {
    let rig = Rig::new();
    let mut mixer: AnimationMixer<Rig> = AnimationMixer::new(rig.root());
    let clip = position_clip("Slide", "Mesh.position", 0.0, 10.0);

    let first = mixer.clip_action(&clip).unwrap();
    let second = mixer.clip_action(&clip).unwrap();
    assert_eq!(first, second);
    assert_eq!(mixer.existing_action(&clip), Some(first));

    // a cloned clip has its own identity and therefore its own action
    let copy = clip.clone();
    let third = mixer.clip_action(&copy).unwrap();
    assert_ne!(first, third);

    // same clip, different root
    let fourth = mixer
        .clip_action_with_root(&clip, rig.node_named("Mesh"))
        .unwrap();
    assert_ne!(first, fourth);
    assert_eq!(mixer.stats().actions, 3);
}

#[test]
fn actions_on_the_same_property_share_one_slot() {
    let rig = Rig::new();
    let mut mixer: AnimationMixer<Rig> = AnimationMixer::new(rig.root());
    let a = position_clip("A", "Mesh.position", 0.0, 10.0);
    let b = position_clip("B", "Mesh.position", 5.0, 5.0);

    mixer.clip_action(&a).unwrap();
    mixer.clip_action(&b).unwrap();
    assert_eq!(mixer.stats().actions, 2);
    assert_eq!(mixer.stats().bindings, 1, "one slot per (root, track path)");
}

#[test]
fn malformed_track_names_fail_action_creation() {
    let rig = Rig::new();
    let mut mixer: AnimationMixer<Rig> = AnimationMixer::new(rig.root());
    let clip = AnimationClip::new(
        "Broken",
        -1.0,
        vec![KeyframeTrack::number("no_property_part", vec![0.0], vec![1.0]).unwrap()],
    );
    assert!(mixer.clip_action(&clip).is_err());
    assert_eq!(mixer.stats().bindings, 0, "no slot survives the failure");
}

// ============================================================================
// Blending
// ============================================================================

#[test]
fn equal_weights_average_their_contributions() {
    let mut rig = Rig::new();
    let mut mixer: AnimationMixer<Rig> = AnimationMixer::new(rig.root());
    let low = position_clip("Low", "Mesh.position", 2.0, 2.0);
    let high = position_clip("High", "Mesh.position", 8.0, 8.0);
    let a = mixer.clip_action(&low).unwrap();
    let b = mixer.clip_action(&high).unwrap();

    mixer.play(a);
    mixer.play(b);
    mixer.update(0.1, &mut rig);
    assert!(approx(mesh_x(&rig), 5.0), "got {}", mesh_x(&rig));
}

#[test]
fn underweight_blends_lean_on_the_rest_pose() {
    let mut rig = Rig::new();
    rig.nodes[4].position = [8.0, 0.0, 0.0];
    let mut mixer: AnimationMixer<Rig> = AnimationMixer::new(rig.root());
    let clip = position_clip("Zero", "Mesh.position", 0.0, 0.0);
    let handle = mixer.clip_action(&clip).unwrap();

    mixer.action_mut(handle).unwrap().set_effective_weight(0.25);
    mixer.play(handle);
    mixer.update(0.1, &mut rig);

    // a quarter of the sample, three quarters of the rest value
    assert!(approx(mesh_x(&rig), 6.0), "got {}", mesh_x(&rig));
}

#[test]
fn additive_layers_stack_on_a_normal_base() {
    let mut rig = Rig::new();
    let mut mixer: AnimationMixer<Rig> = AnimationMixer::new(rig.root());

    let base = position_clip("Base", "Mesh.position", 1.0, 1.0);
    let mut sway = position_clip("Sway", "Mesh.position", 2.0, 2.0);
    sway.set_blend_mode(BlendMode::Additive);
    let mut bounce = position_clip("Bounce", "Mesh.position", 4.0, 4.0);
    bounce.set_blend_mode(BlendMode::Additive);

    let base_action = mixer.clip_action(&base).unwrap();
    let sway_action = mixer.clip_action(&sway).unwrap();
    let bounce_action = mixer.clip_action(&bounce).unwrap();
    mixer.action_mut(sway_action).unwrap().set_effective_weight(0.3);
    mixer
        .action_mut(bounce_action)
        .unwrap()
        .set_effective_weight(0.5);

    mixer.play(base_action);
    mixer.play(sway_action);
    mixer.play(bounce_action);
    mixer.update(0.1, &mut rig);

    // 1.0 from the base, plus 0.3 * 2.0 and 0.5 * 4.0 on top
    assert!(approx(mesh_x(&rig), 3.6), "got {}", mesh_x(&rig));
    assert_eq!(mixer.stats().bindings, 1, "all three share the slot");
}

#[test]
fn additive_layers_alone_ride_on_the_rest_pose() {
    let mut rig = Rig::new();
    rig.nodes[4].position = [1.0, 0.0, 0.0];
    let mut mixer: AnimationMixer<Rig> = AnimationMixer::new(rig.root());

    let mut sway = position_clip("Sway", "Mesh.position", 2.0, 2.0);
    sway.set_blend_mode(BlendMode::Additive);
    let mut bounce = position_clip("Bounce", "Mesh.position", 4.0, 4.0);
    bounce.set_blend_mode(BlendMode::Additive);

    let sway_action = mixer.clip_action(&sway).unwrap();
    let bounce_action = mixer.clip_action(&bounce).unwrap();
    mixer.action_mut(sway_action).unwrap().set_effective_weight(0.3);
    mixer
        .action_mut(bounce_action)
        .unwrap()
        .set_effective_weight(0.5);

    mixer.play(sway_action);
    mixer.play(bounce_action);
    mixer.update(0.1, &mut rig);

    // no normal contributor, so the deltas stack on the rest value
    assert!(approx(mesh_x(&rig), 1.0 + 2.6), "got {}", mesh_x(&rig));
}

#[test]
fn quaternion_slots_blend_spherically() {
    use glam::Quat;
    use std::f32::consts::FRAC_PI_2;

    let mut rig = Rig::new();
    let mut mixer: AnimationMixer<Rig> = AnimationMixer::new(rig.root());

    let turn = Quat::from_rotation_y(FRAC_PI_2);
    let clip = AnimationClip::new(
        "Turn",
        -1.0,
        vec![KeyframeTrack::quaternion(
            "Bip01_Head.quaternion",
            vec![0.0, 1.0],
            vec![turn.x, turn.y, turn.z, turn.w, turn.x, turn.y, turn.z, turn.w],
        )
        .unwrap()],
    );
    let handle = mixer.clip_action(&clip).unwrap();

    // half weight against the identity rest rotation
    mixer.action_mut(handle).unwrap().set_effective_weight(0.5);
    mixer.play(handle);
    mixer.update(0.1, &mut rig);

    let stored = rig.node("Bip01_Head").rotation;
    let got = Quat::from_xyzw(stored[0], stored[1], stored[2], stored[3]);
    let expected = turn.slerp(Quat::IDENTITY, 0.5);
    assert!(
        got.abs_diff_eq(expected, EPSILON),
        "expected {expected:?}, got {got:?}"
    );
}

#[test]
fn string_tracks_switch_the_text_channel() {
    let mut rig = Rig::new();
    let mut mixer: AnimationMixer<Rig> = AnimationMixer::new(rig.root());
    let clip = AnimationClip::new(
        "Tagger",
        2.0,
        vec![KeyframeTrack::string(
            ".tag",
            vec![0.0, 1.0],
            vec!["crouch".to_string(), "stand".to_string()],
        )
        .unwrap()],
    );
    let handle = mixer.clip_action(&clip).unwrap();

    mixer.play(handle);
    mixer.update(0.5, &mut rig);
    assert_eq!(rig.node("Root").tag, "crouch");

    mixer.update(0.6, &mut rig);
    assert_eq!(rig.node("Root").tag, "stand");

    // stopping restores the original tag
    mixer.stop(handle);
    mixer.update(0.0, &mut rig);
    assert_eq!(rig.node("Root").tag, "idle");
}

#[test]
fn boolean_tracks_gate_a_flag() {
    let mut rig = Rig::new();
    let mut mixer: AnimationMixer<Rig> = AnimationMixer::new(rig.root());
    let clip = AnimationClip::new(
        "Blink",
        2.0,
        vec![KeyframeTrack::boolean("Mesh.visible", vec![0.0, 0.5], vec![true, false]).unwrap()],
    );
    let handle = mixer.clip_action(&clip).unwrap();

    mixer.play(handle);
    mixer.update(0.25, &mut rig);
    assert!(rig.node("Mesh").visible);

    mixer.update(0.5, &mut rig);
    assert!(!rig.node("Mesh").visible, "flag switches at the second key");

    mixer.stop(handle);
    mixer.update(0.0, &mut rig);
    assert!(rig.node("Mesh").visible, "rest state comes back");
}

// ============================================================================
// Rest pose save & restore
// ============================================================================

#[test]
fn stopping_restores_the_rest_pose() {
    let mut rig = Rig::new();
    rig.nodes[4].position = [9.0, 9.0, 9.0];
    let mut mixer: AnimationMixer<Rig> = AnimationMixer::new(rig.root());
    let clip = position_clip("Slide", "Mesh.position", 0.0, 10.0);
    let handle = mixer.clip_action(&clip).unwrap();

    mixer.play(handle);
    mixer.update(0.5, &mut rig);
    assert_eq!(rig.node("Mesh").position, [5.0, 0.0, 0.0]);
    assert_eq!(mixer.stats().bindings_in_use, 1);

    mixer.stop(handle);
    mixer.update(0.0, &mut rig);
    assert_eq!(rig.node("Mesh").position, [9.0, 9.0, 9.0]);
    assert_eq!(mixer.stats().bindings_in_use, 0);
    assert!(!mixer.is_scheduled(handle));
}

#[test]
fn replaying_between_updates_cancels_the_restore() {
    let mut rig = Rig::new();
    rig.nodes[4].position = [9.0, 9.0, 9.0];
    let mut mixer: AnimationMixer<Rig> = AnimationMixer::new(rig.root());
    let clip = position_clip("Slide", "Mesh.position", 0.0, 10.0);
    let handle = mixer.clip_action(&clip).unwrap();

    mixer.play(handle);
    mixer.update(0.5, &mut rig);

    mixer.stop(handle);
    mixer.play(handle);
    mixer.update(0.5, &mut rig);
    assert_eq!(
        rig.node("Mesh").position,
        [5.0, 0.0, 0.0],
        "stop was reset, so playback starts over without a restore flash"
    );

    mixer.stop(handle);
    mixer.update(0.0, &mut rig);
    assert_eq!(rig.node("Mesh").position, [9.0, 9.0, 9.0]);
}

#[test]
fn unchanged_results_skip_the_write_back() {
    let mut rig = Rig::new();
    let mut mixer: AnimationMixer<Rig> = AnimationMixer::new(rig.root());
    let clip = position_clip("Slide", "Mesh.position", 0.0, 10.0);
    let handle = mixer.clip_action(&clip).unwrap();

    mixer.play(handle);
    mixer.update(0.5, &mut rig);
    assert_eq!(rig.node("Mesh").world_matrix_bumps, 1);

    // a zero-delta frame produces the same value and must not re-write
    mixer.update(0.0, &mut rig);
    assert_eq!(rig.node("Mesh").world_matrix_bumps, 1);

    mixer.update(0.2, &mut rig);
    assert_eq!(rig.node("Mesh").world_matrix_bumps, 2);
}

// ============================================================================
// Groups
// ============================================================================

#[test]
fn group_actions_drive_every_member() {
    let mut rig = Rig::new();
    let mut mixer: AnimationMixer<Rig> = AnimationMixer::new(rig.root());

    let mut group: ObjectGroup<Rig> = ObjectGroup::new();
    group.add(rig.node_named("Bip01_Head"));
    group.add(rig.node_named("LeftArm"));
    let group_handle = mixer.add_group(group);

    let clip = position_clip("Nudge", ".position", 0.0, 10.0);
    let handle = mixer.clip_action_for_group(&clip, group_handle).unwrap();

    mixer.play(handle);
    mixer.update(0.5, &mut rig);
    assert_eq!(rig.node("Bip01_Head").position, [5.0, 0.0, 0.0]);
    assert_eq!(rig.node("LeftArm").position, [5.0, 0.0, 0.0]);
    assert_eq!(rig.node("Mesh").position, [0.0, 0.0, 0.0]);

    // members added later pick the animation up on the next update
    if let Some(group) = mixer.group_mut(group_handle) {
        group.add(rig.node_named("Mesh"));
    }
    mixer.update(0.2, &mut rig);
    assert_eq!(rig.node("Mesh").position, [7.0, 0.0, 0.0]);
    assert_eq!(mixer.stats().groups, 1);
}

#[test]
fn group_stop_restores_from_the_first_member() {
    let mut rig = Rig::new();
    rig.nodes[2].position = [3.0, 3.0, 3.0];
    let mut mixer: AnimationMixer<Rig> = AnimationMixer::new(rig.root());

    let mut group: ObjectGroup<Rig> = ObjectGroup::new();
    group.add(rig.node_named("Bip01_Head"));
    group.add(rig.node_named("LeftArm"));
    let group_handle = mixer.add_group(group);

    let clip = position_clip("Nudge", ".position", 0.0, 10.0);
    let handle = mixer.clip_action_for_group(&clip, group_handle).unwrap();
    mixer.play(handle);
    mixer.update(0.5, &mut rig);

    mixer.stop(handle);
    mixer.update(0.0, &mut rig);
    // reads come from the first member, writes fan out to all of them
    assert_eq!(rig.node("Bip01_Head").position, [3.0, 3.0, 3.0]);
    assert_eq!(rig.node("LeftArm").position, [3.0, 3.0, 3.0]);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn discard_action_releases_its_slots() {
    let mut rig = Rig::new();
    let mut mixer: AnimationMixer<Rig> = AnimationMixer::new(rig.root());
    let clip = AnimationClip::new(
        "Pair",
        -1.0,
        vec![
            KeyframeTrack::vector(
                "Mesh.position",
                vec![0.0, 1.0],
                vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0],
            )
            .unwrap(),
            KeyframeTrack::number("Mesh.visible", vec![0.0], vec![1.0]).unwrap(),
        ],
    );
    let handle = mixer.clip_action(&clip).unwrap();
    assert_eq!(mixer.stats().bindings, 2);

    mixer.discard_action(handle);
    assert_eq!(mixer.stats().actions, 0);
    assert!(mixer.action(handle).is_none());

    // unreferenced slots are collected on the next update
    mixer.update(0.0, &mut rig);
    assert_eq!(mixer.stats().bindings, 0);

    // the same clip can come back fresh afterwards
    let again = mixer.clip_action(&clip).unwrap();
    assert_ne!(handle, again);
}

#[test]
fn stop_all_unschedules_everything() {
    let mut rig = Rig::new();
    let mut mixer: AnimationMixer<Rig> = AnimationMixer::new(rig.root());
    let a = position_clip("A", "Mesh.position", 0.0, 10.0);
    let b = position_clip("B", "Bip01_Head.position", 0.0, 10.0);
    let first = mixer.clip_action(&a).unwrap();
    let second = mixer.clip_action(&b).unwrap();

    mixer.play(first);
    mixer.play(second);
    mixer.update(0.5, &mut rig);
    assert_eq!(mixer.stats().active_actions, 2);

    mixer.stop_all();
    mixer.update(0.0, &mut rig);
    assert_eq!(mixer.stats().active_actions, 0);
    assert_eq!(rig.node("Mesh").position, [0.0, 0.0, 0.0]);
    assert_eq!(rig.node("Bip01_Head").position, [0.0, 0.0, 0.0]);
}

#[test]
fn take_events_drains_the_queue() {
    let mut rig = Rig::new();
    let mut mixer: AnimationMixer<Rig> = AnimationMixer::new(rig.root());
    let clip = position_clip("Slide", "Mesh.position", 0.0, 10.0);
    let handle = mixer.clip_action(&clip).unwrap();
    mixer.action_mut(handle).unwrap().set_loop(LoopMode::Once, 1);

    mixer.play(handle);
    mixer.update(1.5, &mut rig);

    let events = mixer.take_events();
    assert_eq!(
        events,
        vec![MixerEvent::Finished {
            action: handle,
            direction: 1
        }]
    );
    assert!(mixer.take_events().is_empty(), "drained");
}

#[test]
fn set_time_replays_from_zero() {
    let mut rig = Rig::new();
    let mut mixer: AnimationMixer<Rig> = AnimationMixer::new(rig.root());
    let clip = position_clip("Slide", "Mesh.position", 0.0, 10.0);
    let handle = mixer.clip_action(&clip).unwrap();

    mixer.play(handle);
    mixer.update(0.7, &mut rig);
    assert!(approx(mesh_x(&rig), 7.0));

    mixer.set_time(0.3, &mut rig);
    assert!(approx(mixer.time(), 0.3));
    assert!(approx(mixer.action(handle).unwrap().time(), 0.3));
    assert!(approx(mesh_x(&rig), 3.0), "got {}", mesh_x(&rig));
}

#[test]
fn stats_reflect_the_population() {
    let mut rig = Rig::new();
    let mut mixer: AnimationMixer<Rig> = AnimationMixer::new(rig.root());
    let a = position_clip("A", "Mesh.position", 0.0, 10.0);
    let b = position_clip("B", "Bip01_Head.position", 0.0, 10.0);
    let first = mixer.clip_action(&a).unwrap();
    let _second = mixer.clip_action(&b).unwrap();
    let group_handle = mixer.add_group(ObjectGroup::new());

    mixer.play(first);
    mixer.fade_in(first, 1.0);
    mixer.update(0.1, &mut rig);

    let stats = mixer.stats();
    assert_eq!(stats.actions, 2);
    assert_eq!(stats.active_actions, 1);
    assert_eq!(stats.bindings, 2);
    assert_eq!(stats.bindings_in_use, 1);
    assert_eq!(stats.control_ramps, 1);
    assert_eq!(stats.groups, 1);

    mixer.remove_group(group_handle);
    assert_eq!(mixer.stats().groups, 0);
}
