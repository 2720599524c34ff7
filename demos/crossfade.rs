//! Headless cross-fade demo: a puppet blends from a walk cycle into a run
//! cycle with time warping, so the two strides stay in phase while the
//! weights trade over.
//!
//! Run with `RUST_LOG=debug` to see the mixer's scheduling decisions.

use keymix::{
    AnimationClip, AnimationGraph, AnimationMixer, KeyframeTrack, MixerEvent, PropertyShape,
};

/// Minimal host scene: a named hip node with a position.
struct Puppet {
    hip: [f32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PuppetObj {
    Hip,
}

#[derive(Debug, Clone, Copy)]
enum PuppetProp {
    Position,
}

impl AnimationGraph for Puppet {
    type Obj = PuppetObj;
    type Prop = PuppetProp;

    fn name_of(&self, obj: PuppetObj) -> Option<&str> {
        match obj {
            PuppetObj::Hip => Some("Hip"),
        }
    }

    fn children_of(&self, _obj: PuppetObj, _out: &mut Vec<PuppetObj>) {}

    fn resolve_property(
        &self,
        _obj: PuppetObj,
        name: &str,
    ) -> Option<(PuppetProp, PropertyShape)> {
        match name {
            "position" => Some((PuppetProp::Position, PropertyShape::Convertible { size: 3 })),
            _ => None,
        }
    }

    fn read(&self, _obj: PuppetObj, _prop: PuppetProp, out: &mut [f32]) {
        out.copy_from_slice(&self.hip);
    }

    fn write(&mut self, _obj: PuppetObj, _prop: PuppetProp, values: &[f32]) {
        self.hip.copy_from_slice(values);
    }
}

/// A looping hip-bob cycle: the hip dips by `dip` twice per stride.
fn stride_clip(name: &str, stride: f32, dip: f32) -> AnimationClip {
    let times: Vec<f32> = (0..5).map(|i| stride * i as f32 / 4.0).collect();
    let rest = 0.95;
    let mut values = Vec::with_capacity(15);
    for i in 0..5 {
        let y = if i % 2 == 0 { rest } else { rest - dip };
        values.extend_from_slice(&[0.0, y, 0.0]);
    }
    let track = KeyframeTrack::vector("Hip.position", times, values)
        .expect("stride track is well-formed");
    AnimationClip::new(name, -1.0, vec![track])
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut puppet = Puppet {
        hip: [0.0, 0.95, 0.0],
    };
    let mut mixer: AnimationMixer<Puppet> = AnimationMixer::new(PuppetObj::Hip);

    // a slow shallow walk and a fast deep run
    let walk_clip = stride_clip("Walk", 1.2, 0.05);
    let run_clip = stride_clip("Run", 0.6, 0.13);
    let walk = mixer.clip_action(&walk_clip)?;
    let run = mixer.clip_action(&run_clip)?;

    mixer.play(walk);
    println!("walking...");

    let dt = 1.0 / 60.0;
    let mut faded = false;
    for frame in 0..180 {
        let t = mixer.time();

        // after one full stride, morph into the run over 0.6 seconds
        if !faded && t >= 1.2 {
            mixer.play(run);
            mixer.cross_fade(walk, run, 0.6, true);
            println!("cross-fading walk -> run (warped)");
            faded = true;
        }

        mixer.update(dt, &mut puppet);

        for event in mixer.take_events() {
            if let MixerEvent::Loop { action, .. } = event {
                let name = mixer.action(action).map(|a| a.clip().name()).unwrap_or("?");
                println!("  [t={:5.2}] '{}' wrapped", mixer.time(), name);
            }
        }

        if frame % 12 == 0 {
            let walk_weight = mixer.action(walk).map_or(0.0, |a| a.effective_weight());
            let run_weight = mixer.action(run).map_or(0.0, |a| a.effective_weight());
            println!(
                "  [t={:5.2}] hip.y={:.3}  walk w={:.2} ts={:.2}  run w={:.2} ts={:.2}",
                mixer.time(),
                puppet.hip[1],
                walk_weight,
                mixer.action(walk).map_or(0.0, |a| a.effective_time_scale()),
                run_weight,
                mixer.action(run).map_or(0.0, |a| a.effective_time_scale()),
            );
        }
    }

    println!(
        "done: walk enabled={}, run weight={:.2}",
        mixer.action(walk).is_some_and(|a| a.enabled()),
        mixer.action(run).map_or(0.0, |a| a.effective_weight()),
    );
    Ok(())
}
