#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod errors;
pub mod target;
pub mod interpolant;
pub mod path;
pub mod track;
pub mod clip;
pub mod json;
pub mod binding;
pub mod action;
pub mod mixer;

pub use errors::{MixError, Result};
pub use target::{AnimationGraph, PropertyShape, Versioning};
pub use interpolant::{Basis, Ending, Interpolant};
pub use path::TrackPath;
pub use track::{InterpolationMode, KeyframeTrack, StringSampler, TrackKind, TrackSampler, TrackValues};
pub use clip::{make_clip_additive, subclip, AnimationClip, BlendMode};
pub use json::{ClipJson, TrackJson, ValuesJson};
pub use binding::{find_node, BindMode, CompositeBinding, ObjectGroup, PropertyBinding};
pub use action::{AnimationAction, LoopMode};
pub use mixer::{ActionHandle, AnimationMixer, GroupHandle, MixKernel, MixerEvent, MixerStats, PropertyMixer, TextMixer};
