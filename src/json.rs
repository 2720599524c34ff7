//! Clip Serialization
//!
//! This module defines the JSON wire format for clips and tracks, and the
//! conversions between the wire structs and the runtime types.
//!
//! # Overview
//!
//! The format is a plain JSON object per clip:
//!
//! ```json
//! {
//!   "name": "Walk",
//!   "duration": 1.25,
//!   "uuid": "b3a7…",
//!   "blendMode": "normal",
//!   "tracks": [
//!     {
//!       "name": "hips.position",
//!       "type": "vector",
//!       "times": [0.0, 1.0],
//!       "values": [0.0, 0.0, 0.0, 1.0, 2.0, 3.0],
//!       "interpolation": "step"
//!     }
//!   ]
//! }
//! ```
//!
//! Track `values` are flat numbers for the numeric kinds, booleans for bool
//! tracks and strings for string tracks. `interpolation` is only written when
//! it differs from the kind's default; `inTangents`/`outTangents` appear when
//! the track carries Bezier handles. A top-level `fps` on input marks a
//! legacy clip whose key times are frames and are divided down on parse.
//!
//! Decoding runs through the ordinary track constructors, so a malformed
//! clip fails with the same [`MixError`] variants as hand-built data. An
//! unknown `type`, `interpolation` or `blendMode` string is fatal; a known
//! but unsupported interpolation downgrades with a warning like it does at
//! runtime.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::clip::{AnimationClip, BlendMode};
use crate::errors::{MixError, Result};
use crate::track::{InterpolationMode, KeyframeTrack, TrackKind, TrackValues};

// ============================================================================
// Wire structs
// ============================================================================

/// Serialized form of an [`AnimationClip`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipJson {
    /// Clip name; defaults to empty.
    #[serde(default)]
    pub name: String,
    /// Duration in seconds; omitted or negative means "derive from tracks".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f32>,
    /// Legacy frames-per-second marker. When present, key times in the
    /// tracks are frames and are scaled by `1 / fps` on parse. Never
    /// written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f32>,
    /// Clip identity, preserved across a round trip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    /// `"normal"` or `"additive"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blend_mode: Option<String>,
    /// Free-form payload carried along with the clip.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub user_data: Value,
    /// The serialized tracks.
    pub tracks: Vec<TrackJson>,
}

/// Serialized form of a [`KeyframeTrack`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackJson {
    /// The track name, addressing the animated property.
    pub name: String,
    /// The value type name (`"number"`, `"vector"`, `"color"`,
    /// `"quaternion"`, `"bool"`, `"string"`).
    #[serde(rename = "type")]
    pub track_type: String,
    /// Key times, seconds (frames for legacy clips).
    pub times: Vec<f32>,
    /// Flat per-key values.
    pub values: ValuesJson,
    /// Interpolation mode name; absent means the kind's default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpolation: Option<String>,
    /// Incoming Bezier handles, `(dt, dv)` per key and component.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_tangents: Option<Vec<f32>>,
    /// Outgoing Bezier handles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_tangents: Option<Vec<f32>>,
}

/// The three value flavors a serialized track can carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValuesJson {
    /// Flat numeric components.
    Numbers(Vec<f32>),
    /// One flag per key.
    Booleans(Vec<bool>),
    /// One string per key.
    Strings(Vec<String>),
}

// ============================================================================
// Track conversions
// ============================================================================

impl KeyframeTrack {
    /// Builds a track from its serialized form. Runs the same validation as
    /// the typed constructors.
    pub fn parse(json: TrackJson) -> Result<Self> {
        let kind = TrackKind::from_type_name(&json.track_type)
            .ok_or_else(|| MixError::UnknownTrackType(json.track_type.clone()))?;

        let TrackJson {
            name,
            times,
            values,
            interpolation,
            in_tangents,
            out_tangents,
            ..
        } = json;

        let mut track = match kind {
            TrackKind::Number => Self::number(&name, times, numeric_values(&name, values)?),
            TrackKind::Vector => Self::vector(&name, times, numeric_values(&name, values)?),
            TrackKind::Color => Self::color(&name, times, numeric_values(&name, values)?),
            TrackKind::Quaternion => Self::quaternion(&name, times, numeric_values(&name, values)?),
            TrackKind::Boolean => Self::boolean(&name, times, boolean_values(&name, values)?),
            TrackKind::String => Self::string(&name, times, string_values(&name, values)?),
        }?;

        // Tangents must land before the interpolation switch so a "bezier"
        // request sees them.
        match (in_tangents, out_tangents) {
            (None, None) => {}
            (in_t, out_t) => {
                track.set_tangents(in_t.unwrap_or_default(), out_t.unwrap_or_default())?;
            }
        }
        if let Some(name) = interpolation {
            let mode = InterpolationMode::from_mode_name(&name)
                .ok_or_else(|| MixError::UnknownInterpolation(name))?;
            track.set_interpolation(mode);
        }
        Ok(track)
    }

    /// Serializes this track.
    #[must_use]
    pub fn to_json(&self) -> TrackJson {
        let values = match (self.kind(), self.values()) {
            (TrackKind::Boolean, TrackValues::Numeric(v)) => {
                ValuesJson::Booleans(v.iter().map(|&x| x != 0.0).collect())
            }
            (_, TrackValues::Numeric(v)) => ValuesJson::Numbers(v.to_vec()),
            (_, TrackValues::Text(v)) => ValuesJson::Strings(v.to_vec()),
        };
        TrackJson {
            name: self.name().to_string(),
            track_type: self.kind().type_name().to_string(),
            times: self.times().to_vec(),
            values,
            interpolation: (self.interpolation() != self.kind().default_interpolation())
                .then(|| self.interpolation().mode_name().to_string()),
            in_tangents: self.tangents().map(|t| t.in_tangents().to_vec()),
            out_tangents: self.tangents().map(|t| t.out_tangents().to_vec()),
        }
    }
}

fn numeric_values(name: &str, values: ValuesJson) -> Result<Vec<f32>> {
    match values {
        ValuesJson::Numbers(v) => Ok(v),
        _ => Err(MixError::WrongValueType {
            name: name.to_string(),
            expected: "numeric",
        }),
    }
}

fn boolean_values(name: &str, values: ValuesJson) -> Result<Vec<bool>> {
    match values {
        ValuesJson::Booleans(v) => Ok(v),
        ValuesJson::Numbers(v) => Ok(v.into_iter().map(|x| x != 0.0).collect()),
        ValuesJson::Strings(_) => Err(MixError::WrongValueType {
            name: name.to_string(),
            expected: "boolean",
        }),
    }
}

fn string_values(name: &str, values: ValuesJson) -> Result<Vec<String>> {
    match values {
        ValuesJson::Strings(v) => Ok(v),
        // An empty values array decodes as empty numbers; let the string
        // constructor raise the keyframe-count error.
        ValuesJson::Numbers(v) if v.is_empty() => Ok(Vec::new()),
        _ => Err(MixError::WrongValueType {
            name: name.to_string(),
            expected: "string",
        }),
    }
}

// ============================================================================
// Clip conversions
// ============================================================================

impl AnimationClip {
    /// Builds a clip from its serialized form.
    pub fn parse(json: ClipJson) -> Result<Self> {
        let frame_time = match json.fps {
            Some(fps) if fps != 0.0 => 1.0 / fps,
            _ => 1.0,
        };
        let mut tracks = Vec::with_capacity(json.tracks.len());
        for track_json in json.tracks {
            let mut track = KeyframeTrack::parse(track_json)?;
            track.scale(frame_time);
            tracks.push(track);
        }

        let mut clip = AnimationClip::new(json.name, json.duration.unwrap_or(-1.0), tracks);
        if let Some(uuid) = json.uuid {
            clip.uuid = uuid;
        }
        if let Some(name) = json.blend_mode {
            clip.blend_mode = BlendMode::from_mode_name(&name)
                .ok_or_else(|| MixError::UnknownBlendMode(name))?;
        }
        clip.user_data = json.user_data;
        Ok(clip)
    }

    /// Serializes this clip.
    #[must_use]
    pub fn to_json(&self) -> ClipJson {
        ClipJson {
            name: self.name().to_string(),
            duration: Some(self.duration()),
            fps: None,
            uuid: Some(self.uuid()),
            blend_mode: Some(self.blend_mode().mode_name().to_string()),
            user_data: self.user_data().clone(),
            tracks: self.tracks().iter().map(KeyframeTrack::to_json).collect(),
        }
    }

    /// Decodes a clip from a JSON string.
    pub fn from_json_str(text: &str) -> Result<Self> {
        Self::parse(serde_json::from_str(text)?)
    }

    /// Encodes this clip as a JSON string.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_json())?)
    }
}
