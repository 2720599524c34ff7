//! Error Types
//!
//! This module defines the error types used throughout the crate.
//!
//! # Overview
//!
//! The main error type [`MixError`] covers all failure modes including:
//! - Track and interpolant construction errors
//! - Track-name parsing errors
//! - Serialized clip decoding errors
//!
//! # Usage
//!
//! All fallible public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, MixError>`.
//!
//! ```rust,ignore
//! use keymix::errors::{MixError, Result};
//!
//! fn build_track() -> Result<()> {
//!     // Operations that may fail return Result
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::track::{InterpolationMode, TrackKind};

/// The main error type for the keymix runtime.
///
/// Everything listed here is fatal at the point it is raised: no partial
/// track, clip or binding is ever produced. Runtime degradations (an
/// unresolvable binding, an unsupported interpolation request) are reported
/// through `log` and downgrade to no-ops instead of surfacing here.
#[derive(Error, Debug)]
pub enum MixError {
    // ========================================================================
    // Track Construction Errors
    // ========================================================================
    /// A track was constructed without any keyframes.
    #[error("Track '{0}' has no keyframes")]
    EmptyTrack(String),

    /// An interpolant was constructed over an empty time buffer.
    #[error("Interpolant requires at least one keyframe")]
    NoKeyframes,

    /// A track was constructed with an empty name.
    #[error("Track name must not be empty")]
    UnnamedTrack,

    /// Sample buffer length is not a whole multiple of the key count.
    #[error("Sample buffer of {got} values does not divide over {keys} keys")]
    RaggedSamples {
        /// Number of keyframes in the track.
        keys: usize,
        /// Number of values supplied.
        got: usize,
    },

    /// Rotation samples must come in groups of four components.
    #[error("Rotation samples must be quadruples, got value size {0}")]
    BadRotationSize(usize),

    /// Tangent buffer length disagrees with `keys * value_size * 2`.
    #[error("Tangent buffer length {got} does not match expected {expected}")]
    TangentMismatch {
        /// Required tangent buffer length.
        expected: usize,
        /// Length actually supplied.
        got: usize,
    },

    // ========================================================================
    // Track Path Errors
    // ========================================================================
    /// A track name string does not follow the binding grammar.
    #[error("Cannot parse track path '{path}': {reason}")]
    BadTrackPath {
        /// The offending path string.
        path: String,
        /// What the scanner rejected.
        reason: &'static str,
    },

    // ========================================================================
    // Serialization Errors
    // ========================================================================
    /// Serialized track carries a type name this crate does not know.
    #[error("Unknown track type '{0}'")]
    UnknownTrackType(String),

    /// Serialized track carries an interpolation name this crate does not know.
    #[error("Unknown interpolation mode '{0}'")]
    UnknownInterpolation(String),

    /// Serialized clip carries a blend mode name this crate does not know.
    #[error("Unknown blend mode '{0}'")]
    UnknownBlendMode(String),

    /// Serialized track values do not match the declared track type.
    #[error("Track '{name}' declares {expected} values but carries another flavor")]
    WrongValueType {
        /// The offending track.
        name: String,
        /// The value flavor the track type requires.
        expected: &'static str,
    },

    /// An interpolation mode was requested that the track kind cannot carry
    /// and no fallback applies (only reachable through serialized content).
    #[error("Interpolation {mode:?} is not available for {kind:?} tracks")]
    UnsupportedInterpolation {
        /// The requested mode.
        mode: InterpolationMode,
        /// The track kind that rejected it.
        kind: TrackKind,
    },

    /// JSON decoding or encoding error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Alias for `Result<T, MixError>`.
pub type Result<T> = std::result::Result<T, MixError>;
