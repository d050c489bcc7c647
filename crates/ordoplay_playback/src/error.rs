// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for the playback engine.

use crate::timing::PlaybackDirection;
use thiserror::Error;

/// Errors raised by sequences, controllers and record IO
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Range start is negative, non-finite, or not before the end
    #[error("Invalid playback range [{start}, {end}]: {reason}")]
    InvalidRange {
        /// Requested start
        start: f64,
        /// Requested end
        end: f64,
        /// What is wrong with it
        reason: &'static str,
    },

    /// Iteration count is not a positive integer or infinity
    #[error("Iteration count must be a positive integer or infinity, {0} given")]
    InvalidIterationCount(f64),

    /// Rate is not a positive finite number
    #[error("Playback rate must be a positive finite number, {0} given")]
    InvalidRate(f64),

    /// The controller cannot play in this direction
    #[error("This playback controller only supports the normal direction, {0:?} given")]
    UnsupportedDirection(PlaybackDirection),

    /// No marker resolved for the given name
    #[error("No marker matches {0:?}")]
    MarkerNotFound(String),

    /// The controller was destroyed and cannot play anymore
    #[error("Playback controller has been destroyed")]
    ControllerDestroyed,

    /// Filesystem error while loading or saving
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// RON input could not be parsed
    #[error("RON decode error: {0}")]
    RonDecode(#[from] ron::error::SpannedError),

    /// Value could not be serialized to RON
    #[error("RON encode error: {0}")]
    RonEncode(#[from] ron::Error),
}

impl PlaybackError {
    /// Whether this is a play-argument validation error
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidRange { .. } | Self::InvalidIterationCount(_) | Self::InvalidRate(_)
        )
    }
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, PlaybackError>;

/// Errors reported by an audio backend
#[derive(Debug, Clone, Error)]
pub enum AudioGraphError {
    /// Node could not be created
    #[error("Failed to create audio node: {0}")]
    NodeCreation(String),

    /// Source refused to start
    #[error("Failed to start audio source: {0}")]
    Start(String),

    /// Source was already stopped (or never started)
    #[error("Audio source is not running")]
    NotRunning,

    /// Connection between nodes failed
    #[error("Failed to connect audio node: {0}")]
    Connect(String),
}
