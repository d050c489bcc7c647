// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sequence playback and timing engine for OrdoPlay.
//!
//! This crate turns ticks of a cooperative clock into timeline playback:
//! - Drift-free positions for looping, reversed and alternating playback
//! - Named timeline events, fired once per crossing
//! - Nested sub-sequences with their own time scale
//! - Audio buffers scheduled in sync with the timeline
//!
//! ## Architecture
//!
//! The engine is built on:
//! - A [`Ticker`] advanced by whoever owns the frame loop
//! - Swappable [`PlaybackController`]s owning the playback state
//! - [`Sequence`]s orchestrating one controller per sheet instance
//! - A [`Project`] resolving sheets for sub-sequence composition

pub mod audio;
pub mod composition;
pub mod controller;
pub mod error;
pub mod events;
pub mod format;
pub mod grid;
pub mod marker;
pub mod observable;
pub mod project;
pub mod record;
pub mod sequence;
pub mod settings;
pub mod ticker;
pub mod timing;

#[cfg(test)]
mod testing;

pub use audio::{
    AudioBuffer, AudioBufferId, AudioContext, AudioEntry, AudioSourceNode, SharedAudioContext,
    SourcePlan,
};
pub use composition::{SheetRegistry, SubSequenceWindow};
pub use controller::{
    DefaultPlaybackController, MultiAudioPlaybackController, PlaybackController, PlaybackHandle,
    PlaybackState,
};
pub use error::{AudioGraphError, PlaybackError, Result};
pub use events::{EventDispatcher, EventListener, ListenerId};
pub use format::PositionFormatter;
pub use grid::closest_grid_position;
pub use observable::{Observable, Subscription};
pub use project::{Project, ProjectId, SheetAddress};
pub use record::{
    EventId, EventValue, Marker, MarkerId, SequenceEvent, SequenceRecord, SheetId, SubSequence,
    SubSequenceId,
};
pub use sequence::{PlayConfig, Sequence};
pub use settings::EngineSettings;
pub use ticker::{TickId, Ticker};
pub use timing::{PlayRequest, PlaybackDirection, PlaybackRange};
