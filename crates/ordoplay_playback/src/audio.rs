// SPDX-License-Identifier: MIT OR Apache-2.0
//! Audio subsystem interface.
//!
//! The engine never renders audio itself. It talks to a Web-Audio style
//! backend through [`AudioContext`]: buffer sources are created, started at a
//! time on the audio clock with an offset and duration, and stopped. Backends
//! (cpal, rodio, a browser bridge) implement these traits.

use crate::error::AudioGraphError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Identifier of a decoded buffer inside a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioBufferId(pub Uuid);

impl AudioBufferId {
    /// Create a new random buffer ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AudioBufferId {
    fn default() -> Self {
        Self::new()
    }
}

/// A decoded buffer known to the backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioBuffer {
    /// Backend handle
    pub id: AudioBufferId,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Frames per channel
    pub frames: u64,
    /// Channel count
    pub channels: u16,
}

impl AudioBuffer {
    /// Describe a buffer
    pub fn new(sample_rate: u32, frames: u64, channels: u16) -> Self {
        Self {
            id: AudioBufferId::new(),
            sample_rate,
            frames,
            channels,
        }
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 / self.sample_rate as f64
    }
}

/// One buffer placed on the timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioEntry {
    /// Buffer to play
    pub buffer: AudioBuffer,
    /// Timeline position where the buffer starts
    pub start_time: f64,
    /// Linear gain
    pub gain: f32,
}

impl AudioEntry {
    /// Place `buffer` at `start_time` with unit gain
    pub fn new(buffer: AudioBuffer, start_time: f64) -> Self {
        Self {
            buffer,
            start_time,
            gain: 1.0,
        }
    }

    /// Set the gain
    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }
}

/// A one-shot buffer source node
pub trait AudioSourceNode: Send {
    /// Route the source to the context output through a gain stage
    fn connect(&mut self, gain: f32) -> Result<(), AudioGraphError>;

    /// Playback speed multiplier
    fn set_playback_rate(&mut self, rate: f64);

    /// Start at audio-clock time `when`, `offset` seconds into the buffer,
    /// for `duration` seconds
    fn start(&mut self, when: f64, offset: f64, duration: f64) -> Result<(), AudioGraphError>;

    /// Stop immediately. Fails if already stopped.
    fn stop(&mut self) -> Result<(), AudioGraphError>;

    /// Detach from the graph
    fn disconnect(&mut self);
}

/// Audio graph and clock
pub trait AudioContext: Send + Sync {
    /// Audio clock time in seconds
    fn current_time(&self) -> f64;

    /// Create a source node for `buffer`
    fn create_buffer_source(
        &self,
        buffer: &AudioBuffer,
    ) -> Result<Box<dyn AudioSourceNode>, AudioGraphError>;
}

/// Shared audio context handle
pub type SharedAudioContext = Arc<dyn AudioContext>;

/// When and how a source starts relative to the playback start position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourcePlan {
    /// Seconds into the buffer to begin at
    pub buffer_offset: f64,
    /// Audio-clock seconds to wait before starting
    pub start_delay: f64,
    /// Seconds of audio to play
    pub duration: f64,
}

/// Plan a source for an entry when playback starts at `start_position` and
/// ends at `end_position` (both timeline units) at `rate`.
///
/// Returns `None` when the entry has nothing audible inside the window.
pub fn plan_source(
    entry_start: f64,
    buffer_duration: f64,
    start_position: f64,
    end_position: f64,
    rate: f64,
) -> Option<SourcePlan> {
    let buffer_offset = (start_position - entry_start).max(0.0);
    let start_delay = (entry_start - start_position).max(0.0) / rate;
    let remaining_buffer = buffer_duration - buffer_offset;
    let remaining_playback = (end_position - start_position.max(entry_start)) / rate;
    let duration = remaining_buffer.min(remaining_playback);
    if duration <= 0.0 {
        return None;
    }
    Some(SourcePlan {
        buffer_offset,
        start_delay,
        duration,
    })
}

/// Stops a scheduled source. Stopping twice, or stopping a source that
/// failed to start, is harmless.
pub struct SourceStop(Option<Box<dyn FnOnce() + Send>>);

impl SourceStop {
    /// A stop action that does nothing
    pub fn noop() -> Self {
        Self(None)
    }

    /// Stop and disconnect `node`, ignoring "already stopped" failures
    pub fn for_node(mut node: Box<dyn AudioSourceNode>) -> Self {
        Self(Some(Box::new(move || {
            if let Err(e) = node.stop() {
                tracing::trace!("Ignoring audio source stop failure: {e}");
            }
            node.disconnect();
        })))
    }

    /// Run the stop action
    pub fn stop(mut self) {
        if let Some(stop) = self.0.take() {
            stop();
        }
    }

    /// Whether stopping does anything
    pub fn is_noop(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Debug for SourceStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SourceStop").field(&!self.is_noop()).finish()
    }
}

/// Create, route and start one source. Any graph error degrades the source to
/// a no-op stop so the rest of the group keeps playing.
pub fn start_source(
    context: &dyn AudioContext,
    entry: &AudioEntry,
    plan: SourcePlan,
    rate: f64,
) -> SourceStop {
    let attempt = || -> Result<Box<dyn AudioSourceNode>, AudioGraphError> {
        let mut node = context.create_buffer_source(&entry.buffer)?;
        node.connect(entry.gain)?;
        node.set_playback_rate(rate);
        let when = context.current_time() + plan.start_delay;
        if let Err(e) = node.start(when, plan.buffer_offset, plan.duration) {
            node.disconnect();
            return Err(e);
        }
        Ok(node)
    };

    match attempt() {
        Ok(node) => SourceStop::for_node(node),
        Err(e) => {
            tracing::warn!(
                "Audio source for buffer {:?} failed to start, continuing without it: {e}",
                entry.buffer.id
            );
            SourceStop::noop()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeAudioContext;

    #[test]
    fn test_plan_entry_after_start_is_delayed() {
        let plan = plan_source(5.0, 10.0, 0.0, 20.0, 2.0).unwrap();
        assert_eq!(plan.buffer_offset, 0.0);
        assert_eq!(plan.start_delay, 2.5);
    }

    #[test]
    fn test_plan_entry_before_start_is_offset() {
        let plan = plan_source(5.0, 10.0, 8.0, 20.0, 1.0).unwrap();
        assert_eq!(plan.buffer_offset, 3.0);
        assert_eq!(plan.start_delay, 0.0);
        assert_eq!(plan.duration, 7.0);
    }

    #[test]
    fn test_plan_duration_limited_by_playback_window() {
        let plan = plan_source(0.0, 10.0, 2.0, 4.0, 1.0).unwrap();
        assert_eq!(plan.duration, 2.0);
        let fast = plan_source(0.0, 10.0, 2.0, 4.0, 2.0).unwrap();
        assert_eq!(fast.duration, 1.0);
    }

    #[test]
    fn test_plan_skips_inaudible_entries() {
        // Buffer already finished.
        assert!(plan_source(0.0, 1.0, 2.0, 5.0, 1.0).is_none());
        // Starts after the window ends.
        assert!(plan_source(6.0, 1.0, 2.0, 5.0, 1.0).is_none());
    }

    #[test]
    fn test_buffer_duration() {
        let buffer = AudioBuffer::new(48_000, 96_000, 2);
        assert_eq!(buffer.duration(), 2.0);
        assert_eq!(AudioBuffer::new(0, 10, 1).duration(), 0.0);
    }

    #[test]
    fn test_failed_start_degrades_to_noop() {
        let context = FakeAudioContext::new();
        let broken = AudioEntry::new(AudioBuffer::new(1000, 5000, 1), 0.0);
        context.fail_buffer(broken.buffer.id);
        let plan = SourcePlan {
            buffer_offset: 0.0,
            start_delay: 0.0,
            duration: 5.0,
        };

        let stop = start_source(&context, &broken, plan, 1.0);
        assert!(stop.is_noop());
        stop.stop();
        assert!(context.starts().is_empty());
    }

    #[test]
    fn test_double_stop_is_swallowed() {
        let context = FakeAudioContext::new();
        context.set_time(4.0);
        let entry = AudioEntry::new(AudioBuffer::new(1000, 5000, 1), 0.0).with_gain(0.5);
        let plan = SourcePlan {
            buffer_offset: 1.0,
            start_delay: 0.5,
            duration: 3.0,
        };

        let stop = start_source(&context, &entry, plan, 1.0);
        let starts = context.starts();
        assert_eq!(starts.len(), 1);
        assert_eq!(starts[0].when, 4.5);
        assert_eq!(starts[0].offset, 1.0);
        assert_eq!(starts[0].gain, 0.5);

        context.stop_all_externally();
        stop.stop();
        assert_eq!(context.active_count(), 0);
    }
}
