// SPDX-License-Identifier: MIT OR Apache-2.0
//! Playback that keeps a group of audio buffers in sync with the timeline.
//!
//! Sources are scheduled once when playback starts and rescheduled only when
//! a loop wraps. Between those points the audio clock runs the sources on its
//! own; the ticker only moves the position.

use super::{
    completion, PlaybackCell, PlaybackController, PlaybackHandle, PlaybackState, TraversalHooks,
};
use crate::audio::{plan_source, start_source, AudioEntry, SharedAudioContext, SourceStop};
use crate::error::{PlaybackError, Result};
use crate::observable::Observable;
use crate::settings::AudioSettings;
use crate::ticker::Ticker;
use crate::timing::{PlayRequest, PlaybackDirection, PlaybackRange};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct AudioGroup {
    context: SharedAudioContext,
    entries: Vec<AudioEntry>,
    active: Mutex<Vec<SourceStop>>,
}

/// Schedules every entry when a traversal starts, stops them when it stops
#[derive(Clone)]
struct AudioHooks(Arc<AudioGroup>);

impl TraversalHooks for AudioHooks {
    fn started(&self, position: f64, request: &PlayRequest) {
        let group = &self.0;
        let mut sources = Vec::with_capacity(group.entries.len());
        for entry in &group.entries {
            let Some(plan) = plan_source(
                entry.start_time,
                entry.buffer.duration(),
                position,
                request.range.end,
                request.rate,
            ) else {
                continue;
            };
            sources.push(start_source(group.context.as_ref(), entry, plan, request.rate));
        }
        tracing::debug!(
            "Scheduled {} of {} audio sources from position {position}",
            sources.len(),
            group.entries.len()
        );

        let previous = std::mem::replace(&mut *group.active.lock(), sources);
        for stop in previous {
            stop.stop();
        }
    }

    fn stopped(&self) {
        let active = std::mem::take(&mut *self.0.active.lock());
        for stop in active {
            stop.stop();
        }
    }
}

/// Controller that plays audio buffers alongside the position
pub struct MultiAudioPlaybackController {
    cell: Arc<PlaybackCell>,
    hooks: AudioHooks,
    settings: AudioSettings,
    destroyed: AtomicBool,
}

impl MultiAudioPlaybackController {
    /// Create a paused controller for `entries` on `context`
    pub fn new(context: SharedAudioContext, entries: Vec<AudioEntry>) -> Self {
        Self::with_settings(context, entries, AudioSettings::default())
    }

    /// Create a controller with custom audio settings
    pub fn with_settings(
        context: SharedAudioContext,
        entries: Vec<AudioEntry>,
        settings: AudioSettings,
    ) -> Self {
        Self {
            cell: PlaybackCell::new(),
            hooks: AudioHooks(Arc::new(AudioGroup {
                context,
                entries,
                active: Mutex::new(Vec::new()),
            })),
            settings,
            destroyed: AtomicBool::new(false),
        }
    }

    /// The buffers this controller plays
    pub fn entries(&self) -> &[AudioEntry] {
        &self.hooks.0.entries
    }

    /// The audio graph sources are created on
    pub fn context(&self) -> &SharedAudioContext {
        &self.hooks.0.context
    }

    /// Buffer sources only run forwards, and each loop iteration schedules
    /// a fresh set of them.
    fn audio_request(&self, mut request: PlayRequest) -> Result<PlayRequest> {
        if request.direction != PlaybackDirection::Normal {
            return Err(PlaybackError::UnsupportedDirection(request.direction));
        }
        if request.iteration_count.is_finite()
            && request.iteration_count > self.settings.max_iterations
        {
            tracing::warn!(
                "Audio playback supports at most {} iterations; clamping {}",
                self.settings.max_iterations,
                request.iteration_count
            );
            request.iteration_count = self.settings.max_iterations;
        }
        Ok(request)
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(PlaybackError::ControllerDestroyed);
        }
        Ok(())
    }
}

impl PlaybackController for MultiAudioPlaybackController {
    fn state(&self) -> &Observable<PlaybackState> {
        self.cell.state()
    }

    fn play(&self, request: PlayRequest, ticker: &Ticker) -> Result<PlaybackHandle> {
        self.ensure_alive()?;
        let request = self.audio_request(request)?;
        self.cell.pause();
        let (done, handle) = completion();
        self.cell.launch(ticker, request, self.hooks.clone(), Some(done));
        Ok(handle)
    }

    fn resume(&self, request: PlayRequest, ticker: &Ticker) -> Result<()> {
        self.ensure_alive()?;
        let request = self.audio_request(request)?;
        let done = self.cell.hand_over();
        self.cell.launch(ticker, request, self.hooks.clone(), done);
        Ok(())
    }

    fn play_dynamic_range(
        &self,
        range: Observable<PlaybackRange>,
        ticker: &Ticker,
    ) -> Result<PlaybackHandle> {
        self.ensure_alive()?;
        self.cell.pause();
        let (done, handle) = completion();
        self.cell
            .launch_dynamic(ticker, range, self.hooks.clone(), Some(done));
        Ok(handle)
    }

    fn resume_dynamic_range(
        &self,
        range: Observable<PlaybackRange>,
        ticker: &Ticker,
    ) -> Result<()> {
        self.ensure_alive()?;
        let done = self.cell.hand_over();
        self.cell.launch_dynamic(ticker, range, self.hooks.clone(), done);
        Ok(())
    }

    fn pause(&self) {
        self.cell.pause();
    }

    fn goto_position(&self, position: f64) {
        self.cell.set_position(position);
    }

    fn destroy(&self) {
        self.cell.pause();
        self.hooks.stopped();
        self.destroyed.store(true, Ordering::Release);
    }
}
