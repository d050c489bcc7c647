// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sequence playback orchestration.
//!
//! A [`Sequence`] belongs to one sheet instance of a project. It holds the
//! active playback controller, mirrors its state into position and playing
//! views that survive controller swaps, and runs event dispatch and
//! sub-sequence composition on every position change.

use crate::audio::{AudioEntry, SharedAudioContext};
use crate::composition::{SheetRegistry, SubSequenceComposer};
use crate::controller::{
    DefaultPlaybackController, MultiAudioPlaybackController, PlaybackController, PlaybackHandle,
    PlaybackState,
};
use crate::error::{PlaybackError, Result};
use crate::events::{DeferredAction, EventDispatcher, ListenerId};
use crate::format::PositionFormatter;
use crate::grid::closest_grid_position;
use crate::marker::marker_position;
use crate::observable::{Observable, Subscription};
use crate::project::SheetAddress;
use crate::record::{EventValue, Marker, SequenceEvent, SequenceRecord, SubSequence};
use crate::settings::EngineSettings;
use crate::ticker::Ticker;
use crate::timing::{PlayRequest, PlaybackDirection, PlaybackRange};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Options for [`Sequence::play`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayConfig {
    /// Positive integer, or infinity to loop forever
    pub iteration_count: f64,
    /// Range to play; the whole sequence when `None`
    pub range: Option<PlaybackRange>,
    /// Timeline units per second
    pub rate: f64,
    /// Traversal direction
    pub direction: PlaybackDirection,
}

impl Default for PlayConfig {
    fn default() -> Self {
        Self {
            iteration_count: 1.0,
            range: None,
            rate: 1.0,
            direction: PlaybackDirection::Normal,
        }
    }
}

impl PlayConfig {
    /// Loop the whole sequence forever
    pub fn looping() -> Self {
        Self {
            iteration_count: f64::INFINITY,
            ..Self::default()
        }
    }

    /// Play only `range`
    pub fn with_range(mut self, start: f64, end: f64) -> Self {
        self.range = Some(PlaybackRange::new(start, end));
        self
    }

    /// Set the iteration count
    pub fn with_iterations(mut self, iteration_count: f64) -> Self {
        self.iteration_count = iteration_count;
        self
    }

    /// Set the rate
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    /// Set the direction
    pub fn with_direction(mut self, direction: PlaybackDirection) -> Self {
        self.direction = direction;
        self
    }
}

/// Validate the arguments of a play call
pub fn validate_play_config(range: PlaybackRange, config: &PlayConfig) -> Result<()> {
    if !range.start.is_finite() || range.start < 0.0 {
        return Err(PlaybackError::InvalidRange {
            start: range.start,
            end: range.end,
            reason: "start must be a non-negative finite number",
        });
    }
    if !range.end.is_finite() || range.end <= range.start {
        return Err(PlaybackError::InvalidRange {
            start: range.start,
            end: range.end,
            reason: "end must be greater than start",
        });
    }
    let count = config.iteration_count;
    let whole = count.is_finite() && count >= 1.0 && count.fract() == 0.0;
    if !(whole || count == f64::INFINITY) {
        return Err(PlaybackError::InvalidIterationCount(count));
    }
    if !config.rate.is_finite() || config.rate <= 0.0 {
        return Err(PlaybackError::InvalidRate(config.rate));
    }
    Ok(())
}

/// Keep a play range inside `[0, length]`
fn bound_range(range: PlaybackRange, length: f64, address: &SheetAddress) -> PlaybackRange {
    let bounded = PlaybackRange::new(range.start.max(0.0), range.end.min(length));
    if bounded != range {
        tracing::warn!(
            "Play range [{}, {}] of {address} exceeds the sequence length {length}; clamping",
            range.start,
            range.end
        );
    }
    bounded
}

/// What the sequence is playing, and on which clock
enum ActivePlay {
    Config {
        config: PlayConfig,
        ticker: Ticker,
    },
    Dynamic {
        range: Observable<PlaybackRange>,
        ticker: Ticker,
        _bounds: Subscription,
    },
}

impl ActivePlay {
    fn ticker(&self) -> &Ticker {
        match self {
            Self::Config { ticker, .. } | Self::Dynamic { ticker, .. } => ticker,
        }
    }
}

struct SequenceInner {
    address: SheetAddress,
    record: Observable<SequenceRecord>,
    ticker: Ticker,
    settings: EngineSettings,
    registry: Option<Weak<dyn SheetRegistry>>,
    controller: Mutex<Arc<dyn PlaybackController>>,
    controller_subscription: Mutex<Option<Subscription>>,
    position: Observable<f64>,
    playing: Observable<bool>,
    position_subscription: Mutex<Option<Subscription>>,
    events: EventDispatcher,
    composer: SubSequenceComposer,
    active_play: Mutex<Option<ActivePlay>>,
    suppress_dispatch: AtomicBool,
}

/// Playback of one sheet instance's timeline
#[derive(Clone)]
pub struct Sequence {
    inner: Arc<SequenceInner>,
}

impl Sequence {
    /// Create a standalone sequence. Sub-sequences are not composed because
    /// there is no project to resolve them in.
    pub fn new(
        address: SheetAddress,
        record: Observable<SequenceRecord>,
        ticker: Ticker,
        settings: EngineSettings,
    ) -> Self {
        Self::build(address, record, ticker, settings, None)
    }

    pub(crate) fn build(
        address: SheetAddress,
        record: Observable<SequenceRecord>,
        ticker: Ticker,
        settings: EngineSettings,
        registry: Option<Weak<dyn SheetRegistry>>,
    ) -> Self {
        let controller: Arc<dyn PlaybackController> = Arc::new(DefaultPlaybackController::new());
        let events = EventDispatcher::new(settings.events);
        let inner = Arc::new(SequenceInner {
            address,
            record,
            ticker,
            settings,
            registry,
            controller: Mutex::new(Arc::clone(&controller)),
            controller_subscription: Mutex::new(None),
            position: Observable::new(controller.current_position()),
            playing: Observable::new(controller.playing()),
            position_subscription: Mutex::new(None),
            events,
            composer: SubSequenceComposer::default(),
            active_play: Mutex::new(None),
            suppress_dispatch: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&inner);
        let subscription = inner.position.subscribe(move |previous, next| {
            if let Some(inner) = weak.upgrade() {
                Sequence { inner }.on_position_change(*previous, *next);
            }
        });
        *inner.position_subscription.lock() = Some(subscription);

        let sequence = Self { inner };
        sequence.follow(&controller);
        sequence
    }

    /// Sheet instance this sequence plays
    pub fn address(&self) -> &SheetAddress {
        &self.inner.address
    }

    /// The persisted record backing this sequence
    pub fn record(&self) -> &Observable<SequenceRecord> {
        &self.inner.record
    }

    /// The clock this sequence plays against
    pub fn ticker(&self) -> &Ticker {
        &self.inner.ticker
    }

    /// Timeline length
    pub fn length(&self) -> f64 {
        self.inner.record.with(|r| r.length)
    }

    /// Grid subdivisions per unit
    pub fn sub_units_per_unit(&self) -> u32 {
        self.inner.record.with(|r| r.sub_units_per_unit)
    }

    /// Current position
    pub fn position(&self) -> f64 {
        self.inner.position.get()
    }

    /// Whether playing
    pub fn playing(&self) -> bool {
        self.inner.playing.get()
    }

    /// Position view; keeps working across controller swaps
    pub fn position_view(&self) -> Observable<f64> {
        self.inner.position.clone()
    }

    /// Playing view; keeps working across controller swaps
    pub fn playing_view(&self) -> Observable<bool> {
        self.inner.playing.clone()
    }

    /// The active controller
    pub fn controller(&self) -> Arc<dyn PlaybackController> {
        Arc::clone(&*self.inner.controller.lock())
    }

    /// Whether two handles refer to the same sequence
    pub fn ptr_eq(&self, other: &Sequence) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Pause, then move to `position` (clamped to `[0, length]`)
    pub fn set_position(&self, position: f64) {
        self.pause();
        self.set_position_unpaused(position);
    }

    /// Move to `position` (clamped to `[0, length]`) without pausing
    pub fn set_position_unpaused(&self, position: f64) {
        let clamped = self.clamp_position(position);
        self.controller().goto_position(clamped);
    }

    /// Seek on behalf of a host timeline. Hosts routinely map past either
    /// end of the child, so the clamp is silent.
    pub(crate) fn seek_from_host(&self, position: f64) {
        let clamped = position.max(0.0).min(self.length());
        if clamped != position {
            tracing::trace!("Host seek {position} of {} clamped to {clamped}", self.address());
        }
        self.controller().goto_position(clamped);
    }

    fn clamp_position(&self, position: f64) -> f64 {
        let length = self.length();
        if position.is_nan() {
            tracing::error!("Position of {} must be a number, got NaN; using 0", self.address());
            return 0.0;
        }
        if position < 0.0 {
            tracing::error!(
                "Position of {} must be non-negative, got {position}; clamping to 0",
                self.address()
            );
            return 0.0;
        }
        if position > length {
            tracing::error!(
                "Position {position} of {} exceeds its length {length}; clamping",
                self.address()
            );
            return length;
        }
        position
    }

    /// Snap `position` to the sequence grid
    pub fn closest_grid_position(&self, position: f64) -> f64 {
        closest_grid_position(position, self.sub_units_per_unit())
    }

    /// Formatter for this sequence's frame rate
    pub fn formatter(&self) -> PositionFormatter {
        PositionFormatter::new(self.sub_units_per_unit())
    }

    /// Play on the sequence's own ticker
    pub fn play(&self, config: PlayConfig) -> Result<PlaybackHandle> {
        let ticker = self.inner.ticker.clone();
        self.play_with_ticker(config, &ticker)
    }

    /// Play against `ticker`. Invalid arguments are rejected in debug builds.
    pub fn play_with_ticker(&self, config: PlayConfig, ticker: &Ticker) -> Result<PlaybackHandle> {
        let request = self.request(&config)?;
        let handle = self.controller().play(request, ticker)?;
        self.set_active_play(ActivePlay::Config {
            config,
            ticker: ticker.clone(),
        });
        Ok(handle)
    }

    fn request(&self, config: &PlayConfig) -> Result<PlayRequest> {
        let length = self.length();
        let range = config.range.unwrap_or(PlaybackRange::new(0.0, length));

        if cfg!(debug_assertions) {
            validate_play_config(range, config)?;
        }

        let range = bound_range(range, length, self.address());
        if range.end <= range.start {
            return Err(PlaybackError::InvalidRange {
                start: range.start,
                end: range.end,
                reason: "range is empty",
            });
        }
        Ok(PlayRequest {
            iteration_count: config.iteration_count,
            range,
            rate: config.rate,
            direction: config.direction,
        })
    }

    /// Loop inside a range that may change while playing. The range is kept
    /// inside the sequence as it changes.
    pub fn play_dynamic_range(&self, range: Observable<PlaybackRange>) -> Result<PlaybackHandle> {
        let record = self.inner.record.clone();
        let address = self.inner.address.clone();
        let bounded = Observable::new(bound_range(range.get(), self.length(), &address));
        let target = bounded.clone();
        let bounds = range.subscribe(move |_, next| {
            target.set(bound_range(*next, record.with(|r| r.length), &address));
        });

        let ticker = self.inner.ticker.clone();
        let handle = self
            .controller()
            .play_dynamic_range(bounded.clone(), &ticker)?;
        self.set_active_play(ActivePlay::Dynamic {
            range: bounded,
            ticker,
            _bounds: bounds,
        });
        Ok(handle)
    }

    fn set_active_play(&self, play: ActivePlay) {
        let previous = self.inner.active_play.lock().replace(play);
        drop(previous);
    }

    /// The clock of the running play; the sequence's own when paused
    fn clock(&self) -> Ticker {
        if self.playing() {
            if let Some(active) = self.inner.active_play.lock().as_ref() {
                return active.ticker().clone();
            }
        }
        self.inner.ticker.clone()
    }

    /// Pause. Idempotent.
    pub fn pause(&self) {
        self.controller().pause();
    }

    /// Swap the controller without a position discontinuity: the current one
    /// is paused and destroyed, and `next` continues from its position.
    pub fn replace_playback_controller(&self, next: Arc<dyn PlaybackController>) {
        let current = self.controller();
        current.pause();
        let position = current.current_position();
        current.destroy();
        next.goto_position(position);

        *self.inner.controller.lock() = Arc::clone(&next);
        self.follow(&next);
        tracing::debug!("Replaced playback controller of {} at {position}", self.address());
    }

    /// Play `entries` in sync with the timeline
    pub fn attach_audio(&self, context: SharedAudioContext, entries: Vec<AudioEntry>) {
        let controller =
            MultiAudioPlaybackController::with_settings(context, entries, self.inner.settings.audio);
        self.replace_playback_controller(Arc::new(controller));
    }

    /// Go back to silent playback
    pub fn detach_audio(&self) {
        self.replace_playback_controller(Arc::new(DefaultPlaybackController::new()));
    }

    /// Mirror `controller` into the position and playing views
    fn follow(&self, controller: &Arc<dyn PlaybackController>) {
        let position = self.inner.position.clone();
        let playing = self.inner.playing.clone();
        let subscription = controller
            .state()
            .subscribe(move |_: &PlaybackState, next: &PlaybackState| {
                position.set(next.position);
                playing.set(next.playing);
            });
        *self.inner.controller_subscription.lock() = Some(subscription);

        let state = controller.state().get();
        self.inner.position.set(state.position);
        self.inner.playing.set(state.playing);
    }

    /// Markers of this sequence
    pub fn markers(&self) -> Vec<Marker> {
        self.inner.record.with(|r| r.markers.clone())
    }

    /// Events of this sequence
    pub fn events(&self) -> Vec<SequenceEvent> {
        self.inner.record.with(|r| r.events.clone())
    }

    /// Sub-sequences of this sequence
    pub fn sub_sequences(&self) -> Vec<SubSequence> {
        self.inner.record.with(|r| r.sub_sequences.clone())
    }

    /// Replace every event
    pub fn replace_events(&self, events: Vec<SequenceEvent>) {
        self.inner.record.update(|r| r.replace_events(events));
    }

    /// Replace every marker
    pub fn replace_markers(&self, markers: Vec<Marker>) {
        self.inner.record.update(|r| r.replace_markers(markers));
    }

    /// Replace every sub-sequence
    pub fn replace_sub_sequences(&self, subs: Vec<SubSequence>) {
        self.inner.record.update(|r| r.replace_sub_sequences(subs));
    }

    /// Insert or replace an event, snapped to the grid
    pub fn upsert_event(&self, event: SequenceEvent) {
        let resolution = self.sub_units_per_unit();
        self.inner
            .record
            .update(|r| r.upsert_event(event, |p| closest_grid_position(p, resolution)));
    }

    /// Insert or replace a marker, snapped to the grid
    pub fn upsert_marker(&self, marker: Marker) {
        let resolution = self.sub_units_per_unit();
        self.inner
            .record
            .update(|r| r.upsert_marker(marker, |p| closest_grid_position(p, resolution)));
    }

    /// Insert or replace a sub-sequence, its start snapped to the grid
    pub fn upsert_sub_sequence(&self, sub: SubSequence) {
        let resolution = self.sub_units_per_unit();
        self.inner
            .record
            .update(|r| r.upsert_sub_sequence(sub, |p| closest_grid_position(p, resolution)));
    }

    /// Position of the marker best matching `name`
    pub fn marker_position(&self, name: &str) -> Option<f64> {
        self.inner.record.with(|r| marker_position(&r.markers, name))
    }

    /// Jump to a marker and play from there
    pub fn go_to_and_play(&self, marker: &str, config: PlayConfig) -> Result<PlaybackHandle> {
        let position = self
            .marker_position(marker)
            .ok_or_else(|| PlaybackError::MarkerNotFound(marker.to_string()))?;
        self.set_position(position);
        self.play(config)
    }

    /// Jump to a marker and stay paused there
    pub fn go_to_and_stop(&self, marker: &str) -> Result<()> {
        let position = self
            .marker_position(marker)
            .ok_or_else(|| PlaybackError::MarkerNotFound(marker.to_string()))?;
        self.set_position(position);
        Ok(())
    }

    /// Call `listener` whenever an event called `name` is crossed
    pub fn listen(
        &self,
        name: impl Into<String>,
        listener: impl Fn(&SequenceEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.inner.events.listen(name, Arc::new(listener))
    }

    /// Remove a listener
    pub fn unlisten(&self, name: &str, id: ListenerId) -> bool {
        self.inner.events.unlisten(name, id)
    }

    pub(crate) fn is_composing(&self) -> bool {
        self.inner.composer.is_composing()
    }

    fn on_position_change(&self, previous: f64, next: f64) {
        if self.inner.suppress_dispatch.swap(false, Ordering::AcqRel) {
            tracing::trace!("Skipping event dispatch for jump {previous} -> {next}");
        } else {
            let (length, events) = self.inner.record.with(|r| (r.length, r.events.clone()));
            if let Some(action) = self.inner.events.dispatch(previous, next, length, &events) {
                self.defer(action);
            }
        }

        let Some(registry) = self.inner.registry.as_ref().and_then(Weak::upgrade) else {
            return;
        };
        let subs = self.inner.record.with(|r| r.sub_sequences.clone());
        if subs.is_empty() {
            return;
        }
        self.inner
            .composer
            .compose(self, registry.as_ref(), &subs, previous, next);
    }

    /// Apply a built-in event action outside the current update
    fn defer(&self, action: DeferredAction) {
        let weak = Arc::downgrade(&self.inner);
        self.clock().on_next_tick(move |_| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let sequence = Sequence { inner };
            match action {
                DeferredAction::Stop => sequence.pause(),
                DeferredAction::GoTo(value) => sequence.go_to_value(value),
            }
        });
    }

    fn go_to_value(&self, value: Option<EventValue>) {
        let target = match &value {
            Some(EventValue::Number(position)) => Some(*position),
            Some(EventValue::Text(text)) => self
                .marker_position(text)
                .or_else(|| text.trim().parse::<f64>().ok()),
            _ => None,
        };
        match target {
            Some(target) => self.jump(target),
            None => tracing::warn!(
                "goTo event on {} has no usable target {:?}; ignoring",
                self.address(),
                value
            ),
        }
    }

    /// Jump without firing the events in between. A running play continues
    /// from the new position and keeps its handle.
    fn jump(&self, target: f64) {
        let controller = self.controller();
        let target = self.clamp_position(target);
        if target != self.position() {
            self.inner.suppress_dispatch.store(true, Ordering::Release);
        }
        self.inner.events.clear_dedup();
        controller.goto_position(target);
        if !self.playing() {
            return;
        }

        let resume = match self.inner.active_play.lock().as_ref() {
            Some(ActivePlay::Config { config, ticker }) => {
                Resume::Config(*config, ticker.clone())
            }
            Some(ActivePlay::Dynamic { range, ticker, .. }) => {
                Resume::Dynamic(range.clone(), ticker.clone())
            }
            None => return,
        };
        let resumed = match resume {
            Resume::Config(config, ticker) => self
                .request(&config)
                .and_then(|request| controller.resume(request, &ticker)),
            Resume::Dynamic(range, ticker) => controller.resume_dynamic_range(range, &ticker),
        };
        if let Err(e) = resumed {
            tracing::warn!("Could not resume {} after goTo: {e}", self.address());
            controller.pause();
        }
    }
}

enum Resume {
    Config(PlayConfig, Ticker),
    Dynamic(Observable<PlaybackRange>, Ticker),
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence")
            .field("address", &self.inner.address)
            .field("position", &self.inner.position.get())
            .field("playing", &self.inner.playing.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioBuffer;
    use crate::record::SheetId;
    use crate::testing::FakeAudioContext;
    use futures::FutureExt;

    fn sequence(record: SequenceRecord) -> Sequence {
        Sequence::new(
            SheetAddress::new(SheetId::new("sheet"), "main"),
            Observable::new(record),
            Ticker::new(),
            EngineSettings::default(),
        )
    }

    fn fired(sequence: &Sequence, name: &str) -> Arc<Mutex<Vec<f64>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        sequence.listen(name, move |e| sink.lock().push(e.position));
        seen
    }

    #[test]
    fn test_position_setter_clamps() {
        let sequence = sequence(SequenceRecord::with_length(5.0));
        sequence.set_position(7.0);
        assert_eq!(sequence.position(), 5.0);
        sequence.set_position(-1.0);
        assert_eq!(sequence.position(), 0.0);
        sequence.set_position(f64::NAN);
        assert_eq!(sequence.position(), 0.0);
        sequence.set_position(2.5);
        assert_eq!(sequence.position(), 2.5);
    }

    #[test]
    fn test_play_whole_sequence_resolves_true() {
        let sequence = sequence(SequenceRecord::with_length(2.0));
        let ticker = sequence.ticker().clone();
        let handle = sequence.play(PlayConfig::default()).unwrap();
        assert!(sequence.playing());

        ticker.tick(0.0);
        ticker.tick(1.0);
        assert_eq!(sequence.position(), 1.0);
        ticker.tick(3.0);
        assert_eq!(sequence.position(), 2.0);
        assert!(!sequence.playing());
        assert_eq!(handle.now_or_never(), Some(true));
    }

    #[test]
    #[cfg_attr(not(debug_assertions), ignore)]
    fn test_play_validation() {
        let sequence = sequence(SequenceRecord::with_length(2.0));
        let err = sequence
            .play(PlayConfig::default().with_range(1.0, 0.5))
            .unwrap_err();
        assert!(err.is_validation());
        let err = sequence
            .play(PlayConfig::default().with_iterations(1.5))
            .unwrap_err();
        assert!(matches!(err, PlaybackError::InvalidIterationCount(_)));
        let err = sequence.play(PlayConfig::default().with_rate(-1.0)).unwrap_err();
        assert!(matches!(err, PlaybackError::InvalidRate(_)));
        assert!(!sequence.playing());
    }

    #[test]
    fn test_range_past_length_is_clamped() {
        let sequence = sequence(SequenceRecord::with_length(2.0));
        let ticker = sequence.ticker().clone();
        let handle = sequence
            .play(PlayConfig::default().with_range(1.0, 5.0))
            .unwrap();
        ticker.tick(0.0);
        ticker.tick(10.0);
        assert_eq!(sequence.position(), 2.0);
        assert_eq!(handle.now_or_never(), Some(true));
    }

    #[test]
    fn test_events_fire_while_playing() {
        let mut record = SequenceRecord::with_length(2.0);
        record.events = vec![SequenceEvent::new("cue", 0.5), SequenceEvent::new("cue", 1.5)];
        let sequence = sequence(record);
        let seen = fired(&sequence, "cue");
        let ticker = sequence.ticker().clone();

        let _handle = sequence.play(PlayConfig::default()).unwrap();
        ticker.tick(0.0);
        ticker.tick(0.6);
        assert_eq!(*seen.lock(), vec![0.5]);
        ticker.tick(1.0);
        ticker.tick(1.6);
        assert_eq!(*seen.lock(), vec![0.5, 1.5]);
    }

    #[test]
    fn test_stop_event_pauses_on_next_tick() {
        let mut record = SequenceRecord::with_length(4.0);
        record.events = vec![SequenceEvent::new("stop", 1.0)];
        let sequence = sequence(record);
        let ticker = sequence.ticker().clone();

        let handle = sequence.play(PlayConfig::default()).unwrap();
        ticker.tick(0.0);
        ticker.tick(1.05);
        assert!(sequence.playing());
        ticker.tick(1.1);
        assert!(!sequence.playing());
        assert_eq!(sequence.position(), 1.05);
        assert_eq!(handle.now_or_never(), Some(false));
    }

    #[test]
    fn test_goto_event_jumps_and_keeps_playing() {
        let mut record = SequenceRecord::with_length(4.0);
        record.markers = vec![Marker::new("Loop", 0.5)];
        record.events = vec![
            SequenceEvent::new("cue", 0.75),
            SequenceEvent::new("goTo", 2.0).with_value(EventValue::Text("loop".into())),
        ];
        let sequence = sequence(record);
        let cues = fired(&sequence, "cue");
        let ticker = sequence.ticker().clone();

        let _handle = sequence.play(PlayConfig::default()).unwrap();
        ticker.tick(0.0);
        ticker.tick(1.0);
        assert_eq!(*cues.lock(), vec![0.75]);
        ticker.tick(2.05);
        ticker.tick(2.1);
        assert_eq!(sequence.position(), 0.5);
        assert!(sequence.playing());

        // The jump itself fires nothing, but dedup was cleared so the cue
        // fires again on the way back.
        assert_eq!(*cues.lock(), vec![0.75]);
        ticker.tick(2.4);
        assert_eq!(*cues.lock(), vec![0.75, 0.75]);
    }

    #[test]
    fn test_stop_event_follows_the_playing_clock() {
        let mut record = SequenceRecord::with_length(4.0);
        record.events = vec![SequenceEvent::new("stop", 1.0)];
        let sequence = sequence(record);
        let external = Ticker::new();

        let handle = sequence
            .play_with_ticker(PlayConfig::default(), &external)
            .unwrap();
        external.tick(0.0);
        external.tick(1.05);
        assert!(sequence.playing());
        external.tick(1.1);

        assert!(!sequence.playing());
        assert_eq!(sequence.position(), 1.05);
        assert_eq!(handle.now_or_never(), Some(false));
        assert_eq!(sequence.ticker().pending(), 0);
        assert_eq!(external.pending(), 0);
    }

    #[test]
    fn test_goto_keeps_the_play_handle() {
        let mut record = SequenceRecord::with_length(4.0);
        record.events = vec![SequenceEvent::new("goTo", 1.0).with_value(EventValue::Number(3.0))];
        let sequence = sequence(record);
        let external = Ticker::new();

        let mut handle = sequence
            .play_with_ticker(PlayConfig::default(), &external)
            .unwrap();
        external.tick(0.0);
        external.tick(1.05);
        external.tick(1.1);
        assert_eq!(sequence.position(), 3.0);
        assert!(sequence.playing());
        assert_eq!((&mut handle).now_or_never(), None);

        external.tick(2.2);
        assert_eq!(sequence.position(), 4.0);
        assert!(!sequence.playing());
        assert_eq!(handle.now_or_never(), Some(true));
    }

    #[test]
    fn test_looping_refires_events_after_wrap() {
        let mut record = SequenceRecord::with_length(1.0);
        record.events = vec![SequenceEvent::new("cue", 0.1), SequenceEvent::new("cue", 0.9)];
        let sequence = sequence(record);
        let seen = fired(&sequence, "cue");
        let ticker = sequence.ticker().clone();

        let _handle = sequence.play(PlayConfig::looping()).unwrap();
        ticker.tick(0.0);
        ticker.tick(0.5);
        ticker.tick(0.95);
        assert_eq!(*seen.lock(), vec![0.1, 0.9]);

        // Wrapping from 0.95 to 0.05 fires nothing, not even the 0.9 event.
        ticker.tick(1.05);
        assert!(sequence.position() < 0.1);
        assert_eq!(*seen.lock(), vec![0.1, 0.9]);

        ticker.tick(1.15);
        assert_eq!(*seen.lock(), vec![0.1, 0.9, 0.1]);
        assert!(sequence.playing());
    }

    #[test]
    fn test_dynamic_range_is_kept_inside_the_sequence() {
        let sequence = sequence(SequenceRecord::with_length(2.0));
        let ticker = sequence.ticker().clone();
        let range = Observable::new(PlaybackRange::new(0.0, 5.0));
        let handle = sequence.play_dynamic_range(range.clone()).unwrap();

        ticker.tick(0.0);
        ticker.tick(1.5);
        assert_eq!(sequence.position(), 1.5);
        ticker.tick(2.5);
        assert_eq!(sequence.position(), 0.5);

        range.set(PlaybackRange::new(1.0, 9.0));
        ticker.tick(3.0);
        assert_eq!(sequence.position(), 1.0);
        ticker.tick(4.5);
        assert_eq!(sequence.position(), 1.5);
        assert!(sequence.playing());

        sequence.pause();
        assert_eq!(handle.now_or_never(), Some(false));
    }

    #[test]
    fn test_markers_navigation() {
        let mut record = SequenceRecord::with_length(10.0);
        record.markers = vec![Marker::new("Chorus", 4.0)];
        let sequence = sequence(record);

        assert_eq!(sequence.marker_position("chorus"), Some(4.0));
        sequence.go_to_and_stop("Chorus").unwrap();
        assert_eq!(sequence.position(), 4.0);
        assert!(!sequence.playing());

        let err = sequence.go_to_and_stop("Bridge").unwrap_err();
        assert!(matches!(err, PlaybackError::MarkerNotFound(name) if name == "Bridge"));

        let _handle = sequence.go_to_and_play("Chor", PlayConfig::default()).unwrap();
        assert!(sequence.playing());
    }

    #[test]
    fn test_replace_controller_preserves_position() {
        let sequence = sequence(SequenceRecord::with_length(10.0));
        let ticker = sequence.ticker().clone();
        let handle = sequence.play(PlayConfig::default()).unwrap();
        ticker.tick(0.0);
        ticker.tick(3.25);

        let old = sequence.controller();
        let context = FakeAudioContext::new();
        let entries = vec![AudioEntry::new(AudioBuffer::new(1000, 2000, 1), 0.0)];
        sequence.attach_audio(Arc::new(context), entries);

        assert!((sequence.position() - 3.25).abs() < 1e-9);
        assert!(!sequence.playing());
        assert_eq!(handle.now_or_never(), Some(false));
        ticker.tick(5.0);
        assert!((old.current_position() - 3.25).abs() < 1e-9);
        assert!(!Arc::ptr_eq(&old, &sequence.controller()));

        // Views follow the new controller.
        let _handle = sequence.play(PlayConfig::default()).unwrap();
        ticker.tick(6.0);
        assert!((sequence.position() - 4.25).abs() < 1e-9);
        sequence.detach_audio();
        assert!((sequence.position() - 4.25).abs() < 1e-9);
    }

    #[test]
    fn test_edits_are_snapped_to_grid() {
        let mut record = SequenceRecord::with_length(10.0);
        record.sub_units_per_unit = 10;
        let sequence = sequence(record);

        sequence.upsert_marker(Marker::new("Drop", 3.14));
        sequence.upsert_event(SequenceEvent::new("cue", 1.26));
        assert_eq!(sequence.marker_position("Drop"), Some(3.1));
        assert_eq!(sequence.events()[0].position, 1.3);
    }

    #[test]
    fn test_grid_and_formatting() {
        let sequence = sequence(SequenceRecord::with_length(90.0));
        assert_eq!(sequence.closest_grid_position(1.51), 1.5);
        assert_eq!(sequence.formatter().format_for_playhead(61.5), "01m01s15f");
    }
}
