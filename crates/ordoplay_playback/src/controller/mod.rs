// SPDX-License-Identifier: MIT OR Apache-2.0
//! Playback controllers.
//!
//! A controller owns one [`PlaybackState`] cell and the rules for advancing
//! it against a [`Ticker`]. Sequences hold exactly one controller at a time
//! and can swap it (to attach or detach audio) without a discontinuity.

mod default;
mod dynamic;
mod multi_audio;

use dynamic::DynamicRangeLoop;

pub use default::DefaultPlaybackController;
pub use multi_audio::MultiAudioPlaybackController;

use crate::error::Result;
use crate::observable::Observable;
use crate::ticker::{TickId, Ticker};
use crate::timing::{start_position, PlayRequest, PlaybackRange, Traversal};
use futures::channel::oneshot;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Position and play flag of a controller
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlaybackState {
    /// Timeline position
    pub position: f64,
    /// Whether a play loop is running
    pub playing: bool,
}

/// Strategy that advances a sequence's playback state
pub trait PlaybackController: Send + Sync {
    /// The state cell this controller writes
    fn state(&self) -> &Observable<PlaybackState>;

    /// Play `request` against `ticker`. The handle resolves `true` when every
    /// iteration completes, `false` when interrupted.
    fn play(&self, request: PlayRequest, ticker: &Ticker) -> Result<PlaybackHandle>;

    /// Loop forever inside a range that may change while playing
    fn play_dynamic_range(
        &self,
        range: Observable<PlaybackRange>,
        ticker: &Ticker,
    ) -> Result<PlaybackHandle>;

    /// Restart `request` from the current position while a play is running.
    /// The handle of the running play is kept: it settles with the outcome of
    /// the new run instead of `false`. The default starts a fresh
    /// [`play`](Self::play), which interrupts the running handle.
    fn resume(&self, request: PlayRequest, ticker: &Ticker) -> Result<()> {
        self.play(request, ticker).map(drop)
    }

    /// [`resume`](Self::resume) for a dynamic range loop
    fn resume_dynamic_range(
        &self,
        range: Observable<PlaybackRange>,
        ticker: &Ticker,
    ) -> Result<()> {
        self.play_dynamic_range(range, ticker).map(drop)
    }

    /// Stop playing. Idempotent.
    fn pause(&self);

    /// Move to `position` without changing the play flag
    fn goto_position(&self, position: f64);

    /// Release everything this controller has scheduled
    fn destroy(&self);

    /// Current position
    fn current_position(&self) -> f64 {
        self.state().with(|s| s.position)
    }

    /// Whether playing
    fn playing(&self) -> bool {
        self.state().with(|s| s.playing)
    }
}

/// Future resolving to whether a play call ran to completion
#[derive(Debug)]
#[must_use = "a PlaybackHandle reports whether playback completed"]
pub struct PlaybackHandle {
    receiver: oneshot::Receiver<bool>,
}

impl PlaybackHandle {
    /// A handle that is already settled
    pub fn settled(completed: bool) -> Self {
        let (completion, handle) = completion();
        completion.resolve(completed);
        handle
    }
}

impl Future for PlaybackHandle {
    type Output = bool;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<bool> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(completed)) => Poll::Ready(completed),
            // Sender dropped without resolving: the play loop was torn down.
            Poll::Ready(Err(_)) => Poll::Ready(false),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Sending half of a [`PlaybackHandle`]
#[derive(Debug)]
pub(crate) struct Completion {
    sender: oneshot::Sender<bool>,
}

impl Completion {
    pub(crate) fn resolve(self, completed: bool) {
        let _ = self.sender.send(completed);
    }
}

pub(crate) fn completion() -> (Completion, PlaybackHandle) {
    let (sender, receiver) = oneshot::channel();
    (Completion { sender }, PlaybackHandle { receiver })
}

/// Stops the running loop and gives back its completion, unresolved
type StopActive = Box<dyn FnOnce() -> Option<Completion> + Send>;

/// The state cell plus the teardown of whatever is currently playing
pub(crate) struct PlaybackCell {
    state: Observable<PlaybackState>,
    stop_active: Mutex<Option<StopActive>>,
}

impl PlaybackCell {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Observable::new(PlaybackState::default()),
            stop_active: Mutex::new(None),
        })
    }

    pub(crate) fn state(&self) -> &Observable<PlaybackState> {
        &self.state
    }

    pub(crate) fn position(&self) -> f64 {
        self.state.with(|s| s.position)
    }

    pub(crate) fn set_position(&self, position: f64) {
        self.state.update(|s| s.position = position);
    }

    pub(crate) fn set_playing(&self, playing: bool) {
        self.state.update(|s| s.playing = playing);
    }

    /// Register how to tear down the play loop that just started
    fn install_stop(&self, stop: impl FnOnce() -> Option<Completion> + Send + 'static) {
        let previous = self.stop_active.lock().replace(Box::new(stop));
        if let Some(done) = previous.and_then(|previous| previous()) {
            done.resolve(false);
        }
    }

    /// Tear down the running play loop, if any
    pub(crate) fn stop_active(&self) {
        if let Some(done) = self.hand_over() {
            done.resolve(false);
        }
    }

    /// Tear down the running play loop but keep its completion for the run
    /// that replaces it. The play flag is left alone.
    pub(crate) fn hand_over(&self) -> Option<Completion> {
        let stop = self.stop_active.lock().take();
        stop.and_then(|stop| stop())
    }

    /// Shared `pause()` behaviour
    pub(crate) fn pause(&self) {
        self.stop_active();
        self.set_playing(false);
    }

    /// Normalize the position for `request` and start traversing it.
    /// `done` settles when the traversal completes or is stopped.
    pub(crate) fn launch<H: TraversalHooks>(
        self: &Arc<Self>,
        ticker: &Ticker,
        request: PlayRequest,
        hooks: H,
        done: Option<Completion>,
    ) {
        let start = start_position(self.position(), request.range, request.direction);
        self.set_position(start);
        self.set_playing(true);

        let run = TickLoop::start(self, ticker, request, hooks, done);
        // The ticker owns the loop while it runs.
        let run = Arc::downgrade(&run);
        self.install_stop(move || run.upgrade().and_then(|run| run.detach()));
    }

    /// Start looping inside `range` until stopped
    pub(crate) fn launch_dynamic<H: TraversalHooks + Clone>(
        self: &Arc<Self>,
        ticker: &Ticker,
        range: Observable<PlaybackRange>,
        hooks: H,
        done: Option<Completion>,
    ) {
        self.set_playing(true);
        let run = DynamicRangeLoop::start(self, ticker, range, hooks, done);
        self.install_stop(move || run.detach());
    }
}

/// Side effects a controller attaches to a running traversal
pub(crate) trait TraversalHooks: Send + Sync + 'static {
    /// Playback starts (or restarts after a wrap) at `position`
    fn started(&self, _position: f64, _request: &PlayRequest) {}

    /// Playback stopped: completed, paused or replaced
    fn stopped(&self) {}
}

impl TraversalHooks for () {}

/// Drives one traversal: one tick subscription at a time, until it finishes
/// or is cancelled.
pub(crate) struct TickLoop<H: TraversalHooks> {
    cell: Arc<PlaybackCell>,
    ticker: Ticker,
    traversal: Traversal,
    hooks: H,
    run: Mutex<LoopRun>,
}

struct LoopRun {
    subscription: Option<TickId>,
    completion: Option<Completion>,
    last_iteration: u64,
    done: bool,
}

impl<H: TraversalHooks> TickLoop<H> {
    /// Start traversing `request` from the cell's current position.
    /// The caller has already normalized the position with
    /// [`start_position`](crate::timing::start_position).
    pub(crate) fn start(
        cell: &Arc<PlaybackCell>,
        ticker: &Ticker,
        request: PlayRequest,
        hooks: H,
        completion: Option<Completion>,
    ) -> Arc<Self> {
        let start = cell.position();
        let traversal = Traversal::begin(request, ticker.time(), start);
        let this = Arc::new(Self {
            cell: Arc::clone(cell),
            ticker: ticker.clone(),
            traversal,
            hooks,
            run: Mutex::new(LoopRun {
                subscription: None,
                completion,
                last_iteration: traversal.iteration_of(traversal.elapsed_at(ticker.time())),
                done: false,
            }),
        });

        this.hooks.started(start, &request);
        let first = Arc::clone(&this);
        let id = ticker.on_this_or_next_tick(move |time| first.on_tick(time));
        this.run.lock().subscription = Some(id);
        this
    }

    fn on_tick(self: Arc<Self>, time: f64) {
        {
            let mut run = self.run.lock();
            if run.done {
                return;
            }
            run.subscription = None;
        }

        let sample = self.traversal.sample(time);
        if sample.finished {
            self.cell.set_position(sample.position);
            if self.is_done() {
                return;
            }
            // Settle first: a listener reacting to the stop may start a new play.
            self.finish(true);
            self.cell.set_playing(false);
            return;
        }

        let wrapped = {
            let mut run = self.run.lock();
            let wrapped = sample.iteration > run.last_iteration;
            run.last_iteration = sample.iteration;
            wrapped
        };
        if wrapped {
            tracing::trace!("Playback wrapped into iteration {}", sample.iteration);
            // Restart side effects from where this iteration actually is,
            // which is past its edge by however late the tick arrived.
            self.hooks.stopped();
            self.hooks.started(sample.position, self.traversal.request());
        }

        self.cell.set_position(sample.position);

        // A listener may have paused us while the position was delivered.
        let mut run = self.run.lock();
        if run.done {
            return;
        }
        let next = Arc::clone(&self);
        run.subscription = Some(self.ticker.on_next_tick(move |time| next.on_tick(time)));
    }

    fn is_done(&self) -> bool {
        self.run.lock().done
    }

    fn halt(&self) -> Option<Completion> {
        let (subscription, completion) = {
            let mut run = self.run.lock();
            if run.done {
                return None;
            }
            run.done = true;
            (run.subscription.take(), run.completion.take())
        };
        if let Some(id) = subscription {
            self.ticker.off_next_tick(id);
        }
        self.hooks.stopped();
        completion
    }

    fn finish(&self, completed: bool) {
        if let Some(completion) = self.halt() {
            completion.resolve(completed);
        }
    }

    /// Tear down without settling; the completion is handed to the caller
    pub(crate) fn detach(&self) -> Option<Completion> {
        self.halt()
    }

    /// Tear down: drop the tick subscription, stop side effects, resolve `false`
    pub(crate) fn cancel(&self) {
        self.finish(false);
    }
}
