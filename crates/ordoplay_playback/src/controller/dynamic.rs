// SPDX-License-Identifier: MIT OR Apache-2.0
//! Looping inside a range that changes while playing.

use super::{Completion, PlaybackCell, TickLoop, TraversalHooks};
use crate::observable::{Observable, Subscription};
use crate::ticker::{TickId, Ticker};
use crate::timing::{PlayRequest, PlaybackRange};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Restarts an endless loop whenever its range changes
pub(crate) struct DynamicRangeLoop<H: TraversalHooks + Clone> {
    cell: Arc<PlaybackCell>,
    ticker: Ticker,
    range: Observable<PlaybackRange>,
    hooks: H,
    state: Mutex<DynamicState<H>>,
}

struct DynamicState<H: TraversalHooks> {
    current: Option<Arc<TickLoop<H>>>,
    pending_restart: Option<TickId>,
    range_subscription: Option<Subscription>,
    completion: Option<Completion>,
    stopped: bool,
}

impl<H: TraversalHooks + Clone> DynamicRangeLoop<H> {
    /// Start looping. The loop never completes on its own, so `done` is
    /// only handed back by [`detach`](Self::detach).
    pub(crate) fn start(
        cell: &Arc<PlaybackCell>,
        ticker: &Ticker,
        range: Observable<PlaybackRange>,
        hooks: H,
        done: Option<Completion>,
    ) -> Arc<Self> {
        let this = Arc::new(Self {
            cell: Arc::clone(cell),
            ticker: ticker.clone(),
            range: range.clone(),
            hooks,
            state: Mutex::new(DynamicState {
                current: None,
                pending_restart: None,
                range_subscription: None,
                completion: done,
                stopped: false,
            }),
        });

        let weak = Arc::downgrade(&this);
        let subscription = range.subscribe(move |_, _| {
            if let Some(this) = weak.upgrade() {
                this.schedule_restart();
            }
        });
        this.state.lock().range_subscription = Some(subscription);
        this.schedule_restart();
        this
    }

    fn schedule_restart(self: &Arc<Self>) {
        let mut state = self.state.lock();
        if state.stopped {
            return;
        }
        if let Some(id) = state.pending_restart.take() {
            self.ticker.off_this_or_next_tick(id);
        }
        let weak: Weak<Self> = Arc::downgrade(self);
        state.pending_restart = Some(self.ticker.on_this_or_next_tick(move |_| {
            if let Some(this) = weak.upgrade() {
                this.restart();
            }
        }));
    }

    fn restart(&self) {
        let previous = {
            let mut state = self.state.lock();
            if state.stopped {
                return;
            }
            state.pending_restart = None;
            state.current.take()
        };
        if let Some(previous) = previous {
            previous.cancel();
        }

        let range = self.range.get();
        if range.length() <= 0.0 {
            tracing::warn!(
                "Dynamic playback range [{}, {}] is empty; waiting for a valid range",
                range.start,
                range.end
            );
            return;
        }

        let position = self.cell.position();
        let start = if !range.contains(position) || position == range.end {
            range.start
        } else {
            position
        };
        self.cell.set_position(start);
        self.cell.set_playing(true);

        let current = TickLoop::start(
            &self.cell,
            &self.ticker,
            PlayRequest::looping(range),
            self.hooks.clone(),
            None,
        );

        let mut state = self.state.lock();
        if state.stopped {
            drop(state);
            current.cancel();
        } else {
            state.current = Some(current);
        }
    }

    /// Tear everything down and hand back the unsettled completion
    pub(crate) fn detach(&self) -> Option<Completion> {
        let (current, pending, subscription, done) = {
            let mut state = self.state.lock();
            if state.stopped {
                return None;
            }
            state.stopped = true;
            (
                state.current.take(),
                state.pending_restart.take(),
                state.range_subscription.take(),
                state.completion.take(),
            )
        };
        drop(subscription);
        if let Some(id) = pending {
            self.ticker.off_this_or_next_tick(id);
        }
        if let Some(current) = current {
            current.cancel();
        }
        done
    }
}
