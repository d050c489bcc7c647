// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cooperative frame clock.
//!
//! The [`Ticker`] never advances on its own: whoever owns the frame loop
//! calls [`Ticker::tick`] with a monotonic time in seconds. Callbacks are
//! one-shot and identified by the [`TickId`] returned when they are queued.
//!
//! - `on_next_tick` callbacks run during the next call to `tick`.
//! - `on_this_or_next_tick` callbacks run in the current tick if one is in
//!   progress (in a further round, after the running callback returns),
//!   otherwise in the next one.
//!
//! Cancelling a callback removes it even when it is already due in the tick
//! that is currently running.

use crate::settings::TickerSettings;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// A one-shot tick callback, receiving the tick time in seconds
pub type TickCallback = Box<dyn FnOnce(f64) + Send>;

/// Identifies a queued tick callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TickId(u64);

struct TickerState {
    time: f64,
    ticking: bool,
    ticks: u64,
    next_id: u64,
    settings: TickerSettings,
    /// Runs in the current tick (if ticking) or the next one
    this_or_next: IndexMap<TickId, TickCallback>,
    /// Runs in the next tick
    next: IndexMap<TickId, TickCallback>,
    /// Round currently being executed
    due: IndexMap<TickId, TickCallback>,
}

impl TickerState {
    fn allocate(&mut self) -> TickId {
        let id = TickId(self.next_id);
        self.next_id += 1;
        id
    }
}

/// Shared handle to a frame clock
#[derive(Clone)]
pub struct Ticker {
    state: Arc<Mutex<TickerState>>,
}

impl Ticker {
    /// Create a ticker at time zero
    pub fn new() -> Self {
        Self::with_settings(TickerSettings::default())
    }

    /// Create a ticker with custom recursion limits
    pub fn with_settings(settings: TickerSettings) -> Self {
        Self {
            state: Arc::new(Mutex::new(TickerState {
                time: 0.0,
                ticking: false,
                ticks: 0,
                next_id: 0,
                settings,
                this_or_next: IndexMap::new(),
                next: IndexMap::new(),
                due: IndexMap::new(),
            })),
        }
    }

    /// Time of the current (or most recent) tick, in seconds
    pub fn time(&self) -> f64 {
        self.state.lock().time
    }

    /// Whether a tick is in progress
    pub fn is_ticking(&self) -> bool {
        self.state.lock().ticking
    }

    /// Number of ticks delivered so far
    pub fn tick_count(&self) -> u64 {
        self.state.lock().ticks
    }

    /// Number of callbacks waiting to run
    pub fn pending(&self) -> usize {
        let state = self.state.lock();
        state.this_or_next.len() + state.next.len() + state.due.len()
    }

    /// Queue a callback for the current tick (if ticking) or the next one
    pub fn on_this_or_next_tick(&self, callback: impl FnOnce(f64) + Send + 'static) -> TickId {
        let mut state = self.state.lock();
        let id = state.allocate();
        state.this_or_next.insert(id, Box::new(callback));
        id
    }

    /// Queue a callback for the next tick
    pub fn on_next_tick(&self, callback: impl FnOnce(f64) + Send + 'static) -> TickId {
        let mut state = self.state.lock();
        let id = state.allocate();
        state.next.insert(id, Box::new(callback));
        id
    }

    /// Cancel a callback queued with [`on_this_or_next_tick`](Self::on_this_or_next_tick).
    /// Returns whether it was still pending.
    pub fn off_this_or_next_tick(&self, id: TickId) -> bool {
        let mut state = self.state.lock();
        state.this_or_next.shift_remove(&id).is_some() || state.due.shift_remove(&id).is_some()
    }

    /// Cancel a callback queued with [`on_next_tick`](Self::on_next_tick).
    /// Returns whether it was still pending.
    pub fn off_next_tick(&self, id: TickId) -> bool {
        let mut state = self.state.lock();
        state.next.shift_remove(&id).is_some()
            || state.this_or_next.shift_remove(&id).is_some()
            || state.due.shift_remove(&id).is_some()
    }

    /// Advance the clock to `time` (seconds) and run due callbacks
    pub fn tick(&self, time: f64) {
        let settings = {
            let mut state = self.state.lock();
            if state.ticking {
                tracing::warn!("Ticker::tick called re-entrantly at {time}; ignoring");
                return;
            }
            if time < state.time {
                tracing::warn!(
                    "Ticker time went backwards ({} -> {}); keeping {}",
                    state.time,
                    time,
                    state.time
                );
            } else {
                state.time = time;
            }
            state.ticking = true;
            state.ticks += 1;

            let next = std::mem::take(&mut state.next);
            state.this_or_next.extend(next);
            state.settings
        };

        let _done = TickingGuard(&self.state);
        let time = self.time();
        let mut round = 0;
        loop {
            {
                let mut state = self.state.lock();
                if state.this_or_next.is_empty() {
                    break;
                }
                if round >= settings.max_rounds {
                    tracing::error!(
                        "Ticker reached {} callback rounds in one tick; deferring {} callbacks",
                        settings.max_rounds,
                        state.this_or_next.len()
                    );
                    break;
                }
                if round == settings.warn_after_rounds {
                    tracing::warn!("Ticker has run {round} callback rounds in one tick");
                }
                state.due = std::mem::take(&mut state.this_or_next);
            }

            loop {
                let callback = self.state.lock().due.shift_remove_index(0);
                match callback {
                    Some((_, callback)) => callback(time),
                    None => break,
                }
            }
            round += 1;
        }
    }
}

impl Default for Ticker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Ticker")
            .field("time", &state.time)
            .field("ticks", &state.ticks)
            .field("pending", &(state.this_or_next.len() + state.next.len() + state.due.len()))
            .finish()
    }
}

struct TickingGuard<'a>(&'a Mutex<TickerState>);

impl Drop for TickingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        state.ticking = false;
        let leftover = std::mem::take(&mut state.due);
        state.this_or_next.extend(leftover);
    }
}
