// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timeline event dispatch.
//!
//! Every position change `(previous, next)` fires the events lying in the
//! half-open interval `(min, max]`, in the direction of travel. Each event
//! fires once per crossing: a dedup set remembers what fired and is cleared
//! when playback loops or the user scrubs.

use crate::record::{EventValue, SequenceEvent};
use crate::settings::EventDispatchSettings;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Event name that pauses playback
pub const STOP_EVENT: &str = "stop";
/// Event name that jumps to its value
pub const GOTO_EVENT: &str = "goTo";

/// Callback invoked when a named event fires
pub type EventListener = Arc<dyn Fn(&SequenceEvent) + Send + Sync>;

/// Identifies a registered event listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Side effect requested by a built-in event, applied one tick later
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredAction {
    /// Pause playback
    Stop,
    /// Jump to the given absolute position or marker name
    GoTo(Option<EventValue>),
}

/// Listener registry plus the dedup state of one sequence
pub struct EventDispatcher {
    settings: EventDispatchSettings,
    listeners: Mutex<IndexMap<String, IndexMap<ListenerId, EventListener>>>,
    fired: Mutex<HashSet<String>>,
    next_listener: AtomicU64,
}

impl EventDispatcher {
    /// Create a dispatcher with the given thresholds
    pub fn new(settings: EventDispatchSettings) -> Self {
        Self {
            settings,
            listeners: Mutex::new(IndexMap::new()),
            fired: Mutex::new(HashSet::new()),
            next_listener: AtomicU64::new(0),
        }
    }

    /// Register `listener` for events called `name`
    pub fn listen(&self, name: impl Into<String>, listener: EventListener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .entry(name.into())
            .or_default()
            .insert(id, listener);
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unlisten(&self, name: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(named) = listeners.get_mut(name) else {
            return false;
        };
        let removed = named.shift_remove(&id).is_some();
        if named.is_empty() {
            listeners.shift_remove(name);
        }
        removed
    }

    /// Number of listeners registered for `name`
    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners.lock().get(name).map_or(0, IndexMap::len)
    }

    /// Forget which events already fired
    pub fn clear_dedup(&self) {
        self.fired.lock().clear();
    }

    /// Fire the events crossed by a move from `previous` to `next`.
    ///
    /// Returns the built-in action of the first `stop`/`goTo` event crossed;
    /// processing stops there and the caller applies the action later.
    pub fn dispatch(
        &self,
        previous: f64,
        next: f64,
        length: f64,
        events: &[SequenceEvent],
    ) -> Option<DeferredAction> {
        if previous == next {
            return None;
        }

        if self.looks_like_wrap(previous, next, length) {
            tracing::trace!("Position wrapped {previous} -> {next}; resetting fired events");
            self.clear_dedup();
            return None;
        }

        if (next - previous).abs() > self.settings.scrub_threshold {
            self.clear_dedup();
        }

        let (low, high) = if previous < next {
            (previous, next)
        } else {
            (next, previous)
        };
        let mut crossed: Vec<&SequenceEvent> = events
            .iter()
            .filter(|e| e.position > low && e.position <= high)
            .collect();
        crossed.sort_by(|a, b| a.position.total_cmp(&b.position));
        if next < previous {
            crossed.reverse();
        }

        for event in crossed {
            if event.name != GOTO_EVENT && !self.fired.lock().insert(event.dedup_key()) {
                continue;
            }
            self.notify(event);

            match event.name.as_str() {
                STOP_EVENT => return Some(DeferredAction::Stop),
                GOTO_EVENT => return Some(DeferredAction::GoTo(event.value.clone())),
                _ => {}
            }
        }
        None
    }

    fn looks_like_wrap(&self, previous: f64, next: f64, length: f64) -> bool {
        previous > next
            && previous > length * self.settings.wrap_upper_fraction
            && next < length * self.settings.wrap_lower_fraction
    }

    fn notify(&self, event: &SequenceEvent) {
        let listeners: Vec<EventListener> = match self.listeners.lock().get(&event.name) {
            Some(named) => named.values().cloned().collect(),
            None => return,
        };
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::error!(
                    "Listener for event {:?} at {} panicked; continuing playback",
                    event.name,
                    event.position
                );
            }
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(EventDispatchSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording(dispatcher: &EventDispatcher, name: &str) -> Arc<Mutex<Vec<f64>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        dispatcher.listen(name, Arc::new(move |e: &SequenceEvent| sink.lock().push(e.position)));
        seen
    }

    #[test]
    fn test_fires_crossed_events_in_travel_order() {
        let dispatcher = EventDispatcher::default();
        let events = vec![
            SequenceEvent::new("cue", 0.5),
            SequenceEvent::new("cue", 0.2),
            SequenceEvent::new("cue", 0.8),
        ];
        let seen = recording(&dispatcher, "cue");

        dispatcher.dispatch(0.0, 0.5, 10.0, &events);
        assert_eq!(*seen.lock(), vec![0.2, 0.5]);

        // Scrubbing back clears dedup and fires in reverse order.
        seen.lock().clear();
        dispatcher.dispatch(1.0, 0.0, 10.0, &events);
        assert_eq!(*seen.lock(), vec![0.8, 0.5, 0.2]);
    }

    #[test]
    fn test_small_steps_do_not_refire() {
        let dispatcher = EventDispatcher::default();
        let events = vec![SequenceEvent::new("cue", 0.5)];
        let seen = recording(&dispatcher, "cue");

        dispatcher.dispatch(0.45, 0.5, 10.0, &events);
        dispatcher.dispatch(0.5, 0.45, 10.0, &events);
        dispatcher.dispatch(0.45, 0.5, 10.0, &events);
        assert_eq!(*seen.lock(), vec![0.5]);
    }

    #[test]
    fn test_loop_wrap_resets_without_firing() {
        let dispatcher = EventDispatcher::default();
        let events = vec![SequenceEvent::new("cue", 0.1), SequenceEvent::new("cue", 0.9)];
        let seen = recording(&dispatcher, "cue");

        dispatcher.dispatch(0.05, 0.1, 1.0, &events);
        dispatcher.dispatch(0.85, 0.95, 1.0, &events);
        assert_eq!(*seen.lock(), vec![0.1, 0.9]);

        // Wrapping from 0.95 to 0.05 must not fire 0.9 again.
        dispatcher.dispatch(0.95, 0.05, 1.0, &events);
        assert_eq!(*seen.lock(), vec![0.1, 0.9]);

        // ...but 0.1 fires again on the next pass.
        dispatcher.dispatch(0.05, 0.12, 1.0, &events);
        assert_eq!(*seen.lock(), vec![0.1, 0.9, 0.1]);
    }

    #[test]
    fn test_stop_short_circuits() {
        let dispatcher = EventDispatcher::default();
        let events = vec![
            SequenceEvent::new(STOP_EVENT, 1.0),
            SequenceEvent::new("cue", 1.5),
        ];
        let stops = recording(&dispatcher, STOP_EVENT);
        let cues = recording(&dispatcher, "cue");

        let action = dispatcher.dispatch(0.9, 1.6, 10.0, &events);
        assert_eq!(action, Some(DeferredAction::Stop));
        assert_eq!(*stops.lock(), vec![1.0]);
        assert!(cues.lock().is_empty());
    }

    #[test]
    fn test_goto_is_never_deduped() {
        let dispatcher = EventDispatcher::default();
        let events = vec![SequenceEvent::new(GOTO_EVENT, 1.0).with_value(EventValue::Number(0.0))];

        for _ in 0..2 {
            let action = dispatcher.dispatch(0.98, 1.02, 10.0, &events);
            assert_eq!(action, Some(DeferredAction::GoTo(Some(EventValue::Number(0.0)))));
        }
    }

    #[test]
    fn test_panicking_listener_does_not_stop_others() {
        let dispatcher = EventDispatcher::default();
        dispatcher.listen("cue", Arc::new(|_: &SequenceEvent| panic!("listener failure")));
        let seen = recording(&dispatcher, "cue");

        dispatcher.dispatch(0.0, 1.0, 10.0, &[SequenceEvent::new("cue", 0.5)]);
        assert_eq!(*seen.lock(), vec![0.5]);
    }

    #[test]
    fn test_unlisten() {
        let dispatcher = EventDispatcher::default();
        let id = dispatcher.listen("cue", Arc::new(|_: &SequenceEvent| {}));
        assert_eq!(dispatcher.listener_count("cue"), 1);
        assert!(dispatcher.unlisten("cue", id));
        assert!(!dispatcher.unlisten("cue", id));
        assert_eq!(dispatcher.listener_count("cue"), 0);
    }
}
