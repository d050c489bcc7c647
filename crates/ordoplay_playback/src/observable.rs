// SPDX-License-Identifier: MIT OR Apache-2.0
//! Observable value cells.
//!
//! An [`Observable`] is a shared, mutable cell that tells its subscribers
//! about every change as a `(previous, next)` pair. Delivery is single-flight:
//! a change made while subscribers are being notified is queued and delivered
//! once the current delivery has finished, so subscribers always see changes
//! in order and never re-entrantly.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Listener<T> = Arc<dyn Fn(&T, &T) + Send + Sync>;

struct Shared<T> {
    value: Mutex<T>,
    listeners: Mutex<Vec<(u64, Listener<T>)>>,
    next_listener: AtomicU64,
    delivery: Mutex<Delivery<T>>,
}

struct Delivery<T> {
    active: bool,
    queue: VecDeque<(T, T)>,
}

/// A shared value cell with change notification
pub struct Observable<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("value", &*self.shared.value.lock())
            .field("listeners", &self.shared.listeners.lock().len())
            .finish()
    }
}

impl<T> Observable<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a cell holding `value`
    pub fn new(value: T) -> Self {
        Self {
            shared: Arc::new(Shared {
                value: Mutex::new(value),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
                delivery: Mutex::new(Delivery {
                    active: false,
                    queue: VecDeque::new(),
                }),
            }),
        }
    }

    /// Current value
    pub fn get(&self) -> T {
        self.shared.value.lock().clone()
    }

    /// Read the current value without cloning it
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.shared.value.lock())
    }

    /// Replace the value, notifying subscribers if it changed
    pub fn set(&self, value: T) {
        let previous = {
            let mut current = self.shared.value.lock();
            if *current == value {
                return;
            }
            std::mem::replace(&mut *current, value.clone())
        };
        self.deliver(previous, value);
    }

    /// Mutate the value in place, notifying subscribers if it changed
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let change = {
            let mut current = self.shared.value.lock();
            let previous = current.clone();
            f(&mut current);
            if *current == previous {
                None
            } else {
                Some((previous, current.clone()))
            }
        };
        if let Some((previous, next)) = change {
            self.deliver(previous, next);
        }
    }

    /// Subscribe to changes. The listener stays registered until the
    /// returned [`Subscription`] is dropped.
    pub fn subscribe(&self, listener: impl Fn(&T, &T) + Send + Sync + 'static) -> Subscription {
        let id = self.shared.next_listener.fetch_add(1, Ordering::Relaxed);
        self.shared.listeners.lock().push((id, Arc::new(listener)));

        let weak: Weak<Shared<T>> = Arc::downgrade(&self.shared);
        Subscription::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.listeners.lock().retain(|(other, _)| *other != id);
            }
        })
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.shared.listeners.lock().len()
    }

    fn deliver(&self, previous: T, next: T) {
        {
            let mut delivery = self.shared.delivery.lock();
            delivery.queue.push_back((previous, next));
            if delivery.active {
                return;
            }
            delivery.active = true;
        }

        let _reset = DeliveryGuard(&self.shared.delivery);
        loop {
            let Some((previous, next)) = self.shared.delivery.lock().queue.pop_front() else {
                break;
            };
            let listeners: Vec<Listener<T>> = self
                .shared
                .listeners
                .lock()
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect();
            for listener in listeners {
                listener(&previous, &next);
            }
        }
    }
}

impl<T> Default for Observable<T>
where
    T: Clone + PartialEq + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Clears the delivery flag even if a listener unwinds
struct DeliveryGuard<'a, T>(&'a Mutex<Delivery<T>>);

impl<T> Drop for DeliveryGuard<'_, T> {
    fn drop(&mut self) {
        let mut delivery = self.0.lock();
        delivery.active = false;
        if std::thread::panicking() {
            delivery.queue.clear();
        }
    }
}

/// Keeps a listener registered; unsubscribes on drop
#[must_use = "dropping a Subscription unsubscribes its listener"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap an unsubscribe action
    pub fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Unsubscribe now
    pub fn cancel(mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}
