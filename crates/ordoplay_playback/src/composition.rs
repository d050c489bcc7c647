// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sub-sequence composition.
//!
//! A host sequence places other sheets' sequences on its timeline. While the
//! host position is inside a sub-sequence's window, the child follows at
//! `(host - start) * time_scale`.

use crate::record::{SheetId, SubSequence};
use crate::sequence::Sequence;
use std::sync::atomic::{AtomicBool, Ordering};

/// Resolves sheets to their sequences
pub trait SheetRegistry: Send + Sync {
    /// The sequence of `sheet_id` in instance `instance_id`, if it exists
    fn resolve_sequence(&self, sheet_id: &SheetId, instance_id: &str) -> Option<Sequence>;
}

/// Where a sub-sequence sits on its host's timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubSequenceWindow {
    /// Host position where the child starts
    pub start: f64,
    /// Host position where the child ends
    pub end: f64,
    /// Child units per host unit
    pub time_scale: f64,
}

impl SubSequenceWindow {
    /// Window of `sub`, whose duration defaults to the child's length.
    ///
    /// Returns `None` for a non-positive or non-finite time scale.
    pub fn new(sub: &SubSequence, child_length: f64) -> Option<Self> {
        let time_scale = sub.scale();
        if !time_scale.is_finite() || time_scale <= 0.0 {
            return None;
        }
        let duration = sub.duration.unwrap_or(child_length);
        Some(Self {
            start: sub.position,
            end: sub.position + duration / time_scale,
            time_scale,
        })
    }

    /// Whether `host_position` is inside the window, bounds included
    pub fn contains(&self, host_position: f64) -> bool {
        host_position >= self.start && host_position <= self.end
    }

    /// Child position for a host position
    pub fn local_position(&self, host_position: f64) -> f64 {
        (host_position - self.start) * self.time_scale
    }

    /// When the host left the window between two updates, the child position
    /// at the edge it crossed
    pub fn exit_position(&self, previous: f64, next: f64) -> Option<f64> {
        if !self.contains(previous) || self.contains(next) {
            return None;
        }
        let edge = if next > self.end { self.end } else { self.start };
        Some(self.local_position(edge))
    }
}

/// Pushes host positions into child sequences
#[derive(Debug, Default)]
pub(crate) struct SubSequenceComposer {
    composing: AtomicBool,
}

impl SubSequenceComposer {
    pub(crate) fn is_composing(&self) -> bool {
        self.composing.load(Ordering::Acquire)
    }

    pub(crate) fn compose(
        &self,
        host: &Sequence,
        registry: &dyn SheetRegistry,
        subs: &[SubSequence],
        previous: f64,
        next: f64,
    ) {
        if self.composing.swap(true, Ordering::AcqRel) {
            tracing::warn!("Sequence {} re-entered sub-sequence composition; ignoring", host.address());
            return;
        }
        let _reset = ComposingGuard(&self.composing);

        for sub in subs {
            let Some(child) = registry.resolve_sequence(&sub.sheet_id, &host.address().instance_id)
            else {
                tracing::warn!(
                    "Sub-sequence {} references unknown sheet {:?}; skipping",
                    sub.id,
                    sub.sheet_id.0
                );
                continue;
            };
            if child.ptr_eq(host) {
                tracing::debug!("Sub-sequence {} references its own sheet; skipping", sub.id);
                continue;
            }
            if child.is_composing() {
                tracing::warn!(
                    "Sub-sequence {} would re-enter {} which is already composing; skipping",
                    sub.id,
                    child.address()
                );
                continue;
            }
            let Some(window) = SubSequenceWindow::new(sub, child.length()) else {
                tracing::warn!(
                    "Sub-sequence {} has invalid time scale {}; skipping",
                    sub.id,
                    sub.scale()
                );
                continue;
            };

            if window.contains(next) {
                child.seek_from_host(window.local_position(next));
            } else if let Some(edge) = window.exit_position(previous, next) {
                child.seek_from_host(edge);
            }
        }
    }
}

struct ComposingGuard<'a>(&'a AtomicBool);

impl Drop for ComposingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
