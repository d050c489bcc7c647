// SPDX-License-Identifier: MIT OR Apache-2.0
//! Playback timing: ranges, directions and the elapsed-time traversal.
//!
//! Position is always derived from the absolute time elapsed since play
//! started, never accumulated tick by tick, so rounding errors cannot
//! compound over a long playback.

use serde::{Deserialize, Serialize};

/// A `[start, end]` interval on the timeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackRange {
    /// Range start
    pub start: f64,
    /// Range end, greater than `start`
    pub end: f64,
}

impl PlaybackRange {
    /// Create a range
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Length of one traversal
    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    /// Whether `position` lies within the range, bounds included
    pub fn contains(&self, position: f64) -> bool {
        position >= self.start && position <= self.end
    }
}

/// Direction in which iterations traverse the range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlaybackDirection {
    /// Every iteration runs start to end
    #[default]
    Normal,
    /// Every iteration runs end to start
    Reverse,
    /// Even iterations run forward, odd ones backward
    Alternate,
    /// Even iterations run backward, odd ones forward
    AlternateReverse,
}

impl PlaybackDirection {
    /// Whether the first iteration runs from the end of the range
    pub fn starts_reversed(&self) -> bool {
        matches!(self, Self::Reverse | Self::AlternateReverse)
    }

    /// Whether iteration `index` runs backward
    pub fn is_reversed_at(&self, index: u64) -> bool {
        let even = index % 2 == 0;
        match self {
            Self::Normal => false,
            Self::Reverse => true,
            Self::Alternate => !even,
            Self::AlternateReverse => even,
        }
    }
}

/// Arguments of a single `play()` call, already validated
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayRequest {
    /// Positive integer, or infinity
    pub iteration_count: f64,
    /// Range to traverse
    pub range: PlaybackRange,
    /// Timeline units per second, positive
    pub rate: f64,
    /// Traversal direction
    pub direction: PlaybackDirection,
}

impl PlayRequest {
    /// Loop forever over `range` at normal speed
    pub fn looping(range: PlaybackRange) -> Self {
        Self {
            iteration_count: f64::INFINITY,
            range,
            rate: 1.0,
            direction: PlaybackDirection::Normal,
        }
    }
}

/// Where playback should begin given the current position.
///
/// Positions outside the range jump to the edge the first iteration starts
/// from; a position sitting on the edge the first iteration ends at wraps to
/// the other edge.
pub fn start_position(current: f64, range: PlaybackRange, direction: PlaybackDirection) -> f64 {
    let reversed = direction.starts_reversed();
    if !range.contains(current) {
        if reversed { range.end } else { range.start }
    } else if !reversed && current == range.end {
        range.start
    } else if reversed && current == range.start {
        range.end
    } else {
        current
    }
}

/// One sample of a traversal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraversalSample {
    /// Timeline position
    pub position: f64,
    /// Distance travelled since the start of the first iteration
    pub elapsed_position: f64,
    /// Zero-based iteration index
    pub iteration: u64,
    /// Whether all iterations are complete
    pub finished: bool,
}

/// Maps ticker time to timeline position for one `play()` call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Traversal {
    request: PlayRequest,
    initial_ticker_time: f64,
    initial_elapsed_position: f64,
}

impl Traversal {
    /// Start traversing from `start` (see [`start_position`]) at `ticker_time`
    pub fn begin(request: PlayRequest, ticker_time: f64, start: f64) -> Self {
        let initial_elapsed_position = if request.direction.starts_reversed() {
            request.range.end - start
        } else {
            start - request.range.start
        };
        Self {
            request,
            initial_ticker_time: ticker_time,
            initial_elapsed_position,
        }
    }

    /// The request being played
    pub fn request(&self) -> &PlayRequest {
        &self.request
    }

    /// Length of one iteration
    pub fn iteration_length(&self) -> f64 {
        self.request.range.length()
    }

    /// Total distance to travel across all iterations
    pub fn total_length(&self) -> f64 {
        self.iteration_length() * self.request.iteration_count
    }

    /// Distance travelled at `ticker_time`, capped at the total length
    pub fn elapsed_at(&self, ticker_time: f64) -> f64 {
        let elapsed = (ticker_time - self.initial_ticker_time).max(0.0);
        (elapsed * self.request.rate + self.initial_elapsed_position).min(self.total_length())
    }

    /// Iteration index for a travelled distance
    pub fn iteration_of(&self, elapsed_position: f64) -> u64 {
        (elapsed_position / self.iteration_length()).floor() as u64
    }

    /// Sample the traversal at `ticker_time`
    pub fn sample(&self, ticker_time: f64) -> TraversalSample {
        let elapsed_position = self.elapsed_at(ticker_time);
        if elapsed_position == self.total_length() {
            return TraversalSample {
                position: self.terminal_position(),
                elapsed_position,
                iteration: (self.request.iteration_count - 1.0) as u64,
                finished: true,
            };
        }

        let length = self.iteration_length();
        let iteration = self.iteration_of(elapsed_position);
        let mut within = ((elapsed_position / length) % 1.0) * length;
        if self.request.direction.is_reversed_at(iteration) {
            within = length - within;
        }
        TraversalSample {
            position: self.request.range.start + within,
            elapsed_position,
            iteration,
            finished: false,
        }
    }

    /// Position playback settles on once every iteration has run
    pub fn terminal_position(&self) -> f64 {
        let last = (self.request.iteration_count - 1.0) as u64;
        let range = self.request.range;
        if self.request.direction.is_reversed_at(last) {
            range.start
        } else {
            range.end
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(iterations: f64, direction: PlaybackDirection) -> PlayRequest {
        PlayRequest {
            iteration_count: iterations,
            range: PlaybackRange::new(0.0, 2.0),
            rate: 1.0,
            direction,
        }
    }

    #[test]
    fn test_normal_traversal_positions() {
        let traversal = Traversal::begin(request(1.0, PlaybackDirection::Normal), 10.0, 0.0);
        assert_eq!(traversal.sample(10.0).position, 0.0);
        assert_eq!(traversal.sample(11.5).position, 1.5);
        let end = traversal.sample(12.5);
        assert!(end.finished);
        assert_eq!(end.position, 2.0);
    }

    #[test]
    fn test_time_before_start_is_clamped() {
        let traversal = Traversal::begin(request(1.0, PlaybackDirection::Normal), 10.0, 0.5);
        assert_eq!(traversal.sample(9.0).position, 0.5);
    }

    #[test]
    fn test_reverse_runs_from_end() {
        let traversal = Traversal::begin(request(1.0, PlaybackDirection::Reverse), 0.0, 2.0);
        assert_eq!(traversal.sample(0.5).position, 1.5);
        let end = traversal.sample(3.0);
        assert!(end.finished);
        assert_eq!(end.position, 0.0);
    }

    #[test]
    fn test_alternate_is_continuous_across_iterations() {
        let traversal = Traversal::begin(request(3.0, PlaybackDirection::Alternate), 0.0, 0.0);
        assert_eq!(traversal.sample(1.0).position, 1.0);
        // Crossing into iteration 1 (reversed) stays at the end edge.
        assert_eq!(traversal.sample(2.0).position, 2.0);
        assert_eq!(traversal.sample(2.5).position, 1.5);
        assert_eq!(traversal.sample(4.0).position, 0.0);
        assert_eq!(traversal.sample(5.0).position, 1.0);
        // Three iterations: the last one is even, so it ends at the range end.
        assert_eq!(traversal.terminal_position(), 2.0);
        assert_eq!(traversal.sample(7.0).position, 2.0);
    }

    #[test]
    fn test_alternate_reverse_terminal_bound() {
        let traversal =
            Traversal::begin(request(2.0, PlaybackDirection::AlternateReverse), 0.0, 2.0);
        assert_eq!(traversal.sample(0.5).position, 1.5);
        assert_eq!(traversal.sample(2.5).position, 0.5);
        assert_eq!(traversal.terminal_position(), 2.0);
    }

    #[test]
    fn test_rate_scales_elapsed_time() {
        let mut req = request(1.0, PlaybackDirection::Normal);
        req.rate = 2.0;
        let traversal = Traversal::begin(req, 0.0, 0.0);
        assert_eq!(traversal.sample(0.5).position, 1.0);
        assert!(traversal.sample(1.0).finished);
    }

    #[test]
    fn test_infinite_iterations_never_finish() {
        let traversal = Traversal::begin(request(f64::INFINITY, PlaybackDirection::Normal), 0.0, 0.0);
        let sample = traversal.sample(1001.0);
        assert!(!sample.finished);
        assert_eq!(sample.iteration, 500);
        assert!((sample.position - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_start_position_rules() {
        let range = PlaybackRange::new(1.0, 3.0);
        assert_eq!(start_position(5.0, range, PlaybackDirection::Normal), 1.0);
        assert_eq!(start_position(5.0, range, PlaybackDirection::Reverse), 3.0);
        assert_eq!(start_position(3.0, range, PlaybackDirection::Alternate), 1.0);
        assert_eq!(start_position(1.0, range, PlaybackDirection::AlternateReverse), 3.0);
        assert_eq!(start_position(2.0, range, PlaybackDirection::Normal), 2.0);
    }

    #[test]
    fn test_resume_mid_range_keeps_offset() {
        let traversal = Traversal::begin(request(1.0, PlaybackDirection::Reverse), 0.0, 1.5);
        assert_eq!(traversal.sample(0.0).position, 1.5);
        assert_eq!(traversal.sample(1.0).position, 0.5);
    }
}
