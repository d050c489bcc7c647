// SPDX-License-Identifier: MIT OR Apache-2.0
//! Human-readable timeline positions.
//!
//! Positions are seconds; sub-units are frames at `sub_units_per_unit`
//! frames per second.

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 60 * SECONDS_PER_MINUTE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Clock {
    hours: u64,
    minutes: u64,
    seconds: u64,
    frames: u64,
}

/// Formats positions for grid labels and the playhead
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionFormatter {
    sub_units_per_unit: u32,
}

impl PositionFormatter {
    /// Formatter for `sub_units_per_unit` frames per second
    pub fn new(sub_units_per_unit: u32) -> Self {
        Self {
            sub_units_per_unit: sub_units_per_unit.max(1),
        }
    }

    /// Frame label for a sub-unit grid line, e.g. `12f`
    pub fn format_sub_unit_for_grid(&self, position: f64) -> String {
        format!("{}f", self.split(position).frames)
    }

    /// Label for a whole-unit grid line, e.g. `1m5s`. Zero fields are omitted.
    pub fn format_full_unit_for_grid(&self, position: f64) -> String {
        let clock = self.split(position);
        let mut label = String::new();
        if clock.hours > 0 {
            label.push_str(&format!("{}h", clock.hours));
        }
        if clock.minutes > 0 {
            label.push_str(&format!("{}m", clock.minutes));
        }
        if clock.seconds > 0 || label.is_empty() {
            label.push_str(&format!("{}s", clock.seconds));
        }
        label
    }

    /// Playhead readout, e.g. `01m05s12f`. Hours and minutes only appear
    /// once the position reaches them.
    pub fn format_for_playhead(&self, position: f64) -> String {
        let clock = self.split(position);
        self.padded(clock, clock.hours > 0, clock.hours > 0 || clock.minutes > 0)
    }

    /// Playhead readout with a fixed layout for a sequence of `length`:
    /// hour and minute fields are shown iff the length reaches them.
    pub fn format_based_on_length(&self, position: f64, length: f64) -> String {
        let clock = self.split(position);
        let total = length.max(0.0) as u64;
        self.padded(clock, total >= SECONDS_PER_HOUR, total >= SECONDS_PER_MINUTE)
    }

    fn padded(&self, clock: Clock, hours: bool, minutes: bool) -> String {
        let mut label = String::new();
        if hours {
            label.push_str(&format!("{:02}h", clock.hours));
        }
        if minutes || hours {
            label.push_str(&format!("{:02}m", clock.minutes));
        }
        label.push_str(&format!(
            "{:02}s{:0width$}f",
            clock.seconds,
            clock.frames,
            width = self.frame_digits()
        ));
        label
    }

    fn frame_digits(&self) -> usize {
        let largest = self.sub_units_per_unit.saturating_sub(1);
        largest.to_string().len().max(2)
    }

    fn split(&self, position: f64) -> Clock {
        let fps = u64::from(self.sub_units_per_unit);
        let total_frames = (position.max(0.0) * fps as f64).round() as u64;
        let total_seconds = total_frames / fps;
        Clock {
            hours: total_seconds / SECONDS_PER_HOUR,
            minutes: (total_seconds % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE,
            seconds: total_seconds % SECONDS_PER_MINUTE,
            frames: total_frames % fps,
        }
    }
}
