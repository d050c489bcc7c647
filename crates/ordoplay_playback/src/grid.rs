// SPDX-License-Identifier: MIT OR Apache-2.0
//! Grid snapping.

/// Distance between two grid lines for `sub_units_per_unit` divisions
pub fn grid_step(sub_units_per_unit: u32) -> f64 {
    1.0 / f64::from(sub_units_per_unit.max(1))
}

/// Snap `position` to the nearest grid line, rounded to three decimals so
/// repeated snapping cannot accumulate float error.
pub fn closest_grid_position(position: f64, sub_units_per_unit: u32) -> f64 {
    let step = grid_step(sub_units_per_unit);
    let snapped = (position / step).round() * step;
    round_to_millis(snapped)
}

fn round_to_millis(value: f64) -> f64 {
    let rounded = (value * 1000.0).round() / 1000.0;
    // Avoid handing out -0.0
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}
