// SPDX-License-Identifier: MIT OR Apache-2.0
//! Marker lookup by name.

use crate::record::Marker;

/// Find a marker by name. Tries an exact label match first, then a
/// case-insensitive match, then the first label containing `name`.
pub fn find_marker<'a>(markers: &'a [Marker], name: &str) -> Option<&'a Marker> {
    if let Some(exact) = markers.iter().find(|m| m.label == name) {
        return Some(exact);
    }

    let lowered = name.to_lowercase();
    if let Some(folded) = markers.iter().find(|m| m.label.to_lowercase() == lowered) {
        return Some(folded);
    }

    markers.iter().find(|m| m.label.contains(name))
}

/// Position of the marker [`find_marker`] resolves
pub fn marker_position(markers: &[Marker], name: &str) -> Option<f64> {
    find_marker(markers, name).map(|m| m.position)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers() -> Vec<Marker> {
        vec![
            Marker::new("Start", 1.0),
            Marker::new("start2", 2.0),
            Marker::new("Intro start", 3.0),
        ]
    }

    #[test]
    fn test_exact_match_wins() {
        assert_eq!(marker_position(&markers(), "start2"), Some(2.0));
        assert_eq!(marker_position(&markers(), "Start"), Some(1.0));
    }

    #[test]
    fn test_case_insensitive_before_substring() {
        // "start2" contains "start", but "Start" matches ignoring case first.
        assert_eq!(marker_position(&markers(), "start"), Some(1.0));
        assert_eq!(marker_position(&markers(), "INTRO START"), Some(3.0));
    }

    #[test]
    fn test_substring_fallback() {
        assert_eq!(marker_position(&markers(), "tro"), Some(3.0));
        assert_eq!(marker_position(&markers(), "t2"), Some(2.0));
    }

    #[test]
    fn test_missing_marker() {
        assert_eq!(marker_position(&markers(), "outro"), None);
        assert_eq!(marker_position(&[], "Start"), None);
    }
}
