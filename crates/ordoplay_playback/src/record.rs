// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persisted sequence data.
//!
//! The surrounding editor owns these records; the engine reads them and
//! replaces whole collections. Editing helpers take a grid snapper so every
//! position written back stays on the sequence grid.

use crate::error::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

/// Current record format version
pub const RECORD_FORMAT_VERSION: u32 = 1;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random ID
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a timeline event
    EventId
);
uuid_id!(
    /// Unique identifier for a marker
    MarkerId
);
uuid_id!(
    /// Unique identifier for a sub-sequence reference
    SubSequenceId
);

/// Identifier of a sheet within a project
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SheetId(pub String);

impl SheetId {
    /// Create a sheet ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for SheetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payload carried by an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventValue {
    /// Numeric payload
    Number(f64),
    /// Boolean payload
    Bool(bool),
    /// Text payload
    Text(String),
}

/// A named callback point on the timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceEvent {
    /// Event ID
    pub id: EventId,
    /// Name listeners subscribe to
    pub name: String,
    /// Timeline position
    pub position: f64,
    /// Optional payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<EventValue>,
}

impl SequenceEvent {
    /// Create an event without a payload
    pub fn new(name: impl Into<String>, position: f64) -> Self {
        Self {
            id: EventId::new(),
            name: name.into(),
            position,
            value: None,
        }
    }

    /// Attach a payload
    pub fn with_value(mut self, value: EventValue) -> Self {
        self.value = Some(value);
        self
    }

    /// Key used to fire this event once per crossing
    pub fn dedup_key(&self) -> String {
        format!("{}-{}", self.id, self.position)
    }
}

/// A labelled position used for navigation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    /// Marker ID
    pub id: MarkerId,
    /// Display label, matched by name lookups
    pub label: String,
    /// Timeline position
    pub position: f64,
}

impl Marker {
    /// Create a marker
    pub fn new(label: impl Into<String>, position: f64) -> Self {
        Self {
            id: MarkerId::new(),
            label: label.into(),
            position,
        }
    }
}

/// A nested reference to another sheet's sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubSequence {
    /// Sub-sequence ID
    pub id: SubSequenceId,
    /// Referenced sheet
    pub sheet_id: SheetId,
    /// Host position where the child starts
    pub position: f64,
    /// Child-local duration; defaults to the child's length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Child time units per host time unit; defaults to 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_scale: Option<f64>,
    /// Display label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl SubSequence {
    /// Reference `sheet_id` starting at host `position`
    pub fn new(sheet_id: SheetId, position: f64) -> Self {
        Self {
            id: SubSequenceId::new(),
            sheet_id,
            position,
            duration: None,
            time_scale: None,
            label: None,
        }
    }

    /// Set the child-local duration
    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Set the time scale
    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        self.time_scale = Some(time_scale);
        self
    }

    /// Set the label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Effective time scale
    pub fn scale(&self) -> f64 {
        self.time_scale.unwrap_or(1.0)
    }
}

/// The persisted state of one sheet's sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceRecord {
    /// Format version
    #[serde(default = "default_version")]
    pub version: u32,
    /// Timeline length
    #[serde(default = "default_length")]
    pub length: f64,
    /// Grid subdivisions per unit (frames per second)
    #[serde(default = "default_sub_units")]
    pub sub_units_per_unit: u32,
    /// Navigation markers
    #[serde(default)]
    pub markers: Vec<Marker>,
    /// Timeline events
    #[serde(default)]
    pub events: Vec<SequenceEvent>,
    /// Nested sequence references
    #[serde(default)]
    pub sub_sequences: Vec<SubSequence>,
    /// Animated tracks keyed by object; evaluated outside the engine
    #[serde(default)]
    pub tracks_by_object: IndexMap<String, Vec<Uuid>>,
}

fn default_version() -> u32 {
    RECORD_FORMAT_VERSION
}

fn default_length() -> f64 {
    10.0
}

fn default_sub_units() -> u32 {
    30
}

impl Default for SequenceRecord {
    fn default() -> Self {
        Self {
            version: RECORD_FORMAT_VERSION,
            length: default_length(),
            sub_units_per_unit: default_sub_units(),
            markers: Vec::new(),
            events: Vec::new(),
            sub_sequences: Vec::new(),
            tracks_by_object: IndexMap::new(),
        }
    }
}

impl SequenceRecord {
    /// Create an empty record of the given length
    pub fn with_length(length: f64) -> Self {
        Self {
            length,
            ..Self::default()
        }
    }

    /// Insert or replace an event, snapping its position
    pub fn upsert_event(&mut self, mut event: SequenceEvent, snap: impl Fn(f64) -> f64) {
        event.position = snap(event.position);
        match self.events.iter_mut().find(|e| e.id == event.id) {
            Some(existing) => *existing = event,
            None => self.events.push(event),
        }
        sort_by_position(&mut self.events, |e| e.position);
    }

    /// Remove an event
    pub fn remove_event(&mut self, id: EventId) -> Option<SequenceEvent> {
        let index = self.events.iter().position(|e| e.id == id)?;
        Some(self.events.remove(index))
    }

    /// Replace every event
    pub fn replace_events(&mut self, events: Vec<SequenceEvent>) {
        self.events = events;
    }

    /// Insert or replace a marker, snapping its position
    pub fn upsert_marker(&mut self, mut marker: Marker, snap: impl Fn(f64) -> f64) {
        marker.position = snap(marker.position);
        match self.markers.iter_mut().find(|m| m.id == marker.id) {
            Some(existing) => *existing = marker,
            None => self.markers.push(marker),
        }
        sort_by_position(&mut self.markers, |m| m.position);
    }

    /// Remove a marker
    pub fn remove_marker(&mut self, id: MarkerId) -> Option<Marker> {
        let index = self.markers.iter().position(|m| m.id == id)?;
        Some(self.markers.remove(index))
    }

    /// Replace every marker
    pub fn replace_markers(&mut self, markers: Vec<Marker>) {
        self.markers = markers;
    }

    /// Insert or replace a sub-sequence, snapping its start
    pub fn upsert_sub_sequence(&mut self, mut sub: SubSequence, snap: impl Fn(f64) -> f64) {
        sub.position = snap(sub.position);
        match self.sub_sequences.iter_mut().find(|s| s.id == sub.id) {
            Some(existing) => *existing = sub,
            None => self.sub_sequences.push(sub),
        }
        sort_by_position(&mut self.sub_sequences, |s| s.position);
    }

    /// Remove a sub-sequence
    pub fn remove_sub_sequence(&mut self, id: SubSequenceId) -> Option<SubSequence> {
        let index = self.sub_sequences.iter().position(|s| s.id == id)?;
        Some(self.sub_sequences.remove(index))
    }

    /// Replace every sub-sequence
    pub fn replace_sub_sequences(&mut self, subs: Vec<SubSequence>) {
        self.sub_sequences = subs;
    }

    /// Objects that have animated tracks
    pub fn tracked_objects(&self) -> impl Iterator<Item = &str> {
        self.tracks_by_object.keys().map(String::as_str)
    }

    /// Parse a record from RON
    pub fn from_ron(source: &str) -> Result<Self> {
        let record: SequenceRecord = ron::from_str(source)?;
        if record.version > RECORD_FORMAT_VERSION {
            tracing::warn!(
                "Sequence record version {} is newer than supported version {}",
                record.version,
                RECORD_FORMAT_VERSION
            );
        }
        Ok(record)
    }

    /// Serialize to pretty RON
    pub fn to_ron(&self) -> Result<String> {
        let config = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);
        Ok(ron::ser::to_string_pretty(self, config)?)
    }

    /// Load a record from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_ron(&content)
    }

    /// Save the record to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_ron()?)?;
        Ok(())
    }
}

fn sort_by_position<T>(items: &mut [T], position: impl Fn(&T) -> f64) {
    items.sort_by(|a, b| position(a).total_cmp(&position(b)));
}
