// SPDX-License-Identifier: MIT OR Apache-2.0
//! Projects: the shared clock plus one sequence per sheet instance.

use crate::composition::SheetRegistry;
use crate::observable::Observable;
use crate::record::{SequenceRecord, SheetId};
use crate::sequence::Sequence;
use crate::settings::EngineSettings;
use crate::ticker::Ticker;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// Instance used when a sheet is only instantiated once
pub const DEFAULT_INSTANCE: &str = "default";

/// Unique identifier for a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub Uuid);

impl ProjectId {
    /// Create a new random project ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

/// A sheet instance within a project
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SheetAddress {
    /// Sheet
    pub sheet_id: SheetId,
    /// Instance of the sheet
    pub instance_id: String,
}

impl SheetAddress {
    /// Address `instance_id` of `sheet_id`
    pub fn new(sheet_id: SheetId, instance_id: impl Into<String>) -> Self {
        Self {
            sheet_id,
            instance_id: instance_id.into(),
        }
    }

    /// Address the default instance of `sheet_id`
    pub fn default_instance(sheet_id: SheetId) -> Self {
        Self::new(sheet_id, DEFAULT_INSTANCE)
    }
}

impl fmt::Display for SheetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.sheet_id, self.instance_id)
    }
}

struct ProjectInner {
    id: ProjectId,
    name: String,
    ticker: Ticker,
    settings: EngineSettings,
    sheets: Mutex<IndexMap<SheetAddress, Sequence>>,
}

impl SheetRegistry for ProjectInner {
    fn resolve_sequence(&self, sheet_id: &SheetId, instance_id: &str) -> Option<Sequence> {
        let address = SheetAddress::new(sheet_id.clone(), instance_id);
        self.sheets.lock().get(&address).cloned()
    }
}

/// Owns the clock and the sequences of every sheet instance
#[derive(Clone)]
pub struct Project {
    inner: Arc<ProjectInner>,
}

impl Project {
    /// Create a project with default settings
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_settings(name, EngineSettings::default())
    }

    /// Create a project with custom settings
    pub fn with_settings(name: impl Into<String>, settings: EngineSettings) -> Self {
        Self {
            inner: Arc::new(ProjectInner {
                id: ProjectId::new(),
                name: name.into(),
                ticker: Ticker::with_settings(settings.ticker),
                settings,
                sheets: Mutex::new(IndexMap::new()),
            }),
        }
    }

    /// Project ID
    pub fn id(&self) -> ProjectId {
        self.inner.id
    }

    /// Project name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The clock every sequence of this project plays against
    pub fn ticker(&self) -> &Ticker {
        &self.inner.ticker
    }

    /// Engine settings
    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    /// The sequence of a sheet instance, created from `record` on first use.
    /// Later calls return the existing sequence and ignore `record`.
    pub fn sheet_sequence(
        &self,
        address: SheetAddress,
        record: Observable<SequenceRecord>,
    ) -> Sequence {
        let mut sheets = self.inner.sheets.lock();
        if let Some(existing) = sheets.get(&address) {
            return existing.clone();
        }

        let registry: Arc<dyn SheetRegistry> = self.inner.clone();
        let registry: Weak<dyn SheetRegistry> = Arc::downgrade(&registry);
        let sequence = Sequence::build(
            address.clone(),
            record,
            self.inner.ticker.clone(),
            self.inner.settings.clone(),
            Some(registry),
        );
        tracing::debug!("Created sequence for {address} in project {}", self.inner.name);
        sheets.insert(address, sequence.clone());
        sequence
    }

    /// The sequence of a sheet instance, if it was created
    pub fn sequence(&self, address: &SheetAddress) -> Option<Sequence> {
        self.inner.sheets.lock().get(address).cloned()
    }

    /// Addresses of every sheet instance with a sequence
    pub fn sheets(&self) -> Vec<SheetAddress> {
        self.inner.sheets.lock().keys().cloned().collect()
    }

    /// Pause and forget a sheet instance's sequence
    pub fn remove_sheet(&self, address: &SheetAddress) -> Option<Sequence> {
        let removed = self.inner.sheets.lock().shift_remove(address);
        if let Some(sequence) = &removed {
            sequence.pause();
        }
        removed
    }

    /// Advance the project clock
    pub fn tick(&self, time: f64) {
        self.inner.ticker.tick(time);
    }
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("sheets", &self.inner.sheets.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SubSequence;
    use crate::sequence::PlayConfig;

    fn address(sheet: &str) -> SheetAddress {
        SheetAddress::default_instance(SheetId::new(sheet))
    }

    fn add(project: &Project, sheet: &str, record: SequenceRecord) -> Sequence {
        project.sheet_sequence(address(sheet), Observable::new(record))
    }

    #[test]
    fn test_one_sequence_per_sheet_instance() {
        let project = Project::new("demo");
        let first = add(&project, "intro", SequenceRecord::with_length(5.0));
        let again = add(&project, "intro", SequenceRecord::with_length(99.0));
        assert!(first.ptr_eq(&again));
        assert_eq!(again.length(), 5.0);

        let other = project.sheet_sequence(
            SheetAddress::new(SheetId::new("intro"), "second"),
            Observable::new(SequenceRecord::default()),
        );
        assert!(!first.ptr_eq(&other));
        assert_eq!(project.sheets().len(), 2);
    }

    #[test]
    fn test_playing_host_drives_sub_sequence() {
        let project = Project::new("demo");
        let child = add(&project, "child", SequenceRecord::with_length(10.0));
        let mut host_record = SequenceRecord::with_length(10.0);
        host_record.sub_sequences = vec![SubSequence::new(SheetId::new("child"), 2.0)
            .with_duration(4.0)
            .with_time_scale(2.0)];
        let host = add(&project, "host", host_record);

        let _handle = host.play(PlayConfig::default()).unwrap();
        project.tick(0.0);
        project.tick(1.0);
        assert_eq!(child.position(), 0.0);
        project.tick(3.0);
        assert_eq!(child.position(), 2.0);
        assert!(!child.playing());

        // Leaving the window snaps the child to its end.
        project.tick(5.0);
        assert_eq!(child.position(), 4.0);
    }

    #[test]
    fn test_dangling_sub_sequence_is_skipped() {
        let project = Project::new("demo");
        let mut record = SequenceRecord::with_length(4.0);
        record.sub_sequences = vec![SubSequence::new(SheetId::new("nowhere"), 0.0)];
        let host = add(&project, "host", record);

        host.set_position(2.0);
        assert_eq!(host.position(), 2.0);
    }

    #[test]
    fn test_cyclic_sub_sequences_terminate() {
        let project = Project::new("demo");
        let mut a = SequenceRecord::with_length(10.0);
        a.sub_sequences = vec![SubSequence::new(SheetId::new("b"), 0.0)];
        let mut b = SequenceRecord::with_length(10.0);
        b.sub_sequences = vec![SubSequence::new(SheetId::new("a"), 0.0)];
        let a = add(&project, "a", a);
        let b = add(&project, "b", b);

        a.set_position(1.0);
        assert_eq!(a.position(), 1.0);
        assert_eq!(b.position(), 1.0);
    }

    #[test]
    fn test_remove_sheet_pauses() {
        let project = Project::new("demo");
        let sequence = add(&project, "intro", SequenceRecord::with_length(5.0));
        let _handle = sequence.play(PlayConfig::default()).unwrap();
        let removed = project.remove_sheet(&address("intro")).unwrap();
        assert!(removed.ptr_eq(&sequence));
        assert!(!sequence.playing());
        assert!(project.sequence(&address("intro")).is_none());
    }
}
