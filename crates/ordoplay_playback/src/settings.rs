// SPDX-License-Identifier: MIT OR Apache-2.0
//! Engine configuration.
//!
//! Settings are plain serde structs persisted as RON. Every field has a
//! default, so partial files load fine.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current settings format version
pub const SETTINGS_FORMAT_VERSION: u32 = 1;

/// Event dispatch thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventDispatchSettings {
    /// A backwards jump starting above this fraction of the length may be a loop wrap
    pub wrap_upper_fraction: f64,
    /// ...if it lands below this fraction of the length
    pub wrap_lower_fraction: f64,
    /// Position deltas larger than this count as a manual scrub
    pub scrub_threshold: f64,
}

impl Default for EventDispatchSettings {
    fn default() -> Self {
        Self {
            wrap_upper_fraction: 0.8,
            wrap_lower_fraction: 0.2,
            scrub_threshold: 0.1,
        }
    }
}

/// Ticker recursion limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickerSettings {
    /// Log a warning once a single tick needs this many callback rounds
    pub warn_after_rounds: u32,
    /// Defer remaining callbacks to the next tick after this many rounds
    pub max_rounds: u32,
}

impl Default for TickerSettings {
    fn default() -> Self {
        Self {
            warn_after_rounds: 10,
            max_rounds: 100,
        }
    }
}

/// Audio playback limits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Finite iteration counts above this are capped for audio playback
    pub max_iterations: f64,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            max_iterations: 1000.0,
        }
    }
}

/// All engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Format version
    #[serde(default = "default_version")]
    pub version: u32,
    /// Event dispatch thresholds
    #[serde(default)]
    pub events: EventDispatchSettings,
    /// Ticker limits
    #[serde(default)]
    pub ticker: TickerSettings,
    /// Audio limits
    #[serde(default)]
    pub audio: AudioSettings,
}

fn default_version() -> u32 {
    SETTINGS_FORMAT_VERSION
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_FORMAT_VERSION,
            events: EventDispatchSettings::default(),
            ticker: TickerSettings::default(),
            audio: AudioSettings::default(),
        }
    }
}

impl EngineSettings {
    /// Parse settings from a RON string
    pub fn from_ron(source: &str) -> Result<Self> {
        let settings: EngineSettings = ron::from_str(source)?;
        if settings.version > SETTINGS_FORMAT_VERSION {
            tracing::warn!(
                "Engine settings version {} is newer than supported version {}",
                settings.version,
                SETTINGS_FORMAT_VERSION
            );
        }
        Ok(settings)
    }

    /// Serialize settings to pretty RON
    pub fn to_ron(&self) -> Result<String> {
        let config = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);
        Ok(ron::ser::to_string_pretty(self, config)?)
    }

    /// Load settings from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_ron(&content)
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_ron()?)?;
        Ok(())
    }
}
