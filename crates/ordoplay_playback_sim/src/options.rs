// SPDX-License-Identifier: MIT OR Apache-2.0
//! Command line options.

use std::path::PathBuf;
use thiserror::Error;

/// Usage line printed on bad arguments
pub const USAGE: &str = "usage: ordoplay_playback_sim [RECORD.ron] [--settings FILE] \
[--fps N] [--rate R] [--loop] [--seconds S] [--marker NAME]";

/// Argument parsing errors
#[derive(Debug, Error, PartialEq)]
pub enum OptionsError {
    /// Flag requires a value
    #[error("{0} expects a value")]
    MissingValue(&'static str),

    /// Value could not be parsed
    #[error("Invalid value {value:?} for {flag}")]
    InvalidValue {
        /// Flag
        flag: &'static str,
        /// Raw value
        value: String,
    },

    /// Unrecognised flag
    #[error("Unknown option {0}")]
    Unknown(String),
}

/// Simulator options
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    /// Sequence record to play; a built-in demo when `None`
    pub record: Option<PathBuf>,
    /// Engine settings file
    pub settings: Option<PathBuf>,
    /// Ticks per second
    pub fps: f64,
    /// Playback rate
    pub rate: f64,
    /// Loop forever instead of playing once
    pub looping: bool,
    /// Stop after this many seconds of wall-clock time
    pub seconds: Option<f64>,
    /// Start from this marker
    pub marker: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            record: None,
            settings: None,
            fps: 60.0,
            rate: 1.0,
            looping: false,
            seconds: None,
            marker: None,
        }
    }
}

impl Options {
    /// Parse arguments, excluding the program name
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, OptionsError> {
        let mut options = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--settings" => {
                    options.settings = Some(PathBuf::from(value(&mut args, "--settings")?));
                }
                "--fps" => options.fps = positive(&mut args, "--fps")?,
                "--rate" => options.rate = positive(&mut args, "--rate")?,
                "--seconds" => options.seconds = Some(positive(&mut args, "--seconds")?),
                "--marker" => options.marker = Some(value(&mut args, "--marker")?),
                "--loop" => options.looping = true,
                flag if flag.starts_with("--") => return Err(OptionsError::Unknown(arg)),
                _ => options.record = Some(PathBuf::from(arg)),
            }
        }
        Ok(options)
    }
}

fn value(args: &mut impl Iterator<Item = String>, flag: &'static str) -> Result<String, OptionsError> {
    args.next().ok_or(OptionsError::MissingValue(flag))
}

fn positive(args: &mut impl Iterator<Item = String>, flag: &'static str) -> Result<f64, OptionsError> {
    let raw = value(args, flag)?;
    match raw.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() && parsed > 0.0 => Ok(parsed),
        _ => Err(OptionsError::InvalidValue { flag, value: raw }),
    }
}
