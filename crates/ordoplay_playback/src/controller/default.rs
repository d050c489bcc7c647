// SPDX-License-Identifier: MIT OR Apache-2.0
//! Silent playback driven purely by the ticker.

use super::{completion, PlaybackCell, PlaybackController, PlaybackHandle, PlaybackState};
use crate::error::{PlaybackError, Result};
use crate::observable::Observable;
use crate::ticker::Ticker;
use crate::timing::{PlayRequest, PlaybackRange};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Controller that only moves the position; no side effects
pub struct DefaultPlaybackController {
    cell: Arc<PlaybackCell>,
    destroyed: AtomicBool,
}

impl DefaultPlaybackController {
    /// Create a paused controller at position zero
    pub fn new() -> Self {
        Self {
            cell: PlaybackCell::new(),
            destroyed: AtomicBool::new(false),
        }
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(PlaybackError::ControllerDestroyed);
        }
        Ok(())
    }
}

impl Default for DefaultPlaybackController {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackController for DefaultPlaybackController {
    fn state(&self) -> &Observable<PlaybackState> {
        self.cell.state()
    }

    fn play(&self, request: PlayRequest, ticker: &Ticker) -> Result<PlaybackHandle> {
        self.ensure_alive()?;
        self.cell.pause();
        let (done, handle) = completion();
        self.cell.launch(ticker, request, (), Some(done));
        Ok(handle)
    }

    fn resume(&self, request: PlayRequest, ticker: &Ticker) -> Result<()> {
        self.ensure_alive()?;
        let done = self.cell.hand_over();
        self.cell.launch(ticker, request, (), done);
        Ok(())
    }

    fn play_dynamic_range(
        &self,
        range: Observable<PlaybackRange>,
        ticker: &Ticker,
    ) -> Result<PlaybackHandle> {
        self.ensure_alive()?;
        self.cell.pause();
        let (done, handle) = completion();
        self.cell.launch_dynamic(ticker, range, (), Some(done));
        Ok(handle)
    }

    fn resume_dynamic_range(
        &self,
        range: Observable<PlaybackRange>,
        ticker: &Ticker,
    ) -> Result<()> {
        self.ensure_alive()?;
        let done = self.cell.hand_over();
        self.cell.launch_dynamic(ticker, range, (), done);
        Ok(())
    }

    fn pause(&self) {
        self.cell.pause();
    }

    fn goto_position(&self, position: f64) {
        self.cell.set_position(position);
    }

    fn destroy(&self) {
        self.cell.pause();
        self.destroyed.store(true, Ordering::Release);
    }
}
