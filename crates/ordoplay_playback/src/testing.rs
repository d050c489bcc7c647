// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory audio backend for tests.

use crate::audio::{AudioBuffer, AudioBufferId, AudioContext, AudioSourceNode};
use crate::error::AudioGraphError;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// A recorded `start()` call
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StartRecord {
    pub buffer: AudioBufferId,
    pub when: f64,
    pub offset: f64,
    pub duration: f64,
    pub gain: f32,
    pub rate: f64,
}

#[derive(Default)]
struct NodeState {
    running: bool,
    connected: bool,
}

#[derive(Default)]
struct FakeState {
    time: f64,
    failing: HashSet<AudioBufferId>,
    starts: Vec<StartRecord>,
    nodes: Vec<Arc<Mutex<NodeState>>>,
    stops: usize,
}

/// Records what the engine asks of the audio graph
#[derive(Clone, Default)]
pub(crate) struct FakeAudioContext {
    state: Arc<Mutex<FakeState>>,
}

impl FakeAudioContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_time(&self, time: f64) {
        self.state.lock().time = time;
    }

    /// Make every start of this buffer fail
    pub(crate) fn fail_buffer(&self, id: AudioBufferId) {
        self.state.lock().failing.insert(id);
    }

    pub(crate) fn starts(&self) -> Vec<StartRecord> {
        self.state.lock().starts.clone()
    }

    /// Sources that are started and still connected
    pub(crate) fn active_count(&self) -> usize {
        self.state
            .lock()
            .nodes
            .iter()
            .filter(|n| {
                let n = n.lock();
                n.running && n.connected
            })
            .count()
    }

    /// Successful stop() calls
    pub(crate) fn stop_count(&self) -> usize {
        self.state.lock().stops
    }

    /// Simulate sources ending on their own, so a later stop() fails
    pub(crate) fn stop_all_externally(&self) {
        for node in &self.state.lock().nodes {
            node.lock().running = false;
        }
    }
}

impl AudioContext for FakeAudioContext {
    fn current_time(&self) -> f64 {
        self.state.lock().time
    }

    fn create_buffer_source(
        &self,
        buffer: &AudioBuffer,
    ) -> Result<Box<dyn AudioSourceNode>, AudioGraphError> {
        let node = Arc::new(Mutex::new(NodeState::default()));
        self.state.lock().nodes.push(Arc::clone(&node));
        Ok(Box::new(FakeSource {
            context: Arc::clone(&self.state),
            buffer: buffer.id,
            node,
            gain: 1.0,
            rate: 1.0,
        }))
    }
}

struct FakeSource {
    context: Arc<Mutex<FakeState>>,
    buffer: AudioBufferId,
    node: Arc<Mutex<NodeState>>,
    gain: f32,
    rate: f64,
}

impl AudioSourceNode for FakeSource {
    fn connect(&mut self, gain: f32) -> Result<(), AudioGraphError> {
        self.gain = gain;
        self.node.lock().connected = true;
        Ok(())
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.rate = rate;
    }

    fn start(&mut self, when: f64, offset: f64, duration: f64) -> Result<(), AudioGraphError> {
        let mut context = self.context.lock();
        if context.failing.contains(&self.buffer) {
            return Err(AudioGraphError::Start("buffer marked as failing".into()));
        }
        context.starts.push(StartRecord {
            buffer: self.buffer,
            when,
            offset,
            duration,
            gain: self.gain,
            rate: self.rate,
        });
        self.node.lock().running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioGraphError> {
        let mut node = self.node.lock();
        if !node.running {
            return Err(AudioGraphError::NotRunning);
        }
        node.running = false;
        drop(node);
        self.context.lock().stops += 1;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.node.lock().connected = false;
    }
}
