//! Test helpers shared across modules
//!
//! Provides scripted game states that journal their lifecycle, sinks that
//! count mixed frames without pacing, and a few canned sounds.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::audio::{
    AudioSink, DecodeError, Decoder, SampleBuffer, SinkFactory, SoundResource,
};
use crate::events::FiredEvent;
use crate::shared::Shared;
use crate::sim::Engine;
use crate::state::{GameState, Transition};

/// Ordered record of state lifecycle calls, shareable across threads.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    /// Take everything recorded so far.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// A game state that replays a fixed list of transitions from `update`.
///
/// Records `name:enter`, `name:pause`, `name:resume`, `name:exit` and every
/// event it receives; updates are not recorded.
pub struct Scripted {
    name: String,
    journal: Journal,
    script: VecDeque<Transition>,
}

impl Scripted {
    pub fn boxed(name: &str, journal: &Journal, script: Vec<Transition>) -> Box<dyn GameState> {
        Box::new(Self {
            name: name.to_string(),
            journal: journal.clone(),
            script: script.into(),
        })
    }
}

impl GameState for Scripted {
    fn name(&self) -> &str {
        &self.name
    }

    fn enter(&mut self, _engine: &mut Engine) {
        self.journal.record(format!("{}:enter", self.name));
    }

    fn update(&mut self, _engine: &mut Engine) -> Transition {
        self.script.pop_front().unwrap_or_default()
    }

    fn event(&mut self, _engine: &mut Engine, event: &FiredEvent) -> Transition {
        self.journal
            .record(format!("{}:event:{:?}", self.name, event.kind));
        Transition::None
    }

    fn pause(&mut self, _engine: &mut Engine) {
        self.journal.record(format!("{}:pause", self.name));
    }

    fn resume(&mut self, _engine: &mut Engine) {
        self.journal.record(format!("{}:resume", self.name));
    }

    fn exit(&mut self, _engine: &mut Engine) {
        self.journal.record(format!("{}:exit", self.name));
    }
}

/// Unpaced sink counting every stereo frame written.
pub struct CaptureSink {
    sample_rate: u32,
    frames: Arc<AtomicU64>,
    peak: Arc<Mutex<f32>>,
}

impl CaptureSink {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            frames: Arc::new(AtomicU64::new(0)),
            peak: Arc::new(Mutex::new(0.0)),
        }
    }

    /// Counter readable after the sink has moved into a loop
    pub fn frames(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.frames)
    }

    /// Largest absolute sample seen
    pub fn peak(&self) -> Arc<Mutex<f32>> {
        Arc::clone(&self.peak)
    }
}

impl AudioSink for CaptureSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn wait_ready(&mut self, _frames: usize) {}

    fn write(&mut self, samples: &[f32]) {
        self.frames
            .fetch_add(samples.len() as u64 / 2, Ordering::Relaxed);
        let loudest = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        let mut peak = self.peak.lock().unwrap();
        *peak = peak.max(loudest);
    }
}

/// Hand a prepared sink to the audio thread.
pub fn sink_factory(sink: impl AudioSink + Send + 'static) -> SinkFactory {
    Box::new(move || -> Result<Box<dyn AudioSink>, String> { Ok(Box::new(sink)) })
}

/// A device that can never be opened.
pub fn failing_factory(reason: &str) -> SinkFactory {
    let reason = reason.to_string();
    Box::new(move || -> Result<Box<dyn AudioSink>, String> { Err(reason) })
}

/// Share a resource the way the sound bank does.
pub fn shared_sound<R: SoundResource + 'static>(resource: R) -> Shared<dyn SoundResource> {
    Shared::new(resource).upcast(|arc| arc as Arc<dyn SoundResource>)
}

/// Constant-level mono tone lasting `seconds`.
pub fn tone(name: &str, seconds: f32, sample_rate: u32) -> Shared<dyn SoundResource> {
    let frames = (seconds * sample_rate as f32) as usize;
    shared_sound(SampleBuffer::mono(name, sample_rate, vec![0.25; frames]))
}

/// Resource whose decoder can never be constructed.
#[derive(Debug)]
pub struct BrokenSound;

impl SoundResource for BrokenSound {
    fn name(&self) -> &str {
        "broken"
    }

    fn instantiate(&self) -> Result<Box<dyn Decoder>, DecodeError> {
        Err(DecodeError::Corrupt {
            name: "broken".into(),
            reason: "truncated header".into(),
        })
    }
}
