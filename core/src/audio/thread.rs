//! Audio mixing loop and its thread
//!
//! ```text
//! Simulation Thread             Audio Mix Thread                Device
//!     │                               │                           │
//! [flush commands]──(exchange)──►[apply / schedule]               │
//!     │                          [promote due entries]            │
//!     │                          [mix block]──────(sink)────────►[play]
//! [absorb results]◄─(exchange)───[finished + positions]           │
//! ```
//!
//! The loop never blocks on the exchange: it polls for command buffers and
//! keeps mixing whether or not the simulation has sent anything. Its
//! cadence comes from the sink, which blocks until the device wants more.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::config::RuntimeConfig;
use crate::error::{ExchangeError, PipelineError};
use crate::exchange::Endpoint;
use crate::shared::Shared;

use super::buffer::{AudioBuffer, Finished, PositionReport};
use super::command::{AudioCommand, AudioHandle, Category, PlayParams};
use super::mixer::{AudioSink, Mixer, NullSink};
use super::source::SoundResource;

/// Builds the output sink on the audio thread.
///
/// Device handles are often tied to the thread that opened them, so the
/// sink is created after the thread starts.
pub type SinkFactory = Box<dyn FnOnce() -> Result<Box<dyn AudioSink>, String> + Send>;

/// Outcome of one [`AudioLoop::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    Running,
    /// Exit acknowledged; the loop must not be stepped again
    Exited,
}

/// A play request waiting out its start delay.
struct Scheduled {
    handle: AudioHandle,
    category: Category,
    sound: Shared<dyn SoundResource>,
    params: PlayParams,
    crossfade: f32,
    remaining: f32,
    paused: bool,
}

/// Audio-thread state: schedule, mixer, and the buffers currently held.
pub struct AudioLoop {
    endpoint: Endpoint<AudioBuffer>,
    sink: Box<dyn AudioSink>,
    mixer: Mixer,
    scheduled: Vec<Scheduled>,
    music: Option<AudioHandle>,
    ambience: Option<AudioHandle>,
    held: SmallVec<[AudioBuffer; 2]>,
    finished: Vec<Finished>,
    positions: Vec<PositionReport>,
    block: Vec<f32>,
    block_frames: usize,
    iteration: u64,
}

impl AudioLoop {
    pub fn new(
        endpoint: Endpoint<AudioBuffer>,
        sink: Box<dyn AudioSink>,
        config: &RuntimeConfig,
    ) -> Self {
        let block_frames = config.audio_block_frames.max(1);
        let mixer = Mixer::new(sink.sample_rate(), config.max_voices);
        Self {
            endpoint,
            sink,
            mixer,
            scheduled: Vec::new(),
            music: None,
            ambience: None,
            held: SmallVec::new(),
            finished: Vec::new(),
            positions: Vec::new(),
            block: vec![0.0; block_frames * 2],
            block_frames,
            iteration: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.mixer.sample_rate()
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Voices registered with the mixer
    pub fn active(&self) -> usize {
        self.mixer.len()
    }

    /// Requests still counting down their delay
    pub fn scheduled(&self) -> usize {
        self.scheduled.len()
    }

    pub fn is_active(&self, handle: AudioHandle) -> bool {
        self.mixer.contains(handle)
    }

    pub fn is_scheduled(&self, handle: AudioHandle) -> bool {
        self.scheduled.iter().any(|s| s.handle == handle)
    }

    /// Run until the simulation requests exit or hangs up.
    pub fn run(&mut self) {
        debug!("Audio mixing loop started ({} Hz)", self.sample_rate());
        loop {
            match self.step() {
                Ok(LoopStatus::Running) => {}
                Ok(LoopStatus::Exited) => break,
                Err(e) => {
                    debug!("Audio mixing loop exiting: {}", e);
                    break;
                }
            }
        }
        debug!("Audio mixing loop finished after {} blocks", self.iteration);
    }

    /// One iteration: poll commands, schedule, mix one block, hand off.
    pub fn step(&mut self) -> Result<LoopStatus, ExchangeError> {
        let mut exit = false;
        while let Some(mut buffer) = self.endpoint.try_consume()? {
            for command in buffer.sim.commands.drain() {
                self.apply(command);
            }
            exit |= buffer.sim.exit;
            self.held.push(buffer);
        }
        if exit {
            return self.shutdown();
        }

        let dt = self.block_frames as f32 / self.mixer.sample_rate() as f32;
        self.promote(dt);

        self.mixer.drain_finished(&mut self.finished);
        self.positions.clear();
        self.mixer.positions(&mut self.positions);

        self.sink.wait_ready(self.block_frames);
        self.mixer.mix(&mut self.block);
        self.sink.write(&self.block);

        self.handoff(false)?;
        self.iteration += 1;
        Ok(LoopStatus::Running)
    }

    fn shutdown(&mut self) -> Result<LoopStatus, ExchangeError> {
        for entry in self.scheduled.drain(..) {
            self.finished.push(Finished {
                handle: entry.handle,
                instance: entry.sound,
            });
        }
        self.mixer.stop_all();
        self.mixer.drain_finished(&mut self.finished);
        self.positions.clear();

        debug!(
            "Audio exit acknowledged, releasing {} voices",
            self.finished.len()
        );
        self.handoff(true)?;
        Ok(LoopStatus::Exited)
    }

    /// Return every held buffer; results ride in the last one.
    fn handoff(&mut self, exit_ack: bool) -> Result<(), ExchangeError> {
        let count = self.held.len();
        for (i, mut buffer) in self.held.drain(..).enumerate() {
            let half = &mut buffer.audio;
            half.finished.clear();
            half.positions.clear();
            half.iteration = self.iteration;
            half.exit_ack = exit_ack;
            if i + 1 == count {
                half.finished.reserve_to(self.finished.len());
                for finished in self.finished.drain(..) {
                    half.finished.push(finished);
                }
                half.positions.extend_from_slice(&self.positions);
            }
            self.endpoint.produce(buffer)?;
        }
        Ok(())
    }

    fn scheduled_mut(&mut self, handle: AudioHandle) -> Option<&mut Scheduled> {
        self.scheduled.iter_mut().find(|s| s.handle == handle)
    }

    fn apply(&mut self, command: AudioCommand) {
        let target = command.handle();
        let applied = match command {
            AudioCommand::Play {
                handle,
                category,
                sound,
                params,
                crossfade,
            } => {
                if category != Category::Sound {
                    self.supersede(category);
                }
                self.scheduled.push(Scheduled {
                    handle,
                    category,
                    sound,
                    params,
                    crossfade: crossfade.max(0.0),
                    remaining: params.delay.max(0.0),
                    paused: false,
                });
                true
            }
            AudioCommand::Stop { handle, fade_out } => {
                if let Some(index) = self.scheduled.iter().position(|s| s.handle == handle) {
                    let entry = self.scheduled.remove(index);
                    self.finished.push(Finished {
                        handle,
                        instance: entry.sound,
                    });
                    true
                } else {
                    self.mixer.stop(handle, fade_out)
                }
            }
            AudioCommand::Pause(handle) => match self.scheduled_mut(handle) {
                Some(entry) => {
                    entry.paused = true;
                    true
                }
                None => self.mixer.pause(handle),
            },
            AudioCommand::Resume(handle) => match self.scheduled_mut(handle) {
                Some(entry) => {
                    entry.paused = false;
                    true
                }
                None => self.mixer.resume(handle),
            },
            AudioCommand::SetVolume { handle, volume } => match self.scheduled_mut(handle) {
                Some(entry) => {
                    entry.params.volume = volume;
                    true
                }
                None => self.mixer.set_volume(handle, volume),
            },
            AudioCommand::SetPan { handle, pan } => match self.scheduled_mut(handle) {
                Some(entry) => {
                    entry.params.pan = pan;
                    true
                }
                None => self.mixer.set_pan(handle, pan),
            },
            AudioCommand::SetLooping { handle, looping } => match self.scheduled_mut(handle) {
                Some(entry) => {
                    entry.params.looping = looping;
                    true
                }
                None => self.mixer.set_looping(handle, looping),
            },
            AudioCommand::SetPosition { handle, seconds } => match self.scheduled_mut(handle) {
                Some(entry) => {
                    entry.params.start_at = seconds;
                    true
                }
                None => self.mixer.set_position(handle, seconds),
            },
            AudioCommand::SetMasterVolume(volume) => {
                self.mixer.set_master_volume(volume);
                true
            }
        };
        if !applied {
            // Voice already ended; the simulation learns of it from the finished list
            trace!("audio command for unknown voice {:?} ignored", target);
        }
    }

    /// Drop a pending request of a single-slot category.
    fn supersede(&mut self, category: Category) {
        let mut i = 0;
        while i < self.scheduled.len() {
            if self.scheduled[i].category == category {
                let entry = self.scheduled.remove(i);
                trace!("{:?} {} superseded before starting", category, entry.handle);
                self.finished.push(Finished {
                    handle: entry.handle,
                    instance: entry.sound,
                });
            } else {
                i += 1;
            }
        }
    }

    /// Count down start delays of unpaused entries and activate due ones in
    /// request order.
    fn promote(&mut self, dt: f32) {
        let mut i = 0;
        while i < self.scheduled.len() {
            let entry = &mut self.scheduled[i];
            // Paused entries hold their remaining delay
            if entry.paused {
                i += 1;
                continue;
            }
            entry.remaining -= dt;
            if entry.remaining > 0.0 {
                i += 1;
                continue;
            }
            let entry = self.scheduled.remove(i);
            self.activate(entry);
        }
    }

    fn activate(&mut self, entry: Scheduled) {
        let decoder = match entry.sound.instantiate() {
            Ok(decoder) => decoder,
            Err(e) => {
                warn!("Failed to instantiate '{}': {}", entry.sound.name(), e);
                self.finished.push(Finished {
                    handle: entry.handle,
                    instance: entry.sound,
                });
                return;
            }
        };

        let mut params = entry.params;
        let slot = match entry.category {
            Category::Sound => None,
            Category::Music => Some(&mut self.music),
            Category::Ambience => Some(&mut self.ambience),
        };
        if let Some(slot) = slot
            && let Some(previous) = slot.replace(entry.handle)
            && self.mixer.stop(previous, entry.crossfade)
        {
            params.fade_in = params.fade_in.max(entry.crossfade);
        }

        self.mixer.add(entry.handle, entry.sound, decoder, &params);
        if entry.paused {
            self.mixer.pause(entry.handle);
        }
    }
}

/// Handle to the running audio mixing thread.
///
/// Dropping the handle joins the thread.
pub struct AudioThread {
    handle: Option<JoinHandle<()>>,
    sample_rate: u32,
}

impl AudioThread {
    /// Spawn the mixing thread and wait until its sink is open.
    ///
    /// If `make_sink` fails the loop falls back to a real-time [`NullSink`]
    /// so the pipeline keeps its cadence without a device.
    pub fn spawn(
        endpoint: Endpoint<AudioBuffer>,
        config: &RuntimeConfig,
        make_sink: SinkFactory,
    ) -> Result<Self, PipelineError> {
        let (ready_tx, ready_rx) = mpsc::sync_channel::<u32>(1);
        let config = config.clone();

        let handle = thread::Builder::new()
            .name("audio-mix".into())
            .spawn(move || {
                let sink = make_sink().unwrap_or_else(|e| {
                    warn!("Audio output unavailable ({}), mixing silently", e);
                    Box::new(NullSink::new(config.sample_rate)) as Box<dyn AudioSink>
                });
                let mut mix = AudioLoop::new(endpoint, sink, &config);
                let _ = ready_tx.send(mix.sample_rate());
                mix.run();
            })
            .map_err(|source| PipelineError::Spawn {
                name: "audio-mix",
                source,
            })?;

        match ready_rx.recv() {
            Ok(sample_rate) => {
                debug!("Audio thread ready at {} Hz", sample_rate);
                Ok(Self {
                    handle: Some(handle),
                    sample_rate,
                })
            }
            Err(_) => {
                let _ = handle.join();
                Err(PipelineError::Startup("audio-mix"))
            }
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Wait for the thread to exit after its exit acknowledgement.
    pub fn join(mut self) -> Result<(), PipelineError> {
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<(), PipelineError> {
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| PipelineError::Panicked("audio-mix"))?;
        }
        Ok(())
    }
}

impl Drop for AudioThread {
    fn drop(&mut self) {
        if self.join_inner().is_err() {
            warn!("Audio thread panicked");
        }
    }
}
