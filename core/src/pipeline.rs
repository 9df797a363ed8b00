//! Pipeline startup, presentation driving and teardown
//!
//! The caller's thread runs the presentation loop (windowing systems want
//! the main thread). `start` spawns the simulation thread, which in turn
//! spawns and later joins the audio thread, so teardown always flows
//! presentation ack → simulation → audio ack.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::audio::{AudioBuffer, AudioThread, SinkFactory};
use crate::config::RuntimeConfig;
use crate::display::DisplayInfo;
use crate::error::{ExchangeError, PipelineError};
use crate::exchange::exchange;
use crate::frame::FrameBuffer;
use crate::present::{Platform, PresentStats, PresentStatus, PresentationLoop};
use crate::sim::{Engine, Simulation};
use crate::state::GameState;

type SimResult = Result<u64, PipelineError>;

/// Running pipeline as seen from the presentation thread.
pub struct Pipeline {
    present: Option<PresentationLoop>,
    simulation: Option<JoinHandle<SimResult>>,
    sample_rate: u32,
}

impl Pipeline {
    /// Spawn the simulation (and through it the audio) thread.
    ///
    /// `initial` runs on the simulation thread and builds the first game
    /// state; game states never leave that thread.
    pub fn start<F>(
        config: RuntimeConfig,
        displays: Vec<DisplayInfo>,
        initial: F,
        sink: SinkFactory,
    ) -> Result<Self, PipelineError>
    where
        F: FnOnce(&mut Engine) -> Box<dyn GameState> + Send + 'static,
    {
        let frame_pool = FrameBuffer::pool(config.frame_pool, &config.alloc);
        let (sim_frames, present_frames) = exchange("frame", frame_pool, config.frame_pool);
        let audio_pool = AudioBuffer::pool(config.audio_pool, &config.alloc);
        let (sim_audio, mix_audio) = exchange("audio", audio_pool, config.audio_pool_upstream);

        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<u32, PipelineError>>(1);
        let sim_config = config.clone();
        let handle = thread::Builder::new()
            .name("simulation".into())
            .spawn(move || -> SimResult {
                // Game code runs before the mixing thread exists, so a panic
                // here only drops channel ends
                let mut engine = Engine::new(&sim_config, displays);
                let state = initial(&mut engine);
                let simulation = Simulation::new(&sim_config, engine, state);
                let audio_thread = match AudioThread::spawn(mix_audio, &sim_config, sink) {
                    Ok(thread) => thread,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return Err(PipelineError::Startup("simulation"));
                    }
                };
                let _ = ready_tx.send(Ok(audio_thread.sample_rate()));
                simulation.run(sim_frames, sim_audio, audio_thread)
            })
            .map_err(|source| PipelineError::Spawn {
                name: "simulation",
                source,
            })?;

        let sample_rate = match ready_rx.recv() {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                return Err(match handle.join() {
                    Err(_) => PipelineError::Panicked("simulation"),
                    Ok(Err(e)) => e,
                    Ok(Ok(_)) => PipelineError::Startup("simulation"),
                });
            }
        };

        info!(
            "Pipeline started: {}x{} at {} Hz, audio {} Hz",
            config.screen_width, config.screen_height, config.tick_rate, sample_rate
        );
        Ok(Self {
            present: Some(PresentationLoop::new(present_frames, &config)),
            simulation: Some(handle),
            sample_rate,
        })
    }

    /// Rate the audio output actually runs at.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn stats(&self) -> PresentStats {
        self.present
            .as_ref()
            .map(PresentationLoop::stats)
            .unwrap_or_default()
    }

    pub fn is_finished(&self) -> bool {
        self.present.as_ref().is_none_or(PresentationLoop::is_finished)
    }

    pub fn presentation(&self) -> Option<&PresentationLoop> {
        self.present.as_ref()
    }

    /// One presentation iteration. After `Finished`, call [`Pipeline::join`].
    pub fn iterate(&mut self, platform: &mut dyn Platform) -> Result<PresentStatus, PipelineError> {
        let Some(present) = self.present.as_mut() else {
            return Ok(PresentStatus::Finished);
        };
        match present.iterate(platform) {
            Ok(status) => Ok(status),
            Err(ExchangeError::Disconnected { channel }) => {
                warn!("Simulation hung up the {} channel", channel);
                // Surface the simulation's own error if it has one
                self.present = None;
                match self.join_simulation() {
                    Err(e) => Err(e),
                    Ok(_) => Err(ExchangeError::Disconnected { channel }.into()),
                }
            }
        }
    }

    /// Present until the simulation exits, then join it.
    pub fn run(mut self, platform: &mut dyn Platform) -> Result<u64, PipelineError> {
        while self.iterate(platform)? != PresentStatus::Finished {}
        self.join()
    }

    /// Join the simulation thread, returning the number of ticks it ran.
    pub fn join(mut self) -> Result<u64, PipelineError> {
        self.present = None;
        self.join_simulation()
    }

    fn join_simulation(&mut self) -> SimResult {
        let Some(handle) = self.simulation.take() else {
            return Ok(0);
        };
        let ticks = handle
            .join()
            .map_err(|_| PipelineError::Panicked("simulation"))??;
        debug!("Simulation thread joined after {} ticks", ticks);
        Ok(ticks)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        // Hanging up the frame channel makes the simulation bail out
        self.present = None;
        if let Err(e) = self.join_simulation() {
            warn!("Simulation ended with error: {}", e);
        }
    }
}
