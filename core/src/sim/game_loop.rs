//! Fixed-rate simulation loop
//!
//! ```text
//! Presentation              Simulation Thread                  Audio Mix
//!     │                           │                                │
//! [input + geometry]──(frame)──►[process input]                    │
//!     │                      [fire events]                         │
//!     │                      [advance states + tweens]             │
//!     │                      [audio handoff]─────(audio, poll)────►│
//!     │◄──────(frame)────────[snapshot screen]                     │
//! ```
//!
//! Logical time advances by exactly one fixed step per tick. The loop paces
//! itself against a deadline; if it falls more than `max_delta` behind it
//! drops the backlog instead of spiralling.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::audio::{AudioBuffer, AudioThread};
use crate::config::RuntimeConfig;
use crate::error::{ExchangeError, PipelineError};
use crate::events::{EventKind, FiredEvent};
use crate::exchange::Endpoint;
use crate::frame::{FrameBuffer, PresentHalf, ProfileBar, SimHalf};
use crate::input::InputEvent;
use crate::state::{GameState, StateStack};
use crate::tween::TweenId;

use super::Engine;

/// Overlay colors for the measured phases: input/events, update, snapshot.
const PHASE_COLORS: [u32; 3] = [0x0040_c040, 0x0040_80ff, 0x00ff_c040];

/// Simulation side of the audio channel paired with the mixing thread.
///
/// The endpoint is always hung up before the thread is joined, including
/// while a panic in game logic unwinds the simulation thread; the mixing
/// loop only exits once it sees the disconnect or an exit buffer.
struct AudioLink {
    endpoint: Option<Endpoint<AudioBuffer>>,
    thread: Option<AudioThread>,
}

impl AudioLink {
    fn new(endpoint: Endpoint<AudioBuffer>, thread: AudioThread) -> Self {
        Self {
            endpoint: Some(endpoint),
            thread: Some(thread),
        }
    }

    fn endpoint(&self) -> &Endpoint<AudioBuffer> {
        match &self.endpoint {
            Some(endpoint) => endpoint,
            None => unreachable!("audio endpoint used after hang-up"),
        }
    }

    /// Join after a completed teardown; the mixing loop has already acked.
    fn join(&mut self) -> Result<(), PipelineError> {
        let result = match self.thread.take() {
            Some(thread) => thread.join(),
            None => Ok(()),
        };
        self.endpoint = None;
        result
    }
}

impl Drop for AudioLink {
    fn drop(&mut self) {
        self.endpoint = None;
        self.thread = None;
    }
}

/// Game-state stack plus engine context, driven one tick at a time.
pub struct Simulation {
    engine: Engine,
    stack: StateStack,
    config: RuntimeConfig,
    tick_duration: Duration,
    fired: Vec<FiredEvent>,
    finished_tweens: Vec<TweenId>,
    input: Vec<InputEvent>,
    held_audio: Vec<AudioBuffer>,
    /// Last measured duration of each profiled phase
    phases: [Duration; 3],
}

impl Simulation {
    /// Build the simulation and enter `initial`.
    pub fn new(config: &RuntimeConfig, mut engine: Engine, initial: Box<dyn GameState>) -> Self {
        let mut stack = StateStack::new();
        stack.push(initial, &mut engine);
        Self {
            engine,
            stack,
            config: config.clone(),
            tick_duration: config.tick_duration(),
            fired: Vec::new(),
            finished_tweens: Vec::new(),
            input: Vec::new(),
            held_audio: Vec::new(),
            phases: [Duration::ZERO; 3],
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn stack(&self) -> &StateStack {
        &self.stack
    }

    /// Advance exactly one fixed step.
    pub fn tick(&mut self, input: &[InputEvent]) {
        let start = Instant::now();
        self.engine.clear_profile();

        self.engine.input.begin_tick();
        for event in input {
            self.engine.input.apply(event);
        }

        self.engine.events.collect(&self.engine.input, &mut self.fired);
        for event in self.fired.drain(..) {
            self.stack.dispatch(&event, &mut self.engine);
        }
        let events_done = Instant::now();

        self.stack.update(&mut self.engine);

        let dt = self.engine.delta();
        self.engine.tweens.advance(dt, &mut self.finished_tweens);
        for id in self.finished_tweens.drain(..) {
            let event = FiredEvent {
                subscription: None,
                kind: EventKind::TweenFinished(id),
            };
            self.stack.dispatch(&event, &mut self.engine);
        }

        self.engine.advance_tick();

        let tick_time = start.elapsed();
        self.phases[0] = events_done - start;
        self.phases[1] = tick_time.saturating_sub(self.phases[0]);
        if self.config.profiling {
            for (phase, color) in self.phases.iter().zip(PHASE_COLORS) {
                let fraction = phase.as_secs_f32() / self.tick_duration.as_secs_f32();
                self.engine.profile_bar(fraction, color);
            }
        }
        if tick_time > self.config.cpu_budget {
            warn!(
                "Tick took {:?}, exceeds budget of {:?}",
                tick_time, self.config.cpu_budget
            );
        }
    }

    /// Write the current screen and overlay state into a frame half.
    pub fn snapshot_into(&mut self, half: &mut SimHalf) {
        let start = Instant::now();
        let screen = &self.engine.screen;
        half.width = screen.width();
        half.height = screen.height();
        half.screen.copy_from(screen.pixels());
        *half.palette = *screen.palette();
        half.splits.copy_from(screen.splits());
        half.profile.copy_from(self.engine.profile());
        half.requests = self.engine.take_requests();
        half.tick = self.engine.ticks();
        half.exit = false;
        self.phases[2] = start.elapsed();
    }

    /// Read what the presentation loop wrote during its turn.
    pub fn read_present_half(&mut self, half: &mut PresentHalf) {
        self.input.clear();
        half.input.drain_into(&mut self.input);
        self.engine.set_geometry(half.geometry);
        if half.exit_requested {
            self.engine.request_exit();
        }
    }

    /// Absorb every returned audio buffer, then send pending commands if a
    /// buffer is in hand. Never blocks; commands wait for the next tick when
    /// the audio thread still holds the whole pool.
    pub fn handoff_audio(&mut self, endpoint: &Endpoint<AudioBuffer>) -> Result<(), ExchangeError> {
        self.engine.clear_finished_sounds();
        while let Some(mut buffer) = endpoint.try_consume()? {
            self.engine.absorb_audio(&mut buffer);
            self.held_audio.push(buffer);
        }
        if let Some(mut buffer) = self.held_audio.pop() {
            self.engine.audio.flush_into(&mut buffer);
            buffer.sim.tick = self.engine.ticks();
            buffer.sim.exit = false;
            endpoint.produce(buffer)?;
        } else {
            trace!(
                "No audio buffer free at tick {}, {} commands deferred",
                self.engine.ticks(),
                self.engine.audio.pending()
            );
        }
        Ok(())
    }

    /// Run until exit, then tear down both channels and join the audio thread.
    ///
    /// Returns the number of ticks simulated.
    pub fn run(
        mut self,
        frames: Endpoint<FrameBuffer>,
        audio: Endpoint<AudioBuffer>,
        audio_thread: AudioThread,
    ) -> Result<u64, PipelineError> {
        let mut link = AudioLink::new(audio, audio_thread);
        match self.drive(&frames, link.endpoint()) {
            Ok(ticks) => {
                link.join()?;
                debug!("Simulation finished after {} ticks", ticks);
                Ok(ticks)
            }
            Err(e) => {
                warn!("Simulation stopping early: {}", e);
                self.stack.unwind(&mut self.engine);
                drop(link);
                Err(e.into())
            }
        }
    }

    fn drive(
        &mut self,
        frames: &Endpoint<FrameBuffer>,
        audio: &Endpoint<AudioBuffer>,
    ) -> Result<u64, ExchangeError> {
        debug!(
            "Simulation loop starting at {} Hz ({} state(s))",
            self.config.tick_rate,
            self.stack.len()
        );
        let mut frame = frames.consume()?;
        let mut next_tick = Instant::now();

        loop {
            self.read_present_half(&mut frame.present);
            if self.engine.exit_requested() {
                break;
            }

            let now = Instant::now();
            if now < next_tick {
                thread::sleep(next_tick - now);
            } else if now - next_tick > self.config.max_delta {
                trace!("Simulation {:?} behind, resyncing", now - next_tick);
                next_tick = now;
            }
            next_tick += self.tick_duration;

            let input = std::mem::take(&mut self.input);
            self.tick(&input);
            self.input = input;

            self.handoff_audio(audio)?;
            if self.engine.exit_requested() {
                break;
            }

            self.snapshot_into(&mut frame.sim);
            frames.produce(frame)?;
            frame = frames.consume()?;
        }

        self.teardown(frame, frames, audio)?;
        Ok(self.engine.ticks())
    }

    /// Unwind game logic, send exit buffers on both channels and wait for
    /// their acknowledgements.
    fn teardown(
        &mut self,
        mut frame: FrameBuffer,
        frames: &Endpoint<FrameBuffer>,
        audio: &Endpoint<AudioBuffer>,
    ) -> Result<(), ExchangeError> {
        debug!("Simulation exiting at tick {}", self.engine.ticks());
        self.stack.unwind(&mut self.engine);
        self.engine.tweens.stop_all();
        self.engine.events.clear();
        self.engine.audio.stop_all(0.0);

        self.snapshot_into(&mut frame.sim);
        frame.sim.exit = true;
        frames.produce(frame)?;

        let mut exit_audio = match self.held_audio.pop() {
            Some(buffer) => buffer,
            None => {
                let mut buffer = audio.consume()?;
                self.engine.absorb_audio(&mut buffer);
                buffer
            }
        };
        self.engine.audio.flush_into(&mut exit_audio);
        exit_audio.sim.exit = true;
        audio.produce(exit_audio)?;

        loop {
            let frame = frames.consume()?;
            if frame.present.exit_ack {
                break;
            }
        }
        loop {
            let mut buffer = audio.consume()?;
            self.engine.absorb_audio(&mut buffer);
            if buffer.audio.exit_ack {
                break;
            }
        }
        debug!(
            "Teardown complete, {} voices still known",
            self.engine.audio.len()
        );
        Ok(())
    }

    /// Bars the simulation published for the last tick.
    pub fn profile(&self) -> &[ProfileBar] {
        self.engine.profile()
    }
}
