//! Audio command channel and mixing loop
//!
//! Architecture:
//! - Game logic issues commands through [`AudioApi`] on the simulation thread
//! - Commands travel to the audio thread inside [`AudioBuffer`]s over a
//!   double-buffer exchange
//! - The [`AudioLoop`] schedules delayed starts, drives the [`Mixer`] and
//!   writes mixed blocks to an [`AudioSink`]
//! - Finished voices and playback positions travel back in the same buffers
//!
//! Decoders never leave the audio thread. The simulation only ever holds an
//! [`AudioHandle`] and the shared resource the voice was created from.

mod api;
mod buffer;
mod command;
mod mixer;
mod source;
mod thread;


pub use api::{AudioApi, Instance};
pub use buffer::{AudioBuffer, AudioMixHalf, AudioSimHalf, Finished, PositionReport};
pub use command::{AudioCommand, AudioHandle, Category, PlayParams};
pub use mixer::{AudioSink, Mixer, NullSink, pan_gains, soft_clip};
pub use source::{DecodeError, Decoder, SampleBuffer, SoundResource, SquareWave};
pub use thread::{AudioLoop, AudioThread, LoopStatus, SinkFactory};
