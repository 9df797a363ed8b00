//! Retroframe Core - three-thread frame pipeline
//!
//! This crate provides the runtime backbone for retro-style interactive
//! applications: a fixed-rate simulation thread, a presentation/input thread
//! and an audio mixing thread, each running its own loop and exchanging
//! ownership of a small pool of buffers every cycle.
//!
//! # Architecture
//!
//! - [`HandleTable`] - generation-counted indirection from stable tokens to slots
//! - [`Shared`] - reference-counted ownership with pluggable destroy hooks
//! - [`exchange`] - double-buffer exchange over two bounded queues
//! - [`Simulation`] - fixed 60 Hz tick driving the game-state stack
//! - [`PresentationLoop`] - non-blocking frame poll, composite, present
//! - [`AudioLoop`] - scheduled/active/finished voice lifecycle and mixing
//! - [`Pipeline`] - wires the three loops together and owns teardown

pub mod alloc;
pub mod audio;
pub mod config;
pub mod display;
pub mod error;
pub mod events;
pub mod exchange;
pub mod frame;
pub mod growable;
pub mod handle;
pub mod input;
pub mod pipeline;
pub mod present;
pub mod resources;
pub mod screen;
pub mod shared;
pub mod sim;
pub mod state;
#[cfg(test)]
pub mod test_utils;
pub mod tween;
pub mod viewport;

pub use alloc::{AllocContext, AllocStats};
pub use audio::{
    AudioApi, AudioBuffer, AudioHandle, AudioLoop, AudioSink, AudioThread, Category, DecodeError,
    Decoder, NullSink, PlayParams, SampleBuffer, SinkFactory, SoundResource, SquareWave,
};
pub use config::RuntimeConfig;
pub use display::{DisplayInfo, WindowGeometry};
pub use error::{ExchangeError, PipelineError};
pub use events::{Binding, EventBus, EventKind, FiredEvent, Subscription, Trigger};
pub use exchange::{Endpoint, PoolGauge, exchange};
pub use frame::{CursorImage, FrameBuffer, MousePointer, PaletteSplit, ProfileBar, WindowRequests};
pub use growable::GrowBuffer;
pub use handle::{HandleId, HandleTable, Token};
pub use input::{GamepadAxis, GamepadButton, InputEvent, InputState, Key, MouseButton};
pub use pipeline::Pipeline;
pub use present::{
    Compositor, HeadlessPlatform, Image, Platform, PlatformStatus, PresentStats, PresentStatus,
    PresentationLoop,
};
pub use resources::{SoundBank, SoundId};
pub use screen::Screen;
pub use shared::{CounterPool, Shared};
pub use sim::{Engine, Simulation};
pub use state::{GameState, StateStack, Transition};
pub use tween::{Easing, TweenId, Tweens};
pub use viewport::{ScaleMode, Viewport};
