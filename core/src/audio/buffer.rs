//! Audio buffer carried over the audio channel

use crate::alloc::AllocContext;
use crate::growable::GrowBuffer;
use crate::shared::Shared;

use super::command::{AudioCommand, AudioHandle};
use super::source::SoundResource;

/// A voice that will never produce sound again.
///
/// Carries the audio thread's reference to the resource back upstream, so
/// the last copy is released on the simulation thread.
#[derive(Debug, Clone)]
pub struct Finished {
    pub handle: AudioHandle,
    pub instance: Shared<dyn SoundResource>,
}

/// Playback offset of an active voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionReport {
    pub handle: AudioHandle,
    pub seconds: f32,
}

/// Simulation-written half.
#[derive(Debug, Clone)]
pub struct AudioSimHalf {
    pub commands: GrowBuffer<AudioCommand>,
    pub tick: u64,
    pub exit: bool,
}

/// Audio-written half.
#[derive(Debug, Clone)]
pub struct AudioMixHalf {
    pub finished: GrowBuffer<Finished>,
    pub positions: GrowBuffer<PositionReport>,
    pub iteration: u64,
    /// Set on the buffer that acknowledges the simulation's exit buffer
    pub exit_ack: bool,
}

/// Unit of the audio channel.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    pub sim: AudioSimHalf,
    pub audio: AudioMixHalf,
}

impl AudioBuffer {
    pub fn new(ctx: &AllocContext) -> Self {
        Self {
            sim: AudioSimHalf {
                commands: GrowBuffer::new("audio.commands", ctx),
                tick: 0,
                exit: false,
            },
            audio: AudioMixHalf {
                finished: GrowBuffer::new("audio.finished", ctx),
                positions: GrowBuffer::new("audio.positions", ctx),
                iteration: 0,
                exit_ack: false,
            },
        }
    }

    pub fn pool(size: usize, ctx: &AllocContext) -> Vec<Self> {
        (0..size).map(|_| Self::new(ctx)).collect()
    }
}
