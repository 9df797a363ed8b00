//! Commands carried from the simulation to the audio thread

use std::fmt;

use crate::shared::Shared;

use super::source::SoundResource;

/// Identifies one logical voice.
///
/// Minted from a monotonically increasing counter on the simulation side,
/// never reused within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AudioHandle(u64);

impl AudioHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AudioHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Voice category.
///
/// Music and ambience are single-slot: a new request replaces the current
/// one. Sound effects form an open set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Sound,
    Music,
    Ambience,
}

/// Parameters for starting a voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayParams {
    /// Linear gain, 0.0..=1.0
    pub volume: f32,
    /// -1.0 (left) ..= 1.0 (right)
    pub pan: f32,
    pub looping: bool,
    /// Higher priorities may steal voices from lower ones when full
    pub priority: i32,
    /// Seconds to wait before starting
    pub delay: f32,
    /// Seconds to ramp from silence to full volume
    pub fade_in: f32,
    /// Seconds into the sound to start from (ignored if seeking is unsupported)
    pub start_at: f32,
}

impl Default for PlayParams {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pan: 0.0,
            looping: false,
            priority: 0,
            delay: 0.0,
            fade_in: 0.0,
            start_at: 0.0,
        }
    }
}

impl PlayParams {
    pub fn looping() -> Self {
        Self {
            looping: true,
            ..Self::default()
        }
    }
}

/// One entry of the command log.
#[derive(Debug, Clone)]
pub enum AudioCommand {
    /// Start a voice (after `params.delay`)
    Play {
        handle: AudioHandle,
        category: Category,
        sound: Shared<dyn SoundResource>,
        params: PlayParams,
        /// Seconds of overlap with the category's current voice
        crossfade: f32,
    },
    Stop { handle: AudioHandle, fade_out: f32 },
    Pause(AudioHandle),
    Resume(AudioHandle),
    SetVolume { handle: AudioHandle, volume: f32 },
    SetPan { handle: AudioHandle, pan: f32 },
    SetLooping { handle: AudioHandle, looping: bool },
    SetPosition { handle: AudioHandle, seconds: f32 },
    SetMasterVolume(f32),
}

impl AudioCommand {
    /// Voice the command targets, if any.
    pub fn handle(&self) -> Option<AudioHandle> {
        match self {
            AudioCommand::Play { handle, .. }
            | AudioCommand::Stop { handle, .. }
            | AudioCommand::Pause(handle)
            | AudioCommand::Resume(handle)
            | AudioCommand::SetVolume { handle, .. }
            | AudioCommand::SetPan { handle, .. }
            | AudioCommand::SetLooping { handle, .. }
            | AudioCommand::SetPosition { handle, .. } => Some(*handle),
            AudioCommand::SetMasterVolume(_) => None,
        }
    }
}
