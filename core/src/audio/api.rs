//! Simulation-side audio interface
//!
//! Game logic never touches a decoder. It asks [`AudioApi`] to play, stop or
//! tweak a voice; the request is queued as an [`AudioCommand`] and shipped
//! to the audio thread on the next handoff. The API keeps its own view of
//! every voice (volume, pan, last reported position) which becomes
//! authoritative again once the audio thread reports the voice finished.

use hashbrown::HashMap;
use tracing::trace;

use crate::shared::Shared;

use super::buffer::AudioBuffer;
use super::command::{AudioCommand, AudioHandle, Category, PlayParams};
use super::source::SoundResource;

/// Simulation-side metadata for one voice.
#[derive(Debug, Clone)]
pub struct Instance {
    pub category: Category,
    pub resource: Shared<dyn SoundResource>,
    pub volume: f32,
    pub pan: f32,
    pub looping: bool,
    pub paused: bool,
    /// Seconds, as last reported by the audio thread
    pub position: f32,
}

/// Command issuer and voice bookkeeping.
#[derive(Debug)]
pub struct AudioApi {
    next_handle: u64,
    pending: Vec<AudioCommand>,
    instances: HashMap<AudioHandle, Instance>,
    music: Option<AudioHandle>,
    ambience: Option<AudioHandle>,
    master_volume: f32,
}

impl Default for AudioApi {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioApi {
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            pending: Vec::new(),
            instances: HashMap::new(),
            music: None,
            ambience: None,
            master_volume: 1.0,
        }
    }

    fn mint(&mut self) -> AudioHandle {
        let handle = AudioHandle::from_raw(self.next_handle);
        self.next_handle += 1;
        handle
    }

    fn play(
        &mut self,
        category: Category,
        sound: Shared<dyn SoundResource>,
        params: PlayParams,
        crossfade: f32,
    ) -> AudioHandle {
        let handle = self.mint();
        trace!("play {:?} '{}' as {}", category, sound.name(), handle);
        self.instances.insert(
            handle,
            Instance {
                category,
                resource: sound.clone(),
                volume: params.volume,
                pan: params.pan,
                looping: params.looping,
                paused: false,
                position: params.start_at.max(0.0),
            },
        );
        self.pending.push(AudioCommand::Play {
            handle,
            category,
            sound,
            params,
            crossfade,
        });
        handle
    }

    /// Start a one-shot sound effect.
    pub fn play_sound(
        &mut self,
        sound: Shared<dyn SoundResource>,
        params: PlayParams,
    ) -> AudioHandle {
        self.play(Category::Sound, sound, params, 0.0)
    }

    /// Replace the current music, overlapping the two for `crossfade` seconds.
    pub fn play_music(
        &mut self,
        sound: Shared<dyn SoundResource>,
        params: PlayParams,
        crossfade: f32,
    ) -> AudioHandle {
        if let Some(old) = self.music.take() {
            self.instances.remove(&old);
        }
        let handle = self.play(Category::Music, sound, params, crossfade);
        self.music = Some(handle);
        handle
    }

    /// Replace the current ambience loop.
    pub fn play_ambience(
        &mut self,
        sound: Shared<dyn SoundResource>,
        params: PlayParams,
        crossfade: f32,
    ) -> AudioHandle {
        if let Some(old) = self.ambience.take() {
            self.instances.remove(&old);
        }
        let handle = self.play(Category::Ambience, sound, params, crossfade);
        self.ambience = Some(handle);
        handle
    }

    /// Stop a voice. Unknown handles are ignored and return false.
    pub fn stop(&mut self, handle: AudioHandle, fade_out: f32) -> bool {
        if self.forget(handle).is_none() {
            return false;
        }
        self.pending.push(AudioCommand::Stop { handle, fade_out });
        true
    }

    pub fn stop_music(&mut self, fade_out: f32) -> bool {
        match self.music {
            Some(handle) => self.stop(handle, fade_out),
            None => false,
        }
    }

    pub fn stop_ambience(&mut self, fade_out: f32) -> bool {
        match self.ambience {
            Some(handle) => self.stop(handle, fade_out),
            None => false,
        }
    }

    pub fn stop_all(&mut self, fade_out: f32) {
        let handles: Vec<AudioHandle> = self.instances.keys().copied().collect();
        for handle in handles {
            self.stop(handle, fade_out);
        }
    }

    pub fn pause(&mut self, handle: AudioHandle) -> bool {
        self.update(handle, AudioCommand::Pause(handle), |i| i.paused = true)
    }

    pub fn resume(&mut self, handle: AudioHandle) -> bool {
        self.update(handle, AudioCommand::Resume(handle), |i| i.paused = false)
    }

    pub fn set_volume(&mut self, handle: AudioHandle, volume: f32) -> bool {
        let volume = volume.clamp(0.0, 1.0);
        self.update(handle, AudioCommand::SetVolume { handle, volume }, |i| {
            i.volume = volume
        })
    }

    pub fn set_pan(&mut self, handle: AudioHandle, pan: f32) -> bool {
        let pan = pan.clamp(-1.0, 1.0);
        self.update(handle, AudioCommand::SetPan { handle, pan }, |i| i.pan = pan)
    }

    pub fn set_looping(&mut self, handle: AudioHandle, looping: bool) -> bool {
        self.update(handle, AudioCommand::SetLooping { handle, looping }, |i| {
            i.looping = looping
        })
    }

    pub fn set_position(&mut self, handle: AudioHandle, seconds: f32) -> bool {
        let seconds = seconds.max(0.0);
        self.update(handle, AudioCommand::SetPosition { handle, seconds }, |i| {
            i.position = seconds
        })
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.clamp(0.0, 1.0);
        self.pending.push(AudioCommand::SetMasterVolume(self.master_volume));
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    /// True until the voice is stopped or reported finished.
    pub fn is_playing(&self, handle: AudioHandle) -> bool {
        self.instances.get(&handle).is_some_and(|i| !i.paused)
    }

    pub fn position(&self, handle: AudioHandle) -> Option<f32> {
        self.instances.get(&handle).map(|i| i.position)
    }

    pub fn instance(&self, handle: AudioHandle) -> Option<&Instance> {
        self.instances.get(&handle)
    }

    pub fn music(&self) -> Option<AudioHandle> {
        self.music
    }

    pub fn ambience(&self) -> Option<AudioHandle> {
        self.ambience
    }

    /// Voices the simulation still considers alive
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Commands queued since the last flush
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Move queued commands into the simulation half of `buffer`.
    pub fn flush_into(&mut self, buffer: &mut AudioBuffer) {
        let commands = &mut buffer.sim.commands;
        commands.clear();
        commands.reserve_to(self.pending.len());
        for command in self.pending.drain(..) {
            commands.push(command);
        }
    }

    /// Read the audio half of `buffer`: drop finished voices and refresh
    /// positions. Finished handles are appended to `finished`.
    ///
    /// Draining the finished list releases the audio thread's references
    /// to their resources on this thread.
    pub fn absorb(&mut self, buffer: &mut AudioBuffer, finished: &mut Vec<AudioHandle>) {
        for done in buffer.audio.finished.drain() {
            self.forget(done.handle);
            finished.push(done.handle);
        }
        for report in buffer.audio.positions.iter() {
            if let Some(instance) = self.instances.get_mut(&report.handle) {
                instance.position = report.seconds;
            }
        }
    }

    fn forget(&mut self, handle: AudioHandle) -> Option<Instance> {
        if self.music == Some(handle) {
            self.music = None;
        }
        if self.ambience == Some(handle) {
            self.ambience = None;
        }
        self.instances.remove(&handle)
    }

    fn update(
        &mut self,
        handle: AudioHandle,
        command: AudioCommand,
        apply: impl FnOnce(&mut Instance),
    ) -> bool {
        match self.instances.get_mut(&handle) {
            Some(instance) => {
                apply(instance);
                self.pending.push(command);
                true
            }
            None => false,
        }
    }
}
