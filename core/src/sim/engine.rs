//! Engine context passed explicitly to every game state

use crate::audio::{AudioApi, AudioBuffer, AudioHandle, PlayParams};
use crate::config::RuntimeConfig;
use crate::display::{DisplayInfo, WindowGeometry};
use crate::events::EventBus;
use crate::frame::{MousePointer, ProfileBar, WindowRequests};
use crate::input::InputState;
use crate::resources::{SoundBank, SoundId};
use crate::screen::Screen;
use crate::tween::Tweens;

/// Everything game logic can see or change during a tick.
///
/// Owned by the simulation thread. Subsystems are public fields so states
/// can borrow several at once (e.g. read `input` while drawing to `screen`).
pub struct Engine {
    pub input: InputState,
    pub screen: Screen,
    pub audio: AudioApi,
    pub events: EventBus,
    pub tweens: Tweens,
    pub sounds: SoundBank,
    requests: WindowRequests,
    profile: Vec<ProfileBar>,
    displays: Vec<DisplayInfo>,
    geometry: WindowGeometry,
    finished_sounds: Vec<AudioHandle>,
    ticks: u64,
    tick_rate: u32,
    exit: bool,
}

impl Engine {
    /// `displays` is the monitor snapshot taken once at startup.
    pub fn new(config: &RuntimeConfig, displays: Vec<DisplayInfo>) -> Self {
        let mut requests = WindowRequests::default();
        if config.crt {
            requests.crt = Some(true);
        }
        Self {
            input: InputState::new(),
            screen: Screen::new(config.screen_width, config.screen_height),
            audio: AudioApi::new(),
            events: EventBus::new(config.tick_rate),
            tweens: Tweens::new(),
            sounds: SoundBank::new(),
            requests,
            profile: Vec::new(),
            displays,
            geometry: WindowGeometry::default(),
            finished_sounds: Vec::new(),
            ticks: 0,
            tick_rate: config.tick_rate.max(1),
            exit: false,
        }
    }

    /// Ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Simulated seconds elapsed, always `ticks / tick_rate`.
    pub fn time(&self) -> f64 {
        self.ticks as f64 / self.tick_rate as f64
    }

    /// Fixed step in seconds.
    pub fn delta(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    pub fn request_exit(&mut self) {
        if !self.exit {
            tracing::debug!("Exit requested at tick {}", self.ticks);
        }
        self.exit = true;
    }

    pub fn exit_requested(&self) -> bool {
        self.exit
    }

    // ------------------------------------------------------------------
    // Window requests (applied by the presentation loop next cycle)
    // ------------------------------------------------------------------

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.requests.title = Some(title.into());
    }

    pub fn set_window_size(&mut self, width: u32, height: u32) {
        self.requests.size = Some((width, height));
    }

    pub fn set_window_position(&mut self, x: i32, y: i32) {
        self.requests.position = Some((x, y));
    }

    pub fn set_fullscreen(&mut self, fullscreen: bool) {
        self.requests.fullscreen = Some(fullscreen);
    }

    pub fn set_crt(&mut self, enabled: bool) {
        self.requests.crt = Some(enabled);
    }

    pub fn set_mouse_pointer(&mut self, pointer: MousePointer) {
        self.requests.pointer = Some(pointer);
    }

    /// Add a bar to this tick's profiling overlay.
    pub fn profile_bar(&mut self, fraction: f32, color: u32) {
        self.profile.push(ProfileBar { fraction, color });
    }

    pub fn displays(&self) -> &[DisplayInfo] {
        &self.displays
    }

    /// Window geometry as last reported by the presentation loop.
    pub fn window_geometry(&self) -> WindowGeometry {
        self.geometry
    }

    /// Voices the audio thread reported finished since the previous tick.
    pub fn finished_sounds(&self) -> &[AudioHandle] {
        &self.finished_sounds
    }

    // ------------------------------------------------------------------
    // Sound bank shortcuts
    // ------------------------------------------------------------------

    /// Play a sound effect from the bank. `None` if the id is stale.
    pub fn play_sound(&mut self, id: SoundId, params: PlayParams) -> Option<AudioHandle> {
        let sound = self.sounds.get(id)?;
        Some(self.audio.play_sound(sound, params))
    }

    pub fn play_music(
        &mut self,
        id: SoundId,
        params: PlayParams,
        crossfade: f32,
    ) -> Option<AudioHandle> {
        let sound = self.sounds.get(id)?;
        Some(self.audio.play_music(sound, params, crossfade))
    }

    pub fn play_ambience(
        &mut self,
        id: SoundId,
        params: PlayParams,
        crossfade: f32,
    ) -> Option<AudioHandle> {
        let sound = self.sounds.get(id)?;
        Some(self.audio.play_ambience(sound, params, crossfade))
    }

    // ------------------------------------------------------------------
    // Simulation-internal plumbing
    // ------------------------------------------------------------------

    pub(crate) fn advance_tick(&mut self) {
        self.ticks += 1;
    }

    pub(crate) fn set_geometry(&mut self, geometry: WindowGeometry) {
        self.geometry = geometry;
    }

    pub(crate) fn take_requests(&mut self) -> WindowRequests {
        std::mem::take(&mut self.requests)
    }

    pub(crate) fn profile(&self) -> &[ProfileBar] {
        &self.profile
    }

    pub(crate) fn clear_profile(&mut self) {
        self.profile.clear();
    }

    pub(crate) fn clear_finished_sounds(&mut self) {
        self.finished_sounds.clear();
    }

    /// Fold one returned audio buffer into the sim-side voice table.
    pub(crate) fn absorb_audio(&mut self, buffer: &mut AudioBuffer) {
        self.audio.absorb(buffer, &mut self.finished_sounds);
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("ticks", &self.ticks)
            .field("tick_rate", &self.tick_rate)
            .field("exit", &self.exit)
            .finish_non_exhaustive()
    }
}
