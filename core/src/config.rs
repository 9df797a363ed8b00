//! Runtime configuration

use std::time::Duration;

use crate::alloc::AllocContext;
use crate::viewport::ScaleMode;

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Target tick rate in Hz
    pub tick_rate: u32,
    /// Maximum lag before the simulation stops catching up and resyncs
    pub max_delta: Duration,
    /// CPU budget warning threshold per tick
    pub cpu_budget: Duration,
    /// Logical screen size in pixels
    pub screen_width: u32,
    pub screen_height: u32,
    /// Frame buffers in circulation between simulation and presentation
    pub frame_pool: usize,
    /// Audio buffers in circulation between simulation and audio
    pub audio_pool: usize,
    /// How many audio buffers start on the simulation side
    pub audio_pool_upstream: usize,
    /// Preferred mixing rate; the sink may override it
    pub sample_rate: u32,
    /// Stereo frames mixed per audio-loop iteration
    pub audio_block_frames: usize,
    /// Voices mixed at once before priority stealing kicks in
    pub max_voices: usize,
    /// Scale mode used when translating pointer coordinates
    pub scale_mode: ScaleMode,
    /// Start with the CRT emulation pass enabled
    pub crt: bool,
    /// Publish simulation phase timings as profiling bars
    pub profiling: bool,
    /// Allocation tracking shared by every growable buffer
    pub alloc: AllocContext,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            max_delta: Duration::from_millis(100),
            cpu_budget: Duration::from_micros(4000), // 4ms at 60fps
            screen_width: 320,
            screen_height: 200,
            frame_pool: 2,
            audio_pool: 2,
            audio_pool_upstream: 2,
            sample_rate: 44_100,
            audio_block_frames: 735, // one tick at 44.1kHz
            max_voices: 32,
            scale_mode: ScaleMode::default(),
            crt: false,
            profiling: false,
            alloc: AllocContext::new(),
        }
    }
}

impl RuntimeConfig {
    /// Fixed simulation step.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    /// Fixed simulation step in seconds.
    pub fn tick_seconds(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }
}
