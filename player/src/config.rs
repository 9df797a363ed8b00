//! User configuration (config.toml)
//!
//! Settings are stored in TOML format in the platform-specific config
//! directory. Missing or unreadable files fall back to defaults.

use std::path::{Path, PathBuf};

use retroframe_core::{RuntimeConfig, ScaleMode};
use serde::{Deserialize, Serialize};

/// Player configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Video/graphics settings
    #[serde(default)]
    pub video: VideoConfig,
    /// Audio settings
    #[serde(default)]
    pub audio: AudioConfig,
    /// Debug overlay settings
    #[serde(default)]
    pub debug: DebugConfig,
}

/// Video and graphics configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoConfig {
    /// Whether to run in fullscreen mode (default: false)
    #[serde(default)]
    pub fullscreen: bool,
    /// Whether to enable vertical sync (default: true)
    #[serde(default = "default_true")]
    pub vsync: bool,
    /// Initial window size as a multiple of the screen (default: 3, range: 1-8)
    #[serde(default = "default_scale")]
    pub window_scale: u32,
    /// Scaling mode for the composited image (default: PixelPerfect)
    #[serde(default)]
    pub scale_mode: ScaleMode,
    /// Start with the CRT pass on (default: false)
    #[serde(default)]
    pub crt: bool,
}

/// Audio configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Master volume level (default: 0.8, range: 0.0-1.0)
    #[serde(default = "default_volume")]
    pub master_volume: f32,
    /// Skip the output device entirely (default: false)
    #[serde(default)]
    pub mute: bool,
    /// Preferred output rate in Hz (default: 44100)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

/// Debug configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DebugConfig {
    /// Show simulation phase timings as overlay bars (default: false)
    #[serde(default)]
    pub profiling: bool,
}

fn default_true() -> bool {
    true
}
fn default_scale() -> u32 {
    3
}
fn default_volume() -> f32 {
    0.8
}
fn default_sample_rate() -> u32 {
    44_100
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            fullscreen: false,
            vsync: default_true(),
            window_scale: default_scale(),
            scale_mode: ScaleMode::default(),
            crt: false,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            master_volume: default_volume(),
            mute: false,
            sample_rate: default_sample_rate(),
        }
    }
}

impl Config {
    /// Fold user settings into the pipeline configuration.
    pub fn apply_to(&self, runtime: &mut RuntimeConfig) {
        runtime.scale_mode = self.video.scale_mode;
        runtime.crt = self.video.crt;
        runtime.sample_rate = self.audio.sample_rate;
        runtime.profiling = self.debug.profiling;
    }

    /// Window scale clamped to the supported range.
    pub fn window_scale(&self) -> u32 {
        self.video.window_scale.clamp(1, 8)
    }

    pub fn master_volume(&self) -> f32 {
        self.audio.master_volume.clamp(0.0, 1.0)
    }
}

/// Returns the platform-specific configuration directory.
///
/// On Windows: `%APPDATA%\Retroframe\config`
/// On macOS: `~/Library/Application Support/io.retroframe.Retroframe`
/// On Linux: `~/.config/retroframe`
///
/// Returns `None` if the home directory cannot be determined.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("io.retroframe", "", "Retroframe")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Loads the configuration from the platform config directory.
pub fn load() -> Config {
    config_dir()
        .map(|dir| load_from(&dir.join("config.toml")))
        .unwrap_or_default()
}

/// Loads the configuration from `path`, falling back to defaults.
pub fn load_from(path: &Path) -> Config {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Config::default();
    };
    match toml::from_str(&content) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Ignoring invalid {}: {}", path.display(), e);
            Config::default()
        }
    }
}

/// Saves the configuration to the platform config directory.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file
/// cannot be written.
pub fn save(config: &Config) -> std::io::Result<()> {
    match config_dir() {
        Some(dir) => save_to(config, &dir.join("config.toml")),
        None => Ok(()),
    }
}

/// Saves the configuration to `path`, creating parent directories.
pub fn save_to(config: &Config, path: &Path) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let content = toml::to_string_pretty(config).map_err(std::io::Error::other)?;
    std::fs::write(path, content)
}
