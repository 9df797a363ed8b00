//! Retroframe - desktop player
//!
//! Runs the built-in demo on the three-thread frame pipeline.
//!
//! # Usage
//!
//! ```bash
//! retroframe
//! retroframe --fullscreen --crt
//! retroframe --scale 4 --mute
//! retroframe --headless --polls 600
//! ```

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use retroframe_core::{GameState, RuntimeConfig};
use retroframe_player::audio_output::cpal_sink_factory;
use retroframe_player::demo::Demo;
use retroframe_player::{StateFactory, WindowOptions, config, null_sink_factory};

#[derive(Parser)]
#[command(name = "retroframe")]
#[command(author, version, about = "Retroframe - fixed-rate retro frame pipeline")]
struct Args {
    /// Start in fullscreen mode (borderless window)
    #[arg(long, short = 'f')]
    fullscreen: bool,

    /// Integer window scale (overrides config, 1-8)
    #[arg(long, short = 's')]
    scale: Option<u32>,

    /// Enable the CRT border and scanline pass
    #[arg(long)]
    crt: bool,

    /// Show simulation phase timings as overlay bars
    #[arg(long)]
    profile: bool,

    /// Do not open an audio device
    #[arg(long)]
    mute: bool,

    /// Run without a window, closing after `--polls` iterations
    #[arg(long)]
    headless: bool,

    /// Presentation iterations before a headless run closes
    #[arg(long, default_value = "600")]
    polls: u64,

    /// Write the effective settings back to the config file
    #[arg(long)]
    save_config: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut user = config::load();
    user.video.fullscreen |= args.fullscreen;
    user.video.crt |= args.crt;
    user.audio.mute |= args.mute;
    user.debug.profiling |= args.profile;
    if let Some(scale) = args.scale {
        if !(1..=8).contains(&scale) {
            anyhow::bail!("Scale must be between 1 and 8");
        }
        user.video.window_scale = scale;
    }
    if args.save_config {
        config::save(&user)?;
        tracing::info!("Saved settings to {:?}", config::config_dir());
    }

    let mut runtime = RuntimeConfig::default();
    user.apply_to(&mut runtime);

    let initial: StateFactory = Box::new(|_engine| Box::new(Demo::new()) as Box<dyn GameState>);

    let ticks = if args.headless {
        retroframe_player::run_headless(runtime, args.polls, initial)?
    } else {
        let sink = if user.audio.mute {
            null_sink_factory(runtime.sample_rate)
        } else {
            cpal_sink_factory(user.master_volume())
        };
        let options = WindowOptions {
            title: "Retroframe".to_string(),
            scale: user.window_scale(),
            fullscreen: user.video.fullscreen,
            vsync: user.video.vsync,
        };
        retroframe_player::run(options, runtime, initial, sink)?
    };

    tracing::info!("Exited after {} ticks", ticks);
    Ok(())
}
