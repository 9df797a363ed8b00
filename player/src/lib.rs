//! Retroframe Player - desktop front end for the frame pipeline
//!
//! Hosts the presentation loop on a winit window with a wgpu presenter,
//! opens the default audio device through cpal and reads optional gamepads
//! through gilrs. A headless mode drives the same pipeline without any
//! window or device for smoke tests and CI.

pub mod audio_output;
pub mod config;
pub mod demo;
#[cfg(feature = "gamepad")]
pub mod gamepad;
pub mod graphics;
pub mod keymap;
pub mod window;

use retroframe_core::{
    AudioSink, DisplayInfo, HeadlessPlatform, NullSink, Pipeline, RuntimeConfig, SinkFactory,
};

pub use window::{StateFactory, WindowOptions, run};

/// Sink factory that discards audio at real-time pace.
pub fn null_sink_factory(sample_rate: u32) -> SinkFactory {
    Box::new(move || Ok(Box::new(NullSink::new(sample_rate)) as Box<dyn AudioSink>))
}

/// Run without a window or audio device, closing after `polls`
/// presentation iterations.
///
/// Returns the number of ticks simulated.
pub fn run_headless(
    runtime: RuntimeConfig,
    polls: u64,
    initial: StateFactory,
) -> anyhow::Result<u64> {
    let width = runtime.screen_width;
    let height = runtime.screen_height;
    let sink = null_sink_factory(runtime.sample_rate);
    let pipeline = Pipeline::start(
        runtime,
        vec![DisplayInfo::headless(width, height)],
        initial,
        sink,
    )?;

    let mut platform = HeadlessPlatform::new(width, height);
    platform.close_at(polls.max(1));
    let ticks = pipeline.run(&mut platform)?;
    tracing::info!(
        "Headless run finished: {} ticks, {} presents",
        ticks,
        platform.presents()
    );
    Ok(ticks)
}
