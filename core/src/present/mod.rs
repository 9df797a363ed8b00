//! Presentation loop: platform events in, composited frames out
//!
//! ```text
//! Platform (window/OS)        Presentation Loop                Simulation
//!     │                              │                              │
//! [poll events]──────────────►[translate pointer to screen]         │
//!     │                       [poll frame channel]◄───(frame)───────│
//!     │◄──[apply requests]────[composite]                           │
//!     │◄──[present]────────── [fill input + geometry]───(frame)────►│
//! ```
//!
//! The frame poll never blocks. When the simulation has not produced a new
//! frame yet, the previous composite is presented again so the window keeps
//! showing a complete picture at its own cadence.

mod composite;
mod headless;
#[cfg(test)]
mod tests;

pub use composite::{CRT_BORDER, Compositor, Image};
pub use headless::HeadlessPlatform;

use glam::Vec2;
use tracing::{debug, trace};

use crate::config::RuntimeConfig;
use crate::display::WindowGeometry;
use crate::error::ExchangeError;
use crate::exchange::Endpoint;
use crate::frame::{FrameBuffer, PresentHalf, WindowRequests};
use crate::input::InputEvent;
use crate::viewport::{ScaleMode, Viewport};

/// What the platform reported from one event pump.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlatformStatus {
    pub geometry: WindowGeometry,
    /// The user asked to close the window
    pub close_requested: bool,
}

/// Window, surface and input source driven by the presentation loop.
///
/// Pointer positions in [`InputEvent::MouseMove`] are reported in window
/// pixels; the loop maps them into screen space.
pub trait Platform {
    /// Pump pending OS events, appending captured input in arrival order.
    fn poll_events(&mut self, input: &mut Vec<InputEvent>) -> PlatformStatus;

    /// Apply window changes the simulation asked for.
    fn apply_requests(&mut self, requests: &WindowRequests);

    /// Show a composited image.
    fn present(&mut self, image: &Image);
}

/// Result of one [`PresentationLoop::iterate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    /// A new frame was composited and presented
    Presented,
    /// No new frame; the previous composite was presented again
    Repeated,
    /// Nothing has arrived yet
    Waiting,
    /// Exit frame acknowledged; stop iterating
    Finished,
}

/// Counters kept across iterations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresentStats {
    pub iterations: u64,
    /// New frames composited
    pub frames: u64,
    /// Iterations that re-presented the previous composite
    pub repeats: u64,
}

pub struct PresentationLoop {
    endpoint: Endpoint<FrameBuffer>,
    compositor: Compositor,
    scale_mode: ScaleMode,
    /// Raw events from the current pump
    raw: Vec<InputEvent>,
    /// Translated input waiting for the next handoff
    input: Vec<InputEvent>,
    pending_requests: WindowRequests,
    geometry: WindowGeometry,
    screen_size: (u32, u32),
    close_requested: bool,
    has_frame: bool,
    finished: bool,
    stats: PresentStats,
}

impl PresentationLoop {
    pub fn new(endpoint: Endpoint<FrameBuffer>, config: &RuntimeConfig) -> Self {
        Self {
            endpoint,
            compositor: Compositor::new(config.crt),
            scale_mode: config.scale_mode,
            raw: Vec::new(),
            input: Vec::new(),
            pending_requests: WindowRequests::default(),
            geometry: WindowGeometry::default(),
            screen_size: (config.screen_width, config.screen_height),
            close_requested: false,
            has_frame: false,
            finished: false,
            stats: PresentStats::default(),
        }
    }

    pub fn stats(&self) -> PresentStats {
        self.stats
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    pub fn set_scale_mode(&mut self, mode: ScaleMode) {
        self.scale_mode = mode;
    }

    /// Pump events, poll for a frame and present.
    pub fn iterate(&mut self, platform: &mut dyn Platform) -> Result<PresentStatus, ExchangeError> {
        if self.finished {
            return Ok(PresentStatus::Finished);
        }
        self.stats.iterations += 1;

        let status = platform.poll_events(&mut self.raw);
        self.geometry = status.geometry;
        if status.close_requested && !self.close_requested {
            debug!("Window close requested");
            self.close_requested = true;
        }
        self.translate_input();

        // Older frames are returned straight away; only the newest is shown
        let mut latest: Option<FrameBuffer> = None;
        while let Some(frame) = self.endpoint.try_consume()? {
            if let Some(mut older) = latest.replace(frame) {
                trace!("Skipping frame for tick {}", older.sim.tick);
                self.pending_requests
                    .merge(std::mem::take(&mut older.sim.requests));
                self.fill_present_half(&mut older.present);
                self.endpoint.produce(older)?;
            }
        }

        let Some(mut frame) = latest else {
            if !self.has_frame {
                return Ok(PresentStatus::Waiting);
            }
            platform.present(self.compositor.image());
            self.stats.repeats += 1;
            return Ok(PresentStatus::Repeated);
        };

        if frame.sim.exit {
            debug!(
                "Exit frame received after {} frames, acknowledging",
                self.stats.frames
            );
            self.fill_present_half(&mut frame.present);
            frame.present.exit_ack = true;
            self.endpoint.produce(frame)?;
            self.finished = true;
            return Ok(PresentStatus::Finished);
        }

        self.pending_requests
            .merge(std::mem::take(&mut frame.sim.requests));
        if !self.pending_requests.is_empty() {
            platform.apply_requests(&self.pending_requests);
            self.compositor.apply(&self.pending_requests);
            self.pending_requests = WindowRequests::default();
        }

        self.screen_size = (frame.sim.width, frame.sim.height);
        platform.present(self.compositor.composite(&frame.sim));
        self.has_frame = true;
        self.stats.frames += 1;

        self.fill_present_half(&mut frame.present);
        self.endpoint.produce(frame)?;
        Ok(PresentStatus::Presented)
    }

    /// Map a window-space point into screen pixels.
    pub fn window_to_screen(&self, point: Vec2) -> Vec2 {
        let image = self.compositor.image_size(self.screen_size);
        let viewport = Viewport::compute(self.scale_mode, image, self.geometry.size);
        let border = self.compositor.border() as f32;
        viewport.window_to_image(point, image) - Vec2::splat(border)
    }

    fn translate_input(&mut self) {
        let mut raw = std::mem::take(&mut self.raw);
        for event in raw.drain(..) {
            let event = match event {
                InputEvent::MouseMove { x, y } => {
                    let p = self.window_to_screen(Vec2::new(x, y));
                    self.compositor.set_cursor(p);
                    InputEvent::MouseMove { x: p.x, y: p.y }
                }
                other => other,
            };
            self.input.push(event);
        }
        self.raw = raw;
    }

    fn fill_present_half(&mut self, half: &mut PresentHalf) {
        half.input.clear();
        half.input.reserve_to(self.input.len());
        for event in self.input.drain(..) {
            half.input.push(event);
        }
        half.geometry = self.geometry;
        half.exit_requested = self.close_requested;
        half.iteration = self.stats.iterations;
        half.exit_ack = false;
    }
}
