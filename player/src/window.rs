//! Windowed presentation on winit
//!
//! The event loop runs on the main thread and owns the presentation side of
//! the [`Pipeline`]. Window events are buffered into pipeline input and
//! drained by [`Platform::poll_events`] at the start of each iteration.

use std::sync::Arc;

use retroframe_core::{
    DisplayInfo, Engine, GameState, Image, InputEvent, MousePointer, Pipeline, PipelineError,
    Platform, PlatformStatus, PresentStatus, RuntimeConfig, SinkFactory, WindowGeometry,
    WindowRequests,
};
use winit::{
    application::ApplicationHandler,
    dpi::{LogicalSize, PhysicalPosition, PhysicalSize},
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::PhysicalKey,
    monitor::MonitorHandle,
    window::{Fullscreen, Window, WindowId},
};

#[cfg(feature = "gamepad")]
use crate::gamepad::Gamepads;
use crate::graphics::Presenter;
use crate::keymap;

/// Builds the first game state on the simulation thread.
pub type StateFactory = Box<dyn FnOnce(&mut Engine) -> Box<dyn GameState> + Send>;

/// Window settings fixed at startup.
#[derive(Debug, Clone)]
pub struct WindowOptions {
    pub title: String,
    /// Initial inner size as a multiple of the screen
    pub scale: u32,
    pub fullscreen: bool,
    pub vsync: bool,
}

/// [`Platform`] backed by a winit window and the wgpu presenter.
pub struct WinitPlatform {
    window: Arc<Window>,
    presenter: Presenter,
    pending: Vec<InputEvent>,
    close_requested: bool,
    #[cfg(feature = "gamepad")]
    gamepads: Gamepads,
}

impl WinitPlatform {
    pub fn new(window: Arc<Window>, presenter: Presenter) -> Self {
        Self {
            window,
            presenter,
            pending: Vec::new(),
            close_requested: false,
            #[cfg(feature = "gamepad")]
            gamepads: Gamepads::new(),
        }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Buffer a window event for the next poll.
    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                tracing::info!("Window close requested");
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => self.presenter.resize(size.width, size.height),
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key
                    && let Some(input) = keymap::key_event(code, event.state, event.repeat)
                {
                    self.pending.push(input);
                }
                if event.state.is_pressed()
                    && let Some(text) = &event.text
                {
                    keymap::text_events(text, &mut self.pending);
                }
            }
            WindowEvent::CursorMoved { position, .. } => self.pending.push(InputEvent::MouseMove {
                x: position.x as f32,
                y: position.y as f32,
            }),
            WindowEvent::MouseInput { state, button, .. } => {
                if let Some(input) = keymap::mouse_event(*button, *state) {
                    self.pending.push(input);
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                self.pending.push(keymap::scroll_event(*delta));
            }
            WindowEvent::Focused(false) => self.pending.push(InputEvent::FocusLost),
            _ => {}
        }
    }

    fn geometry(&self) -> WindowGeometry {
        let size = self.window.inner_size();
        let position = self
            .window
            .outer_position()
            .map(|p| (p.x, p.y))
            .unwrap_or_default();
        WindowGeometry {
            position,
            size: (size.width, size.height),
        }
    }
}

impl Platform for WinitPlatform {
    fn poll_events(&mut self, input: &mut Vec<InputEvent>) -> PlatformStatus {
        input.append(&mut self.pending);
        #[cfg(feature = "gamepad")]
        self.gamepads.poll(input);
        PlatformStatus {
            geometry: self.geometry(),
            close_requested: self.close_requested,
        }
    }

    fn apply_requests(&mut self, requests: &WindowRequests) {
        if let Some(title) = &requests.title {
            self.window.set_title(title);
        }
        if let Some((width, height)) = requests.size
            && let Some(size) = self
                .window
                .request_inner_size(PhysicalSize::new(width, height))
        {
            self.presenter.resize(size.width, size.height);
        }
        if let Some((x, y)) = requests.position {
            self.window.set_outer_position(PhysicalPosition::new(x, y));
        }
        if let Some(fullscreen) = requests.fullscreen {
            self.window
                .set_fullscreen(fullscreen.then_some(Fullscreen::Borderless(None)));
        }
        if let Some(pointer) = &requests.pointer {
            self.window
                .set_cursor_visible(matches!(pointer, MousePointer::System));
        }
    }

    fn present(&mut self, image: &Image) {
        self.window.pre_present_notify();
        self.presenter.present(image);
    }
}

fn display_info(monitor: &MonitorHandle) -> DisplayInfo {
    let size = monitor.size();
    let position = monitor.position();
    DisplayInfo {
        name: monitor.name().unwrap_or_default(),
        size: (size.width, size.height),
        position: (position.x, position.y),
        refresh_hz: monitor.refresh_rate_millihertz().map(|mhz| mhz / 1000),
        scale_factor: monitor.scale_factor(),
    }
}

/// winit application driving the presentation loop.
pub struct App {
    options: WindowOptions,
    runtime: RuntimeConfig,
    start: Option<(StateFactory, SinkFactory)>,
    platform: Option<WinitPlatform>,
    pipeline: Option<Pipeline>,
    outcome: Option<Result<u64, PipelineError>>,
}

impl App {
    pub fn new(
        options: WindowOptions,
        runtime: RuntimeConfig,
        initial: StateFactory,
        sink: SinkFactory,
    ) -> Self {
        Self {
            options,
            runtime,
            start: Some((initial, sink)),
            platform: None,
            pipeline: None,
            outcome: None,
        }
    }

    fn create_platform(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<WinitPlatform> {
        let scale = self.options.scale.max(1);
        let mut window_attributes = Window::default_attributes()
            .with_title(self.options.title.clone())
            .with_inner_size(LogicalSize::new(
                self.runtime.screen_width * scale,
                self.runtime.screen_height * scale,
            ));
        if self.options.fullscreen {
            window_attributes =
                window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }
        let window = Arc::new(event_loop.create_window(window_attributes)?);
        let presenter = Presenter::new(
            window.clone(),
            self.options.vsync,
            self.runtime.scale_mode,
        )?;
        Ok(WinitPlatform::new(window, presenter))
    }

    /// One presentation iteration; exits the event loop once finished.
    fn step(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(pipeline), Some(platform)) = (self.pipeline.as_mut(), self.platform.as_mut())
        else {
            return;
        };
        match pipeline.iterate(platform) {
            Ok(PresentStatus::Finished) => {
                if let Some(pipeline) = self.pipeline.take() {
                    self.outcome = Some(pipeline.join());
                }
                event_loop.exit();
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!("Pipeline error: {}", e);
                self.pipeline = None;
                self.outcome = Some(Err(e));
                event_loop.exit();
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.platform.is_some() {
            return;
        }
        let platform = match self.create_platform(event_loop) {
            Ok(platform) => platform,
            Err(e) => {
                tracing::error!("Failed to initialize window: {}", e);
                event_loop.exit();
                return;
            }
        };
        let Some((initial, sink)) = self.start.take() else {
            return;
        };

        let displays: Vec<DisplayInfo> = event_loop
            .available_monitors()
            .map(|monitor| display_info(&monitor))
            .collect();
        tracing::debug!("{} display(s) available", displays.len());

        match Pipeline::start(self.runtime.clone(), displays, initial, sink) {
            Ok(pipeline) => self.pipeline = Some(pipeline),
            Err(e) => {
                tracing::error!("Failed to start pipeline: {}", e);
                self.outcome = Some(Err(e));
                event_loop.exit();
            }
        }
        platform.window().request_redraw();
        self.platform = Some(platform);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(platform) = self.platform.as_mut() else {
            return;
        };
        platform.handle_event(&event);
        match event {
            WindowEvent::CloseRequested if self.pipeline.is_none() => event_loop.exit(),
            WindowEvent::RedrawRequested => self.step(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(platform) = &self.platform {
            // Present paces itself on vsync; frames are polled, not waited for
            event_loop.set_control_flow(ControlFlow::Poll);
            platform.window().request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Dropping hangs up the frame channel and joins the simulation
        if let Some(pipeline) = self.pipeline.take() {
            tracing::debug!("Event loop exiting with pipeline still running");
            drop(pipeline);
        }
    }
}

/// Open a window and run until the simulation exits.
///
/// Returns the number of ticks simulated.
pub fn run(
    options: WindowOptions,
    runtime: RuntimeConfig,
    initial: StateFactory,
    sink: SinkFactory,
) -> anyhow::Result<u64> {
    let event_loop = EventLoop::new()?;

    let mut app = App::new(options, runtime, initial, sink);
    event_loop.run_app(&mut app)?;

    match app.outcome.take() {
        Some(outcome) => Ok(outcome?),
        None => Ok(0),
    }
}
