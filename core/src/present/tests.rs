//! Presentation loop tests against a hand-driven simulation side

use super::*;
use crate::alloc::AllocContext;
use crate::config::RuntimeConfig;
use crate::exchange::exchange;
use crate::input::Key;

const OPAQUE: u32 = 0xFF00_0000;

struct Rig {
    sim: Endpoint<FrameBuffer>,
    present: PresentationLoop,
    platform: HeadlessPlatform,
}

impl Rig {
    fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    fn with_config(config: RuntimeConfig) -> Self {
        let pool = FrameBuffer::pool(2, &AllocContext::new());
        let (sim, present) = exchange("frame", pool, 2);
        Self {
            sim,
            present: PresentationLoop::new(present, &config),
            platform: HeadlessPlatform::new(640, 400).record_frames(),
        }
    }

    /// Produce one 4x2 frame filled with `color`.
    fn send(&mut self, tick: u64, color: u32, edit: impl FnOnce(&mut FrameBuffer)) {
        let mut frame = self.sim.consume().unwrap();
        frame.sim.width = 4;
        frame.sim.height = 2;
        frame.sim.screen.clear();
        frame.sim.screen.resize(8, 1);
        frame.sim.palette[1] = color;
        frame.sim.tick = tick;
        frame.sim.exit = false;
        frame.sim.requests = WindowRequests::default();
        edit(&mut frame);
        self.sim.produce(frame).unwrap();
    }

    fn iterate(&mut self) -> PresentStatus {
        self.present.iterate(&mut self.platform).unwrap()
    }
}

// ============================================================================
// Frame cadence
// ============================================================================

#[test]
fn test_waits_until_first_frame() {
    let mut rig = Rig::new();
    assert_eq!(rig.iterate(), PresentStatus::Waiting);
    assert_eq!(rig.iterate(), PresentStatus::Waiting);
    assert_eq!(rig.platform.presents(), 0);
    assert_eq!(rig.platform.polls(), 2);
}

#[test]
fn test_double_rate_presentation_repeats_previous_pixels() {
    let mut rig = Rig::new();
    let colors = [0x0011_1111, 0x0022_2222, 0x0033_3333, 0x0044_4444, 0x0055_5555];

    for (tick, &color) in colors.iter().enumerate() {
        rig.send(tick as u64, color, |_| {});
        assert_eq!(rig.iterate(), PresentStatus::Presented);
        assert_eq!(rig.iterate(), PresentStatus::Repeated);
    }

    let history = rig.platform.history();
    assert_eq!(history.len(), colors.len() * 2);
    for (i, &color) in colors.iter().enumerate() {
        let fresh = &history[2 * i];
        let repeat = &history[2 * i + 1];
        assert_eq!(fresh, repeat);
        assert!(fresh.pixels.iter().all(|&p| p == OPAQUE | color));
    }

    let stats = rig.present.stats();
    assert_eq!(stats.frames, 5);
    assert_eq!(stats.repeats, 5);
    assert_eq!(stats.iterations, 10);
}

#[test]
fn test_older_frame_returned_and_requests_merged() {
    let mut rig = Rig::new();
    rig.platform.push_input(vec![InputEvent::KeyDown(Key::A)]);
    rig.send(1, 0x0000_00FF, |frame| {
        frame.sim.requests.title = Some("first".into());
        frame.sim.requests.fullscreen = Some(true);
    });
    rig.send(2, 0x0000_FF00, |frame| {
        frame.sim.requests.title = Some("second".into());
    });

    assert_eq!(rig.iterate(), PresentStatus::Presented);
    assert_eq!(rig.platform.presents(), 1);
    let shown = rig.platform.last_image().unwrap();
    assert_eq!(shown.pixels[0], OPAQUE | 0x0000_FF00);

    let applied = rig.platform.applied();
    assert_eq!(applied.title.as_deref(), Some("second"));
    assert_eq!(applied.fullscreen, Some(true));

    // Both buffers come back in order; input rides on the first
    let first = rig.sim.consume().unwrap();
    let second = rig.sim.consume().unwrap();
    assert_eq!(first.sim.tick, 1);
    assert_eq!(&*first.present.input, &[InputEvent::KeyDown(Key::A)]);
    assert!(second.present.input.is_empty());
}

// ============================================================================
// Input capture
// ============================================================================

#[test]
fn test_input_captured_while_waiting_rides_next_handoff() {
    let mut rig = Rig::new();
    rig.platform.push_input(vec![
        InputEvent::KeyDown(Key::A),
        InputEvent::MouseMove { x: 100.0, y: 50.0 },
    ]);
    assert_eq!(rig.iterate(), PresentStatus::Waiting);

    rig.send(1, 0x00FF_FFFF, |_| {});
    assert_eq!(rig.iterate(), PresentStatus::Presented);

    let returned = rig.sim.consume().unwrap();
    // 320x200 doubled into 640x400
    assert_eq!(
        &*returned.present.input,
        &[
            InputEvent::KeyDown(Key::A),
            InputEvent::MouseMove { x: 50.0, y: 25.0 },
        ]
    );
    assert_eq!(returned.present.geometry.size, (640, 400));
    assert!(!returned.present.exit_requested);
}

#[test]
fn test_pointer_translation_accounts_for_crt_border() {
    let config = RuntimeConfig {
        crt: true,
        ..RuntimeConfig::default()
    };
    let mut rig = Rig::with_config(config);
    rig.platform = HeadlessPlatform::new(672, 432);
    rig.platform.push_input(vec![InputEvent::MouseMove { x: 36.0, y: 56.0 }]);
    rig.iterate();

    rig.send(1, 0, |frame| {
        frame.sim.width = 320;
        frame.sim.height = 200;
        frame.sim.screen.resize(320 * 200, 0);
    });
    rig.iterate();
    let returned = rig.sim.consume().unwrap();
    assert_eq!(
        &*returned.present.input,
        &[InputEvent::MouseMove { x: 10.0, y: 20.0 }]
    );
}

// ============================================================================
// Teardown
// ============================================================================

#[test]
fn test_close_request_reported_upstream() {
    let mut rig = Rig::new();
    rig.platform.close_at(1);
    rig.send(1, 0, |_| {});
    assert_eq!(rig.iterate(), PresentStatus::Presented);
    let returned = rig.sim.consume().unwrap();
    assert!(returned.present.exit_requested);
}

#[test]
fn test_exit_frame_is_acknowledged_once() {
    let mut rig = Rig::new();
    rig.send(1, 0, |_| {});
    rig.iterate();
    rig.send(2, 0, |frame| frame.sim.exit = true);

    assert_eq!(rig.iterate(), PresentStatus::Finished);
    assert!(rig.present.is_finished());
    let first = rig.sim.consume().unwrap();
    assert!(!first.present.exit_ack);
    let ack = rig.sim.consume().unwrap();
    assert!(ack.present.exit_ack);

    // Later iterations do not touch the channel or the platform
    let polls = rig.platform.polls();
    assert_eq!(rig.iterate(), PresentStatus::Finished);
    assert_eq!(rig.platform.polls(), polls);
    assert_eq!(rig.sim.gauge().snapshot().total(), 2);
}
