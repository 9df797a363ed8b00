//! Built-in demo: a bouncing block over a split-palette sky
//!
//! Space (or the South button) jumps, P pauses, F toggles fullscreen,
//! C toggles the CRT pass, M swaps in a software cursor, Escape quits.

use std::sync::Arc;

use retroframe_core::events::Edge;
use retroframe_core::tween::{ease_in_quad, ease_out_quad};
use retroframe_core::{
    Binding, CursorImage, Engine, EventKind, FiredEvent, GameState, GamepadButton, Key,
    MousePointer, PlayParams, SoundId, SquareWave, Subscription, Transition, Trigger, TweenId,
};

const SKY: u8 = 1;
const GROUND: u8 = 2;
const BLOCK: u8 = 3;
const BLINK: u8 = 4;
const SHADE: u8 = 5;

const BLOCK_SIZE: i32 = 16;
const JUMP_HEIGHT: f32 = 72.0;
const JUMP_SECONDS: f32 = 0.35;

/// Main demo state.
pub struct Demo {
    x: f32,
    velocity: f32,
    /// Height above the ground
    lift: f32,
    jump: Option<TweenId>,
    falling: bool,
    blink: bool,
    blinker: Option<Subscription>,
    jump_sound: Option<SoundId>,
    land_sound: Option<SoundId>,
    fullscreen: bool,
    crt: bool,
    software_cursor: bool,
}

impl Demo {
    pub fn new() -> Self {
        Self {
            x: 0.0,
            velocity: 60.0,
            lift: 0.0,
            jump: None,
            falling: false,
            blink: false,
            blinker: None,
            jump_sound: None,
            land_sound: None,
            fullscreen: false,
            crt: false,
            software_cursor: false,
        }
    }

    fn ground_line(engine: &Engine) -> i32 {
        engine.screen.height() as i32 * 3 / 4
    }

    fn start_jump(&mut self, engine: &mut Engine) {
        if self.jump.is_some() {
            return;
        }
        self.falling = false;
        self.jump = Some(
            engine
                .tweens
                .start(0.0, JUMP_HEIGHT, JUMP_SECONDS, ease_out_quad),
        );
        if let Some(id) = self.jump_sound {
            engine.play_sound(id, PlayParams::default());
        }
    }

    fn draw(&self, engine: &mut Engine) {
        let width = engine.screen.width() as i32;
        let height = engine.screen.height() as i32;
        let ground = Self::ground_line(engine);

        engine.screen.clear(SKY);
        engine.screen.fill_rect(0, ground, width, height - ground, GROUND);
        let top = ground - BLOCK_SIZE - self.lift as i32;
        engine
            .screen
            .fill_rect(self.x as i32, top, BLOCK_SIZE, BLOCK_SIZE, BLOCK);
        if self.blink {
            engine.screen.fill_rect(width - 6, 2, 4, 4, BLINK);
        }
    }
}

impl Default for Demo {
    fn default() -> Self {
        Self::new()
    }
}

impl GameState for Demo {
    fn name(&self) -> &str {
        "demo"
    }

    fn enter(&mut self, engine: &mut Engine) {
        engine.set_title("Retroframe Demo");

        engine.screen.set_palette(SKY, 0x0020_3060);
        engine.screen.set_palette(GROUND, 0x0030_6020);
        engine.screen.set_palette(BLOCK, 0x00f0_c040);
        engine.screen.set_palette(BLINK, 0x00ff_4040);
        engine.screen.set_palette(SHADE, 0x0010_1018);

        // Lighter sky for the upper half of the screen
        let mut upper = *engine.screen.palette();
        upper[SKY as usize] = 0x0040_70b0;
        engine.screen.add_split(0, upper);
        let lower = *engine.screen.palette();
        engine.screen.add_split(engine.screen.height() / 3, lower);

        self.jump_sound = Some(engine.sounds.add(SquareWave::new("jump", 660.0, Some(0.08))));
        self.land_sound = Some(engine.sounds.add(SquareWave::new("land", 220.0, Some(0.05))));
        let drone = engine.sounds.add(SquareWave::new("drone", 55.0, None));
        engine.play_ambience(
            drone,
            PlayParams {
                volume: 0.1,
                fade_in: 1.0,
                ..PlayParams::looping()
            },
            0.0,
        );

        let jump = engine.events.bind_action(
            "jump",
            &[
                Binding::Key(Key::Space),
                Binding::Button {
                    pad: 0,
                    button: GamepadButton::South,
                },
            ],
        );
        engine.events.subscribe(Trigger::Action {
            action: jump,
            edge: Edge::Pressed,
        });
        self.blinker = Some(engine.events.every(0.5));
    }

    fn update(&mut self, engine: &mut Engine) -> Transition {
        if engine.input.key_pressed(Key::Escape) {
            return Transition::Quit;
        }
        if engine.input.key_pressed(Key::P) {
            return Transition::Push(Box::new(Paused));
        }
        if engine.input.key_pressed(Key::F) {
            self.fullscreen = !self.fullscreen;
            engine.set_fullscreen(self.fullscreen);
        }
        if engine.input.key_pressed(Key::C) {
            self.crt = !self.crt;
            engine.set_crt(self.crt);
        }
        if engine.input.key_pressed(Key::M) {
            self.software_cursor = !self.software_cursor;
            engine.set_mouse_pointer(if self.software_cursor {
                MousePointer::Custom(Arc::new(arrow_cursor()))
            } else {
                MousePointer::System
            });
        }

        let width = engine.screen.width() as f32;
        self.x += self.velocity * engine.delta();
        if self.x <= 0.0 || self.x + BLOCK_SIZE as f32 >= width {
            self.velocity = -self.velocity;
            self.x = self.x.clamp(0.0, (width - BLOCK_SIZE as f32).max(0.0));
        }
        if let Some(id) = self.jump
            && let Some(lift) = engine.tweens.value(id)
        {
            self.lift = lift;
        }

        self.draw(engine);
        Transition::None
    }

    fn event(&mut self, engine: &mut Engine, event: &FiredEvent) -> Transition {
        match event.kind {
            EventKind::Action { .. } => self.start_jump(engine),
            EventKind::Timer if event.subscription == self.blinker => self.blink = !self.blink,
            EventKind::TweenFinished(id) if Some(id) == self.jump => {
                if self.falling {
                    self.jump = None;
                    self.falling = false;
                    self.lift = 0.0;
                    if let Some(sound) = self.land_sound {
                        engine.play_sound(sound, PlayParams::default());
                    }
                } else {
                    self.falling = true;
                    self.lift = JUMP_HEIGHT;
                    self.jump = Some(engine.tweens.start(
                        JUMP_HEIGHT,
                        0.0,
                        JUMP_SECONDS,
                        ease_in_quad,
                    ));
                }
            }
            _ => {}
        }
        Transition::None
    }

    fn exit(&mut self, engine: &mut Engine) {
        engine.audio.stop_ambience(0.0);
        if let Some(blinker) = self.blinker.take() {
            engine.events.unsubscribe(blinker);
        }
    }
}

/// Pause overlay pushed over the demo.
struct Paused;

impl GameState for Paused {
    fn name(&self) -> &str {
        "paused"
    }

    fn enter(&mut self, engine: &mut Engine) {
        if let Some(ambience) = engine.audio.ambience() {
            engine.audio.pause(ambience);
        }
    }

    fn update(&mut self, engine: &mut Engine) -> Transition {
        if engine.input.key_pressed(Key::P) || engine.input.key_pressed(Key::Escape) {
            return Transition::Pop;
        }
        // Striped shade over the frozen scene
        let width = engine.screen.width() as i32;
        let height = engine.screen.height() as i32;
        for y in (0..height).step_by(4) {
            engine.screen.fill_rect(0, y, width, 1, SHADE);
        }
        Transition::None
    }

    fn exit(&mut self, engine: &mut Engine) {
        if let Some(ambience) = engine.audio.ambience() {
            engine.audio.resume(ambience);
        }
    }
}

/// 8x8 arrow with the hotspot at its tip.
fn arrow_cursor() -> CursorImage {
    const SHAPE: [&str; 8] = [
        "X.......", "XX......", "XWX.....", "XWWX....", "XWWWX...", "XWWXXX..", "XXWX....",
        "X..XX...",
    ];
    let pixels = SHAPE
        .iter()
        .flat_map(|row| row.bytes())
        .map(|b| match b {
            b'X' => 0xFF00_0000,
            b'W' => 0xFFFF_FFFF,
            _ => 0x0000_0000,
        })
        .collect();
    CursorImage {
        width: 8,
        height: 8,
        hotspot: (0, 0),
        pixels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retroframe_core::{InputEvent, RuntimeConfig, Simulation};

    fn simulation() -> Simulation {
        let config = RuntimeConfig::default();
        let engine = Engine::new(&config, Vec::new());
        Simulation::new(&config, engine, Box::new(Demo::new()))
    }

    #[test]
    fn test_enter_sets_title_and_registers_sounds() {
        let sim = simulation();
        assert_eq!(sim.stack().top_name(), Some("demo"));
        assert_eq!(sim.engine().sounds.len(), 3);
        assert_eq!(sim.engine().screen.splits().len(), 2);
    }

    #[test]
    fn test_draws_block_on_ground() {
        let mut sim = simulation();
        sim.tick(&[]);
        let screen = &sim.engine().screen;
        let ground = screen.height() as i32 * 3 / 4;
        assert_eq!(screen.pixel(0, ground), Some(GROUND));
        assert!(screen.pixels().contains(&BLOCK));
    }

    #[test]
    fn test_pause_pushes_and_pops() {
        let mut sim = simulation();
        sim.tick(&[InputEvent::KeyDown(Key::P), InputEvent::KeyUp(Key::P)]);
        assert_eq!(sim.stack().top_name(), Some("paused"));
        sim.tick(&[InputEvent::KeyDown(Key::P), InputEvent::KeyUp(Key::P)]);
        assert_eq!(sim.stack().top_name(), Some("demo"));
    }

    #[test]
    fn test_escape_requests_exit() {
        let mut sim = simulation();
        sim.tick(&[InputEvent::KeyDown(Key::Escape)]);
        assert!(sim.engine().exit_requested());
    }

    #[test]
    fn test_cursor_sprite_dimensions() {
        let cursor = arrow_cursor();
        assert_eq!(cursor.pixels.len(), 64);
        assert_eq!(cursor.pixels[0], 0xFF00_0000);
    }
}
