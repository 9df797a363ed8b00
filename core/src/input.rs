//! Input events and edge-detected input state
//!
//! The presentation loop captures raw [`InputEvent`]s into each frame
//! buffer; the simulation replays them into an [`InputState`] at the start
//! of every tick. Pressed/released edges are derived from the current state
//! against the previous tick's snapshot.

use glam::Vec2;
use smallvec::SmallVec;

/// Maximum number of gamepads tracked.
pub const MAX_GAMEPADS: usize = 4;

macro_rules! keys {
    ($($name:ident),* $(,)?) => {
        /// Keyboard key, by physical position.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum Key {
            $($name),*
        }

        impl Key {
            pub const ALL: &'static [Key] = &[$(Key::$name),*];
            pub const COUNT: usize = Self::ALL.len();
        }
    };
}

keys! {
    A, B, C, D, E, F, G, H, I, J, K, L, M,
    N, O, P, Q, R, S, T, U, V, W, X, Y, Z,
    Digit0, Digit1, Digit2, Digit3, Digit4, Digit5, Digit6, Digit7, Digit8, Digit9,
    F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,
    Up, Down, Left, Right,
    Space, Enter, Escape, Backspace, Tab,
    LeftShift, RightShift, LeftCtrl, RightCtrl, LeftAlt, RightAlt,
    Insert, Delete, Home, End, PageUp, PageDown,
    Minus, Equals, Comma, Period, Slash, Semicolon, Apostrophe,
    LeftBracket, RightBracket, Backslash, Backquote,
}

const _: () = assert!(Key::COUNT <= 128);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GamepadButton {
    South,
    East,
    West,
    North,
    LeftBumper,
    RightBumper,
    Select,
    Start,
    LeftStick,
    RightStick,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GamepadAxis {
    LeftX,
    LeftY,
    RightX,
    RightY,
    LeftTrigger,
    RightTrigger,
}

const AXIS_COUNT: usize = 6;

/// Raw input captured by the presentation loop.
///
/// Mouse coordinates are in the simulation's logical screen space once the
/// event has been placed in a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    KeyDown(Key),
    KeyUp(Key),
    /// Printable ASCII character typed
    Char(char),
    MouseMove { x: f32, y: f32 },
    MouseDown(MouseButton),
    MouseUp(MouseButton),
    Scroll { dx: f32, dy: f32 },
    GamepadDown { pad: u8, button: GamepadButton },
    GamepadUp { pad: u8, button: GamepadButton },
    GamepadAxis { pad: u8, axis: GamepadAxis, value: f32 },
    GamepadConnected { pad: u8 },
    GamepadDisconnected { pad: u8 },
    /// Window lost focus; every held key is released
    FocusLost,
}

/// Down/previous bitsets with a per-tick press latch.
#[derive(Debug, Clone, Copy, Default)]
struct Edges {
    down: u128,
    previous: u128,
    /// Went down during the current tick, even if released again
    taps: u128,
}

impl Edges {
    fn begin_tick(&mut self) {
        self.previous = self.down;
        self.taps = 0;
    }

    fn press(&mut self, bit: u32) {
        let mask = 1u128 << bit;
        if self.down & mask == 0 {
            self.taps |= mask;
        }
        self.down |= mask;
    }

    fn release(&mut self, bit: u32) {
        self.down &= !(1u128 << bit);
    }

    fn release_all(&mut self) {
        self.down = 0;
    }

    fn is_down(&self, bit: u32) -> bool {
        self.down & (1u128 << bit) != 0
    }

    fn pressed(&self, bit: u32) -> bool {
        let mask = 1u128 << bit;
        (self.down & !self.previous & mask) != 0 || self.taps & mask != 0
    }

    fn released(&self, bit: u32) -> bool {
        let mask = 1u128 << bit;
        self.previous & !self.down & mask != 0
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Pad {
    connected: bool,
    buttons: Edges,
    axes: [f32; AXIS_COUNT],
}

/// Edge-detected input seen by game logic.
#[derive(Debug, Clone, Default)]
pub struct InputState {
    keys: Edges,
    mouse_buttons: Edges,
    mouse: Vec2,
    scroll: Vec2,
    chars: SmallVec<[char; 8]>,
    pads: [Pad; MAX_GAMEPADS],
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot current state as "previous" and clear per-tick latches.
    pub fn begin_tick(&mut self) {
        self.keys.begin_tick();
        self.mouse_buttons.begin_tick();
        for pad in &mut self.pads {
            pad.buttons.begin_tick();
        }
        self.scroll = Vec2::ZERO;
        self.chars.clear();
    }

    /// Fold one event into the current state.
    pub fn apply(&mut self, event: &InputEvent) {
        match *event {
            InputEvent::KeyDown(key) => self.keys.press(key as u32),
            InputEvent::KeyUp(key) => self.keys.release(key as u32),
            InputEvent::Char(c) => self.chars.push(c),
            InputEvent::MouseMove { x, y } => self.mouse = Vec2::new(x, y),
            InputEvent::MouseDown(button) => self.mouse_buttons.press(button as u32),
            InputEvent::MouseUp(button) => self.mouse_buttons.release(button as u32),
            InputEvent::Scroll { dx, dy } => self.scroll += Vec2::new(dx, dy),
            InputEvent::GamepadDown { pad, button } => {
                if let Some(pad) = self.pads.get_mut(pad as usize) {
                    pad.buttons.press(button as u32);
                }
            }
            InputEvent::GamepadUp { pad, button } => {
                if let Some(pad) = self.pads.get_mut(pad as usize) {
                    pad.buttons.release(button as u32);
                }
            }
            InputEvent::GamepadAxis { pad, axis, value } => {
                if let Some(pad) = self.pads.get_mut(pad as usize) {
                    pad.axes[axis as usize] = value.clamp(-1.0, 1.0);
                }
            }
            InputEvent::GamepadConnected { pad } => {
                if let Some(pad) = self.pads.get_mut(pad as usize) {
                    pad.connected = true;
                }
            }
            InputEvent::GamepadDisconnected { pad } => {
                if let Some(pad) = self.pads.get_mut(pad as usize) {
                    pad.connected = false;
                    pad.buttons.release_all();
                    pad.axes = [0.0; AXIS_COUNT];
                }
            }
            InputEvent::FocusLost => {
                self.keys.release_all();
                self.mouse_buttons.release_all();
            }
        }
    }

    pub fn key_down(&self, key: Key) -> bool {
        self.keys.is_down(key as u32)
    }

    pub fn key_pressed(&self, key: Key) -> bool {
        self.keys.pressed(key as u32)
    }

    pub fn key_released(&self, key: Key) -> bool {
        self.keys.released(key as u32)
    }

    pub fn mouse_down(&self, button: MouseButton) -> bool {
        self.mouse_buttons.is_down(button as u32)
    }

    pub fn mouse_pressed(&self, button: MouseButton) -> bool {
        self.mouse_buttons.pressed(button as u32)
    }

    pub fn mouse_released(&self, button: MouseButton) -> bool {
        self.mouse_buttons.released(button as u32)
    }

    /// Pointer position in logical screen coordinates.
    pub fn mouse_position(&self) -> Vec2 {
        self.mouse
    }

    /// Scroll accumulated this tick.
    pub fn scroll(&self) -> Vec2 {
        self.scroll
    }

    /// Characters typed this tick.
    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    pub fn gamepad_connected(&self, pad: usize) -> bool {
        self.pads.get(pad).is_some_and(|p| p.connected)
    }

    pub fn button_down(&self, pad: usize, button: GamepadButton) -> bool {
        self.pads
            .get(pad)
            .is_some_and(|p| p.buttons.is_down(button as u32))
    }

    pub fn button_pressed(&self, pad: usize, button: GamepadButton) -> bool {
        self.pads
            .get(pad)
            .is_some_and(|p| p.buttons.pressed(button as u32))
    }

    pub fn button_released(&self, pad: usize, button: GamepadButton) -> bool {
        self.pads
            .get(pad)
            .is_some_and(|p| p.buttons.released(button as u32))
    }

    pub fn axis(&self, pad: usize, axis: GamepadAxis) -> f32 {
        self.pads.get(pad).map_or(0.0, |p| p.axes[axis as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(state: &mut InputState, events: &[InputEvent]) {
        state.begin_tick();
        for event in events {
            state.apply(event);
        }
    }

    #[test]
    fn test_key_edges_follow_previous_snapshot() {
        let mut input = InputState::new();
        tick(&mut input, &[InputEvent::KeyDown(Key::Space)]);
        assert!(input.key_pressed(Key::Space));
        assert!(input.key_down(Key::Space));

        tick(&mut input, &[]);
        assert!(!input.key_pressed(Key::Space));
        assert!(input.key_down(Key::Space));

        tick(&mut input, &[InputEvent::KeyUp(Key::Space)]);
        assert!(input.key_released(Key::Space));
        assert!(!input.key_down(Key::Space));

        tick(&mut input, &[]);
        assert!(!input.key_released(Key::Space));
    }

    #[test]
    fn test_tap_within_one_tick_still_presses() {
        let mut input = InputState::new();
        tick(
            &mut input,
            &[InputEvent::KeyDown(Key::Z), InputEvent::KeyUp(Key::Z)],
        );
        assert!(input.key_pressed(Key::Z));
        assert!(!input.key_down(Key::Z));
    }

    #[test]
    fn test_gamepad_buttons_are_independent() {
        let mut input = InputState::new();
        tick(
            &mut input,
            &[
                InputEvent::GamepadConnected { pad: 1 },
                InputEvent::GamepadDown {
                    pad: 1,
                    button: GamepadButton::East,
                },
            ],
        );
        assert!(input.gamepad_connected(1));
        assert!(input.button_pressed(1, GamepadButton::East));
        for other in [
            GamepadButton::South,
            GamepadButton::West,
            GamepadButton::North,
            GamepadButton::Start,
        ] {
            assert!(!input.button_pressed(1, other), "{other:?}");
        }
        assert!(!input.button_pressed(0, GamepadButton::East));
    }

    #[test]
    fn test_axes_clamped_and_reset_on_disconnect() {
        let mut input = InputState::new();
        tick(
            &mut input,
            &[InputEvent::GamepadAxis {
                pad: 0,
                axis: GamepadAxis::LeftX,
                value: 1.7,
            }],
        );
        assert_eq!(input.axis(0, GamepadAxis::LeftX), 1.0);
        assert_eq!(input.axis(0, GamepadAxis::LeftY), 0.0);
        tick(&mut input, &[InputEvent::GamepadDisconnected { pad: 0 }]);
        assert_eq!(input.axis(0, GamepadAxis::LeftX), 0.0);
    }

    #[test]
    fn test_chars_and_scroll_reset_each_tick() {
        let mut input = InputState::new();
        tick(
            &mut input,
            &[
                InputEvent::Char('h'),
                InputEvent::Char('i'),
                InputEvent::Scroll { dx: 0.0, dy: 1.0 },
                InputEvent::Scroll { dx: 0.0, dy: 2.0 },
            ],
        );
        assert_eq!(input.chars(), &['h', 'i']);
        assert_eq!(input.scroll(), Vec2::new(0.0, 3.0));
        tick(&mut input, &[]);
        assert!(input.chars().is_empty());
        assert_eq!(input.scroll(), Vec2::ZERO);
    }

    #[test]
    fn test_focus_lost_releases_keys() {
        let mut input = InputState::new();
        tick(&mut input, &[InputEvent::KeyDown(Key::A)]);
        tick(&mut input, &[InputEvent::FocusLost]);
        assert!(!input.key_down(Key::A));
        assert!(input.key_released(Key::A));
    }
}
