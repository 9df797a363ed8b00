//! Gamepad polling via gilrs

use std::collections::HashMap;

use gilrs::{Axis, Button, EventType, GamepadId, Gilrs};
use retroframe_core::input::MAX_GAMEPADS;
use retroframe_core::{GamepadAxis, GamepadButton, InputEvent};

/// Stick values inside this radius read as centered.
const STICK_DEADZONE: f32 = 0.15;
const TRIGGER_DEADZONE: f32 = 0.05;

/// Connected pads, each pinned to the lowest free slot.
pub struct Gamepads {
    /// None if initialization failed
    gilrs: Option<Gilrs>,
    slots: HashMap<GamepadId, u8>,
}

impl Gamepads {
    pub fn new() -> Self {
        let gilrs = match Gilrs::new() {
            Ok(g) => Some(g),
            Err(e) => {
                tracing::warn!(
                    "Failed to initialize gamepad support: {}. Gamepads will not be available.",
                    e
                );
                None
            }
        };
        Self {
            gilrs,
            slots: HashMap::new(),
        }
    }

    /// Drain pending gilrs events into pipeline input events.
    pub fn poll(&mut self, out: &mut Vec<InputEvent>) {
        let Some(gilrs) = self.gilrs.as_mut() else {
            return;
        };
        while let Some(event) = gilrs.next_event() {
            match event.event {
                EventType::Connected => {
                    let free = (0..MAX_GAMEPADS as u8)
                        .find(|slot| !self.slots.values().any(|s| s == slot));
                    match free {
                        Some(pad) => {
                            self.slots.insert(event.id, pad);
                            tracing::info!("Gamepad {} connected as pad {}", event.id, pad);
                            out.push(InputEvent::GamepadConnected { pad });
                        }
                        None => {
                            tracing::warn!("Gamepad {} connected but no free pad slots", event.id)
                        }
                    }
                }
                EventType::Disconnected => {
                    if let Some(pad) = self.slots.remove(&event.id) {
                        tracing::info!("Gamepad {} (pad {}) disconnected", event.id, pad);
                        out.push(InputEvent::GamepadDisconnected { pad });
                    }
                }
                EventType::ButtonPressed(button, _) => {
                    if let (Some(&pad), Some(button)) = (self.slots.get(&event.id), map_button(button))
                    {
                        out.push(InputEvent::GamepadDown { pad, button });
                    }
                }
                EventType::ButtonReleased(button, _) => {
                    if let (Some(&pad), Some(button)) = (self.slots.get(&event.id), map_button(button))
                    {
                        out.push(InputEvent::GamepadUp { pad, button });
                    }
                }
                EventType::AxisChanged(axis, value, _) => {
                    if let Some(&pad) = self.slots.get(&event.id)
                        && let Some((axis, value)) = map_axis(axis, value)
                    {
                        out.push(InputEvent::GamepadAxis { pad, axis, value });
                    }
                }
                _ => {}
            }
        }
    }
}

impl Default for Gamepads {
    fn default() -> Self {
        Self::new()
    }
}

fn map_button(button: Button) -> Option<GamepadButton> {
    // Face buttons use positional names (South=A on an Xbox layout)
    Some(match button {
        Button::South => GamepadButton::South,
        Button::East => GamepadButton::East,
        Button::West => GamepadButton::West,
        Button::North => GamepadButton::North,
        Button::LeftTrigger => GamepadButton::LeftBumper,
        Button::RightTrigger => GamepadButton::RightBumper,
        Button::Select => GamepadButton::Select,
        Button::Start => GamepadButton::Start,
        Button::LeftThumb => GamepadButton::LeftStick,
        Button::RightThumb => GamepadButton::RightStick,
        Button::DPadUp => GamepadButton::DpadUp,
        Button::DPadDown => GamepadButton::DpadDown,
        Button::DPadLeft => GamepadButton::DpadLeft,
        Button::DPadRight => GamepadButton::DpadRight,
        _ => return None,
    })
}

/// Axis value with deadzone applied, Y inverted so up is positive and
/// triggers normalized to 0..1.
fn map_axis(axis: Axis, value: f32) -> Option<(GamepadAxis, f32)> {
    Some(match axis {
        Axis::LeftStickX => (GamepadAxis::LeftX, stick(value)),
        Axis::LeftStickY => (GamepadAxis::LeftY, -stick(value)),
        Axis::RightStickX => (GamepadAxis::RightX, stick(value)),
        Axis::RightStickY => (GamepadAxis::RightY, -stick(value)),
        Axis::LeftZ => (GamepadAxis::LeftTrigger, trigger(value)),
        Axis::RightZ => (GamepadAxis::RightTrigger, trigger(value)),
        _ => return None,
    })
}

fn stick(value: f32) -> f32 {
    if value.abs() < STICK_DEADZONE {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    }
}

fn trigger(value: f32) -> f32 {
    // Some drivers report -1..1
    let normalized = ((value + 1.0) / 2.0).clamp(0.0, 1.0);
    if normalized < TRIGGER_DEADZONE {
        0.0
    } else {
        normalized
    }
}
