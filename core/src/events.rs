//! Timer and input event subscriptions
//!
//! Subscriptions are synchronous: game logic registers them on the
//! simulation thread and they are evaluated once per tick, right after
//! input has been folded into [`InputState`]. Fired events are handed to
//! the active game state; nothing is queued across threads.
//!
//! Each subscription is addressed through a [`HandleTable`] token, so an
//! unsubscribed (or expired one-shot) subscription simply stops resolving.

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::handle::{HandleTable, Token};
use crate::input::{GamepadButton, InputState, Key, MouseButton};
use crate::tween::TweenId;

/// Token for a registered subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(Token);

impl Subscription {
    pub fn token(self) -> Token {
        self.0
    }
}

/// Identifier of a named action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionId(u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Pressed,
    Released,
}

/// Physical input an action can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Key(Key),
    Button { pad: u8, button: GamepadButton },
    Mouse(MouseButton),
}

impl Binding {
    fn down(self, input: &InputState) -> bool {
        match self {
            Binding::Key(key) => input.key_down(key),
            Binding::Button { pad, button } => input.button_down(pad as usize, button),
            Binding::Mouse(button) => input.mouse_down(button),
        }
    }

    fn edge(self, input: &InputState, edge: Edge) -> bool {
        match (self, edge) {
            (Binding::Key(key), Edge::Pressed) => input.key_pressed(key),
            (Binding::Key(key), Edge::Released) => input.key_released(key),
            (Binding::Button { pad, button }, Edge::Pressed) => {
                input.button_pressed(pad as usize, button)
            }
            (Binding::Button { pad, button }, Edge::Released) => {
                input.button_released(pad as usize, button)
            }
            (Binding::Mouse(button), Edge::Pressed) => input.mouse_pressed(button),
            (Binding::Mouse(button), Edge::Released) => input.mouse_released(button),
        }
    }
}

/// What a subscription listens for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trigger {
    /// Fires after `ticks` ticks, then again every `ticks` if `repeat`
    Timer { ticks: u32, repeat: bool },
    Key { key: Key, edge: Edge },
    Gamepad {
        pad: u8,
        button: GamepadButton,
        edge: Edge,
    },
    Action { action: ActionId, edge: Edge },
    /// Any printable character typed
    Char,
}

/// Payload delivered to the game state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventKind {
    Timer,
    Key { key: Key, edge: Edge },
    Gamepad {
        pad: u8,
        button: GamepadButton,
        edge: Edge,
    },
    Action { action: ActionId, edge: Edge },
    Char(char),
    /// A tween reached its end value
    TweenFinished(TweenId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiredEvent {
    /// `None` for engine-originated events such as tween completion
    pub subscription: Option<Subscription>,
    pub kind: EventKind,
}

#[derive(Debug)]
struct Entry {
    token: Token,
    trigger: Trigger,
    countdown: u32,
}

#[derive(Debug)]
struct Action {
    name: String,
    bindings: SmallVec<[Binding; 4]>,
}

/// Per-simulation subscription registry.
#[derive(Debug)]
pub struct EventBus {
    handles: HandleTable,
    entries: Vec<Entry>,
    actions: Vec<Action>,
    action_names: HashMap<String, ActionId>,
    tick_rate: u32,
    expired: Vec<Subscription>,
}

impl EventBus {
    pub fn new(tick_rate: u32) -> Self {
        Self {
            handles: HandleTable::new(),
            entries: Vec::new(),
            actions: Vec::new(),
            action_names: HashMap::new(),
            tick_rate: tick_rate.max(1),
            expired: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, trigger: Trigger) -> Subscription {
        let countdown = match trigger {
            Trigger::Timer { ticks, .. } => ticks.max(1),
            _ => 0,
        };
        let id = self.handles.alloc(self.entries.len() as u32);
        let token = self.handles.to_token(id);
        self.entries.push(Entry {
            token,
            trigger,
            countdown,
        });
        Subscription(token)
    }

    /// One-shot timer firing after `seconds` of simulated time.
    pub fn after(&mut self, seconds: f32) -> Subscription {
        let ticks = self.seconds_to_ticks(seconds);
        self.subscribe(Trigger::Timer {
            ticks,
            repeat: false,
        })
    }

    /// Repeating timer firing every `seconds` of simulated time.
    pub fn every(&mut self, seconds: f32) -> Subscription {
        let ticks = self.seconds_to_ticks(seconds);
        self.subscribe(Trigger::Timer {
            ticks,
            repeat: true,
        })
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        let Some(id) = self.handles.from_token(subscription.0) else {
            return false;
        };
        let Some(index) = self.handles.index_of(id) else {
            return false;
        };
        let index = index as usize;
        self.entries.swap_remove(index);
        if let Some(moved) = self.entries.get(index)
            && let Some(moved_id) = self.handles.from_token(moved.token)
        {
            self.handles.update_index(moved_id, index as u32);
        }
        self.handles.release(id);
        true
    }

    pub fn is_active(&self, subscription: Subscription) -> bool {
        self.handles.validate(subscription.0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every subscription.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.handles.clear();
    }

    /// Register (or rebind) a named action.
    pub fn bind_action(&mut self, name: &str, bindings: &[Binding]) -> ActionId {
        if let Some(&id) = self.action_names.get(name) {
            self.actions[id.0 as usize].bindings = bindings.iter().copied().collect();
            return id;
        }
        let id = ActionId(self.actions.len() as u16);
        self.actions.push(Action {
            name: name.to_string(),
            bindings: bindings.iter().copied().collect(),
        });
        self.action_names.insert(name.to_string(), id);
        id
    }

    pub fn action(&self, name: &str) -> Option<ActionId> {
        self.action_names.get(name).copied()
    }

    pub fn action_name(&self, id: ActionId) -> Option<&str> {
        self.actions.get(id.0 as usize).map(|a| a.name.as_str())
    }

    /// Whether any binding of the action is held.
    pub fn action_down(&self, input: &InputState, id: ActionId) -> bool {
        self.actions
            .get(id.0 as usize)
            .is_some_and(|a| a.bindings.iter().any(|b| b.down(input)))
    }

    fn action_edge(&self, input: &InputState, id: ActionId, edge: Edge) -> bool {
        self.actions
            .get(id.0 as usize)
            .is_some_and(|a| a.bindings.iter().any(|b| b.edge(input, edge)))
    }

    /// Evaluate every subscription against this tick's input.
    ///
    /// Expired one-shot timers are removed after firing.
    pub fn collect(&mut self, input: &InputState, out: &mut Vec<FiredEvent>) {
        for i in 0..self.entries.len() {
            let subscription = Some(Subscription(self.entries[i].token));
            let trigger = self.entries[i].trigger;
            match trigger {
                Trigger::Timer { ticks, repeat } => {
                    let entry = &mut self.entries[i];
                    entry.countdown = entry.countdown.saturating_sub(1);
                    if entry.countdown == 0 {
                        out.push(FiredEvent {
                            subscription,
                            kind: EventKind::Timer,
                        });
                        if repeat {
                            entry.countdown = ticks.max(1);
                        } else {
                            self.expired.push(Subscription(entry.token));
                        }
                    }
                }
                Trigger::Key { key, edge } => {
                    let hit = match edge {
                        Edge::Pressed => input.key_pressed(key),
                        Edge::Released => input.key_released(key),
                    };
                    if hit {
                        out.push(FiredEvent {
                            subscription,
                            kind: EventKind::Key { key, edge },
                        });
                    }
                }
                Trigger::Gamepad { pad, button, edge } => {
                    if (Binding::Button { pad, button }).edge(input, edge) {
                        out.push(FiredEvent {
                            subscription,
                            kind: EventKind::Gamepad { pad, button, edge },
                        });
                    }
                }
                Trigger::Action { action, edge } => {
                    if self.action_edge(input, action, edge) {
                        out.push(FiredEvent {
                            subscription,
                            kind: EventKind::Action { action, edge },
                        });
                    }
                }
                Trigger::Char => {
                    for &c in input.chars() {
                        if c.is_ascii() && !c.is_ascii_control() {
                            out.push(FiredEvent {
                                subscription,
                                kind: EventKind::Char(c),
                            });
                        }
                    }
                }
            }
        }

        let expired = std::mem::take(&mut self.expired);
        for subscription in &expired {
            self.unsubscribe(*subscription);
        }
        self.expired = expired;
        self.expired.clear();
    }

    fn seconds_to_ticks(&self, seconds: f32) -> u32 {
        ((seconds * self.tick_rate as f32).round() as u32).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputEvent;

    fn step(
        bus: &mut EventBus,
        input: &mut InputState,
        events: &[InputEvent],
    ) -> Vec<FiredEvent> {
        input.begin_tick();
        for e in events {
            input.apply(e);
        }
        let mut out = Vec::new();
        bus.collect(input, &mut out);
        out
    }

    // =============================================================
    // Timers
    // =============================================================

    #[test]
    fn test_one_shot_timer_fires_once_then_expires() {
        let mut bus = EventBus::new(60);
        let mut input = InputState::new();
        let sub = bus.after(0.05); // 3 ticks

        let fired: Vec<usize> = (0..10)
            .map(|_| step(&mut bus, &mut input, &[]).len())
            .collect();
        assert_eq!(fired, vec![0, 0, 1, 0, 0, 0, 0, 0, 0, 0]);
        assert!(!bus.is_active(sub));
        assert!(bus.is_empty());
    }

    #[test]
    fn test_repeating_timer_cadence() {
        let mut bus = EventBus::new(60);
        let mut input = InputState::new();
        let sub = bus.every(0.5);
        let mut fire_ticks = vec![];
        for t in 1..=120 {
            if !step(&mut bus, &mut input, &[]).is_empty() {
                fire_ticks.push(t);
            }
        }
        assert_eq!(fire_ticks, vec![30, 60, 90, 120]);
        assert!(bus.is_active(sub));
    }

    // =============================================================
    // Input subscriptions
    // =============================================================

    #[test]
    fn test_key_and_char_subscriptions() {
        let mut bus = EventBus::new(60);
        let mut input = InputState::new();
        let key_sub = bus.subscribe(Trigger::Key {
            key: Key::Enter,
            edge: Edge::Pressed,
        });
        bus.subscribe(Trigger::Char);

        let fired = step(
            &mut bus,
            &mut input,
            &[InputEvent::KeyDown(Key::Enter), InputEvent::Char('x')],
        );
        assert_eq!(fired.len(), 2);
        assert_eq!(fired[0].subscription, Some(key_sub));
        assert_eq!(fired[1].kind, EventKind::Char('x'));

        // Held key does not re-fire
        assert!(step(&mut bus, &mut input, &[]).is_empty());
    }

    #[test]
    fn test_action_fires_from_any_binding() {
        let mut bus = EventBus::new(60);
        let mut input = InputState::new();
        let jump = bus.bind_action(
            "jump",
            &[
                Binding::Key(Key::Space),
                Binding::Button {
                    pad: 0,
                    button: GamepadButton::South,
                },
            ],
        );
        bus.subscribe(Trigger::Action {
            action: jump,
            edge: Edge::Pressed,
        });

        let fired = step(
            &mut bus,
            &mut input,
            &[InputEvent::GamepadDown {
                pad: 0,
                button: GamepadButton::South,
            }],
        );
        assert_eq!(
            fired[0].kind,
            EventKind::Action {
                action: jump,
                edge: Edge::Pressed
            }
        );
        assert!(bus.action_down(&input, jump));
        assert_eq!(bus.action("jump"), Some(jump));
        assert_eq!(bus.action_name(jump), Some("jump"));
    }

    #[test]
    fn test_gamepad_subscription_ignores_other_buttons() {
        let mut bus = EventBus::new(60);
        let mut input = InputState::new();
        bus.subscribe(Trigger::Gamepad {
            pad: 0,
            button: GamepadButton::North,
            edge: Edge::Pressed,
        });
        let fired = step(
            &mut bus,
            &mut input,
            &[InputEvent::GamepadDown {
                pad: 0,
                button: GamepadButton::West,
            }],
        );
        assert!(fired.is_empty());
    }

    // =============================================================
    // Unsubscribe
    // =============================================================

    #[test]
    fn test_unsubscribe_keeps_other_tokens_valid() {
        let mut bus = EventBus::new(60);
        let subs: Vec<_> = (0..5).map(|i| bus.after(1.0 + i as f32)).collect();
        assert!(bus.unsubscribe(subs[1]));
        assert!(!bus.unsubscribe(subs[1]));
        for (i, sub) in subs.iter().enumerate() {
            assert_eq!(bus.is_active(*sub), i != 1);
        }
        // The entry moved by swap_remove is still addressable
        assert!(bus.unsubscribe(subs[4]));
        assert!(bus.unsubscribe(subs[0]));
        assert_eq!(bus.len(), 2);
    }
}
