//! Game-state stack
//!
//! Game logic is a stack of [`GameState`]s. Only the top state is updated
//! and receives events; states below it are paused. Each call returns a
//! [`Transition`] which the stack applies before the next call.

use crate::events::FiredEvent;
use crate::sim::Engine;

/// Requested change to the state stack.
#[derive(Default)]
pub enum Transition {
    #[default]
    None,
    /// Pause the current state and enter a new one on top
    Push(Box<dyn GameState>),
    /// Leave the current state and resume the one below
    Pop,
    /// Replace the current state
    Switch(Box<dyn GameState>),
    /// Unwind everything and exit
    Quit,
}

impl std::fmt::Debug for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transition::None => write!(f, "None"),
            Transition::Push(s) => write!(f, "Push({})", s.name()),
            Transition::Pop => write!(f, "Pop"),
            Transition::Switch(s) => write!(f, "Switch({})", s.name()),
            Transition::Quit => write!(f, "Quit"),
        }
    }
}

/// One screen or mode of the game.
///
/// Every method receives the engine context explicitly; there is no
/// ambient "current engine".
pub trait GameState {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Called when the state becomes part of the stack.
    fn enter(&mut self, _engine: &mut Engine) {}

    /// Called once per tick while the state is on top.
    fn update(&mut self, engine: &mut Engine) -> Transition;

    /// Called for every fired subscription while the state is on top.
    fn event(&mut self, _engine: &mut Engine, _event: &FiredEvent) -> Transition {
        Transition::None
    }

    /// Another state was pushed on top of this one.
    fn pause(&mut self, _engine: &mut Engine) {}

    /// The state above this one was popped.
    fn resume(&mut self, _engine: &mut Engine) {}

    /// Called when the state leaves the stack.
    fn exit(&mut self, _engine: &mut Engine) {}
}

#[derive(Default)]
pub struct StateStack {
    states: Vec<Box<dyn GameState>>,
}

impl StateStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Name of the top state, if any.
    pub fn top_name(&self) -> Option<&str> {
        self.states.last().map(|s| s.name())
    }

    pub fn push(&mut self, mut state: Box<dyn GameState>, engine: &mut Engine) {
        if let Some(top) = self.states.last_mut() {
            top.pause(engine);
        }
        tracing::debug!("Entering state {}", state.name());
        state.enter(engine);
        self.states.push(state);
    }

    fn pop(&mut self, engine: &mut Engine) {
        if let Some(mut state) = self.states.pop() {
            tracing::debug!("Leaving state {}", state.name());
            state.exit(engine);
        }
        if let Some(top) = self.states.last_mut() {
            top.resume(engine);
        }
    }

    /// Update the top state and apply its transition.
    pub fn update(&mut self, engine: &mut Engine) {
        let Some(top) = self.states.last_mut() else {
            return;
        };
        let transition = top.update(engine);
        self.apply(transition, engine);
    }

    /// Deliver an event to the top state and apply its transition.
    pub fn dispatch(&mut self, event: &FiredEvent, engine: &mut Engine) {
        let Some(top) = self.states.last_mut() else {
            return;
        };
        let transition = top.event(engine, event);
        self.apply(transition, engine);
    }

    pub fn apply(&mut self, transition: Transition, engine: &mut Engine) {
        match transition {
            Transition::None => {}
            Transition::Push(state) => self.push(state, engine),
            Transition::Pop => self.pop(engine),
            Transition::Switch(mut state) => {
                if let Some(mut old) = self.states.pop() {
                    tracing::debug!("Switching state {} -> {}", old.name(), state.name());
                    old.exit(engine);
                }
                state.enter(engine);
                self.states.push(state);
            }
            Transition::Quit => engine.request_exit(),
        }
        if self.states.is_empty() {
            engine.request_exit();
        }
    }

    /// Exit every state, top first, leaving the stack empty.
    pub fn unwind(&mut self, engine: &mut Engine) {
        while let Some(mut state) = self.states.pop() {
            tracing::debug!("Unwinding state {}", state.name());
            state.exit(engine);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::test_utils::{Journal, Scripted};

    fn engine() -> Engine {
        Engine::new(&RuntimeConfig::default(), Vec::new())
    }

    #[test]
    fn test_push_pauses_and_pop_resumes() {
        let journal = Journal::default();
        let mut engine = engine();
        let mut stack = StateStack::new();
        stack.push(Scripted::boxed("base", &journal, vec![]), &mut engine);
        stack.apply(
            Transition::Push(Scripted::boxed("menu", &journal, vec![])),
            &mut engine,
        );
        assert_eq!(stack.top_name(), Some("menu"));
        stack.apply(Transition::Pop, &mut engine);
        assert_eq!(stack.top_name(), Some("base"));
        assert_eq!(
            journal.take(),
            vec![
                "base:enter",
                "base:pause",
                "menu:enter",
                "menu:exit",
                "base:resume"
            ]
        );
        assert!(!engine.exit_requested());
    }

    #[test]
    fn test_switch_replaces_top() {
        let journal = Journal::default();
        let mut engine = engine();
        let mut stack = StateStack::new();
        stack.push(Scripted::boxed("title", &journal, vec![]), &mut engine);
        stack.apply(
            Transition::Switch(Scripted::boxed("play", &journal, vec![])),
            &mut engine,
        );
        assert_eq!(stack.len(), 1);
        assert_eq!(
            journal.take(),
            vec!["title:enter", "title:exit", "play:enter"]
        );
    }

    #[test]
    fn test_popping_last_state_requests_exit() {
        let journal = Journal::default();
        let mut engine = engine();
        let mut stack = StateStack::new();
        stack.push(
            Scripted::boxed("only", &journal, vec![Transition::Pop]),
            &mut engine,
        );
        stack.update(&mut engine);
        assert!(stack.is_empty());
        assert!(engine.exit_requested());
    }

    #[test]
    fn test_unwind_exits_top_first() {
        let journal = Journal::default();
        let mut engine = engine();
        let mut stack = StateStack::new();
        stack.push(Scripted::boxed("a", &journal, vec![]), &mut engine);
        stack.push(Scripted::boxed("b", &journal, vec![]), &mut engine);
        journal.take();
        stack.unwind(&mut engine);
        assert_eq!(journal.take(), vec!["b:exit", "a:exit"]);
    }

    #[test]
    fn test_quit_requests_exit_without_unwinding() {
        let journal = Journal::default();
        let mut engine = engine();
        let mut stack = StateStack::new();
        stack.push(
            Scripted::boxed("game", &journal, vec![Transition::Quit]),
            &mut engine,
        );
        stack.update(&mut engine);
        assert!(engine.exit_requested());
        assert_eq!(stack.len(), 1);
    }
}
