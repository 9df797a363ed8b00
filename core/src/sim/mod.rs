//! Simulation thread: engine context and the fixed-rate tick loop

mod engine;
mod game_loop;

pub use engine::Engine;
pub use game_loop::Simulation;
