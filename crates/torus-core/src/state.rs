//! Session-level game state reported to the controller.

use std::fmt;

use serde::{Deserialize, Serialize};

/// State of a running game as seen by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameState {
    /// Turns are being processed.
    Executing,
    /// A `p` keypress suspended the loop until the next `p`.
    Paused,
    /// A `q` keypress is tearing the session down.
    Quitting,
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameState::Executing => write!(f, "Executing"),
            GameState::Paused => write!(f, "Paused"),
            GameState::Quitting => write!(f, "Quitting"),
        }
    }
}
