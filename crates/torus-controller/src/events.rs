//! Events consumed by the presentation layer.

use torus_core::{Cell, GameState};

/// One observation of the running game. `CellFlipped` events for a turn
/// always precede that turn's `TurnComplete`, and turn numbers never go
/// backwards within a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A cell changed state since the previously displayed board.
    CellFlipped { completed_turns: u64, cell: Cell },
    /// A whole turn has been committed and diffed.
    TurnComplete { completed_turns: u64 },
    /// Periodic telemetry from the broker.
    AliveCellsCount { completed_turns: u64, cells_count: usize },
    /// The session finished; carries every live cell of the final board.
    FinalTurnComplete { completed_turns: u64, alive: Vec<Cell> },
    /// The broker reported a game state transition.
    StateChange { completed_turns: u64, new_state: GameState },
}
