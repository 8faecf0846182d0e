//! Request and response records for the three services.
//!
//! The broker listens for controllers and workers, the controller listens
//! for the broker's callbacks, and each worker listens for the broker's
//! turn dispatch. Field layouts mirror the payloads described in the
//! protocol section of the project docs.

use serde::{Deserialize, Serialize};

use torus_core::{BitBoard, Fragment, GameState, Halo};

/// Generic outcome of a call against the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerResponse {
    pub success: bool,
    pub message: String,
}

impl ServerResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Empty acknowledgement for controller callbacks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Ack;

/// Everything the broker needs to start (or resume) a game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartGameRequest {
    /// Address the broker dials back for callbacks.
    pub controller_address: String,
    pub height: usize,
    pub width: usize,
    pub max_turns: u64,
    /// Per-worker compute threads for each turn.
    pub threads: usize,
    /// Initial board; ignored when resuming.
    pub board: BitBoard,
    /// Whether the controller wants a `TurnComplete` callback per turn.
    pub visual_updates: bool,
    /// `false` asks the broker to resume from its snapshot.
    pub start_new: bool,
}

/// A committed board at a given turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardStateReport {
    pub completed_turns: u64,
    pub board: BitBoard,
}

/// Periodic liveness telemetry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AliveCellsReport {
    pub completed_turns: u64,
    pub num_alive: usize,
}

/// A game state transition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StateChangeReport {
    pub previous: GameState,
    pub new: GameState,
    pub completed_turns: u64,
}

/// Calls accepted by the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BrokerRequest {
    /// Controller requests a session. Answered with success only when no
    /// other controller is connected and at least one worker is registered.
    StartGame(StartGameRequest),
    /// Controller forwards a presentation-layer keypress.
    RegisterKeypress { key: char },
    /// Worker announces itself; the broker dials `worker_address` back.
    ConnectWorker { worker_address: String },
    /// Liveness probe from a worker.
    Ping,
}

/// Callbacks the broker makes against the controller. All are answered
/// with [`Ack`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ControllerRequest {
    TurnComplete(BoardStateReport),
    FinalTurnComplete(BoardStateReport),
    SaveBoard(BoardStateReport),
    ReportAliveCells(AliveCellsReport),
    GameStateChange(StateChangeReport),
}

/// Calls the broker makes against a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerRequest {
    /// Compute one turn of the given strip with up to `threads` threads.
    DoTurn { halo: Halo, threads: usize },
    /// Disconnect and terminate the worker process.
    Shutdown,
}

/// A worker's reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerResponse {
    Turn(Fragment),
    ShuttingDown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_game_request_survives_the_frame_codec() {
        let rows = vec![vec![true, false, true, false]; 4];
        let request = BrokerRequest::StartGame(StartGameRequest {
            controller_address: "localhost:8030".into(),
            height: 4,
            width: 4,
            max_turns: 100,
            threads: 8,
            board: BitBoard::from_rows(&rows, 4),
            visual_updates: true,
            start_new: true,
        });

        let bytes = bincode::serialize(&request).unwrap();
        let decoded: BrokerRequest = bincode::deserialize(&bytes).unwrap();
        match decoded {
            BrokerRequest::StartGame(req) => {
                assert_eq!(req.height, 4);
                assert_eq!(req.board.to_rows().unwrap(), rows);
                assert!(req.start_new);
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn keypress_round_trip_keeps_the_rune() {
        let bytes = bincode::serialize(&BrokerRequest::RegisterKeypress { key: 'p' }).unwrap();
        let decoded: BrokerRequest = bincode::deserialize(&bytes).unwrap();
        assert!(matches!(decoded, BrokerRequest::RegisterKeypress { key: 'p' }));
    }
}
