//! The controller loop: the broker's per-session heart.
//!
//! One task owns the authoritative board pair and serializes turn commits.
//! Keypresses and the liveness tick are polled between turns so interactive
//! control is never starved by compute; a failed turn is retried with the
//! surviving workers rather than surfacing to the controller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, info, warn};

use torus_comm::{
    Ack, AliveCellsReport, BoardStateReport, ControllerRequest, RpcConnection, StateChangeReport,
    WorkerRequest, WorkerResponse,
};
use torus_core::{BitBoard, Board, Fragment, GameState};
use torus_partition::{build_halo, commit_fragment};

use crate::state::BrokerState;

/// How often the controller is told how many cells are alive.
const REPORT_INTERVAL: Duration = Duration::from_secs(2);

/// Per-session parameters fixed at `StartGame`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GameParams {
    pub height: usize,
    pub width: usize,
    pub max_turns: u64,
    pub threads: usize,
    pub visual_updates: bool,
}

/// Why a turn could not be completed.
#[derive(Debug)]
pub(crate) enum TurnError {
    /// The worker set was empty when the turn started.
    NoWorkers,
    /// At least one worker failed; it has been disconnected.
    WorkersFailed,
}

enum KeyOutcome {
    Continue,
    EndSession,
}

/// Entry point of the session task spawned by `StartGame`. Clears the
/// controller slot on every exit path.
pub(crate) async fn controller_loop(
    state: Arc<BrokerState>,
    conn: Arc<RpcConnection>,
    board: Board,
    start_turn: u64,
    params: GameParams,
) {
    info!(start_turn, max_turns = params.max_turns, "controller loop starting");
    run_session(&state, &conn, board, start_turn, &params).await;
    state.clear_controller().await;
    info!("controller disconnected");
}

async fn run_session(
    state: &Arc<BrokerState>,
    conn: &Arc<RpcConnection>,
    mut current: Board,
    start_turn: u64,
    params: &GameParams,
) {
    let mut keypresses = state.lock_keypresses().await;
    let mut next = Board::empty(params.height, params.width);
    let mut turn = start_turn;
    let mut last_report = Instant::now();

    if params.visual_updates && send_turn_complete(conn, turn, &current).await.is_err() {
        warn!("controller unreachable, abandoning session");
        return;
    }

    while turn < params.max_turns {
        // Keypresses take priority over everything else.
        match keypresses.try_recv() {
            Ok(key) => {
                debug!(key = %key, "received keypress");
                match dispatch_keypress(state, conn, &mut keypresses, key, turn, &mut current).await
                {
                    KeyOutcome::Continue => {}
                    KeyOutcome::EndSession => return,
                }
                continue;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => return,
        }

        if last_report.elapsed() >= REPORT_INTERVAL {
            let report = AliveCellsReport {
                completed_turns: turn,
                num_alive: current.alive_count(),
            };
            if let Err(err) = conn
                .call::<_, Ack>(&ControllerRequest::ReportAliveCells(report))
                .await
            {
                warn!(error = %err, "failed to report alive cells, abandoning session");
                return;
            }
            last_report = Instant::now();
            continue;
        }

        match execute_turn(state, &current, &mut next, params.threads).await {
            Ok(()) => {
                std::mem::swap(&mut current, &mut next);
                turn += 1;
                state.store_snapshot(&current, turn);
                if params.visual_updates && send_turn_complete(conn, turn, &current).await.is_err()
                {
                    warn!("controller unreachable, abandoning session");
                    return;
                }
            }
            Err(TurnError::NoWorkers) => {
                warn!(turn, "worker set is empty, abandoning session");
                return;
            }
            Err(TurnError::WorkersFailed) => {
                warn!(turn, "problem handling turn, retrying with remaining workers");
            }
        }
    }

    info!(turns = params.max_turns, "all turns done");
    let report = BoardStateReport {
        completed_turns: params.max_turns,
        board: BitBoard::from_board(&current),
    };
    if let Err(err) = conn
        .call::<_, Ack>(&ControllerRequest::FinalTurnComplete(report))
        .await
    {
        warn!(error = %err, "failed to deliver the final turn");
    }
}

/// Run one turn: partition `current`, dispatch every registered worker in
/// parallel, and stitch the fragments into `next`.
///
/// The membership lock is held only to snapshot the handles. A collector
/// awaits exactly one outcome per dispatched worker before the turn
/// concludes, so a retry never races a straggler from the failed attempt.
pub(crate) async fn execute_turn(
    state: &Arc<BrokerState>,
    current: &Board,
    next: &mut Board,
    threads: usize,
) -> Result<(), TurnError> {
    let workers = state.worker_handles();
    let count = workers.len();
    if count == 0 {
        return Err(TurnError::NoWorkers);
    }

    let (tx, mut rx) = mpsc::channel::<(String, Option<Fragment>)>(count);
    for (index, worker) in workers.into_iter().enumerate() {
        let halo = build_halo(index, count, current);
        let tx = tx.clone();
        tokio::spawn(async move {
            let outcome = match worker
                .conn
                .call::<_, WorkerResponse>(&WorkerRequest::DoTurn { halo, threads })
                .await
            {
                Ok(WorkerResponse::Turn(fragment)) => Some(fragment),
                Ok(other) => {
                    warn!(worker = %worker.address, reply = ?other, "unexpected worker reply");
                    None
                }
                Err(err) => {
                    warn!(worker = %worker.address, error = %err, "error getting fragment");
                    None
                }
            };
            let _ = tx.send((worker.address, outcome)).await;
        });
    }
    drop(tx);

    let mut failed = false;
    while let Some((address, outcome)) = rx.recv().await {
        match outcome {
            Some(fragment) => {
                if let Err(err) = commit_fragment(next, &fragment) {
                    warn!(worker = %address, error = %err, "rejecting bad fragment");
                    state.disconnect_worker(&address);
                    failed = true;
                }
            }
            None => {
                state.disconnect_worker(&address);
                failed = true;
            }
        }
    }

    if failed {
        Err(TurnError::WorkersFailed)
    } else {
        Ok(())
    }
}

async fn dispatch_keypress(
    state: &Arc<BrokerState>,
    conn: &Arc<RpcConnection>,
    keypresses: &mut mpsc::Receiver<char>,
    key: char,
    turn: u64,
    current: &mut Board,
) -> KeyOutcome {
    match key {
        'p' => {
            if report_state(conn, GameState::Executing, GameState::Paused, turn)
                .await
                .is_err()
            {
                return KeyOutcome::EndSession;
            }
            info!(turn, "paused, waiting for the next 'p'");
            loop {
                match keypresses.recv().await {
                    Some('p') => break,
                    Some(other) => debug!(key = %other, "ignoring keypress while paused"),
                    None => return KeyOutcome::EndSession,
                }
            }
            if report_state(conn, GameState::Paused, GameState::Executing, turn)
                .await
                .is_err()
            {
                return KeyOutcome::EndSession;
            }
            info!("resuming execution");
            KeyOutcome::Continue
        }
        's' => {
            info!(turn, "telling controller to save the board");
            let report = BoardStateReport {
                completed_turns: turn,
                board: BitBoard::from_board(current),
            };
            match conn.call::<_, Ack>(&ControllerRequest::SaveBoard(report)).await {
                Ok(_) => KeyOutcome::Continue,
                Err(err) => {
                    warn!(error = %err, "save request failed, abandoning session");
                    KeyOutcome::EndSession
                }
            }
        }
        'q' => {
            info!(turn, "controller quitting");
            let _ = report_state(conn, GameState::Executing, GameState::Quitting, turn).await;
            KeyOutcome::EndSession
        }
        'k' => {
            info!(turn, "controller wants to close everything");
            state.shutdown_workers().await;
            let report = BoardStateReport {
                completed_turns: turn,
                board: BitBoard::from_board(current),
            };
            let _ = conn
                .call::<_, Ack>(&ControllerRequest::FinalTurnComplete(report))
                .await;
            state.trigger_shutdown();
            KeyOutcome::EndSession
        }
        'r' => {
            current.randomise(&mut rand::thread_rng());
            info!(turn, alive = current.alive_count(), "board randomised");
            KeyOutcome::Continue
        }
        other => {
            debug!(key = %other, "ignoring unknown keypress");
            KeyOutcome::Continue
        }
    }
}

async fn send_turn_complete(
    conn: &RpcConnection,
    turn: u64,
    board: &Board,
) -> Result<(), torus_comm::CommError> {
    let report = BoardStateReport {
        completed_turns: turn,
        board: BitBoard::from_board(board),
    };
    conn.call::<_, Ack>(&ControllerRequest::TurnComplete(report))
        .await
        .map(|_| ())
}

async fn report_state(
    conn: &RpcConnection,
    previous: GameState,
    new: GameState,
    turn: u64,
) -> Result<(), torus_comm::CommError> {
    info!(%previous, %new, "game state change");
    let report = StateChangeReport {
        previous,
        new,
        completed_turns: turn,
    };
    conn.call::<_, Ack>(&ControllerRequest::GameStateChange(report))
        .await
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};
    use torus_comm::read_frame;
    use torus_comm::write_frame;
    use torus_worker::compute_fragment;

    /// A worker that answers DoTurn calls in-process.
    async fn spawn_fake_worker(state: &Arc<BrokerState>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(_) => return,
                };
                tokio::spawn(serve_turns(stream));
            }
        });

        let response = state.connect_worker(&address).await;
        assert!(response.success);
        address
    }

    async fn serve_turns(mut stream: TcpStream) {
        loop {
            let request: WorkerRequest = match read_frame(&mut stream).await {
                Ok(request) => request,
                Err(_) => return,
            };
            match request {
                WorkerRequest::DoTurn { halo, threads } => {
                    let fragment = compute_fragment(&halo, threads).unwrap();
                    if write_frame(&mut stream, &WorkerResponse::Turn(fragment))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                WorkerRequest::Shutdown => {
                    let _ = write_frame(&mut stream, &WorkerResponse::ShuttingDown).await;
                    return;
                }
            }
        }
    }

    fn glider(height: usize, width: usize) -> Board {
        let mut board = Board::empty(height, width);
        for (x, y) in [(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)] {
            board.set(y, x, true);
        }
        board
    }

    fn reference_turn(board: &Board) -> Board {
        let mut next = Board::empty(board.height(), board.width());
        let halo = build_halo(0, 1, board);
        let fragment = compute_fragment(&halo, 1).unwrap();
        commit_fragment(&mut next, &fragment).unwrap();
        next
    }

    #[tokio::test]
    async fn execute_turn_gathers_fragments_from_all_workers() {
        let state = Arc::new(BrokerState::new());
        spawn_fake_worker(&state).await;
        spawn_fake_worker(&state).await;
        spawn_fake_worker(&state).await;

        let current = glider(16, 16);
        let mut next = Board::empty(16, 16);
        execute_turn(&state, &current, &mut next, 4).await.unwrap();

        assert_eq!(next, reference_turn(&current));
        assert_eq!(state.worker_count(), 3);
    }

    #[tokio::test]
    async fn failed_worker_is_disconnected_and_the_turn_fails() {
        let state = Arc::new(BrokerState::new());
        spawn_fake_worker(&state).await;

        // A worker that accepts the dial-back and immediately hangs up.
        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = dead.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = dead.accept().await.unwrap();
            drop(stream);
        });
        assert!(state.connect_worker(&dead_addr).await.success);
        assert_eq!(state.worker_count(), 2);

        let current = glider(16, 16);
        let mut next = Board::empty(16, 16);
        let result = execute_turn(&state, &current, &mut next, 4).await;
        assert!(matches!(result, Err(TurnError::WorkersFailed)));
        assert_eq!(state.worker_count(), 1);

        // The retry with the survivor completes the same turn.
        execute_turn(&state, &current, &mut next, 4).await.unwrap();
        assert_eq!(next, reference_turn(&current));
    }

    #[tokio::test]
    async fn execute_turn_with_no_workers_fails_fast() {
        let state = Arc::new(BrokerState::new());
        let current = glider(8, 8);
        let mut next = Board::empty(8, 8);
        let result = execute_turn(&state, &current, &mut next, 2).await;
        assert!(matches!(result, Err(TurnError::NoWorkers)));
    }
}
