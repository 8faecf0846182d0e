//! # Torus Controller
//!
//! The user-facing role. It loads or seeds the initial board, asks the
//! broker for a session, and then lives on two legs: an RPC service the
//! broker calls back with turn results and telemetry, and a select loop
//! forwarding presentation keypresses while watching for broker silence.
//! Everything the presentation layer sees flows through the [`Event`]
//! stream.

pub mod events;
pub mod io;
pub mod rate;

pub use events::Event;

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};

use torus_comm::{
    read_frame, write_frame, Ack, AliveCellsReport, BoardStateReport, BrokerRequest, CommError,
    ControllerRequest, RpcConnection, ServerResponse, StartGameRequest, StateChangeReport,
};
use torus_core::{BitBoard, Board, GameState};

use crate::io::{IoChannels, IoCommand};
use crate::rate::TurnRate;

/// The session is abandoned after this long without a turn or telemetry
/// callback from the broker.
const LIVENESS_TIMEOUT: Duration = Duration::from_secs(5);

/// `StartGame` attempts before giving up.
const START_ATTEMPTS: usize = 4;
const START_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Grace period for spawned save tasks to reach the I/O queue before the
/// idle check.
const SAVE_ENQUEUE_GRACE: Duration = Duration::from_millis(400);

#[derive(Debug, Clone)]
pub struct ControllerParams {
    pub threads: usize,
    pub width: usize,
    pub height: usize,
    pub turns: u64,
    /// Broker address to dial.
    pub broker_addr: String,
    /// Port our callback service listens on. 0 picks an ephemeral port.
    pub port: u16,
    /// Host the broker can dial us back on.
    pub our_host: String,
    /// Ask the broker for a `TurnComplete` callback per turn.
    pub visual_updates: bool,
    /// Resume from the broker's snapshot instead of loading a board.
    pub resume: bool,
    /// Directory board files live in.
    pub image_dir: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("failed to bind controller listener: {0}")]
    Bind(std::io::Error),
    #[error(transparent)]
    Comm(#[from] CommError),
    #[error("could not start a game: {0}")]
    SessionRejected(String),
    #[error("failed to load the initial board")]
    Load,
}

/// Run one controller session to completion.
///
/// Returns once the game finishes, the user quits, or the broker goes
/// silent. On the way out the callback listener is closed, the I/O
/// collaborator is drained, and the event stream ends when the last sender
/// is dropped.
pub async fn run(
    params: ControllerParams,
    events: mpsc::UnboundedSender<Event>,
    mut keys: mpsc::Receiver<char>,
) -> Result<(), ControllerError> {
    let mut io = io::spawn_io(params.image_dir.clone(), params.height, params.width);

    let mut board = Board::empty(params.height, params.width);
    if params.resume {
        info!("resuming game from the broker");
    } else {
        info!("starting new game");
        load_board(&mut io, &params, &mut board).await?;
    }

    let listener = TcpListener::bind(("0.0.0.0", params.port))
        .await
        .map_err(ControllerError::Bind)?;
    let port = listener.local_addr().map_err(ControllerError::Bind)?.port();

    let shared = Arc::new(Shared {
        events,
        previous: Mutex::new(None),
        deadline: Mutex::new(tokio::time::Instant::now() + LIVENESS_TIMEOUT),
        rate: Mutex::new(TurnRate::new(0)),
        stop: Notify::new(),
        saver: Saver {
            command: io.command.clone(),
            filename: io.filename.clone(),
            output: io.output.clone(),
            height: params.height,
            width: params.width,
        },
    });
    let accept_task = tokio::spawn(accept_loop(listener, shared.clone()));

    let broker = match RpcConnection::dial(&params.broker_addr).await {
        Ok(conn) => conn,
        Err(err) => {
            accept_task.abort();
            return Err(err.into());
        }
    };
    info!(broker = %params.broker_addr, "established connection with the broker");

    let request = BrokerRequest::StartGame(StartGameRequest {
        controller_address: format!("{}:{}", params.our_host, port),
        height: params.height,
        width: params.width,
        max_turns: params.turns,
        threads: params.threads,
        board: BitBoard::from_board(&board),
        visual_updates: params.visual_updates,
        start_new: !params.resume,
    });
    if let Err(err) = start_game(&broker, &request).await {
        accept_task.abort();
        return Err(err);
    }

    shared.touch_deadline();
    loop {
        let deadline = *shared.deadline.lock();
        tokio::select! {
            key = keys.recv() => match key {
                Some(key) => {
                    debug!(key = %key, "forwarding keypress");
                    if let Err(err) = broker
                        .call::<_, ServerResponse>(&BrokerRequest::RegisterKeypress { key })
                        .await
                    {
                        warn!(error = %err, "error sending keypress to broker");
                    }
                }
                None => {
                    warn!("keypress source closed, leaving session");
                    break;
                }
            },
            _ = tokio::time::sleep_until(deadline) => {
                // The deadline may have been pushed forward since we armed
                // the sleep; only a stale one counts as silence.
                if *shared.deadline.lock() <= tokio::time::Instant::now() {
                    warn!("timed out waiting for an alive cells report");
                    break;
                }
            }
            _ = shared.stop.notified() => {
                info!("received stop signal");
                break;
            }
        }
    }

    accept_task.abort();
    tokio::time::sleep(SAVE_ENQUEUE_GRACE).await;
    let _ = io.command.send(IoCommand::CheckIdle).await;
    let _ = io.idle.recv().await;
    Ok(())
}

async fn start_game(
    broker: &RpcConnection,
    request: &BrokerRequest,
) -> Result<(), ControllerError> {
    for attempt in 0..START_ATTEMPTS {
        if attempt > 0 {
            tokio::time::sleep(START_RETRY_DELAY).await;
        }
        match broker.call::<_, ServerResponse>(request).await {
            Ok(response) if response.success => {
                info!("game starting");
                return Ok(());
            }
            Ok(response) => warn!(message = %response.message, "broker rejected the session"),
            Err(err) => warn!(error = %err, "connection error"),
        }
    }
    Err(ControllerError::SessionRejected(
        "exhausted attempts to start a game".into(),
    ))
}

/// Populate `board` through the I/O collaborator from `<W>x<H>`.
async fn load_board(
    io: &mut IoChannels,
    params: &ControllerParams,
    board: &mut Board,
) -> Result<(), ControllerError> {
    let filename = format!("{}x{}", params.width, params.height);
    info!(%filename, "reading in board file");
    io.command
        .send(IoCommand::Input)
        .await
        .map_err(|_| ControllerError::Load)?;
    io.filename
        .send(filename)
        .await
        .map_err(|_| ControllerError::Load)?;
    for row in 0..params.height {
        for col in 0..params.width {
            match io.input.recv().await {
                Some(byte) => board.set(row, col, byte != 0),
                None => return Err(ControllerError::Load),
            }
        }
    }
    Ok(())
}

/// State shared between the callback service and the main loop.
struct Shared {
    events: mpsc::UnboundedSender<Event>,
    /// Board most recently diffed for `CellFlipped` events.
    previous: Mutex<Option<Board>>,
    /// Broker-silence deadline, pushed forward by turn and alive reports.
    deadline: Mutex<tokio::time::Instant>,
    rate: Mutex<TurnRate>,
    stop: Notify,
    saver: Saver,
}

/// Clonable handles for spawning asynchronous saves.
#[derive(Clone)]
struct Saver {
    command: mpsc::Sender<IoCommand>,
    filename: mpsc::Sender<String>,
    output: mpsc::Sender<u8>,
    height: usize,
    width: usize,
}

impl Saver {
    fn spawn_save(&self, board: Board, turn: u64) {
        let saver = self.clone();
        tokio::spawn(async move {
            let filename = format!("{}x{}x{}", saver.width, saver.height, turn);
            info!(%filename, "saving board");
            if saver.command.send(IoCommand::Output).await.is_err() {
                return;
            }
            if saver.filename.send(filename).await.is_err() {
                return;
            }
            for row in board.rows() {
                for &cell in row {
                    let byte = u8::from(cell);
                    if saver.output.send(byte).await.is_err() {
                        return;
                    }
                }
            }
        });
    }
}

impl Shared {
    fn touch_deadline(&self) {
        *self.deadline.lock() = tokio::time::Instant::now() + LIVENESS_TIMEOUT;
    }

    fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }

    fn handle(&self, request: ControllerRequest) {
        match request {
            ControllerRequest::TurnComplete(report) => self.on_turn_complete(report),
            ControllerRequest::FinalTurnComplete(report) => self.on_final_turn(report),
            ControllerRequest::SaveBoard(report) => self.on_save_board(report),
            ControllerRequest::ReportAliveCells(report) => self.on_alive_cells(report),
            ControllerRequest::GameStateChange(report) => self.on_state_change(report),
        }
    }

    fn on_turn_complete(&self, report: BoardStateReport) {
        self.touch_deadline();
        let board = match report.board.to_board() {
            Ok(board) => board,
            Err(err) => {
                error!(error = %err, "undecodable board in turn report");
                self.stop.notify_one();
                return;
            }
        };

        let mut previous = self.previous.lock();
        match previous.as_ref() {
            // First board of the session: flip every live cell into view.
            None => {
                for cell in board.alive_cells() {
                    self.emit(Event::CellFlipped {
                        completed_turns: report.completed_turns,
                        cell,
                    });
                }
            }
            Some(prev) => {
                for y in 0..board.height() {
                    for x in 0..board.width() {
                        if board.get(y, x) != prev.get(y, x) {
                            self.emit(Event::CellFlipped {
                                completed_turns: report.completed_turns,
                                cell: torus_core::Cell { x, y },
                            });
                        }
                    }
                }
            }
        }
        self.emit(Event::TurnComplete {
            completed_turns: report.completed_turns,
        });
        *previous = Some(board);
    }

    fn on_alive_cells(&self, report: AliveCellsReport) {
        self.touch_deadline();
        let rate = self.rate.lock().record(report.completed_turns);
        info!(
            turn = report.completed_turns,
            alive = report.num_alive,
            turns_per_second = rate,
            "alive cells report"
        );
        self.emit(Event::AliveCellsCount {
            completed_turns: report.completed_turns,
            cells_count: report.num_alive,
        });
    }

    fn on_save_board(&self, report: BoardStateReport) {
        info!(turn = report.completed_turns, "received save board request");
        match report.board.to_board() {
            Ok(board) => self.saver.spawn_save(board, report.completed_turns),
            Err(err) => error!(error = %err, "undecodable board in save request"),
        }
    }

    fn on_state_change(&self, report: StateChangeReport) {
        info!(
            previous = %report.previous,
            new = %report.new,
            "received state change report"
        );
        self.emit(Event::StateChange {
            completed_turns: report.completed_turns,
            new_state: report.new,
        });
        if report.new == GameState::Quitting {
            self.stop.notify_one();
        }
    }

    fn on_final_turn(&self, report: BoardStateReport) {
        info!(turn = report.completed_turns, "final turn complete");
        match report.board.to_board() {
            Ok(board) => {
                self.emit(Event::FinalTurnComplete {
                    completed_turns: report.completed_turns,
                    alive: board.alive_cells(),
                });
                self.saver.spawn_save(board, report.completed_turns);
            }
            Err(err) => error!(error = %err, "undecodable final board"),
        }
        self.stop.notify_one();
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "broker connected to callback service");
                tokio::spawn(serve_broker(stream, shared.clone()));
            }
            Err(err) => {
                warn!(error = %err, "callback accept failed");
                return;
            }
        }
    }
}

async fn serve_broker(mut stream: TcpStream, shared: Arc<Shared>) {
    loop {
        let request: ControllerRequest = match read_frame(&mut stream).await {
            Ok(request) => request,
            Err(CommError::Io(ref err)) if err.kind() == ErrorKind::UnexpectedEof => {
                debug!("broker hung up");
                return;
            }
            Err(err) => {
                warn!(error = %err, "unreadable frame from broker");
                return;
            }
        };
        shared.handle(request);
        if write_frame(&mut stream, &Ack).await.is_err() {
            return;
        }
    }
}
