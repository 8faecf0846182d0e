//! Controller session establishment.

use std::sync::Arc;

use tracing::{info, warn};

use torus_comm::{RpcConnection, ServerResponse, StartGameRequest};

use crate::game::{self, GameParams};
use crate::state::BrokerState;

/// Handle a `StartGame` call.
///
/// The session is rejected while another controller is connected, when no
/// worker is registered, or when a resume request does not match the stored
/// snapshot. On success the controller loop is spawned and owns the session
/// until it ends.
pub(crate) async fn start_game(state: &Arc<BrokerState>, req: StartGameRequest) -> ServerResponse {
    info!(controller = %req.controller_address, "received request to start a game");

    let mut slot = state.controller.lock().await;
    if slot.is_some() {
        warn!("we already have a controller");
        return ServerResponse::rejected("broker already has a controller");
    }
    if state.worker_count() == 0 {
        warn!("no workers available");
        return ServerResponse::rejected("broker has no workers");
    }

    let conn = match RpcConnection::dial(&req.controller_address).await {
        Ok(conn) => Arc::new(conn),
        Err(err) => {
            warn!(controller = %req.controller_address, error = %err, "failed to dial controller back");
            return ServerResponse::rejected(format!("failed to connect to controller: {err}"));
        }
    };

    let (board, start_turn) = if req.start_new {
        match req.board.to_board() {
            Ok(board) if board.height() == req.height && board.width() == req.width => {
                info!(height = req.height, width = req.width, "starting a new game");
                (board, 0)
            }
            Ok(_) => return ServerResponse::rejected("initial board does not match its shape"),
            Err(err) => {
                return ServerResponse::rejected(format!("undecodable initial board: {err}"))
            }
        }
    } else {
        match state.snapshot() {
            None => {
                warn!("cannot resume: no previous board");
                return ServerResponse::rejected("cannot resume: no previous board");
            }
            Some(snapshot)
                if snapshot.board.height() != req.height
                    || snapshot.board.width() != req.width =>
            {
                warn!("cannot resume: controller has the wrong height and width");
                return ServerResponse::rejected(
                    "cannot resume: height and width do not match the previous game",
                );
            }
            Some(snapshot) => {
                info!(turn = snapshot.turn, "resuming previous game");
                (snapshot.board, snapshot.turn)
            }
        }
    };

    *slot = Some(conn.clone());
    drop(slot);

    let params = GameParams {
        height: req.height,
        width: req.width,
        max_turns: req.max_turns,
        threads: req.threads,
        visual_updates: req.visual_updates,
    };
    tokio::spawn(game::controller_loop(
        state.clone(),
        conn,
        board,
        start_turn,
        params,
    ));
    ServerResponse::ok("connected")
}
