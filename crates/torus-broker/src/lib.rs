//! # Torus Broker
//!
//! The central node of the simulation. It registers workers, accepts one
//! controller session at a time, and owns the authoritative board between
//! turns. Each turn is partitioned into halo strips, dispatched to every
//! registered worker in parallel, gathered, and committed; a failed worker
//! is dropped from the set and the turn retried with the survivors.

pub mod game;
pub mod membership;
pub mod session;
pub mod state;

pub use state::{BrokerState, Snapshot, WorkerHandle};

use std::io::ErrorKind;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use torus_comm::{read_frame, write_frame, BrokerRequest, CommError, ServerResponse};

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("failed to bind broker listener: {0}")]
    Bind(std::io::Error),
    #[error("broker accept loop failed: {0}")]
    Accept(std::io::Error),
}

/// Bind the broker's listener and serve until a `k` keypress stops it.
pub async fn run(port: u16) -> Result<(), BrokerError> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(BrokerError::Bind)?;
    serve(listener, Arc::new(BrokerState::new())).await
}

/// Serve an already-bound listener. Split out so tests can bind an
/// ephemeral port and keep a handle on the state.
pub async fn serve(listener: TcpListener, state: Arc<BrokerState>) -> Result<(), BrokerError> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "broker listening");
    }
    let mut shutdown = state.subscribe_shutdown();
    loop {
        tokio::select! {
            _ = shutdown.wait_for(|&stop| stop) => {
                info!("broker closed");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "peer connected");
                    tokio::spawn(handle_connection(stream, state.clone()));
                }
                Err(err) => return Err(BrokerError::Accept(err)),
            },
        }
    }
}

/// Serve broker calls on one inbound connection (a worker's registration
/// link or the controller's command link).
async fn handle_connection(mut stream: TcpStream, state: Arc<BrokerState>) {
    loop {
        let request: BrokerRequest = match read_frame(&mut stream).await {
            Ok(request) => request,
            Err(CommError::Io(ref err)) if err.kind() == ErrorKind::UnexpectedEof => {
                debug!("peer hung up");
                return;
            }
            Err(err) => {
                warn!(error = %err, "unreadable frame, dropping connection");
                return;
            }
        };

        let response = match request {
            BrokerRequest::StartGame(req) => session::start_game(&state, req).await,
            BrokerRequest::RegisterKeypress { key } => {
                debug!(key = %key, "received keypress request");
                state.push_keypress(key);
                ServerResponse::ok("registered")
            }
            BrokerRequest::ConnectWorker { worker_address } => {
                state.connect_worker(&worker_address).await
            }
            BrokerRequest::Ping => ServerResponse::ok("pong"),
        };

        if write_frame(&mut stream, &response).await.is_err() {
            return;
        }
    }
}
