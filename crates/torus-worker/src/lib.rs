//! # Torus Worker
//!
//! A stateless compute node. On start it registers with the broker, which
//! dials back to this worker's listener and drives it with `DoTurn` calls.
//! A ping pump probes the broker every ten seconds and re-registers after a
//! lost connection. The worker keeps no game state between turns; all it
//! owns is the kernel fan-out in [`compute`].

pub mod compute;

pub use compute::compute_fragment;

use std::io::ErrorKind;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use torus_comm::{
    read_frame, write_frame, BrokerRequest, CommError, RpcConnection, ServerResponse,
    WorkerRequest, WorkerResponse,
};

/// How often a registered worker probes the broker.
const PING_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Port to listen on. 0 picks an ephemeral port.
    pub port: u16,
    /// Broker address to register with.
    pub broker_addr: String,
    /// Advertise `localhost` instead of a routable interface address.
    pub localhost: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("failed to bind worker listener: {0}")]
    Bind(std::io::Error),
    #[error("could not determine an advertisable address: {0}")]
    Address(std::io::Error),
    #[error(transparent)]
    Comm(#[from] CommError),
    #[error("broker rejected registration: {0}")]
    Rejected(String),
}

/// Run a worker until the broker tells it to shut down.
pub async fn run(config: WorkerConfig) -> Result<(), WorkerError> {
    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .map_err(WorkerError::Bind)?;
    let port = listener.local_addr().map_err(WorkerError::Bind)?.port();
    let advertised = advertised_address(&config, port)?;
    info!(address = %advertised, broker = %config.broker_addr, "worker starting");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(accept_loop(listener, shutdown_tx.clone(), shutdown_rx.clone()));

    let mut broker = match register(&config.broker_addr, &advertised).await {
        Ok(conn) => Some(conn),
        Err(err) => {
            warn!(error = %err, "initial registration failed, will retry");
            None
        }
    };

    let mut shutdown = shutdown_rx;
    let mut ticker = tokio::time::interval(PING_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // the first tick completes immediately

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("worker shutting down");
                    return Ok(());
                }
            }
            _ = ticker.tick() => match &broker {
                Some(conn) => {
                    let pong: Result<ServerResponse, _> = conn.call(&BrokerRequest::Ping).await;
                    if let Err(err) = pong {
                        warn!(error = %err, "lost connection to broker");
                        broker = None;
                    }
                }
                None => match register(&config.broker_addr, &advertised).await {
                    Ok(conn) => broker = Some(conn),
                    Err(err) => debug!(error = %err, "reconnect attempt failed"),
                },
            },
        }
    }
}

/// Dial the broker and announce our listening address. The broker dials
/// back before replying, so a success means we are in its worker set.
async fn register(broker_addr: &str, advertised: &str) -> Result<RpcConnection, WorkerError> {
    let conn = RpcConnection::dial(broker_addr).await?;
    let response: ServerResponse = conn
        .call(&BrokerRequest::ConnectWorker {
            worker_address: advertised.to_string(),
        })
        .await?;
    if !response.success {
        return Err(WorkerError::Rejected(response.message));
    }
    info!(broker = broker_addr, "registered with broker");
    Ok(conn)
}

async fn accept_loop(
    listener: TcpListener,
    shutdown_tx: watch::Sender<bool>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.wait_for(|&stop| stop) => return,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "broker connected");
                    tokio::spawn(serve_broker(stream, shutdown_tx.clone()));
                }
                Err(err) => {
                    error!(error = %err, "accept failed");
                    return;
                }
            },
        }
    }
}

/// Serve `DoTurn`/`Shutdown` frames on one dialed-back broker connection.
async fn serve_broker(mut stream: TcpStream, shutdown_tx: watch::Sender<bool>) {
    loop {
        let request: WorkerRequest = match read_frame(&mut stream).await {
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

        match request {
            WorkerRequest::DoTurn { halo, threads } => {
                let computed =
                    tokio::task::spawn_blocking(move || compute_fragment(&halo, threads)).await;
                match computed {
                    Ok(Ok(fragment)) => {
                        if write_frame(&mut stream, &WorkerResponse::Turn(fragment))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Ok(Err(err)) => {
                        // An undecodable halo means the protocol itself has
                        // broken down; the broker will see the dropped
                        // connection as a failed turn.
                        error!(error = %err, "halo failed validation, stopping worker");
                        let _ = shutdown_tx.send(true);
                        return;
                    }
                    Err(_) => {
                        error!("turn computation panicked, stopping worker");
                        let _ = shutdown_tx.send(true);
                        return;
                    }
                }
            }
            WorkerRequest::Shutdown => {
                info!("broker requested shutdown");
                let _ = write_frame(&mut stream, &WorkerResponse::ShuttingDown).await;
                let _ = shutdown_tx.send(true);
                return;
            }
        }
    }
}

fn advertised_address(config: &WorkerConfig, port: u16) -> Result<String, WorkerError> {
    if config.localhost {
        return Ok(format!("localhost:{port}"));
    }
    // The local address of a datagram socket "connected" towards the broker
    // is the interface address peers can dial us back on.
    let probe = std::net::UdpSocket::bind("0.0.0.0:0").map_err(WorkerError::Address)?;
    probe
        .connect(&config.broker_addr)
        .map_err(WorkerError::Address)?;
    let ip = probe.local_addr().map_err(WorkerError::Address)?.ip();
    Ok(format!("{ip}:{port}"))
}
