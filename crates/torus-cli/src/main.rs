//! # Torus CLI
//!
//! One binary, three roles. `torus broker` runs the central node,
//! `torus worker` a compute node, and `torus controller` the interactive
//! session. The controller here is headless: events are logged rather than
//! drawn, and keypresses (`q p s k r`) are read line-wise from stdin.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use torus_controller::{ControllerParams, Event};
use torus_worker::WorkerConfig;

#[derive(Parser)]
#[command(name = "torus", about = "Distributed Game of Life", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the central broker.
    Broker {
        /// Port to listen on.
        #[arg(short, default_value_t = 8020)]
        port: u16,
    },

    /// Run a compute worker.
    Worker {
        /// Port to listen on.
        #[arg(short, default_value_t = 8020)]
        port: u16,

        /// Broker address to register with.
        #[arg(short, default_value = "localhost:8030")]
        server: String,

        /// Advertise localhost instead of a routable interface address.
        #[arg(long)]
        localhost: bool,
    },

    /// Run the interactive controller.
    #[command(disable_help_flag = true)]
    Controller {
        /// Compute threads each worker uses per turn.
        #[arg(short, default_value_t = 8)]
        threads: usize,

        /// Board width.
        #[arg(short, default_value_t = 512)]
        width: usize,

        /// Board height.
        #[arg(short = 'h', default_value_t = 512)]
        height: usize,

        /// Number of turns to process.
        #[arg(long, default_value_t = 10_000_000_000)]
        turns: u64,

        /// Broker address to dial.
        #[arg(long, default_value = "localhost:8030")]
        server: String,

        /// Port the broker calls us back on.
        #[arg(long, default_value_t = 8030)]
        port: u16,

        /// Emit per-turn visual updates.
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        sdl: bool,

        /// Resume the broker's previous game instead of loading a board.
        #[arg(long)]
        resume: bool,

        /// Directory containing board files.
        #[arg(long, default_value = "images")]
        images: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Broker { port } => torus_broker::run(port)
            .await
            .map_err(|err| err.to_string()),
        Commands::Worker {
            port,
            server,
            localhost,
        } => torus_worker::run(WorkerConfig {
            port,
            broker_addr: server,
            localhost,
        })
        .await
        .map_err(|err| err.to_string()),
        Commands::Controller {
            threads,
            width,
            height,
            turns,
            server,
            port,
            sdl,
            resume,
            images,
        } => {
            run_controller(ControllerParams {
                threads,
                width,
                height,
                turns,
                broker_addr: server,
                port,
                our_host: "localhost".into(),
                visual_updates: sdl,
                resume,
                image_dir: images,
            })
            .await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "exiting with failure");
            ExitCode::FAILURE
        }
    }
}

async fn run_controller(params: ControllerParams) -> Result<(), String> {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (keys_tx, keys_rx) = mpsc::channel(10);

    tokio::spawn(log_events(events_rx));
    tokio::spawn(read_keys(keys_tx));

    torus_controller::run(params, events_tx, keys_rx)
        .await
        .map_err(|err| err.to_string())
}

/// Headless stand-in for the SDL window: narrate the event stream.
async fn log_events(mut events: mpsc::UnboundedReceiver<Event>) {
    while let Some(event) = events.recv().await {
        match event {
            // Cell-level flips are too chatty for a terminal.
            Event::CellFlipped { .. } => {}
            Event::TurnComplete { completed_turns } => {
                debug!(turn = completed_turns, "turn complete");
            }
            Event::AliveCellsCount {
                completed_turns,
                cells_count,
            } => {
                info!(turn = completed_turns, alive = cells_count, "alive cells");
            }
            Event::StateChange {
                completed_turns,
                new_state,
            } => {
                info!(turn = completed_turns, state = %new_state, "state change");
            }
            Event::FinalTurnComplete {
                completed_turns,
                alive,
            } => {
                info!(
                    turn = completed_turns,
                    alive = alive.len(),
                    "final turn complete"
                );
            }
        }
    }
}

/// Forward the first character of each stdin line as a keypress.
async fn read_keys(keys: mpsc::Sender<char>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(key) = line.trim().chars().next() {
            if keys.send(key).await.is_err() {
                return;
            }
        }
    }
    // Keep the channel open after stdin EOF so a piped invocation does not
    // end the session early.
    std::future::pending::<()>().await;
}
