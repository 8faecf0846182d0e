//! # Torus
//!
//! Conway's Game of Life as a distributed, fault-tolerant simulation: a
//! broker partitions the wrap-around board into halo-framed strips, a fleet
//! of stateless workers computes one turn per strip, and a single
//! controller session drives the game and feeds a presentation layer.
//!
//! This crate re-exports the pieces of the workspace; the `torus` binary in
//! `torus-cli` wires them into the three runnable roles.

pub use torus_core::{BitBoard, Board, Cell, CodecError, Fragment, GameState, Halo};

pub use torus_partition::{build_halo, commit_fragment, frag_height, strip_bounds, PartitionError};

pub use torus_comm::{
    Ack, AliveCellsReport, BoardStateReport, BrokerRequest, CommError, ControllerRequest,
    RpcConnection, ServerResponse, StartGameRequest, StateChangeReport, WorkerRequest,
    WorkerResponse,
};

pub use torus_worker::{compute_fragment, WorkerConfig};

pub use torus_broker::{BrokerState, Snapshot, WorkerHandle};

pub use torus_controller::{ControllerParams, Event};
