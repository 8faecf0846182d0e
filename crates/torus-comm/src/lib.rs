//! # Torus Comm
//!
//! Network protocol for the torus distributed Game of Life. Every role
//! speaks length-prefixed bincode frames over TCP; each connection has a
//! single calling side that writes one request and awaits one response at a
//! time, which is all the turn loop ever needs.

pub mod frame;
pub mod messages;
pub mod rpc;

pub use frame::{read_frame, write_frame, MAX_FRAME_BYTES};
pub use messages::{
    Ack, AliveCellsReport, BoardStateReport, BrokerRequest, ControllerRequest, ServerResponse,
    StartGameRequest, StateChangeReport, WorkerRequest, WorkerResponse,
};
pub use rpc::RpcConnection;

/// Errors surfaced by the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum CommError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("frame of {0} bytes exceeds the size limit")]
    FrameTooLarge(usize),
}
