//! # Torus Core
//!
//! Core value types for the torus distributed Game of Life: the boolean
//! board with wrap-around topology, the bit-packed wire representation
//! shared by every role, and the pure cell-update kernel workers run over
//! halo strips.

pub mod bitboard;
pub mod board;
pub mod halo;
pub mod kernel;
pub mod state;

pub use bitboard::{BitBoard, CodecError};
pub use board::{Board, Cell};
pub use halo::{Fragment, Halo};
pub use kernel::{alive_neighbours, next_cell_state};
pub use state::GameState;
