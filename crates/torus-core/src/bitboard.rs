//! Bit-packed board representation used on the wire.
//!
//! Cells are packed row-major, eight per byte, most significant bit first.
//! Rows are padded to a byte boundary independently, so the byte length is
//! always `num_rows * ceil(row_length / 8)`. The same bytes serve as both
//! the transport form and an in-memory read-only view; callers decode to
//! row vectors only when they need mutable cell access.

use serde::{Deserialize, Serialize};

use crate::board::Board;

/// Violations of the bit-board length invariant.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error(
        "bit board has {actual} bytes but {num_rows} rows of {row_length} cells require {expected}"
    )]
    LengthMismatch {
        num_rows: usize,
        row_length: usize,
        expected: usize,
        actual: usize,
    },
}

/// A bit-packed rectangular cell region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitBoard {
    pub num_rows: usize,
    pub row_length: usize,
    bytes: Vec<u8>,
}

impl BitBoard {
    /// Pack row data. Rows shorter than `row_length` are padded with dead
    /// cells; longer rows are truncated.
    pub fn from_rows(rows: &[Vec<bool>], row_length: usize) -> Self {
        let stride = row_stride(row_length);
        let mut bytes = vec![0u8; rows.len() * stride];
        for (row, cells) in rows.iter().enumerate() {
            for (col, &alive) in cells.iter().take(row_length).enumerate() {
                if alive {
                    bytes[row * stride + col / 8] |= 0x80 >> (col % 8);
                }
            }
        }
        Self {
            num_rows: rows.len(),
            row_length,
            bytes,
        }
    }

    /// Pack a whole board.
    pub fn from_board(board: &Board) -> Self {
        Self::from_rows(board.rows(), board.width())
    }

    /// Check the byte-length invariant. Receivers run this before reading
    /// cells out of an untrusted frame.
    pub fn validate(&self) -> Result<(), CodecError> {
        let expected = self.num_rows * row_stride(self.row_length);
        if self.bytes.len() != expected {
            return Err(CodecError::LengthMismatch {
                num_rows: self.num_rows,
                row_length: self.row_length,
                expected,
                actual: self.bytes.len(),
            });
        }
        Ok(())
    }

    /// Read a single cell. `row` and `col` must be in range.
    #[inline]
    pub fn cell(&self, row: usize, col: usize) -> bool {
        let byte = self.bytes[row * row_stride(self.row_length) + col / 8];
        byte & (0x80 >> (col % 8)) != 0
    }

    /// Unpack into row vectors.
    pub fn to_rows(&self) -> Result<Vec<Vec<bool>>, CodecError> {
        self.validate()?;
        let mut rows = Vec::with_capacity(self.num_rows);
        for row in 0..self.num_rows {
            let mut cells = Vec::with_capacity(self.row_length);
            for col in 0..self.row_length {
                cells.push(self.cell(row, col));
            }
            rows.push(cells);
        }
        Ok(rows)
    }

    /// Unpack into a full board.
    pub fn to_board(&self) -> Result<Board, CodecError> {
        Ok(Board::from_rows(self.to_rows()?))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[inline]
fn row_stride(row_length: usize) -> usize {
    (row_length + 7) / 8
}
