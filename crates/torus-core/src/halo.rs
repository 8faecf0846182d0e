//! Strip types exchanged between the broker and its workers.

use serde::{Deserialize, Serialize};

use crate::bitboard::BitBoard;

/// One worker's input for a turn: a bit-packed strip of body rows framed by
/// the border rows needed to compute them.
///
/// `offset` is 1 when a top border row precedes the body and 0 when the
/// strip is the whole board. `start` and `end` are the body's row range in
/// global coordinates; when the range spans the full board the wrap rows
/// fold onto the body itself and the kernel's own wrapping supplies the
/// neighbours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Halo {
    pub board: BitBoard,
    pub offset: usize,
    pub start: usize,
    pub end: usize,
}

impl Halo {
    /// Number of body rows the worker must produce.
    pub fn body_rows(&self) -> usize {
        self.end - self.start
    }
}

/// One worker's reply: the recomputed body rows only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub board: BitBoard,
    pub start_row: usize,
    pub end_row: usize,
}

impl Fragment {
    /// A fragment must carry exactly the rows its range claims.
    pub fn row_range_matches(&self) -> bool {
        self.end_row - self.start_row == self.board.num_rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_row_range_check() {
        let rows = vec![vec![false; 8]; 3];
        let frag = Fragment {
            board: BitBoard::from_rows(&rows, 8),
            start_row: 4,
            end_row: 7,
        };
        assert!(frag.row_range_matches());

        let short = Fragment {
            board: BitBoard::from_rows(&rows[..2], 8),
            start_row: 4,
            end_row: 7,
        };
        assert!(!short.row_range_matches());
    }
}
