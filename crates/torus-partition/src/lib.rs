//! # Torus Partition
//!
//! Splits the board into horizontal strips for the worker fleet and stitches
//! the returned fragments back together. Each strip is framed with the wrap
//! rows its body needs, so a worker computes a turn without knowing the rest
//! of the board.
//!
//! The division is `frag_height = height / workers` with the last strip
//! absorbing the remainder. Row ranges are therefore contiguous, pairwise
//! disjoint, and cover `[0, height)`; the commit path relies on all three.

use torus_core::{BitBoard, Board, CodecError, Fragment, Halo};

/// Errors raised while stitching a worker's fragment into the next board.
#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("fragment rows {start}..{end} do not fit a board of height {height}")]
    RowRangeOutOfBounds {
        start: usize,
        end: usize,
        height: usize,
    },
    #[error("fragment claims rows {start}..{end} but carries {rows} rows")]
    RowCountMismatch {
        start: usize,
        end: usize,
        rows: usize,
    },
    #[error("fragment is {actual} cells wide, board is {expected}")]
    WidthMismatch { expected: usize, actual: usize },
}

/// Body height of every strip but the last.
pub fn frag_height(height: usize, workers: usize) -> usize {
    height / workers
}

/// Body row range `[start, end)` of strip `index` out of `workers`.
pub fn strip_bounds(index: usize, workers: usize, height: usize) -> (usize, usize) {
    let frag = frag_height(height, workers);
    let start = index * frag;
    let end = if index == workers - 1 {
        height
    } else {
        (index + 1) * frag
    };
    (start, end)
}

/// Build the halo for strip `index` out of `workers` from the current board.
///
/// The row above the body is included as a leading border unless the strip
/// already spans the whole board, in which case the kernel's own wrapping
/// reaches the neighbours and the offset stays 0. The row below is appended
/// unless it coincides with the strip's first row.
pub fn build_halo(index: usize, workers: usize, board: &Board) -> Halo {
    let height = board.height();
    let (start, end) = strip_bounds(index, workers, height);

    if start == end {
        // Degenerate strip from height < workers; the last strip owns
        // every row.
        return Halo {
            board: BitBoard::from_rows(&[], board.width()),
            offset: 0,
            start,
            end,
        };
    }

    let up_ptr = (start + height - 1) % height;
    let down_ptr = end % height;
    let whole_board = end - start == height;

    let mut rows: Vec<Vec<bool>> = Vec::with_capacity(end - start + 2);
    let mut offset = 0;
    if !whole_board {
        rows.push(board.rows()[up_ptr].clone());
        offset = 1;
    }
    rows.extend_from_slice(&board.rows()[start..end]);
    if down_ptr != start {
        rows.push(board.rows()[down_ptr].clone());
    }

    Halo {
        board: BitBoard::from_rows(&rows, board.width()),
        offset,
        start,
        end,
    }
}

/// Copy a fragment's body rows into `next`. Fragments from one turn have
/// disjoint row ranges, so commits may land in any order.
pub fn commit_fragment(next: &mut Board, frag: &Fragment) -> Result<(), PartitionError> {
    if frag.end_row < frag.start_row || frag.end_row > next.height() {
        return Err(PartitionError::RowRangeOutOfBounds {
            start: frag.start_row,
            end: frag.end_row,
            height: next.height(),
        });
    }
    if !frag.row_range_matches() {
        return Err(PartitionError::RowCountMismatch {
            start: frag.start_row,
            end: frag.end_row,
            rows: frag.board.num_rows,
        });
    }
    if frag.board.row_length != next.width() {
        return Err(PartitionError::WidthMismatch {
            expected: next.width(),
            actual: frag.board.row_length,
        });
    }
    let rows = frag.board.to_rows()?;
    next.splice_rows(frag.start_row, &rows);
    Ok(())
}
