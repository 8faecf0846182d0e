//! Turn computation for one halo strip.

use torus_core::{kernel, BitBoard, CodecError, Fragment, Halo};

/// Compute one turn of the halo's body rows using up to `threads` parallel
/// sub-strips.
///
/// The body is split into `min(threads, body_rows)` contiguous sub-strips,
/// the last absorbing the remainder, so no sub-strip is ever empty. Each
/// sub-strip owns a disjoint slice of the output buffer; the only
/// synchronization is the scope join.
pub fn compute_fragment(halo: &Halo, threads: usize) -> Result<Fragment, CodecError> {
    halo.board.validate()?;

    let width = halo.board.row_length;
    let body = halo.body_rows();
    let mut rows = vec![vec![false; width]; body];

    if body > 0 {
        let workers = threads.clamp(1, body);
        let sub_height = body / workers;

        std::thread::scope(|scope| {
            let mut rest: &mut [Vec<bool>] = &mut rows;
            for i in 0..workers {
                let take = if i == workers - 1 { rest.len() } else { sub_height };
                let (chunk, tail) = rest.split_at_mut(take);
                rest = tail;
                let first_row = i * sub_height;
                scope.spawn(move || update_region(chunk, first_row, halo, width));
            }
        });
    }

    Ok(Fragment {
        board: BitBoard::from_rows(&rows, width),
        start_row: halo.start,
        end_row: halo.end,
    })
}

/// Fill `rows` with the next state of body rows starting at `first_row`.
/// The kernel row index is pre-adjusted by the halo offset so border rows
/// line up.
fn update_region(rows: &mut [Vec<bool>], first_row: usize, halo: &Halo, width: usize) {
    for (i, row) in rows.iter_mut().enumerate() {
        let y = first_row + i + halo.offset;
        for (x, cell) in row.iter_mut().enumerate().take(width) {
            *cell = kernel::next_cell_state(&halo.board, x, y);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use torus_core::Board;
    use torus_partition::build_halo;

    fn blinker_board() -> Board {
        // Vertical blinker at x=3, y=2..5 on an 8x8 board.
        let mut board = Board::empty(8, 8);
        board.set(2, 3, true);
        board.set(3, 3, true);
        board.set(4, 3, true);
        board
    }

    fn advance(board: &Board, workers: usize, threads: usize) -> Board {
        let mut next = Board::empty(board.height(), board.width());
        for i in 0..workers {
            let halo = build_halo(i, workers, board);
            let frag = compute_fragment(&halo, threads).unwrap();
            torus_partition::commit_fragment(&mut next, &frag).unwrap();
        }
        next
    }

    #[test]
    fn blinker_oscillates_on_a_single_strip() {
        let board = blinker_board();
        let after_one = advance(&board, 1, 4);

        let mut horizontal = Board::empty(8, 8);
        horizontal.set(3, 2, true);
        horizontal.set(3, 3, true);
        horizontal.set(3, 4, true);
        assert_eq!(after_one, horizontal);

        assert_eq!(advance(&after_one, 1, 4), board);
    }

    #[test]
    fn split_strips_agree_with_the_single_strip_result() {
        let mut board = Board::empty(12, 9);
        {
            use rand::SeedableRng;
            board.randomise(&mut rand::rngs::StdRng::seed_from_u64(3));
        }

        let reference = advance(&board, 1, 1);
        for workers in [2usize, 3, 4, 5] {
            for threads in [1usize, 4, 8] {
                assert_eq!(
                    advance(&board, workers, threads),
                    reference,
                    "k={workers} threads={threads}"
                );
            }
        }
    }

    #[test]
    fn more_threads_than_body_rows_is_normalized() {
        let board = blinker_board();
        let halo = build_halo(0, 4, &board); // body of 2 rows
        let frag = compute_fragment(&halo, 16).unwrap();
        assert_eq!(frag.board.num_rows, 2);
        assert_eq!((frag.start_row, frag.end_row), (0, 2));
    }

    #[test]
    fn zero_thread_request_still_computes() {
        let board = blinker_board();
        let halo = build_halo(0, 1, &board);
        let frag = compute_fragment(&halo, 0).unwrap();
        assert_eq!(frag.board.num_rows, 8);
    }

    #[test]
    fn corrupt_halo_is_rejected() {
        let rows = vec![vec![false; 8]; 4];
        let mut packed = BitBoard::from_rows(&rows, 8);
        packed.num_rows = 7; // length invariant now broken
        let halo = Halo {
            board: packed,
            offset: 1,
            start: 0,
            end: 2,
        };
        assert!(compute_fragment(&halo, 2).is_err());
    }
}
