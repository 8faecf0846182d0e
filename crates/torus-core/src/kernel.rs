//! The cell-update rule.
//!
//! Both functions read a bit-packed view directly and wrap indices on both
//! axes, so the same code serves a whole board (wrap supplies the
//! neighbours) and a bordered halo strip (the borders already hold the
//! neighbours and the row wrap never fires for body rows).

use crate::bitboard::BitBoard;

/// Count live cells in the 8-neighbourhood of `(x, y)`, wrapping both axes
/// into the view's bounds.
pub fn alive_neighbours(view: &BitBoard, x: usize, y: usize) -> u8 {
    let width = view.row_length as isize;
    let height = view.num_rows as isize;
    let mut count = 0;
    for dy in -1..=1_isize {
        for dx in -1..=1_isize {
            if dx == 0 && dy == 0 {
                continue;
            }
            let col = (x as isize + dx).rem_euclid(width) as usize;
            let row = (y as isize + dy).rem_euclid(height) as usize;
            if view.cell(row, col) {
                count += 1;
            }
        }
    }
    count
}

/// Next state for the cell at `(x, y)`: a live cell survives on two or
/// three neighbours, a dead cell births on exactly three.
pub fn next_cell_state(view: &BitBoard, x: usize, y: usize) -> bool {
    let neighbours = alive_neighbours(view, x, y);
    if view.cell(y, x) {
        neighbours == 2 || neighbours == 3
    } else {
        neighbours == 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view<const W: usize>(rows: &[[bool; W]]) -> BitBoard {
        let owned: Vec<Vec<bool>> = rows.iter().map(|r| r.to_vec()).collect();
        BitBoard::from_rows(&owned, W)
    }

    const T: bool = true;
    const F: bool = false;

    #[test]
    fn lonely_cell_dies() {
        let v = view(&[[F, F, F], [F, T, F], [F, F, F]]);
        assert!(!next_cell_state(&v, 1, 1));
    }

    #[test]
    fn survival_on_two_or_three_neighbours() {
        let two = view(&[[T, F, F], [F, T, F], [F, F, T]]);
        assert_eq!(alive_neighbours(&two, 1, 1), 2);
        assert!(next_cell_state(&two, 1, 1));

        let three = view(&[[T, T, F], [F, T, F], [F, F, T]]);
        assert_eq!(alive_neighbours(&three, 1, 1), 3);
        assert!(next_cell_state(&three, 1, 1));
    }

    #[test]
    fn birth_on_exactly_three() {
        let v = view(&[[T, T, F], [F, F, F], [F, T, F]]);
        assert_eq!(alive_neighbours(&v, 1, 1), 3);
        assert!(next_cell_state(&v, 1, 1));
    }

    #[test]
    fn overcrowded_cell_dies() {
        let v = view(&[[T, T, T], [T, T, F], [F, F, F]]);
        assert!(!next_cell_state(&v, 1, 1));
    }

    #[test]
    fn neighbour_count_wraps_both_axes() {
        // A corner cell on a 3x3 view sees the opposite corners.
        let v = view(&[[T, F, T], [F, F, F], [T, F, T]]);
        assert_eq!(alive_neighbours(&v, 0, 0), 3);
    }

    #[test]
    fn full_tiny_torus_dies_out() {
        // On a wrapped 4x4 board every cell has 8 live neighbours.
        let rows = vec![vec![T; 4]; 4];
        let v = BitBoard::from_rows(&rows, 4);
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(alive_neighbours(&v, x, y), 8);
                assert!(!next_cell_state(&v, x, y));
            }
        }
    }
}
