//! Boolean board with torus topology.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// A single cell coordinate. `x` is the column, `y` is the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub x: usize,
    pub y: usize,
}

/// Probability that a randomized cell comes up alive.
const RANDOMISE_RATIO: f32 = 0.2;

/// Rectangular grid of alive/dead cells. Both axes wrap, so every cell has
/// exactly eight neighbours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    rows: Vec<Vec<bool>>,
    width: usize,
}

impl Board {
    /// Create an all-dead board of the given shape.
    pub fn empty(height: usize, width: usize) -> Self {
        Self {
            rows: vec![vec![false; width]; height],
            width,
        }
    }

    /// Build a board from row data. Every row must have the same length.
    pub fn from_rows(rows: Vec<Vec<bool>>) -> Self {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        debug_assert!(rows.iter().all(|r| r.len() == width));
        Self { rows, width }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn get(&self, row: usize, col: usize) -> bool {
        self.rows[row][col]
    }

    pub fn set(&mut self, row: usize, col: usize, alive: bool) {
        self.rows[row][col] = alive;
    }

    pub fn rows(&self) -> &[Vec<bool>] {
        &self.rows
    }

    /// Overwrite rows `[start, start + src.len())` with the given row data.
    pub fn splice_rows(&mut self, start: usize, src: &[Vec<bool>]) {
        for (offset, row) in src.iter().enumerate() {
            self.rows[start + offset].copy_from_slice(row);
        }
    }

    /// Every live cell in row-major order.
    pub fn alive_cells(&self) -> Vec<Cell> {
        let mut alive = Vec::new();
        for (y, row) in self.rows.iter().enumerate() {
            for (x, &cell) in row.iter().enumerate() {
                if cell {
                    alive.push(Cell { x, y });
                }
            }
        }
        alive
    }

    pub fn alive_count(&self) -> usize {
        self.rows
            .iter()
            .map(|row| row.iter().filter(|&&c| c).count())
            .sum()
    }

    /// Re-seed the board in place: each cell is independently alive with
    /// probability 0.2. Sampling order is row-major so a seeded generator
    /// produces a reproducible board.
    pub fn randomise<R: Rng>(&mut self, rng: &mut R) {
        for row in &mut self.rows {
            for cell in row.iter_mut() {
                *cell = rng.gen::<f32>() < RANDOMISE_RATIO;
            }
        }
    }
}
