// 🔲 Grid Model - 25 positional goals → 5×5 completion matrix

use crate::card::Goal;
use crate::error::{BingoError, Result};

pub const GRID_SIZE: usize = 5;
pub const CELL_COUNT: usize = GRID_SIZE * GRID_SIZE;

/// Position of the free space (center cell)
pub const FREE_SPACE_POSITION: usize = 12;

/// `cells[row][col]` is the completion flag of the goal at `row * 5 + col`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Grid {
    cells: [[bool; GRID_SIZE]; GRID_SIZE],
}

impl Grid {
    /// Build the grid from a card's goals.
    ///
    /// The store always holds 25 unique positions per card; this still
    /// rejects a short, colliding or out-of-range set.
    pub fn from_goals(goals: &[Goal]) -> Result<Self> {
        let mut grid = Grid::default();
        let mut seen = [false; CELL_COUNT];

        for goal in goals {
            let position = goal.position;
            if position >= CELL_COUNT {
                return Err(BingoError::Internal(format!(
                    "goal {} has position {} outside the grid",
                    goal.id, position
                )));
            }
            if seen[position] {
                return Err(BingoError::Internal(format!(
                    "two goals share position {}",
                    position
                )));
            }
            seen[position] = true;
            grid.set(position, goal.is_completed);
        }

        let represented = seen.iter().filter(|&&s| s).count();
        if represented != CELL_COUNT {
            return Err(BingoError::Internal(format!(
                "expected {} goal positions, found {}",
                CELL_COUNT, represented
            )));
        }

        Ok(grid)
    }

    /// Grid with exactly the given positions marked. Out-of-range positions
    /// are ignored.
    pub fn from_marked_positions(positions: impl IntoIterator<Item = usize>) -> Self {
        let mut grid = Grid::default();
        for position in positions.into_iter().filter(|&p| p < CELL_COUNT) {
            grid.set(position, true);
        }
        grid
    }

    pub fn cell(&self, row: usize, col: usize) -> bool {
        self.cells[row][col]
    }

    pub fn is_marked(&self, position: usize) -> bool {
        position < CELL_COUNT && self.cells[position / GRID_SIZE][position % GRID_SIZE]
    }

    pub fn marked_count(&self) -> usize {
        self.cells.iter().flatten().filter(|&&c| c).count()
    }

    fn set(&mut self, position: usize, marked: bool) {
        self.cells[position / GRID_SIZE][position % GRID_SIZE] = marked;
    }
}
