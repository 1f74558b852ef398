//! Rule engines for tic-tac-toe and four-in-a-row.
//!
//! Both engines are pure functions over a [`Board`]. Every client evaluates
//! them after every move it applies, local or remote, so the two players of a
//! game reach the same verdict without a referee.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::{Cell, Outcome, Player};
use crate::{FOUR_IN_A_ROW_COLS, FOUR_IN_A_ROW_ROWS, TICTACTOE_SIZE};

/// Why a placement was refused. The board is never mutated when this is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("cell ({row}, {col}) is outside the board")]
    OutOfBounds { row: usize, col: usize },
    #[error("cell ({row}, {col}) is already taken")]
    Occupied { row: usize, col: usize },
    #[error("column {col} is full")]
    ColumnFull { col: usize },
}

/// Row-major grid of cells. Row 0 is the top row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    rows: usize,
    cols: usize,
    cells: Vec<Cell>,
}

impl Board {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![Cell::Empty; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns the cell at (`row`, `col`), or `None` outside the board.
    pub fn get(&self, row: usize, col: usize) -> Option<Cell> {
        if row < self.rows && col < self.cols {
            Some(self.cells[row * self.cols + col])
        } else {
            None
        }
    }

    /// Marks an empty in-bounds cell for `player`.
    pub fn place(&mut self, row: usize, col: usize, player: Player) -> Result<(), PlacementError> {
        match self.get(row, col) {
            None => Err(PlacementError::OutOfBounds { row, col }),
            Some(Cell::Empty) => {
                self.cells[row * self.cols + col] = Cell::from(player);
                Ok(())
            }
            Some(_) => Err(PlacementError::Occupied { row, col }),
        }
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(|cell| !cell.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|cell| cell.is_empty())
    }

    /// Empties every cell. Only a confirmed reset may call this.
    pub fn clear(&mut self) {
        self.cells.fill(Cell::Empty);
    }

    /// Number of marks each player has on the board, as (player one, player two).
    pub fn mark_counts(&self) -> (usize, usize) {
        self.cells.iter().fold((0, 0), |(one, two), cell| match cell {
            Cell::Player1 => (one + 1, two),
            Cell::Player2 => (one, two + 1),
            Cell::Empty => (one, two),
        })
    }
}

/// Game-specific placement and verdict rules.
///
/// `resolve_target` maps the cell a player asked for onto the cell the piece
/// actually occupies (gravity, for four-in-a-row), and `evaluate` decides
/// whether the move that just landed on (`row`, `col`) ended the game.
pub trait RuleEngine: Send + Sync {
    fn rows(&self) -> usize;
    fn cols(&self) -> usize;

    fn new_board(&self) -> Board {
        Board::new(self.rows(), self.cols())
    }

    fn resolve_target(
        &self,
        board: &Board,
        row: usize,
        col: usize,
    ) -> Result<(usize, usize), PlacementError>;

    fn evaluate(&self, board: &Board, row: usize, col: usize, player: Player) -> Option<Outcome>;
}

/// The eight winning lines of a 3×3 board.
const TICTACTOE_LINES: [[(usize, usize); 3]; 8] = [
    [(0, 0), (0, 1), (0, 2)],
    [(1, 0), (1, 1), (1, 2)],
    [(2, 0), (2, 1), (2, 2)],
    [(0, 0), (1, 0), (2, 0)],
    [(0, 1), (1, 1), (2, 1)],
    [(0, 2), (1, 2), (2, 2)],
    [(0, 0), (1, 1), (2, 2)],
    [(0, 2), (1, 1), (2, 0)],
];

/// Returns true if `player` holds any full row, column or diagonal of a 3×3 board.
pub fn check_win(board: &Board, player: Player) -> bool {
    let mark = Cell::from(player);
    TICTACTOE_LINES.iter().any(|line| {
        line.iter()
            .all(|&(row, col)| board.get(row, col) == Some(mark))
    })
}

/// Lowest empty row of `col`, i.e. where a dropped piece comes to rest.
pub fn drop_row(board: &Board, col: usize) -> Option<usize> {
    if col >= board.cols() {
        return None;
    }
    (0..board.rows())
        .rev()
        .find(|&row| board.get(row, col) == Some(Cell::Empty))
}

/// Counts consecutive `player` marks starting one step away from (`row`, `col`).
fn count_direction(
    board: &Board,
    row: usize,
    col: usize,
    d_row: isize,
    d_col: isize,
    player: Player,
) -> usize {
    let mark = Cell::from(player);
    let mut count = 0;
    let mut r = row as isize + d_row;
    let mut c = col as isize + d_col;

    while r >= 0 && c >= 0 && board.get(r as usize, c as usize) == Some(mark) {
        count += 1;
        r += d_row;
        c += d_col;
    }
    count
}

/// Returns true if the piece at (`row`, `col`) completes four in a row for `player`.
///
/// Runs are counted outward on both sides of the placed cell along each of the
/// four axes; three neighbours plus the placed piece make four.
pub fn connects_four(board: &Board, row: usize, col: usize, player: Player) -> bool {
    const AXES: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

    AXES.iter().any(|&(d_row, d_col)| {
        count_direction(board, row, col, d_row, d_col, player)
            + count_direction(board, row, col, -d_row, -d_col, player)
            >= 3
    })
}

/// 3×3 tic-tac-toe.
#[derive(Debug, Clone, Copy, Default)]
pub struct TicTacToeRules;

impl RuleEngine for TicTacToeRules {
    fn rows(&self) -> usize {
        TICTACTOE_SIZE
    }

    fn cols(&self) -> usize {
        TICTACTOE_SIZE
    }

    fn resolve_target(
        &self,
        board: &Board,
        row: usize,
        col: usize,
    ) -> Result<(usize, usize), PlacementError> {
        match board.get(row, col) {
            None => Err(PlacementError::OutOfBounds { row, col }),
            Some(Cell::Empty) => Ok((row, col)),
            Some(_) => Err(PlacementError::Occupied { row, col }),
        }
    }

    fn evaluate(&self, board: &Board, _row: usize, _col: usize, player: Player) -> Option<Outcome> {
        if check_win(board, player) {
            Some(Outcome::Win(player))
        } else if board.is_full() {
            Some(Outcome::Draw)
        } else {
            None
        }
    }
}

/// 6×7 four-in-a-row with gravity.
#[derive(Debug, Clone, Copy, Default)]
pub struct FourInARowRules;

impl RuleEngine for FourInARowRules {
    fn rows(&self) -> usize {
        FOUR_IN_A_ROW_ROWS
    }

    fn cols(&self) -> usize {
        FOUR_IN_A_ROW_COLS
    }

    /// The requested row is ignored: pieces fall to the lowest empty row.
    fn resolve_target(
        &self,
        board: &Board,
        row: usize,
        col: usize,
    ) -> Result<(usize, usize), PlacementError> {
        if col >= board.cols() {
            return Err(PlacementError::OutOfBounds { row, col });
        }
        drop_row(board, col)
            .map(|landing| (landing, col))
            .ok_or(PlacementError::ColumnFull { col })
    }

    fn evaluate(&self, board: &Board, row: usize, col: usize, player: Player) -> Option<Outcome> {
        if connects_four(board, row, col, player) {
            Some(Outcome::Win(player))
        } else if board.is_full() {
            Some(Outcome::Draw)
        } else {
            None
        }
    }
}
