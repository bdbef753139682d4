//! fourline Board Engine
//!
//! This crate contains the grid rules of the game and the deterministic
//! column-choice policy used for the automated seat.
//!
//! # Architecture Constraints
//!
//! The engine MUST NOT:
//! - Perform I/O operations (file, network, etc.)
//! - Read wall-clock time
//! - Use randomness of any kind
//! - Hold process-wide mutable state
//!
//! Every operation works on a `Board` value owned by the caller. Mutation only
//! happens through `Board::drop_disc`, which takes `&mut self`.

#![deny(unsafe_code)]

pub mod policy;

pub use policy::{CENTER_OUT, choose_column};

// ============================================================================
// Geometry
// ============================================================================

/// Number of rows on the board. Row 0 is the top row.
pub const ROWS: usize = 6;

/// Number of columns on the board.
pub const COLS: usize = 7;

/// Length of a winning run.
pub const CONNECT: usize = 4;

/// Scan directions as (row delta, column delta): horizontal, vertical and
/// the two diagonals.
const DIRECTIONS: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

// ============================================================================
// Seat
// ============================================================================

/// One of the two fixed positions in a game.
///
/// Seat order alone decides who moves first: `Seat::One` always opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Seat {
    One,
    Two,
}

impl Seat {
    /// Both seats in move order.
    pub const ALL: [Seat; 2] = [Seat::One, Seat::Two];

    /// The opposing seat.
    pub fn other(self) -> Seat {
        match self {
            Seat::One => Seat::Two,
            Seat::Two => Seat::One,
        }
    }

    /// Wire number of the seat (1 or 2).
    pub fn number(self) -> u32 {
        match self {
            Seat::One => 1,
            Seat::Two => 2,
        }
    }

    /// Parse a wire seat number.
    pub fn from_number(number: u32) -> Option<Seat> {
        match number {
            1 => Some(Seat::One),
            2 => Some(Seat::Two),
            _ => None,
        }
    }

    /// Zero-based index, handy for `[T; 2]` seat tables.
    pub fn index(self) -> usize {
        match self {
            Seat::One => 0,
            Seat::Two => 1,
        }
    }
}

// ============================================================================
// Placement
// ============================================================================

/// Where a disc landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub seat: Seat,
    pub row: usize,
    pub column: usize,
}

// ============================================================================
// Board
// ============================================================================

/// A 6x7 grid under gravity.
///
/// Invariants:
/// - an occupied cell never reverts to empty
/// - every column is filled bottom-up, so no empty cell sits below a disc
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Board {
    cells: [[Option<Seat>; COLS]; ROWS],
}

impl Board {
    /// Create an empty board.
    pub fn new() -> Self {
        Self {
            cells: [[None; COLS]; ROWS],
        }
    }

    /// Cell content at (row, column). Out-of-range coordinates read as empty.
    pub fn get(&self, row: usize, column: usize) -> Option<Seat> {
        self.cells
            .get(row)
            .and_then(|r| r.get(column))
            .copied()
            .flatten()
    }

    /// True if `column` exists and has no empty cell left.
    pub fn is_column_full(&self, column: usize) -> bool {
        column < COLS && self.cells[0][column].is_some()
    }

    /// Drop a disc for `seat` into `column`.
    ///
    /// Returns the landing position, or `None` when the column is full or
    /// does not exist. A `None` leaves the board untouched.
    pub fn drop_disc(&mut self, column: usize, seat: Seat) -> Option<Placement> {
        if column >= COLS {
            return None;
        }

        let row = (0..ROWS).rev().find(|&r| self.cells[r][column].is_none())?;
        self.cells[row][column] = Some(seat);

        Some(Placement { seat, row, column })
    }

    /// True iff the top row has no empty cell.
    ///
    /// Gravity guarantees that a full top row means a full board.
    pub fn is_full(&self) -> bool {
        self.cells[0].iter().all(Option::is_some)
    }

    /// Columns that still accept a disc, ascending.
    pub fn open_columns(&self) -> impl Iterator<Item = usize> + '_ {
        (0..COLS).filter(|&c| !self.is_column_full(c))
    }

    /// Number of discs on the board.
    pub fn disc_count(&self) -> usize {
        self.cells.iter().flatten().filter(|c| c.is_some()).count()
    }

    /// Find a seat owning at least `CONNECT` contiguous discs on one line.
    ///
    /// Every occupied cell is used as a run start and walked in the four
    /// directions; runs longer than `CONNECT` are found the same way since
    /// only the existence of a qualifying run matters. The scan order is
    /// fixed, so the answer is deterministic even on boards (never reached
    /// in play) where both seats own a run.
    pub fn winner(&self) -> Option<Seat> {
        for row in 0..ROWS {
            for column in 0..COLS {
                let Some(seat) = self.cells[row][column] else {
                    continue;
                };
                for (dr, dc) in DIRECTIONS {
                    if self.run_length(row, column, dr, dc, seat) >= CONNECT {
                        return Some(seat);
                    }
                }
            }
        }
        None
    }

    /// Count contiguous `seat` discs starting at (row, column) and walking
    /// by (dr, dc).
    fn run_length(&self, row: usize, column: usize, dr: isize, dc: isize, seat: Seat) -> usize {
        let mut count = 0;
        let (mut r, mut c) = (row as isize, column as isize);
        while r >= 0
            && c >= 0
            && (r as usize) < ROWS
            && (c as usize) < COLS
            && self.cells[r as usize][c as usize] == Some(seat)
        {
            count += 1;
            r += dr;
            c += dc;
        }
        count
    }

    /// Row-major cell codes, top row first: 0 empty, 1 seat one, 2 seat two.
    pub fn to_codes(&self) -> Vec<u32> {
        self.cells
            .iter()
            .flatten()
            .map(|cell| cell.map_or(0, Seat::number))
            .collect()
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
