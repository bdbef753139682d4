//! Deterministic column choice for the automated seat.
//!
//! Priority, first match wins:
//! 1. a column that wins immediately for `seat` (lowest index first)
//! 2. a column that would win immediately for the opponent (block)
//! 3. the first open column in center-out order

use crate::{Board, COLS, Seat};

/// Column visitation order biased toward the center.
pub const CENTER_OUT: [usize; COLS] = [3, 2, 4, 1, 5, 0, 6];

/// Choose a column for `seat` on `board`.
///
/// Returns `None` when no column is open; callers treat that as "skip".
pub fn choose_column(board: &Board, seat: Seat) -> Option<usize> {
    winning_column(board, seat)
        .or_else(|| winning_column(board, seat.other()))
        .or_else(|| CENTER_OUT.into_iter().find(|&c| !board.is_column_full(c)))
}

/// First column (ascending) where a disc for `seat` completes a run.
fn winning_column(board: &Board, seat: Seat) -> Option<usize> {
    (0..COLS).find(|&column| {
        let mut trial = *board;
        trial.drop_disc(column, seat).is_some() && trial.winner() == Some(seat)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ROWS;

    #[test]
    fn test_empty_board_prefers_center() {
        assert_eq!(choose_column(&Board::new(), Seat::Two), Some(3));
    }

    #[test]
    fn test_center_out_skips_full_columns() {
        let mut board = Board::new();
        // Fill column 3 without creating any run of four.
        for i in 0..ROWS {
            let seat = if (i / 2) % 2 == 0 { Seat::One } else { Seat::Two };
            board.drop_disc(3, seat).unwrap();
        }
        assert_eq!(choose_column(&board, Seat::Two), Some(2));
    }

    #[test]
    fn test_takes_immediate_win() {
        let mut board = Board::new();
        for column in 0..3 {
            board.drop_disc(column, Seat::Two).unwrap();
        }
        // Seat one also threatens vertically in column 6; winning beats blocking.
        for _ in 0..3 {
            board.drop_disc(6, Seat::One).unwrap();
        }
        assert_eq!(choose_column(&board, Seat::Two), Some(3));
    }

    #[test]
    fn test_blocks_open_three() {
        // Opponent holds columns 2, 3, 4 on the bottom row with both ends open.
        let mut board = Board::new();
        for column in 2..5 {
            board.drop_disc(column, Seat::One).unwrap();
        }
        let choice = choose_column(&board, Seat::Two);
        assert_eq!(choice, Some(1), "first blocking column by ascending index");
        assert_ne!(choice, Some(3));
    }

    #[test]
    fn test_blocks_vertical_threat() {
        let mut board = Board::new();
        for _ in 0..3 {
            board.drop_disc(0, Seat::One).unwrap();
        }
        assert_eq!(choose_column(&board, Seat::Two), Some(0));
    }

    #[test]
    fn test_full_board_has_no_move() {
        let mut board = Board::new();
        let mut seat = Seat::One;
        for column in 0..COLS {
            for _ in 0..ROWS {
                board.drop_disc(column, seat).unwrap();
                seat = seat.other();
            }
        }
        assert_eq!(choose_column(&board, Seat::One), None);
        assert_eq!(choose_column(&board, Seat::Two), None);
    }

    #[test]
    fn test_choice_is_deterministic() {
        let mut board = Board::new();
        board.drop_disc(3, Seat::One).unwrap();
        board.drop_disc(2, Seat::Two).unwrap();
        let first = choose_column(&board, Seat::One);
        for _ in 0..10 {
            assert_eq!(choose_column(&board, Seat::One), first);
        }
    }
}
