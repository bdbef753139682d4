//! fourline Game Records
//!
//! This crate is the boundary to durable storage. It provides:
//! - `GameRecorder`: collects placements while a game is running
//! - `verify_record`: replays a finished record and checks its outcome
//! - `RecordStore`: the persistence interface consumed by the server, with an
//!   in-memory and an append-only file implementation
//!
//! Records are protobuf `GameRecord` messages from `fourline-wire`.

#![deny(unsafe_code)]

pub mod store;

use fourline_engine::{Board, Placement, Seat};
use fourline_wire::{GameId, GameRecord, MoveProto};
use sha2::{Digest, Sha256};

pub use store::{FileStore, MemoryStore, RecordStore, StoreError, read_records, tally_leaderboard};

/// Current `GameRecord` schema version.
pub const RECORD_FORMAT_VERSION: u32 = 1;

// ============================================================================
// End Reason
// ============================================================================

/// Why a game finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// A seat completed a run.
    ConnectFour,
    /// The board filled with no run.
    Draw,
    /// A seat conceded.
    Forfeit,
    /// A disconnected seat did not come back in time.
    Abandoned,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectFour => "connect_four",
            Self::Draw => "draw",
            Self::Forfeit => "forfeit",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "connect_four" => Some(Self::ConnectFour),
            "draw" => Some(Self::Draw),
            "forfeit" => Some(Self::Forfeit),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }
}

// ============================================================================
// Game Recorder
// ============================================================================

/// Ordered move log of one game.
#[derive(Debug, Clone, Default)]
pub struct GameRecorder {
    moves: Vec<Placement>,
}

impl GameRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an applied placement.
    pub fn record_move(&mut self, placement: Placement) {
        self.moves.push(placement);
    }

    pub fn moves(&self) -> &[Placement] {
        &self.moves
    }

    /// Produce the durable record.
    ///
    /// `winner` is `None` only for a draw.
    pub fn finalize(
        &self,
        game_id: GameId,
        players: [&str; 2],
        winner: Option<Seat>,
        end_reason: EndReason,
    ) -> GameRecord {
        let moves: Vec<MoveProto> = self.moves.iter().copied().map(Into::into).collect();
        let moves_sha256 = moves_digest(&moves);

        GameRecord {
            record_format_version: RECORD_FORMAT_VERSION,
            game_id,
            player_one: players[0].to_string(),
            player_two: players[1].to_string(),
            winner: winner
                .map(|seat| players[seat.index()].to_string())
                .unwrap_or_default(),
            draw: winner.is_none(),
            end_reason: end_reason.as_str().to_string(),
            moves,
            moves_sha256,
        }
    }
}

/// SHA-256 over the move log, each move as three little-endian u32 values
/// (seat, column, row). Returned as lowercase hex.
pub fn moves_digest(moves: &[MoveProto]) -> String {
    let mut hasher = Sha256::new();
    for m in moves {
        hasher.update(m.seat.to_le_bytes());
        hasher.update(m.column.to_le_bytes());
        hasher.update(m.row.to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// Record Verification
// ============================================================================

/// Record verification error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VerifyError {
    #[error("unsupported record format version {0}")]
    UnsupportedVersion(u32),

    #[error("unknown end reason {0:?}")]
    UnknownEndReason(String),

    #[error("move digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("invalid move #{index}: {reason}")]
    InvalidMove { index: usize, reason: String },

    #[error("recorded outcome does not match the final position: {0}")]
    OutcomeMismatch(String),
}

/// Verify that a record's move log reproduces its recorded outcome.
///
/// # Verification Steps
/// 1. Check the format version and end reason
/// 2. Recompute the move digest
/// 3. Replay every move on an empty board, checking alternation from seat
///    one, landing rows, and that no move follows a completed run
/// 4. Check winner/draw against the final position for the end reason
pub fn verify_record(record: &GameRecord) -> Result<(), VerifyError> {
    // Step 1
    if record.record_format_version != RECORD_FORMAT_VERSION {
        return Err(VerifyError::UnsupportedVersion(record.record_format_version));
    }
    let reason = EndReason::parse(&record.end_reason)
        .ok_or_else(|| VerifyError::UnknownEndReason(record.end_reason.clone()))?;

    // Step 2
    let actual = moves_digest(&record.moves);
    if actual != record.moves_sha256 {
        return Err(VerifyError::DigestMismatch {
            expected: record.moves_sha256.clone(),
            actual,
        });
    }

    // Step 3
    let mut board = Board::new();
    let mut to_move = Seat::One;
    for (index, m) in record.moves.iter().enumerate() {
        let invalid = |reason: String| VerifyError::InvalidMove { index, reason };

        let recorded = Placement::try_from(m).map_err(|e| invalid(e.to_string()))?;
        if recorded.seat != to_move {
            return Err(invalid(format!(
                "seat {} moved out of turn",
                recorded.seat.number()
            )));
        }
        if board.winner().is_some() {
            return Err(invalid("move after a completed run".to_string()));
        }
        let landed = board
            .drop_disc(recorded.column, recorded.seat)
            .ok_or_else(|| invalid(format!("column {} rejected", recorded.column)))?;
        if landed != recorded {
            return Err(invalid(format!(
                "landed on row {}, recorded row {}",
                landed.row, recorded.row
            )));
        }
        to_move = to_move.other();
    }

    // Step 4
    let players = [record.player_one.as_str(), record.player_two.as_str()];
    let position_winner = board.winner();
    match reason {
        EndReason::ConnectFour => {
            let Some(seat) = position_winner else {
                return Err(VerifyError::OutcomeMismatch(
                    "no completed run on the board".to_string(),
                ));
            };
            if record.draw || record.winner != players[seat.index()] {
                return Err(VerifyError::OutcomeMismatch(format!(
                    "run belongs to seat {}",
                    seat.number()
                )));
            }
        }
        EndReason::Draw => {
            if !record.draw || !record.winner.is_empty() {
                return Err(VerifyError::OutcomeMismatch(
                    "draw recorded with a winner".to_string(),
                ));
            }
            if !board.is_full() || position_winner.is_some() {
                return Err(VerifyError::OutcomeMismatch(
                    "draw recorded on an undecided board".to_string(),
                ));
            }
        }
        EndReason::Forfeit | EndReason::Abandoned => {
            if position_winner.is_some() {
                return Err(VerifyError::OutcomeMismatch(
                    "forfeit recorded after a completed run".to_string(),
                ));
            }
            if record.draw || !players.contains(&record.winner.as_str()) {
                return Err(VerifyError::OutcomeMismatch(
                    "forfeit winner is not a participant".to_string(),
                ));
            }
        }
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
