//! fourline Wire Protocol Types
//!
//! This crate defines the shared Protobuf message types exchanged between the
//! game client and the server, plus the completed-game record handed to the
//! persistence layer. Every frame on the transport is exactly one
//! `ClientMessage` (inbound) or `ServerMessage` (outbound).
//!
//! # Message Kinds
//!
//! - **Inbound**: join, rejoin, move, forfeit
//! - **Outbound**: start, update, end, leaderboard, error
//!
//! # Board Encoding
//!
//! Boards travel as `ROWS * COLS` cell codes, row-major with the top row
//! first: `0` empty, `1` seat one, `2` seat two.

#![deny(unsafe_code)]

use fourline_engine::{Board, Placement, Seat};
pub use prost::{DecodeError, Message};

// ============================================================================
// Type Aliases
// ============================================================================

/// Game (session) identifier as carried on the wire.
pub type GameId = u64;

/// Seat number on the wire (1 or 2).
pub type SeatNumber = u32;

/// Status string of a game that still accepts moves.
pub const STATUS_PLAYING: &str = "playing";

/// Status string of a terminal game.
pub const STATUS_FINISHED: &str = "finished";

// ============================================================================
// Inbound Messages
// ============================================================================

/// Envelope for every client frame.
#[derive(Clone, PartialEq, Message)]
pub struct ClientMessage {
    #[prost(oneof = "ClientKind", tags = "1, 2, 3, 4")]
    pub kind: Option<ClientKind>,
}

/// Inbound message kinds.
#[derive(Clone, PartialEq, prost::Oneof)]
pub enum ClientKind {
    #[prost(message, tag = "1")]
    Join(JoinRequest),
    #[prost(message, tag = "2")]
    Rejoin(RejoinRequest),
    #[prost(message, tag = "3")]
    Move(MoveRequest),
    #[prost(message, tag = "4")]
    Forfeit(ForfeitRequest),
}

/// Ask to be paired into a game.
#[derive(Clone, PartialEq, Message)]
pub struct JoinRequest {
    /// Display name; no proof of ownership is required.
    #[prost(string, tag = "1")]
    pub username: String,
}

/// Reclaim a seat left by a dropped transport.
#[derive(Clone, PartialEq, Message)]
pub struct RejoinRequest {
    #[prost(string, tag = "1")]
    pub username: String,
}

/// Drop a disc.
#[derive(Clone, PartialEq, Message)]
pub struct MoveRequest {
    #[prost(uint64, tag = "1")]
    pub game_id: GameId,

    /// Zero-based column. Signed so that negative input reaches validation
    /// instead of wrapping.
    #[prost(sint32, tag = "2")]
    pub column: i32,
}

/// Concede the sender's seat.
#[derive(Clone, PartialEq, Message)]
pub struct ForfeitRequest {
    #[prost(uint64, tag = "1")]
    pub game_id: GameId,
}

impl ClientMessage {
    pub fn join(username: impl Into<String>) -> Self {
        Self {
            kind: Some(ClientKind::Join(JoinRequest {
                username: username.into(),
            })),
        }
    }

    pub fn rejoin(username: impl Into<String>) -> Self {
        Self {
            kind: Some(ClientKind::Rejoin(RejoinRequest {
                username: username.into(),
            })),
        }
    }

    pub fn play(game_id: GameId, column: i32) -> Self {
        Self {
            kind: Some(ClientKind::Move(MoveRequest { game_id, column })),
        }
    }

    pub fn forfeit(game_id: GameId) -> Self {
        Self {
            kind: Some(ClientKind::Forfeit(ForfeitRequest { game_id })),
        }
    }
}

// ============================================================================
// Outbound Messages
// ============================================================================

/// Envelope for every server frame.
#[derive(Clone, PartialEq, Message)]
pub struct ServerMessage {
    #[prost(oneof = "ServerKind", tags = "1, 2, 3, 4, 5")]
    pub kind: Option<ServerKind>,
}

/// Outbound message kinds.
#[derive(Clone, PartialEq, prost::Oneof)]
pub enum ServerKind {
    #[prost(message, tag = "1")]
    Start(GameStart),
    #[prost(message, tag = "2")]
    Update(GameUpdate),
    #[prost(message, tag = "3")]
    End(GameEnd),
    #[prost(message, tag = "4")]
    Leaderboard(Leaderboard),
    #[prost(message, tag = "5")]
    Error(ErrorNotice),
}

/// Full game snapshot for one seat, sent at creation and on rejoin.
#[derive(Clone, PartialEq, Message)]
pub struct GameStart {
    #[prost(uint64, tag = "1")]
    pub game_id: GameId,

    /// Seat owned by the recipient.
    #[prost(uint32, tag = "2")]
    pub seat: SeatNumber,

    /// Display name of the other seat.
    #[prost(string, tag = "3")]
    pub opponent: String,

    #[prost(uint32, repeated, tag = "4")]
    pub board: Vec<u32>,

    /// Seat to move.
    #[prost(uint32, tag = "5")]
    pub turn: SeatNumber,

    /// `playing` or `finished`.
    #[prost(string, tag = "6")]
    pub status: String,
}

/// Sent to both seats after every applied move.
#[derive(Clone, PartialEq, Message)]
pub struct GameUpdate {
    #[prost(uint64, tag = "1")]
    pub game_id: GameId,

    #[prost(uint32, repeated, tag = "2")]
    pub board: Vec<u32>,

    #[prost(uint32, tag = "3")]
    pub turn: SeatNumber,

    #[prost(message, optional, tag = "4")]
    pub last_move: Option<LastMove>,
}

/// The placement that produced a `GameUpdate`.
#[derive(Clone, PartialEq, Message)]
pub struct LastMove {
    #[prost(uint32, tag = "1")]
    pub seat: SeatNumber,

    #[prost(uint32, tag = "2")]
    pub column: u32,

    #[prost(uint32, tag = "3")]
    pub row: u32,
}

/// Terminal result, sent once per game.
#[derive(Clone, PartialEq, Message)]
pub struct GameEnd {
    #[prost(uint64, tag = "1")]
    pub game_id: GameId,

    /// Winner's display name; empty on a draw.
    #[prost(string, tag = "2")]
    pub winner: String,

    #[prost(bool, tag = "3")]
    pub draw: bool,
}

/// Ordered top winners.
#[derive(Clone, PartialEq, Message)]
pub struct Leaderboard {
    #[prost(message, repeated, tag = "1")]
    pub entries: Vec<LeaderboardEntry>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct LeaderboardEntry {
    #[prost(string, tag = "1")]
    pub username: String,

    #[prost(uint64, tag = "2")]
    pub wins: u64,
}

/// Rejection of an inbound message, addressed to its sender only.
#[derive(Clone, PartialEq, Message)]
pub struct ErrorNotice {
    #[prost(string, tag = "1")]
    pub message: String,
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: Some(ServerKind::Error(ErrorNotice {
                message: message.into(),
            })),
        }
    }

    pub fn leaderboard(entries: Vec<LeaderboardEntry>) -> Self {
        Self {
            kind: Some(ServerKind::Leaderboard(Leaderboard { entries })),
        }
    }

    /// Short name of the message kind, for logs.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            Some(ServerKind::Start(_)) => "start",
            Some(ServerKind::Update(_)) => "update",
            Some(ServerKind::End(_)) => "end",
            Some(ServerKind::Leaderboard(_)) => "leaderboard",
            Some(ServerKind::Error(_)) => "error",
            None => "empty",
        }
    }
}

impl From<GameStart> for ServerMessage {
    fn from(msg: GameStart) -> Self {
        Self {
            kind: Some(ServerKind::Start(msg)),
        }
    }
}

impl From<GameUpdate> for ServerMessage {
    fn from(msg: GameUpdate) -> Self {
        Self {
            kind: Some(ServerKind::Update(msg)),
        }
    }
}

impl From<GameEnd> for ServerMessage {
    fn from(msg: GameEnd) -> Self {
        Self {
            kind: Some(ServerKind::End(msg)),
        }
    }
}

// ============================================================================
// Completed-Game Record
// ============================================================================

/// One placement in a game's move log.
#[derive(Clone, PartialEq, Eq, Message)]
pub struct MoveProto {
    #[prost(uint32, tag = "1")]
    pub seat: SeatNumber,

    #[prost(uint32, tag = "2")]
    pub column: u32,

    #[prost(uint32, tag = "3")]
    pub row: u32,
}

/// Durable record of a finished game.
#[derive(Clone, PartialEq, Message)]
pub struct GameRecord {
    /// Schema version (starts at 1).
    #[prost(uint32, tag = "1")]
    pub record_format_version: u32,

    #[prost(uint64, tag = "2")]
    pub game_id: GameId,

    #[prost(string, tag = "3")]
    pub player_one: String,

    #[prost(string, tag = "4")]
    pub player_two: String,

    /// Winner's display name; empty on a draw.
    #[prost(string, tag = "5")]
    pub winner: String,

    #[prost(bool, tag = "6")]
    pub draw: bool,

    /// `connect_four`, `draw`, `forfeit` or `abandoned`.
    #[prost(string, tag = "7")]
    pub end_reason: String,

    #[prost(message, repeated, tag = "8")]
    pub moves: Vec<MoveProto>,

    /// Lowercase hex SHA-256 over the move log.
    #[prost(string, tag = "9")]
    pub moves_sha256: String,
}

// ============================================================================
// Conversion Traits
// ============================================================================

impl From<Placement> for LastMove {
    fn from(p: Placement) -> Self {
        Self {
            seat: p.seat.number(),
            column: p.column as u32,
            row: p.row as u32,
        }
    }
}

impl From<Placement> for MoveProto {
    fn from(p: Placement) -> Self {
        Self {
            seat: p.seat.number(),
            column: p.column as u32,
            row: p.row as u32,
        }
    }
}

impl TryFrom<&MoveProto> for Placement {
    type Error = &'static str;

    fn try_from(m: &MoveProto) -> Result<Self, Self::Error> {
        let seat = Seat::from_number(m.seat).ok_or("seat must be 1 or 2")?;
        Ok(Self {
            seat,
            row: m.row as usize,
            column: m.column as usize,
        })
    }
}

/// Encode a board for the wire.
pub fn board_codes(board: &Board) -> Vec<u32> {
    board.to_codes()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use fourline_engine::{COLS, ROWS};

    #[test]
    fn test_client_envelope_roundtrip() {
        let msg = ClientMessage::play(7, -2);
        let encoded = msg.encode_to_vec();
        let decoded = ClientMessage::decode(encoded.as_slice()).unwrap();
        assert_eq!(decoded, msg);
        assert!(matches!(
            decoded.kind,
            Some(ClientKind::Move(MoveRequest { game_id: 7, column: -2 }))
        ));
    }

    #[test]
    fn test_empty_frame_decodes_without_kind() {
        let decoded = ClientMessage::decode(&b""[..]).unwrap();
        assert!(decoded.kind.is_none());
    }

    #[test]
    fn test_garbage_frame_is_decode_error() {
        assert!(ClientMessage::decode(&[0xff, 0xff, 0xff][..]).is_err());
    }

    #[test]
    fn test_update_carries_full_board() {
        let mut board = Board::new();
        let placement = board.drop_disc(3, Seat::One).unwrap();
        let msg: ServerMessage = GameUpdate {
            game_id: 1,
            board: board_codes(&board),
            turn: Seat::Two.number(),
            last_move: Some(placement.into()),
        }
        .into();

        let decoded = ServerMessage::decode(msg.encode_to_vec().as_slice()).unwrap();
        let Some(ServerKind::Update(update)) = decoded.kind else {
            panic!("expected update, got {}", decoded.kind_name());
        };
        assert_eq!(update.board.len(), ROWS * COLS);
        assert_eq!(
            update.last_move,
            Some(LastMove {
                seat: 1,
                column: 3,
                row: (ROWS - 1) as u32
            })
        );
    }

    #[test]
    fn test_move_proto_rejects_bad_seat() {
        let bad = MoveProto {
            seat: 3,
            column: 0,
            row: 5,
        };
        assert!(Placement::try_from(&bad).is_err());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ServerMessage::error("x").kind_name(), "error");
        assert_eq!(ServerMessage::leaderboard(vec![]).kind_name(), "leaderboard");
        assert_eq!(ServerMessage::default().kind_name(), "empty");
    }
}
