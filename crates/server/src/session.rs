//! Game sessions.
//!
//! A `Session` is one game between two seats. It owns the board, the turn,
//! the terminal outcome and the move log, and enforces move legality. It
//! performs no I/O; the coordinator decides who hears about each
//! transition.
//!
//! # Invariants
//! - Seat one moves first. `turn` flips exactly once per applied move.
//! - A session leaves `Playing` once. The first terminal transition wins and
//!   every later one is a no-op.
//! - A finished session accepts no state-changing operation.

use std::collections::BTreeMap;

use fourline_engine::{Board, Placement, Seat};
use fourline_record::{EndReason, GameRecorder};
use fourline_wire::{GameEnd, GameId, GameRecord, GameStart, GameUpdate, board_codes};

use crate::error::IllegalStateError;
use crate::gateway::ConnectionId;

// ============================================================================
// Participants
// ============================================================================

/// Connection state of a human seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Connected(ConnectionId),
    /// Within the rejoin grace period.
    Disconnected,
    /// Grace expired; the seat forfeited.
    Abandoned,
}

/// Occupant of a seat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Participant {
    Human { name: String, presence: Presence },
    Automated { name: String },
}

impl Participant {
    pub fn human(name: impl Into<String>, connection: ConnectionId) -> Self {
        Self::Human {
            name: name.into(),
            presence: Presence::Connected(connection),
        }
    }

    pub fn automated(name: impl Into<String>) -> Self {
        Self::Automated { name: name.into() }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Human { name, .. } | Self::Automated { name } => name,
        }
    }

    pub fn is_automated(&self) -> bool {
        matches!(self, Self::Automated { .. })
    }

    /// `None` for the automated seat.
    pub fn presence(&self) -> Option<Presence> {
        match self {
            Self::Human { presence, .. } => Some(*presence),
            Self::Automated { .. } => None,
        }
    }

    pub fn transport(&self) -> Option<ConnectionId> {
        match self.presence() {
            Some(Presence::Connected(connection)) => Some(connection),
            _ => None,
        }
    }

    fn set_presence(&mut self, next: Presence) -> bool {
        match self {
            Self::Human { presence, .. } => {
                *presence = next;
                true
            }
            Self::Automated { .. } => false,
        }
    }
}

/// Who is submitting a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Transport(ConnectionId),
    Automated,
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Playing,
    Finished,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Playing => fourline_wire::STATUS_PLAYING,
            Self::Finished => fourline_wire::STATUS_FINISHED,
        }
    }
}

/// Terminal result of a session. `winner` is `None` only for a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub winner: Option<Seat>,
    pub reason: EndReason,
}

/// Result of an applied move. `outcome` is set only on the move that ended
/// the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveApplied {
    pub placement: Placement,
    pub outcome: Option<Outcome>,
}

#[derive(Debug, Clone)]
pub struct Session {
    id: GameId,
    board: Board,
    seats: [Participant; 2],
    turn: Seat,
    status: SessionStatus,
    outcome: Option<Outcome>,
    recorder: GameRecorder,
}

impl Session {
    pub fn new(id: GameId, seat_one: Participant, seat_two: Participant) -> Self {
        Self {
            id,
            board: Board::new(),
            seats: [seat_one, seat_two],
            turn: Seat::One,
            status: SessionStatus::Playing,
            outcome: None,
            recorder: GameRecorder::new(),
        }
    }

    pub fn id(&self) -> GameId {
        self.id
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn turn(&self) -> Seat {
        self.turn
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_playing(&self) -> bool {
        self.status == SessionStatus::Playing
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn moves(&self) -> &[Placement] {
        self.recorder.moves()
    }

    pub fn participant(&self, seat: Seat) -> &Participant {
        &self.seats[seat.index()]
    }

    pub fn transport(&self, seat: Seat) -> Option<ConnectionId> {
        self.participant(seat).transport()
    }

    /// Seat currently bound to `connection`.
    pub fn seat_of(&self, connection: ConnectionId) -> Option<Seat> {
        Seat::ALL
            .into_iter()
            .find(|&seat| self.transport(seat) == Some(connection))
    }

    /// True when the seat to move is the automated participant.
    pub fn automated_to_move(&self) -> bool {
        self.is_playing() && self.participant(self.turn).is_automated()
    }

    /// Apply a move for the seat to move.
    ///
    /// Checks, in order: the session is playing, the actor holds the seat to
    /// move, the column is in range and not full. On success the turn flips
    /// and the position is evaluated for a run or a full board.
    pub fn apply_move(
        &mut self,
        actor: Actor,
        column: i32,
    ) -> Result<MoveApplied, IllegalStateError> {
        if !self.is_playing() {
            return Err(IllegalStateError::NotPlaying);
        }

        let seat = self.turn;
        let acting = match (self.participant(seat), actor) {
            (Participant::Automated { .. }, Actor::Automated) => true,
            (
                Participant::Human {
                    presence: Presence::Connected(bound),
                    ..
                },
                Actor::Transport(connection),
            ) => *bound == connection,
            _ => false,
        };
        if !acting {
            return Err(IllegalStateError::NotYourTurn);
        }

        let placement = usize::try_from(column)
            .ok()
            .and_then(|column| self.board.drop_disc(column, seat))
            .ok_or(IllegalStateError::InvalidColumn)?;

        self.recorder.record_move(placement);
        self.turn = seat.other();

        let outcome = if self.board.winner() == Some(seat) {
            self.finish(Some(seat), EndReason::ConnectFour)
        } else if self.board.is_full() {
            self.finish(None, EndReason::Draw)
        } else {
            None
        };

        Ok(MoveApplied { placement, outcome })
    }

    /// Concede `seat`; the other seat wins. No-op unless playing.
    pub fn forfeit(&mut self, seat: Seat) -> Option<Outcome> {
        self.finish(Some(seat.other()), EndReason::Forfeit)
    }

    /// Mark `seat` abandoned after its grace expired; the other seat wins.
    /// No-op unless playing.
    pub fn abandon(&mut self, seat: Seat) -> Option<Outcome> {
        if !self.is_playing() {
            return None;
        }
        self.seats[seat.index()].set_presence(Presence::Abandoned);
        self.finish(Some(seat.other()), EndReason::Abandoned)
    }

    /// Bind a new transport to a human seat, keeping board, turn and log.
    pub fn attach_transport(
        &mut self,
        seat: Seat,
        connection: ConnectionId,
    ) -> Result<(), IllegalStateError> {
        if !self.is_playing() {
            return Err(IllegalStateError::NotPlaying);
        }
        if !self.seats[seat.index()].set_presence(Presence::Connected(connection)) {
            return Err(IllegalStateError::NotAParticipant);
        }
        Ok(())
    }

    /// Unbind a seat's transport. The seat stays in the game.
    pub fn detach_transport(&mut self, seat: Seat) {
        if self.is_playing() {
            self.seats[seat.index()].set_presence(Presence::Disconnected);
        }
    }

    fn finish(&mut self, winner: Option<Seat>, reason: EndReason) -> Option<Outcome> {
        if !self.is_playing() {
            return None;
        }
        let outcome = Outcome { winner, reason };
        self.status = SessionStatus::Finished;
        self.outcome = Some(outcome);
        Some(outcome)
    }

    // ------------------------------------------------------------------------
    // Outbound views
    // ------------------------------------------------------------------------

    /// Full snapshot from `seat`'s point of view.
    pub fn start_message(&self, seat: Seat) -> GameStart {
        GameStart {
            game_id: self.id,
            seat: seat.number(),
            opponent: self.participant(seat.other()).name().to_string(),
            board: board_codes(&self.board),
            turn: self.turn.number(),
            status: self.status.as_str().to_string(),
        }
    }

    pub fn update_message(&self, placement: Placement) -> GameUpdate {
        GameUpdate {
            game_id: self.id,
            board: board_codes(&self.board),
            turn: self.turn.number(),
            last_move: Some(placement.into()),
        }
    }

    pub fn end_message(&self) -> Option<GameEnd> {
        let outcome = self.outcome?;
        Some(GameEnd {
            game_id: self.id,
            winner: outcome
                .winner
                .map(|seat| self.participant(seat).name().to_string())
                .unwrap_or_default(),
            draw: outcome.winner.is_none(),
        })
    }

    /// Durable record of a finished session.
    pub fn record(&self) -> Option<GameRecord> {
        let outcome = self.outcome?;
        Some(self.recorder.finalize(
            self.id,
            [self.seats[0].name(), self.seats[1].name()],
            outcome.winner,
            outcome.reason,
        ))
    }
}

// ============================================================================
// Session Registry
// ============================================================================

/// All sessions the server still addresses, keyed by game id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    next_id: GameId,
    sessions: BTreeMap<GameId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a playing session and return its id.
    pub fn create(&mut self, seat_one: Participant, seat_two: Participant) -> GameId {
        self.next_id += 1;
        let id = self.next_id;
        self.sessions.insert(id, Session::new(id, seat_one, seat_two));
        id
    }

    pub fn get(&self, id: GameId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: GameId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    /// Drop a session, but only once it has finished.
    pub fn remove_finished(&mut self, id: GameId) -> Option<Session> {
        if self.sessions.get(&id)?.is_playing() {
            return None;
        }
        self.sessions.remove(&id)
    }

    /// Playing sessions and seats bound to `connection`.
    pub fn playing_seats_of(&self, connection: ConnectionId) -> Vec<(GameId, Seat)> {
        self.sessions
            .values()
            .filter(|session| session.is_playing())
            .filter_map(|session| Some((session.id, session.seat_of(connection)?)))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: ConnectionId = 1;
    const BOB: ConnectionId = 2;

    fn humans() -> Session {
        Session::new(
            7,
            Participant::human("alice", ALICE),
            Participant::human("bob", BOB),
        )
    }

    #[test]
    fn test_new_session_state() {
        let session = humans();
        assert!(session.is_playing());
        assert_eq!(session.turn(), Seat::One);
        assert_eq!(session.board().disc_count(), 0);
        assert_eq!(session.seat_of(BOB), Some(Seat::Two));
        assert_eq!(session.seat_of(99), None);
    }

    #[test]
    fn test_turn_alternates() {
        let mut session = humans();
        session.apply_move(Actor::Transport(ALICE), 3).unwrap();
        assert_eq!(session.turn(), Seat::Two);
        session.apply_move(Actor::Transport(BOB), 3).unwrap();
        assert_eq!(session.turn(), Seat::One);
        assert_eq!(session.moves().len(), 2);
    }

    #[test]
    fn test_out_of_turn_rejected_without_change() {
        let mut session = humans();
        let before = *session.board();
        assert_eq!(
            session.apply_move(Actor::Transport(BOB), 3),
            Err(IllegalStateError::NotYourTurn)
        );
        assert_eq!(
            session.apply_move(Actor::Automated, 3),
            Err(IllegalStateError::NotYourTurn)
        );
        assert_eq!(*session.board(), before);
        assert_eq!(session.turn(), Seat::One);
    }

    #[test]
    fn test_invalid_columns_rejected() {
        let mut session = humans();
        for column in [-1, 7, i32::MAX] {
            assert_eq!(
                session.apply_move(Actor::Transport(ALICE), column),
                Err(IllegalStateError::InvalidColumn)
            );
        }
        assert_eq!(session.turn(), Seat::One);
    }

    #[test]
    fn test_full_column_rejected() {
        let mut session = humans();
        // Mixed stacking keeps column 0 free of a vertical four.
        let stack = [(ALICE, 0), (BOB, 0), (ALICE, 1), (BOB, 0), (ALICE, 0), (BOB, 1)];
        for (conn, column) in stack {
            session.apply_move(Actor::Transport(conn), column).unwrap();
        }
        session.apply_move(Actor::Transport(ALICE), 0).unwrap();
        session.apply_move(Actor::Transport(BOB), 0).unwrap();
        assert!(session.board().is_column_full(0));
        assert_eq!(
            session.apply_move(Actor::Transport(ALICE), 0),
            Err(IllegalStateError::InvalidColumn)
        );
    }

    #[test]
    fn test_not_playing_checked_first() {
        let mut session = humans();
        session.forfeit(Seat::One).unwrap();
        // Wrong seat and bad column, but the status check wins.
        assert_eq!(
            session.apply_move(Actor::Transport(BOB), 42),
            Err(IllegalStateError::NotPlaying)
        );
    }

    #[test]
    fn test_vertical_four_finishes_once() {
        let mut session = humans();
        let mut last = None;
        for i in 0..7 {
            let (conn, column) = if i % 2 == 0 { (ALICE, 3) } else { (BOB, 4) };
            last = Some(session.apply_move(Actor::Transport(conn), column).unwrap());
        }
        let applied = last.unwrap();
        assert_eq!(
            applied.outcome,
            Some(Outcome {
                winner: Some(Seat::One),
                reason: EndReason::ConnectFour
            })
        );
        assert_eq!(session.status(), SessionStatus::Finished);

        let end = session.end_message().unwrap();
        assert_eq!(end.winner, "alice");
        assert!(!end.draw);

        // Later terminal transitions are no-ops.
        assert_eq!(session.forfeit(Seat::One), None);
        assert_eq!(session.abandon(Seat::One), None);
        assert_eq!(session.outcome().unwrap().winner, Some(Seat::One));
    }

    #[test]
    fn test_full_board_finishes_as_draw() {
        const DRAWN_GAME: [i32; 42] = [
            5, 4, 5, 0, 6, 2, 4, 5, 5, 0, 4, 1, 1, 0,
            4, 5, 6, 5, 3, 1, 1, 2, 2, 6, 2, 6, 6, 3,
            6, 2, 0, 3, 0, 3, 3, 4, 3, 1, 4, 2, 1, 0,
        ];
        let mut session = humans();
        let mut outcomes = Vec::new();
        for (i, column) in DRAWN_GAME.into_iter().enumerate() {
            let conn = if i % 2 == 0 { ALICE } else { BOB };
            let applied = session.apply_move(Actor::Transport(conn), column).unwrap();
            outcomes.extend(applied.outcome);
        }
        assert_eq!(
            outcomes,
            vec![Outcome {
                winner: None,
                reason: EndReason::Draw
            }]
        );
        assert_eq!(session.status(), SessionStatus::Finished);
        let end = session.end_message().unwrap();
        assert!(end.draw);
        assert!(end.winner.is_empty());
    }

    #[test]
    fn test_forfeit_awards_other_seat() {
        let mut session = humans();
        let outcome = session.forfeit(Seat::Two).unwrap();
        assert_eq!(outcome.winner, Some(Seat::One));
        assert_eq!(outcome.reason, EndReason::Forfeit);
        assert_eq!(session.forfeit(Seat::One), None);
    }

    #[test]
    fn test_abandon_marks_presence() {
        let mut session = humans();
        session.detach_transport(Seat::One);
        assert_eq!(
            session.participant(Seat::One).presence(),
            Some(Presence::Disconnected)
        );
        let outcome = session.abandon(Seat::One).unwrap();
        assert_eq!(outcome.winner, Some(Seat::Two));
        assert_eq!(outcome.reason, EndReason::Abandoned);
        assert_eq!(
            session.participant(Seat::One).presence(),
            Some(Presence::Abandoned)
        );
    }

    #[test]
    fn test_attach_transport_preserves_position() {
        let mut session = humans();
        session.apply_move(Actor::Transport(ALICE), 3).unwrap();
        session.detach_transport(Seat::Two);
        assert_eq!(session.seat_of(BOB), None);

        session.attach_transport(Seat::Two, 40).unwrap();
        assert_eq!(session.seat_of(40), Some(Seat::Two));
        assert_eq!(session.turn(), Seat::Two);
        assert_eq!(session.board().disc_count(), 1);
        session.apply_move(Actor::Transport(40), 3).unwrap();
    }

    #[test]
    fn test_attach_rejected_after_finish_or_on_automated_seat() {
        let mut session = Session::new(
            1,
            Participant::human("alice", ALICE),
            Participant::automated("BOT"),
        );
        assert_eq!(
            session.attach_transport(Seat::Two, 5),
            Err(IllegalStateError::NotAParticipant)
        );
        session.forfeit(Seat::One);
        assert_eq!(
            session.attach_transport(Seat::One, 5),
            Err(IllegalStateError::NotPlaying)
        );
    }

    #[test]
    fn test_automated_moves_with_automated_actor() {
        let mut session = Session::new(
            1,
            Participant::automated("BOT"),
            Participant::human("bob", BOB),
        );
        assert!(session.automated_to_move());
        session.apply_move(Actor::Automated, 3).unwrap();
        assert!(!session.automated_to_move());
    }

    #[test]
    fn test_start_message_per_seat() {
        let mut session = humans();
        session.apply_move(Actor::Transport(ALICE), 2).unwrap();
        let start = session.start_message(Seat::Two);
        assert_eq!(start.game_id, 7);
        assert_eq!(start.seat, 2);
        assert_eq!(start.opponent, "alice");
        assert_eq!(start.turn, 2);
        assert_eq!(start.status, "playing");
        assert_eq!(start.board[5 * 7 + 2], 1);
    }

    #[test]
    fn test_record_only_after_finish() {
        let mut session = humans();
        session.apply_move(Actor::Transport(ALICE), 2).unwrap();
        assert!(session.record().is_none());
        session.forfeit(Seat::Two);
        let record = session.record().unwrap();
        assert_eq!(record.winner, "alice");
        assert_eq!(record.end_reason, "forfeit");
        assert_eq!(record.moves.len(), 1);
        fourline_record::verify_record(&record).unwrap();
    }

    #[test]
    fn test_registry_lookup_and_retention() {
        let mut registry = SessionRegistry::new();
        let a = registry.create(Participant::human("alice", ALICE), Participant::automated("BOT"));
        let b = registry.create(Participant::human("bob", BOB), Participant::automated("BOT"));
        assert_ne!(a, b);
        assert_eq!(registry.playing_seats_of(BOB), vec![(b, Seat::One)]);

        assert!(registry.remove_finished(a).is_none(), "playing sessions stay");
        registry.get_mut(a).unwrap().forfeit(Seat::One);
        assert!(registry.playing_seats_of(ALICE).is_empty());
        assert!(registry.remove_finished(a).is_some());
        assert!(registry.get(a).is_none());
        assert_eq!(registry.len(), 1);
    }
}
