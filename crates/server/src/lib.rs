//! fourline Session Server
//!
//! The session server hosts two-seat games over long-lived transports. It
//! owns:
//! - Matchmaking (pair joiners, fall back to the automated seat)
//! - Session lifecycle and move legality
//! - Disconnect grace and rejoin
//! - Outbound delivery of snapshots, updates, results and leaderboards
//! - Handing finished games to the record store
//!
//! # Architecture
//!
//! `Server` is a plain state machine driven by one coordinating task. Every
//! inbound frame, transport close and timer expiry is applied in order on
//! `&mut self`, so no session state is shared between tasks. Time is a
//! logical clock passed in through `advance_to`; the network edge in `net`
//! maps it to wall time and tests drive it directly.

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod gateway;
pub mod matchmaker;
pub mod net;
pub mod presence;
pub mod session;
pub mod timers;
pub mod validation;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fourline_engine::{Seat, choose_column};
use fourline_record::RecordStore;
use fourline_wire::{ClientMessage, GameId, ServerMessage};
use tracing::{debug, info, warn};

pub use config::ServerConfig;
pub use error::{ConfigError, IllegalStateError, ServerError, ValidationError};
pub use gateway::{ConnectionId, Gateway, Outbound};
use matchmaker::{Candidate, JoinOutcome, Matchmaker};
use presence::{DisconnectRecord, PresenceManager};
use session::{Actor, MoveApplied, Outcome, Participant, Session, SessionRegistry};
use timers::{Scheduler, TimerId, TimerKind};
use validation::{Request, parse_frame, validate_message};

// ============================================================================
// Registries
// ============================================================================

/// The mutable registries a `Server` operates on.
///
/// Every server gets its own set, so two servers in one process share
/// nothing.
#[derive(Debug, Default)]
pub struct Registries {
    pub sessions: SessionRegistry,
    pub matchmaker: Matchmaker,
    pub presence: PresenceManager,
    pub gateway: Gateway,
    pub timers: Scheduler,
}

// ============================================================================
// Server State
// ============================================================================

/// Coordinator state for all games hosted by one process.
pub struct Server {
    config: ServerConfig,
    /// Logical time since start.
    now: Duration,
    sessions: SessionRegistry,
    matchmaker: Matchmaker,
    presence: PresenceManager,
    gateway: Gateway,
    timers: Scheduler,
    store: Arc<dyn RecordStore>,
    /// Pending automated reply per game.
    opponent_timers: HashMap<GameId, TimerId>,
}

impl Server {
    /// Create a server with fresh registries.
    pub fn new(config: ServerConfig, store: Arc<dyn RecordStore>) -> Self {
        Self::with_registries(config, store, Registries::default())
    }

    /// Create a server over caller-supplied registries.
    pub fn with_registries(
        config: ServerConfig,
        store: Arc<dyn RecordStore>,
        registries: Registries,
    ) -> Self {
        let Registries {
            sessions,
            matchmaker,
            presence,
            gateway,
            timers,
        } = registries;
        Self {
            config,
            now: Duration::ZERO,
            sessions,
            matchmaker,
            presence,
            gateway,
            timers,
            store,
            opponent_timers: HashMap::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    /// Earliest pending timer, as logical time.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    pub fn session(&self, game_id: GameId) -> Option<&Session> {
        self.sessions.get(game_id)
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn waiting_count(&self) -> usize {
        self.matchmaker.len()
    }

    pub fn disconnect_record(&self, username: &str) -> Option<&DisconnectRecord> {
        self.presence.get(username)
    }

    pub fn connection_count(&self) -> usize {
        self.gateway.len()
    }

    // ------------------------------------------------------------------------
    // Transport events
    // ------------------------------------------------------------------------

    /// Register a new transport. It immediately receives the current
    /// leaderboard.
    pub fn connect(&mut self, outbound: Outbound) -> ConnectionId {
        let connection = self.gateway.register(outbound);
        debug!(connection, "transport connected");
        match self.store.fetch_top_winners(self.config.leaderboard_limit) {
            Ok(entries) => {
                self.gateway
                    .send(connection, ServerMessage::leaderboard(entries));
            }
            Err(e) => warn!(connection, error = %e, "leaderboard unavailable"),
        }
        connection
    }

    /// Handle one binary frame from `connection`.
    pub fn handle_frame(&mut self, connection: ConnectionId, bytes: &[u8]) {
        let parsed = parse_frame(bytes, self.config.max_identity_len);
        self.handle_request(connection, parsed);
    }

    /// Handle one decoded message from `connection`.
    pub fn handle_message(&mut self, connection: ConnectionId, message: ClientMessage) {
        let parsed = validate_message(message, self.config.max_identity_len);
        self.handle_request(connection, parsed);
    }

    /// A rejection is sent back to `connection` only and changes no state.
    fn handle_request(
        &mut self,
        connection: ConnectionId,
        parsed: Result<Request, ValidationError>,
    ) {
        let result = parsed.map_err(ServerError::from).and_then(|request| {
            debug!(connection, request = request.name(), "request");
            self.dispatch(connection, request)
                .map_err(ServerError::from)
        });
        if let Err(e) = result {
            self.reject(connection, e);
        }
    }

    /// The transport closed. Waiting entries are withdrawn; seated
    /// participants enter the rejoin grace.
    pub fn disconnect(&mut self, connection: ConnectionId) {
        self.gateway.unregister(connection);

        if let Some(candidate) = self.matchmaker.withdraw(connection, &mut self.timers) {
            info!(connection, username = %candidate.username, "left matchmaking");
        }

        let deadline = self.now + self.config.reconnect_grace();
        let displaced =
            self.presence
                .disconnect(connection, &mut self.sessions, &mut self.timers, deadline);
        for (game_id, seat) in displaced {
            warn!(game_id, seat = seat.number(), "seat displaced by newer disconnect");
            if let Some(outcome) = self
                .sessions
                .get_mut(game_id)
                .and_then(|session| session.abandon(seat))
            {
                self.conclude(game_id, outcome);
            }
        }
        debug!(connection, "transport closed");
    }

    /// Move the logical clock forward and fire every timer now due, in
    /// deadline order. Time never moves backwards.
    pub fn advance_to(&mut self, now: Duration) {
        self.now = self.now.max(now);
        while let Some((id, kind)) = self.timers.pop_due(self.now) {
            self.fire(id, kind);
        }
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    fn dispatch(
        &mut self,
        connection: ConnectionId,
        request: Request,
    ) -> Result<(), IllegalStateError> {
        match request {
            Request::Join { username } => self.join(connection, username),
            Request::Rejoin { username } => self.rejoin(connection, &username),
            Request::Move { game_id, column } => self.play(connection, game_id, column),
            Request::Forfeit { game_id } => self.forfeit(connection, game_id),
        }
    }

    /// A transport holds at most one place: a waiting entry or one playing
    /// seat.
    fn ensure_unengaged(&self, connection: ConnectionId) -> Result<(), IllegalStateError> {
        if self.matchmaker.is_waiting(connection)
            || !self.sessions.playing_seats_of(connection).is_empty()
        {
            return Err(IllegalStateError::AlreadyJoined);
        }
        Ok(())
    }

    fn join(&mut self, connection: ConnectionId, username: String) -> Result<(), IllegalStateError> {
        self.ensure_unengaged(connection)?;

        let candidate = Candidate {
            username,
            connection,
        };
        let deadline = self.now + self.config.matchmaking_grace();
        match self.matchmaker.join(candidate, &mut self.timers, deadline) {
            JoinOutcome::Paired { first, second } => {
                self.start_game(
                    Participant::human(first.username, first.connection),
                    Participant::human(second.username, second.connection),
                );
            }
            JoinOutcome::Queued { .. } => {
                info!(connection, "waiting for an opponent");
            }
        }
        Ok(())
    }

    fn rejoin(&mut self, connection: ConnectionId, username: &str) -> Result<(), IllegalStateError> {
        // Checked before the disconnect record is consumed, so the held seat
        // stays claimable.
        self.ensure_unengaged(connection)?;
        let start =
            self.presence
                .rejoin(username, connection, &mut self.sessions, &mut self.timers)?;
        info!(game_id = start.game_id, username, connection, "rejoined");
        self.gateway.send(connection, start.into());
        Ok(())
    }

    fn play(
        &mut self,
        connection: ConnectionId,
        game_id: GameId,
        column: i32,
    ) -> Result<(), IllegalStateError> {
        let session = self
            .sessions
            .get_mut(game_id)
            .ok_or(IllegalStateError::UnknownSession(game_id))?;
        let applied = session.apply_move(Actor::Transport(connection), column)?;
        debug!(
            game_id,
            connection,
            column = applied.placement.column,
            row = applied.placement.row,
            "move applied"
        );
        self.announce_move(game_id, applied);
        Ok(())
    }

    fn forfeit(&mut self, connection: ConnectionId, game_id: GameId) -> Result<(), IllegalStateError> {
        let session = self
            .sessions
            .get_mut(game_id)
            .ok_or(IllegalStateError::UnknownSession(game_id))?;
        let seat = session
            .seat_of(connection)
            .ok_or(IllegalStateError::NotAParticipant)?;
        if let Some(outcome) = session.forfeit(seat) {
            info!(game_id, seat = seat.number(), "forfeit");
            self.conclude(game_id, outcome);
        }
        Ok(())
    }

    fn reject(&self, connection: ConnectionId, error: ServerError) {
        debug!(connection, error = %error, "request rejected");
        self.gateway
            .send(connection, ServerMessage::error(error.to_string()));
    }

    // ------------------------------------------------------------------------
    // Game flow
    // ------------------------------------------------------------------------

    /// Create a session and send each human seat its snapshot. An automated
    /// seat one moves before the snapshots go out, so they already show its
    /// opening disc.
    fn start_game(&mut self, seat_one: Participant, seat_two: Participant) -> GameId {
        let game_id = self.sessions.create(seat_one, seat_two);
        let opening = self.play_automated(game_id);

        if let Some(session) = self.sessions.get(game_id) {
            info!(
                game_id,
                seat_one = session.participant(Seat::One).name(),
                seat_two = session.participant(Seat::Two).name(),
                "game started"
            );
            for seat in Seat::ALL {
                if let Some(connection) = session.transport(seat) {
                    self.gateway
                        .send(connection, session.start_message(seat).into());
                }
            }
        }

        if let Some(MoveApplied {
            outcome: Some(outcome),
            ..
        }) = opening
        {
            self.conclude(game_id, outcome);
        }
        game_id
    }

    /// Broadcast an applied move, then either conclude the game or let the
    /// automated seat answer.
    fn announce_move(&mut self, game_id: GameId, applied: MoveApplied) {
        if let Some(session) = self.sessions.get(game_id) {
            let update = session.update_message(applied.placement);
            self.gateway.broadcast(session, &update.into());
        }

        match applied.outcome {
            Some(outcome) => self.conclude(game_id, outcome),
            None => self.schedule_automated(game_id),
        }
    }

    fn schedule_automated(&mut self, game_id: GameId) {
        if !self
            .sessions
            .get(game_id)
            .is_some_and(Session::automated_to_move)
        {
            return;
        }

        let delay = self.config.opponent_delay();
        if delay.is_zero() {
            self.answer_automated(game_id);
            return;
        }
        let timer = self
            .timers
            .schedule(self.now + delay, TimerKind::Opponent { game_id });
        if let Some(stale) = self.opponent_timers.insert(game_id, timer) {
            self.timers.cancel(stale);
        }
    }

    fn answer_automated(&mut self, game_id: GameId) {
        if let Some(applied) = self.play_automated(game_id) {
            self.announce_move(game_id, applied);
        }
    }

    /// Apply one policy move if the automated seat is to move. No output.
    fn play_automated(&mut self, game_id: GameId) -> Option<MoveApplied> {
        let session = self.sessions.get_mut(game_id)?;
        if !session.automated_to_move() {
            return None;
        }
        let seat = session.turn();
        let column = choose_column(session.board(), seat)?;
        let column = i32::try_from(column).ok()?;
        match session.apply_move(Actor::Automated, column) {
            Ok(applied) => {
                debug!(game_id, seat = seat.number(), column, "automated move");
                Some(applied)
            }
            Err(e) => {
                warn!(game_id, error = %e, "automated move rejected");
                None
            }
        }
    }

    /// Run everything that follows a terminal transition. Called exactly
    /// once per session, with the outcome that transition returned.
    fn conclude(&mut self, game_id: GameId, outcome: Outcome) {
        let Some(session) = self.sessions.get(game_id) else {
            return;
        };

        if let Some(end) = session.end_message() {
            info!(
                game_id,
                winner = %end.winner,
                draw = end.draw,
                reason = outcome.reason.as_str(),
                "game finished"
            );
            self.gateway.broadcast(session, &end.into());
        }
        let record = session.record();

        self.presence.purge_game(game_id, &mut self.timers);
        if let Some(timer) = self.opponent_timers.remove(&game_id) {
            self.timers.cancel(timer);
        }
        self.timers.schedule(
            self.now + self.config.finished_retention(),
            TimerKind::Retention { game_id },
        );

        if let Some(record) = record {
            if let Err(e) = self.store.record_completed_game(&record) {
                warn!(game_id, error = %e, "failed to persist game record");
            }
        }
        match self.store.fetch_top_winners(self.config.leaderboard_limit) {
            Ok(entries) => {
                self.gateway.broadcast_leaderboard(&entries);
            }
            Err(e) => warn!(game_id, error = %e, "leaderboard unavailable"),
        }
    }

    fn fire(&mut self, id: TimerId, kind: TimerKind) {
        match kind {
            TimerKind::Matchmaking { connection } => {
                if let Some(candidate) = self.matchmaker.expire(connection, id) {
                    info!(connection, username = %candidate.username, "no opponent, pairing with automated seat");
                    self.start_game(
                        Participant::human(candidate.username, candidate.connection),
                        Participant::automated(self.config.automated_name.clone()),
                    );
                }
            }
            TimerKind::Reconnect { username } => {
                if let Some((game_id, outcome)) =
                    self.presence.expire(&username, id, &mut self.sessions)
                {
                    warn!(game_id, username = %username, "rejoin grace expired, seat abandoned");
                    self.conclude(game_id, outcome);
                }
            }
            TimerKind::Opponent { game_id } => {
                if self.opponent_timers.get(&game_id) == Some(&id) {
                    self.opponent_timers.remove(&game_id);
                    self.answer_automated(game_id);
                }
            }
            TimerKind::Retention { game_id } => {
                if self.sessions.remove_finished(game_id).is_some() {
                    debug!(game_id, "finished session dropped");
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
