//! Disconnect grace and rejoin.
//!
//! When a seated transport closes mid-game the seat is held for the rejoin
//! grace period under the participant's identity. Rejoining within the
//! window restores the seat; expiry forfeits it.
//!
//! At most one record exists per identity. If the same identity loses a
//! second seat while a record is pending, the older seat is given up at
//! once and reported to the caller.

use std::collections::HashMap;
use std::time::Duration;

use fourline_engine::Seat;
use fourline_wire::{GameId, GameStart};
use tracing::info;

use crate::error::IllegalStateError;
use crate::gateway::ConnectionId;
use crate::session::{Outcome, SessionRegistry};
use crate::timers::{Scheduler, TimerId, TimerKind};

/// A seat held for rejoin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectRecord {
    pub username: String,
    pub game_id: GameId,
    pub seat: Seat,
    pub timer: TimerId,
}

#[derive(Debug, Default)]
pub struct PresenceManager {
    records: HashMap<String, DisconnectRecord>,
}

impl PresenceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, username: &str) -> Option<&DisconnectRecord> {
        self.records.get(username)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Unbind `connection` from every playing seat it holds and start a
    /// reconnect timer for each, due at `deadline`.
    ///
    /// Returns seats displaced by a newer record for the same identity; the
    /// caller must abandon them.
    pub fn disconnect(
        &mut self,
        connection: ConnectionId,
        sessions: &mut SessionRegistry,
        timers: &mut Scheduler,
        deadline: Duration,
    ) -> Vec<(GameId, Seat)> {
        let mut displaced = Vec::new();

        for (game_id, seat) in sessions.playing_seats_of(connection) {
            let Some(session) = sessions.get_mut(game_id) else {
                continue;
            };
            session.detach_transport(seat);
            let username = session.participant(seat).name().to_string();
            let timer = timers.schedule(
                deadline,
                TimerKind::Reconnect {
                    username: username.clone(),
                },
            );
            info!(game_id, username = %username, seat = seat.number(), "seat held for rejoin");

            let record = DisconnectRecord {
                username: username.clone(),
                game_id,
                seat,
                timer,
            };
            if let Some(previous) = self.records.insert(username, record) {
                timers.cancel(previous.timer);
                displaced.push((previous.game_id, previous.seat));
            }
        }

        displaced
    }

    /// Restore `username`'s held seat onto `connection`.
    ///
    /// The record and its timer are consumed either way; a record that
    /// points at a session no longer playing yields `NoActiveSession`.
    pub fn rejoin(
        &mut self,
        username: &str,
        connection: ConnectionId,
        sessions: &mut SessionRegistry,
        timers: &mut Scheduler,
    ) -> Result<GameStart, IllegalStateError> {
        let record = self
            .records
            .remove(username)
            .ok_or(IllegalStateError::NoActiveSession)?;
        timers.cancel(record.timer);

        let session = sessions
            .get_mut(record.game_id)
            .filter(|session| session.is_playing())
            .ok_or(IllegalStateError::NoActiveSession)?;
        session.attach_transport(record.seat, connection)?;
        Ok(session.start_message(record.seat))
    }

    /// Handle a fired reconnect timer. The seat is abandoned only if the
    /// timer still belongs to the pending record.
    pub fn expire(
        &mut self,
        username: &str,
        timer: TimerId,
        sessions: &mut SessionRegistry,
    ) -> Option<(GameId, Outcome)> {
        if self.records.get(username)?.timer != timer {
            return None;
        }
        let record = self.records.remove(username)?;
        let outcome = sessions.get_mut(record.game_id)?.abandon(record.seat)?;
        Some((record.game_id, outcome))
    }

    /// Drop every record for a finished game, cancelling their timers.
    pub fn purge_game(&mut self, game_id: GameId, timers: &mut Scheduler) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| {
            if record.game_id == game_id {
                timers.cancel(record.timer);
                false
            } else {
                true
            }
        });
        before - self.records.len()
    }
}
