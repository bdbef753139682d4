//! Outbound delivery to connected transports.
//!
//! Delivery is best effort. A transport whose receiving side has gone away
//! is skipped and logged at debug level; the failure never reaches game
//! state. Automated seats have no transport and are skipped silently.

use std::collections::BTreeMap;

use fourline_engine::Seat;
use fourline_wire::{LeaderboardEntry, ServerMessage};
use tokio::sync::mpsc;
use tracing::debug;

use crate::session::Session;

/// Identifier of one live transport.
pub type ConnectionId = u64;

/// Sending half of a transport's outbound queue.
pub type Outbound = mpsc::UnboundedSender<ServerMessage>;

/// Registry of live transports.
#[derive(Debug, Default)]
pub struct Gateway {
    next_id: ConnectionId,
    connections: BTreeMap<ConnectionId, Outbound>,
}

impl Gateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transport and assign its id.
    pub fn register(&mut self, outbound: Outbound) -> ConnectionId {
        self.next_id += 1;
        let id = self.next_id;
        self.connections.insert(id, outbound);
        id
    }

    pub fn unregister(&mut self, connection: ConnectionId) -> bool {
        self.connections.remove(&connection).is_some()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Send to one transport. Returns whether the message was queued.
    pub fn send(&self, connection: ConnectionId, message: ServerMessage) -> bool {
        let Some(tx) = self.connections.get(&connection) else {
            debug!(connection, kind = message.kind_name(), "send skipped, transport unknown");
            return false;
        };
        let kind = message.kind_name();
        if tx.send(message).is_err() {
            debug!(connection, kind, "send skipped, transport closed");
            return false;
        }
        true
    }

    /// Send to every seat of a session that currently has a transport.
    /// Returns the number of transports reached.
    pub fn broadcast(&self, session: &Session, message: &ServerMessage) -> usize {
        Seat::ALL
            .into_iter()
            .filter_map(|seat| session.transport(seat))
            .filter(|&connection| self.send(connection, message.clone()))
            .count()
    }

    /// Send a leaderboard snapshot to every registered transport.
    pub fn broadcast_leaderboard(&self, entries: &[LeaderboardEntry]) -> usize {
        let message = ServerMessage::leaderboard(entries.to_vec());
        self.connections
            .keys()
            .filter(|&&connection| self.send(connection, message.clone()))
            .count()
    }
}
