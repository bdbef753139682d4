//! Logical-clock timer queue.
//!
//! Deadlines are offsets from server start. Nothing here reads a wall clock:
//! the coordinator passes `now` in, so tests drive time explicitly and every
//! timer can be cancelled by id.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use fourline_wire::GameId;

use crate::gateway::ConnectionId;

/// Timer identifier, unique per scheduler.
pub type TimerId = u64;

/// What a timer does when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerKind {
    /// A lone joiner has waited out the matchmaking grace.
    Matchmaking { connection: ConnectionId },
    /// A disconnected seat's rejoin grace ran out.
    Reconnect { username: String },
    /// The automated seat should answer.
    Opponent { game_id: GameId },
    /// A finished session may be dropped.
    Retention { game_id: GameId },
}

/// Pending timers ordered by deadline, then by scheduling order.
#[derive(Debug, Default)]
pub struct Scheduler {
    next_id: TimerId,
    queue: BTreeMap<(Duration, TimerId), TimerKind>,
    deadlines: HashMap<TimerId, Duration>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, deadline: Duration, kind: TimerKind) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.queue.insert((deadline, id), kind);
        self.deadlines.insert(id, deadline);
        id
    }

    /// Cancel a pending timer. Returns false if it already fired or was
    /// cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.deadlines.remove(&id) {
            Some(deadline) => self.queue.remove(&(deadline, id)).is_some(),
            None => false,
        }
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.deadlines.contains_key(&id)
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue.first_key_value().map(|((deadline, _), _)| *deadline)
    }

    /// Remove and return the earliest timer whose deadline is at or before
    /// `now`.
    pub fn pop_due(&mut self, now: Duration) -> Option<(TimerId, TimerKind)> {
        let (&(deadline, id), _) = self.queue.first_key_value()?;
        if deadline > now {
            return None;
        }
        let kind = self.queue.remove(&(deadline, id))?;
        self.deadlines.remove(&id);
        Some((id, kind))
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
