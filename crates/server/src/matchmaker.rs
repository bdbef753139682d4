//! First-come pairing of joiners.
//!
//! A joiner either pairs with the oldest waiting entry or waits with a
//! matchmaking timer. Creating the session is left to the coordinator.

use std::collections::VecDeque;
use std::time::Duration;

use crate::gateway::ConnectionId;
use crate::timers::{Scheduler, TimerId, TimerKind};

/// A human asking to play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub username: String,
    pub connection: ConnectionId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingEntry {
    pub candidate: Candidate,
    pub timer: TimerId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// `first` waited longest and takes seat one.
    Paired { first: Candidate, second: Candidate },
    /// Nobody was waiting; the candidate now is.
    Queued { timer: TimerId },
}

#[derive(Debug, Default)]
pub struct Matchmaker {
    waiting: VecDeque<WaitingEntry>,
}

impl Matchmaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pair `candidate` with the oldest waiting entry, or queue it with a
    /// timer firing at `deadline`.
    pub fn join(
        &mut self,
        candidate: Candidate,
        timers: &mut Scheduler,
        deadline: Duration,
    ) -> JoinOutcome {
        if let Some(entry) = self.waiting.pop_front() {
            timers.cancel(entry.timer);
            return JoinOutcome::Paired {
                first: entry.candidate,
                second: candidate,
            };
        }

        let timer = timers.schedule(
            deadline,
            TimerKind::Matchmaking {
                connection: candidate.connection,
            },
        );
        self.waiting.push_back(WaitingEntry { candidate, timer });
        JoinOutcome::Queued { timer }
    }

    /// Take the entry whose matchmaking timer just fired. Returns `None` if
    /// that entry was already paired or withdrawn.
    pub fn expire(&mut self, connection: ConnectionId, timer: TimerId) -> Option<Candidate> {
        let index = self
            .waiting
            .iter()
            .position(|entry| entry.timer == timer && entry.candidate.connection == connection)?;
        self.waiting.remove(index).map(|entry| entry.candidate)
    }

    /// Withdraw a waiting transport, cancelling its timer.
    pub fn withdraw(
        &mut self,
        connection: ConnectionId,
        timers: &mut Scheduler,
    ) -> Option<Candidate> {
        let index = self
            .waiting
            .iter()
            .position(|entry| entry.candidate.connection == connection)?;
        let entry = self.waiting.remove(index)?;
        timers.cancel(entry.timer);
        Some(entry.candidate)
    }

    pub fn is_waiting(&self, connection: ConnectionId) -> bool {
        self.waiting
            .iter()
            .any(|entry| entry.candidate.connection == connection)
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}
