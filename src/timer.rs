//! Deferred one-shot timers owned by the engine.
//!
//! Each kind has at most one pending deadline. Scheduling a kind replaces its
//! previous deadline, so a timer is always cancelled and rescheduled rather
//! than left to race.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum TimerKind {
    /// No further input arrived within the quiescence window
    Quiescence,
    /// Last chance for a terminator after a full-length buffer
    MaxLengthGrace,
    /// End of the post-dispatch cooldown
    DispatchCooldown,
    /// End of an emergency-stop lockout
    Lockout,
}

impl TimerKind {
    const ALL: [TimerKind; 4] = [
        TimerKind::Quiescence,
        TimerKind::MaxLengthGrace,
        TimerKind::DispatchCooldown,
        TimerKind::Lockout,
    ];

    fn slot(self) -> usize {
        match self {
            TimerKind::Quiescence => 0,
            TimerKind::MaxLengthGrace => 1,
            TimerKind::DispatchCooldown => 2,
            TimerKind::Lockout => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    pub at: Instant,
    /// Session revision the timer was scheduled against
    pub revision: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Timers {
    slots: [Option<Deadline>; 4],
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, kind: TimerKind, now: Instant, after: Duration, revision: u64) {
        self.slots[kind.slot()] = Some(Deadline {
            at: now + after,
            revision,
        });
    }

    pub fn cancel(&mut self, kind: TimerKind) -> Option<Deadline> {
        self.slots[kind.slot()].take()
    }

    pub fn cancel_all(&mut self) {
        self.slots = [None; 4];
    }

    pub fn get(&self, kind: TimerKind) -> Option<Deadline> {
        self.slots[kind.slot()]
    }

    pub fn is_pending(&self, kind: TimerKind) -> bool {
        self.get(kind).is_some()
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots.iter().flatten().map(|d| d.at).min()
    }

    /// Removes and returns the earliest timer due at `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<(TimerKind, Deadline)> {
        let kind = TimerKind::ALL
            .into_iter()
            .filter_map(|kind| self.get(kind).map(|d| (kind, d)))
            .filter(|(_, d)| d.at <= now)
            .min_by_key(|(_, d)| d.at)
            .map(|(kind, _)| kind)?;
        self.cancel(kind).map(|deadline| (kind, deadline))
    }
}
