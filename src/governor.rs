//! Safety governor.
//!
//! Bounds the event rate and the buffer length so that a feedback loop (for
//! instance clearing the host input being observed as new input) can never
//! sustain itself. Tripping it means an emergency stop: the session is
//! dropped and input is locked out for a fixed cooldown.

use std::time::{Duration, Instant};

use crate::config::ScanConfig;

pub const RATE_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum StopReason {
    RateExceeded,
    BufferOverflow,
    ManualAbort,
}

/// Outlives individual sessions; only the governor and its lockout timer change it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GovernorState {
    pub event_count: u32,
    pub window_start: Option<Instant>,
    pub blocked: bool,
}

#[derive(Debug, Clone)]
pub struct SafetyGovernor {
    max_events: u32,
    buffer_ceiling: usize,
    lockout: Duration,
    state: GovernorState,
}

impl SafetyGovernor {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            max_events: config.max_events_per_second,
            buffer_ceiling: config.buffer_ceiling(),
            lockout: config.lockout(),
            state: GovernorState::default(),
        }
    }

    pub fn state(&self) -> &GovernorState {
        &self.state
    }

    pub fn is_blocked(&self) -> bool {
        self.state.blocked
    }

    /// Counts one input event against the rate ceiling.
    pub fn record_event(&mut self, now: Instant) -> Result<(), StopReason> {
        let window_open = self
            .state
            .window_start
            .is_some_and(|start| now.saturating_duration_since(start) < RATE_WINDOW);
        if !window_open {
            self.state.window_start = Some(now);
            self.state.event_count = 0;
        }
        self.state.event_count += 1;

        if self.state.event_count > self.max_events {
            Err(StopReason::RateExceeded)
        } else {
            Ok(())
        }
    }

    pub fn check_buffer(&self, len: usize) -> Result<(), StopReason> {
        if len > self.buffer_ceiling {
            Err(StopReason::BufferOverflow)
        } else {
            Ok(())
        }
    }

    /// Enters lockout and returns how long it lasts.
    pub fn block(&mut self) -> Duration {
        self.clear_counters();
        self.state.blocked = true;
        self.lockout
    }

    pub fn unblock(&mut self) {
        self.state.blocked = false;
    }

    pub fn clear_counters(&mut self) {
        self.state.event_count = 0;
        self.state.window_start = None;
    }
}
