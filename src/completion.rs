//! Completion detector.
//!
//! Two strategies decide when a buffer is a finished scan: an explicit
//! terminator ends it synchronously, while quiescence waits for a stability
//! window with no further input. Reaching `max_length` shortens either path
//! to a brief grace interval.

use std::time::Duration;

use crate::config::ScanConfig;
use crate::session::ScanSession;
use crate::transport::TransportProfile;

/// How a dispatched scan was finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Completion {
    Terminator,
    Quiescence,
    MaxLength,
}

/// Why a buffer was dropped without dispatch. None of these are faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Discard {
    TooShort,
    TooLong,
    /// A person took over: long gap or deleted characters
    ManualTyping,
    /// Went quiet without evidence of a machine-paced source, or auto-submit is off
    Stale,
}

/// Timer to arm after a buffer change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arm {
    Quiescence(Duration),
    MaxLengthGrace(Duration),
}

#[derive(Debug, Clone)]
pub struct CompletionDetector {
    min_length: usize,
    max_length: usize,
    auto_submit: bool,
    fast_window: Duration,
    moderate_window: Duration,
    grace: Duration,
}

impl CompletionDetector {
    pub fn new(config: &ScanConfig) -> Self {
        let waits_for_terminator = config.wait_for_terminator && !config.terminators.is_empty();
        let fast_ms = if waits_for_terminator {
            config.terminator_wait_ms
        } else {
            config.fast_quiescence_ms
        };
        Self {
            min_length: config.min_length,
            max_length: config.max_length,
            auto_submit: config.auto_submit,
            fast_window: Duration::from_millis(fast_ms),
            moderate_window: Duration::from_millis(config.moderate_quiescence_ms),
            grace: config.max_length_grace(),
        }
    }

    /// Stability window for a profile. Unknown sessions get the long window
    /// so a moderate device has time to show its pacing.
    pub fn quiescence_window(&self, profile: TransportProfile) -> Duration {
        match profile {
            TransportProfile::Fast => self.fast_window,
            TransportProfile::Unknown | TransportProfile::Moderate => self.moderate_window,
        }
    }

    pub fn after_accept(&self, session: &ScanSession) -> Arm {
        if session.len() >= self.max_length {
            Arm::MaxLengthGrace(self.grace)
        } else {
            Arm::Quiescence(self.quiescence_window(session.profile()))
        }
    }

    /// Checks a candidate against `[min_length, max_length]`.
    pub fn validate<'a>(&self, candidate: &'a str) -> Result<&'a str, Discard> {
        let len = candidate.chars().count();
        if len < self.min_length {
            Err(Discard::TooShort)
        } else if len > self.max_length {
            Err(Discard::TooLong)
        } else {
            Ok(candidate)
        }
    }

    /// Decision when the quiescence window elapsed with the buffer unchanged.
    pub fn on_quiescence<'a>(&self, session: &'a ScanSession) -> Result<&'a str, Discard> {
        if !self.auto_submit || session.profile() == TransportProfile::Unknown {
            return Err(Discard::Stale);
        }
        self.validate(session.candidate())
    }
}
