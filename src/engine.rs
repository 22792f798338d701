//! The scan engine: one state machine per host input.
//!
//! Events flow ingest tap -> session buffer -> transport classifier ->
//! completion detector -> safety governor -> dispatch gate -> sink. Every
//! call is synchronous; time only moves when the host passes a new `now`,
//! and deferred work happens in `tick`.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::completion::{Arm, Completion, CompletionDetector, Discard};
use crate::config::ScanConfig;
use crate::dispatch::{self, DispatchGate, DispatchRecord, Scan, ScanSink};
use crate::error::ConfigError;
use crate::governor::{GovernorState, SafetyGovernor, StopReason};
use crate::ingest::{self, HostInput, KeyInput, TapEvent, ValueChange, WriteOrigin};
use crate::session::ScanSession;
use crate::timer::{TimerKind, Timers};
use crate::transport::TransportProfile;

/// Why an event was thrown away before reaching the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum DropReason {
    Blocked,
    Processing,
    ProgrammaticWrite,
    /// Tail of a burst already discarded as too long
    Overrun,
}

/// Result of feeding one event or firing one timer.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Not an event the engine cares about
    Ignored,
    /// Character(s) added to the current session
    Buffered,
    Dropped(DropReason),
    Discarded(Discard),
    Dispatched(Scan),
    EmergencyStop(StopReason),
    /// Dispatch cooldown over; input accepted again
    Released,
    /// Lockout over; host input re-enabled
    Unblocked,
}

pub struct ScanEngine<S> {
    config: ScanConfig,
    session: ScanSession,
    detector: CompletionDetector,
    governor: SafetyGovernor,
    gate: DispatchGate,
    timers: Timers,
    host: Option<Box<dyn HostInput>>,
    sink: S,
    overrun: Option<Overrun>,
}

/// The rest of a burst that ran past `max_length`. It ends at a terminator
/// or at the first gap the burst's profile counts as a takeover.
#[derive(Debug, Clone, Copy)]
struct Overrun {
    last: Instant,
    takeover: Duration,
}

impl<S: ScanSink> ScanEngine<S> {
    pub fn new(config: ScanConfig, sink: S) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            session: ScanSession::new(&config),
            detector: CompletionDetector::new(&config),
            governor: SafetyGovernor::new(&config),
            gate: DispatchGate::new(&config),
            timers: Timers::new(),
            host: None,
            sink,
            overrun: None,
            config,
        })
    }

    /// Attaches the engine to a host input, returning the previously bound one.
    pub fn bind(&mut self, host: impl HostInput + 'static) -> Option<Box<dyn HostInput>> {
        let mut host: Box<dyn HostInput> = Box::new(host);
        host.set_disabled(self.governor.is_blocked());
        self.host.replace(host)
    }

    pub fn unbind(&mut self) -> Option<Box<dyn HostInput>> {
        self.host.take()
    }

    pub fn is_bound(&self) -> bool {
        self.host.is_some()
    }

    pub fn handle_key(&mut self, input: &KeyInput, now: Instant) -> Outcome {
        let Some(event) = ingest::classify(input, &self.config) else {
            return Outcome::Ignored;
        };
        if event == TapEvent::Abort {
            return self.emergency_stop(StopReason::ManualAbort, now);
        }
        if self.governor.is_blocked() {
            return Outcome::Dropped(DropReason::Blocked);
        }

        match event {
            TapEvent::Payload(c) => {
                if let Err(reason) = self.governor.record_event(now) {
                    return self.emergency_stop(reason, now);
                }
                if self.gate.is_processing() {
                    return Outcome::Dropped(DropReason::Processing);
                }
                if self.absorb_overrun(now) {
                    return Outcome::Dropped(DropReason::Overrun);
                }
                let mut utf8 = [0u8; 4];
                self.accept(c.encode_utf8(&mut utf8), now)
            }
            TapEvent::Terminator => {
                if self.gate.is_processing() {
                    Outcome::Dropped(DropReason::Processing)
                } else if self.overrun.take().is_some() {
                    debug!("terminator ends an overlong burst");
                    Outcome::Dropped(DropReason::Overrun)
                } else if self.session.is_empty() {
                    Outcome::Ignored
                } else {
                    self.finalize(Completion::Terminator, now)
                }
            }
            TapEvent::Erase => {
                if self.gate.is_processing() {
                    Outcome::Dropped(DropReason::Processing)
                } else if self.session.is_empty() {
                    Outcome::Ignored
                } else {
                    self.discard(Discard::ManualTyping)
                }
            }
            TapEvent::Abort => unreachable!("abort handled above"),
        }
    }

    /// Reconciles the session with the host input's new value.
    ///
    /// The host value is the ground truth: coalesced or reordered key events
    /// are repaired here.
    pub fn handle_value_change(&mut self, change: &ValueChange, now: Instant) -> Outcome {
        if change.origin == WriteOrigin::Programmatic {
            return Outcome::Dropped(DropReason::ProgrammaticWrite);
        }
        if self.governor.is_blocked() {
            return Outcome::Dropped(DropReason::Blocked);
        }
        if let Err(reason) = self.governor.record_event(now) {
            return self.emergency_stop(reason, now);
        }
        if self.gate.is_processing() {
            return Outcome::Dropped(DropReason::Processing);
        }

        let (content, terminated) = ingest::strip_terminators(&change.value, &self.config);
        if self.absorb_overrun(now) {
            if terminated {
                self.overrun = None;
            }
            return Outcome::Dropped(DropReason::Overrun);
        }
        let outcome = if content.starts_with(self.session.buffer()) {
            let appended = &content[self.session.buffer().len()..];
            if appended.is_empty() {
                Outcome::Ignored
            } else {
                self.accept(appended, now)
            }
        } else if content.chars().count() < self.session.len() {
            return self.discard(Discard::ManualTyping);
        } else {
            debug!("host value diverged from buffer, restarting session");
            self.discard_session();
            self.accept(content, now)
        };

        match outcome {
            Outcome::Buffered | Outcome::Ignored if terminated && !self.session.is_empty() => {
                self.finalize(Completion::Terminator, now)
            }
            other => other,
        }
    }

    /// Re-reads the bound host's live value, for hosts whose change events carry no value.
    pub fn sync_from_host(&mut self, now: Instant) -> Outcome {
        match self.host.as_ref().and_then(|host| host.value()) {
            Some(value) => self.handle_value_change(&ValueChange::external(value), now),
            None => Outcome::Ignored,
        }
    }

    /// Fires every timer due at `now`, earliest first.
    pub fn tick(&mut self, now: Instant) -> Vec<Outcome> {
        let mut outcomes = Vec::new();
        while let Some((kind, deadline)) = self.timers.pop_due(now) {
            let at = deadline.at;
            let outcome = match kind {
                TimerKind::Quiescence => {
                    if self.session.is_empty() {
                        continue;
                    }
                    if deadline.revision != self.session.revision() {
                        self.arm(at);
                        continue;
                    }
                    self.finalize(Completion::Quiescence, at)
                }
                TimerKind::MaxLengthGrace => {
                    if self.session.is_empty() {
                        continue;
                    }
                    self.finalize(Completion::MaxLength, at)
                }
                TimerKind::DispatchCooldown => {
                    self.gate.release();
                    Outcome::Released
                }
                TimerKind::Lockout => {
                    self.governor.unblock();
                    if let Some(host) = self.host.as_mut() {
                        host.set_disabled(false);
                    }
                    info!("lockout over, input re-enabled");
                    Outcome::Unblocked
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// When the host should call `tick` next.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Drops the session, its timers, the dispatch record and governor
    /// counters. A running lockout is left alone.
    pub fn reset(&mut self) {
        self.discard_session();
        self.overrun = None;
        self.timers.cancel(TimerKind::DispatchCooldown);
        self.gate.release();
        self.governor.clear_counters();
    }

    /// Like `reset`, and also lifts any lockout.
    pub fn abort(&mut self) {
        self.reset();
        self.timers.cancel(TimerKind::Lockout);
        if self.governor.is_blocked() {
            self.governor.unblock();
            if let Some(host) = self.host.as_mut() {
                host.set_disabled(false);
            }
            info!("lockout lifted by host");
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn buffer(&self) -> &str {
        self.session.buffer()
    }

    pub fn session(&self) -> &ScanSession {
        &self.session
    }

    pub fn profile(&self) -> TransportProfile {
        self.session.profile()
    }

    pub fn is_blocked(&self) -> bool {
        self.governor.is_blocked()
    }

    pub fn is_processing(&self) -> bool {
        self.gate.is_processing()
    }

    pub fn governor_state(&self) -> &GovernorState {
        self.governor.state()
    }

    pub fn is_timer_pending(&self, kind: TimerKind) -> bool {
        self.timers.is_pending(kind)
    }

    pub fn dispatch_record(&self) -> DispatchRecord {
        self.gate.record()
    }

    fn accept(&mut self, text: &str, now: Instant) -> Outcome {
        if self.session.is_takeover(now) {
            debug!(
                buffered = self.session.len(),
                "gap too long for a scan, treating buffer as manual typing"
            );
            self.discard_session();
        }
        self.session.accept_str(text, now);
        if let Err(reason) = self.governor.check_buffer(self.session.len()) {
            return self.emergency_stop(reason, now);
        }
        self.arm(now);
        Outcome::Buffered
    }

    fn arm(&mut self, now: Instant) {
        let revision = self.session.revision();
        match self.detector.after_accept(&self.session) {
            Arm::Quiescence(window) => {
                self.timers
                    .schedule(TimerKind::Quiescence, now, window, revision);
            }
            Arm::MaxLengthGrace(grace) => {
                self.timers.cancel(TimerKind::Quiescence);
                if !self.timers.is_pending(TimerKind::MaxLengthGrace) {
                    self.timers
                        .schedule(TimerKind::MaxLengthGrace, now, grace, revision);
                }
            }
        }
    }

    fn finalize(&mut self, completion: Completion, now: Instant) -> Outcome {
        let verdict = match completion {
            Completion::Quiescence => self.detector.on_quiescence(&self.session),
            Completion::Terminator | Completion::MaxLength => {
                self.detector.validate(self.session.candidate())
            }
        }
        .map(str::to_owned);

        match verdict {
            Ok(value) => self.dispatch(value, completion, now),
            Err(Discard::TooLong) if completion == Completion::MaxLength => {
                self.overrun = self.session.last_char_at().map(|last| Overrun {
                    last,
                    takeover: self.session.classifier().takeover_gap(),
                });
                self.discard(Discard::TooLong)
            }
            Err(reason) => self.discard(reason),
        }
    }

    /// Swallows a character that still belongs to an overlong burst.
    fn absorb_overrun(&mut self, now: Instant) -> bool {
        let Some(overrun) = self.overrun.as_mut() else {
            return false;
        };
        if now.saturating_duration_since(overrun.last) > overrun.takeover {
            self.overrun = None;
            return false;
        }
        overrun.last = now;
        true
    }

    fn dispatch(&mut self, value: String, completion: Completion, now: Instant) -> Outcome {
        let profile = self.session.profile();
        let scan = Scan {
            value,
            profile,
            completion,
            started_at: self.session.session_start().unwrap_or(now),
            completed_at: now,
            gaps: self.session.gap_stats(),
        };

        let cooldown = self.gate.begin(profile);
        self.discard_session();
        if self.config.clear_host_input_on_dispatch {
            if let Some(host) = self.host.as_mut() {
                host.clear();
            }
        }

        info!(
            value = %scan.value,
            %profile,
            %completion,
            mean_gap_ms = scan.gaps.mean_ms,
            "scan dispatched"
        );
        dispatch::deliver(&mut self.sink, &scan);

        self.timers.schedule(
            TimerKind::DispatchCooldown,
            now,
            cooldown,
            self.session.revision(),
        );
        Outcome::Dispatched(scan)
    }

    fn discard(&mut self, reason: Discard) -> Outcome {
        debug!(%reason, buffered = self.session.len(), "session discarded");
        self.discard_session();
        Outcome::Discarded(reason)
    }

    fn discard_session(&mut self) {
        self.session.reset();
        self.timers.cancel(TimerKind::Quiescence);
        self.timers.cancel(TimerKind::MaxLengthGrace);
    }

    fn emergency_stop(&mut self, reason: StopReason, now: Instant) -> Outcome {
        warn!(
            %reason,
            buffered = self.session.len(),
            events = self.governor.state().event_count,
            "emergency stop, locking out input"
        );
        self.session.reset();
        self.overrun = None;
        self.timers.cancel_all();
        self.gate.release();
        let lockout = self.governor.block();
        if let Some(host) = self.host.as_mut() {
            host.clear();
            host.set_disabled(true);
        }
        self.timers
            .schedule(TimerKind::Lockout, now, lockout, self.session.revision());
        Outcome::EmergencyStop(reason)
    }
}
