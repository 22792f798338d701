//! Dispatch gate: at most one delivery per completed session.

use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use crate::completion::Completion;
use crate::config::ScanConfig;
use crate::error::SinkError;
use crate::transport::{GapStats, TransportProfile};

/// A finalized scan as handed to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
    pub value: String,
    pub profile: TransportProfile,
    pub completion: Completion,
    pub started_at: Instant,
    pub completed_at: Instant,
    pub gaps: GapStats,
}

impl Scan {
    pub fn duration(&self) -> Duration {
        self.completed_at.saturating_duration_since(self.started_at)
    }
}

/// Consumer of decoded scans.
///
/// Errors and panics from either callback are caught and logged; they never
/// reach the ingest path.
pub trait ScanSink {
    fn on_scan(&mut self, scan: &Scan) -> Result<(), SinkError>;

    /// Secondary hook, invoked after `on_scan`.
    fn on_scan_complete(&mut self, _scan: &Scan) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<F> ScanSink for F
where
    F: FnMut(&Scan) -> Result<(), SinkError>,
{
    fn on_scan(&mut self, scan: &Scan) -> Result<(), SinkError> {
        self(scan)
    }
}

type Callback = Box<dyn FnMut(&Scan) -> Result<(), SinkError>>;

/// Closure-based sink with an optional secondary callback.
pub struct Callbacks {
    on_scan: Callback,
    on_scan_complete: Option<Callback>,
}

impl Callbacks {
    pub fn new(on_scan: impl FnMut(&Scan) -> Result<(), SinkError> + 'static) -> Self {
        Self {
            on_scan: Box::new(on_scan),
            on_scan_complete: None,
        }
    }

    pub fn on_complete(
        mut self,
        on_scan_complete: impl FnMut(&Scan) -> Result<(), SinkError> + 'static,
    ) -> Self {
        self.on_scan_complete = Some(Box::new(on_scan_complete));
        self
    }
}

impl ScanSink for Callbacks {
    fn on_scan(&mut self, scan: &Scan) -> Result<(), SinkError> {
        (self.on_scan)(scan)
    }

    fn on_scan_complete(&mut self, scan: &Scan) -> Result<(), SinkError> {
        match self.on_scan_complete.as_mut() {
            Some(callback) => callback(scan),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchRecord {
    /// Set from an accepted decode until the cooldown elapses
    pub processing: bool,
}

#[derive(Debug, Clone)]
pub struct DispatchGate {
    record: DispatchRecord,
    fast_cooldown: Duration,
    moderate_cooldown: Duration,
}

impl DispatchGate {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            record: DispatchRecord::default(),
            fast_cooldown: Duration::from_millis(config.dispatch_cooldown_ms),
            moderate_cooldown: Duration::from_millis(config.moderate_dispatch_cooldown_ms),
        }
    }

    pub fn record(&self) -> DispatchRecord {
        self.record
    }

    pub fn is_processing(&self) -> bool {
        self.record.processing
    }

    /// Claims the gate and returns the cooldown before it can be claimed again.
    pub fn begin(&mut self, profile: TransportProfile) -> Duration {
        self.record.processing = true;
        self.cooldown(profile)
    }

    pub fn release(&mut self) {
        self.record = DispatchRecord::default();
    }

    /// Moderate devices are more likely to still be delivering trailing events.
    pub fn cooldown(&self, profile: TransportProfile) -> Duration {
        match profile {
            TransportProfile::Moderate => self.moderate_cooldown,
            TransportProfile::Unknown | TransportProfile::Fast => self.fast_cooldown,
        }
    }
}

/// Runs both callbacks, containing any failure.
pub fn deliver<S: ScanSink + ?Sized>(sink: &mut S, scan: &Scan) {
    let primary = panic::catch_unwind(AssertUnwindSafe(|| sink.on_scan(scan)));
    log_failure("on_scan", primary);
    let secondary = panic::catch_unwind(AssertUnwindSafe(|| sink.on_scan_complete(scan)));
    log_failure("on_scan_complete", secondary);
}

fn log_failure(callback: &'static str, result: std::thread::Result<Result<(), SinkError>>) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::warn!(callback, %err, "scan callback failed"),
        Err(_) => tracing::warn!(callback, "scan callback panicked"),
    }
}
