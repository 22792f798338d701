use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use crossterm::event::{self, Event as CtEvent, KeyEvent};

use crate::ingest::KeyInput;

/// Unified event type consumed by the app runner
#[derive(Clone, Debug)]
pub enum ScanEvent {
    Key(KeyEvent),
    /// Keystroke produced by a simulated peripheral rather than the terminal
    Injected(KeyInput),
    Resize,
    Tick,
}

/// Source of terminal events (keyboard, resize, etc.)
pub trait ScanEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    /// Returns Ok(event) if an event arrives before the timeout, or Err(Timeout) if it expires.
    fn recv_timeout(&self, timeout: Duration) -> Result<ScanEvent, RecvTimeoutError>;
}

/// Production event source using crossterm.
///
/// `injector` hands out a sender so simulated peripherals share the same queue.
pub struct CrosstermEventSource {
    rx: Receiver<ScanEvent>,
    tx: Sender<ScanEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        let reader_tx = tx.clone();

        std::thread::spawn(move || loop {
            let forwarded = match event::read() {
                Ok(CtEvent::Key(key)) => reader_tx.send(ScanEvent::Key(key)),
                Ok(CtEvent::Resize(_, _)) => reader_tx.send(ScanEvent::Resize),
                Ok(_) => Ok(()),
                Err(_) => break,
            };
            if forwarded.is_err() {
                break;
            }
        });

        Self { rx, tx }
    }

    pub fn injector(&self) -> Sender<ScanEvent> {
        self.tx.clone()
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<ScanEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Test event source for unit tests
pub struct TestEventSource {
    rx: Receiver<ScanEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<ScanEvent>) -> Self {
        Self { rx }
    }
}

impl ScanEventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<ScanEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Runner that advances the application one event/tick at a time
pub struct Runner<E: ScanEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: ScanEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    /// Blocks until the next event, the tick interval, or `deadline`, whichever
    /// comes first. Returns Tick on timeout.
    pub fn step(&self, deadline: Option<Instant>) -> ScanEvent {
        let mut timeout = self.ticker.interval();
        if let Some(deadline) = deadline {
            timeout = timeout.min(deadline.saturating_duration_since(Instant::now()));
        }
        match self.event_source.recv_timeout(timeout) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => ScanEvent::Tick,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn step_returns_tick_on_timeout() {
        let (_tx, rx) = mpsc::channel();
        let es = TestEventSource::new(rx);
        let ticker = FixedTicker::new(Duration::from_millis(1));
        let runner = Runner::new(es, ticker);

        // With no events available, step should yield Tick
        let ev = runner.step(None);
        match ev {
            ScanEvent::Tick => {}
            _ => panic!("expected Tick on timeout"),
        }
    }

    #[test]
    fn step_passes_through_events() {
        let (tx, rx) = mpsc::channel();
        tx.send(ScanEvent::Resize).unwrap();
        let es = TestEventSource::new(rx);
        let ticker = FixedTicker::new(Duration::from_millis(10));
        let runner = Runner::new(es, ticker);

        match runner.step(None) {
            ScanEvent::Resize => {}
            _ => panic!("expected Resize event"),
        }
    }

    #[test]
    fn step_wakes_for_an_earlier_deadline() {
        let (_tx, rx) = mpsc::channel();
        let es = TestEventSource::new(rx);
        let ticker = FixedTicker::new(Duration::from_secs(5));
        let runner = Runner::new(es, ticker);

        let started = Instant::now();
        let ev = runner.step(Some(started + Duration::from_millis(20)));
        assert!(matches!(ev, ScanEvent::Tick));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
