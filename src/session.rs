use std::time::{Duration, Instant};

use crate::config::ScanConfig;
use crate::transport::{GapStats, TransportClassifier, TransportProfile};

/// Working state for one candidate scan.
///
/// `buffer` is non-empty exactly when `session_start` is set.
#[derive(Debug, Clone)]
pub struct ScanSession {
    buffer: String,
    len: usize,
    stamps: Vec<Instant>,
    session_start: Option<Instant>,
    last_char_at: Option<Instant>,
    classifier: TransportClassifier,
    revision: u64,
}

impl ScanSession {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            buffer: String::new(),
            len: 0,
            stamps: Vec::new(),
            session_start: None,
            last_char_at: None,
            classifier: TransportClassifier::new(config),
            revision: 0,
        }
    }

    /// Appends one character received at `now`.
    pub fn accept_char(&mut self, c: char, now: Instant) -> TransportProfile {
        if let Some(last) = self.last_char_at {
            self.classifier
                .observe_gap(now.saturating_duration_since(last));
        }
        if self.session_start.is_none() {
            self.session_start = Some(now);
        }
        self.buffer.push(c);
        self.len += 1;
        self.stamps.push(now);
        self.last_char_at = Some(now);
        self.revision += 1;
        self.classifier.profile()
    }

    /// Appends characters that arrived together, e.g. in one coalesced value change.
    pub fn accept_str(&mut self, s: &str, now: Instant) -> TransportProfile {
        for c in s.chars() {
            self.accept_char(c, now);
        }
        self.classifier.profile()
    }

    /// Discards everything, including what the classifier learned.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.len = 0;
        self.stamps.clear();
        self.session_start = None;
        self.last_char_at = None;
        self.classifier.reset();
        self.revision += 1;
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_idle(&self) -> bool {
        self.session_start.is_none()
    }

    pub fn session_start(&self) -> Option<Instant> {
        self.session_start
    }

    pub fn last_char_at(&self) -> Option<Instant> {
        self.last_char_at
    }

    /// Bumped on every mutation; timers use it to notice a changed buffer.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn profile(&self) -> TransportProfile {
        self.classifier.profile()
    }

    pub fn classifier(&self) -> &TransportClassifier {
        &self.classifier
    }

    /// Time since the last accepted character, if any.
    pub fn gap_to(&self, now: Instant) -> Option<Duration> {
        self.last_char_at
            .map(|last| now.saturating_duration_since(last))
    }

    /// Whether a character at `now` belongs to a person rather than the current burst.
    pub fn is_takeover(&self, now: Instant) -> bool {
        self.gap_to(now)
            .is_some_and(|gap| gap > self.classifier.takeover_gap())
    }

    pub fn gap_stats(&self) -> GapStats {
        GapStats::from_timestamps(&self.stamps)
    }

    /// The buffer with surrounding whitespace removed.
    pub fn candidate(&self) -> &str {
        self.buffer.trim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn first_char_opens_session() {
        let mut session = ScanSession::new(&ScanConfig::default());
        assert!(session.is_idle());
        let t0 = Instant::now();
        session.accept_char('4', t0);
        assert_eq!(session.session_start(), Some(t0));
        assert_eq!(session.last_char_at(), Some(t0));
        assert_eq!(session.buffer(), "4");

        session.accept_char('2', t0 + ms(10));
        assert_eq!(session.session_start(), Some(t0));
        assert_eq!(session.last_char_at(), Some(t0 + ms(10)));
        assert_eq!(session.len(), 2);
    }

    #[test]
    fn reset_clears_buffer_timestamps_and_profile() {
        let mut session = ScanSession::new(&ScanConfig::default());
        let t0 = Instant::now();
        for (i, c) in "ABCD".chars().enumerate() {
            session.accept_char(c, t0 + ms(i as u64 * 10));
        }
        assert_eq!(session.profile(), TransportProfile::Fast);
        let before = session.revision();

        session.reset();
        assert!(session.is_idle());
        assert!(session.is_empty());
        assert_eq!(session.last_char_at(), None);
        assert_eq!(session.profile(), TransportProfile::Unknown);
        assert!(session.revision() > before);
    }

    #[test]
    fn coalesced_chars_count_as_fast() {
        let mut session = ScanSession::new(&ScanConfig::default());
        let profile = session.accept_str("0123", Instant::now());
        assert_eq!(profile, TransportProfile::Fast);
        assert_eq!(session.len(), 4);
    }

    #[test]
    fn length_counts_chars_not_bytes() {
        let mut session = ScanSession::new(&ScanConfig::default());
        session.accept_str("äöü", Instant::now());
        assert_eq!(session.len(), 3);
    }

    #[test]
    fn takeover_after_long_gap() {
        let mut session = ScanSession::new(&ScanConfig::default());
        let t0 = Instant::now();
        session.accept_char('a', t0);
        assert!(!session.is_takeover(t0 + ms(200)));
        assert!(session.is_takeover(t0 + ms(300)));
    }

    #[test]
    fn candidate_is_trimmed() {
        let mut session = ScanSession::new(&ScanConfig::default());
        session.accept_str(" 123 ", Instant::now());
        assert_eq!(session.candidate(), "123");
    }
}
