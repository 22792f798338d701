//! Synthetic keyboard-wedge peripherals for the scan console and for tests.

use std::ops::RangeInclusive;
use std::time::Duration;

use rand::rngs::{StdRng, ThreadRng};
use rand::{Rng, SeedableRng};

use crate::ingest::{EventTarget, Key, KeyInput, Modifiers};

/// Pacing of the simulated source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Pacing {
    /// Tight uniform bursts, like a corded scanner
    Fast,
    /// Looser but still machine paced, like a wireless scanner
    Moderate,
    /// A person at the keyboard
    Manual,
}

impl Pacing {
    fn gap_ms(self) -> RangeInclusive<u64> {
        match self {
            Pacing::Fast => 4..=20,
            Pacing::Moderate => 60..=130,
            Pacing::Manual => 300..=600,
        }
    }
}

/// One keystroke and its offset from the start of the burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keystroke {
    pub offset: Duration,
    pub input: KeyInput,
}

pub struct ScannerSimulator<R> {
    rng: R,
    target: EventTarget,
}

impl ScannerSimulator<ThreadRng> {
    pub fn new(target: EventTarget) -> Self {
        Self {
            rng: rand::thread_rng(),
            target,
        }
    }
}

impl ScannerSimulator<StdRng> {
    pub fn seeded(seed: u64, target: EventTarget) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            target,
        }
    }
}

impl<R: Rng> ScannerSimulator<R> {
    /// A random EAN-13 code with a valid check digit.
    pub fn random_ean13(&mut self) -> String {
        let body: String = (0..12)
            .map(|_| char::from(b'0' + self.rng.gen_range(0..10u8)))
            .collect();
        match ean13_check_digit(&body) {
            Some(check) => format!("{body}{check}"),
            None => body,
        }
    }

    /// Keystrokes for `payload` at the given pacing, optionally followed by a terminator.
    pub fn burst(&mut self, payload: &str, pacing: Pacing, terminator: Option<Key>) -> Vec<Keystroke> {
        let target = self.target;
        let keys = payload
            .chars()
            .map(|c| {
                let modifiers = if c.is_ascii_uppercase() {
                    Modifiers::shift()
                } else {
                    Modifiers::none()
                };
                KeyInput::char(c, target).with_modifiers(modifiers)
            })
            .chain(terminator.map(|key| KeyInput::new(key, target)));

        let mut offset = Duration::ZERO;
        let mut strokes = Vec::new();
        for (i, input) in keys.enumerate() {
            if i > 0 {
                offset += Duration::from_millis(self.rng.gen_range(pacing.gap_ms()));
            }
            strokes.push(Keystroke { offset, input });
        }
        strokes
    }
}

/// Check digit for the first twelve digits of an EAN-13 code.
pub fn ean13_check_digit(first12: &str) -> Option<u32> {
    if first12.len() != 12 {
        return None;
    }
    let mut sum = 0;
    for (i, c) in first12.chars().enumerate() {
        let digit = c.to_digit(10)?;
        sum += if i % 2 == 0 { digit } else { digit * 3 };
    }
    Some((10 - sum % 10) % 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ean13_check_digit_known_codes() {
        assert_eq!(ean13_check_digit("400638133393"), Some(1));
        assert_eq!(ean13_check_digit("590123412345"), Some(7));
        assert_eq!(ean13_check_digit("12345"), None);
        assert_eq!(ean13_check_digit("40063813339x"), None);
    }

    #[test]
    fn random_codes_are_valid() {
        let mut sim = ScannerSimulator::seeded(7, EventTarget::BoundInput);
        for _ in 0..20 {
            let code = sim.random_ean13();
            assert_eq!(code.len(), 13);
            let check = code[12..].parse::<u32>().unwrap();
            assert_eq!(ean13_check_digit(&code[..12]), Some(check));
        }
    }

    #[test]
    fn burst_gaps_follow_pacing() {
        let mut sim = ScannerSimulator::seeded(42, EventTarget::Page);
        let strokes = sim.burst("ABC123", Pacing::Moderate, Some(Key::Enter));
        assert_eq!(strokes.len(), 7);
        assert_eq!(strokes[0].offset, Duration::ZERO);
        assert!(strokes[0].input.modifiers.shift);
        assert_eq!(strokes[6].input.key, Key::Enter);
        for pair in strokes.windows(2) {
            let gap = pair[1].offset - pair[0].offset;
            assert!(gap >= Duration::from_millis(60) && gap <= Duration::from_millis(130));
        }
    }

    #[test]
    fn burst_without_terminator() {
        let mut sim = ScannerSimulator::seeded(1, EventTarget::BoundInput);
        let strokes = sim.burst("123", Pacing::Fast, None);
        assert_eq!(strokes.len(), 3);
        assert!(strokes.iter().all(|s| s.input.target == EventTarget::BoundInput));
    }
}
