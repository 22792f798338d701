//! Ingest tap: turns raw key and value-change events into pipeline events.
//!
//! Events can come from the bound host input, from a page-wide fallback
//! listener, or from some other editable widget. The last kind is never
//! touched so that manual data entry elsewhere keeps working.

use std::fmt;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use serde::{Deserialize, Serialize};

use crate::config::ScanConfig;

/// A key as seen by the tap, independent of the terminal backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    Char(char),
    Enter,
    Tab,
    Escape,
    Backspace,
    Delete,
    Other,
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Char(c) => write!(f, "'{}'", c.escape_default()),
            Key::Enter => f.write_str("Enter"),
            Key::Tab => f.write_str("Tab"),
            Key::Escape => f.write_str("Escape"),
            Key::Backspace => f.write_str("Backspace"),
            Key::Delete => f.write_str("Delete"),
            Key::Other => f.write_str("Other"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
}

impl Modifiers {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn shift() -> Self {
        Self {
            shift: true,
            ..Self::default()
        }
    }

    /// Ctrl, Alt or Meta held. Shift alone is how scanners produce capitals.
    pub fn is_command(&self) -> bool {
        self.ctrl || self.alt || self.meta
    }
}

/// Where an event was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum EventTarget {
    /// The host input this engine is bound to.
    BoundInput,
    /// No interactive element has focus (page-wide fallback listener).
    Page,
    /// Some other input, text area or editable element.
    OtherEditable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInput {
    pub key: Key,
    pub modifiers: Modifiers,
    pub target: EventTarget,
}

impl KeyInput {
    pub fn new(key: Key, target: EventTarget) -> Self {
        Self {
            key,
            modifiers: Modifiers::none(),
            target,
        }
    }

    pub fn char(c: char, target: EventTarget) -> Self {
        Self::new(Key::Char(c), target)
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Converts a crossterm key event. Release events yield `None`.
    pub fn from_crossterm(event: &KeyEvent, target: EventTarget) -> Option<Self> {
        if event.kind == KeyEventKind::Release {
            return None;
        }
        let key = match event.code {
            KeyCode::Char(c) => Key::Char(c),
            KeyCode::Enter => Key::Enter,
            KeyCode::Tab => Key::Tab,
            KeyCode::Esc => Key::Escape,
            KeyCode::Backspace => Key::Backspace,
            KeyCode::Delete => Key::Delete,
            _ => Key::Other,
        };
        let modifiers = Modifiers {
            ctrl: event.modifiers.contains(KeyModifiers::CONTROL),
            alt: event.modifiers.contains(KeyModifiers::ALT),
            shift: event.modifiers.contains(KeyModifiers::SHIFT),
            meta: event.modifiers.contains(KeyModifiers::META)
                || event.modifiers.contains(KeyModifiers::SUPER),
        };
        Some(Self {
            key,
            modifiers,
            target,
        })
    }
}

/// What a key event means to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapEvent {
    Payload(char),
    Terminator,
    /// User is deleting characters: whatever is buffered is manual input.
    Erase,
    Abort,
}

/// Classifies a key event, or returns `None` when the tap must stay out of the way.
pub fn classify(input: &KeyInput, config: &ScanConfig) -> Option<TapEvent> {
    match input.target {
        EventTarget::OtherEditable => return None,
        EventTarget::Page if !config.page_fallback => return None,
        _ => {}
    }

    if config.abort_key == Some(input.key) && !input.modifiers.is_command() {
        return Some(TapEvent::Abort);
    }
    if input.modifiers.is_command() {
        return None;
    }
    if config.terminators.contains(&input.key) {
        return Some(TapEvent::Terminator);
    }

    match input.key {
        Key::Backspace | Key::Delete => Some(TapEvent::Erase),
        Key::Char(c) if !c.is_control() => Some(TapEvent::Payload(c)),
        _ => None,
    }
}

/// Who wrote a new value into the host input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOrigin {
    /// The user or an input peripheral.
    External,
    /// This engine, e.g. clearing the field after a dispatch.
    Programmatic,
}

/// A raw value-change notification from the host input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueChange {
    pub value: String,
    pub origin: WriteOrigin,
}

impl ValueChange {
    pub fn external(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            origin: WriteOrigin::External,
        }
    }

    pub fn programmatic(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            origin: WriteOrigin::Programmatic,
        }
    }
}

/// Splits trailing terminator characters off a value.
///
/// Returns the content and whether at least one terminator was stripped.
pub fn strip_terminators<'a>(value: &'a str, config: &ScanConfig) -> (&'a str, bool) {
    let is_terminator = |c: char| match c {
        '\n' | '\r' => config.terminators.contains(&Key::Enter),
        '\t' => config.terminators.contains(&Key::Tab),
        other => config.terminators.contains(&Key::Char(other)),
    };
    let content = value.trim_end_matches(is_terminator);
    (content, content.len() != value.len())
}

/// The widget a `ScanEngine` is bound to.
///
/// The engine only ever writes to it through `clear` and `set_disabled`;
/// implementations must not report those writes back as external changes.
pub trait HostInput {
    /// The widget's live value, when the host can read it.
    fn value(&self) -> Option<String>;
    fn clear(&mut self);
    fn set_disabled(&mut self, disabled: bool);
}
