use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use crate::ingest::{HostInput, Key, KeyInput, ValueChange};

/// A minimal single-line text input, the kind of widget a scan engine binds to.
///
/// Edits made by the user report a `ValueChange` with an external origin;
/// writes made by the engine through `HostInput` report nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputField {
    value: String,
    disabled: bool,
}

impl InputField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn insert(&mut self, c: char) -> Option<ValueChange> {
        if self.disabled {
            return None;
        }
        self.value.push(c);
        Some(ValueChange::external(self.value.clone()))
    }

    pub fn backspace(&mut self) -> Option<ValueChange> {
        if self.disabled {
            return None;
        }
        self.value.pop()?;
        Some(ValueChange::external(self.value.clone()))
    }

    /// Replaces the whole value, as a paste or a value-only transport would.
    pub fn set_external(&mut self, value: impl Into<String>) -> Option<ValueChange> {
        if self.disabled {
            return None;
        }
        self.value = value.into();
        Some(ValueChange::external(self.value.clone()))
    }

    /// Applies an editing key the way a text input would.
    pub fn apply_key(&mut self, input: &KeyInput) -> Option<ValueChange> {
        if input.modifiers.is_command() {
            return None;
        }
        match input.key {
            Key::Char(c) if !c.is_control() => self.insert(c),
            Key::Backspace => self.backspace(),
            _ => None,
        }
    }
}

/// Shared handle so the host can keep rendering a field the engine is bound to.
#[derive(Debug, Clone, Default)]
pub struct SharedField(Rc<RefCell<InputField>>);

impl SharedField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn borrow(&self) -> Ref<'_, InputField> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, InputField> {
        self.0.borrow_mut()
    }
}

impl HostInput for SharedField {
    fn value(&self) -> Option<String> {
        Some(self.0.borrow().value.clone())
    }

    fn clear(&mut self) {
        self.0.borrow_mut().value.clear();
    }

    fn set_disabled(&mut self, disabled: bool) {
        self.0.borrow_mut().disabled = disabled;
    }
}
