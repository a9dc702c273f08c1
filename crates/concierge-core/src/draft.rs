//! Shared outbound text field.
//!
//! The only point of contact between voice capture and the session engine:
//! a final transcript is written here, and the engine sends whatever the
//! field holds. Clones share the same underlying buffer.

use std::sync::{Arc, Mutex, MutexGuard};

/// Text the user is about to send.
#[derive(Debug, Clone, Default)]
pub struct DraftText {
    inner: Arc<Mutex<String>>,
}

impl DraftText {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, String> {
        // A panic while holding the lock cannot leave a String half-written.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the field contents.
    pub fn set(&self, text: impl Into<String>) {
        *self.lock() = text.into();
    }

    /// Current contents.
    pub fn get(&self) -> String {
        self.lock().clone()
    }

    /// Take the contents, leaving the field empty.
    pub fn take(&self) -> String {
        std::mem::take(&mut *self.lock())
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// True when the field holds nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        self.lock().trim().is_empty()
    }
}
