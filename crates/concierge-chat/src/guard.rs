//! Run-on-drop finalizer for in-flight flags.

/// Calls its closure when dropped unless disarmed first.
///
/// Covers the path where an in-flight future is dropped before it completes;
/// the completing path clears the flag itself and disarms.
pub(crate) struct OnDrop<F: FnOnce()> {
    finalize: Option<F>,
}

impl<F: FnOnce()> OnDrop<F> {
    pub(crate) fn new(finalize: F) -> Self {
        Self {
            finalize: Some(finalize),
        }
    }

    pub(crate) fn disarm(mut self) {
        self.finalize = None;
    }
}

impl<F: FnOnce()> Drop for OnDrop<F> {
    fn drop(&mut self) {
        if let Some(finalize) = self.finalize.take() {
            finalize();
        }
    }
}
