//! Voice capture state machine with thread-safe transitions.
//!
//! Valid transitions:
//! - Idle -> Listening (recognizer started)
//! - Idle -> Error (could not start: no recognizer, permission denied)
//! - Listening -> Idle (final transcript, end of input, manual stop)
//! - Listening -> Error (recognizer reported an error)
//! - Error -> Listening (retry)
//! - Error -> Idle (error message dismissed)

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use concierge_core::ConciergeError;

/// What the microphone control shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceState {
    /// Not listening. Ready to start.
    Idle,
    /// The recognizer is capturing speech.
    Listening,
    /// The last attempt failed and its message is still on screen.
    Error,
}

impl fmt::Display for VoiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoiceState::Idle => write!(f, "idle"),
            VoiceState::Listening => write!(f, "listening"),
            VoiceState::Error => write!(f, "error"),
        }
    }
}

impl VoiceState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &VoiceState) -> bool {
        matches!(
            (self, target),
            (VoiceState::Idle, VoiceState::Listening)
                | (VoiceState::Idle, VoiceState::Error)
                | (VoiceState::Listening, VoiceState::Idle)
                | (VoiceState::Listening, VoiceState::Error)
                | (VoiceState::Error, VoiceState::Listening)
                | (VoiceState::Error, VoiceState::Idle)
        )
    }
}

/// Shared, validated voice state.
///
/// Clones observe the same state, so a shell can hold one while the
/// [`VoiceInput`](crate::VoiceInput) drives it.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: Arc<Mutex<VoiceState>>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// Create a new state machine initialized to `Idle`.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(VoiceState::Idle)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VoiceState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn current(&self) -> VoiceState {
        *self.lock()
    }

    /// Attempt to transition to the target state.
    ///
    /// Returns `ConciergeError::Voice` if the transition is not allowed from
    /// the current state; the state is left unchanged.
    pub fn transition(&self, target: VoiceState) -> Result<(), ConciergeError> {
        let mut state = self.lock();
        if state.can_transition_to(&target) {
            tracing::debug!("Voice state: {} -> {}", *state, target);
            *state = target;
            Ok(())
        } else {
            Err(ConciergeError::Voice(format!(
                "Invalid state transition: {} -> {}",
                *state, target
            )))
        }
    }

    /// Force the state machine back to Idle.
    pub fn reset(&self) {
        let mut state = self.lock();
        if *state != VoiceState::Idle {
            tracing::warn!("Voice state machine reset to idle from {}", *state);
        }
        *state = VoiceState::Idle;
    }
}

// =============================================================================
// Tests
// =============================================================================
