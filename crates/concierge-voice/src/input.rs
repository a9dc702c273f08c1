//! Voice input as the chat widget shows it: a microphone control with a
//! transient transcript, a closable error message, and a final transcript
//! that lands in the outbound text field.

use chrono::Utc;
use tracing::{debug, info};

use concierge_core::{DraftText, EventBus, SessionEvent};

use crate::error::VoiceFailure;
use crate::recognizer::RawRecognizerEvent;
use crate::source::{TranscriptEvent, TranscriptionSource};
use crate::state::{StateMachine, VoiceState};

/// Drives a [`TranscriptionSource`] and owns what the user sees of it.
#[derive(Debug)]
pub struct VoiceInput {
    source: TranscriptionSource,
    machine: StateMachine,
    draft: DraftText,
    transcript: String,
    error: Option<String>,
    events: Option<EventBus>,
}

impl VoiceInput {
    /// `draft` is shared with the session engine.
    pub fn new(source: TranscriptionSource, draft: DraftText) -> Self {
        Self {
            source,
            machine: StateMachine::new(),
            draft,
            transcript: String::new(),
            error: None,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state(&self) -> VoiceState {
        self.machine.current()
    }

    /// Handle on the state for observers.
    pub fn state_machine(&self) -> StateMachine {
        self.machine.clone()
    }

    pub fn is_supported(&self) -> bool {
        self.source.is_supported()
    }

    /// Interim text of the current utterance; empty when none.
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn publish(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }

    fn enter(&self, target: VoiceState) {
        if self.machine.current() == target {
            return;
        }
        if let Err(e) = self.machine.transition(target) {
            debug!(error = %e, "Voice state forced");
            self.machine.reset();
            if target != VoiceState::Idle {
                let _ = self.machine.transition(target);
            }
        }
    }

    fn fail(&mut self, failure: VoiceFailure) {
        self.transcript.clear();
        self.error = Some(failure.user_message());
        self.enter(VoiceState::Error);
        self.publish(SessionEvent::VoiceFailed {
            kind: failure.kind.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Start listening. Failures are shown, not returned.
    pub async fn start(&mut self) {
        match self.source.start().await {
            Ok(()) => {
                self.error = None;
                self.transcript.clear();
                self.enter(VoiceState::Listening);
                self.publish(SessionEvent::VoiceStarted {
                    timestamp: Utc::now(),
                });
            }
            Err(failure) => self.fail(failure),
        }
    }

    pub fn stop(&mut self) {
        if !self.source.is_listening() {
            return;
        }
        self.source.stop();
        self.transcript.clear();
        self.enter(VoiceState::Idle);
        self.publish(SessionEvent::VoiceStopped {
            timestamp: Utc::now(),
        });
    }

    /// The microphone button: stop while listening, start otherwise.
    pub async fn toggle(&mut self) {
        if self.source.is_listening() {
            self.stop();
        } else {
            self.start().await;
        }
    }

    /// Close the error message.
    pub fn dismiss_error(&mut self) {
        self.error = None;
        if self.machine.current() == VoiceState::Error {
            self.enter(VoiceState::Idle);
        }
    }

    /// Feed one platform callback through the source.
    pub fn on_recognizer_event(&mut self, raw: RawRecognizerEvent) {
        let Some(event) = self.source.handle(raw) else {
            return;
        };
        match event {
            TranscriptEvent::Interim(text) => {
                self.transcript = text;
            }
            TranscriptEvent::Final(text) => {
                info!(text_length = text.chars().count(), "Final transcript");
                self.transcript.clear();
                let text_length = text.chars().count();
                self.draft.set(text);
                self.enter(VoiceState::Idle);
                self.publish(SessionEvent::TranscriptFinalized {
                    text_length,
                    timestamp: Utc::now(),
                });
            }
            TranscriptEvent::Error(failure) => self.fail(failure),
            TranscriptEvent::End => {
                self.transcript.clear();
                self.enter(VoiceState::Idle);
                self.publish(SessionEvent::VoiceStopped {
                    timestamp: Utc::now(),
                });
            }
        }
    }
}
