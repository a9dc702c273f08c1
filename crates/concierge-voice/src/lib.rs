//! Concierge voice crate - speech-to-text input for the assistant widget.
//!
//! A platform [`Recognizer`] is wrapped by a [`TranscriptionSource`] that
//! normalizes its callbacks into interim, final, error and end events.
//! [`VoiceInput`] sits on top and keeps the state the widget renders: the
//! microphone state machine (idle, listening, error), the transient
//! transcript, and a closable error message. A final transcript is written to
//! the shared [`DraftText`](concierge_core::DraftText), which is the only
//! contact point with the session engine.

pub mod error;
pub mod input;
pub mod permission;
pub mod recognizer;
pub mod source;
pub mod state;

pub use error::{StartError, VoiceErrorKind, VoiceFailure};
pub use input::VoiceInput;
pub use permission::{FixedProbe, PermissionCache, PermissionProbe, PermissionStatus};
pub use recognizer::{
    normalize, NormalizedResult, RawRecognizerEvent, RecognitionSegment, Recognizer,
    ScriptedRecognizer,
};
pub use source::{TranscriptEvent, TranscriptionSource};
pub use state::{StateMachine, VoiceState};
