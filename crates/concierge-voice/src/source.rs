//! Transcription source: one listening session at a time over a platform
//! recognizer, with normalized events out.

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::error::{VoiceErrorKind, VoiceFailure};
use crate::permission::{PermissionCache, PermissionProbe};
use crate::recognizer::{normalize, RawRecognizerEvent, Recognizer};

/// Shown when the platform refuses to start an otherwise permitted session.
const START_FAILED_MESSAGE: &str =
    "No se pudo iniciar el reconocimiento de voz. Intenta nuevamente.";

/// Normalized output of a listening session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    /// Provisional text. Replaces the previous interim text.
    Interim(String),
    /// The recognized utterance. Ends the session.
    Final(String),
    /// Capture failed. Ends the session.
    Error(VoiceFailure),
    /// The recognizer stopped without a final result.
    End,
}

impl TranscriptEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TranscriptEvent::Interim(_))
    }
}

/// Adapter from a platform [`Recognizer`] to [`TranscriptEvent`]s.
///
/// States are Idle and Listening. Exactly one `Final`, `Error` or `End`
/// closes a session; anything the platform sends afterwards is dropped.
pub struct TranscriptionSource {
    recognizer: Option<Arc<dyn Recognizer>>,
    permission: PermissionCache,
    language: String,
    listening: bool,
}

impl std::fmt::Debug for TranscriptionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptionSource")
            .field("has_recognizer", &self.recognizer.is_some())
            .field("permission", &self.permission)
            .field("language", &self.language)
            .field("listening", &self.listening)
            .finish()
    }
}

impl TranscriptionSource {
    /// `recognizer` is `None` on platforms without speech recognition.
    pub fn new(
        recognizer: Option<Arc<dyn Recognizer>>,
        probe: Arc<dyn PermissionProbe>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            recognizer,
            permission: PermissionCache::new(probe),
            language: language.into(),
            listening: false,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.recognizer.is_some()
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Begin listening. A no-op while already listening.
    ///
    /// Without a recognizer this fails with `Unsupported` and never touches
    /// the microphone.
    pub async fn start(&mut self) -> Result<(), VoiceFailure> {
        if self.listening {
            debug!("Already listening; start ignored");
            return Ok(());
        }
        let recognizer = match &self.recognizer {
            Some(r) => r.clone(),
            None => {
                warn!("Speech recognition is not available");
                return Err(VoiceFailure::new(VoiceErrorKind::Unsupported));
            }
        };
        if !self.permission.ensure().await {
            return Err(VoiceFailure::new(VoiceErrorKind::PermissionDenied));
        }
        recognizer.start(&self.language).map_err(|e| {
            warn!(error = %e, "Recognizer failed to start");
            VoiceFailure::with_detail(VoiceErrorKind::Unknown, START_FAILED_MESSAGE)
        })?;
        self.listening = true;
        info!(language = %self.language, "Listening started");
        Ok(())
    }

    /// Stop listening and return to Idle immediately.
    pub fn stop(&mut self) {
        if !self.listening {
            return;
        }
        self.listening = false;
        if let Some(recognizer) = &self.recognizer {
            recognizer.stop();
        }
        info!("Listening stopped");
    }

    /// Translate one platform callback.
    ///
    /// Returns `None` for events outside a session and for results carrying
    /// no new text.
    pub fn handle(&mut self, raw: RawRecognizerEvent) -> Option<TranscriptEvent> {
        if !self.listening {
            trace!(?raw, "Recognizer event outside a session dropped");
            return None;
        }
        let event = match raw {
            RawRecognizerEvent::Result {
                result_index,
                results,
            } => {
                let normalized = normalize(result_index, &results);
                if !normalized.final_text.is_empty() {
                    TranscriptEvent::Final(normalized.final_text)
                } else if results.len() > result_index {
                    TranscriptEvent::Interim(normalized.interim_text)
                } else {
                    return None;
                }
            }
            RawRecognizerEvent::Error { code, message } => {
                let failure = VoiceFailure::from_platform(&code, message.as_deref());
                warn!(code = %code, kind = %failure.kind, "Recognizer error");
                TranscriptEvent::Error(failure)
            }
            RawRecognizerEvent::End => TranscriptEvent::End,
        };
        if event.is_terminal() {
            self.listening = false;
            debug!("Listening session closed");
        }
        Some(event)
    }
}
