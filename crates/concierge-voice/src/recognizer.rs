//! Platform speech recognizer seam and result normalization.

use std::sync::{Arc, Mutex};

use crate::error::StartError;

/// One alternative-less recognition segment as the platform reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionSegment {
    pub transcript: String,
    pub is_final: bool,
}

impl RecognitionSegment {
    pub fn interim(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: false,
        }
    }

    pub fn final_text(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: true,
        }
    }
}

/// Callback payloads of a continuous/interim speech recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawRecognizerEvent {
    /// Cumulative result list; only entries from `result_index` on are new.
    Result {
        result_index: usize,
        results: Vec<RecognitionSegment>,
    },
    /// Platform error code plus optional free-form message.
    Error { code: String, message: Option<String> },
    /// The recognizer stopped delivering events.
    End,
}

impl RawRecognizerEvent {
    /// A single-segment result, the common case.
    pub fn single(segment: RecognitionSegment) -> Self {
        RawRecognizerEvent::Result {
            result_index: 0,
            results: vec![segment],
        }
    }
}

/// The new text carried by one result event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedResult {
    pub final_text: String,
    pub interim_text: String,
}

/// Concatenate final and interim segments from `result_index` onward.
pub fn normalize(result_index: usize, results: &[RecognitionSegment]) -> NormalizedResult {
    let mut normalized = NormalizedResult::default();
    for segment in results.iter().skip(result_index) {
        if segment.is_final {
            normalized.final_text.push_str(&segment.transcript);
        } else {
            normalized.interim_text.push_str(&segment.transcript);
        }
    }
    normalized
}

/// A platform speech-to-text capability.
///
/// Implementations deliver their callbacks as [`RawRecognizerEvent`]s to
/// [`TranscriptionSource::handle`](crate::TranscriptionSource::handle).
pub trait Recognizer: Send + Sync {
    /// Begin a single-utterance session with interim results.
    fn start(&self, language: &str) -> Result<(), StartError>;

    /// Ask the platform to stop capturing.
    fn stop(&self);
}

/// Recognizer that records calls and can be told to refuse starting.
#[derive(Debug, Default)]
pub struct ScriptedRecognizer {
    inner: Mutex<ScriptedInner>,
}

#[derive(Debug, Default)]
struct ScriptedInner {
    starts: Vec<String>,
    stops: usize,
    refuse_start: Option<String>,
}

impl ScriptedRecognizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next `start` calls fail with `reason`.
    pub fn refuse_start(&self, reason: impl Into<String>) {
        self.lock().refuse_start = Some(reason.into());
    }

    pub fn accept_start(&self) {
        self.lock().refuse_start = None;
    }

    /// Languages passed to each successful `start`.
    pub fn starts(&self) -> Vec<String> {
        self.lock().starts.clone()
    }

    pub fn stops(&self) -> usize {
        self.lock().stops
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptedInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Recognizer for ScriptedRecognizer {
    fn start(&self, language: &str) -> Result<(), StartError> {
        let mut inner = self.lock();
        if let Some(reason) = &inner.refuse_start {
            return Err(StartError(reason.clone()));
        }
        inner.starts.push(language.to_string());
        Ok(())
    }

    fn stop(&self) {
        self.lock().stops += 1;
    }
}
