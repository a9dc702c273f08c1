//! Voice failure taxonomy

use std::fmt;

use concierge_core::ConciergeError;
use thiserror::Error;

/// Closed classification of speech capture failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceErrorKind {
    PermissionDenied,
    NoMicrophone,
    NoSpeech,
    Aborted,
    Network,
    Unsupported,
    Unknown,
}

impl VoiceErrorKind {
    /// Map a platform recognizer error code.
    pub fn from_platform_code(code: &str) -> Self {
        match code {
            "not-allowed" | "service-not-allowed" => VoiceErrorKind::PermissionDenied,
            "audio-capture" => VoiceErrorKind::NoMicrophone,
            "no-speech" => VoiceErrorKind::NoSpeech,
            "aborted" => VoiceErrorKind::Aborted,
            "network" => VoiceErrorKind::Network,
            "language-not-supported" => VoiceErrorKind::Unsupported,
            _ => VoiceErrorKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceErrorKind::PermissionDenied => "permission-denied",
            VoiceErrorKind::NoMicrophone => "no-microphone",
            VoiceErrorKind::NoSpeech => "no-speech",
            VoiceErrorKind::Aborted => "aborted",
            VoiceErrorKind::Network => "network",
            VoiceErrorKind::Unsupported => "unsupported",
            VoiceErrorKind::Unknown => "unknown",
        }
    }

    /// The message shown to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            VoiceErrorKind::PermissionDenied => {
                "Permite el acceso al micrófono en tu navegador para usar esta función."
            }
            VoiceErrorKind::NoMicrophone => {
                "No encontramos un micrófono disponible. Verifica la conexión del dispositivo."
            }
            VoiceErrorKind::NoSpeech => {
                "No se detectó audio. Habla más cerca del micrófono e inténtalo nuevamente."
            }
            VoiceErrorKind::Aborted => "El reconocimiento de voz se detuvo. Intenta otra vez.",
            VoiceErrorKind::Network => {
                "No se pudo conectar al servicio de voz. Verifica tu conexión a internet."
            }
            VoiceErrorKind::Unsupported => {
                "El reconocimiento de voz no está disponible en este navegador."
            }
            VoiceErrorKind::Unknown => "Error en el reconocimiento de voz",
        }
    }
}

impl fmt::Display for VoiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure, optionally with the platform's own wording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceFailure {
    pub kind: VoiceErrorKind,
    /// Platform message. Only shown for [`VoiceErrorKind::Unknown`].
    pub detail: Option<String>,
}

impl VoiceFailure {
    pub fn new(kind: VoiceErrorKind) -> Self {
        Self { kind, detail: None }
    }

    pub fn with_detail(kind: VoiceErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: Some(detail.into()),
        }
    }

    /// Build from a recognizer error event.
    pub fn from_platform(code: &str, message: Option<&str>) -> Self {
        let kind = VoiceErrorKind::from_platform_code(code);
        let detail = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        Self { kind, detail }
    }

    /// Known kinds use their fixed text; unknown ones prefer the platform's.
    pub fn user_message(&self) -> String {
        match (&self.kind, &self.detail) {
            (VoiceErrorKind::Unknown, Some(detail)) => detail.clone(),
            (kind, _) => kind.user_message().to_string(),
        }
    }
}

impl fmt::Display for VoiceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.user_message())
    }
}

impl std::error::Error for VoiceFailure {}

/// The platform recognizer refused to start.
#[derive(Debug, Clone, Error)]
#[error("recognizer failed to start: {0}")]
pub struct StartError(pub String);

impl From<VoiceFailure> for ConciergeError {
    fn from(err: VoiceFailure) -> Self {
        ConciergeError::Voice(err.to_string())
    }
}
