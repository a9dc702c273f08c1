//! Error types for the assistant session.

use concierge_core::ConciergeError;
use concierge_gateway::GatewayError;

/// Errors from the session engine and the report query.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("a message is still being sent")]
    SendInFlight,
    #[error("a conversation is still being switched")]
    SwitchInFlight,
    #[error("a report is already being generated")]
    ReportInFlight,
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("validation error: {0}")]
    Validation(String),
}

impl From<ConciergeError> for ChatError {
    fn from(err: ConciergeError) -> Self {
        ChatError::Validation(err.to_string())
    }
}

impl From<ChatError> for ConciergeError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Gateway(e) => e.into(),
            other => ConciergeError::Session(other.to_string()),
        }
    }
}
