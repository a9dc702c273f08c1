use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{ConversationId, MessageId, Role, Timestamp};

/// Capacity of the session event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Things that happen inside an assistant session.
///
/// Emitted after the owning state has changed and consumed by:
/// - the presentation shell (notifications, logging)
/// - tests asserting on the order of side effects
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum SessionEvent {
    // =========================================================================
    // Conversation Events
    // =========================================================================
    /// The message history was cleared for a fresh conversation.
    ConversationStarted { timestamp: Timestamp },

    /// A conversation's history replaced the in-memory sequence.
    ConversationLoaded {
        conversation_id: ConversationId,
        message_count: usize,
        timestamp: Timestamp,
    },

    /// Fetching a conversation failed; state was left untouched.
    ConversationLoadFailed {
        conversation_id: ConversationId,
        reason: String,
        timestamp: Timestamp,
    },

    /// A conversation was removed from the history list.
    ConversationDeleted {
        conversation_id: ConversationId,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Message Events
    // =========================================================================
    /// A message was appended to the sequence.
    MessageAppended {
        message_id: MessageId,
        role: Role,
        timestamp: Timestamp,
    },

    /// A send request left for the backend.
    SendStarted {
        conversation_id: Option<ConversationId>,
        timestamp: Timestamp,
    },

    /// The backend answered a send.
    SendCompleted {
        conversation_id: ConversationId,
        message_id: MessageId,
        timestamp: Timestamp,
    },

    /// A send failed and a synthetic reply was appended.
    SendFailed { reason: String, timestamp: Timestamp },

    // =========================================================================
    // Feedback Events
    // =========================================================================
    /// A rating is being shown next to a message.
    FeedbackRecorded {
        message_id: MessageId,
        rating: u8,
        timestamp: Timestamp,
    },

    /// The rating confirmation window elapsed.
    FeedbackExpired {
        message_id: MessageId,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Hint Events
    // =========================================================================
    QuickActionsLoaded { count: usize, timestamp: Timestamp },

    SuggestionsLoaded { count: usize, timestamp: Timestamp },

    // =========================================================================
    // Voice Events
    // =========================================================================
    /// The recognizer started listening.
    VoiceStarted { timestamp: Timestamp },

    /// A final transcript was moved into the outbound text field.
    TranscriptFinalized {
        text_length: usize,
        timestamp: Timestamp,
    },

    /// Voice capture ended with an error.
    VoiceFailed { kind: String, timestamp: Timestamp },

    /// Listening ended without error.
    VoiceStopped { timestamp: Timestamp },

    // =========================================================================
    // Report Events
    // =========================================================================
    ReportGenerated {
        query: String,
        row_count: usize,
        timestamp: Timestamp,
    },

    ReportFailed { reason: String, timestamp: Timestamp },
}

impl SessionEvent {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            SessionEvent::ConversationStarted { timestamp }
            | SessionEvent::ConversationLoaded { timestamp, .. }
            | SessionEvent::ConversationLoadFailed { timestamp, .. }
            | SessionEvent::ConversationDeleted { timestamp, .. }
            | SessionEvent::MessageAppended { timestamp, .. }
            | SessionEvent::SendStarted { timestamp, .. }
            | SessionEvent::SendCompleted { timestamp, .. }
            | SessionEvent::SendFailed { timestamp, .. }
            | SessionEvent::FeedbackRecorded { timestamp, .. }
            | SessionEvent::FeedbackExpired { timestamp, .. }
            | SessionEvent::QuickActionsLoaded { timestamp, .. }
            | SessionEvent::SuggestionsLoaded { timestamp, .. }
            | SessionEvent::VoiceStarted { timestamp }
            | SessionEvent::TranscriptFinalized { timestamp, .. }
            | SessionEvent::VoiceFailed { timestamp, .. }
            | SessionEvent::VoiceStopped { timestamp }
            | SessionEvent::ReportGenerated { timestamp, .. }
            | SessionEvent::ReportFailed { timestamp, .. } => *timestamp,
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            SessionEvent::ConversationStarted { .. } => "conversation_started",
            SessionEvent::ConversationLoaded { .. } => "conversation_loaded",
            SessionEvent::ConversationLoadFailed { .. } => "conversation_load_failed",
            SessionEvent::ConversationDeleted { .. } => "conversation_deleted",
            SessionEvent::MessageAppended { .. } => "message_appended",
            SessionEvent::SendStarted { .. } => "send_started",
            SessionEvent::SendCompleted { .. } => "send_completed",
            SessionEvent::SendFailed { .. } => "send_failed",
            SessionEvent::FeedbackRecorded { .. } => "feedback_recorded",
            SessionEvent::FeedbackExpired { .. } => "feedback_expired",
            SessionEvent::QuickActionsLoaded { .. } => "quick_actions_loaded",
            SessionEvent::SuggestionsLoaded { .. } => "suggestions_loaded",
            SessionEvent::VoiceStarted { .. } => "voice_started",
            SessionEvent::TranscriptFinalized { .. } => "transcript_finalized",
            SessionEvent::VoiceFailed { .. } => "voice_failed",
            SessionEvent::VoiceStopped { .. } => "voice_stopped",
            SessionEvent::ReportGenerated { .. } => "report_generated",
            SessionEvent::ReportFailed { .. } => "report_failed",
        }
    }
}

/// Fan-out channel for [`SessionEvent`]s.
///
/// Publishing never blocks and never fails: with no subscribers the event is
/// dropped, and slow subscribers observe `Lagged` on their receiver.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: SessionEvent) {
        tracing::trace!(event = event.event_name(), "Session event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}
