use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConciergeError, Result};

/// Wall-clock instant used across the model.
pub type Timestamp = DateTime<Utc>;

// =============================================================================
// Identifiers
// =============================================================================

/// Identifier of a chat message.
///
/// Server-assigned ids are opaque. Client-generated ids use one of two
/// prefixes: `temp-` for an optimistic user message that has not been
/// acknowledged yet, and `error-` for a locally fabricated failure reply that
/// never reaches the server.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub const TENTATIVE_PREFIX: &'static str = "temp-";
    pub const SYNTHETIC_PREFIX: &'static str = "error-";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Placeholder id for an optimistic user message created at `at`.
    pub fn tentative(at: Timestamp) -> Self {
        Self(format!("{}{}", Self::TENTATIVE_PREFIX, at.timestamp_millis()))
    }

    /// Id for a synthetic error reply created at `at`.
    pub fn synthetic_error(at: Timestamp) -> Self {
        Self(format!("{}{}", Self::SYNTHETIC_PREFIX, at.timestamp_millis()))
    }

    pub fn is_tentative(&self) -> bool {
        self.0.starts_with(Self::TENTATIVE_PREFIX)
    }

    pub fn is_synthetic(&self) -> bool {
        self.0.starts_with(Self::SYNTHETIC_PREFIX)
    }

    /// Whether the server knows this message (feedback can target it).
    pub fn is_durable(&self) -> bool {
        !self.is_tentative() && !self.is_synthetic()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-assigned conversation identifier. Immutable once assigned.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Messages
// =============================================================================

/// Author of a message. Closed set; never changes after creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A navigation shortcut the assistant attached to its reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedAction {
    pub label: String,
    pub url: String,
    /// Category tag, e.g. `navigation` or `report`.
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// A help article or page the assistant referenced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedResource {
    pub title: String,
    pub description: String,
    pub url: String,
    pub category: String,
}

/// One entry of a conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub suggested_actions: Vec<SuggestedAction>,
    #[serde(default)]
    pub related_resources: Vec<RelatedResource>,
    pub created_at: Timestamp,
}

impl Message {
    /// Optimistic user message appended before the server confirms it.
    pub fn tentative_user(content: impl Into<String>, now: Timestamp) -> Self {
        Self {
            id: MessageId::tentative(now),
            role: Role::User,
            content: content.into(),
            suggested_actions: Vec::new(),
            related_resources: Vec::new(),
            created_at: now,
        }
    }

    /// Locally fabricated assistant reply standing in for a failed send.
    pub fn synthetic_error(content: impl Into<String>, now: Timestamp) -> Self {
        Self {
            id: MessageId::synthetic_error(now),
            role: Role::Assistant,
            content: content.into(),
            suggested_actions: Vec::new(),
            related_resources: Vec::new(),
            created_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.id.is_tentative()
    }
}

// =============================================================================
// Conversations
// =============================================================================

/// Short preview of the latest message, shown in history listings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePreview {
    pub role: Role,
    pub content: String,
}

/// Conversation as it appears in the history list (no messages).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub title: String,
    pub started_at: Timestamp,
    pub last_message_at: Timestamp,
    /// Display grouping only.
    pub active: bool,
    pub message_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_preview: Option<MessagePreview>,
}

/// Full conversation with its ordered message history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub started_at: Timestamp,
    pub last_message_at: Timestamp,
    pub active: bool,
    pub messages: Vec<Message>,
}

/// Authoritative answer to a send: the conversation it landed in and the
/// assistant's reply. The user's own text is never echoed back.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssistantReply {
    pub conversation_id: ConversationId,
    pub message: Message,
}

// =============================================================================
// Hints and feedback
// =============================================================================

/// Role-scoped shortcut shown before the first message of a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickAction {
    pub label: String,
    pub url: String,
    pub icon: String,
}

/// Role-scoped example question.
pub type Suggestion = String;

/// Feedback score between 1 and 5 inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ConciergeError::Validation(format!(
                "rating must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                value
            )))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Rating {
    type Error = ConciergeError;

    fn try_from(value: u8) -> Result<Self> {
        Rating::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

/// A rating shown next to a message while its confirmation is on screen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRating {
    pub message_id: MessageId,
    pub rating: Rating,
}

// =============================================================================
// Reports
// =============================================================================

/// How the backend understood a natural-language report query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportInterpretation {
    #[serde(rename = "type")]
    pub kind: String,
    pub entity: String,
    pub period: String,
    pub metric: String,
}

/// Tabular answer to a report query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportResult {
    pub query: String,
    pub interpretation: ReportInterpretation,
    pub data: Vec<Map<String, Value>>,
    /// Keys into each row, parallel to `columns`.
    pub column_keys: Vec<String>,
    /// Human column headers.
    pub columns: Vec<String>,
    pub summary: String,
}

impl ReportResult {
    /// Cell lookup for row `row`, column `col`; falls back to the header
    /// itself when no key list was provided.
    pub fn cell(&self, row: usize, col: usize) -> Option<&Value> {
        let key = self
            .column_keys
            .get(col)
            .or_else(|| self.columns.get(col))?;
        self.data.get(row)?.get(key)
    }
}
