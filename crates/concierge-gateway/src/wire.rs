//! Wire shapes of the storefront REST API and their validation.
//!
//! Inbound payloads are parsed into permissive structs first and then
//! validated into the closed types of `concierge-core`. Core fields (ids,
//! roles, timestamps) must be well formed or the whole payload is rejected;
//! enrichment entries (suggested actions, resources, quick actions) that are
//! malformed are dropped one by one.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use concierge_core::{
    AssistantReply, Conversation, ConversationId, ConversationSummary, Message, MessageId,
    MessagePreview, QuickAction, RelatedResource, ReportInterpretation, ReportResult, Role,
    Suggestion, SuggestedAction, Timestamp,
};

use crate::error::GatewayError;

/// Category used when the backend omits an action or resource `type`.
const DEFAULT_CATEGORY: &str = "link";

// =============================================================================
// Request bodies
// =============================================================================

/// `POST /api/assistant/chat/`
#[derive(Debug, Serialize)]
pub struct ChatRequestBody<'a> {
    pub message: &'a str,
    /// Serialized as `null` for a new conversation.
    pub conversation_id: Option<&'a str>,
}

/// `POST /api/assistant/feedback/`
#[derive(Debug, Serialize)]
pub struct FeedbackBody<'a> {
    /// Id of the rated message.
    pub message: &'a str,
    pub rating: u8,
    pub comment: &'a str,
}

/// `POST /api/reports/ai/generate/`
#[derive(Debug, Serialize)]
pub struct ReportRequestBody<'a> {
    pub query: &'a str,
}

// =============================================================================
// Scalar helpers
// =============================================================================

/// Ids arrive as UUID strings or, from older endpoints, as integers.
pub fn parse_id(value: &Value, what: &str) -> Result<String, GatewayError> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(GatewayError::invalid_response(format!(
            "{} has no usable id: {}",
            what, other
        ))),
    }
}

/// RFC 3339, or a naive ISO timestamp which is taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<Timestamp, GatewayError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    Err(GatewayError::invalid_response(format!(
        "unparseable timestamp '{}'",
        raw
    )))
}

pub fn parse_role(raw: &str) -> Result<Role, GatewayError> {
    match raw.trim() {
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        other => Err(GatewayError::invalid_response(format!(
            "unknown message role '{}'",
            other
        ))),
    }
}

fn required_timestamp(raw: Option<&str>, what: &str) -> Result<Timestamp, GatewayError> {
    let raw =
        raw.ok_or_else(|| GatewayError::invalid_response(format!("{} has no timestamp", what)))?;
    parse_timestamp(raw)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

// =============================================================================
// Messages
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct WireAction {
    label: Option<String>,
    url: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    icon: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireResource {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

fn suggested_action(value: Value) -> Option<SuggestedAction> {
    let wire: WireAction = serde_json::from_value(value).ok()?;
    Some(SuggestedAction {
        label: non_blank(wire.label)?,
        url: non_blank(wire.url)?,
        category: non_blank(wire.kind).unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        icon: non_blank(wire.icon),
    })
}

fn related_resource(value: Value) -> Option<RelatedResource> {
    let wire: WireResource = serde_json::from_value(value).ok()?;
    Some(RelatedResource {
        title: non_blank(wire.title)?,
        description: wire.description.unwrap_or_default(),
        url: non_blank(wire.url)?,
        category: non_blank(wire.kind).unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
    })
}

/// A message as the backend serializes it.
#[derive(Debug, Default, Deserialize)]
pub struct WireMessage {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub suggested_actions: Option<Vec<Value>>,
    #[serde(default)]
    pub related_resources: Option<Vec<Value>>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl WireMessage {
    pub fn validate(self) -> Result<Message, GatewayError> {
        let id = parse_id(&self.id, "message")?;
        let role = parse_role(
            self.role
                .as_deref()
                .ok_or_else(|| GatewayError::invalid_response("message has no role"))?,
        )?;
        let content = self
            .content
            .ok_or_else(|| GatewayError::invalid_response(format!("message {} has no content", id)))?;
        let created_at = required_timestamp(self.created_at.as_deref(), "message")?;

        let raw_actions = self.suggested_actions.unwrap_or_default();
        let action_count = raw_actions.len();
        let suggested_actions: Vec<SuggestedAction> =
            raw_actions.into_iter().filter_map(suggested_action).collect();

        let raw_resources = self.related_resources.unwrap_or_default();
        let resource_count = raw_resources.len();
        let related_resources: Vec<RelatedResource> =
            raw_resources.into_iter().filter_map(related_resource).collect();

        let dropped = (action_count - suggested_actions.len())
            + (resource_count - related_resources.len());
        if dropped > 0 {
            warn!(message_id = %id, dropped, "Dropped malformed message enrichment entries");
        }

        Ok(Message {
            id: MessageId::new(id),
            role,
            content,
            suggested_actions,
            related_resources,
            created_at,
        })
    }
}

/// Answer to `POST /api/assistant/chat/`.
#[derive(Debug, Deserialize)]
pub struct WireChatReply {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub conversation_id: Value,
    #[serde(default)]
    pub message: Option<WireMessage>,
    #[serde(default)]
    pub error: Option<String>,
}

impl WireChatReply {
    pub fn validate(self) -> Result<AssistantReply, GatewayError> {
        if self.success == Some(false) {
            return Err(GatewayError::server(
                non_blank(self.error).unwrap_or_else(|| "backend reported failure".to_string()),
            ));
        }
        let conversation_id = ConversationId::new(parse_id(&self.conversation_id, "chat reply")?);
        let message = self
            .message
            .ok_or_else(|| GatewayError::invalid_response("chat reply has no message"))?
            .validate()?;
        if message.role != Role::Assistant {
            return Err(GatewayError::invalid_response(format!(
                "chat reply message has role '{}', expected assistant",
                message.role
            )));
        }
        Ok(AssistantReply {
            conversation_id,
            message,
        })
    }
}

// =============================================================================
// Conversations
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct WirePreview {
    pub role: String,
    pub content: String,
}

/// A conversation as it appears in listings and detail responses.
#[derive(Debug, Default, Deserialize)]
pub struct WireConversation {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub message_count: Option<u32>,
    #[serde(default)]
    pub last_message_preview: Option<WirePreview>,
    #[serde(default)]
    pub messages: Option<Vec<WireMessage>>,
}

impl WireConversation {
    fn header(&self) -> Result<(ConversationId, Timestamp, Timestamp), GatewayError> {
        let id = ConversationId::new(parse_id(&self.id, "conversation")?);
        let started_at = required_timestamp(self.started_at.as_deref(), "conversation")?;
        let last_message_at = match self.last_message_at.as_deref() {
            Some(raw) => parse_timestamp(raw)?,
            None => started_at,
        };
        Ok((id, started_at, last_message_at))
    }

    pub fn into_summary(self) -> Result<ConversationSummary, GatewayError> {
        let (id, started_at, last_message_at) = self.header()?;
        let last_message_preview = self.last_message_preview.and_then(|p| {
            parse_role(&p.role).ok().map(|role| MessagePreview {
                role,
                content: p.content,
            })
        });
        Ok(ConversationSummary {
            id,
            title: self.title.unwrap_or_default(),
            started_at,
            last_message_at,
            active: self.is_active.unwrap_or(true),
            message_count: self.message_count.unwrap_or(0),
            last_message_preview,
        })
    }

    /// Every message must validate; a conversation is never half-loaded.
    pub fn into_conversation(self) -> Result<Conversation, GatewayError> {
        let (id, started_at, last_message_at) = self.header()?;
        let messages = self
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(WireMessage::validate)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Conversation {
            id,
            title: self.title.unwrap_or_default(),
            started_at,
            last_message_at,
            active: self.is_active.unwrap_or(true),
            messages,
        })
    }
}

/// `GET /api/assistant/conversations/` answers with a bare array; older
/// deployments wrap it.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ConversationListPayload {
    Bare(Vec<Value>),
    Wrapped { conversations: Vec<Value> },
}

impl ConversationListPayload {
    /// Valid entries in server order; malformed ones are skipped.
    pub fn into_summaries(self) -> Vec<ConversationSummary> {
        let entries = match self {
            ConversationListPayload::Bare(entries) => entries,
            ConversationListPayload::Wrapped { conversations } => conversations,
        };
        entries
            .into_iter()
            .filter_map(|entry| {
                match serde_json::from_value::<WireConversation>(entry)
                    .map_err(GatewayError::from)
                    .and_then(WireConversation::into_summary)
                {
                    Ok(summary) => Some(summary),
                    Err(e) => {
                        warn!(error = %e, "Skipping malformed conversation entry");
                        None
                    }
                }
            })
            .collect()
    }
}

/// `GET /api/assistant/conversations/{id}/`, bare or wrapped.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ConversationPayload {
    Wrapped { conversation: WireConversation },
    Bare(WireConversation),
}

impl ConversationPayload {
    pub fn into_conversation(self) -> Result<Conversation, GatewayError> {
        match self {
            ConversationPayload::Wrapped { conversation } | ConversationPayload::Bare(conversation) => {
                conversation.into_conversation()
            }
        }
    }
}

// =============================================================================
// Hints
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct WireQuickAction {
    label: Option<String>,
    url: Option<String>,
    icon: Option<String>,
}

/// `GET /api/assistant/quick-actions/`
#[derive(Debug, Default, Deserialize)]
pub struct WireQuickActions {
    #[serde(default)]
    pub quick_actions: Vec<Value>,
}

impl WireQuickActions {
    pub fn into_quick_actions(self) -> Vec<QuickAction> {
        self.quick_actions
            .into_iter()
            .filter_map(|value| {
                let wire: WireQuickAction = serde_json::from_value(value).ok()?;
                Some(QuickAction {
                    label: non_blank(wire.label)?,
                    url: non_blank(wire.url)?,
                    icon: wire.icon.unwrap_or_default(),
                })
            })
            .collect()
    }
}

/// `GET /api/assistant/suggestions/`
#[derive(Debug, Default, Deserialize)]
pub struct WireSuggestions {
    #[serde(default)]
    pub suggestions: Vec<Value>,
}

impl WireSuggestions {
    pub fn into_suggestions(self) -> Vec<Suggestion> {
        self.suggestions
            .into_iter()
            .filter_map(|value| match value {
                Value::String(s) => non_blank(Some(s)),
                _ => None,
            })
            .collect()
    }
}

// =============================================================================
// Reports
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct WireInterpretation {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    entity: Option<String>,
    #[serde(default)]
    period: Option<String>,
    #[serde(default)]
    metric: Option<String>,
}

/// `POST /api/reports/ai/generate/`
#[derive(Debug, Default, Deserialize)]
pub struct WireReport {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    interpretation: Option<WireInterpretation>,
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    column_keys: Vec<String>,
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    summary: Option<String>,
}

impl WireReport {
    pub fn validate(self, requested_query: &str) -> Result<ReportResult, GatewayError> {
        if !self.column_keys.is_empty() && self.column_keys.len() != self.columns.len() {
            return Err(GatewayError::invalid_response(format!(
                "report has {} column keys for {} columns",
                self.column_keys.len(),
                self.columns.len()
            )));
        }
        let data = self
            .data
            .into_iter()
            .enumerate()
            .map(|(idx, row)| match row {
                Value::Object(map) => Ok(map),
                other => Err(GatewayError::invalid_response(format!(
                    "report row {} is not an object: {}",
                    idx, other
                ))),
            })
            .collect::<Result<Vec<Map<String, Value>>, _>>()?;
        let interpretation = self.interpretation.unwrap_or_default();
        Ok(ReportResult {
            query: non_blank(self.query).unwrap_or_else(|| requested_query.to_string()),
            interpretation: ReportInterpretation {
                kind: interpretation.kind.unwrap_or_default(),
                entity: interpretation.entity.unwrap_or_default(),
                period: interpretation.period.unwrap_or_default(),
                metric: interpretation.metric.unwrap_or_default(),
            },
            data,
            column_keys: self.column_keys,
            columns: self.columns,
            summary: self.summary.unwrap_or_default(),
        })
    }
}
