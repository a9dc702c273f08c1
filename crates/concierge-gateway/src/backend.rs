//! The request/response contract the session engine consumes.

use std::sync::Arc;

use async_trait::async_trait;
use concierge_core::{
    AssistantReply, Conversation, ConversationId, ConversationSummary, MessageId, QuickAction,
    Rating, ReportResult, Suggestion,
};

use crate::error::GatewayError;

/// Typed access to the storefront assistant backend.
///
/// Every method is exactly one round trip.
#[async_trait]
pub trait BackendGateway: Send + Sync {
    /// Send user text. The backend creates a conversation when `conversation_id`
    /// is `None` and always answers with the id it used. The returned message
    /// is the assistant's reply, never an echo of `text`.
    async fn send_message(
        &self,
        text: &str,
        conversation_id: Option<&ConversationId>,
    ) -> Result<AssistantReply, GatewayError>;

    /// Conversation history in server order.
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, GatewayError>;

    /// One conversation with its full message history.
    async fn get_conversation(&self, id: &ConversationId) -> Result<Conversation, GatewayError>;

    /// Soft-delete a conversation.
    async fn delete_conversation(&self, id: &ConversationId) -> Result<(), GatewayError>;

    /// Rate an assistant message.
    async fn send_feedback(
        &self,
        message_id: &MessageId,
        rating: Rating,
        comment: Option<&str>,
    ) -> Result<(), GatewayError>;

    /// Role-scoped navigation shortcuts.
    async fn quick_actions(&self) -> Result<Vec<QuickAction>, GatewayError>;

    /// Role-scoped example questions.
    async fn suggestions(&self) -> Result<Vec<Suggestion>, GatewayError>;

    /// Turn a natural-language query into a tabular report.
    async fn generate_report(&self, query: &str) -> Result<ReportResult, GatewayError>;
}

#[async_trait]
impl<T: BackendGateway + ?Sized> BackendGateway for Arc<T> {
    async fn send_message(
        &self,
        text: &str,
        conversation_id: Option<&ConversationId>,
    ) -> Result<AssistantReply, GatewayError> {
        (**self).send_message(text, conversation_id).await
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, GatewayError> {
        (**self).list_conversations().await
    }

    async fn get_conversation(&self, id: &ConversationId) -> Result<Conversation, GatewayError> {
        (**self).get_conversation(id).await
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<(), GatewayError> {
        (**self).delete_conversation(id).await
    }

    async fn send_feedback(
        &self,
        message_id: &MessageId,
        rating: Rating,
        comment: Option<&str>,
    ) -> Result<(), GatewayError> {
        (**self).send_feedback(message_id, rating, comment).await
    }

    async fn quick_actions(&self) -> Result<Vec<QuickAction>, GatewayError> {
        (**self).quick_actions().await
    }

    async fn suggestions(&self) -> Result<Vec<Suggestion>, GatewayError> {
        (**self).suggestions().await
    }

    async fn generate_report(&self, query: &str) -> Result<ReportResult, GatewayError> {
        (**self).generate_report(query).await
    }
}
