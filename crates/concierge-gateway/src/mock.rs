//! In-memory backend for tests and offline use.
//!
//! Behaves like the storefront API closely enough for the session engine:
//! conversations are created on first send, titled after the opening words,
//! soft-deleted, and listed newest first. Any operation can be made to fail
//! or be held at a gate until the test releases it.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use tokio::sync::Semaphore;
use tracing::debug;
use uuid::Uuid;

use concierge_core::{
    AssistantReply, Conversation, ConversationId, ConversationSummary, Message, MessageId,
    MessagePreview, QuickAction, Rating, ReportInterpretation, ReportResult, Role, Suggestion,
};

use crate::backend::BackendGateway;
use crate::error::GatewayError;

/// Words of the opening message kept in a conversation title.
const TITLE_WORDS: usize = 6;

const DEFAULT_REPLY: &str =
    "Entendido. Puedo ayudarte con ventas, productos, inventario, clientes y reportes.";

/// Gateway operations, for failure injection and call accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    SendMessage,
    ListConversations,
    GetConversation,
    DeleteConversation,
    SendFeedback,
    QuickActions,
    Suggestions,
    GenerateReport,
}

/// A feedback submission as the mock received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedFeedback {
    pub message_id: MessageId,
    pub rating: u8,
    pub comment: String,
}

#[derive(Debug, Default)]
struct MockState {
    conversations: Vec<Conversation>,
    failures: HashMap<MockOp, GatewayError>,
    calls: HashMap<MockOp, usize>,
    gates: HashMap<MockOp, Arc<Semaphore>>,
    replies: VecDeque<String>,
    feedback: Vec<RecordedFeedback>,
    quick_actions: Vec<QuickAction>,
    suggestions: Vec<Suggestion>,
    report: Option<ReportResult>,
}

/// Scriptable [`BackendGateway`] backed by memory.
#[derive(Debug, Default)]
pub struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock seeded with the employee quick actions and suggestions of the
    /// storefront backend.
    pub fn storefront() -> Self {
        let mock = Self::new();
        mock.set_quick_actions(vec![
            quick_action("📦 Ver Productos", "/products", "package"),
            quick_action("💰 Nueva Venta", "/pos", "shopping-cart"),
            quick_action("📋 Mis Ventas", "/orders?employee=me", "list"),
            quick_action("👥 Buscar Cliente", "/customers", "search"),
        ]);
        mock.set_suggestions(
            [
                "¿Cómo registro una venta?",
                "¿Cómo busco un producto por SKU?",
                "¿Cómo veo el stock disponible de un producto?",
                "¿Cómo registro un nuevo cliente?",
                "¿Cómo proceso un pago con tarjeta?",
                "¿Cómo genero una factura?",
                "¿Cómo veo mis ventas del día?",
                "¿Qué hago si un producto no tiene stock?",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        );
        mock
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    // =========================================================================
    // Scripting
    // =========================================================================

    pub fn set_quick_actions(&self, actions: Vec<QuickAction>) {
        self.lock().quick_actions = actions;
    }

    pub fn set_suggestions(&self, suggestions: Vec<Suggestion>) {
        self.lock().suggestions = suggestions;
    }

    pub fn set_report(&self, report: ReportResult) {
        self.lock().report = Some(report);
    }

    /// Queue the content of the next assistant reply. Unscripted sends get a
    /// generic answer.
    pub fn push_reply(&self, content: impl Into<String>) {
        self.lock().replies.push_back(content.into());
    }

    /// Make `op` fail with `error` until [`clear_failure`](Self::clear_failure).
    pub fn fail(&self, op: MockOp, error: GatewayError) {
        self.lock().failures.insert(op, error);
    }

    pub fn clear_failure(&self, op: MockOp) {
        self.lock().failures.remove(&op);
    }

    /// Park every subsequent `op` call until [`release`](Self::release).
    pub fn hold(&self, op: MockOp) {
        self.lock().gates.insert(op, Arc::new(Semaphore::new(0)));
    }

    /// Let `count` parked (or future) `op` calls through.
    pub fn release(&self, op: MockOp, count: usize) {
        if let Some(gate) = self.lock().gates.get(&op) {
            gate.add_permits(count);
        }
    }

    /// Remove the gate on `op`, letting everything through.
    pub fn open(&self, op: MockOp) {
        if let Some(gate) = self.lock().gates.remove(&op) {
            gate.close();
        }
    }

    /// Insert a conversation as if a previous session had created it.
    pub fn seed_conversation(&self, conversation: Conversation) {
        let mut state = self.lock();
        state.conversations.retain(|c| c.id != conversation.id);
        state.conversations.push(conversation);
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn calls(&self, op: MockOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Yield until `op` has been entered `count` times.
    pub async fn wait_for_calls(&self, op: MockOp, count: usize) {
        while self.calls(op) < count {
            tokio::task::yield_now().await;
        }
    }

    pub fn feedback(&self) -> Vec<RecordedFeedback> {
        self.lock().feedback.clone()
    }

    /// Stored conversation regardless of its active flag.
    pub fn stored_conversation(&self, id: &ConversationId) -> Option<Conversation> {
        self.lock().conversations.iter().find(|c| &c.id == id).cloned()
    }

    // =========================================================================
    // Plumbing
    // =========================================================================

    /// Count the call, wait at its gate if any, then report an injected failure.
    async fn enter(&self, op: MockOp) -> Result<(), GatewayError> {
        let gate = {
            let mut state = self.lock();
            *state.calls.entry(op).or_insert(0) += 1;
            state.gates.get(&op).cloned()
        };
        if let Some(gate) = gate {
            // A closed gate means it was opened for good.
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        match self.lock().failures.get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

fn quick_action(label: &str, url: &str, icon: &str) -> QuickAction {
    QuickAction {
        label: label.to_string(),
        url: url.to_string(),
        icon: icon.to_string(),
    }
}

/// The first words of `text`, with an ellipsis when there were more.
pub fn title_from(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() > TITLE_WORDS {
        format!("{}...", words[..TITLE_WORDS].join(" "))
    } else {
        words.join(" ")
    }
}

fn sample_report(query: &str) -> ReportResult {
    let rows = [("Café", 1520.5, 96), ("Pan dulce", 870.0, 145)];
    let data: Vec<Map<String, Value>> = rows
        .iter()
        .filter_map(|(product, total, units)| {
            json!({"product": product, "total": total, "units": units})
                .as_object()
                .cloned()
        })
        .collect();
    ReportResult {
        query: query.to_string(),
        interpretation: ReportInterpretation {
            kind: "sales".to_string(),
            entity: "product".to_string(),
            period: "month".to_string(),
            metric: "total".to_string(),
        },
        data,
        column_keys: vec!["product".into(), "total".into(), "units".into()],
        columns: vec!["Producto".into(), "Total".into(), "Unidades".into()],
        summary: "Café encabeza las ventas del mes.".to_string(),
    }
}

#[async_trait]
impl BackendGateway for MockGateway {
    async fn send_message(
        &self,
        text: &str,
        conversation_id: Option<&ConversationId>,
    ) -> Result<AssistantReply, GatewayError> {
        self.enter(MockOp::SendMessage).await?;
        let mut state = self.lock();
        let now = Utc::now();

        let idx = match conversation_id {
            Some(id) => state
                .conversations
                .iter()
                .position(|c| &c.id == id && c.active)
                .ok_or_else(|| GatewayError::not_found("Conversación no encontrada").with_status(404))?,
            None => {
                state.conversations.push(Conversation {
                    id: ConversationId::new(Uuid::new_v4().to_string()),
                    title: title_from(text),
                    started_at: now,
                    last_message_at: now,
                    active: true,
                    messages: Vec::new(),
                });
                state.conversations.len() - 1
            }
        };

        let content = state
            .replies
            .pop_front()
            .unwrap_or_else(|| DEFAULT_REPLY.to_string());
        let reply = Message {
            id: MessageId::new(Uuid::new_v4().to_string()),
            role: Role::Assistant,
            content,
            suggested_actions: Vec::new(),
            related_resources: Vec::new(),
            created_at: now,
        };
        let conversation = &mut state.conversations[idx];
        conversation.messages.push(Message {
            id: MessageId::new(Uuid::new_v4().to_string()),
            role: Role::User,
            content: text.to_string(),
            suggested_actions: Vec::new(),
            related_resources: Vec::new(),
            created_at: now,
        });
        conversation.messages.push(reply.clone());
        conversation.last_message_at = now;
        debug!(conversation_id = %conversation.id, "Mock reply stored");

        Ok(AssistantReply {
            conversation_id: conversation.id.clone(),
            message: reply,
        })
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, GatewayError> {
        self.enter(MockOp::ListConversations).await?;
        let state = self.lock();
        let mut summaries: Vec<ConversationSummary> = state
            .conversations
            .iter()
            .filter(|c| c.active)
            .map(|c| ConversationSummary {
                id: c.id.clone(),
                title: c.title.clone(),
                started_at: c.started_at,
                last_message_at: c.last_message_at,
                active: c.active,
                message_count: c.messages.len() as u32,
                last_message_preview: c.messages.last().map(|m| MessagePreview {
                    role: m.role,
                    content: m.content.clone(),
                }),
            })
            .collect();
        summaries.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        Ok(summaries)
    }

    async fn get_conversation(&self, id: &ConversationId) -> Result<Conversation, GatewayError> {
        self.enter(MockOp::GetConversation).await?;
        self.lock()
            .conversations
            .iter()
            .find(|c| &c.id == id && c.active)
            .cloned()
            .ok_or_else(|| GatewayError::not_found("No encontrado.").with_status(404))
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<(), GatewayError> {
        self.enter(MockOp::DeleteConversation).await?;
        let mut state = self.lock();
        match state
            .conversations
            .iter_mut()
            .find(|c| &c.id == id && c.active)
        {
            Some(conversation) => {
                conversation.active = false;
                Ok(())
            }
            None => Err(GatewayError::not_found("No encontrado.").with_status(404)),
        }
    }

    async fn send_feedback(
        &self,
        message_id: &MessageId,
        rating: Rating,
        comment: Option<&str>,
    ) -> Result<(), GatewayError> {
        self.enter(MockOp::SendFeedback).await?;
        self.lock().feedback.push(RecordedFeedback {
            message_id: message_id.clone(),
            rating: rating.value(),
            comment: comment.unwrap_or_default().to_string(),
        });
        Ok(())
    }

    async fn quick_actions(&self) -> Result<Vec<QuickAction>, GatewayError> {
        self.enter(MockOp::QuickActions).await?;
        Ok(self.lock().quick_actions.clone())
    }

    async fn suggestions(&self) -> Result<Vec<Suggestion>, GatewayError> {
        self.enter(MockOp::Suggestions).await?;
        Ok(self.lock().suggestions.clone())
    }

    async fn generate_report(&self, query: &str) -> Result<ReportResult, GatewayError> {
        self.enter(MockOp::GenerateReport).await?;
        if query.trim().is_empty() {
            return Err(
                GatewayError::invalid_request("La consulta no puede estar vacía").with_status(400),
            );
        }
        let scripted = self.lock().report.clone();
        Ok(match scripted {
            Some(mut report) => {
                report.query = query.to_string();
                report
            }
            None => sample_report(query),
        })
    }
}
