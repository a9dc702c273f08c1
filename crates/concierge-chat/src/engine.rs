//! Session engine: the single owner of an assistant session.
//!
//! Commands mutate [`SessionState`] under one lock and publish a fresh
//! [`SessionSnapshot`] after every mutation. The only suspension point of any
//! command is its gateway round trip, and the lock is never held across it.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use concierge_core::config::ChatConfig;
use concierge_core::{
    ConversationId, DraftText, EventBus, FeedbackRating, MessageId, Rating, Role, SessionEvent,
};
use concierge_gateway::{BackendGateway, GatewayError};

use crate::error::ChatError;
use crate::guard::OnDrop;
use crate::session::{Reconciled, SessionSnapshot, SessionState};

/// How a `send` ended.
#[derive(Debug, Clone)]
pub enum SendOutcome {
    /// Nothing was appended; the reason is informational only.
    Ignored(ChatError),
    /// The assistant reply was appended.
    Replied {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    /// The synthetic apology was appended.
    Failed { reason: String },
    /// The conversation was replaced while the send was out.
    Superseded,
}

impl SendOutcome {
    pub fn is_ignored(&self) -> bool {
        matches!(self, SendOutcome::Ignored(_))
    }
}

struct Inner {
    gateway: Arc<dyn BackendGateway>,
    state: Mutex<SessionState>,
    snapshots: watch::Sender<SessionSnapshot>,
    events: EventBus,
    draft: DraftText,
    settings: ChatConfig,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Mutate the state and publish the resulting snapshot.
    fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.lock();
        let result = f(&mut state);
        self.snapshots.send_replace(state.snapshot());
        result
    }

    fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        f(&self.lock())
    }

    fn publish(&self, event: SessionEvent) {
        self.events.publish(event);
    }
}

/// Conversational assistant session.
///
/// Cheap to clone; clones drive the same session.
#[derive(Clone)]
pub struct SessionEngine {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEngine")
            .field("state", &*self.inner.lock())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

impl SessionEngine {
    /// `draft` is the outbound text field shared with voice input.
    pub fn new(gateway: Arc<dyn BackendGateway>, settings: ChatConfig, draft: DraftText) -> Self {
        let state = SessionState::new();
        let (snapshots, _) = watch::channel(state.snapshot());
        Self {
            inner: Arc::new(Inner {
                gateway,
                state: Mutex::new(state),
                snapshots,
                events: EventBus::new(),
                draft,
                settings,
            }),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.read(|s| s.snapshot())
    }

    /// Receiver that always holds the latest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// The session's event bus, for sharing with voice input.
    pub fn events(&self) -> EventBus {
        self.inner.events.clone()
    }

    pub fn draft(&self) -> DraftText {
        self.inner.draft.clone()
    }

    // =========================================================================
    // Sending
    // =========================================================================

    /// Send user text to the assistant.
    ///
    /// The user message is appended before the backend is contacted and the
    /// outbound text field is cleared. Exactly one more message is appended
    /// afterwards: the reply, or a synthetic apology on failure. Blank or
    /// oversized text is ignored, as is a send while another send, a load or
    /// a delete is in flight. The text goes out as typed.
    pub async fn send(&self, text: &str) -> SendOutcome {
        if text.trim().is_empty() {
            debug!("Empty message ignored");
            return SendOutcome::Ignored(ChatError::EmptyMessage);
        }
        let max = self.inner.settings.max_message_length;
        let length = text.chars().count();
        if length > max {
            warn!(length, max, "Message too long; ignored");
            return SendOutcome::Ignored(ChatError::MessageTooLong(max));
        }

        let ticket = match self.inner.update(|s| s.begin_send(text, Utc::now())) {
            Ok(ticket) => ticket,
            Err(e) => {
                debug!(reason = %e, "Send refused");
                return SendOutcome::Ignored(e);
            }
        };
        let inner = &self.inner;
        let guard = OnDrop::new(|| {
            inner.update(|s| s.finish_send());
            warn!("Send abandoned before the backend answered");
        });
        inner.draft.clear();
        inner.publish(SessionEvent::MessageAppended {
            message_id: ticket.tentative_id.clone(),
            role: Role::User,
            timestamp: Utc::now(),
        });
        inner.publish(SessionEvent::SendStarted {
            conversation_id: ticket.conversation_id.clone(),
            timestamp: Utc::now(),
        });
        debug!(conversation_id = ?ticket.conversation_id, "Sending message");

        let result = inner
            .gateway
            .send_message(text, ticket.conversation_id.as_ref())
            .await;

        match result {
            Ok(reply) => {
                let reconciled = inner.update(|s| {
                    let reconciled = s.complete_send(&ticket, reply);
                    s.finish_send();
                    reconciled
                });
                guard.disarm();
                match reconciled {
                    Reconciled::Appended {
                        conversation_id,
                        message_id,
                    } => {
                        info!(conversation_id = %conversation_id, "Assistant replied");
                        inner.publish(SessionEvent::MessageAppended {
                            message_id: message_id.clone(),
                            role: Role::Assistant,
                            timestamp: Utc::now(),
                        });
                        inner.publish(SessionEvent::SendCompleted {
                            conversation_id: conversation_id.clone(),
                            message_id: message_id.clone(),
                            timestamp: Utc::now(),
                        });
                        SendOutcome::Replied {
                            conversation_id,
                            message_id,
                        }
                    }
                    Reconciled::Superseded => SendOutcome::Superseded,
                }
            }
            Err(e) => {
                warn!(error = %e, kind = ?e.kind, "Send failed");
                let apology = inner.settings.apology_message.as_str();
                let synthetic = inner.update(|s| {
                    let id = s.fail_send(&ticket, apology, Utc::now());
                    s.finish_send();
                    id
                });
                guard.disarm();
                let Some(message_id) = synthetic else {
                    return SendOutcome::Superseded;
                };
                inner.publish(SessionEvent::MessageAppended {
                    message_id,
                    role: Role::Assistant,
                    timestamp: Utc::now(),
                });
                inner.publish(SessionEvent::SendFailed {
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                });
                SendOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Send whatever the outbound text field holds.
    pub async fn send_draft(&self) -> SendOutcome {
        let text = self.inner.draft.get();
        self.send(&text).await
    }

    /// A clicked suggestion: fill the outbound field and send it.
    pub async fn send_suggestion(&self, suggestion: &str) -> SendOutcome {
        self.inner.draft.set(suggestion);
        self.send(suggestion).await
    }

    // =========================================================================
    // Conversations
    // =========================================================================

    /// Clear the history for a fresh conversation. Idempotent.
    pub fn start_conversation(&self) -> Result<(), ChatError> {
        self.inner.update(|s| s.start_conversation())?;
        debug!("New conversation");
        self.inner.publish(SessionEvent::ConversationStarted {
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Replace the current conversation with `id`'s full history.
    ///
    /// On failure the state is untouched and `last_error` is set. A load
    /// overtaken by a later load or a new conversation is dropped. Sends are
    /// refused until the load settles.
    pub async fn load_conversation(&self, id: &ConversationId) -> Result<(), ChatError> {
        let seq = self.inner.update(|s| s.begin_load())?;
        let guard = OnDrop::new(|| self.inner.update(|s| s.end_switch()));
        debug!(conversation_id = %id, "Loading conversation");

        let fetched = self
            .inner
            .gateway
            .get_conversation(id)
            .await
            .and_then(|conversation| {
                if &conversation.id == id {
                    Ok(conversation)
                } else {
                    Err(GatewayError::invalid_response(format!(
                        "asked for conversation {} but received {}",
                        id, conversation.id
                    )))
                }
            });

        match fetched {
            Ok(conversation) => {
                let message_count = conversation.messages.len();
                let applied = self.inner.update(|s| {
                    s.end_switch();
                    s.apply_load(seq, conversation)
                });
                guard.disarm();
                if applied {
                    info!(conversation_id = %id, message_count, "Conversation loaded");
                    self.inner.publish(SessionEvent::ConversationLoaded {
                        conversation_id: id.clone(),
                        message_count,
                        timestamp: Utc::now(),
                    });
                } else {
                    debug!(conversation_id = %id, "Load overtaken; discarded");
                }
                Ok(())
            }
            Err(e) => {
                warn!(conversation_id = %id, error = %e, "Failed to load conversation");
                let reason = e.to_string();
                let current = self.inner.update(|s| {
                    s.end_switch();
                    s.fail_load(seq, reason.clone())
                });
                guard.disarm();
                if current {
                    self.inner.publish(SessionEvent::ConversationLoadFailed {
                        conversation_id: id.clone(),
                        reason,
                        timestamp: Utc::now(),
                    });
                }
                Err(ChatError::Gateway(e))
            }
        }
    }

    /// Fetch the conversation history list. Failure leaves an empty list.
    pub async fn refresh_conversations(&self) {
        let conversations = match self.inner.gateway.list_conversations().await {
            Ok(conversations) => {
                debug!(count = conversations.len(), "Conversation history refreshed");
                conversations
            }
            Err(e) => {
                warn!(error = %e, "Failed to list conversations");
                Vec::new()
            }
        };
        self.inner.update(|s| s.set_conversations(conversations));
    }

    /// Delete a conversation on the backend and drop it from the list. The
    /// current conversation is replaced by a fresh one when it is deleted.
    /// Sends are refused until the backend answers.
    pub async fn delete_conversation(&self, id: &ConversationId) -> Result<(), ChatError> {
        self.inner.update(|s| s.begin_delete())?;
        let guard = OnDrop::new(|| self.inner.update(|s| s.end_switch()));
        let result = self.inner.gateway.delete_conversation(id).await;
        if let Err(e) = result {
            warn!(conversation_id = %id, error = %e, "Failed to delete conversation");
            let reason = e.to_string();
            self.inner.update(|s| {
                s.end_switch();
                s.set_last_error(Some(reason));
            });
            guard.disarm();
            return Err(ChatError::Gateway(e));
        }
        let was_current = self.inner.update(|s| {
            s.end_switch();
            s.remove_conversation(id)
        });
        guard.disarm();
        info!(conversation_id = %id, was_current, "Conversation deleted");
        self.inner.publish(SessionEvent::ConversationDeleted {
            conversation_id: id.clone(),
            timestamp: Utc::now(),
        });
        if was_current {
            self.inner.publish(SessionEvent::ConversationStarted {
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    /// Dismiss `last_error`.
    pub fn clear_error(&self) {
        self.inner.update(|s| s.set_last_error(None));
    }

    // =========================================================================
    // Feedback
    // =========================================================================

    /// Rate an assistant message.
    ///
    /// The rating is shown for `rating_display_millis` and submitted in the
    /// background; a failed submission is only logged. Rating again restarts
    /// the window. Must be called from within a Tokio runtime.
    pub fn rate(&self, message_id: &MessageId, value: u8) -> Result<(), ChatError> {
        let rating = Rating::new(value)?;
        self.inner.read(|s| match s.message(message_id) {
            Some(m) if m.role == Role::Assistant && m.id.is_durable() => Ok(()),
            Some(_) => Err(ChatError::Validation(format!(
                "message {} cannot be rated",
                message_id
            ))),
            None => Err(ChatError::Validation(format!(
                "message {} is not in this conversation",
                message_id
            ))),
        })?;

        let seq = self.inner.update(|s| {
            s.set_rating(FeedbackRating {
                message_id: message_id.clone(),
                rating,
            })
        });
        self.inner.publish(SessionEvent::FeedbackRecorded {
            message_id: message_id.clone(),
            rating: rating.value(),
            timestamp: Utc::now(),
        });

        let gateway = self.inner.gateway.clone();
        let rated = message_id.clone();
        tokio::spawn(async move {
            if let Err(e) = gateway.send_feedback(&rated, rating, None).await {
                warn!(message_id = %rated, error = %e, "Failed to submit feedback");
            }
        });

        let inner = self.inner.clone();
        let window = Duration::from_millis(self.inner.settings.rating_display_millis);
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if let Some(expired) = inner.update(|s| s.expire_rating(seq)) {
                inner.publish(SessionEvent::FeedbackExpired {
                    message_id: expired.message_id,
                    timestamp: Utc::now(),
                });
            }
        });
        Ok(())
    }

    // =========================================================================
    // Hints
    // =========================================================================

    /// Fetch quick actions unless already cached. Failures leave the cache
    /// empty and are not surfaced.
    pub async fn load_quick_actions(&self) {
        if self.inner.read(|s| s.has_quick_actions()) {
            return;
        }
        match self.inner.gateway.quick_actions().await {
            Ok(actions) => {
                let count = actions.len();
                if self.inner.update(|s| s.fill_quick_actions(actions)) {
                    self.inner.publish(SessionEvent::QuickActionsLoaded {
                        count,
                        timestamp: Utc::now(),
                    });
                }
            }
            Err(e) => warn!(error = %e, "Failed to load quick actions"),
        }
    }

    /// Fetch suggestions unless already cached. Failures leave the cache
    /// empty and are not surfaced.
    pub async fn load_suggestions(&self) {
        if self.inner.read(|s| s.has_suggestions()) {
            return;
        }
        match self.inner.gateway.suggestions().await {
            Ok(suggestions) => {
                let count = suggestions.len();
                if self.inner.update(|s| s.fill_suggestions(suggestions)) {
                    self.inner.publish(SessionEvent::SuggestionsLoaded {
                        count,
                        timestamp: Utc::now(),
                    });
                }
            }
            Err(e) => warn!(error = %e, "Failed to load suggestions"),
        }
    }

    /// The widget opened: load both hint lists concurrently.
    pub async fn open(&self) {
        tokio::join!(self.load_quick_actions(), self.load_suggestions());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_core::{Conversation, Message};
    use concierge_gateway::{MockGateway, MockOp};

    fn engine_with(mock: Arc<MockGateway>) -> SessionEngine {
        SessionEngine::new(mock, ChatConfig::default(), DraftText::new())
    }

    fn seeded_conversation(id: &str) -> Conversation {
        let now = Utc::now();
        Conversation {
            id: ConversationId::new(id),
            title: "Inventario".to_string(),
            started_at: now,
            last_message_at: now,
            active: true,
            messages: vec![
                Message {
                    id: MessageId::new("m1"),
                    role: Role::User,
                    content: "¿Cuánto stock hay?".to_string(),
                    suggested_actions: Vec::new(),
                    related_resources: Vec::new(),
                    created_at: now,
                },
                Message {
                    id: MessageId::new("m2"),
                    role: Role::Assistant,
                    content: "Revisa el inventario".to_string(),
                    suggested_actions: Vec::new(),
                    related_resources: Vec::new(),
                    created_at: now,
                },
            ],
        }
    }

    // =========================================================================
    // Sending
    // =========================================================================

    #[tokio::test]
    async fn test_send_success_scenario() {
        let mock = Arc::new(MockGateway::new());
        mock.push_reply("¡Hola!");
        let engine = engine_with(mock.clone());

        let outcome = engine.send("Hola").await;
        assert!(matches!(outcome, SendOutcome::Replied { .. }));

        let snap = engine.snapshot();
        assert_eq!(snap.messages.len(), 2);
        assert_eq!(snap.messages[0].content, "Hola");
        assert!(snap.messages[0].id.is_tentative());
        assert_eq!(snap.messages[1].content, "¡Hola!");
        assert_eq!(snap.messages[1].role, Role::Assistant);
        assert!(snap.conversation_id.is_some());
        assert!(!snap.pending);
    }

    #[tokio::test]
    async fn test_send_failure_scenario() {
        let mock = Arc::new(MockGateway::new());
        mock.fail(MockOp::SendMessage, GatewayError::network("connection refused"));
        let engine = engine_with(mock);

        let outcome = engine.send("x").await;
        assert!(matches!(outcome, SendOutcome::Failed { .. }));

        let snap = engine.snapshot();
        assert_eq!(snap.messages.len(), 2);
        assert_eq!(snap.messages[0].content, "x");
        assert!(snap.messages[1].id.is_synthetic());
        assert_eq!(
            snap.messages[1].content,
            ChatConfig::default().apology_message
        );
        assert!(snap.conversation_id.is_none());
        assert!(!snap.pending);
    }

    #[tokio::test]
    async fn test_invalid_sends_are_ignored() {
        let mock = Arc::new(MockGateway::new());
        let settings = ChatConfig {
            max_message_length: 5,
            ..ChatConfig::default()
        };
        let engine = SessionEngine::new(mock.clone(), settings, DraftText::new());

        assert!(matches!(
            engine.send("   ").await,
            SendOutcome::Ignored(ChatError::EmptyMessage)
        ));
        assert!(matches!(
            engine.send("demasiado largo").await,
            SendOutcome::Ignored(ChatError::MessageTooLong(5))
        ));
        assert!(engine.snapshot().messages.is_empty());
        assert_eq!(mock.calls(MockOp::SendMessage), 0);
    }

    #[tokio::test]
    async fn test_tentative_message_precedes_reply_and_second_send_is_noop() {
        let mock = Arc::new(MockGateway::new());
        mock.hold(MockOp::SendMessage);
        let engine = engine_with(mock.clone());

        let task = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.send("primero").await })
        };
        mock.wait_for_calls(MockOp::SendMessage, 1).await;

        let snap = engine.snapshot();
        assert_eq!(snap.messages.len(), 1);
        assert!(snap.pending);

        assert!(matches!(
            engine.send("segundo").await,
            SendOutcome::Ignored(ChatError::SendInFlight)
        ));
        assert_eq!(engine.snapshot().messages.len(), 1);

        mock.release(MockOp::SendMessage, 1);
        task.await.unwrap();
        let snap = engine.snapshot();
        assert_eq!(snap.messages.len(), 2);
        assert!(!snap.pending);
        assert_eq!(mock.calls(MockOp::SendMessage), 1);
    }

    #[tokio::test]
    async fn test_cancelled_send_clears_pending() {
        let mock = Arc::new(MockGateway::new());
        mock.hold(MockOp::SendMessage);
        let engine = engine_with(mock.clone());

        let task = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.send("hola").await })
        };
        mock.wait_for_calls(MockOp::SendMessage, 1).await;
        assert!(engine.snapshot().pending);

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        let snap = engine.snapshot();
        assert!(!snap.pending);
        assert_eq!(snap.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_send_reuses_conversation_id() {
        let mock = Arc::new(MockGateway::new());
        let engine = engine_with(mock.clone());
        engine.send("uno").await;
        let first = engine.snapshot().conversation_id.unwrap();
        engine.send("dos").await;

        let snap = engine.snapshot();
        assert_eq!(snap.conversation_id, Some(first.clone()));
        assert_eq!(snap.messages.len(), 4);
        assert_eq!(mock.stored_conversation(&first).unwrap().messages.len(), 4);
    }

    #[tokio::test]
    async fn test_send_clears_draft() {
        let mock = Arc::new(MockGateway::new());
        let draft = DraftText::new();
        let engine = SessionEngine::new(mock, ChatConfig::default(), draft.clone());
        draft.set("hola mundo");
        engine.send_draft().await;
        assert!(draft.is_blank());
        assert_eq!(engine.snapshot().messages[0].content, "hola mundo");
    }

    #[tokio::test]
    async fn test_send_suggestion() {
        let mock = Arc::new(MockGateway::storefront());
        let engine = engine_with(mock);
        engine.open().await;
        let suggestion = engine.snapshot().suggestions[0].clone();
        assert!(engine.snapshot().hints_visible);

        engine.send_suggestion(&suggestion).await;
        let snap = engine.snapshot();
        assert_eq!(snap.messages[0].content, suggestion);
        assert!(!snap.hints_visible);
        assert!(engine.draft().is_blank());
    }

    // =========================================================================
    // Conversations
    // =========================================================================

    #[tokio::test]
    async fn test_load_conversation_replaces_history() {
        let mock = Arc::new(MockGateway::new());
        mock.seed_conversation(seeded_conversation("c9"));
        let engine = engine_with(mock);
        engine.send("algo").await;

        engine
            .load_conversation(&ConversationId::new("c9"))
            .await
            .unwrap();
        let snap = engine.snapshot();
        assert_eq!(snap.conversation_id, Some(ConversationId::new("c9")));
        let ids: Vec<&str> = snap.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn test_load_failure_leaves_state_untouched() {
        let mock = Arc::new(MockGateway::new());
        let engine = engine_with(mock);
        engine.send("hola").await;
        let before = engine.snapshot();

        let err = engine
            .load_conversation(&ConversationId::new("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Gateway(_)));

        let after = engine.snapshot();
        assert_eq!(after.messages, before.messages);
        assert_eq!(after.conversation_id, before.conversation_id);
        assert!(after.last_error.is_some());

        engine.clear_error();
        assert!(engine.snapshot().last_error.is_none());
    }

    #[tokio::test]
    async fn test_switching_rejected_while_sending() {
        let mock = Arc::new(MockGateway::new());
        mock.seed_conversation(seeded_conversation("c9"));
        mock.hold(MockOp::SendMessage);
        let engine = engine_with(mock.clone());

        let task = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.send("hola").await })
        };
        mock.wait_for_calls(MockOp::SendMessage, 1).await;

        assert!(matches!(
            engine.start_conversation(),
            Err(ChatError::SendInFlight)
        ));
        assert!(matches!(
            engine.load_conversation(&ConversationId::new("c9")).await,
            Err(ChatError::SendInFlight)
        ));
        assert!(matches!(
            engine.delete_conversation(&ConversationId::new("c9")).await,
            Err(ChatError::SendInFlight)
        ));
        assert_eq!(mock.calls(MockOp::GetConversation), 0);
        assert_eq!(mock.calls(MockOp::DeleteConversation), 0);

        mock.release(MockOp::SendMessage, 1);
        task.await.unwrap();
        assert_eq!(engine.snapshot().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_send_refused_while_load_in_flight() {
        let mock = Arc::new(MockGateway::new());
        mock.seed_conversation(seeded_conversation("c9"));
        mock.hold(MockOp::GetConversation);
        let engine = engine_with(mock.clone());

        let load = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.load_conversation(&ConversationId::new("c9")).await })
        };
        mock.wait_for_calls(MockOp::GetConversation, 1).await;

        let outcome = engine.send("hola").await;
        assert!(matches!(outcome, SendOutcome::Ignored(ChatError::SwitchInFlight)));
        assert!(engine.snapshot().messages.is_empty());
        assert_eq!(mock.calls(MockOp::SendMessage), 0);

        mock.release(MockOp::GetConversation, 1);
        load.await.unwrap().unwrap();

        let snap = engine.snapshot();
        assert_eq!(snap.conversation_id, Some(ConversationId::new("c9")));
        assert_eq!(snap.messages.len(), 2);
        assert!(!snap.pending);

        assert!(matches!(engine.send("hola").await, SendOutcome::Replied { .. }));
        assert_eq!(engine.snapshot().messages.len(), 4);
    }

    #[tokio::test]
    async fn test_delete_of_current_conversation_keeps_later_send_out() {
        let mock = Arc::new(MockGateway::new());
        let engine = engine_with(mock.clone());
        let SendOutcome::Replied {
            conversation_id, ..
        } = engine.send("primero").await
        else {
            panic!("first send should be answered");
        };
        assert_eq!(engine.snapshot().messages.len(), 2);

        mock.hold(MockOp::DeleteConversation);
        let delete = {
            let engine = engine.clone();
            let id = conversation_id.clone();
            tokio::spawn(async move { engine.delete_conversation(&id).await })
        };
        mock.wait_for_calls(MockOp::DeleteConversation, 1).await;

        let outcome = engine.send("segundo").await;
        assert!(matches!(outcome, SendOutcome::Ignored(ChatError::SwitchInFlight)));
        assert_eq!(engine.snapshot().messages.len(), 2);
        assert_eq!(mock.calls(MockOp::SendMessage), 1);

        mock.release(MockOp::DeleteConversation, 1);
        delete.await.unwrap().unwrap();

        let snap = engine.snapshot();
        assert!(snap.messages.is_empty());
        assert!(snap.conversation_id.is_none());
        assert!(!snap.pending);

        assert!(matches!(engine.send("segundo").await, SendOutcome::Replied { .. }));
        let contents: Vec<String> = engine
            .snapshot()
            .messages
            .iter()
            .map(|m| m.content.clone())
            .collect();
        assert_eq!(contents[0], "segundo");
        assert_eq!(contents.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_delete_lets_sends_through_again() {
        let mock = Arc::new(MockGateway::new());
        let engine = engine_with(mock.clone());
        assert!(engine
            .delete_conversation(&ConversationId::new("missing"))
            .await
            .is_err());
        assert!(engine.snapshot().last_error.is_some());
        assert!(matches!(engine.send("hola").await, SendOutcome::Replied { .. }));
    }

    #[tokio::test]
    async fn test_abandoned_switch_lets_sends_through_again() {
        let mock = Arc::new(MockGateway::new());
        mock.seed_conversation(seeded_conversation("c9"));
        mock.hold(MockOp::GetConversation);
        mock.hold(MockOp::DeleteConversation);
        let engine = engine_with(mock.clone());

        let load = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.load_conversation(&ConversationId::new("c9")).await })
        };
        mock.wait_for_calls(MockOp::GetConversation, 1).await;
        load.abort();
        let _ = load.await;

        let delete = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.delete_conversation(&ConversationId::new("c9")).await })
        };
        mock.wait_for_calls(MockOp::DeleteConversation, 1).await;
        delete.abort();
        let _ = delete.await;

        assert!(matches!(engine.send("hola").await, SendOutcome::Replied { .. }));
    }

    #[tokio::test]
    async fn test_send_keeps_surrounding_whitespace() {
        let mock = Arc::new(MockGateway::new());
        let engine = engine_with(mock.clone());
        assert!(matches!(
            engine.send("   ").await,
            SendOutcome::Ignored(ChatError::EmptyMessage)
        ));

        let SendOutcome::Replied {
            conversation_id, ..
        } = engine.send("  hola\n").await
        else {
            panic!("send should be answered");
        };
        assert_eq!(engine.snapshot().messages[0].content, "  hola\n");
        let stored = mock.stored_conversation(&conversation_id).unwrap();
        assert_eq!(stored.messages[0].content, "  hola\n");
    }

    #[tokio::test]
    async fn test_start_conversation_clears_history() {
        let mock = Arc::new(MockGateway::new());
        let engine = engine_with(mock);
        engine.send("hola").await;
        engine.start_conversation().unwrap();
        engine.start_conversation().unwrap();
        let snap = engine.snapshot();
        assert!(snap.messages.is_empty());
        assert!(snap.conversation_id.is_none());
        assert!(snap.hints_visible);
    }

    #[tokio::test]
    async fn test_refresh_and_delete_current() {
        let mock = Arc::new(MockGateway::new());
        let engine = engine_with(mock.clone());
        engine.send("hola").await;
        let current = engine.snapshot().conversation_id.unwrap();

        engine.refresh_conversations().await;
        assert_eq!(engine.snapshot().conversations.len(), 1);

        engine.delete_conversation(&current).await.unwrap();
        let snap = engine.snapshot();
        assert!(snap.conversations.is_empty());
        assert!(snap.messages.is_empty());
        assert!(snap.conversation_id.is_none());
        assert!(!mock.stored_conversation(&current).unwrap().active);
    }

    #[tokio::test]
    async fn test_delete_failure_sets_error() {
        let mock = Arc::new(MockGateway::new());
        let engine = engine_with(mock);
        let err = engine
            .delete_conversation(&ConversationId::new("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Gateway(_)));
        assert!(engine.snapshot().last_error.is_some());
    }

    #[tokio::test]
    async fn test_refresh_failure_degrades_to_empty() {
        let mock = Arc::new(MockGateway::new());
        let engine = engine_with(mock.clone());
        engine.send("hola").await;
        engine.refresh_conversations().await;
        assert_eq!(engine.snapshot().conversations.len(), 1);

        mock.fail(MockOp::ListConversations, GatewayError::server("caído"));
        engine.refresh_conversations().await;
        assert!(engine.snapshot().conversations.is_empty());
    }

    // =========================================================================
    // Hints
    // =========================================================================

    #[tokio::test]
    async fn test_hints_fetched_once() {
        let mock = Arc::new(MockGateway::storefront());
        let engine = engine_with(mock.clone());
        engine.open().await;
        engine.open().await;
        assert_eq!(mock.calls(MockOp::QuickActions), 1);
        assert_eq!(mock.calls(MockOp::Suggestions), 1);
        let snap = engine.snapshot();
        assert_eq!(snap.quick_actions.len(), 4);
        assert_eq!(snap.suggestions.len(), 8);
    }

    #[tokio::test]
    async fn test_hint_failures_degrade_silently() {
        let mock = Arc::new(MockGateway::storefront());
        mock.fail(MockOp::QuickActions, GatewayError::unauthorized("sin token"));
        let engine = engine_with(mock.clone());
        engine.open().await;
        let snap = engine.snapshot();
        assert!(snap.quick_actions.is_empty());
        assert_eq!(snap.suggestions.len(), 8);
        assert!(snap.last_error.is_none());

        // Still empty, so the next open asks again.
        mock.clear_failure(MockOp::QuickActions);
        engine.load_quick_actions().await;
        assert_eq!(mock.calls(MockOp::QuickActions), 2);
        assert_eq!(engine.snapshot().quick_actions.len(), 4);
    }

    // =========================================================================
    // Ratings
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_rating_expires_after_window() {
        let mock = Arc::new(MockGateway::new());
        let engine = engine_with(mock.clone());
        engine.send("hola").await;
        let reply_id = engine.snapshot().messages[1].id.clone();

        engine.rate(&reply_id, 4).unwrap();
        assert_eq!(engine.snapshot().rating.unwrap().rating.value(), 4);

        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert!(engine.snapshot().rating.is_some());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(engine.snapshot().rating.is_none());
        assert_eq!(mock.feedback().len(), 1);
        assert_eq!(mock.feedback()[0].rating, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rating_last_write_wins_and_restarts_timer() {
        let mock = Arc::new(MockGateway::new());
        let engine = engine_with(mock);
        engine.send("hola").await;
        let reply_id = engine.snapshot().messages[1].id.clone();

        engine.rate(&reply_id, 2).unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        engine.rate(&reply_id, 5).unwrap();

        // The first timer fires at 2000ms but must not clear the newer rating.
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(engine.snapshot().rating.unwrap().rating.value(), 5);

        // The second rating expires at 3500ms.
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(engine.snapshot().rating.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rating_failure_is_not_surfaced() {
        let mock = Arc::new(MockGateway::new());
        mock.fail(MockOp::SendFeedback, GatewayError::server("caído"));
        let engine = engine_with(mock.clone());
        engine.send("hola").await;
        let reply_id = engine.snapshot().messages[1].id.clone();

        engine.rate(&reply_id, 1).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let snap = engine.snapshot();
        assert!(snap.rating.is_some());
        assert!(snap.last_error.is_none());
        assert_eq!(mock.calls(MockOp::SendFeedback), 1);
    }

    #[tokio::test]
    async fn test_rating_validation() {
        let mock = Arc::new(MockGateway::new());
        mock.fail(MockOp::SendMessage, GatewayError::server("caído"));
        let engine = engine_with(mock);
        engine.send("hola").await;
        let snap = engine.snapshot();

        // Out of range.
        assert!(matches!(
            engine.rate(&snap.messages[1].id, 6),
            Err(ChatError::Validation(_))
        ));
        // The user's own message and the synthetic apology cannot be rated.
        assert!(engine.rate(&snap.messages[0].id, 3).is_err());
        assert!(engine.rate(&snap.messages[1].id, 3).is_err());
        assert!(engine.rate(&MessageId::new("ghost"), 3).is_err());
        assert!(engine.snapshot().rating.is_none());
    }

    // =========================================================================
    // Observation
    // =========================================================================

    #[tokio::test]
    async fn test_snapshot_subscription_sees_latest() {
        let mock = Arc::new(MockGateway::new());
        let engine = engine_with(mock);
        let mut rx = engine.subscribe();
        assert!(rx.borrow().messages.is_empty());

        engine.send("hola").await;
        rx.changed().await.unwrap();
        let snap = rx.borrow_and_update().clone();
        assert_eq!(snap.messages.len(), 2);
        assert!(!snap.pending);
    }

    #[tokio::test]
    async fn test_events_in_order() {
        let mock = Arc::new(MockGateway::new());
        let engine = engine_with(mock);
        let mut rx = engine.events().subscribe();

        engine.send("hola").await;
        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.event_name());
        }
        assert_eq!(
            names,
            vec![
                "message_appended",
                "send_started",
                "message_appended",
                "send_completed"
            ]
        );
    }
}
