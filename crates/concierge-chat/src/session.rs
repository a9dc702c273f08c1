//! Session state and its transitions.
//!
//! Everything here is synchronous and runs under the engine's lock. The
//! engine performs the gateway round trip between `begin_*` and the matching
//! completion call.

use serde::Serialize;
use tracing::{debug, warn};

use concierge_core::{
    AssistantReply, Conversation, ConversationId, ConversationSummary, FeedbackRating, Message,
    MessageId, QuickAction, Suggestion, Timestamp,
};

use crate::error::ChatError;

/// Read-only view of a session, published after every mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub messages: Vec<Message>,
    pub conversation_id: Option<ConversationId>,
    /// A send is waiting for the backend.
    pub pending: bool,
    pub quick_actions: Vec<QuickAction>,
    pub suggestions: Vec<Suggestion>,
    /// Conversation history from the last refresh, in server order.
    pub conversations: Vec<ConversationSummary>,
    /// Recoverable failure of the last load or delete.
    pub last_error: Option<String>,
    /// Rating confirmation currently on screen.
    pub rating: Option<FeedbackRating>,
    /// Quick actions and suggestions are shown until the first message.
    pub hints_visible: bool,
}

/// What a send needs to reconcile its answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendTicket {
    pub tentative_id: MessageId,
    pub conversation_id: Option<ConversationId>,
    generation: u64,
}

/// Result of applying a backend answer to a send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// The message was appended to the current conversation.
    Appended {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    /// The conversation was replaced while the send was out; nothing changed.
    Superseded,
}

#[derive(Debug, Default)]
pub struct SessionState {
    messages: Vec<Message>,
    conversation_id: Option<ConversationId>,
    pending: bool,
    quick_actions: Vec<QuickAction>,
    suggestions: Vec<Suggestion>,
    conversations: Vec<ConversationSummary>,
    last_error: Option<String>,
    rating: Option<FeedbackRating>,
    rating_seq: u64,
    /// Bumped whenever the message sequence is replaced wholesale.
    generation: u64,
    /// Bumped when a load starts; only the latest load may apply.
    load_seq: u64,
    /// Loads and deletes waiting for the backend. No send may start while
    /// one of them can still replace the sequence.
    switches: u32,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            messages: self.messages.clone(),
            conversation_id: self.conversation_id.clone(),
            pending: self.pending,
            quick_actions: self.quick_actions.clone(),
            suggestions: self.suggestions.clone(),
            conversations: self.conversations.clone(),
            last_error: self.last_error.clone(),
            rating: self.rating.clone(),
            hints_visible: self.messages.is_empty(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn conversation_id(&self) -> Option<&ConversationId> {
        self.conversation_id.as_ref()
    }

    pub fn message(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    fn ensure_idle(&self) -> Result<(), ChatError> {
        if self.pending {
            Err(ChatError::SendInFlight)
        } else {
            Ok(())
        }
    }

    fn replace(&mut self, messages: Vec<Message>, conversation_id: Option<ConversationId>) {
        self.messages = messages;
        self.conversation_id = conversation_id;
        self.generation += 1;
    }

    // =========================================================================
    // Sending
    // =========================================================================

    /// Append the tentative user message and mark the session pending.
    ///
    /// Refused while another send, a load or a delete is in flight.
    pub fn begin_send(&mut self, text: &str, now: Timestamp) -> Result<SendTicket, ChatError> {
        self.ensure_idle()?;
        if self.switches > 0 {
            return Err(ChatError::SwitchInFlight);
        }
        let message = Message::tentative_user(text, now);
        let ticket = SendTicket {
            tentative_id: message.id.clone(),
            conversation_id: self.conversation_id.clone(),
            generation: self.generation,
        };
        self.messages.push(message);
        self.pending = true;
        Ok(ticket)
    }

    /// Adopt the conversation id and append the assistant reply.
    pub fn complete_send(&mut self, ticket: &SendTicket, reply: AssistantReply) -> Reconciled {
        if ticket.generation != self.generation {
            debug!(
                conversation_id = %reply.conversation_id,
                "Reply arrived for a replaced conversation; discarded"
            );
            return Reconciled::Superseded;
        }
        let conversation_id = match &self.conversation_id {
            Some(current) if current != &reply.conversation_id => {
                warn!(
                    current = %current,
                    returned = %reply.conversation_id,
                    "Backend answered with a different conversation id; keeping the current one"
                );
                current.clone()
            }
            Some(current) => current.clone(),
            None => {
                self.conversation_id = Some(reply.conversation_id.clone());
                reply.conversation_id
            }
        };
        let message_id = reply.message.id.clone();
        self.messages.push(reply.message);
        Reconciled::Appended {
            conversation_id,
            message_id,
        }
    }

    /// Append the synthetic apology. Returns its id, or `None` when the
    /// conversation was replaced meanwhile.
    pub fn fail_send(
        &mut self,
        ticket: &SendTicket,
        apology: &str,
        now: Timestamp,
    ) -> Option<MessageId> {
        if ticket.generation != self.generation {
            return None;
        }
        let message = Message::synthetic_error(apology, now);
        let id = message.id.clone();
        self.messages.push(message);
        Some(id)
    }

    pub fn finish_send(&mut self) {
        self.pending = false;
    }

    // =========================================================================
    // Conversation switching
    // =========================================================================

    pub fn start_conversation(&mut self) -> Result<(), ChatError> {
        self.ensure_idle()?;
        self.replace(Vec::new(), None);
        self.load_seq += 1;
        self.last_error = None;
        Ok(())
    }

    /// Claim the right to replace the conversation when the fetch returns.
    /// Pair with [`end_switch`](Self::end_switch).
    pub fn begin_load(&mut self) -> Result<u64, ChatError> {
        self.ensure_idle()?;
        self.load_seq += 1;
        self.switches += 1;
        Ok(self.load_seq)
    }

    /// Replace the sequence atomically. False when a later load or a new
    /// conversation overtook this one.
    pub fn apply_load(&mut self, seq: u64, conversation: Conversation) -> bool {
        if seq != self.load_seq {
            return false;
        }
        self.replace(conversation.messages, Some(conversation.id));
        self.last_error = None;
        true
    }

    pub fn fail_load(&mut self, seq: u64, reason: String) -> bool {
        if seq != self.load_seq {
            return false;
        }
        self.last_error = Some(reason);
        true
    }

    /// Pair with [`end_switch`](Self::end_switch).
    pub fn begin_delete(&mut self) -> Result<(), ChatError> {
        self.ensure_idle()?;
        self.switches += 1;
        Ok(())
    }

    /// A load or delete got its answer, or was abandoned.
    pub fn end_switch(&mut self) {
        self.switches = self.switches.saturating_sub(1);
    }

    pub fn is_switching(&self) -> bool {
        self.switches > 0
    }

    /// Drop a deleted conversation from the history list. Returns true when it
    /// was the current one, which is then replaced by a fresh conversation.
    pub fn remove_conversation(&mut self, id: &ConversationId) -> bool {
        self.conversations.retain(|c| &c.id != id);
        if self.conversation_id.as_ref() == Some(id) {
            self.replace(Vec::new(), None);
            self.load_seq += 1;
            true
        } else {
            false
        }
    }

    pub fn set_last_error(&mut self, reason: Option<String>) {
        self.last_error = reason;
    }

    pub fn set_conversations(&mut self, conversations: Vec<ConversationSummary>) {
        self.conversations = conversations;
    }

    // =========================================================================
    // Hints
    // =========================================================================

    pub fn has_quick_actions(&self) -> bool {
        !self.quick_actions.is_empty()
    }

    pub fn has_suggestions(&self) -> bool {
        !self.suggestions.is_empty()
    }

    /// Fill the cache unless a concurrent load already did.
    pub fn fill_quick_actions(&mut self, actions: Vec<QuickAction>) -> bool {
        if self.quick_actions.is_empty() && !actions.is_empty() {
            self.quick_actions = actions;
            true
        } else {
            false
        }
    }

    pub fn fill_suggestions(&mut self, suggestions: Vec<Suggestion>) -> bool {
        if self.suggestions.is_empty() && !suggestions.is_empty() {
            self.suggestions = suggestions;
            true
        } else {
            false
        }
    }

    // =========================================================================
    // Ratings
    // =========================================================================

    /// Show a rating; returns the token its expiry timer must present.
    pub fn set_rating(&mut self, rating: FeedbackRating) -> u64 {
        self.rating = Some(rating);
        self.rating_seq += 1;
        self.rating_seq
    }

    /// Clear the rating if no newer one replaced it.
    pub fn expire_rating(&mut self, seq: u64) -> Option<FeedbackRating> {
        if seq == self.rating_seq {
            self.rating.take()
        } else {
            None
        }
    }
}
