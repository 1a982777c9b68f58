use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    conversation::ConversationId,
    error::{ChatError, ChatErrorCategory},
    normalization::summarize,
    types::{LastMessageSummary, MessageEvent},
};

/// How a server-reported last message was reconciled with local history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Local history was empty; the message became its only entry.
    Inserted,
    /// The same delivery (timestamp and sender) is already stored.
    AlreadyPresent,
    /// Local history is non-empty and treated as authoritative.
    LocalAuthoritative,
}

/// Per-conversation ordered message history.
///
/// Serializes as a single JSON object keyed by conversation id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHistory {
    conversations: BTreeMap<ConversationId, Vec<MessageEvent>>,
}

impl ConversationHistory {
    /// Create an empty history for a conversation if none exists.
    ///
    /// Returns `true` when a new entry was created.
    pub fn ensure(&mut self, conversation_id: &ConversationId) -> bool {
        if self.conversations.contains_key(conversation_id) {
            return false;
        }
        self.conversations
            .insert(conversation_id.clone(), Vec::new());
        true
    }

    /// Append at the tail of a conversation.
    pub fn append(&mut self, conversation_id: &ConversationId, event: MessageEvent) {
        self.conversations
            .entry(conversation_id.clone())
            .or_default()
            .push(event);
    }

    /// Full ordered history, empty when the conversation is unknown.
    pub fn history_of(&self, conversation_id: &ConversationId) -> &[MessageEvent] {
        self.conversations
            .get(conversation_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Reconcile a server-reported last message with local history.
    pub fn merge_server_last_message(
        &mut self,
        conversation_id: &ConversationId,
        event: MessageEvent,
    ) -> MergeOutcome {
        let history = self
            .conversations
            .entry(conversation_id.clone())
            .or_default();

        if history.iter().any(|existing| existing.is_same_delivery(&event)) {
            return MergeOutcome::AlreadyPresent;
        }
        if !history.is_empty() {
            return MergeOutcome::LocalAuthoritative;
        }

        history.push(event);
        MergeOutcome::Inserted
    }

    /// Preview of the newest entry, derived from the tail of history.
    pub fn last_message(&self, conversation_id: &ConversationId) -> Option<LastMessageSummary> {
        self.history_of(conversation_id).last().map(summarize)
    }

    /// Previews for every conversation that has at least one entry.
    pub fn last_messages(&self) -> BTreeMap<ConversationId, LastMessageSummary> {
        self.conversations
            .iter()
            .filter_map(|(id, history)| history.last().map(|event| (id.clone(), summarize(event))))
            .collect()
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn clear(&mut self) {
        self.conversations.clear();
    }

    /// Encode the whole map as one JSON document.
    pub fn to_json(&self) -> Result<String, ChatError> {
        serde_json::to_string(self).map_err(|err| {
            ChatError::new(
                ChatErrorCategory::Serialization,
                "history_serialize_error",
                err.to_string(),
            )
        })
    }

    /// Decode a document produced by [`ConversationHistory::to_json`].
    pub fn from_json(raw: &str) -> Result<Self, ChatError> {
        serde_json::from_str(raw).map_err(|err| {
            ChatError::new(
                ChatErrorCategory::Serialization,
                "history_deserialize_error",
                err.to_string(),
            )
        })
    }
}
