use std::collections::BTreeMap;

use chat_core::{
    ConversationHistory, ConversationId, LastMessageSummary, MergeOutcome, MessageEvent,
};
use chat_platform::KeyValueStore;
use tracing::{debug, warn};

/// Storage key holding the whole history map as one JSON document.
pub const HISTORY_STORAGE_KEY: &str = "chat-history";

/// Per-conversation history mirrored to durable storage after every mutation.
///
/// Persistence is best-effort: storage failures are logged and the in-memory
/// history stays authoritative for the rest of the process.
pub struct MessageStore<S: KeyValueStore> {
    storage: S,
    history: ConversationHistory,
}

impl<S: KeyValueStore> MessageStore<S> {
    /// Load persisted history once. Unreadable or corrupt data starts empty.
    pub fn load(storage: S) -> Self {
        let history = match storage.get(HISTORY_STORAGE_KEY) {
            Ok(Some(raw)) => match ConversationHistory::from_json(&raw) {
                Ok(history) => {
                    debug!(
                        conversations = history.conversation_count(),
                        "loaded chat history"
                    );
                    history
                }
                Err(err) => {
                    warn!(error = %err, "discarding unreadable chat history");
                    ConversationHistory::default()
                }
            },
            Ok(None) => ConversationHistory::default(),
            Err(err) => {
                warn!(error = %err, "failed to load chat history; starting empty");
                ConversationHistory::default()
            }
        };

        Self { storage, history }
    }

    pub fn append(&mut self, conversation_id: &ConversationId, event: MessageEvent) {
        self.history.append(conversation_id, event);
        self.persist();
    }

    /// Create an empty history for a newly joined conversation.
    pub fn ensure(&mut self, conversation_id: &ConversationId) {
        if self.history.ensure(conversation_id) {
            self.persist();
        }
    }

    pub fn history_of(&self, conversation_id: &ConversationId) -> &[MessageEvent] {
        self.history.history_of(conversation_id)
    }

    pub fn merge_server_last_message(
        &mut self,
        conversation_id: &ConversationId,
        event: MessageEvent,
    ) -> MergeOutcome {
        let outcome = self
            .history
            .merge_server_last_message(conversation_id, event);
        if outcome == MergeOutcome::Inserted {
            self.persist();
        }
        outcome
    }

    pub fn last_message(&self, conversation_id: &ConversationId) -> Option<LastMessageSummary> {
        self.history.last_message(conversation_id)
    }

    pub fn last_messages(&self) -> BTreeMap<ConversationId, LastMessageSummary> {
        self.history.last_messages()
    }

    /// Wipe in-memory and durable history.
    pub fn clear_all(&mut self) {
        self.history.clear();
        if let Err(err) = self.storage.remove(HISTORY_STORAGE_KEY) {
            warn!(error = %err, "failed to remove persisted chat history");
        }
    }

    fn persist(&self) {
        let encoded = match self.history.to_json() {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(error = %err, "failed to encode chat history");
                return;
            }
        };
        if let Err(err) = self.storage.set(HISTORY_STORAGE_KEY, &encoded) {
            warn!(error = %err, "failed to persist chat history");
        }
    }
}
