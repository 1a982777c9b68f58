use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

const CONVERSATION_NAMESPACE: &str = "room";
const CONVERSATION_SEPARATOR: &str = "_";

/// Canonical identifier of a two-party conversation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Wrap an id received from the server as-is.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
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

/// Derive the order-independent id shared by two connection ids.
///
/// `derive_conversation_id(a, b) == derive_conversation_id(b, a)` for all inputs.
pub fn derive_conversation_id(local: &str, peer: &str) -> ConversationId {
    let (low, high) = if local <= peer {
        (local, peer)
    } else {
        (peer, local)
    };
    ConversationId(format!(
        "{CONVERSATION_NAMESPACE}{CONVERSATION_SEPARATOR}{low}{CONVERSATION_SEPARATOR}{high}"
    ))
}

/// Result of completing a join with the server-reported id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Id that is now active.
    pub conversation_id: ConversationId,
    /// Locally derived id of the pending request, when one was pending.
    pub expected: Option<ConversationId>,
}

impl JoinOutcome {
    /// Whether the server agreed with the locally derived id.
    pub fn matches_request(&self) -> bool {
        self.expected.as_ref() == Some(&self.conversation_id)
    }
}

/// Tracks which conversation is active and which join is pending.
#[derive(Debug, Clone, Default)]
pub struct ConversationRouter {
    active: Option<ConversationId>,
    pending: Option<ConversationId>,
}

impl ConversationRouter {
    pub fn active(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }

    pub fn pending(&self) -> Option<&ConversationId> {
        self.pending.as_ref()
    }

    /// Record a join request and return the id the server is expected to use.
    ///
    /// Joining requires a confirmed local identity and a peer other than self.
    pub fn begin_join(
        &mut self,
        local_connection_id: Option<&str>,
        peer_connection_id: &str,
    ) -> Result<ConversationId, ChatError> {
        let Some(local) = local_connection_id else {
            return Err(ChatError::validation(
                "identity_required",
                "set a display name before joining a conversation",
            ));
        };
        if peer_connection_id.trim().is_empty() {
            return Err(ChatError::validation(
                "peer_required",
                "choose a peer to chat with",
            ));
        }
        if peer_connection_id == local {
            return Err(ChatError::validation(
                "cannot_join_self",
                "a conversation needs another participant",
            ));
        }

        let expected = derive_conversation_id(local, peer_connection_id);
        self.pending = Some(expected.clone());
        Ok(expected)
    }

    /// Make the server-reported id active and settle any pending request.
    pub fn complete_join(&mut self, conversation_id: ConversationId) -> JoinOutcome {
        let expected = self.pending.take();
        self.active = Some(conversation_id.clone());
        JoinOutcome {
            conversation_id,
            expected,
        }
    }

    /// Clear the active conversation and return it.
    pub fn leave(&mut self) -> Option<ConversationId> {
        self.pending = None;
        self.active.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_symmetric() {
        let pairs = [
            ("alice-sid", "bob-sid"),
            ("Zed", "abc"),
            ("x", "x"),
            ("", "peer"),
            ("sid_with_underscore", "other"),
        ];
        for (a, b) in pairs {
            assert_eq!(derive_conversation_id(a, b), derive_conversation_id(b, a));
        }
    }

    #[test]
    fn derivation_sorts_and_prefixes() {
        assert_eq!(
            derive_conversation_id("zeta", "alpha").as_str(),
            "room_alpha_zeta"
        );
    }

    #[test]
    fn join_requires_identity_and_distinct_peer() {
        let mut router = ConversationRouter::default();

        let err = router
            .begin_join(None, "bob-sid")
            .expect_err("join without identity must fail");
        assert_eq!(err.code, "identity_required");

        let err = router
            .begin_join(Some("alice-sid"), "alice-sid")
            .expect_err("self join must fail");
        assert_eq!(err.code, "cannot_join_self");
        assert_eq!(router.pending(), None);
    }

    #[test]
    fn completes_join_and_reports_mismatch() {
        let mut router = ConversationRouter::default();
        let expected = router
            .begin_join(Some("alice-sid"), "bob-sid")
            .expect("join should start");
        assert_eq!(router.pending(), Some(&expected));

        let outcome = router.complete_join(expected.clone());
        assert!(outcome.matches_request());
        assert_eq!(router.active(), Some(&expected));
        assert_eq!(router.pending(), None);

        router
            .begin_join(Some("alice-sid"), "carol-sid")
            .expect("second join should start");
        let outcome = router.complete_join(ConversationId::new("room_X"));
        assert!(!outcome.matches_request());
        assert_eq!(router.active().map(ConversationId::as_str), Some("room_X"));
    }

    #[test]
    fn leave_clears_active_conversation() {
        let mut router = ConversationRouter::default();
        router.complete_join(ConversationId::new("room_a_b"));

        assert_eq!(router.leave(), Some(ConversationId::new("room_a_b")));
        assert_eq!(router.active(), None);
        assert_eq!(router.leave(), None);
    }
}
