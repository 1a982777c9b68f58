use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ConnectionState;

/// Broad error category used for user-facing handling and retry behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChatErrorCategory {
    /// Invalid configuration value or unsupported endpoint.
    Config,
    /// User input rejected before any side effect happened.
    Validation,
    /// Transient network or transport failure.
    Connection,
    /// Malformed or unexpected frame from the server.
    Protocol,
    /// Application error reported by the server through an `error` event.
    Server,
    /// Durable local storage failure.
    Storage,
    /// Serialization/deserialization failure.
    Serialization,
    /// Internal client bug or invariant break.
    Internal,
}

/// Stable client error payload emitted across the command/event boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct ChatError {
    /// High-level error category.
    pub category: ChatErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message. For validation errors this is user-facing.
    pub message: String,
}

impl ChatError {
    /// Construct a new client error.
    pub fn new(
        category: ChatErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Build a validation error carrying a user-facing message.
    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ChatErrorCategory::Validation, code, message)
    }

    /// Build a standard invalid-state-transition error.
    pub fn invalid_state(current: ConnectionState, action: impl Into<String>) -> Self {
        let action = action.into();
        Self::new(
            ChatErrorCategory::Internal,
            "invalid_state_transition",
            format!("cannot run '{action}' while connection is in state {current:?}"),
        )
    }

    /// Whether retrying the failed operation may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.category, ChatErrorCategory::Connection)
    }
}
