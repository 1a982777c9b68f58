//! Core chat client contract shared between the runtime and frontend consumers.
//!
//! This crate defines the command/event protocol, the wire event vocabulary,
//! the connection lifecycle model, and the pure conversation state (presence,
//! routing, history) that the runtime persists and mutates.

/// Async command/event channel primitives.
pub mod channel;
/// Conversation id derivation and active-conversation routing.
pub mod conversation;
/// Stable client error types.
pub mod error;
/// Display helpers for sizes, initials, and relative timestamps.
pub mod format;
/// In-memory per-conversation message history.
pub mod history;
/// Display name validation.
pub mod identity;
/// Conversion of wire payloads into history entries and previews.
pub mod normalization;
/// Online roster tracking.
pub mod presence;
/// Named channel events exchanged with the chat server.
pub mod protocol;
/// Backoff policy used by reconnect loops.
pub mod retry;
/// Connection lifecycle state machine.
pub mod state_machine;
/// Frontend-facing protocol types (commands, events, payloads).
pub mod types;

pub use channel::{ChatChannelError, ChatChannels, EventStream};
pub use conversation::{ConversationId, ConversationRouter, JoinOutcome, derive_conversation_id};
pub use error::{ChatError, ChatErrorCategory};
pub use history::{ConversationHistory, MergeOutcome};
pub use identity::DisplayName;
pub use presence::PresenceTracker;
pub use protocol::{InboundEvent, OutboundEvent};
pub use retry::RetryPolicy;
pub use state_machine::{ConnectionStateMachine, ConnectionTransition};
pub use types::{
    Attachment, ChatCommand, ChatEvent, ChatSnapshot, ConnectionState, Identity,
    LastMessageSummary, MessageBody, MessageEvent, MessageKind, OutgoingAttachment,
};
