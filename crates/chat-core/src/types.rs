use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{conversation::ConversationId, error::ChatError, identity::DisplayName};

/// Connection lifecycle state reported to the frontend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection has been attempted yet.
    Idle,
    /// First connection attempt is in flight.
    Connecting,
    /// Channel is open and the server assigned a connection id.
    Connected,
    /// Channel was lost (or the first attempt failed) and retries are running.
    Reconnecting,
    /// A logout acknowledgement was requested and the grace delay is running.
    LoggingOut,
    /// Channel is closed; no automatic retry will happen.
    Disconnected,
}

/// A participant as announced by the server.
///
/// Field names follow the server's wire contract (`socketId`, `username`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Identity {
    /// Server-assigned id of the participant's current channel.
    #[serde(rename = "socketId")]
    pub connection_id: String,
    /// Display name chosen by the participant.
    #[serde(rename = "username")]
    pub display_name: String,
    /// Optional avatar reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl Identity {
    pub fn new(connection_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            display_name: display_name.into(),
            avatar: None,
        }
    }
}

/// Kind discriminator shared by history entries and previews.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Emoji,
    File,
    Image,
}

/// Inline attachment carried by file and image messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Original file name.
    pub name: String,
    /// MIME content type, for example `image/png`.
    pub mime_type: String,
    /// Size of the decoded payload in bytes.
    pub size_bytes: u64,
    /// Base64 encoded file contents.
    pub base64_payload: String,
}

/// Kind-specific payload of a history entry.
///
/// Exactly one payload shape exists per entry, selected by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MessageBody {
    Text { content: String },
    Emoji { glyph: String },
    File(Attachment),
    Image(Attachment),
}

impl MessageBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Text { .. } => MessageKind::Text,
            Self::Emoji { .. } => MessageKind::Emoji,
            Self::File(_) => MessageKind::File,
            Self::Image(_) => MessageKind::Image,
        }
    }
}

/// One entry of a conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageEvent {
    /// Sender identity at the time the message was delivered.
    pub from: Identity,
    /// ISO-8601 timestamp assigned by the server.
    pub timestamp: String,
    /// Kind-specific payload.
    #[serde(flatten)]
    pub body: MessageBody,
}

impl MessageEvent {
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// Two entries are the same delivery when timestamp and sender match.
    pub fn is_same_delivery(&self, other: &MessageEvent) -> bool {
        self.timestamp == other.timestamp && self.from.connection_id == other.from.connection_id
    }
}

/// Preview of the newest entry of a conversation, used by conversation lists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastMessageSummary {
    /// Sender of the newest entry.
    pub from: Identity,
    /// Kind of the newest entry.
    pub kind: MessageKind,
    /// Display-ready preview text.
    pub content: String,
    /// Timestamp of the newest entry.
    pub timestamp: String,
    /// File name when the newest entry is a file.
    pub file_name: Option<String>,
    /// Image name when the newest entry is an image.
    pub image_name: Option<String>,
}

/// Raw attachment selected by the user, encoded just before emission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutgoingAttachment {
    /// File name shown to the peer.
    pub name: String,
    /// MIME content type.
    pub mime_type: String,
    /// Raw file bytes.
    pub data: Vec<u8>,
}

impl OutgoingAttachment {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// Command channel input accepted by the client runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChatCommand {
    /// Open the channel (no-op when already open).
    Connect,
    /// Close the channel without retrying (no-op when already closed).
    Disconnect,
    /// Persist and announce the local display name.
    ///
    /// When the channel is not open yet the announcement is queued and sent
    /// once, right after the first successful connection.
    AnnounceIdentity {
        /// Validated display name.
        name: DisplayName,
        /// Optional avatar reference.
        avatar: Option<String>,
    },
    /// Ask the server for a fresh roster.
    RequestRoster,
    /// Establish or resume a conversation with a peer.
    JoinConversation {
        /// Connection id of the peer.
        peer_connection_id: String,
    },
    /// Clear the active conversation. History is kept.
    LeaveConversation,
    /// Send a text message to the active conversation.
    SendText {
        /// Message body.
        body: String,
    },
    /// Send a single emoji to the active conversation.
    SendEmoji {
        /// Emoji glyph.
        glyph: String,
    },
    /// Send a file attachment to the active conversation.
    SendFile(OutgoingAttachment),
    /// Send an image attachment to the active conversation.
    SendImage(OutgoingAttachment),
    /// Emit a `Snapshot` event describing current state.
    RequestSnapshot,
    /// Log out: acknowledge with the server, close the channel, wipe local state.
    Logout,
}

/// Point-in-time view of client state for rendering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatSnapshot {
    /// Current connection lifecycle state.
    pub state: ConnectionState,
    /// Identity confirmed by the server, if any.
    pub identity: Option<Identity>,
    /// Online peers excluding the local identity, in arrival order.
    pub roster: Vec<Identity>,
    /// Conversation that receives incoming and outgoing messages.
    pub active_conversation: Option<ConversationId>,
    /// Newest entry per conversation.
    pub last_messages: BTreeMap<ConversationId, LastMessageSummary>,
}

/// Event channel output emitted by the client runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChatEvent {
    /// Connection lifecycle transition.
    StateChanged {
        /// New lifecycle state.
        state: ConnectionState,
    },
    /// The server confirmed the announced display name.
    IdentityConfirmed {
        /// Local identity including the server-assigned connection id.
        identity: Identity,
    },
    /// Full roster replacement.
    RosterUpdated {
        /// Online peers excluding the local identity.
        peers: Vec<Identity>,
    },
    /// A conversation became active.
    ConversationJoined {
        /// Canonical conversation id returned by the server.
        conversation_id: ConversationId,
        /// Participants reported by the server.
        participants: Vec<Identity>,
        /// Local history after merging the server-reported last message.
        history: Vec<MessageEvent>,
    },
    /// The active conversation was cleared.
    ConversationLeft {
        /// Conversation that stopped being active.
        conversation_id: ConversationId,
    },
    /// A message was appended to a conversation history.
    MessageAppended {
        /// Target conversation.
        conversation_id: ConversationId,
        /// Appended entry.
        event: MessageEvent,
    },
    /// Application error reported by the server.
    ServerError {
        /// Server-provided message.
        message: String,
    },
    /// Client-side failure surfaced for notification.
    Error(ChatError),
    /// Response to `ChatCommand::RequestSnapshot`.
    Snapshot(ChatSnapshot),
    /// Logout completed and local state was wiped.
    LoggedOut,
}
