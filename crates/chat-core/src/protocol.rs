//! Named channel events exchanged with the chat server.
//!
//! Each event travels as a name plus at most one JSON argument. Framing is the
//! transport's concern; this module only maps names and payloads.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};

use crate::{
    conversation::ConversationId,
    error::{ChatError, ChatErrorCategory},
    types::{Identity, MessageKind},
};

/// Client-to-server events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    SetUsername {
        username: String,
        avatar: Option<String>,
    },
    GetOnlineUsers,
    JoinChat {
        target_socket_id: String,
    },
    SendMessage {
        room_id: ConversationId,
        message: String,
        kind: MessageKind,
    },
    SendFile {
        room_id: ConversationId,
        file_name: String,
        file_data: String,
        file_type: String,
        file_size: u64,
    },
    SendImage {
        room_id: ConversationId,
        image_name: String,
        image_data: String,
        image_type: String,
        image_size: u64,
    },
    SendEmoji {
        room_id: ConversationId,
        emoji: String,
    },
    Logout,
}

impl OutboundEvent {
    /// Wire event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetUsername { .. } => "setUsername",
            Self::GetOnlineUsers => "getOnlineUsers",
            Self::JoinChat { .. } => "joinChat",
            Self::SendMessage { .. } => "sendMessage",
            Self::SendFile { .. } => "sendFile",
            Self::SendImage { .. } => "sendImage",
            Self::SendEmoji { .. } => "sendEmoji",
            Self::Logout => "logout",
        }
    }

    /// JSON argument, or `None` for argument-less events.
    pub fn payload(&self) -> Option<Value> {
        match self {
            Self::SetUsername { username, avatar } => {
                let mut payload = json!({ "username": username });
                if let Some(avatar) = avatar {
                    payload["avatar"] = json!(avatar);
                }
                Some(payload)
            }
            Self::GetOnlineUsers | Self::Logout => None,
            Self::JoinChat { target_socket_id } => {
                Some(json!({ "targetSocketId": target_socket_id }))
            }
            Self::SendMessage {
                room_id,
                message,
                kind,
            } => Some(json!({ "roomId": room_id, "message": message, "type": kind })),
            Self::SendFile {
                room_id,
                file_name,
                file_data,
                file_type,
                file_size,
            } => Some(json!({
                "roomId": room_id,
                "fileName": file_name,
                "fileData": file_data,
                "fileType": file_type,
                "fileSize": file_size,
            })),
            Self::SendImage {
                room_id,
                image_name,
                image_data,
                image_type,
                image_size,
            } => Some(json!({
                "roomId": room_id,
                "imageName": image_name,
                "imageData": image_data,
                "imageType": image_type,
                "imageSize": image_size,
            })),
            Self::SendEmoji { room_id, emoji } => {
                Some(json!({ "roomId": room_id, "emoji": emoji }))
            }
        }
    }
}

/// `receiveMessage` payload. `type` distinguishes text from emoji sends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireTextMessage {
    pub from: Identity,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub emoji: Option<String>,
    pub timestamp: String,
    #[serde(rename = "type", default)]
    pub kind: Option<MessageKind>,
}

/// `receiveFile` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WireFileMessage {
    pub from: Identity,
    pub file_name: String,
    pub file_data: String,
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub file_size: u64,
    pub timestamp: String,
}

/// `receiveImage` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WireImageMessage {
    pub from: Identity,
    pub image_name: String,
    pub image_data: String,
    #[serde(default)]
    pub image_type: String,
    #[serde(default)]
    pub image_size: u64,
    pub timestamp: String,
}

/// `receiveEmoji` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireEmojiMessage {
    pub from: Identity,
    pub emoji: String,
    pub timestamp: String,
}

/// Server-side summary of the newest message of a room, sent with `chatJoined`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WireLastMessage {
    pub from: Identity,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub timestamp: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub image_name: Option<String>,
    #[serde(default)]
    pub emoji: Option<String>,
}

/// `chatJoined` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatJoined {
    pub room_id: ConversationId,
    #[serde(default)]
    pub participants: Vec<Identity>,
    #[serde(default)]
    pub last_message: Option<WireLastMessage>,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    message: String,
}

/// Server-to-client events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    UsernameSet(Identity),
    OnlineUsers(Vec<Identity>),
    UserConnected,
    UserDisconnected,
    ChatJoined(ChatJoined),
    ReceiveMessage(WireTextMessage),
    ReceiveFile(WireFileMessage),
    ReceiveImage(WireImageMessage),
    ReceiveEmoji(WireEmojiMessage),
    Error { message: String },
    LogoutSuccess,
}

impl InboundEvent {
    /// Decode a named event and its first argument.
    pub fn decode(name: &str, payload: Option<Value>) -> Result<Self, ChatError> {
        let payload = payload.unwrap_or(Value::Null);
        let event = match name {
            "usernameSet" => Self::UsernameSet(parse_payload(name, payload)?),
            "onlineUsers" => Self::OnlineUsers(
                parse_payload::<Option<Vec<Identity>>>(name, payload)?.unwrap_or_default(),
            ),
            "userConnected" => Self::UserConnected,
            "userDisconnected" => Self::UserDisconnected,
            "chatJoined" => Self::ChatJoined(parse_payload(name, payload)?),
            "receiveMessage" => Self::ReceiveMessage(parse_payload(name, payload)?),
            "receiveFile" => Self::ReceiveFile(parse_payload(name, payload)?),
            "receiveImage" => Self::ReceiveImage(parse_payload(name, payload)?),
            "receiveEmoji" => Self::ReceiveEmoji(parse_payload(name, payload)?),
            "error" => {
                let message = match payload {
                    Value::String(message) => message,
                    other => parse_payload::<ErrorPayload>(name, other)?.message,
                };
                Self::Error { message }
            }
            "logoutSuccess" => Self::LogoutSuccess,
            other => {
                return Err(ChatError::new(
                    ChatErrorCategory::Protocol,
                    "unknown_event",
                    format!("unknown inbound event '{other}'"),
                ));
            }
        };
        Ok(event)
    }

    /// Wire event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::UsernameSet(_) => "usernameSet",
            Self::OnlineUsers(_) => "onlineUsers",
            Self::UserConnected => "userConnected",
            Self::UserDisconnected => "userDisconnected",
            Self::ChatJoined(_) => "chatJoined",
            Self::ReceiveMessage(_) => "receiveMessage",
            Self::ReceiveFile(_) => "receiveFile",
            Self::ReceiveImage(_) => "receiveImage",
            Self::ReceiveEmoji(_) => "receiveEmoji",
            Self::Error { .. } => "error",
            Self::LogoutSuccess => "logoutSuccess",
        }
    }
}

fn parse_payload<T: DeserializeOwned>(name: &str, payload: Value) -> Result<T, ChatError> {
    serde_json::from_value(payload).map_err(|err| {
        ChatError::new(
            ChatErrorCategory::Serialization,
            "invalid_event_payload",
            format!("invalid payload for '{name}': {err}"),
        )
    })
}
