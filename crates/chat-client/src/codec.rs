//! Engine.IO v4 / Socket.IO v5 text framing for the websocket transport.
//!
//! One websocket text frame carries exactly one Engine.IO packet. Socket.IO
//! packets ride inside Engine.IO `message` packets:
//! `<type>[<namespace>,][<ack id>][<json>]`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_NAMESPACE: &str = "/";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("empty frame")]
    Empty,
    #[error("unknown engine packet type '{0}'")]
    UnknownEnginePacket(char),
    #[error("unknown socket packet type '{0}'")]
    UnknownSocketPacket(char),
    #[error("binary socket packets are not supported")]
    BinaryUnsupported,
    #[error("invalid ack id: {0}")]
    InvalidAckId(String),
    #[error("invalid json payload: {0}")]
    InvalidJson(String),
    #[error("malformed event: {0}")]
    MalformedEvent(String),
}

/// Payload of the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// Client request (no sid) or server acceptance (with the connection id).
    Connect {
        namespace: String,
        sid: Option<String>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        ack_id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        ack_id: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        message: String,
    },
}

impl SocketPacket {
    /// Connect request for the default namespace.
    pub fn connect() -> Self {
        Self::Connect {
            namespace: DEFAULT_NAMESPACE.to_owned(),
            sid: None,
        }
    }

    /// Event on the default namespace with zero or one argument.
    pub fn event(name: impl Into<String>, payload: Option<Value>) -> Self {
        Self::Event {
            namespace: DEFAULT_NAMESPACE.to_owned(),
            ack_id: None,
            name: name.into(),
            args: payload.into_iter().collect(),
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            Self::Connect { namespace, .. }
            | Self::Disconnect { namespace }
            | Self::Event { namespace, .. }
            | Self::Ack { namespace, .. }
            | Self::ConnectError { namespace, .. } => namespace,
        }
    }

    pub fn is_default_namespace(&self) -> bool {
        self.namespace() == DEFAULT_NAMESPACE
    }

    fn encode(&self) -> String {
        let (kind, namespace, ack_id, data) = match self {
            Self::Connect { namespace, sid } => (
                '0',
                namespace,
                None,
                sid.as_ref().map(|sid| serde_json::json!({ "sid": sid })),
            ),
            Self::Disconnect { namespace } => ('1', namespace, None, None),
            Self::Event {
                namespace,
                ack_id,
                name,
                args,
            } => {
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                ('2', namespace, *ack_id, Some(Value::Array(items)))
            }
            Self::Ack {
                namespace,
                ack_id,
                args,
            } => ('3', namespace, Some(*ack_id), Some(Value::Array(args.clone()))),
            Self::ConnectError { namespace, message } => (
                '4',
                namespace,
                None,
                Some(serde_json::json!({ "message": message })),
            ),
        };

        let mut out = String::new();
        out.push(kind);
        if namespace != DEFAULT_NAMESPACE {
            out.push_str(namespace);
            out.push(',');
        }
        if let Some(ack_id) = ack_id {
            out.push_str(&ack_id.to_string());
        }
        if let Some(data) = data {
            out.push_str(&data.to_string());
        }
        out
    }

    fn decode(raw: &str) -> Result<Self, CodecError> {
        let mut chars = raw.chars();
        let kind = chars.next().ok_or(CodecError::Empty)?;
        let rest = chars.as_str();

        if matches!(kind, '5' | '6') {
            return Err(CodecError::BinaryUnsupported);
        }

        let (namespace, rest) = if rest.starts_with('/') {
            match rest.split_once(',') {
                Some((namespace, tail)) => (namespace.to_owned(), tail),
                None => (rest.to_owned(), ""),
            }
        } else {
            (DEFAULT_NAMESPACE.to_owned(), rest)
        };

        let digits = rest
            .find(|ch: char| !ch.is_ascii_digit())
            .unwrap_or(rest.len());
        let ack_id = if digits > 0 {
            Some(
                rest[..digits]
                    .parse::<u64>()
                    .map_err(|err| CodecError::InvalidAckId(err.to_string()))?,
            )
        } else {
            None
        };

        let data = &rest[digits..];
        let data = if data.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str::<Value>(data)
                    .map_err(|err| CodecError::InvalidJson(err.to_string()))?,
            )
        };

        match kind {
            '0' => Ok(Self::Connect {
                namespace,
                sid: data
                    .as_ref()
                    .and_then(|value| value.get("sid"))
                    .and_then(Value::as_str)
                    .map(str::to_owned),
            }),
            '1' => Ok(Self::Disconnect { namespace }),
            '2' => {
                let Some(Value::Array(mut items)) = data else {
                    return Err(CodecError::MalformedEvent(
                        "event data must be an array".to_owned(),
                    ));
                };
                if items.is_empty() {
                    return Err(CodecError::MalformedEvent("missing event name".to_owned()));
                }
                let Value::String(name) = items.remove(0) else {
                    return Err(CodecError::MalformedEvent(
                        "event name must be a string".to_owned(),
                    ));
                };
                Ok(Self::Event {
                    namespace,
                    ack_id,
                    name,
                    args: items,
                })
            }
            '3' => {
                let ack_id = ack_id
                    .ok_or_else(|| CodecError::InvalidAckId("ack without id".to_owned()))?;
                let args = match data {
                    Some(Value::Array(items)) => items,
                    Some(other) => vec![other],
                    None => Vec::new(),
                };
                Ok(Self::Ack {
                    namespace,
                    ack_id,
                    args,
                })
            }
            '4' => {
                let message = match data {
                    Some(Value::String(message)) => message,
                    Some(value) => value
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_owned(),
                    None => String::new(),
                };
                Ok(Self::ConnectError { namespace, message })
            }
            other => Err(CodecError::UnknownSocketPacket(other)),
        }
    }
}

impl EnginePacket {
    /// Client-side event frame on the default namespace.
    pub fn event(name: impl Into<String>, payload: Option<Value>) -> Self {
        Self::Message(SocketPacket::event(name, payload))
    }

    pub fn encode(&self) -> Result<String, CodecError> {
        Ok(match self {
            Self::Open(handshake) => {
                let json = serde_json::to_string(handshake)
                    .map_err(|err| CodecError::InvalidJson(err.to_string()))?;
                format!("0{json}")
            }
            Self::Close => "1".to_owned(),
            Self::Ping(data) => format!("2{data}"),
            Self::Pong(data) => format!("3{data}"),
            Self::Message(packet) => format!("4{}", packet.encode()),
            Self::Upgrade => "5".to_owned(),
            Self::Noop => "6".to_owned(),
        })
    }

    pub fn decode(frame: &str) -> Result<Self, CodecError> {
        let mut chars = frame.chars();
        let kind = chars.next().ok_or(CodecError::Empty)?;
        let rest = chars.as_str();

        match kind {
            '0' => serde_json::from_str(rest)
                .map(Self::Open)
                .map_err(|err| CodecError::InvalidJson(err.to_string())),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping(rest.to_owned())),
            '3' => Ok(Self::Pong(rest.to_owned())),
            '4' => SocketPacket::decode(rest).map(Self::Message),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(CodecError::UnknownEnginePacket(other)),
        }
    }
}
