//! Async chat client runtime over a Socket.IO channel.
//!
//! The runtime owns the connection lifecycle, presence, conversation routing
//! and persisted history. Frontends talk to it through [`ChatClientHandle`]
//! commands and a broadcast event stream.

/// Reading and encoding outgoing attachments.
pub mod attachment;
/// Engine.IO and Socket.IO frame codec.
pub mod codec;
/// Client configuration.
pub mod config;
/// Connection lifecycle, heartbeat, and reconnect handling.
pub mod connection;
/// Persisted display name.
pub mod identity_store;
/// Persisted per-conversation history.
pub mod message_store;
/// Runtime task composition and frontend handle.
pub mod runtime;
/// Text-frame transports.
pub mod transport;

pub use attachment::read_attachment;
pub use config::{ChatClientConfig, DEFAULT_SERVER_URL};
pub use identity_store::LocalIdentityStore;
pub use message_store::MessageStore;
pub use runtime::{ChatClientHandle, scoped_storage, spawn_client};
pub use transport::{Connector, Transport, TransportError, WebSocketConnector};
