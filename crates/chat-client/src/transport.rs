use std::future::Future;

use chat_core::{ChatError, ChatErrorCategory};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("receive failed: {0}")]
    Receive(String),
    #[error("channel is closed")]
    Closed,
}

impl From<TransportError> for ChatError {
    fn from(err: TransportError) -> Self {
        let code = match &err {
            TransportError::Connect(_) => "transport_connect_failed",
            TransportError::Send(_) => "transport_send_failed",
            TransportError::Receive(_) => "transport_receive_failed",
            TransportError::Closed => "transport_closed",
        };
        ChatError::new(ChatErrorCategory::Connection, code, err.to_string())
    }
}

/// One open text-frame channel.
pub trait Transport: Send + 'static {
    fn send(&mut self, frame: String) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Next text frame. `Ok(None)` means the peer closed the channel.
    ///
    /// Must be cancel-safe: dropping the future loses no frame.
    fn recv(&mut self) -> impl Future<Output = Result<Option<String>, TransportError>> + Send;

    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Opens transports to an endpoint.
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    fn connect(
        &self,
        endpoint: &Url,
    ) -> impl Future<Output = Result<Self::Transport, TransportError>> + Send;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&self, endpoint: &Url) -> Result<WebSocketTransport, TransportError> {
        let (stream, response) = connect_async(endpoint.as_str())
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;
        debug!(endpoint = %endpoint, status = %response.status(), "websocket opened");
        Ok(WebSocketTransport { stream })
    }
}

pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Transport for WebSocketTransport {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(frame.into()))
            .await
            .map_err(|err| TransportError::Send(err.to_string()))
    }

    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            let Some(message) = self.stream.next().await else {
                return Ok(None);
            };
            match message.map_err(|err| TransportError::Receive(err.to_string()))? {
                Message::Text(text) => return Ok(Some(text.as_str().to_owned())),
                Message::Close(frame) => {
                    debug!(?frame, "websocket closed by peer");
                    return Ok(None);
                }
                Message::Binary(bytes) => {
                    warn!(len = bytes.len(), "ignoring binary websocket frame");
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.stream
            .close(None)
            .await
            .map_err(|err| TransportError::Send(err.to_string()))
    }
}
