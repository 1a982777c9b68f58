use std::{fmt, future, pin::Pin, sync::Arc, time::Duration};

use chat_core::{
    ChatChannels, ChatError, ChatErrorCategory, ConnectionState, ConnectionStateMachine,
    ConnectionTransition, InboundEvent, OutboundEvent, RetryPolicy,
};
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    codec::{CodecError, DEFAULT_NAMESPACE, EnginePacket, OpenHandshake, SocketPacket},
    transport::{Connector, Transport, TransportError},
};

/// What woke the connection up. Produced by [`ConnectionManager::next_activity`].
#[derive(Debug)]
pub enum ConnectionActivity<T> {
    Frame(String),
    Lost(Option<TransportError>),
    HeartbeatExpired,
    RetryDue,
    Handshake(Result<Established<T>, ChatError>),
}

/// A channel whose handshake completed but which is not installed yet.
pub struct Established<T> {
    transport: T,
    handshake: OpenHandshake,
    connection_id: String,
}

impl<T> fmt::Debug for Established<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Established")
            .field("connection_id", &self.connection_id)
            .field("handshake", &self.handshake)
            .finish_non_exhaustive()
    }
}

type Opening<T> = Pin<Box<dyn Future<Output = Result<Established<T>, ChatError>> + Send>>;

/// Result of handling one [`ConnectionActivity`].
#[derive(Debug)]
pub enum ConnectionUpdate {
    Inbound(InboundEvent),
    Opened(Opened),
    /// The channel closed and no retry is scheduled.
    Closed,
    Idle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opened {
    /// Server-assigned id of the new channel.
    pub connection_id: String,
    /// The channel replaced one that dropped unexpectedly.
    pub resumed: bool,
    /// A queued identity announcement went out right after opening.
    pub identity_flushed: bool,
}

#[derive(Debug, Clone, Copy)]
struct Heartbeat {
    window: Duration,
    last_seen: Instant,
}

impl Heartbeat {
    fn deadline(&self) -> Instant {
        self.last_seen + self.window
    }
}

/// Owns the single live channel to the server.
///
/// All methods run on the runtime task; nothing here is shared. A handshake in
/// flight is a pending future polled by [`ConnectionManager::next_activity`],
/// so the owning task keeps serving commands while it runs.
pub struct ConnectionManager<C: Connector> {
    connector: Arc<C>,
    endpoint: Url,
    retry: RetryPolicy,
    connect_timeout: Duration,
    channels: ChatChannels,
    state_machine: ConnectionStateMachine,
    transport: Option<C::Transport>,
    opening: Option<Opening<C::Transport>>,
    connection_id: Option<String>,
    heartbeat: Option<Heartbeat>,
    queued_identity: Option<OutboundEvent>,
    failed_attempts: u32,
    retry_at: Option<Instant>,
    resuming: bool,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(
        connector: C,
        endpoint: Url,
        retry: RetryPolicy,
        connect_timeout: Duration,
        channels: ChatChannels,
    ) -> Self {
        Self {
            connector: Arc::new(connector),
            endpoint,
            retry,
            connect_timeout,
            channels,
            state_machine: ConnectionStateMachine::default(),
            transport: None,
            opening: None,
            connection_id: None,
            heartbeat: None,
            queued_identity: None,
            failed_attempts: 0,
            retry_at: None,
            resuming: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state_machine.state()
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    pub fn has_queued_identity(&self) -> bool {
        self.queued_identity.is_some()
    }

    pub fn is_opening(&self) -> bool {
        self.opening.is_some()
    }

    /// Start opening the channel. No-op while open, opening, or while retries
    /// are scheduled. The result arrives through [`Self::next_activity`].
    pub fn connect(&mut self) {
        match self.state() {
            ConnectionState::Idle | ConnectionState::Disconnected => {}
            state => {
                debug!(?state, "connect ignored");
                return;
            }
        }

        self.transition(ConnectionTransition::Connect);
        self.failed_attempts = 0;
        self.resuming = false;
        self.start_attempt();
    }

    /// Close the channel without scheduling a retry. Idempotent.
    pub async fn disconnect(&mut self) {
        self.opening = None;
        self.retry_at = None;
        self.failed_attempts = 0;
        self.resuming = false;
        if self.transport.is_some() {
            let goodbye = EnginePacket::Message(SocketPacket::Disconnect {
                namespace: DEFAULT_NAMESPACE.to_owned(),
            });
            if let Err(err) = self.write(goodbye).await {
                debug!(error = %err, "disconnect notice not delivered");
            }
            self.close_transport().await;
        }
        self.transition(ConnectionTransition::Closed);
    }

    /// Send the identity now, or queue it until the next successful open.
    ///
    /// A newer announcement replaces a queued one.
    pub async fn announce_identity(&mut self, event: OutboundEvent) {
        if self.is_open() {
            self.send(event).await;
        } else {
            debug!("channel not open; queueing identity announcement");
            self.queued_identity = Some(event);
        }
    }

    /// Write one event to the open channel.
    pub async fn emit(&mut self, event: OutboundEvent) -> Result<(), ChatError> {
        if !self.is_open() {
            return Err(ChatError::new(
                ChatErrorCategory::Connection,
                "not_connected",
                format!(
                    "cannot emit '{}' while connection is {:?}",
                    event.name(),
                    self.state()
                ),
            ));
        }
        self.write(EnginePacket::event(event.name(), event.payload()))
            .await
    }

    /// [`ConnectionManager::emit`] that logs instead of failing.
    pub async fn send(&mut self, event: OutboundEvent) {
        let name = event.name();
        if let Err(err) = self.emit(event).await {
            warn!(event = name, error = %err, "dropping outbound event");
        }
    }

    /// Ask the server to acknowledge a logout.
    ///
    /// Returns `false` when no channel is open and nothing was sent.
    pub async fn begin_logout(&mut self) -> bool {
        self.queued_identity = None;
        self.opening = None;
        self.retry_at = None;
        if !self.is_open() {
            return false;
        }

        self.transition(ConnectionTransition::Logout);
        self.send(OutboundEvent::Logout).await;
        true
    }

    /// Close whatever is left after a logout.
    pub async fn finish_logout(&mut self) {
        self.queued_identity = None;
        self.disconnect().await;
    }

    /// Wait for the next frame, heartbeat expiry, handshake result, or
    /// scheduled retry.
    ///
    /// Cancel-safe; pends forever when there is nothing to wait for.
    pub async fn next_activity(&mut self) -> ConnectionActivity<C::Transport> {
        let heartbeat_deadline = self.heartbeat.as_ref().map(Heartbeat::deadline);

        if let Some(transport) = self.transport.as_mut() {
            let received = match heartbeat_deadline {
                Some(deadline) => tokio::select! {
                    received = transport.recv() => received,
                    () = sleep_until(deadline) => return ConnectionActivity::HeartbeatExpired,
                },
                None => transport.recv().await,
            };
            return match received {
                Ok(Some(frame)) => ConnectionActivity::Frame(frame),
                Ok(None) => ConnectionActivity::Lost(None),
                Err(err) => ConnectionActivity::Lost(Some(err)),
            };
        }

        if let Some(opening) = self.opening.as_mut() {
            let result = opening.await;
            self.opening = None;
            return ConnectionActivity::Handshake(result);
        }

        match self.retry_at {
            Some(at) => {
                sleep_until(at).await;
                ConnectionActivity::RetryDue
            }
            None => future::pending().await,
        }
    }

    /// Apply one activity. Reports [`ConnectionUpdate::Closed`] when the
    /// channel ends up closed with no retry pending.
    pub async fn handle_activity(
        &mut self,
        activity: ConnectionActivity<C::Transport>,
    ) -> Result<ConnectionUpdate, ChatError> {
        let before = self.state();
        let update = match activity {
            ConnectionActivity::Frame(frame) => self
                .handle_frame(&frame)
                .await?
                .map_or(ConnectionUpdate::Idle, ConnectionUpdate::Inbound),
            ConnectionActivity::Lost(err) => {
                let reason = err.map_or_else(|| "closed by server".to_owned(), |e| e.to_string());
                self.on_transport_lost(&reason);
                ConnectionUpdate::Idle
            }
            ConnectionActivity::HeartbeatExpired => {
                self.on_transport_lost("heartbeat timeout");
                ConnectionUpdate::Idle
            }
            ConnectionActivity::RetryDue => {
                self.start_attempt();
                ConnectionUpdate::Idle
            }
            ConnectionActivity::Handshake(Ok(established)) => {
                ConnectionUpdate::Opened(self.on_opened(established).await)
            }
            ConnectionActivity::Handshake(Err(err)) => {
                self.on_attempt_failed(err);
                ConnectionUpdate::Idle
            }
        };

        if before != ConnectionState::Disconnected
            && self.state() == ConnectionState::Disconnected
        {
            return Ok(ConnectionUpdate::Closed);
        }
        Ok(update)
    }

    async fn handle_frame(&mut self, frame: &str) -> Result<Option<InboundEvent>, ChatError> {
        if let Some(heartbeat) = self.heartbeat.as_mut() {
            heartbeat.last_seen = Instant::now();
        }

        match EnginePacket::decode(frame).map_err(codec_error)? {
            EnginePacket::Ping(data) => {
                self.write(EnginePacket::Pong(data)).await?;
                Ok(None)
            }
            EnginePacket::Close => {
                self.on_transport_lost("engine session closed by server");
                Ok(None)
            }
            EnginePacket::Message(packet) if !packet.is_default_namespace() => {
                debug!(namespace = packet.namespace(), "ignoring packet for other namespace");
                Ok(None)
            }
            EnginePacket::Message(SocketPacket::Event { name, args, .. }) => {
                InboundEvent::decode(&name, args.into_iter().next()).map(Some)
            }
            EnginePacket::Message(SocketPacket::Disconnect { .. }) => {
                info!("server closed the socket; not reconnecting");
                self.resuming = false;
                self.retry_at = None;
                self.close_transport().await;
                self.transition(ConnectionTransition::Closed);
                Ok(None)
            }
            EnginePacket::Message(SocketPacket::ConnectError { message, .. }) => {
                Err(ChatError::new(
                    ChatErrorCategory::Connection,
                    "connect_error",
                    message,
                ))
            }
            EnginePacket::Message(SocketPacket::Connect { .. } | SocketPacket::Ack { .. })
            | EnginePacket::Open(_)
            | EnginePacket::Pong(_)
            | EnginePacket::Upgrade
            | EnginePacket::Noop => Ok(None),
        }
    }

    fn start_attempt(&mut self) {
        self.retry_at = None;
        let attempt = self.failed_attempts + 1;
        debug!(attempt, endpoint = %self.endpoint, "opening channel");

        let connector = Arc::clone(&self.connector);
        let endpoint = self.endpoint.clone();
        let limit = self.connect_timeout;
        self.opening = Some(Box::pin(async move {
            match timeout(limit, Self::open_channel(&connector, &endpoint)).await {
                Ok(result) => result,
                Err(_) => Err(ChatError::new(
                    ChatErrorCategory::Connection,
                    "connect_timeout",
                    format!("handshake did not finish within {} ms", limit.as_millis()),
                )),
            }
        }));
    }

    async fn open_channel(
        connector: &C,
        endpoint: &Url,
    ) -> Result<Established<C::Transport>, ChatError> {
        let mut transport = connector.connect(endpoint).await?;

        let handshake = loop {
            match EnginePacket::decode(&recv_handshake_frame(&mut transport).await?)
                .map_err(codec_error)?
            {
                EnginePacket::Open(handshake) => break handshake,
                EnginePacket::Noop => continue,
                other => {
                    return Err(ChatError::new(
                        ChatErrorCategory::Protocol,
                        "unexpected_handshake_packet",
                        format!("expected open packet, got {other:?}"),
                    ));
                }
            }
        };

        let connect = EnginePacket::Message(SocketPacket::connect())
            .encode()
            .map_err(codec_error)?;
        transport.send(connect).await?;

        let connection_id = loop {
            match EnginePacket::decode(&recv_handshake_frame(&mut transport).await?)
                .map_err(codec_error)?
            {
                EnginePacket::Ping(data) => {
                    let pong = EnginePacket::Pong(data).encode().map_err(codec_error)?;
                    transport.send(pong).await?;
                }
                EnginePacket::Message(SocketPacket::Connect {
                    namespace,
                    sid: Some(sid),
                }) if namespace == DEFAULT_NAMESPACE => break sid,
                EnginePacket::Message(SocketPacket::ConnectError { message, .. }) => {
                    return Err(ChatError::new(
                        ChatErrorCategory::Connection,
                        "connect_refused",
                        message,
                    ));
                }
                EnginePacket::Close => return Err(TransportError::Closed.into()),
                other => debug!(?other, "ignoring frame during handshake"),
            }
        };

        Ok(Established {
            transport,
            handshake,
            connection_id,
        })
    }

    async fn on_opened(&mut self, established: Established<C::Transport>) -> Opened {
        let Established {
            transport,
            handshake,
            connection_id,
        } = established;
        self.transport = Some(transport);
        self.connection_id = Some(connection_id.clone());
        self.heartbeat = Some(Heartbeat {
            window: Duration::from_millis(
                handshake.ping_interval.saturating_add(handshake.ping_timeout),
            ),
            last_seen: Instant::now(),
        });
        self.failed_attempts = 0;
        self.transition(ConnectionTransition::Opened);

        let resumed = std::mem::take(&mut self.resuming);
        info!(connection_id = %connection_id, resumed, "channel open");

        let identity_flushed = match self.queued_identity.take() {
            Some(announcement) => {
                self.send(announcement).await;
                true
            }
            None => false,
        };

        Opened {
            connection_id,
            resumed,
            identity_flushed,
        }
    }

    fn on_attempt_failed(&mut self, err: ChatError) {
        self.failed_attempts += 1;
        let attempt = self.failed_attempts;

        if self.retry.allows_retry(attempt) {
            let delay = self.retry.delay_for_attempt(attempt - 1);
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "connect attempt failed; retrying"
            );
            self.transition(ConnectionTransition::AttemptFailed);
            self.retry_at = Some(Instant::now() + delay);
        } else {
            warn!(attempt, error = %err, "connect attempts exhausted; giving up");
            self.resuming = false;
            self.transition(ConnectionTransition::GaveUp);
        }
    }

    fn on_transport_lost(&mut self, reason: &str) {
        self.transport = None;
        self.connection_id = None;
        self.heartbeat = None;

        match self.state() {
            ConnectionState::Connected => {
                warn!(reason, "channel lost; reconnecting");
                self.transition(ConnectionTransition::TransportLost);
                self.resuming = true;
                self.failed_attempts = 0;
                self.retry_at = Some(Instant::now() + self.retry.delay_for_attempt(0));
            }
            state => debug!(reason, ?state, "channel closed"),
        }
    }

    async fn write(&mut self, packet: EnginePacket) -> Result<(), ChatError> {
        let frame = packet.encode().map_err(codec_error)?;
        let Some(transport) = self.transport.as_mut() else {
            return Err(TransportError::Closed.into());
        };
        if let Err(err) = transport.send(frame).await {
            self.on_transport_lost(&err.to_string());
            return Err(err.into());
        }
        Ok(())
    }

    async fn close_transport(&mut self) {
        self.connection_id = None;
        self.heartbeat = None;
        if let Some(mut transport) = self.transport.take()
            && let Err(err) = transport.close().await
        {
            debug!(error = %err, "transport close failed");
        }
    }

    fn transition(&mut self, transition: ConnectionTransition) {
        match self.state_machine.apply(transition) {
            Ok(events) => {
                for event in events {
                    self.channels.emit(event);
                }
            }
            Err(err) => warn!(?transition, error = %err, "ignoring connection transition"),
        }
    }
}

async fn recv_handshake_frame<T: Transport>(transport: &mut T) -> Result<String, ChatError> {
    transport
        .recv()
        .await?
        .ok_or_else(|| TransportError::Closed.into())
}

fn codec_error(err: CodecError) -> ChatError {
    ChatError::new(ChatErrorCategory::Protocol, "codec_error", err.to_string())
}
