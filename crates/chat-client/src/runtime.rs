use std::{future, time::Duration};

use chat_core::{
    ChatChannelError, ChatChannels, ChatCommand, ChatError, ChatErrorCategory, ChatEvent,
    ChatSnapshot, ConversationId, ConversationRouter, DisplayName, EventStream, Identity,
    InboundEvent, MessageEvent, MessageKind, OutboundEvent, PresenceTracker,
    normalization::{message_from_inbound, message_from_last_message},
    protocol::ChatJoined,
};
use chat_platform::{KeyValueStore, ScopedKeyValueStore};
use tokio::{
    sync::mpsc,
    time::{Instant, sleep_until},
};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::{
    attachment::{ensure_image, file_event, image_event},
    config::ChatClientConfig,
    connection::{ConnectionManager, ConnectionUpdate, Opened},
    identity_store::LocalIdentityStore,
    message_store::MessageStore,
    transport::Connector,
};

/// Frontend handle to a running chat client.
#[derive(Clone, Debug)]
pub struct ChatClientHandle {
    channels: ChatChannels,
    shutdown: CancellationToken,
    stopped: CancellationToken,
}

impl ChatClientHandle {
    pub async fn send(&self, command: ChatCommand) -> Result<(), ChatChannelError> {
        self.channels.send_command(command).await
    }

    pub fn subscribe(&self) -> EventStream {
        self.channels.subscribe()
    }

    /// Stop the runtime task and wait for it to close the channel.
    ///
    /// Local state is kept; this is not a logout.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.stopped.cancelled().await;
    }
}

/// Namespace a storage backend by server so two servers never share state.
pub fn scoped_storage<S: KeyValueStore>(
    config: &ChatClientConfig,
    storage: S,
) -> ScopedKeyValueStore<S> {
    ScopedKeyValueStore::new(storage, config.storage_scope())
}

/// Start the client task. Nothing connects until a command asks for it.
pub fn spawn_client<C, S>(
    config: ChatClientConfig,
    connector: C,
    storage: S,
) -> Result<ChatClientHandle, ChatError>
where
    C: Connector,
    S: KeyValueStore + Clone + 'static,
{
    let endpoint = config.socket_endpoint()?;
    let (channels, command_rx) = ChatChannels::new(config.command_buffer, config.event_buffer);
    let shutdown = CancellationToken::new();
    let stopped = CancellationToken::new();

    let connection = ConnectionManager::new(
        connector,
        endpoint,
        config.retry,
        config.connect_timeout,
        channels.clone(),
    );
    let runtime = ChatRuntime {
        channels: channels.clone(),
        command_rx,
        shutdown: shutdown.clone(),
        connection,
        presence: PresenceTracker::default(),
        router: ConversationRouter::default(),
        messages: MessageStore::load(storage.clone()),
        identity_store: LocalIdentityStore::new(storage),
        identity: None,
        announced: None,
        logout_grace: config.logout_grace,
        logout_deadline: None,
        _stopped: stopped.clone().drop_guard(),
    };
    tokio::spawn(runtime.run());

    Ok(ChatClientHandle {
        channels,
        shutdown,
        stopped,
    })
}

struct ChatRuntime<C: Connector, S: KeyValueStore> {
    channels: ChatChannels,
    command_rx: mpsc::Receiver<ChatCommand>,
    shutdown: CancellationToken,
    connection: ConnectionManager<C>,
    presence: PresenceTracker,
    router: ConversationRouter,
    messages: MessageStore<S>,
    identity_store: LocalIdentityStore<S>,
    /// Identity confirmed by the server for the current channel.
    identity: Option<Identity>,
    /// Last announced name, re-sent whenever a new channel opens.
    announced: Option<(DisplayName, Option<String>)>,
    logout_grace: Duration,
    logout_deadline: Option<Instant>,
    /// Fires `stopped` when the task ends, including on panic.
    _stopped: DropGuard,
}

impl<C: Connector, S: KeyValueStore> ChatRuntime<C, S> {
    async fn run(mut self) {
        info!("chat runtime started");
        loop {
            let logout_deadline = self.logout_deadline;
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                activity = self.connection.next_activity() => {
                    match self.connection.handle_activity(activity).await {
                        Ok(update) => self.handle_update(update).await,
                        Err(err) => self.report(err),
                    }
                }
                () = wait_until(logout_deadline) => {
                    debug!("logout grace elapsed");
                    self.complete_logout().await;
                }
            }

            if self.logout_deadline.is_some() && !self.connection.is_open() {
                self.complete_logout().await;
            }
        }

        self.connection.disconnect().await;
        info!("chat runtime stopped");
    }

    async fn handle_command(&mut self, command: ChatCommand) {
        match command {
            ChatCommand::Connect => self.connection.connect(),
            ChatCommand::Disconnect => {
                self.connection.disconnect().await;
                self.reset_session();
            }
            ChatCommand::AnnounceIdentity { name, avatar } => {
                self.announce_identity(name, avatar).await;
            }
            ChatCommand::RequestRoster => {
                self.connection.send(OutboundEvent::GetOnlineUsers).await;
            }
            ChatCommand::JoinConversation { peer_connection_id } => {
                self.join_conversation(peer_connection_id).await;
            }
            ChatCommand::LeaveConversation => {
                if let Some(conversation_id) = self.router.leave() {
                    debug!(conversation_id = %conversation_id, "left conversation");
                    self.channels
                        .emit(ChatEvent::ConversationLeft { conversation_id });
                }
            }
            ChatCommand::SendText { body } => {
                if let Some(room_id) = self.target_conversation("sendMessage") {
                    self.connection
                        .send(OutboundEvent::SendMessage {
                            room_id,
                            message: body,
                            kind: MessageKind::Text,
                        })
                        .await;
                }
            }
            ChatCommand::SendEmoji { glyph } => {
                if let Some(room_id) = self.target_conversation("sendEmoji") {
                    self.connection
                        .send(OutboundEvent::SendEmoji {
                            room_id,
                            emoji: glyph,
                        })
                        .await;
                }
            }
            ChatCommand::SendFile(attachment) => {
                if let Some(room_id) = self.target_conversation("sendFile") {
                    self.connection
                        .send(file_event(room_id, &attachment))
                        .await;
                }
            }
            ChatCommand::SendImage(attachment) => {
                if let Err(err) = ensure_image(&attachment) {
                    self.report(err);
                    return;
                }
                if let Some(room_id) = self.target_conversation("sendImage") {
                    match image_event(room_id, &attachment) {
                        Ok(event) => self.connection.send(event).await,
                        Err(err) => self.report(err),
                    }
                }
            }
            ChatCommand::RequestSnapshot => {
                let snapshot = self.snapshot();
                self.channels.emit(ChatEvent::Snapshot(snapshot));
            }
            ChatCommand::Logout => self.begin_logout().await,
        }
    }

    async fn announce_identity(&mut self, name: DisplayName, avatar: Option<String>) {
        self.identity_store.save_name(&name);
        let announcement = OutboundEvent::SetUsername {
            username: name.as_str().to_owned(),
            avatar: avatar.clone(),
        };
        self.announced = Some((name, avatar));
        self.connection.announce_identity(announcement).await;

        if !self.connection.is_open() {
            self.connection.connect();
        }
    }

    async fn join_conversation(&mut self, peer_connection_id: String) {
        let local = self
            .identity
            .as_ref()
            .map(|identity| identity.connection_id.as_str());
        match self.router.begin_join(local, &peer_connection_id) {
            Ok(expected) => {
                debug!(conversation_id = %expected, peer = %peer_connection_id, "joining conversation");
                self.connection
                    .send(OutboundEvent::JoinChat {
                        target_socket_id: peer_connection_id,
                    })
                    .await;
            }
            Err(err) => self.report(err),
        }
    }

    /// Conversation a send goes to, captured when the command is handled.
    fn target_conversation(&self, action: &str) -> Option<ConversationId> {
        let active = self.router.active().cloned();
        if active.is_none() {
            warn!(action, "no active conversation; dropping send");
        }
        active
    }

    async fn handle_update(&mut self, update: ConnectionUpdate) {
        match update {
            ConnectionUpdate::Inbound(event) => self.handle_inbound(event).await,
            ConnectionUpdate::Opened(opened) => self.on_opened(opened).await,
            ConnectionUpdate::Closed => {
                info!("connection closed with no retry pending; clearing session");
                self.reset_session();
            }
            ConnectionUpdate::Idle => {}
        }
    }

    async fn on_opened(&mut self, opened: Opened) {
        // Connection ids from the previous channel are dead, and so is any
        // conversation id derived from them.
        self.reset_session();

        if !opened.identity_flushed
            && let Some((name, avatar)) = &self.announced
        {
            debug!(resumed = opened.resumed, "re-announcing identity");
            let announcement = OutboundEvent::SetUsername {
                username: name.as_str().to_owned(),
                avatar: avatar.clone(),
            };
            self.connection.send(announcement).await;
        }
    }

    async fn handle_inbound(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::UsernameSet(identity) => {
                info!(
                    connection_id = %identity.connection_id,
                    display_name = %identity.display_name,
                    "identity confirmed"
                );
                self.identity = Some(identity.clone());
                self.channels.emit(ChatEvent::IdentityConfirmed { identity });
                self.connection.send(OutboundEvent::GetOnlineUsers).await;
            }
            InboundEvent::OnlineUsers(users) => {
                self.presence.replace(users);
                self.channels.emit(ChatEvent::RosterUpdated {
                    peers: self.peers(),
                });
            }
            InboundEvent::UserConnected | InboundEvent::UserDisconnected => {
                if self.identity.is_some() {
                    self.connection.send(OutboundEvent::GetOnlineUsers).await;
                }
            }
            InboundEvent::ChatJoined(joined) => self.on_chat_joined(joined),
            InboundEvent::Error { message } => {
                warn!(%message, "server reported an error");
                self.channels.emit(ChatEvent::ServerError { message });
            }
            InboundEvent::LogoutSuccess => {
                info!("logout acknowledged by server");
                self.complete_logout().await;
            }
            message @ (InboundEvent::ReceiveMessage(_)
            | InboundEvent::ReceiveFile(_)
            | InboundEvent::ReceiveImage(_)
            | InboundEvent::ReceiveEmoji(_)) => {
                if let Some(message) = message_from_inbound(message) {
                    self.on_message(message);
                }
            }
        }
    }

    fn on_chat_joined(&mut self, joined: ChatJoined) {
        let outcome = self.router.complete_join(joined.room_id);
        if !outcome.matches_request() {
            debug!(
                expected = ?outcome.expected,
                actual = %outcome.conversation_id,
                "server chose the conversation id"
            );
        }

        let conversation_id = outcome.conversation_id;
        self.messages.ensure(&conversation_id);
        if let Some(last) = joined.last_message {
            let merge = self
                .messages
                .merge_server_last_message(&conversation_id, message_from_last_message(last));
            debug!(conversation_id = %conversation_id, ?merge, "merged server last message");
        }

        info!(conversation_id = %conversation_id, "conversation active");
        self.channels.emit(ChatEvent::ConversationJoined {
            history: self.messages.history_of(&conversation_id).to_vec(),
            conversation_id,
            participants: joined.participants,
        });
    }

    fn on_message(&mut self, message: MessageEvent) {
        let Some(conversation_id) = self.router.active().cloned() else {
            warn!(
                from = %message.from.display_name,
                kind = ?message.kind(),
                "no active conversation; dropping inbound message"
            );
            return;
        };

        self.messages.append(&conversation_id, message.clone());
        self.channels.emit(ChatEvent::MessageAppended {
            conversation_id,
            event: message,
        });
    }

    async fn begin_logout(&mut self) {
        if self.logout_deadline.is_some() {
            debug!("logout already in progress");
            return;
        }
        if self.connection.begin_logout().await {
            self.logout_deadline = Some(Instant::now() + self.logout_grace);
        } else {
            self.complete_logout().await;
        }
    }

    /// Close the channel and wipe every piece of local state.
    async fn complete_logout(&mut self) {
        self.logout_deadline = None;
        self.connection.finish_logout().await;
        self.reset_session();
        self.announced = None;
        self.messages.clear_all();
        self.identity_store.clear();
        info!("logged out; local state cleared");
        self.channels.emit(ChatEvent::LoggedOut);
    }

    fn reset_session(&mut self) {
        self.identity = None;
        self.presence.clear();
        if let Some(conversation_id) = self.router.leave() {
            self.channels
                .emit(ChatEvent::ConversationLeft { conversation_id });
        }
    }

    fn peers(&self) -> Vec<Identity> {
        self.presence.peers_excluding(
            self.identity
                .as_ref()
                .map(|identity| identity.connection_id.as_str()),
        )
    }

    fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            state: self.connection.state(),
            identity: self.identity.clone(),
            roster: self.peers(),
            active_conversation: self.router.active().cloned(),
            last_messages: self.messages.last_messages(),
        }
    }

    fn report(&self, err: ChatError) {
        match err.category {
            ChatErrorCategory::Protocol | ChatErrorCategory::Serialization => {
                warn!(code = %err.code, error = %err, "ignoring malformed server frame");
            }
            _ => {
                warn!(code = %err.code, error = %err, "chat client error");
                self.channels.emit(ChatEvent::Error(err));
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use chat_core::{ConnectionState, OutgoingAttachment, RetryPolicy};
    use chat_platform::InMemoryKeyValueStore;
    use serde_json::{Value, json};
    use tokio::{
        sync::broadcast::error::RecvError,
        time::timeout,
    };

    use super::*;
    use crate::{
        config::DEFAULT_SERVER_URL,
        transport::memory::{MemoryConnector, ServerSide, accept},
    };

    const WAIT: Duration = Duration::from_secs(5);
    const ROOM: &str = "room_sock-alice_sock-bob";

    struct Harness {
        handle: ChatClientHandle,
        accepted: mpsc::UnboundedReceiver<ServerSide>,
        events: EventStream,
        storage: InMemoryKeyValueStore,
    }

    fn start() -> Harness {
        let mut config = ChatClientConfig::parse(DEFAULT_SERVER_URL).expect("default url parses");
        config.retry = RetryPolicy::new(5, 20, 3);
        config.logout_grace = Duration::from_millis(50);
        config.connect_timeout = WAIT;

        let (connector, accepted) = MemoryConnector::new();
        let storage = InMemoryKeyValueStore::default();
        let handle =
            spawn_client(config, connector, storage.clone()).expect("client should spawn");
        let events = handle.subscribe();
        Harness {
            handle,
            accepted,
            events,
            storage,
        }
    }

    fn alice(connection_id: &str) -> Value {
        json!({ "socketId": connection_id, "username": "Alice" })
    }

    fn bob() -> Value {
        json!({ "socketId": "sock-bob", "username": "Bob" })
    }

    async fn expect_event(server: &mut ServerSide, name: &str) -> Option<Value> {
        let (got, payload) = timeout(WAIT, server.next_event())
            .await
            .expect("client should emit in time")
            .expect("channel should stay open");
        assert_eq!(got, name);
        payload
    }

    async fn next_matching<T>(
        events: &mut EventStream,
        mut pick: impl FnMut(ChatEvent) -> Option<T>,
    ) -> T {
        timeout(WAIT, async {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Some(found) = pick(event) {
                            return found;
                        }
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => panic!("event stream closed"),
                }
            }
        })
        .await
        .expect("event should arrive in time")
    }

    async fn snapshot(harness: &mut Harness) -> ChatSnapshot {
        harness
            .handle
            .send(ChatCommand::RequestSnapshot)
            .await
            .expect("runtime should accept commands");
        next_matching(&mut harness.events, |event| match event {
            ChatEvent::Snapshot(snapshot) => Some(snapshot),
            _ => None,
        })
        .await
    }

    /// Announce Alice, confirm her identity and deliver a roster with Bob.
    async fn sign_in(harness: &mut Harness) -> ServerSide {
        harness
            .handle
            .send(ChatCommand::AnnounceIdentity {
                name: DisplayName::parse("Alice").expect("valid name"),
                avatar: None,
            })
            .await
            .expect("runtime should accept commands");

        let mut server = timeout(WAIT, accept(&mut harness.accepted, "sock-alice"))
            .await
            .expect("client should connect");
        assert_eq!(
            expect_event(&mut server, "setUsername").await,
            Some(json!({ "username": "Alice" }))
        );
        server.emit("usernameSet", Some(alice("sock-alice")));
        expect_event(&mut server, "getOnlineUsers").await;
        server.emit("onlineUsers", Some(json!([alice("sock-alice"), bob()])));

        let peers = next_matching(&mut harness.events, |event| match event {
            ChatEvent::RosterUpdated { peers } => Some(peers),
            _ => None,
        })
        .await;
        assert_eq!(peers, vec![Identity::new("sock-bob", "Bob")]);
        server
    }

    /// Join Bob and wait until the runtime reports the conversation active.
    async fn join_bob(
        harness: &mut Harness,
        server: &mut ServerSide,
        last_message: Value,
    ) -> (ConversationId, Vec<MessageEvent>) {
        harness
            .handle
            .send(ChatCommand::JoinConversation {
                peer_connection_id: "sock-bob".into(),
            })
            .await
            .expect("runtime should accept commands");
        assert_eq!(
            expect_event(server, "joinChat").await,
            Some(json!({ "targetSocketId": "sock-bob" }))
        );
        server.emit(
            "chatJoined",
            Some(json!({
                "roomId": ROOM,
                "participants": [alice("sock-alice"), bob()],
                "lastMessage": last_message,
            })),
        );
        next_matching(&mut harness.events, |event| match event {
            ChatEvent::ConversationJoined {
                conversation_id,
                history,
                ..
            } => Some((conversation_id, history)),
            _ => None,
        })
        .await
    }

    async fn send_command(harness: &Harness, command: ChatCommand) {
        harness
            .handle
            .send(command)
            .await
            .expect("runtime should accept commands");
    }

    fn hello_from_alice() -> Value {
        json!({
            "from": alice("sock-alice"),
            "message": "hi",
            "timestamp": "2026-10-16T09:30:00.000Z",
            "type": "text",
        })
    }

    async fn send_hi(harness: &mut Harness, server: &mut ServerSide) {
        harness
            .handle
            .send(ChatCommand::SendText { body: "hi".into() })
            .await
            .expect("runtime should accept commands");
        assert_eq!(
            expect_event(server, "sendMessage").await,
            Some(json!({ "roomId": ROOM, "message": "hi", "type": "text" }))
        );
        server.emit("receiveMessage", Some(hello_from_alice()));
        next_matching(&mut harness.events, |event| match event {
            ChatEvent::MessageAppended { event, .. } => Some(event),
            _ => None,
        })
        .await;
    }

    fn stored_history(storage: &InMemoryKeyValueStore) -> usize {
        MessageStore::load(storage.clone())
            .history_of(&ConversationId::new(ROOM))
            .len()
    }

    #[tokio::test]
    async fn sign_in_join_and_send_round_trip() {
        let mut harness = start();
        let mut server = sign_in(&mut harness).await;

        let (conversation_id, history) = join_bob(&mut harness, &mut server, Value::Null).await;
        assert_eq!(conversation_id.as_str(), ROOM);
        assert!(history.is_empty());

        send_hi(&mut harness, &mut server).await;
        let snapshot = snapshot(&mut harness).await;
        assert_eq!(snapshot.state, ConnectionState::Connected);
        assert_eq!(
            snapshot
                .identity
                .as_ref()
                .map(|identity| identity.connection_id.as_str()),
            Some("sock-alice")
        );
        assert_eq!(snapshot.active_conversation.as_ref().map(|id| id.as_str()), Some(ROOM));
        let last = snapshot
            .last_messages
            .get(&ConversationId::new(ROOM))
            .expect("conversation should have a last message");
        assert_eq!(last.content, "hi");
        assert_eq!(stored_history(&harness.storage), 1);

        let identity = LocalIdentityStore::new(harness.storage.clone()).load();
        assert_eq!(identity.as_ref().map(DisplayName::as_str), Some("Alice"));
    }

    #[tokio::test]
    async fn reconnect_reannounces_and_keeps_history_unique() {
        let mut harness = start();
        let mut server = sign_in(&mut harness).await;
        join_bob(&mut harness, &mut server, Value::Null).await;
        send_hi(&mut harness, &mut server).await;

        server.drop_connection();
        let mut server = timeout(WAIT, accept(&mut harness.accepted, "sock-alice-2"))
            .await
            .expect("client should reconnect");

        let left = next_matching(&mut harness.events, |event| match event {
            ChatEvent::ConversationLeft { conversation_id } => Some(conversation_id),
            _ => None,
        })
        .await;
        assert_eq!(left.as_str(), ROOM);

        assert_eq!(
            expect_event(&mut server, "setUsername").await,
            Some(json!({ "username": "Alice" }))
        );
        server.emit("usernameSet", Some(alice("sock-alice-2")));
        expect_event(&mut server, "getOnlineUsers").await;
        server.emit("onlineUsers", Some(json!([alice("sock-alice-2"), bob()])));
        next_matching(&mut harness.events, |event| match event {
            ChatEvent::RosterUpdated { peers } => Some(peers),
            _ => None,
        })
        .await;

        let mut last_message = hello_from_alice();
        last_message["content"] = json!("hi");
        let (_, history) = join_bob(&mut harness, &mut server, last_message).await;
        assert_eq!(history.len(), 1);
        assert_eq!(stored_history(&harness.storage), 1);
    }

    #[tokio::test]
    async fn logout_wipes_local_state() {
        let mut harness = start();
        let mut server = sign_in(&mut harness).await;
        join_bob(&mut harness, &mut server, Value::Null).await;
        send_hi(&mut harness, &mut server).await;

        harness
            .handle
            .send(ChatCommand::Logout)
            .await
            .expect("runtime should accept commands");
        assert_eq!(expect_event(&mut server, "logout").await, None);
        server.emit("logoutSuccess", None);
        next_matching(&mut harness.events, |event| {
            matches!(event, ChatEvent::LoggedOut).then_some(())
        })
        .await;

        let snapshot = snapshot(&mut harness).await;
        assert_eq!(snapshot.state, ConnectionState::Disconnected);
        assert!(snapshot.identity.is_none());
        assert!(snapshot.roster.is_empty());
        assert!(snapshot.active_conversation.is_none());
        assert!(snapshot.last_messages.is_empty());

        assert_eq!(stored_history(&harness.storage), 0);
        assert!(
            LocalIdentityStore::new(harness.storage.clone())
                .load()
                .is_none()
        );
    }

    #[tokio::test]
    async fn logout_completes_after_grace_without_ack() {
        let mut harness = start();
        let mut server = sign_in(&mut harness).await;

        harness
            .handle
            .send(ChatCommand::Logout)
            .await
            .expect("runtime should accept commands");
        expect_event(&mut server, "logout").await;
        next_matching(&mut harness.events, |event| {
            matches!(event, ChatEvent::LoggedOut).then_some(())
        })
        .await;

        assert!(
            LocalIdentityStore::new(harness.storage.clone())
                .load()
                .is_none()
        );
        assert!(
            timeout(Duration::from_millis(100), harness.accepted.recv())
                .await
                .is_err(),
            "logout must not reconnect"
        );
    }

    #[tokio::test]
    async fn inbound_message_without_active_conversation_is_dropped() {
        let mut harness = start();
        let server = sign_in(&mut harness).await;

        server.emit("receiveMessage", Some(hello_from_alice()));
        server.emit("error", Some(json!({ "message": "marker" })));

        let mut appended = 0;
        let message = next_matching(&mut harness.events, |event| match event {
            ChatEvent::MessageAppended { .. } => {
                appended += 1;
                None
            }
            ChatEvent::ServerError { message } => Some(message),
            _ => None,
        })
        .await;
        assert_eq!(message, "marker");
        assert_eq!(appended, 0);
        assert!(snapshot(&mut harness).await.last_messages.is_empty());
    }

    #[tokio::test]
    async fn invalid_commands_surface_errors() {
        let mut harness = start();

        harness
            .handle
            .send(ChatCommand::SendImage(OutgoingAttachment {
                name: "notes.txt".into(),
                mime_type: "text/plain".into(),
                data: b"hello".to_vec(),
            }))
            .await
            .expect("runtime should accept commands");
        let err = next_matching(&mut harness.events, |event| match event {
            ChatEvent::Error(err) => Some(err),
            _ => None,
        })
        .await;
        assert_eq!(err.code, "not_an_image");

        harness
            .handle
            .send(ChatCommand::JoinConversation {
                peer_connection_id: "sock-bob".into(),
            })
            .await
            .expect("runtime should accept commands");
        let err = next_matching(&mut harness.events, |event| match event {
            ChatEvent::Error(err) => Some(err),
            _ => None,
        })
        .await;
        assert_eq!(err.code, "identity_required");

        harness.handle.shutdown().await;
    }

    #[tokio::test]
    async fn presence_changes_refresh_the_roster() {
        let mut harness = start();
        let mut server = sign_in(&mut harness).await;

        let carol = json!({ "socketId": "sock-carol", "username": "Carol" });
        server.emit("userConnected", Some(carol.clone()));
        expect_event(&mut server, "getOnlineUsers").await;
        server.emit(
            "onlineUsers",
            Some(json!([
                alice("sock-alice"),
                bob(),
                carol,
            ])),
        );
        let peers = next_matching(&mut harness.events, |event| match event {
            ChatEvent::RosterUpdated { peers } => Some(peers),
            _ => None,
        })
        .await;
        assert_eq!(peers.len(), 2);

        server.emit("userDisconnected", None);
        expect_event(&mut server, "getOnlineUsers").await;
        server.emit("onlineUsers", Some(json!([alice("sock-alice")])));
        let peers = next_matching(&mut harness.events, |event| match event {
            ChatEvent::RosterUpdated { peers } => Some(peers),
            _ => None,
        })
        .await;
        assert!(peers.is_empty());
    }

    #[tokio::test]
    async fn presence_changes_before_identity_are_ignored() {
        let mut harness = start();
        send_command(&harness, ChatCommand::Connect).await;
        let mut server = timeout(WAIT, accept(&mut harness.accepted, "sock-alice"))
            .await
            .expect("client should connect");

        server.emit("userConnected", None);
        server.emit("userDisconnected", None);
        server.emit("error", Some(json!({ "message": "marker" })));
        let message = next_matching(&mut harness.events, |event| match event {
            ChatEvent::ServerError { message } => Some(message),
            _ => None,
        })
        .await;
        assert_eq!(message, "marker");

        // The logout is the first thing the client says; no roster request
        // went out for the notifications above.
        send_command(&harness, ChatCommand::Logout).await;
        assert_eq!(expect_event(&mut server, "logout").await, None);
    }

    #[tokio::test]
    async fn commands_are_served_while_handshake_is_stalled() {
        let mut harness = start();
        send_command(&harness, ChatCommand::Connect).await;
        // The server accepts the socket but never sends the open packet.
        let _stalled = timeout(WAIT, harness.accepted.recv())
            .await
            .expect("client should dial")
            .expect("connector should stay alive");

        let quick = Duration::from_secs(1);
        let state = timeout(quick, snapshot(&mut harness))
            .await
            .expect("snapshot must not wait for the handshake")
            .state;
        assert_eq!(state, ConnectionState::Connecting);

        send_command(&harness, ChatCommand::Logout).await;
        timeout(
            quick,
            next_matching(&mut harness.events, |event| {
                matches!(event, ChatEvent::LoggedOut).then_some(())
            }),
        )
        .await
        .expect("logout must not wait for the handshake");

        timeout(quick, harness.handle.shutdown())
            .await
            .expect("shutdown must not wait for the handshake");
    }

    #[tokio::test]
    async fn server_disconnect_clears_the_session() {
        let mut harness = start();
        let mut server = sign_in(&mut harness).await;
        join_bob(&mut harness, &mut server, Value::Null).await;

        server.push("41");
        let left = next_matching(&mut harness.events, |event| match event {
            ChatEvent::ConversationLeft { conversation_id } => Some(conversation_id),
            _ => None,
        })
        .await;
        assert_eq!(left.as_str(), ROOM);

        let snapshot = snapshot(&mut harness).await;
        assert_eq!(snapshot.state, ConnectionState::Disconnected);
        assert!(snapshot.identity.is_none());
        assert!(snapshot.roster.is_empty());
        assert!(snapshot.active_conversation.is_none());
        assert!(
            timeout(Duration::from_millis(100), harness.accepted.recv())
                .await
                .is_err(),
            "server disconnect must not reconnect"
        );
        assert_eq!(
            LocalIdentityStore::new(harness.storage.clone())
                .load()
                .as_ref()
                .map(DisplayName::as_str),
            Some("Alice"),
            "a server disconnect is not a logout"
        );
    }
}
