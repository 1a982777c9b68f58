//! Terminal-side view of the session, fed by runtime events.

use chat_core::{
    ChatEvent, ConnectionState, ConversationId, Identity, MessageBody, MessageEvent,
    format::{format_file_size, format_relative_time, initials},
};
use chrono::{DateTime, Utc};

/// What the terminal has seen so far, used to resolve `/join <n>` and `/history`.
#[derive(Debug, Default)]
pub struct SessionView {
    me: Option<Identity>,
    roster: Vec<Identity>,
    active: Option<ConversationId>,
    history: Vec<MessageEvent>,
}

/// Result of applying one event.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Rendered {
    pub lines: Vec<String>,
    pub logged_out: bool,
}

impl SessionView {
    pub fn active(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }

    /// Connection id of the roster entry at 1-based `index`.
    pub fn peer_at(&self, index: usize) -> Option<&Identity> {
        index.checked_sub(1).and_then(|i| self.roster.get(i))
    }

    pub fn roster_lines(&self) -> Vec<String> {
        if self.roster.is_empty() {
            return vec!["* nobody else is online".to_owned()];
        }
        self.roster
            .iter()
            .enumerate()
            .map(|(i, peer)| {
                format!(
                    "  {}. [{}] {} ({})",
                    i + 1,
                    initials(&peer.display_name),
                    peer.display_name,
                    peer.connection_id
                )
            })
            .collect()
    }

    pub fn history_lines(&self, now: DateTime<Utc>) -> Vec<String> {
        if self.active.is_none() {
            return vec!["* no active conversation".to_owned()];
        }
        if self.history.is_empty() {
            return vec!["* no messages yet".to_owned()];
        }
        self.history
            .iter()
            .map(|message| render_message(message, now))
            .collect()
    }

    pub fn apply(&mut self, event: ChatEvent, now: DateTime<Utc>) -> Rendered {
        let mut rendered = Rendered::default();
        match event {
            ChatEvent::StateChanged { state } => {
                rendered.lines.push(format!("* {}", describe_state(state)));
            }
            ChatEvent::IdentityConfirmed { identity } => {
                rendered
                    .lines
                    .push(format!("* signed in as {}", identity.display_name));
                self.me = Some(identity);
            }
            ChatEvent::RosterUpdated { peers } => {
                self.roster = peers;
                rendered
                    .lines
                    .push(format!("* {} peer(s) online; /users to list", self.roster.len()));
            }
            ChatEvent::ConversationJoined {
                conversation_id,
                participants,
                history,
            } => {
                let others: Vec<&str> = participants
                    .iter()
                    .filter(|p| {
                        self.me
                            .as_ref()
                            .is_none_or(|me| me.connection_id != p.connection_id)
                    })
                    .map(|p| p.display_name.as_str())
                    .collect();
                rendered.lines.push(format!(
                    "* chatting with {} ({conversation_id})",
                    if others.is_empty() {
                        "nobody".to_owned()
                    } else {
                        others.join(", ")
                    }
                ));
                self.active = Some(conversation_id);
                self.history = history;
                rendered.lines.extend(self.history_lines(now));
            }
            ChatEvent::ConversationLeft { conversation_id } => {
                if self.active.as_ref() == Some(&conversation_id) {
                    self.active = None;
                    self.history.clear();
                }
                rendered
                    .lines
                    .push(format!("* left {conversation_id}"));
            }
            ChatEvent::MessageAppended {
                conversation_id,
                event,
            } => {
                rendered.lines.push(render_message(&event, now));
                if self.active.as_ref() == Some(&conversation_id) {
                    self.history.push(event);
                }
            }
            ChatEvent::ServerError { message } => {
                rendered.lines.push(format!("! server: {message}"));
            }
            ChatEvent::Error(err) => {
                rendered.lines.push(format!("! {}", err.message));
            }
            ChatEvent::Snapshot(_) => {}
            ChatEvent::LoggedOut => {
                *self = Self::default();
                rendered.lines.push("* logged out".to_owned());
                rendered.logged_out = true;
            }
        }
        rendered
    }
}

fn describe_state(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Idle => "idle",
        ConnectionState::Connecting => "connecting...",
        ConnectionState::Connected => "connected",
        ConnectionState::Reconnecting => "connection lost, reconnecting...",
        ConnectionState::LoggingOut => "logging out...",
        ConnectionState::Disconnected => "disconnected",
    }
}

pub fn render_message(message: &MessageEvent, now: DateTime<Utc>) -> String {
    let body = match &message.body {
        MessageBody::Text { content } => content.clone(),
        MessageBody::Emoji { glyph } => glyph.clone(),
        MessageBody::File(file) => {
            format!("📎 {} ({})", file.name, format_file_size(file.size_bytes))
        }
        MessageBody::Image(image) => {
            format!("🖼️ {} ({})", image.name, format_file_size(image.size_bytes))
        }
    };
    format!(
        "[{}] {}: {body}",
        format_relative_time(&message.timestamp, now),
        message.from.display_name
    )
}

#[cfg(test)]
mod tests {
    use chat_core::Attachment;
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0)
            .single()
            .expect("valid fixed time")
    }

    fn text(from: &str, content: &str, timestamp: &str) -> MessageEvent {
        MessageEvent {
            from: Identity::new(format!("sock-{from}"), from),
            timestamp: timestamp.to_owned(),
            body: MessageBody::Text {
                content: content.to_owned(),
            },
        }
    }

    #[test]
    fn renders_messages_with_relative_time() {
        let message = text("Bob", "hey", "2026-10-16T11:55:00Z");
        assert_eq!(render_message(&message, now()), "[5 min ago] Bob: hey");

        let image = MessageEvent {
            body: MessageBody::Image(Attachment {
                name: "cat.png".to_owned(),
                mime_type: "image/png".to_owned(),
                size_bytes: 2048,
                base64_payload: String::new(),
            }),
            ..text("Bob", "", "2026-10-16T09:00:00Z")
        };
        assert_eq!(
            render_message(&image, now()),
            "[3 hours ago] Bob: 🖼️ cat.png (2.0 KB)"
        );
    }

    #[test]
    fn tracks_roster_and_active_history() {
        let mut view = SessionView::default();
        view.apply(
            ChatEvent::IdentityConfirmed {
                identity: Identity::new("sock-alice", "Alice"),
            },
            now(),
        );
        view.apply(
            ChatEvent::RosterUpdated {
                peers: vec![Identity::new("sock-bob", "Bob Stone")],
            },
            now(),
        );
        assert_eq!(
            view.peer_at(1).map(|peer| peer.connection_id.as_str()),
            Some("sock-bob")
        );
        assert!(view.peer_at(0).is_none());
        assert_eq!(view.roster_lines(), vec!["  1. [BS] Bob Stone (sock-bob)"]);

        let room = ConversationId::new("room_sock-alice_sock-bob");
        let joined = view.apply(
            ChatEvent::ConversationJoined {
                conversation_id: room.clone(),
                participants: vec![
                    Identity::new("sock-alice", "Alice"),
                    Identity::new("sock-bob", "Bob Stone"),
                ],
                history: Vec::new(),
            },
            now(),
        );
        assert_eq!(
            joined.lines[0],
            "* chatting with Bob Stone (room_sock-alice_sock-bob)"
        );

        view.apply(
            ChatEvent::MessageAppended {
                conversation_id: room.clone(),
                event: text("Bob Stone", "hi", "2026-10-16T11:59:50Z"),
            },
            now(),
        );
        assert_eq!(
            view.history_lines(now()),
            vec!["[Just now] Bob Stone: hi"]
        );

        view.apply(ChatEvent::ConversationLeft { conversation_id: room }, now());
        assert!(view.active().is_none());
        assert_eq!(view.history_lines(now()), vec!["* no active conversation"]);
    }

    #[test]
    fn logout_resets_the_view() {
        let mut view = SessionView::default();
        view.apply(
            ChatEvent::RosterUpdated {
                peers: vec![Identity::new("sock-bob", "Bob")],
            },
            now(),
        );
        let rendered = view.apply(ChatEvent::LoggedOut, now());
        assert!(rendered.logged_out);
        assert_eq!(view.roster_lines(), vec!["* nobody else is online"]);
    }
}
