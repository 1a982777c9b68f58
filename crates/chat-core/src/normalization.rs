use crate::{
    protocol::{
        InboundEvent, WireEmojiMessage, WireFileMessage, WireImageMessage, WireLastMessage,
        WireTextMessage,
    },
    types::{Attachment, LastMessageSummary, MessageBody, MessageEvent, MessageKind},
};

const FILE_PREVIEW_PREFIX: &str = "📎";
const IMAGE_PREVIEW_PREFIX: &str = "🖼️";

/// Convert a message-carrying inbound event into a history entry.
///
/// Returns `None` for events that carry no message.
pub fn message_from_inbound(event: InboundEvent) -> Option<MessageEvent> {
    match event {
        InboundEvent::ReceiveMessage(message) => Some(normalize_text_message(message)),
        InboundEvent::ReceiveFile(message) => Some(normalize_file_message(message)),
        InboundEvent::ReceiveImage(message) => Some(normalize_image_message(message)),
        InboundEvent::ReceiveEmoji(message) => Some(normalize_emoji_message(message)),
        _ => None,
    }
}

/// `receiveMessage` doubles as the emoji channel when `type == "emoji"`.
pub fn normalize_text_message(message: WireTextMessage) -> MessageEvent {
    let body = match message.kind {
        Some(MessageKind::Emoji) => MessageBody::Emoji {
            glyph: message.emoji.or(message.message).unwrap_or_default(),
        },
        _ => MessageBody::Text {
            content: message.message.unwrap_or_default(),
        },
    };
    MessageEvent {
        from: message.from,
        timestamp: message.timestamp,
        body,
    }
}

pub fn normalize_file_message(message: WireFileMessage) -> MessageEvent {
    MessageEvent {
        from: message.from,
        timestamp: message.timestamp,
        body: MessageBody::File(Attachment {
            name: message.file_name,
            mime_type: message.file_type,
            size_bytes: message.file_size,
            base64_payload: message.file_data,
        }),
    }
}

pub fn normalize_image_message(message: WireImageMessage) -> MessageEvent {
    MessageEvent {
        from: message.from,
        timestamp: message.timestamp,
        body: MessageBody::Image(Attachment {
            name: message.image_name,
            mime_type: message.image_type,
            size_bytes: message.image_size,
            base64_payload: message.image_data,
        }),
    }
}

pub fn normalize_emoji_message(message: WireEmojiMessage) -> MessageEvent {
    MessageEvent {
        from: message.from,
        timestamp: message.timestamp,
        body: MessageBody::Emoji {
            glyph: message.emoji,
        },
    }
}

/// Rebuild a history entry from the server's last-message summary.
///
/// Summaries carry no attachment bytes, so file and image entries come back
/// with an empty payload, zero size and an empty MIME type.
pub fn message_from_last_message(last: WireLastMessage) -> MessageEvent {
    let body = match last.kind {
        MessageKind::Text => MessageBody::Text {
            content: last.content,
        },
        MessageKind::Emoji => MessageBody::Emoji {
            glyph: last.emoji.unwrap_or(last.content),
        },
        MessageKind::File => MessageBody::File(placeholder_attachment(
            last.file_name,
            &last.content,
            FILE_PREVIEW_PREFIX,
        )),
        MessageKind::Image => MessageBody::Image(placeholder_attachment(
            last.image_name,
            &last.content,
            IMAGE_PREVIEW_PREFIX,
        )),
    };
    MessageEvent {
        from: last.from,
        timestamp: last.timestamp,
        body,
    }
}

fn placeholder_attachment(name: Option<String>, content: &str, prefix: &str) -> Attachment {
    let name = name.unwrap_or_else(|| {
        content
            .strip_prefix(prefix)
            .unwrap_or(content)
            .trim()
            .to_owned()
    });
    Attachment {
        name,
        mime_type: String::new(),
        size_bytes: 0,
        base64_payload: String::new(),
    }
}

/// Display-ready preview text for a history entry.
pub fn preview_text(body: &MessageBody) -> String {
    match body {
        MessageBody::Text { content } => content.clone(),
        MessageBody::Emoji { glyph } => glyph.clone(),
        MessageBody::File(file) => format!("{FILE_PREVIEW_PREFIX} {}", file.name),
        MessageBody::Image(image) => format!("{IMAGE_PREVIEW_PREFIX} {}", image.name),
    }
}

/// Project a history entry into a conversation-list preview.
pub fn summarize(event: &MessageEvent) -> LastMessageSummary {
    let (file_name, image_name) = match &event.body {
        MessageBody::File(file) => (Some(file.name.clone()), None),
        MessageBody::Image(image) => (None, Some(image.name.clone())),
        MessageBody::Text { .. } | MessageBody::Emoji { .. } => (None, None),
    };
    LastMessageSummary {
        from: event.from.clone(),
        kind: event.kind(),
        content: preview_text(&event.body),
        timestamp: event.timestamp.clone(),
        file_name,
        image_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Identity;

    fn bob() -> Identity {
        Identity::new("bob-sid", "Bob")
    }

    #[test]
    fn text_channel_carries_emoji_type() {
        let emoji = normalize_text_message(WireTextMessage {
            from: bob(),
            message: Some("🎉".into()),
            emoji: None,
            timestamp: "t".into(),
            kind: Some(MessageKind::Emoji),
        });
        assert_eq!(emoji.body, MessageBody::Emoji { glyph: "🎉".into() });

        let text = normalize_text_message(WireTextMessage {
            from: bob(),
            message: Some("hello".into()),
            emoji: None,
            timestamp: "t".into(),
            kind: None,
        });
        assert_eq!(
            text.body,
            MessageBody::Text {
                content: "hello".into()
            }
        );
    }

    #[test]
    fn file_payload_maps_onto_attachment() {
        let event = message_from_inbound(InboundEvent::ReceiveFile(WireFileMessage {
            from: bob(),
            file_name: "notes.txt".into(),
            file_data: "aGVsbG8=".into(),
            file_type: "text/plain".into(),
            file_size: 5,
            timestamp: "t".into(),
        }))
        .expect("file event carries a message");

        assert_eq!(
            event.body,
            MessageBody::File(Attachment {
                name: "notes.txt".into(),
                mime_type: "text/plain".into(),
                size_bytes: 5,
                base64_payload: "aGVsbG8=".into(),
            })
        );
    }

    #[test]
    fn non_message_events_are_ignored() {
        assert_eq!(message_from_inbound(InboundEvent::LogoutSuccess), None);
        assert_eq!(message_from_inbound(InboundEvent::UserConnected), None);
    }

    #[test]
    fn last_message_image_falls_back_to_content_name() {
        let event = message_from_last_message(WireLastMessage {
            from: bob(),
            content: "🖼️ cat.png".into(),
            kind: MessageKind::Image,
            timestamp: "t".into(),
            file_name: None,
            image_name: None,
            emoji: None,
        });
        match event.body {
            MessageBody::Image(image) => {
                assert_eq!(image.name, "cat.png");
                assert_eq!(image.size_bytes, 0);
                assert!(image.base64_payload.is_empty());
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn summary_previews_each_kind() {
        let file = MessageEvent {
            from: bob(),
            timestamp: "t1".into(),
            body: MessageBody::File(Attachment {
                name: "a.pdf".into(),
                mime_type: "application/pdf".into(),
                size_bytes: 1,
                base64_payload: "AA==".into(),
            }),
        };
        let summary = summarize(&file);
        assert_eq!(summary.content, "📎 a.pdf");
        assert_eq!(summary.file_name.as_deref(), Some("a.pdf"));
        assert_eq!(summary.image_name, None);
        assert_eq!(summary.kind, MessageKind::File);

        let emoji = MessageEvent {
            from: bob(),
            timestamp: "t2".into(),
            body: MessageBody::Emoji { glyph: "👍".into() },
        };
        assert_eq!(summarize(&emoji).content, "👍");
    }
}
