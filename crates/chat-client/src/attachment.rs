use std::path::Path;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chat_core::{
    ChatError, ChatErrorCategory, ConversationId, OutboundEvent, OutgoingAttachment,
};

/// Read a file for sending. The MIME type is guessed from the extension.
pub async fn read_attachment(path: impl AsRef<Path>) -> Result<OutgoingAttachment, ChatError> {
    let path = path.as_ref();
    let data = tokio::fs::read(path).await.map_err(|err| {
        ChatError::new(
            ChatErrorCategory::Validation,
            "attachment_unreadable",
            format!("cannot read {}: {err}", path.display()),
        )
    })?;

    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("attachment")
        .to_owned();
    let mime_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_owned();

    Ok(OutgoingAttachment {
        name,
        mime_type,
        data,
    })
}

pub fn file_event(room_id: ConversationId, attachment: &OutgoingAttachment) -> OutboundEvent {
    OutboundEvent::SendFile {
        room_id,
        file_name: attachment.name.clone(),
        file_data: STANDARD.encode(&attachment.data),
        file_type: attachment.mime_type.clone(),
        file_size: attachment.data.len() as u64,
    }
}

pub fn ensure_image(attachment: &OutgoingAttachment) -> Result<(), ChatError> {
    if attachment.is_image() {
        return Ok(());
    }
    Err(ChatError::validation(
        "not_an_image",
        format!(
            "{} is not an image ({})",
            attachment.name, attachment.mime_type
        ),
    ))
}

/// Image variant of [`file_event`]; non-image MIME types are rejected.
pub fn image_event(
    room_id: ConversationId,
    attachment: &OutgoingAttachment,
) -> Result<OutboundEvent, ChatError> {
    ensure_image(attachment)?;
    Ok(OutboundEvent::SendImage {
        room_id,
        image_name: attachment.name.clone(),
        image_data: STANDARD.encode(&attachment.data),
        image_type: attachment.mime_type.clone(),
        image_size: attachment.data.len() as u64,
    })
}

#[cfg(test)]
mod tests {
    use std::{
        env,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    fn attachment(name: &str, mime_type: &str) -> OutgoingAttachment {
        OutgoingAttachment {
            name: name.to_owned(),
            mime_type: mime_type.to_owned(),
            data: b"hello".to_vec(),
        }
    }

    #[tokio::test]
    async fn reads_file_and_guesses_mime() {
        let now_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let path = env::temp_dir().join(format!("chat-attachment-{now_nanos}.png"));
        tokio::fs::write(&path, [0x89, b'P', b'N', b'G'])
            .await
            .expect("write fixture");

        let read = read_attachment(&path).await.expect("read should work");
        assert_eq!(read.mime_type, "image/png");
        assert_eq!(read.data.len(), 4);
        assert!(read.name.ends_with(".png"));

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = read_attachment("/definitely/not/here.txt")
            .await
            .expect_err("missing file");
        assert_eq!(err.code, "attachment_unreadable");
    }

    #[test]
    fn encodes_file_payload() {
        let event = file_event(
            ConversationId::new("room_a_b"),
            &attachment("notes.txt", "text/plain"),
        );
        assert_eq!(
            event,
            OutboundEvent::SendFile {
                room_id: ConversationId::new("room_a_b"),
                file_name: "notes.txt".into(),
                file_data: "aGVsbG8=".into(),
                file_type: "text/plain".into(),
                file_size: 5,
            }
        );
    }

    #[test]
    fn image_send_requires_image_mime() {
        let err = image_event(
            ConversationId::new("room_a_b"),
            &attachment("notes.txt", "text/plain"),
        )
        .expect_err("text is not an image");
        assert_eq!(err.code, "not_an_image");

        let event = image_event(
            ConversationId::new("room_a_b"),
            &attachment("cat.png", "image/png"),
        )
        .expect("png is an image");
        assert_eq!(event.name(), "sendImage");
    }
}
