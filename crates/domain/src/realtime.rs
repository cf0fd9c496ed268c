use serde::{Deserialize, Serialize};

use crate::message::{ChatMessage, MessageDraft, Sender, coalesce_text};

/// Frames a connected client may send over the relay. `sendMessage` carries
/// intent only: the gateway persists it and everyone (the sender included)
/// receives the confirmed record back as a `message` event.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientFrame {
    SendMessage(MessageIntent),
    Typing(TypingNotice),
}

/// Events the relay fans out to every connected client.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    Message(ChatMessage),
    UserTyping(TypingNotice),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageIntent {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub sender: Option<Sender>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub is_special_offer: Option<bool>,
}

impl MessageIntent {
    /// Intent arriving over the socket is unauthenticated widget traffic, so
    /// the draft is never admin-attributed.
    pub fn into_draft(self) -> Option<MessageDraft> {
        let text = coalesce_text(self.text, self.message)?;
        Some(MessageDraft {
            text,
            sender: self.sender.unwrap_or(Sender::User),
            is_admin: false,
            user_id: self.user_id,
            username: self.username,
            is_special_offer: self.is_special_offer,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypingNotice {
    pub username: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frames_use_widget_event_names() {
        let frame: ClientFrame = serde_json::from_str(
            r#"{"event":"sendMessage","data":{"text":"hello","username":"mara"}}"#,
        )
        .expect("parse");
        let ClientFrame::SendMessage(intent) = frame else {
            panic!("expected sendMessage frame");
        };
        assert_eq!(intent.text.as_deref(), Some("hello"));

        let frame: ClientFrame =
            serde_json::from_str(r#"{"event":"typing","data":{"username":"mara"}}"#)
                .expect("parse");
        assert_eq!(
            frame,
            ClientFrame::Typing(TypingNotice {
                username: "mara".to_string(),
            })
        );
    }

    #[test]
    fn server_events_use_widget_event_names() {
        let event = ServerEvent::UserTyping(TypingNotice {
            username: "mara".to_string(),
        });
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["event"], "userTyping");
        assert_eq!(value["data"]["username"], "mara");
    }

    #[test]
    fn malformed_frame_is_rejected() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"event":"shutdown"}"#).is_err());
        assert!(serde_json::from_str::<ClientFrame>("not json").is_err());
    }

    #[test]
    fn intent_with_legacy_body_field_becomes_draft() {
        let intent = MessageIntent {
            text: None,
            message: Some("old widget build".to_string()),
            sender: None,
            user_id: Some("guest-1".to_string()),
            username: None,
            is_special_offer: None,
        };
        let draft = intent.into_draft().expect("draft");
        assert_eq!(draft.text, "old widget build");
        assert_eq!(draft.sender, Sender::User);
        assert!(!draft.is_admin);
    }

    #[test]
    fn empty_intent_yields_no_draft() {
        let intent = MessageIntent {
            text: Some("  ".to_string()),
            message: None,
            sender: None,
            user_id: None,
            username: None,
            is_special_offer: None,
        };
        assert!(intent.into_draft().is_none());
    }
}
