use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::ports::message::MessageRepository;
use crate::util::{now_ms, uuid_v7_without_dashes};

const MAX_TEXT_LENGTH: usize = 2_000;

/// Coarse role tag on a message. The admin console still sends as `user`;
/// `bot` is reserved for automated replies.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Bot,
}

/// A chat message as stored and as sent over the wire. Immutable after
/// creation except for `is_read`. `id` and `timestamp` are assigned
/// server-side on creation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    pub is_admin: bool,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_special_offer: Option<bool>,
}

/// What a caller may supply when creating a message. `is_admin` is decided by
/// the gateway from the caller's capability, never taken from a request body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageDraft {
    pub text: String,
    pub sender: Sender,
    pub is_admin: bool,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub is_special_offer: Option<bool>,
}

/// A message record as it may arrive from older widget builds or exports,
/// where the body can live under `message` instead of `text`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessageRecord {
    pub id: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub sender: Option<Sender>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(rename = "timestamp", default)]
    pub timestamp_ms: i64,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub is_special_offer: Option<bool>,
}

/// Single place where the `text`/`message` field aliasing is resolved. Every
/// ingestion boundary goes through this rather than coalescing inline.
pub fn coalesce_text(text: Option<String>, legacy_message: Option<String>) -> Option<String> {
    text.filter(|value| !value.trim().is_empty())
        .or_else(|| legacy_message.filter(|value| !value.trim().is_empty()))
        .map(|value| value.trim().to_string())
}

pub fn normalize_record(raw: RawMessageRecord) -> DomainResult<ChatMessage> {
    let text = coalesce_text(raw.text, raw.message)
        .ok_or_else(|| DomainError::Validation("text is required".into()))?;
    Ok(ChatMessage {
        id: raw.id,
        text,
        sender: raw.sender.unwrap_or(Sender::User),
        is_admin: raw.is_admin,
        timestamp_ms: raw.timestamp_ms,
        is_read: raw.is_read,
        user_id: raw.user_id,
        username: raw.username,
        is_special_offer: raw.is_special_offer,
    })
}

#[derive(Clone)]
pub struct MessageService {
    repository: Arc<dyn MessageRepository>,
}

impl MessageService {
    pub fn new(repository: Arc<dyn MessageRepository>) -> Self {
        Self { repository }
    }

    pub async fn create(&self, draft: MessageDraft) -> DomainResult<ChatMessage> {
        let text = draft.text.trim().to_string();
        validate_text(&text)?;

        let message = ChatMessage {
            id: uuid_v7_without_dashes(),
            text,
            sender: draft.sender,
            is_admin: draft.is_admin,
            timestamp_ms: now_ms(),
            is_read: false,
            user_id: draft.user_id,
            username: draft.username,
            is_special_offer: draft.is_special_offer,
        };

        self.repository.create_message(&message).await
    }

    pub async fn list(&self) -> DomainResult<Vec<ChatMessage>> {
        self.repository.list_messages().await
    }

    pub async fn mark_read(&self, message_id: &str) -> DomainResult<ChatMessage> {
        self.repository
            .mark_read(message_id)
            .await?
            .ok_or(DomainError::NotFound)
    }
}

fn validate_text(text: &str) -> DomainResult<()> {
    if text.is_empty() {
        return Err(DomainError::Validation("text is required".into()));
    }

    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err(DomainError::Validation(format!(
            "text exceeds max length of {MAX_TEXT_LENGTH}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::BoxFuture;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::RwLock;

    #[derive(Default)]
    struct MockMessageRepo {
        messages: Arc<RwLock<HashMap<String, ChatMessage>>>,
        writes: AtomicUsize,
    }

    impl MessageRepository for MockMessageRepo {
        fn create_message(
            &self,
            message: &ChatMessage,
        ) -> BoxFuture<'_, DomainResult<ChatMessage>> {
            let message = message.clone();
            let messages = self.messages.clone();
            self.writes.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let mut messages = messages.write().await;
                if messages.contains_key(&message.id) {
                    return Err(DomainError::Storage("duplicate message id".into()));
                }
                messages.insert(message.id.clone(), message.clone());
                Ok(message)
            })
        }

        fn list_messages(&self) -> BoxFuture<'_, DomainResult<Vec<ChatMessage>>> {
            let messages = self.messages.clone();
            Box::pin(async move {
                let mut messages: Vec<_> = messages.read().await.values().cloned().collect();
                messages.sort_by(|a, b| {
                    a.timestamp_ms
                        .cmp(&b.timestamp_ms)
                        .then_with(|| a.id.cmp(&b.id))
                });
                Ok(messages)
            })
        }

        fn get_message(
            &self,
            message_id: &str,
        ) -> BoxFuture<'_, DomainResult<Option<ChatMessage>>> {
            let message_id = message_id.to_string();
            let messages = self.messages.clone();
            Box::pin(async move {
                let messages = messages.read().await;
                Ok(messages.get(&message_id).cloned())
            })
        }

        fn mark_read(&self, message_id: &str) -> BoxFuture<'_, DomainResult<Option<ChatMessage>>> {
            let message_id = message_id.to_string();
            let messages = self.messages.clone();
            Box::pin(async move {
                let mut messages = messages.write().await;
                let Some(message) = messages.get_mut(&message_id) else {
                    return Ok(None);
                };
                message.is_read = true;
                Ok(Some(message.clone()))
            })
        }
    }

    fn draft(text: &str) -> MessageDraft {
        MessageDraft {
            text: text.to_string(),
            sender: Sender::User,
            is_admin: false,
            user_id: Some("guest-1".to_string()),
            username: Some("mara".to_string()),
            is_special_offer: None,
        }
    }

    #[tokio::test]
    async fn create_assigns_id_and_timestamp() {
        let repo = Arc::new(MockMessageRepo::default());
        let service = MessageService::new(repo.clone());

        let message = service.create(draft("  hello from the beach  ")).await.expect("create");

        assert!(!message.id.is_empty());
        assert!(message.timestamp_ms > 0);
        assert_eq!(message.text, "hello from the beach");
        assert!(!message.is_read);
        assert_eq!(repo.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn create_rejects_blank_text_without_write() {
        let repo = Arc::new(MockMessageRepo::default());
        let service = MessageService::new(repo.clone());

        let err = service.create(draft("   ")).await.unwrap_err();

        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(repo.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn create_rejects_oversized_text() {
        let service = MessageService::new(Arc::new(MockMessageRepo::default()));
        let err = service.create(draft(&"x".repeat(2_001))).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn mark_read_unknown_message_is_not_found() {
        let service = MessageService::new(Arc::new(MockMessageRepo::default()));
        let err = service.mark_read("missing").await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound));
    }

    #[test]
    fn normalize_prefers_canonical_text_field() {
        let record = RawMessageRecord {
            id: "m-1".to_string(),
            text: Some("canonical".to_string()),
            message: Some("legacy".to_string()),
            sender: Some(Sender::Bot),
            is_admin: true,
            timestamp_ms: 42,
            is_read: false,
            user_id: None,
            username: None,
            is_special_offer: None,
        };
        let message = normalize_record(record).expect("normalize");
        assert_eq!(message.text, "canonical");
        assert_eq!(message.sender, Sender::Bot);
    }

    #[test]
    fn normalize_falls_back_to_legacy_message_field() {
        let record = RawMessageRecord {
            id: "m-2".to_string(),
            text: None,
            message: Some("from an old export".to_string()),
            sender: None,
            is_admin: false,
            timestamp_ms: 7,
            is_read: true,
            user_id: Some("guest-9".to_string()),
            username: None,
            is_special_offer: None,
        };
        let message = normalize_record(record).expect("normalize");
        assert_eq!(message.text, "from an old export");
        assert_eq!(message.sender, Sender::User);
        assert!(message.is_read);
    }

    #[test]
    fn normalize_rejects_record_with_no_body() {
        let record = RawMessageRecord {
            id: "m-3".to_string(),
            text: Some("   ".to_string()),
            message: None,
            sender: None,
            is_admin: false,
            timestamp_ms: 0,
            is_read: false,
            user_id: None,
            username: None,
            is_special_offer: None,
        };
        assert!(normalize_record(record).is_err());
    }

    #[test]
    fn wire_shape_uses_widget_field_names() {
        let message = ChatMessage {
            id: "m-4".to_string(),
            text: "hi".to_string(),
            sender: Sender::User,
            is_admin: false,
            timestamp_ms: 1_000,
            is_read: false,
            user_id: Some("guest-1".to_string()),
            username: None,
            is_special_offer: None,
        };
        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(value["isAdmin"], false);
        assert_eq!(value["timestamp"], 1_000);
        assert_eq!(value["userId"], "guest-1");
        assert_eq!(value["sender"], "user");
        assert!(value.get("username").is_none());
    }
}
