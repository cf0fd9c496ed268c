use std::collections::HashMap;
use std::sync::Arc;

use farbound_domain::DomainResult;
use farbound_domain::error::DomainError;
use farbound_domain::guest::GuestUser;
use farbound_domain::message::ChatMessage;
use farbound_domain::ports::BoxFuture;
use farbound_domain::ports::guest::GuestRepository;
use farbound_domain::ports::message::MessageRepository;
use tokio::sync::RwLock;

/// Messages are held in arrival order; listing stably sorts by timestamp so
/// ties preserve arrival, matching what clients expect from the store.
#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: Arc<RwLock<Vec<ChatMessage>>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageRepository for InMemoryMessageRepository {
    fn create_message(&self, message: &ChatMessage) -> BoxFuture<'_, DomainResult<ChatMessage>> {
        let message = message.clone();
        let messages = self.messages.clone();
        Box::pin(async move {
            let mut messages = messages.write().await;
            if messages.iter().any(|existing| existing.id == message.id) {
                return Err(DomainError::Storage("duplicate message id".into()));
            }
            messages.push(message.clone());
            Ok(message)
        })
    }

    fn list_messages(&self) -> BoxFuture<'_, DomainResult<Vec<ChatMessage>>> {
        let messages = self.messages.clone();
        Box::pin(async move {
            let mut output = messages.read().await.clone();
            output.sort_by_key(|message| message.timestamp_ms);
            Ok(output)
        })
    }

    fn get_message(&self, message_id: &str) -> BoxFuture<'_, DomainResult<Option<ChatMessage>>> {
        let message_id = message_id.to_string();
        let messages = self.messages.clone();
        Box::pin(async move {
            let messages = messages.read().await;
            Ok(messages
                .iter()
                .find(|message| message.id == message_id)
                .cloned())
        })
    }

    fn mark_read(&self, message_id: &str) -> BoxFuture<'_, DomainResult<Option<ChatMessage>>> {
        let message_id = message_id.to_string();
        let messages = self.messages.clone();
        Box::pin(async move {
            let mut messages = messages.write().await;
            let Some(message) = messages
                .iter_mut()
                .find(|message| message.id == message_id)
            else {
                return Ok(None);
            };
            message.is_read = true;
            Ok(Some(message.clone()))
        })
    }
}

#[derive(Default)]
pub struct InMemoryGuestRepository {
    guests: Arc<RwLock<HashMap<String, GuestUser>>>,
}

impl InMemoryGuestRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GuestRepository for InMemoryGuestRepository {
    fn get_by_user_id(&self, user_id: &str) -> BoxFuture<'_, DomainResult<Option<GuestUser>>> {
        let user_id = user_id.to_string();
        let guests = self.guests.clone();
        Box::pin(async move {
            let guests = guests.read().await;
            Ok(guests.get(&user_id).cloned())
        })
    }

    fn create_guest(&self, guest: &GuestUser) -> BoxFuture<'_, DomainResult<GuestUser>> {
        let guest = guest.clone();
        let guests = self.guests.clone();
        Box::pin(async move {
            let mut guests = guests.write().await;
            if guests.contains_key(&guest.user_id) {
                return Err(DomainError::Storage("guest already exists".into()));
            }
            guests.insert(guest.user_id.clone(), guest.clone());
            Ok(guest)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farbound_domain::message::Sender;

    fn message(id: &str, timestamp_ms: i64) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            text: "hello".to_string(),
            sender: Sender::User,
            is_admin: false,
            timestamp_ms,
            is_read: false,
            user_id: None,
            username: None,
            is_special_offer: None,
        }
    }

    #[tokio::test]
    async fn list_sorts_by_timestamp_with_stable_ties() {
        let repo = InMemoryMessageRepository::new();
        repo.create_message(&message("late", 30)).await.expect("create");
        repo.create_message(&message("tie-a", 10)).await.expect("create");
        repo.create_message(&message("tie-b", 10)).await.expect("create");

        let listed = repo.list_messages().await.expect("list");
        let ids: Vec<&str> = listed.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["tie-a", "tie-b", "late"]);
    }

    #[tokio::test]
    async fn mark_read_flips_flag_in_place() {
        let repo = InMemoryMessageRepository::new();
        repo.create_message(&message("m-1", 1)).await.expect("create");

        let updated = repo.mark_read("m-1").await.expect("mark").expect("found");
        assert!(updated.is_read);
        assert!(repo.get_message("m-1").await.expect("get").expect("found").is_read);
        assert!(repo.mark_read("missing").await.expect("mark").is_none());
    }

    #[tokio::test]
    async fn duplicate_message_id_is_a_storage_error() {
        let repo = InMemoryMessageRepository::new();
        repo.create_message(&message("m-1", 1)).await.expect("create");
        let err = repo.create_message(&message("m-1", 2)).await.unwrap_err();
        assert!(matches!(err, DomainError::Storage(_)));
    }
}
