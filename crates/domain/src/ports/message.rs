use crate::DomainResult;
use crate::message::ChatMessage;

/// Persistence port for the message store. Implementations own durability;
/// ordering of `list_messages` is chronological ascending with arrival order
/// breaking timestamp ties.
pub trait MessageRepository: Send + Sync {
    fn create_message(
        &self,
        message: &ChatMessage,
    ) -> crate::ports::BoxFuture<'_, DomainResult<ChatMessage>>;

    fn list_messages(&self) -> crate::ports::BoxFuture<'_, DomainResult<Vec<ChatMessage>>>;

    fn get_message(
        &self,
        message_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<ChatMessage>>>;

    fn mark_read(
        &self,
        message_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<ChatMessage>>>;
}
