use farbound_domain::message::ChatMessage;
use farbound_domain::realtime::{ServerEvent, TypingNotice};
use tokio::sync::broadcast;

use crate::observability;

/// Fan-out for the single shared conversation. Every websocket subscriber
/// sees every event; slow subscribers fall behind the channel and recover
/// through a history refetch rather than blocking the publisher.
#[derive(Clone)]
pub struct ChatRelay {
    events: broadcast::Sender<ServerEvent>,
}

impl ChatRelay {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self { events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Publishes a persisted message. Send errors only mean there is no
    /// subscriber right now; the message is already durable.
    pub fn publish_message(&self, message: ChatMessage, origin: &str) {
        observability::register_relay_event("message", origin);
        let _ = self.events.send(ServerEvent::Message(message));
    }

    pub fn publish_typing(&self, notice: TypingNotice) {
        observability::register_relay_event("userTyping", "socket");
        let _ = self.events.send(ServerEvent::UserTyping(notice));
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farbound_domain::message::Sender;

    fn message(id: &str) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            text: "hello".to_string(),
            sender: Sender::User,
            is_admin: false,
            timestamp_ms: 1,
            is_read: false,
            user_id: None,
            username: None,
            is_special_offer: None,
        }
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_event() {
        let relay = ChatRelay::new(8);
        let mut first = relay.subscribe();
        let mut second = relay.subscribe();

        relay.publish_message(message("m-1"), "rest");
        relay.publish_typing(TypingNotice {
            username: "dina".to_string(),
        });

        for receiver in [&mut first, &mut second] {
            match receiver.recv().await.expect("recv") {
                ServerEvent::Message(received) => assert_eq!(received.id, "m-1"),
                other => panic!("unexpected event: {other:?}"),
            }
            match receiver.recv().await.expect("recv") {
                ServerEvent::UserTyping(notice) => assert_eq!(notice.username, "dina"),
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_not_an_error() {
        let relay = ChatRelay::new(8);
        relay.publish_message(message("m-1"), "rest");
        assert_eq!(relay.subscriber_count(), 0);
    }
}
