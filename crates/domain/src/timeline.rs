use std::collections::{HashMap, HashSet};

use crate::message::{ChatMessage, RawMessageRecord, normalize_record};
use crate::realtime::TypingNotice;

/// How long a typing indication stays visible after receipt.
pub const TYPING_TTL_MS: i64 = 2_000;

/// Client-side read model of the conversation: merges the REST history
/// snapshot and the realtime push stream into one ordered, de-duplicated
/// list.
///
/// Both delivery paths carry the server-assigned `id`, so reconciliation is a
/// membership check: whichever path lands first wins, the other is dropped.
/// This also settles the echo race where the relay broadcast of a client's
/// own message arrives before its create response does.
#[derive(Default)]
pub struct ChatTimeline {
    messages: Vec<ChatMessage>,
    seen: HashSet<String>,
    typists: TypingTracker,
}

impl ChatTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a REST history fetch. Records failing normalization are dropped
    /// rather than failing the whole snapshot. Returns how many records were
    /// new.
    pub fn apply_snapshot(&mut self, records: Vec<RawMessageRecord>) -> usize {
        records
            .into_iter()
            .filter_map(|record| normalize_record(record).ok())
            .filter(|message| self.insert(message.clone()))
            .count()
    }

    /// A `message` event from the realtime relay. Returns false when the id
    /// is already present.
    pub fn apply_push(&mut self, message: ChatMessage) -> bool {
        self.insert(message)
    }

    /// The stored record returned by the client's own create call. Arrives
    /// after (or without) the relay echo; same membership rule applies.
    pub fn apply_send_response(&mut self, message: ChatMessage) -> bool {
        self.insert(message)
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.seen.contains(message_id)
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn mark_read(&mut self, message_id: &str) -> bool {
        let Some(message) = self
            .messages
            .iter_mut()
            .find(|message| message.id == message_id)
        else {
            return false;
        };
        message.is_read = true;
        true
    }

    pub fn observe_typing(&mut self, notice: TypingNotice, now_ms: i64) {
        self.typists.observe(notice.username, now_ms);
    }

    /// Usernames with a live typing indication; entries expire
    /// [`TYPING_TTL_MS`] after receipt.
    pub fn typists(&mut self, now_ms: i64) -> Vec<String> {
        self.typists.active(now_ms)
    }

    // Ascending by timestamp; a new message lands after every existing entry
    // with the same timestamp, so ties keep arrival order.
    fn insert(&mut self, message: ChatMessage) -> bool {
        if !self.seen.insert(message.id.clone()) {
            return false;
        }
        let at = self
            .messages
            .partition_point(|existing| existing.timestamp_ms <= message.timestamp_ms);
        self.messages.insert(at, message);
        true
    }
}

#[derive(Default)]
struct TypingTracker {
    last_seen_ms: HashMap<String, i64>,
}

impl TypingTracker {
    fn observe(&mut self, username: String, now_ms: i64) {
        self.last_seen_ms.insert(username, now_ms);
    }

    fn active(&mut self, now_ms: i64) -> Vec<String> {
        self.last_seen_ms
            .retain(|_, seen_ms| now_ms - *seen_ms < TYPING_TTL_MS);
        let mut names: Vec<String> = self.last_seen_ms.keys().cloned().collect();
        names.sort();
        names
    }
}
