use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::sync::Arc;
use uuid::Uuid;

use crate::chat_client::HistoryTurn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Model,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub text: String,
    pub sender: Sender,
    pub pending: bool,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    fn new(text: String, sender: Sender, pending: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            text,
            sender,
            pending,
            created_at: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(text.into(), Sender::User, false)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::new(text.into(), Sender::Model, false)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(text.into(), Sender::Error, false)
    }

    /// Empty model message reserving a slot until the response arrives
    pub fn placeholder() -> Self {
        Self::new(String::new(), Sender::Model, true)
    }

    fn is_settled(&self, sender: Sender) -> bool {
        self.sender == sender && !self.pending && !self.text.is_empty()
    }
}

/// Immutable view of the conversation at one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transcript {
    pub version: u64,
    pub messages: Arc<Vec<ChatMessage>>,
}

impl Deref for Transcript {
    type Target = [ChatMessage];

    fn deref(&self) -> &Self::Target {
        &self.messages
    }
}

/// Ordered log of chat turns, oldest first.
///
/// Mutations copy the backing vector only while a snapshot still shares it,
/// so a `Transcript` handed out earlier never changes underneath its reader.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: Arc<Vec<ChatMessage>>,
    version: u64,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: ChatMessage) {
        Arc::make_mut(&mut self.messages).push(message);
        self.version += 1;
    }

    /// Replace the most recent pending message with `message`. Returns false
    /// (and changes nothing) when no message is pending.
    pub fn resolve_pending(&mut self, message: ChatMessage) -> bool {
        let Some(index) = self.messages.iter().rposition(|m| m.pending) else {
            return false;
        };
        Arc::make_mut(&mut self.messages)[index] = message;
        self.version += 1;
        true
    }

    pub fn snapshot(&self) -> Transcript {
        Transcript {
            version: self.version,
            messages: Arc::clone(&self.messages),
        }
    }

    /// Completed exchanges for the next request: a user message counts only
    /// when a settled, non-empty model reply directly follows it, so roles
    /// always alternate starting with the user.
    pub fn history(&self) -> Vec<HistoryTurn> {
        self.messages
            .windows(2)
            .filter(|pair| pair[0].is_settled(Sender::User) && pair[1].is_settled(Sender::Model))
            .flat_map(|pair| {
                [
                    HistoryTurn::user(pair[0].text.clone()),
                    HistoryTurn::model(pair[1].text.clone()),
                ]
            })
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.messages.iter().filter(|m| m.pending).count()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_client::Role;

    #[test]
    fn test_append_keeps_order() {
        let mut store = MessageStore::new();
        store.append(ChatMessage::user("one"));
        store.append(ChatMessage::model("two"));
        store.append(ChatMessage::user("one"));

        let snapshot = store.snapshot();
        let texts: Vec<&str> = snapshot.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "one"]);
        assert_eq!(snapshot.version, 3);
    }

    #[test]
    fn test_resolve_pending_replaces_in_place() {
        let mut store = MessageStore::new();
        store.append(ChatMessage::user("hi"));
        store.append(ChatMessage::placeholder());
        assert_eq!(store.pending_count(), 1);

        assert!(store.resolve_pending(ChatMessage::model("hello")));
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1].sender, Sender::Model);
        assert_eq!(snapshot[1].text, "hello");
        assert!(!snapshot[1].pending);
        assert_eq!(store.pending_count(), 0);
    }

    #[test]
    fn test_resolve_without_pending_is_noop() {
        let mut store = MessageStore::new();
        store.append(ChatMessage::user("hi"));
        let before = store.snapshot();

        assert!(!store.resolve_pending(ChatMessage::model("late")));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_writes() {
        let mut store = MessageStore::new();
        store.append(ChatMessage::user("hi"));
        store.append(ChatMessage::placeholder());
        let earlier = store.snapshot();

        store.resolve_pending(ChatMessage::model("hello"));
        store.append(ChatMessage::user("again"));

        assert_eq!(earlier.len(), 2);
        assert!(earlier[1].pending);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_snapshot_twice_is_equal() {
        let mut store = MessageStore::new();
        store.append(ChatMessage::user("hi"));
        assert_eq!(store.snapshot(), store.snapshot());
    }

    #[test]
    fn test_history_keeps_only_answered_turns() {
        let mut store = MessageStore::new();
        store.append(ChatMessage::user("hi"));
        store.append(ChatMessage::model(""));
        store.append(ChatMessage::error("timeout"));
        store.append(ChatMessage::user("again"));
        store.append(ChatMessage::model("hello"));
        store.append(ChatMessage::user("unanswered"));
        store.append(ChatMessage::placeholder());

        assert_eq!(
            store.history(),
            vec![HistoryTurn::user("again"), HistoryTurn::model("hello")]
        );
    }

    #[test]
    fn test_history_drops_user_turn_followed_by_error() {
        let mut store = MessageStore::new();
        store.append(ChatMessage::user("first"));
        store.append(ChatMessage::model(""));
        store.append(ChatMessage::error("quota"));
        store.append(ChatMessage::user("second"));
        store.append(ChatMessage::model("ok"));
        store.append(ChatMessage::user("third"));
        store.append(ChatMessage::model("sure"));

        let history = store.history();
        assert_eq!(history.len(), 4);
        for (i, turn) in history.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Model };
            assert_eq!(turn.role, expected);
        }
    }

    #[test]
    fn test_message_serializes_sender_lowercase() {
        let json = serde_json::to_value(ChatMessage::error("boom")).unwrap();
        assert_eq!(json["sender"], "error");
        assert_eq!(json["pending"], false);
    }
}
