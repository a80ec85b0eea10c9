use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::backend::{now_millis, Backend, BackendError, OrderBy, Predicate, Record, Subscription};

pub const MESSAGES: &str = "messages";

/// The two parties of a conversation: a user account and a startup listing.
///
/// Both sides see the same conversation regardless of who speaks; the owner
/// of a listing speaks as the listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub account_id: String,
    pub startup_id: String,
}

impl ConversationKey {
    pub fn new(account_id: &str, startup_id: &str) -> Self {
        Self {
            account_id: account_id.to_owned(),
            startup_id: startup_id.to_owned(),
        }
    }

    pub fn id(&self) -> String {
        format!("{}:{}", self.account_id, self.startup_id)
    }

    pub fn parse(id: &str) -> Option<Self> {
        let (account_id, startup_id) = id.split_once(':')?;
        if account_id.is_empty() || startup_id.is_empty() {
            return None;
        }
        Some(Self::new(account_id, startup_id))
    }

    /// The other participant, if `participant` is one of the two.
    pub fn counterpart(&self, participant: &str) -> Option<&str> {
        if participant == self.account_id {
            Some(&self.startup_id)
        } else if participant == self.startup_id {
            Some(&self.account_id)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub conversation_id: String,
    pub content: String,
    pub created_at: i64,
    pub is_visible_to_sender: bool,
}

impl Message {
    /// Senders who chose not to keep a copy don't see their own message.
    pub fn visible_to(&self, viewer_id: &str) -> bool {
        self.sender_id != viewer_id || self.is_visible_to_sender
    }
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("Message can't be empty.")]
    EmptyContent,

    #[error("You are not part of this conversation.")]
    NotParticipant,

    #[error("Failed to send message. Please try again.")]
    Backend(#[from] BackendError),
}

/// One conversation as seen from the startup's inbox.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSummary {
    pub key: ConversationKey,
    pub latest: Message,
    pub received: usize,
}

#[derive(Clone)]
pub struct MessageStore {
    backend: Backend,
}

fn visible(records: Vec<Record>, viewer_id: &str) -> Vec<Message> {
    records
        .iter()
        .filter_map(|record| match record.decode::<Message>() {
            Ok(message) => Some(message),
            Err(e) => {
                warn!("skipping message {}: {e}", record.id);
                None
            }
        })
        .filter(|message| message.visible_to(viewer_id))
        .collect()
}

impl MessageStore {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    /// Writes a message from `sender_id` to the other side of `conversation`.
    pub async fn send(
        &self,
        conversation: &ConversationKey,
        sender_id: &str,
        content: &str,
        visible_to_sender: bool,
    ) -> Result<String, MessageError> {
        if content.trim().is_empty() {
            return Err(MessageError::EmptyContent);
        }
        let receiver_id = conversation.counterpart(sender_id).ok_or(MessageError::NotParticipant)?;

        let message = Message {
            id: String::new(),
            sender_id: sender_id.to_owned(),
            receiver_id: receiver_id.to_owned(),
            conversation_id: conversation.id(),
            content: content.to_owned(),
            created_at: now_millis(),
            is_visible_to_sender: visible_to_sender,
        };

        let id = self.backend.create_record(MESSAGES, &message).await?;
        debug!("message {id} in {}", message.conversation_id);
        Ok(id)
    }

    /// Live view of `conversation` for `viewer_id`. Every change pushes the
    /// whole visible conversation again.
    pub fn subscribe(&self, conversation: &ConversationKey, viewer_id: &str) -> Subscription<Vec<Message>> {
        let viewer_id = viewer_id.to_owned();
        self.backend.subscribe_records(
            MESSAGES,
            vec![Predicate::eq("conversationId", conversation.id())],
            Some(OrderBy::asc("createdAt")),
            move |records| visible(records, &viewer_id),
        )
    }

    /// What [`MessageStore::subscribe`] would deliver first, read once.
    pub async fn history(&self, conversation: &ConversationKey, viewer_id: &str) -> Result<Vec<Message>, BackendError> {
        let records = self
            .backend
            .query_records(
                MESSAGES,
                &[Predicate::eq("conversationId", conversation.id())],
                Some(&OrderBy::asc("createdAt")),
            )
            .await?;
        Ok(visible(records, viewer_id))
    }

    /// Conversations in which the startup has received something, most recent first.
    pub async fn inbox(&self, startup_id: &str) -> Result<Vec<ConversationSummary>, BackendError> {
        let records = self
            .backend
            .query_records(MESSAGES, &[Predicate::eq("receiverId", startup_id)], Some(&OrderBy::desc("createdAt")))
            .await?;

        let mut summaries: Vec<ConversationSummary> = Vec::new();
        for message in visible(records, startup_id) {
            let Some(key) = ConversationKey::parse(&message.conversation_id) else {
                continue;
            };
            match summaries.iter().position(|s| s.key == key) {
                Some(i) => summaries[i].received += 1,
                None => summaries.push(ConversationSummary { key, latest: message, received: 1 }),
            }
        }

        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use crate::backend::test_backend;

    use super::*;

    async fn store() -> MessageStore {
        let (backend, _) = test_backend().await;
        MessageStore::new(backend)
    }

    #[test]
    fn keys_round_trip_and_find_counterparts() {
        let key = ConversationKey::new("acct", "startup");
        assert_eq!(ConversationKey::parse(&key.id()), Some(key.clone()));
        assert_eq!(key.counterpart("acct"), Some("startup"));
        assert_eq!(key.counterpart("startup"), Some("acct"));
        assert_eq!(key.counterpart("stranger"), None);
        assert_eq!(ConversationKey::parse("nocolon"), None);
        assert_eq!(ConversationKey::parse(":x"), None);
    }

    #[tokio::test]
    async fn empty_content_never_reaches_the_backend() {
        let store = store().await;
        let key = ConversationKey::new("a", "s");

        for content in ["", "   ", "\n\t"] {
            assert!(matches!(store.send(&key, "a", content, true).await, Err(MessageError::EmptyContent)));
        }
        assert!(store.backend.query_records(MESSAGES, &[], None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn outsiders_cannot_send() {
        let store = store().await;
        let key = ConversationKey::new("a", "s");
        assert!(matches!(store.send(&key, "mallory", "hi", true).await, Err(MessageError::NotParticipant)));
    }

    #[tokio::test]
    async fn sent_message_shows_up_exactly_once() {
        let store = store().await;
        let key = ConversationKey::new("a", "s");
        let mut view = store.subscribe(&key, "a");
        assert!(view.next().await.unwrap().is_empty());

        let id = store.send(&key, "a", "hi", true).await.unwrap();

        let snapshot = view.next().await.unwrap();
        assert_eq!(snapshot.iter().filter(|m| m.id == id).count(), 1);
        let message = &snapshot[0];
        assert_eq!((message.sender_id.as_str(), message.receiver_id.as_str()), ("a", "s"));
        assert_eq!(message.content, "hi");
    }

    #[tokio::test]
    async fn views_on_different_conversations_stay_apart() {
        let store = store().await;
        let alice = ConversationKey::new("alice", "s");
        let bob = ConversationKey::new("bob", "s");

        let mut alice_view = store.subscribe(&alice, "alice");
        let mut bob_view = store.subscribe(&bob, "bob");
        alice_view.next().await.unwrap();
        bob_view.next().await.unwrap();

        store.send(&bob, "bob", "for bob only", true).await.unwrap();
        let bob_snapshot = bob_view.next().await.unwrap();
        assert_eq!(bob_snapshot.len(), 1);

        assert!(timeout(Duration::from_millis(200), alice_view.next()).await.is_err());
        assert!(store.history(&alice, "alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn hidden_messages_are_dropped_for_their_sender_only() {
        let store = store().await;
        let key = ConversationKey::new("a", "s");

        store.send(&key, "a", "kept", true).await.unwrap();
        store.send(&key, "a", "not kept", false).await.unwrap();
        store.send(&key, "s", "reply", false).await.unwrap();

        let contents = |messages: Vec<Message>| messages.into_iter().map(|m| m.content).collect::<Vec<_>>();
        assert_eq!(contents(store.history(&key, "a").await.unwrap()), ["kept", "reply"]);
        assert_eq!(contents(store.history(&key, "s").await.unwrap()), ["kept", "not kept"]);
    }

    #[tokio::test]
    async fn hidden_send_does_not_wake_its_sender() {
        let store = store().await;
        let key = ConversationKey::new("a", "s");
        let mut view = store.subscribe(&key, "a");
        view.next().await.unwrap();

        store.send(&key, "a", "not kept", false).await.unwrap();
        assert!(timeout(Duration::from_millis(200), view.next()).await.is_err());
    }

    #[tokio::test]
    async fn inbox_groups_by_conversation() {
        let store = store().await;
        let alice = ConversationKey::new("alice", "s");
        let bob = ConversationKey::new("bob", "s");

        store.send(&alice, "alice", "first", true).await.unwrap();
        store.send(&bob, "bob", "hello", true).await.unwrap();
        store.send(&alice, "alice", "second", true).await.unwrap();
        store.send(&alice, "s", "owner reply", true).await.unwrap();

        let inbox = store.inbox("s").await.unwrap();
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox[0].key, alice);
        assert_eq!(inbox[0].latest.content, "second");
        assert_eq!(inbox[0].received, 2);
        assert_eq!(inbox[1].key, bob);
        assert_eq!(inbox[1].received, 1);
    }
}
