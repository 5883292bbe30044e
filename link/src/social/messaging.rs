//! Direct messages between two users.
//!
//! Anyone may message a user they follow. Strangers may message a user only
//! when that user's privacy settings allow it, and the first such message is
//! delivered as a message request.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, warn};
use serde_json::json;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::backend::{call_rpc, fetch_optional, fetch_rows, insert_row, upsert_row, Backend};
use crate::error::{Result, VeneredLinkError};
use crate::models::{
    ChannelSpec, Conversation, EventSelector, Message, MessageTyping, NewMessage, PrivacySettings,
    RowFilter, Table,
};
use crate::social::follows::FollowService;
use crate::table_query::TableQuery;

/// Outcome of [`MessagingService::send`].
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// Delivered into an existing conversation or to someone I follow.
    Sent(Message),
    /// First message to someone I do not follow.
    Request(Message),
}

impl Delivery {
    pub fn message(&self) -> &Message {
        match self {
            Delivery::Sent(message) | Delivery::Request(message) => message,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, Delivery::Request(_))
    }
}

#[derive(Clone)]
pub struct MessagingService {
    auth: AuthContext,
    backend: Arc<dyn Backend>,
    follows: FollowService,
}

impl MessagingService {
    pub fn new(auth: AuthContext, backend: Arc<dyn Backend>) -> Self {
        let follows = FollowService::new(auth.clone(), backend.clone());
        Self {
            auth,
            backend,
            follows,
        }
    }

    fn between(&self, other: Uuid) -> TableQuery {
        TableQuery::new(Table::Messages).or_pair("sender_id", "receiver_id", self.auth.user_id, other)
    }

    /// Whether `recipient` accepts messages from people they do not know.
    /// Users without a settings row accept them.
    async fn accepts_strangers(&self, recipient: Uuid) -> Result<bool> {
        let query = TableQuery::new(Table::PrivacySettings).eq("user_id", recipient);
        let settings: Option<PrivacySettings> = fetch_optional(self.backend.as_ref(), query).await?;
        Ok(settings.map_or(true, |s| s.allow_message_from_strangers))
    }

    /// Send `content` and an optional image to `recipient`.
    pub async fn send(
        &self,
        recipient: Uuid,
        content: &str,
        image_url: Option<String>,
    ) -> Result<Delivery> {
        let content = content.trim();
        if content.is_empty() && image_url.is_none() {
            return Err(VeneredLinkError::ValidationError(
                "a message needs text or an image".into(),
            ));
        }
        if recipient == self.auth.user_id {
            return Err(VeneredLinkError::ValidationError(
                "cannot message yourself".into(),
            ));
        }

        let following = self.follows.is_following(recipient).await?;
        if !following && !self.accepts_strangers(recipient).await? {
            return Err(VeneredLinkError::MessagingDenied(format!(
                "{} does not accept messages from strangers",
                recipient
            )));
        }
        let first_contact = !following && self.backend.count(&self.between(recipient)).await? == 0;

        let row = NewMessage {
            sender_id: self.auth.user_id,
            receiver_id: recipient,
            content: content.to_string(),
            image_url,
        };
        let message: Message = insert_row(self.backend.as_ref(), Table::Messages, &row).await?;
        debug!("[SOCIAL] Message {} sent to {}", message.id, recipient);

        if first_contact {
            Ok(Delivery::Request(message))
        } else {
            Ok(Delivery::Sent(message))
        }
    }

    /// Both directions with `other`, oldest first. The other party's unread
    /// messages to me are marked read; a failure there is only logged.
    pub async fn conversation(&self, other: Uuid) -> Result<Vec<Message>> {
        let query = self.between(other).order("created_at", true);
        let mut messages: Vec<Message> = fetch_rows(self.backend.as_ref(), &query).await?;

        let unread = TableQuery::new(Table::Messages)
            .eq("sender_id", other)
            .eq("receiver_id", self.auth.user_id)
            .eq("read", false);
        match self.backend.update(&unread, json!({ "read": true })).await {
            Ok(_) => {
                for message in messages.iter_mut().filter(|m| m.sender_id == other) {
                    message.read = true;
                }
            },
            Err(e) => warn!("[SOCIAL] Failed to mark conversation with {} read: {}", other, e),
        }
        Ok(messages)
    }

    /// Conversation list, one entry per counterpart.
    pub async fn conversations(&self) -> Result<Vec<Conversation>> {
        call_rpc(
            self.backend.as_ref(),
            "get_conversations",
            json!({ "p_user_id": self.auth.user_id }),
        )
        .await
    }

    /// Publish whether I am typing to `recipient`.
    pub async fn set_typing(&self, recipient: Uuid, is_typing: bool) -> Result<MessageTyping> {
        let row = MessageTyping {
            sender_id: self.auth.user_id,
            receiver_id: recipient,
            is_typing,
            updated_at: Utc::now(),
        };
        upsert_row(
            self.backend.as_ref(),
            Table::MessageTyping,
            &row,
            &["sender_id", "receiver_id"],
        )
        .await
    }

    /// Channel carrying typing updates addressed to me.
    pub fn typing_channel_spec(&self) -> ChannelSpec {
        ChannelSpec::new(format!("typing-{}", self.auth.user_key())).on(
            EventSelector::All,
            Table::MessageTyping,
            Some(RowFilter::eq("receiver_id", self.auth.user_id)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use crate::realtime::Realtime;
    use crate::models::RealtimeEvent;

    fn service(me: Uuid, backend: &MemoryBackend) -> MessagingService {
        MessagingService::new(AuthContext::new(me, "tok"), Arc::new(backend.clone()))
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let backend = MemoryBackend::new();
        let messaging = service(Uuid::new_v4(), &backend);
        assert!(matches!(
            messaging.send(Uuid::new_v4(), "   ", None).await,
            Err(VeneredLinkError::ValidationError(_))
        ));
        assert!(messaging
            .send(Uuid::new_v4(), "", Some("https://i.example/x.png".into()))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_first_message_to_stranger_is_request() {
        let (me, other) = (Uuid::new_v4(), Uuid::new_v4());
        let backend = MemoryBackend::new();
        let messaging = service(me, &backend);

        assert!(messaging.send(other, "hola", None).await.unwrap().is_request());
        assert!(!messaging.send(other, "again", None).await.unwrap().is_request());
    }

    #[tokio::test]
    async fn test_strangers_blocked_by_privacy() {
        let (me, other) = (Uuid::new_v4(), Uuid::new_v4());
        let backend = MemoryBackend::new();
        let mut settings = PrivacySettings::defaults_for(other);
        settings.allow_message_from_strangers = false;
        backend
            .seed_rows(Table::PrivacySettings, vec![serde_json::to_value(&settings).unwrap()])
            .unwrap();

        let messaging = service(me, &backend);
        assert!(matches!(
            messaging.send(other, "hi", None).await,
            Err(VeneredLinkError::MessagingDenied(_))
        ));

        messaging.follows.follow(other).await.unwrap();
        assert!(matches!(
            messaging.send(other, "hi", None).await,
            Ok(Delivery::Sent(_))
        ));
    }

    #[tokio::test]
    async fn test_conversation_marks_incoming_read() {
        let (me, other) = (Uuid::new_v4(), Uuid::new_v4());
        let backend = MemoryBackend::new();
        service(other, &backend).send(me, "one", None).await.unwrap();
        service(me, &backend).send(other, "two", None).await.unwrap();

        let thread = service(me, &backend).conversation(other).await.unwrap();
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[0].content, "one");
        assert!(thread[0].read);
        assert!(backend
            .rows(Table::Messages)
            .iter()
            .filter(|m| m["receiver_id"] == json!(me))
            .all(|m| m["read"] == json!(true)));
    }

    #[tokio::test]
    async fn test_typing_upserts_and_publishes() {
        let (me, other) = (Uuid::new_v4(), Uuid::new_v4());
        let backend = MemoryBackend::new();
        let theirs = service(other, &backend);
        let mut sub = backend.subscribe(theirs.typing_channel_spec()).await.unwrap();
        sub.next().await;

        let mine = service(me, &backend);
        mine.set_typing(other, true).await.unwrap();
        mine.set_typing(other, false).await.unwrap();
        assert_eq!(backend.rows(Table::MessageTyping).len(), 1);

        match sub.next().await {
            Some(Ok(RealtimeEvent::Change(change))) => assert_eq!(change.record["is_typing"], true),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_conversations_rpc() {
        let (me, other) = (Uuid::new_v4(), Uuid::new_v4());
        let backend = MemoryBackend::new();
        backend
            .seed_rows(Table::Profiles, vec![json!({"id": other, "username": "bo"})])
            .unwrap();
        service(other, &backend).send(me, "hey", None).await.unwrap();

        let list = service(me, &backend).conversations().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].username, "bo");
        assert_eq!(list[0].unread_count, 1);
        assert!(!list[0].is_following);
    }
}
