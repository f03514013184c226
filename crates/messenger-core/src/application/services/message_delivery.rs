//! Message delivery manager
//!
//! Validates and stores messages, opening the private chat between two
//! users on their first message, and tracks per-member read positions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::require_id;
use crate::application::validators::MessageValidation;
use crate::domain::chat::{Chat, ChatStore};
use crate::domain::message::{Message, MessageStore, NewMessage};
use crate::error::{Error, ErrorKind, Result, ResultExt};

/// Manager for message delivery and read positions
#[derive(Clone)]
pub struct MessageDeliveryManager {
    chats: Arc<dyn ChatStore>,
    messages: Arc<dyn MessageStore>,
    validator: Arc<dyn MessageValidation>,
}

impl MessageDeliveryManager {
    /// Create a new message delivery manager
    pub fn new(
        chats: Arc<dyn ChatStore>,
        messages: Arc<dyn MessageStore>,
        validator: Arc<dyn MessageValidation>,
    ) -> Self {
        Self {
            chats,
            messages,
            validator,
        }
    }

    // ========== Delivery ==========

    /// Deliver a message and return the stored copy
    ///
    /// Without a chat id the message goes to the private chat between sender
    /// and receiver, which is created with both members if it doesn't exist.
    pub async fn send_message(&self, message: NewMessage) -> Result<Message> {
        self.validator.validate_message(&message)?;
        require_id(message.sender_id, "Sender")?;

        let chat_id = match message.chat_id.filter(|id| !id.is_nil()) {
            Some(chat_id) => {
                if !self.chats.exists(chat_id).await.context("chat_store.exists")? {
                    return Err(Error::NotFound(format!("Chat {}", chat_id)));
                }
                self.ensure_participant(chat_id, message.sender_id).await?;
                chat_id
            }
            None => {
                self.resolve_private_chat(message.sender_id, message.receiver_id)
                    .await?
            }
        };

        let message = message.into_message(chat_id, Utc::now());
        self.messages
            .save_message(&message)
            .await
            .context("message_store.save_message")?;

        let stored = self
            .messages
            .get_message_by_id(message.id)
            .await
            .context("message_store.get_message_by_id")?;

        info!(
            message_id = %stored.id,
            chat_id = %stored.chat_id,
            sender_id = %stored.sender_id,
            attachments = stored.attachments.len(),
            "Delivered message"
        );
        Ok(stored)
    }

    /// Find or open the private chat between sender and receiver
    async fn resolve_private_chat(&self, sender_id: Uuid, receiver_id: Option<Uuid>) -> Result<Uuid> {
        let receiver_id = receiver_id.filter(|id| !id.is_nil()).ok_or_else(|| {
            Error::InvalidArgument("either a chat ID or a receiver ID is required".to_string())
        })?;
        if receiver_id == sender_id {
            return Err(Error::InvalidArgument(
                "cannot open a private chat with oneself".to_string(),
            ));
        }

        match self.chats.get_private_chat(sender_id, receiver_id).await {
            Ok(chat) => return Ok(chat.id),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.context("chat_store.get_private_chat")),
        }

        let chat = Chat::private();
        match self
            .chats
            .create_private_chat(&chat, sender_id, receiver_id)
            .await
        {
            Ok(()) => {
                info!(
                    chat_id = %chat.id,
                    sender_id = %sender_id,
                    receiver_id = %receiver_id,
                    "Opened private chat"
                );
                Ok(chat.id)
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                // Another sender opened the chat for this pair first
                warn!(
                    sender_id = %sender_id,
                    receiver_id = %receiver_id,
                    "Private chat opened concurrently, delivering into it"
                );
                match self.chats.get_private_chat(sender_id, receiver_id).await {
                    Ok(existing) => Ok(existing.id),
                    Err(lookup) if lookup.kind() == ErrorKind::NotFound => {
                        Err(err.context("chat_store.create_private_chat"))
                    }
                    Err(lookup) => Err(lookup.context("chat_store.get_private_chat")),
                }
            }
            Err(err) => Err(err.context("chat_store.create_private_chat")),
        }
    }

    // ========== Queries ==========

    /// Up to `limit` messages created strictly before `before`, newest first
    pub async fn get_messages_for_chat_older(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        limit: i64,
        before: DateTime<Utc>,
    ) -> Result<Vec<Message>> {
        if limit <= 0 {
            return Err(Error::InvalidNumMessages(limit));
        }
        require_id(chat_id, "Chat")?;
        require_id(user_id, "User")?;
        self.ensure_participant(chat_id, user_id).await?;

        let limit = u32::try_from(limit).unwrap_or(u32::MAX);
        let messages = self
            .messages
            .get_messages_for_chat_older(chat_id, limit, before)
            .await
            .context("message_store.get_messages_for_chat_older")?;

        debug!(chat_id = %chat_id, count = messages.len(), "Fetched message page");
        Ok(messages)
    }

    pub async fn get_message_by_id(&self, message_id: Uuid) -> Result<Message> {
        require_id(message_id, "Message")?;
        self.messages
            .get_message_by_id(message_id)
            .await
            .context("message_store.get_message_by_id")
    }

    /// Latest message of a chat, `None` when the chat has none
    pub async fn get_last_chat_message(&self, chat_id: Uuid) -> Result<Option<Message>> {
        require_id(chat_id, "Chat")?;
        self.messages
            .get_last_chat_message(chat_id)
            .await
            .context("message_store.get_last_chat_message")
    }

    /// Delete a message by id
    ///
    /// Any caller may delete any message; ownership is not checked here.
    pub async fn delete_message(&self, message_id: Uuid) -> Result<()> {
        require_id(message_id, "Message")?;
        self.messages
            .delete_message(message_id)
            .await
            .context("message_store.delete_message")?;

        info!(message_id = %message_id, "Deleted message");
        Ok(())
    }

    // ========== Read positions ==========

    /// Move the member's read position to `timestamp`, even backwards
    pub async fn update_last_read_ts(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        require_id(chat_id, "Chat")?;
        require_id(user_id, "User")?;
        self.ensure_participant(chat_id, user_id).await?;

        self.messages
            .update_last_read_ts(chat_id, user_id, timestamp)
            .await
            .context("message_store.update_last_read_ts")?;

        debug!(chat_id = %chat_id, user_id = %user_id, read_at = %timestamp, "Updated read position");
        Ok(())
    }

    /// The member's own read position, `None` if they never read the chat
    pub async fn get_last_read_ts(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>> {
        require_id(chat_id, "Chat")?;
        require_id(user_id, "User")?;
        self.ensure_participant(chat_id, user_id).await?;

        self.messages
            .get_last_read_ts(chat_id, user_id)
            .await
            .context("message_store.get_last_read_ts")
    }

    /// Latest read position among the other members of the chat
    pub async fn get_last_read_by_others(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>> {
        require_id(chat_id, "Chat")?;
        require_id(user_id, "User")?;
        self.ensure_participant(chat_id, user_id).await?;

        self.messages
            .get_last_read_by_others(chat_id, user_id)
            .await
            .context("message_store.get_last_read_by_others")
    }

    /// Messages newer than the member's read position; all of them if never read
    pub async fn get_num_unread_messages(&self, chat_id: Uuid, user_id: Uuid) -> Result<i64> {
        require_id(chat_id, "Chat")?;
        require_id(user_id, "User")?;
        self.ensure_participant(chat_id, user_id).await?;

        self.messages
            .get_num_unread_messages(chat_id, user_id)
            .await
            .context("message_store.get_num_unread_messages")
    }

    async fn ensure_participant(&self, chat_id: Uuid, user_id: Uuid) -> Result<()> {
        if !self
            .chats
            .is_participant(chat_id, user_id)
            .await
            .context("chat_store.is_participant")?
        {
            return Err(Error::NotParticipant { chat_id, user_id });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::validators::MessageValidator;
    use crate::domain::message::{Attachment, AttachmentKind};
    use crate::infrastructure::{ChatRepository, MessageRepository};
    use crate::storage::Database;
    use crate::testing::{FlakyChatStore, sqlite_stores};
    use chrono::Duration;

    struct Fixture {
        _db: Database,
        manager: MessageDeliveryManager,
        chats: ChatRepository,
        messages: MessageRepository,
    }

    fn manager_over(chats: Arc<dyn ChatStore>, messages: &MessageRepository) -> MessageDeliveryManager {
        MessageDeliveryManager::new(
            chats,
            Arc::new(messages.clone()),
            Arc::new(MessageValidator::default()),
        )
    }

    async fn fixture() -> Fixture {
        let (db, chats, messages) = sqlite_stores().await;
        let manager = manager_over(Arc::new(chats.clone()), &messages);
        Fixture {
            _db: db,
            manager,
            chats,
            messages,
        }
    }

    async fn group_with(f: &Fixture, members: &[Uuid]) -> Uuid {
        let chat = Chat::group("Rustaceans", "");
        f.chats.create_chat(&chat).await.unwrap();
        for member in members {
            f.chats.join_chat(chat.id, *member).await.unwrap();
        }
        chat.id
    }

    fn soon() -> DateTime<Utc> {
        Utc::now() + Duration::seconds(5)
    }

    // ========== Delivery ==========

    #[tokio::test]
    async fn test_first_message_opens_private_chat() {
        let f = fixture().await;
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let sent = f
            .manager
            .send_message(NewMessage::to_user(alice, bob, "hi bob"))
            .await
            .unwrap();

        let chat = f.chats.get_chat(sent.chat_id).await.unwrap();
        assert!(chat.is_private());

        let participants = f.chats.get_chat_participants(chat.id).await.unwrap();
        assert_eq!(participants.len(), 2);
        assert!(participants.contains(&alice) && participants.contains(&bob));

        let history = f
            .manager
            .get_messages_for_chat_older(chat.id, alice, 10, soon())
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, sent.id);
        assert_eq!(history[0].text, "hi bob");
    }

    #[tokio::test]
    async fn test_repeated_messages_reuse_private_chat() {
        let f = fixture().await;
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let first = f
            .manager
            .send_message(NewMessage::to_user(alice, bob, "one"))
            .await
            .unwrap();
        let second = f
            .manager
            .send_message(NewMessage::to_user(alice, bob, "two"))
            .await
            .unwrap();
        let reply = f
            .manager
            .send_message(NewMessage::to_user(bob, alice, "three"))
            .await
            .unwrap();

        assert_eq!(first.chat_id, second.chat_id);
        assert_eq!(first.chat_id, reply.chat_id);
        assert_eq!(f.chats.get_user_chats(alice).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_messages_share_a_chat() {
        let f = fixture().await;
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let (a, b) = tokio::join!(
            f.manager.send_message(NewMessage::to_user(alice, bob, "hi")),
            f.manager.send_message(NewMessage::to_user(bob, alice, "hey")),
        );

        assert_eq!(a.unwrap().chat_id, b.unwrap().chat_id);
        assert_eq!(f.chats.get_user_chats(alice).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_lost_race_delivers_into_winning_chat() {
        let (_db, chats, messages) = sqlite_stores().await;
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let winner = Chat::private();
        chats.create_private_chat(&winner, alice, bob).await.unwrap();

        // The first lookup misses the winner, so the sender tries to open its own chat
        let flaky = FlakyChatStore::new(chats.clone()).with_stale_lookups(1);
        let manager = manager_over(Arc::new(flaky), &messages);

        let sent = manager
            .send_message(NewMessage::to_user(alice, bob, "hi"))
            .await
            .unwrap();

        assert_eq!(sent.chat_id, winner.id);
        assert_eq!(chats.get_user_chats(alice).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_provisioning_leaves_no_chat() {
        let (_db, chats, messages) = sqlite_stores().await;
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let flaky = FlakyChatStore::new(chats.clone()).rejecting_join(bob);
        let manager = manager_over(Arc::new(flaky), &messages);

        let err = manager
            .send_message(NewMessage::to_user(alice, bob, "hi"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert!(chats.get_user_chats(alice).await.unwrap().is_empty());
        assert_eq!(
            chats.get_private_chat(alice, bob).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_send_into_chat_requires_membership() {
        let f = fixture().await;
        let (alice, mallory) = (Uuid::new_v4(), Uuid::new_v4());
        let chat_id = group_with(&f, &[alice]).await;

        let err = f
            .manager
            .send_message(NewMessage::to_chat(chat_id, mallory, "let me in"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotParticipant);

        let err = f
            .manager
            .send_message(NewMessage::to_chat(Uuid::new_v4(), alice, "anyone?"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_send_returns_stored_copy() {
        let f = fixture().await;
        let alice = Uuid::new_v4();
        let chat_id = group_with(&f, &[alice]).await;

        let sent = f
            .manager
            .send_message(
                NewMessage::to_chat(chat_id, alice, "with files")
                    .with_attachment(Attachment::new("https://cdn.example/a.png", AttachmentKind::Image)),
            )
            .await
            .unwrap();

        assert_eq!(f.messages.get_message_by_id(sent.id).await.unwrap(), sent);
        assert_eq!(sent.attachments.len(), 1);

        let chat = f.chats.get_chat(chat_id).await.unwrap();
        assert_eq!(chat.updated_at, sent.created_at);
    }

    #[tokio::test]
    async fn test_invalid_messages_rejected() {
        let f = fixture().await;
        let alice = Uuid::new_v4();

        let err = f
            .manager
            .send_message(NewMessage::to_user(alice, Uuid::new_v4(), ""))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidMessage);

        let err = f
            .manager
            .send_message(NewMessage::to_user(alice, Uuid::new_v4(), "x".repeat(4097)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidMessage);

        let err = f
            .manager
            .send_message(NewMessage::to_user(alice, alice, "me, myself"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let mut no_receiver = NewMessage::to_user(alice, Uuid::new_v4(), "to whom?");
        no_receiver.receiver_id = None;
        let err = f.manager.send_message(no_receiver).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        assert!(f.chats.get_user_chats(alice).await.unwrap().is_empty());
    }

    // ========== Queries ==========

    #[tokio::test]
    async fn test_history_checks_limit_before_membership() {
        let f = fixture().await;
        let chat_id = group_with(&f, &[Uuid::new_v4()]).await;
        let stranger = Uuid::new_v4();

        for limit in [0, -3] {
            let err = f
                .manager
                .get_messages_for_chat_older(chat_id, stranger, limit, soon())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidNumMessages);
        }

        let err = f
            .manager
            .get_messages_for_chat_older(chat_id, stranger, 10, soon())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotParticipant);
    }

    #[tokio::test]
    async fn test_history_pages_backwards() {
        let f = fixture().await;
        let alice = Uuid::new_v4();
        let chat_id = group_with(&f, &[alice]).await;

        let base = Utc::now() - Duration::hours(1);
        for i in 0..6 {
            f.messages
                .save_message(&Message::at(chat_id, alice, format!("m{i}"), base + Duration::minutes(i)))
                .await
                .unwrap();
        }

        let newest = f
            .manager
            .get_messages_for_chat_older(chat_id, alice, 4, soon())
            .await
            .unwrap();
        assert_eq!(newest.len(), 4);
        assert_eq!(newest[0].text, "m5");

        let older = f
            .manager
            .get_messages_for_chat_older(chat_id, alice, 4, newest[3].created_at)
            .await
            .unwrap();
        let texts: Vec<_> = older.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["m1", "m0"]);
    }

    #[tokio::test]
    async fn test_last_message_and_delete() {
        let f = fixture().await;
        let alice = Uuid::new_v4();
        let chat_id = group_with(&f, &[alice]).await;

        assert!(f.manager.get_last_chat_message(chat_id).await.unwrap().is_none());

        let sent = f
            .manager
            .send_message(NewMessage::to_chat(chat_id, alice, "soon gone"))
            .await
            .unwrap();
        assert_eq!(
            f.manager.get_last_chat_message(chat_id).await.unwrap().map(|m| m.id),
            Some(sent.id)
        );

        f.manager.delete_message(sent.id).await.unwrap();

        let err = f.manager.get_message_by_id(sent.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(f.manager.get_last_chat_message(chat_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_nil_ids_rejected() {
        let f = fixture().await;

        for err in [
            f.manager.get_message_by_id(Uuid::nil()).await.unwrap_err(),
            f.manager.get_last_chat_message(Uuid::nil()).await.unwrap_err(),
            f.manager.delete_message(Uuid::nil()).await.unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }

    // ========== Read positions ==========

    #[tokio::test]
    async fn test_read_position_last_write_wins() {
        let f = fixture().await;
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let chat_id = group_with(&f, &[alice, bob]).await;

        assert_eq!(f.manager.get_last_read_ts(chat_id, alice).await.unwrap(), None);

        let later = DateTime::from_timestamp(1_700_000_600, 0).unwrap();
        let earlier = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        f.manager.update_last_read_ts(chat_id, alice, later).await.unwrap();
        assert_eq!(f.manager.get_last_read_ts(chat_id, alice).await.unwrap(), Some(later));

        f.manager.update_last_read_ts(chat_id, alice, earlier).await.unwrap();
        assert_eq!(f.manager.get_last_read_ts(chat_id, alice).await.unwrap(), Some(earlier));

        assert_eq!(
            f.manager.get_last_read_by_others(chat_id, bob).await.unwrap(),
            Some(earlier)
        );
        assert_eq!(f.manager.get_last_read_by_others(chat_id, alice).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_positions_are_participant_gated() {
        let f = fixture().await;
        let chat_id = group_with(&f, &[Uuid::new_v4()]).await;
        let stranger = Uuid::new_v4();

        for err in [
            f.manager
                .update_last_read_ts(chat_id, stranger, Utc::now())
                .await
                .unwrap_err(),
            f.manager.get_last_read_ts(chat_id, stranger).await.unwrap_err(),
            f.manager.get_last_read_by_others(chat_id, stranger).await.unwrap_err(),
            f.manager.get_num_unread_messages(chat_id, stranger).await.unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::NotParticipant);
        }
    }

    #[tokio::test]
    async fn test_unread_messages() {
        let f = fixture().await;
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let mut last = None;
        for text in ["one", "two", "three"] {
            last = Some(
                f.manager
                    .send_message(NewMessage::to_user(bob, alice, text))
                    .await
                    .unwrap(),
            );
        }
        let last = last.unwrap();

        // Never read: everything is unread
        assert_eq!(f.manager.get_num_unread_messages(last.chat_id, alice).await.unwrap(), 3);

        f.manager
            .update_last_read_ts(last.chat_id, alice, last.created_at)
            .await
            .unwrap();
        assert_eq!(f.manager.get_num_unread_messages(last.chat_id, alice).await.unwrap(), 0);
    }
}
