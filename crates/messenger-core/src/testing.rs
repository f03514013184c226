//! Shared test fixtures

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::chat::{Chat, ChatStore};
use crate::error::{Error, Result};
use crate::infrastructure::{ChatRepository, MessageRepository};
use crate::storage::Database;

/// In-memory database with both SQLite stores
pub(crate) async fn sqlite_stores() -> (Database, ChatRepository, MessageRepository) {
    let db = Database::in_memory()
        .await
        .expect("Failed to create test database");
    let chats = ChatRepository::new(db.pool().clone());
    let messages = MessageRepository::new(db.pool().clone());
    (db, chats, messages)
}

/// Chat store that delegates to SQLite but can misbehave on demand
///
/// It keeps the trait's default `create_private_chat`, so private chats are
/// provisioned step by step.
pub(crate) struct FlakyChatStore {
    inner: ChatRepository,
    reject_join: Option<Uuid>,
    stale_lookups: AtomicUsize,
}

impl FlakyChatStore {
    pub(crate) fn new(inner: ChatRepository) -> Self {
        Self {
            inner,
            reject_join: None,
            stale_lookups: AtomicUsize::new(0),
        }
    }

    /// Fail every join of this user
    pub(crate) fn rejecting_join(mut self, user_id: Uuid) -> Self {
        self.reject_join = Some(user_id);
        self
    }

    /// Report the next `count` private chat lookups as missing
    pub(crate) fn with_stale_lookups(self, count: usize) -> Self {
        self.stale_lookups.store(count, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl ChatStore for FlakyChatStore {
    async fn create_chat(&self, chat: &Chat) -> Result<()> {
        self.inner.create_chat(chat).await
    }

    async fn get_user_chats(&self, user_id: Uuid) -> Result<Vec<Chat>> {
        self.inner.get_user_chats(user_id).await
    }

    async fn get_chat_participants(&self, chat_id: Uuid) -> Result<Vec<Uuid>> {
        self.inner.get_chat_participants(chat_id).await
    }

    async fn get_chat(&self, chat_id: Uuid) -> Result<Chat> {
        self.inner.get_chat(chat_id).await
    }

    async fn get_private_chat(&self, first: Uuid, second: Uuid) -> Result<Chat> {
        let stale = self
            .stale_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            return Err(Error::NotFound("Private chat".to_string()));
        }
        self.inner.get_private_chat(first, second).await
    }

    async fn exists(&self, chat_id: Uuid) -> Result<bool> {
        self.inner.exists(chat_id).await
    }

    async fn delete_chat(&self, chat_id: Uuid) -> Result<()> {
        self.inner.delete_chat(chat_id).await
    }

    async fn is_participant(&self, chat_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.inner.is_participant(chat_id, user_id).await
    }

    async fn join_chat(&self, chat_id: Uuid, user_id: Uuid) -> Result<()> {
        if self.reject_join == Some(user_id) {
            return Err(Error::DirectoryError("membership backend unavailable".into()));
        }
        self.inner.join_chat(chat_id, user_id).await
    }

    async fn leave_chat(&self, chat_id: Uuid, user_id: Uuid) -> Result<()> {
        self.inner.leave_chat(chat_id, user_id).await
    }

    async fn get_num_unread_chats(&self, user_id: Uuid) -> Result<i64> {
        self.inner.get_num_unread_chats(user_id).await
    }
}
