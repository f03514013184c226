//! Repository trait for message persistence and read positions

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;

use super::entity::Message;

/// Repository trait for messages, attachments and per-member read positions
#[async_trait]
pub trait MessageStore: Send + Sync {
    // ========== Messages ==========

    /// Get a message by ID, `NotFound` if absent
    async fn get_message_by_id(&self, message_id: Uuid) -> Result<Message>;

    /// Up to `limit` messages created strictly before `before`, newest first
    async fn get_messages_for_chat_older(
        &self,
        chat_id: Uuid,
        limit: u32,
        before: DateTime<Utc>,
    ) -> Result<Vec<Message>>;

    /// The newest message of a chat, `None` for an empty chat
    async fn get_last_chat_message(&self, chat_id: Uuid) -> Result<Option<Message>>;

    /// Persist a message with its attachments and bump the chat's last activity
    async fn save_message(&self, message: &Message) -> Result<()>;

    /// Delete a message by ID
    async fn delete_message(&self, message_id: Uuid) -> Result<()>;

    // ========== Read positions ==========

    /// The member's own read position, `None` if never read
    async fn get_last_read_ts(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>>;

    /// The latest read position among the other members of the chat
    async fn get_last_read_by_others(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>>;

    /// Overwrite the member's read position
    async fn update_last_read_ts(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        timestamp: DateTime<Utc>,
    ) -> Result<()>;

    /// Messages created after the member's read position (all, if never read)
    async fn get_num_unread_messages(&self, chat_id: Uuid, user_id: Uuid) -> Result<i64>;
}
