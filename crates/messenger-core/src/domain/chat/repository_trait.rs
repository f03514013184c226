//! Repository trait for chat persistence
//!
//! Abstracts the durable chat rows and their membership table. The SQLite
//! implementation lives in `infrastructure::chat`.

use async_trait::async_trait;
use tracing::{error, warn};
use uuid::Uuid;

use crate::error::Result;

use super::entity::Chat;

/// Repository trait for chats and chat membership
#[async_trait]
pub trait ChatStore: Send + Sync {
    // ========== Chat CRUD ==========

    /// Persist a new chat row without members
    async fn create_chat(&self, chat: &Chat) -> Result<()>;

    /// Persist a private chat together with both of its members
    ///
    /// Stores with transactions override this to do all three writes
    /// atomically. The default runs the steps in order and undoes the
    /// completed ones in reverse if a later step fails; undo failures are
    /// logged and the original error is returned.
    async fn create_private_chat(&self, chat: &Chat, first: Uuid, second: Uuid) -> Result<()> {
        let mut completed = Vec::with_capacity(3);

        self.create_chat(chat).await?;
        completed.push(ProvisionStep::Created);

        for user_id in [first, second] {
            if let Err(err) = self.join_chat(chat.id, user_id).await {
                warn!(
                    chat_id = %chat.id,
                    user_id = %user_id,
                    error = %err,
                    "Private chat provisioning failed, compensating"
                );
                unwind(self, chat.id, completed).await;
                return Err(err);
            }
            completed.push(ProvisionStep::Joined(user_id));
        }

        Ok(())
    }

    /// All chats the user is a member of, most recent activity first
    ///
    /// Each chat carries the user's own read position and the latest read
    /// position among the other members.
    async fn get_user_chats(&self, user_id: Uuid) -> Result<Vec<Chat>>;

    /// Member ids of a chat
    async fn get_chat_participants(&self, chat_id: Uuid) -> Result<Vec<Uuid>>;

    /// Get a chat by ID, `NotFound` if absent
    async fn get_chat(&self, chat_id: Uuid) -> Result<Chat>;

    /// Get the private chat shared by two users, `NotFound` if absent
    async fn get_private_chat(&self, first: Uuid, second: Uuid) -> Result<Chat>;

    /// Check if a chat exists
    async fn exists(&self, chat_id: Uuid) -> Result<bool>;

    /// Delete a chat with its membership and messages
    async fn delete_chat(&self, chat_id: Uuid) -> Result<()>;

    // ========== Membership ==========

    /// Check if a user is currently a member of a chat
    async fn is_participant(&self, chat_id: Uuid, user_id: Uuid) -> Result<bool>;

    /// Add a member
    ///
    /// Completing the pair of a private chat claims the pair's key; a pair
    /// that already owns a private chat fails with `AlreadyExists`.
    async fn join_chat(&self, chat_id: Uuid, user_id: Uuid) -> Result<()>;

    /// Remove a member
    async fn leave_chat(&self, chat_id: Uuid, user_id: Uuid) -> Result<()>;

    /// Number of the user's chats holding a message newer than their read position
    async fn get_num_unread_chats(&self, user_id: Uuid) -> Result<i64>;
}

/// A completed write of private chat provisioning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProvisionStep {
    Created,
    Joined(Uuid),
}

/// Undo completed provisioning steps, newest first
async fn unwind<S: ChatStore + ?Sized>(store: &S, chat_id: Uuid, completed: Vec<ProvisionStep>) {
    for step in completed.into_iter().rev() {
        let undo = match step {
            ProvisionStep::Joined(user_id) => store.leave_chat(chat_id, user_id).await,
            ProvisionStep::Created => store.delete_chat(chat_id).await,
        };
        if let Err(err) = undo {
            error!(chat_id = %chat_id, step = ?step, error = %err, "Compensation step failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Verify trait is object-safe
    fn _assert_object_safe(_: &dyn ChatStore) {}
}
