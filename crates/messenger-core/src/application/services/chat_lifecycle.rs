//! Chat lifecycle manager
//!
//! Creates, lists, deletes chats and manages their membership. Listing
//! decorates private chats with the counterpart's profile and the latest
//! message, fetched concurrently and failing as a unit.

use std::sync::Arc;

use futures_util::future::try_join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::require_id;
use crate::application::validators::ChatValidation;
use crate::domain::chat::{Chat, ChatCreationInfo, ChatStore, ChatType};
use crate::domain::directory::{DirectoryClient, PublicUserInfo};
use crate::domain::files::FileUploader;
use crate::domain::message::MessageStore;
use crate::error::{Error, ErrorKind, Result, ResultExt};

/// Manager for chat lifecycle and membership operations
#[derive(Clone)]
pub struct ChatLifecycleManager {
    chats: Arc<dyn ChatStore>,
    messages: Arc<dyn MessageStore>,
    directory: Arc<dyn DirectoryClient>,
    uploader: Arc<dyn FileUploader>,
    validator: Arc<dyn ChatValidation>,
}

impl ChatLifecycleManager {
    /// Create a new chat lifecycle manager
    pub fn new(
        chats: Arc<dyn ChatStore>,
        messages: Arc<dyn MessageStore>,
        directory: Arc<dyn DirectoryClient>,
        uploader: Arc<dyn FileUploader>,
        validator: Arc<dyn ChatValidation>,
    ) -> Self {
        Self {
            chats,
            messages,
            directory,
            uploader,
            validator,
        }
    }

    // ========== Chat Lifecycle ==========

    /// Create a chat
    ///
    /// Group chats upload their avatar, when one is given, before the chat
    /// is stored. Private chats are stored as a bare shell without members.
    pub async fn create_chat(&self, info: ChatCreationInfo) -> Result<Chat> {
        self.validator.validate_chat_creation_info(&info)?;

        let chat = match info.chat_type {
            ChatType::Private => Chat::private(),
            ChatType::Group => {
                let avatar_url = match &info.avatar {
                    Some(avatar) => self
                        .uploader
                        .upload_file(avatar)
                        .await
                        .context("file_uploader.upload_file")?,
                    None => String::new(),
                };
                Chat::group(info.name, avatar_url)
            }
        };

        self.chats
            .create_chat(&chat)
            .await
            .context("chat_store.create_chat")?;

        info!(chat_id = %chat.id, chat_type = %chat.chat_type, "Created chat");
        Ok(chat)
    }

    /// All chats of a user, most recent activity first
    ///
    /// Private chats are named after the other member and carry their last
    /// message. Any failed lookup fails the whole listing.
    pub async fn get_user_chats(&self, user_id: Uuid) -> Result<Vec<Chat>> {
        require_id(user_id, "User")?;

        let chats = self
            .chats
            .get_user_chats(user_id)
            .await
            .context("chat_store.get_user_chats")?;

        let chats = try_join_all(chats.into_iter().map(|chat| self.decorate(chat, user_id))).await?;

        debug!(user_id = %user_id, count = chats.len(), "Listed user chats");
        Ok(chats)
    }

    /// Same as [`Self::get_user_chats`], abandoning the listing once `token` fires
    pub async fn get_user_chats_cancellable(
        &self,
        user_id: Uuid,
        token: &CancellationToken,
    ) -> Result<Vec<Chat>> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                info!(user_id = %user_id, "Chat listing cancelled");
                Err(Error::Cancelled)
            }
            result = self.get_user_chats(user_id) => result,
        }
    }

    async fn decorate(&self, mut chat: Chat, user_id: Uuid) -> Result<Chat> {
        if !chat.is_private() {
            return Ok(chat);
        }

        let chat_id = chat.id;
        let counterpart = async {
            let participants = self
                .chats
                .get_chat_participants(chat_id)
                .await
                .context("chat_store.get_chat_participants")?;
            self.counterpart_info(user_id, &participants).await
        };
        let last_message = async {
            self.messages
                .get_last_chat_message(chat_id)
                .await
                .context("message_store.get_last_chat_message")
        };

        let (counterpart, last_message) = tokio::try_join!(counterpart, last_message)?;

        if let Some(user) = counterpart {
            chat.name = user.display_name;
            chat.avatar_url = user.avatar_url;
        }
        chat.last_message = last_message;
        Ok(chat)
    }

    /// Profile of the first participant other than `user_id`
    ///
    /// A directory that does not know the users leaves the chat unnamed.
    async fn counterpart_info(
        &self,
        user_id: Uuid,
        participants: &[Uuid],
    ) -> Result<Option<PublicUserInfo>> {
        match self.directory.get_public_users_info(participants).await {
            Ok(users) => Ok(users.into_iter().find(|user| user.id != user_id)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.context("directory.get_public_users_info")),
        }
    }

    /// Get a chat by ID
    pub async fn get_chat(&self, chat_id: Uuid) -> Result<Chat> {
        require_id(chat_id, "Chat")?;
        self.chats.get_chat(chat_id).await.context("chat_store.get_chat")
    }

    /// Get the private chat between two users
    pub async fn get_private_chat(&self, first: Uuid, second: Uuid) -> Result<Chat> {
        require_id(first, "User")?;
        require_id(second, "User")?;
        self.chats
            .get_private_chat(first, second)
            .await
            .context("chat_store.get_private_chat")
    }

    /// Delete a chat; deleting an absent chat fails with `NotFound`
    pub async fn delete_chat(&self, chat_id: Uuid) -> Result<()> {
        require_id(chat_id, "Chat")?;
        self.ensure_exists(chat_id).await?;

        self.chats
            .delete_chat(chat_id)
            .await
            .context("chat_store.delete_chat")?;

        info!(chat_id = %chat_id, "Deleted chat");
        Ok(())
    }

    // ========== Membership ==========

    /// Add a user to a chat
    ///
    /// A private chat takes at most two members. Completing a pair that
    /// already owns another private chat fails with `AlreadyExists`.
    pub async fn join_chat(&self, chat_id: Uuid, user_id: Uuid) -> Result<()> {
        require_id(chat_id, "Chat")?;
        require_id(user_id, "User")?;

        let chat = self.chats.get_chat(chat_id).await.context("chat_store.get_chat")?;

        if self
            .chats
            .is_participant(chat_id, user_id)
            .await
            .context("chat_store.is_participant")?
        {
            return Err(Error::AlreadyInChat { chat_id, user_id });
        }

        if chat.is_private() {
            let participants = self
                .chats
                .get_chat_participants(chat_id)
                .await
                .context("chat_store.get_chat_participants")?;
            if participants.len() >= 2 {
                return Err(Error::ChatFull(chat_id));
            }
        }

        self.chats
            .join_chat(chat_id, user_id)
            .await
            .context("chat_store.join_chat")?;

        info!(chat_id = %chat_id, user_id = %user_id, "User joined chat");
        Ok(())
    }

    /// Remove a user from a chat; a non-member fails with `NotFound`
    pub async fn leave_chat(&self, chat_id: Uuid, user_id: Uuid) -> Result<()> {
        require_id(chat_id, "Chat")?;
        require_id(user_id, "User")?;
        self.ensure_exists(chat_id).await?;

        if !self
            .chats
            .is_participant(chat_id, user_id)
            .await
            .context("chat_store.is_participant")?
        {
            return Err(Error::NotFound(format!(
                "Membership of user {} in chat {}",
                user_id, chat_id
            )));
        }

        self.chats
            .leave_chat(chat_id, user_id)
            .await
            .context("chat_store.leave_chat")?;

        info!(chat_id = %chat_id, user_id = %user_id, "User left chat");
        Ok(())
    }

    /// Member ids of a chat
    pub async fn get_chat_participants(&self, chat_id: Uuid) -> Result<Vec<Uuid>> {
        require_id(chat_id, "Chat")?;
        self.chats
            .get_chat_participants(chat_id)
            .await
            .context("chat_store.get_chat_participants")
    }

    /// Number of the user's chats with messages they have not read
    pub async fn get_num_unread_chats(&self, user_id: Uuid) -> Result<i64> {
        require_id(user_id, "User")?;
        self.chats
            .get_num_unread_chats(user_id)
            .await
            .context("chat_store.get_num_unread_chats")
    }

    async fn ensure_exists(&self, chat_id: Uuid) -> Result<()> {
        if !self.chats.exists(chat_id).await.context("chat_store.exists")? {
            return Err(Error::NotFound(format!("Chat {}", chat_id)));
        }
        Ok(())
    }
}
