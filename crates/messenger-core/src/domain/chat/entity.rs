//! Chat entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::files::UploadFile;
use crate::domain::message::Message;

/// Kind of conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    /// Unnamed two-party thread keyed by the unordered participant pair
    Private,
    /// Named, avatar-bearing thread with arbitrary membership size
    Group,
}

impl ChatType {
    /// Convert to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatType::Private => "private",
            ChatType::Group => "group",
        }
    }

    /// Parse from database string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "private" => Some(ChatType::Private),
            "group" => Some(ChatType::Group),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A conversation as seen by one of its members
///
/// `name` and `avatar_url` are empty for private chats at rest; the chat
/// list fills them with the counterpart's display info.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub chat_type: ChatType,
    pub name: String,
    pub avatar_url: String,
    pub created_at: DateTime<Utc>,
    /// Last activity; bumped whenever a message is saved
    pub updated_at: DateTime<Utc>,
    pub last_read_by_me: Option<DateTime<Utc>>,
    pub last_read_by_other: Option<DateTime<Utc>>,
    pub last_message: Option<Message>,
}

impl Chat {
    /// Create a bare private chat shell
    pub fn private() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            chat_type: ChatType::Private,
            name: String::new(),
            avatar_url: String::new(),
            created_at: now,
            updated_at: now,
            last_read_by_me: None,
            last_read_by_other: None,
            last_message: None,
        }
    }

    /// Create a named group chat
    pub fn group(name: impl Into<String>, avatar_url: impl Into<String>) -> Self {
        Self {
            chat_type: ChatType::Group,
            name: name.into(),
            avatar_url: avatar_url.into(),
            ..Self::private()
        }
    }

    pub fn is_private(&self) -> bool {
        self.chat_type == ChatType::Private
    }
}

/// Input for creating a chat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCreationInfo {
    pub chat_type: ChatType,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<UploadFile>,
}

impl ChatCreationInfo {
    pub fn private() -> Self {
        Self {
            chat_type: ChatType::Private,
            name: String::new(),
            avatar: None,
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self {
            chat_type: ChatType::Group,
            name: name.into(),
            avatar: None,
        }
    }

    /// Attach an avatar to upload on creation
    pub fn with_avatar(mut self, avatar: UploadFile) -> Self {
        self.avatar = Some(avatar);
        self
    }
}

/// Canonical key of an unordered user pair, used to keep one private chat per pair
pub fn pair_key(a: Uuid, b: Uuid) -> String {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    format!("{}:{}", low, high)
}
