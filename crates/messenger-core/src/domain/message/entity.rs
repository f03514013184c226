//! Message entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a client should render an attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    #[default]
    File,
    Image,
    Video,
    Audio,
}

impl AttachmentKind {
    /// Convert to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentKind::File => "file",
            AttachmentKind::Image => "image",
            AttachmentKind::Video => "video",
            AttachmentKind::Audio => "audio",
        }
    }

    /// Parse from database string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(AttachmentKind::File),
            "image" => Some(AttachmentKind::Image),
            "video" => Some(AttachmentKind::Video),
            "audio" => Some(AttachmentKind::Audio),
            _ => None,
        }
    }
}

/// An already-uploaded file referenced by a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    #[serde(default)]
    pub kind: AttachmentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Attachment {
    pub fn new(url: impl Into<String>, kind: AttachmentKind) -> Self {
        Self {
            url: url.into(),
            kind,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A stored chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Create a message in a known chat, stamped now
    pub fn new(chat_id: Uuid, sender_id: Uuid, text: impl Into<String>) -> Self {
        Self::at(chat_id, sender_id, text, Utc::now())
    }

    /// Create a message with an explicit creation time
    pub fn at(
        chat_id: Uuid,
        sender_id: Uuid,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            chat_id,
            sender_id,
            text: text.into(),
            attachments: Vec::new(),
            created_at,
            updated_at: created_at,
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// A message as submitted by a sender, before its chat is resolved
///
/// Either `chat_id` names the target chat, or `receiver_id` names the other
/// side of a private conversation that may not exist yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    #[serde(default)]
    pub chat_id: Option<Uuid>,
    pub sender_id: Uuid,
    #[serde(default)]
    pub receiver_id: Option<Uuid>,
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl NewMessage {
    /// Address a message to an existing chat
    pub fn to_chat(chat_id: Uuid, sender_id: Uuid, text: impl Into<String>) -> Self {
        Self {
            chat_id: Some(chat_id),
            sender_id,
            receiver_id: None,
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    /// Address a message to a user, opening a private chat if needed
    pub fn to_user(sender_id: Uuid, receiver_id: Uuid, text: impl Into<String>) -> Self {
        Self {
            chat_id: None,
            sender_id,
            receiver_id: Some(receiver_id),
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Materialize into a stored message for the resolved chat
    pub fn into_message(self, chat_id: Uuid, now: DateTime<Utc>) -> Message {
        Message {
            id: Uuid::new_v4(),
            chat_id,
            sender_id: self.sender_id,
            text: self.text,
            attachments: self.attachments,
            created_at: now,
            updated_at: now,
        }
    }
}
