//! Messenger Core Library
//!
//! This crate provides the core of the messenger, including:
//! - Chat lifecycle (creation, listing, membership, deletion)
//! - Message delivery with lazily opened private chats
//! - Read positions and unread counts
//! - Storage (SQLite with versioned migrations)
//! - Directory and file upload clients

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, ErrorKind, Result, ResultExt};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::application::{
        ChatLifecycleManager, ChatValidator, MessageDeliveryManager, MessageValidator,
    };
    pub use crate::config::Config;
    pub use crate::domain::{
        Attachment, AttachmentKind, Chat, ChatCreationInfo, ChatType, Message, NewMessage,
        PublicUserInfo, UploadFile,
    };
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::storage::Database;
}
