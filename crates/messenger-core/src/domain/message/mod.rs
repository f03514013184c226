//! Message domain module
//!
//! - **Entities**: `Message`, `NewMessage`, `Attachment`
//! - **Repository**: `MessageStore` trait for messages and read positions

pub mod entity;
pub mod repository_trait;

pub use entity::{Attachment, AttachmentKind, Message, NewMessage};
pub use repository_trait::MessageStore;
