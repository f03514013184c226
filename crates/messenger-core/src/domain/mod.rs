//! Domain layer
//!
//! Value types of the messenger and the traits of the collaborators the
//! services depend on.

pub mod chat;
pub mod directory;
pub mod files;
pub mod message;

pub use chat::{Chat, ChatCreationInfo, ChatStore, ChatType};
pub use directory::{DirectoryClient, PublicUserInfo};
pub use files::{FileUploader, UploadFile};
pub use message::{Attachment, AttachmentKind, Message, MessageStore, NewMessage};
