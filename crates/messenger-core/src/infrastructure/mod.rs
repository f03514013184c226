//! Infrastructure layer
//!
//! Implementations of the domain contracts: SQLite stores, the directory
//! service client and the file uploader.

pub mod chat;
pub mod directory;
pub mod files;

pub use chat::{ChatRepository, MessageRepository};
pub use directory::{HttpDirectoryClient, StaticDirectory};
pub use files::LocalFileUploader;
