//! Chat infrastructure - SQLite persistence for chats and messages

mod repository;

pub use repository::{ChatRepository, MessageRepository};
