//! Chat domain module
//!
//! - **Entities**: `Chat`, `ChatType`, `ChatCreationInfo`
//! - **Repository**: `ChatStore` trait for chat rows and membership

pub mod entity;
pub mod repository_trait;

pub use entity::{Chat, ChatCreationInfo, ChatType, pair_key};
pub use repository_trait::ChatStore;
