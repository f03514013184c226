//! Directory (profile) service contract

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Public profile fields of a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicUserInfo {
    pub id: Uuid,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: String,
}

/// Resolves user ids to display names and avatars
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Look up the given users; unknown ids are simply absent from the result
    async fn get_public_users_info(&self, user_ids: &[Uuid]) -> Result<Vec<PublicUserInfo>>;
}
