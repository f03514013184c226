//! Chat validation
//!
//! Validates chat creation input per chat type.

use crate::config::LimitsConfig;
use crate::domain::chat::{ChatCreationInfo, ChatType};
use crate::error::{Error, Result};

/// Validation policy for chat creation
pub trait ChatValidation: Send + Sync {
    fn validate_chat_creation_info(&self, info: &ChatCreationInfo) -> Result<()>;
}

/// Validator for chat creation
#[derive(Debug, Clone)]
pub struct ChatValidator {
    name_min_chars: usize,
    name_max_chars: usize,
}

impl Default for ChatValidator {
    fn default() -> Self {
        Self::from_limits(&LimitsConfig::default())
    }
}

impl ChatValidator {
    pub fn new(name_min_chars: usize, name_max_chars: usize) -> Self {
        Self {
            name_min_chars,
            name_max_chars,
        }
    }

    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self::new(limits.group_name_min_chars, limits.group_name_max_chars)
    }

    /// Validate a group chat name
    ///
    /// Rules:
    /// - Must not be blank
    /// - Must be between the configured bounds, counted in characters
    pub fn validate_group_name(&self, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(invalid("empty name for group chat"));
        }

        let chars = name.chars().count();
        if chars < self.name_min_chars {
            return Err(invalid(format!(
                "group chat name must be at least {} characters",
                self.name_min_chars
            )));
        }
        if chars > self.name_max_chars {
            return Err(invalid(format!(
                "group chat name must be {} characters or less",
                self.name_max_chars
            )));
        }

        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> Error {
    Error::InvalidChatCreationInfo(reason.into())
}

impl ChatValidation for ChatValidator {
    fn validate_chat_creation_info(&self, info: &ChatCreationInfo) -> Result<()> {
        match info.chat_type {
            ChatType::Private => {
                if !info.name.is_empty() {
                    return Err(invalid("unexpected name for private chat"));
                }
                if info.avatar.is_some() {
                    return Err(invalid("unexpected avatar for private chat"));
                }
                Ok(())
            }
            ChatType::Group => self.validate_group_name(&info.name),
        }
    }
}
