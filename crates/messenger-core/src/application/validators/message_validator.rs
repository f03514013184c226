//! Message validation

use crate::config::LimitsConfig;
use crate::domain::message::NewMessage;
use crate::error::{Error, Result};

/// Validation policy for outgoing messages
pub trait MessageValidation: Send + Sync {
    fn validate_message(&self, message: &NewMessage) -> Result<()>;
}

/// Validator for outgoing messages
#[derive(Debug, Clone)]
pub struct MessageValidator {
    max_text_chars: usize,
    max_attachments: usize,
}

impl Default for MessageValidator {
    fn default() -> Self {
        Self::from_limits(&LimitsConfig::default())
    }
}

impl MessageValidator {
    pub fn new(max_text_chars: usize, max_attachments: usize) -> Self {
        Self {
            max_text_chars,
            max_attachments,
        }
    }

    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self::new(limits.max_text_chars, limits.max_attachments)
    }
}

impl MessageValidation for MessageValidator {
    /// Rules:
    /// - Text or at least one attachment must be present
    /// - Text is at most `max_text_chars` characters
    /// - At most `max_attachments` attachments
    /// - Sender and chat cannot both be missing
    fn validate_message(&self, message: &NewMessage) -> Result<()> {
        if message.text.is_empty() && message.attachments.is_empty() {
            return Err(Error::InvalidMessage("message cannot be empty".to_string()));
        }

        let chars = message.text.chars().count();
        if chars > self.max_text_chars {
            return Err(Error::InvalidMessage(format!(
                "text is {} characters, limit is {}",
                chars, self.max_text_chars
            )));
        }

        if message.attachments.len() > self.max_attachments {
            return Err(Error::InvalidMessage(format!(
                "{} attachments, limit is {}",
                message.attachments.len(),
                self.max_attachments
            )));
        }

        let has_chat = message.chat_id.is_some_and(|id| !id.is_nil());
        if !has_chat && message.sender_id.is_nil() {
            return Err(Error::InvalidMessage(
                "sender ID and chat ID cannot both be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::{Attachment, AttachmentKind};
    use uuid::Uuid;

    fn to_chat(text: &str) -> NewMessage {
        NewMessage::to_chat(Uuid::new_v4(), Uuid::new_v4(), text)
    }

    #[test]
    fn test_valid_message() {
        assert!(MessageValidator::default().validate_message(&to_chat("Hello, world!")).is_ok());
    }

    #[test]
    fn test_empty_message() {
        let validator = MessageValidator::default();
        let err = validator.validate_message(&to_chat("")).unwrap_err();
        assert!(matches!(err, Error::InvalidMessage(_)));
    }

    #[test]
    fn test_whitespace_text_is_not_empty() {
        assert!(MessageValidator::default().validate_message(&to_chat("  \n")).is_ok());
    }

    #[test]
    fn test_attachment_only_message() {
        let message = to_chat("")
            .with_attachment(Attachment::new("https://cdn.example/p.png", AttachmentKind::Image));
        assert!(MessageValidator::default().validate_message(&message).is_ok());
    }

    #[test]
    fn test_text_limit_counts_characters() {
        let validator = MessageValidator::default();
        assert!(validator.validate_message(&to_chat(&"é".repeat(4096))).is_ok());
        assert!(validator.validate_message(&to_chat(&"a".repeat(4097))).is_err());
    }

    #[test]
    fn test_too_many_attachments() {
        let validator = MessageValidator::default();
        let mut message = to_chat("Message with too many attachments");
        for i in 0..11 {
            message = message.with_attachment(Attachment::new(
                format!("https://cdn.example/{i}"),
                AttachmentKind::File,
            ));
        }
        assert!(validator.validate_message(&message).is_err());

        message.attachments.pop();
        assert!(validator.validate_message(&message).is_ok());
    }

    #[test]
    fn test_missing_chat_and_sender() {
        let mut message = NewMessage::to_user(Uuid::nil(), Uuid::new_v4(), "Message without IDs");
        message.receiver_id = None;
        assert!(MessageValidator::default().validate_message(&message).is_err());
    }

    #[test]
    fn test_custom_limits() {
        let validator = MessageValidator::new(5, 0);
        assert!(validator.validate_message(&to_chat("hello")).is_ok());
        assert!(validator.validate_message(&to_chat("hello!")).is_err());
    }
}
