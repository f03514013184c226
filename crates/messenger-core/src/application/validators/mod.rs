//! Application validators
//!
//! Input validation for chat creation and message delivery. The managers
//! depend on the traits so deployments can swap in their own policy.

pub mod chat_validator;
pub mod message_validator;

pub use chat_validator::{ChatValidation, ChatValidator};
pub use message_validator::{MessageValidation, MessageValidator};
