//! Application layer
//!
//! Validation and the managers that implement the chat and message operations.

pub mod services;
pub mod validators;

pub use services::{ChatLifecycleManager, MessageDeliveryManager};
pub use validators::{ChatValidation, ChatValidator, MessageValidation, MessageValidator};
