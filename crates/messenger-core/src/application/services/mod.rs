//! Application services
//!
//! Orchestrate the stores, the directory and the uploader behind the
//! chat and message operations.

pub mod chat_lifecycle;
pub mod message_delivery;

pub use chat_lifecycle::ChatLifecycleManager;
pub use message_delivery::MessageDeliveryManager;

use uuid::Uuid;

use crate::error::{Error, Result};

/// Reject the nil id, which no stored entity ever carries
pub(crate) fn require_id(id: Uuid, what: &str) -> Result<()> {
    if id.is_nil() {
        return Err(Error::InvalidArgument(format!("{} ID must not be nil", what)));
    }
    Ok(())
}
