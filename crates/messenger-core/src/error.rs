//! Error types for the messenger core

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using the messenger's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Messenger error types
///
/// Infrastructure failures are wrapped in [`Error::Context`] as they travel
/// up through the managers; use [`Error::kind`] to classify an error
/// regardless of how many layers of context it carries.
#[derive(Error, Debug)]
pub enum Error {
    // Validation errors (E001-E099)
    #[error("Invalid chat creation info: {0}")]
    InvalidChatCreationInfo(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Number of messages must be greater than 0, got {0}")]
    InvalidNumMessages(i64),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Entity errors (E100-E199)
    #[error("{0} not found")]
    NotFound(String),

    #[error("User {user_id} is not a participant of chat {chat_id}")]
    NotParticipant { chat_id: Uuid, user_id: Uuid },

    #[error("User {user_id} is already in chat {chat_id}")]
    AlreadyInChat { chat_id: Uuid, user_id: Uuid },

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("Private chat {0} already has two participants")]
    ChatFull(Uuid),

    // Collaborator errors (E200-E299)
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Directory service error: {0}")]
    DirectoryError(String),

    #[error("File upload failed: {0}")]
    UploadFailed(String),

    // Database errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Malformed stored value: {0}")]
    Parse(String),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Control flow
    #[error("Operation cancelled")]
    Cancelled,

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Coarse classification of an [`Error`], stable across context wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidChatCreationInfo,
    InvalidMessage,
    InvalidNumMessages,
    InvalidArgument,
    NotFound,
    NotParticipant,
    AlreadyInChat,
    AlreadyExists,
    ChatFull,
    Cancelled,
    Upstream,
    Storage,
    Config,
}

impl Error {
    /// Wrap this error with call-site context, keeping its kind
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error underneath any context wrapping
    pub fn root(&self) -> &Error {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Context { source, .. } => source.kind(),
            Self::InvalidChatCreationInfo(_) => ErrorKind::InvalidChatCreationInfo,
            Self::InvalidMessage(_) => ErrorKind::InvalidMessage,
            Self::InvalidNumMessages(_) => ErrorKind::InvalidNumMessages,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::NotParticipant { .. } => ErrorKind::NotParticipant,
            Self::AlreadyInChat { .. } => ErrorKind::AlreadyInChat,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::ChatFull(_) => ErrorKind::ChatFull,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::NetworkError(_) | Self::DirectoryError(_) | Self::UploadFailed(_) => {
                ErrorKind::Upstream
            }
            Self::DatabaseError(_) | Self::Parse(_) | Self::Io(_) => ErrorKind::Storage,
            Self::ConfigError(_) => ErrorKind::Config,
        }
    }

    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self.root() {
            Self::InvalidChatCreationInfo(_) => "E001",
            Self::InvalidMessage(_) => "E002",
            Self::InvalidNumMessages(_) => "E003",
            Self::InvalidArgument(_) => "E004",
            Self::NotFound(_) => "E100",
            Self::NotParticipant { .. } => "E101",
            Self::AlreadyInChat { .. } => "E102",
            Self::AlreadyExists(_) => "E103",
            Self::ChatFull(_) => "E104",
            Self::NetworkError(_) => "E200",
            Self::DirectoryError(_) => "E201",
            Self::UploadFailed(_) => "E202",
            Self::DatabaseError(_) => "E400",
            Self::Parse(_) => "E401",
            Self::ConfigError(_) => "E600",
            Self::Cancelled => "E700",
            Self::Io(_) | Self::Context { .. } => "E9999",
        }
    }

    /// Whether the caller sent something the core refuses to act on
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::Upstream | ErrorKind::Storage | ErrorKind::Config | ErrorKind::Cancelled
        )
    }
}

/// Attach call-site context to fallible results
pub trait ResultExt<T> {
    fn context(self, context: &'static str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: &'static str) -> Result<T> {
        self.map_err(|e| e.context(context))
    }
}
