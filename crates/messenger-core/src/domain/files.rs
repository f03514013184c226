//! File upload contract

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A file submitted for upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Lowercased extension of the original file name, if any
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|ext| ext.to_ascii_lowercase())
    }
}

/// Stores uploaded files and hands back a public URL
#[async_trait]
pub trait FileUploader: Send + Sync {
    async fn upload_file(&self, file: &UploadFile) -> Result<String>;
}
