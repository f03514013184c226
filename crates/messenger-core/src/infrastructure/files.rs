//! Local file uploader

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::domain::files::{FileUploader, UploadFile};
use crate::error::{Error, Result};

/// Writes uploads into a directory served under a public base URL
#[derive(Debug, Clone)]
pub struct LocalFileUploader {
    dir: PathBuf,
    public_base_url: String,
}

impl LocalFileUploader {
    pub fn new(dir: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl FileUploader for LocalFileUploader {
    async fn upload_file(&self, file: &UploadFile) -> Result<String> {
        if file.bytes.is_empty() {
            return Err(Error::UploadFailed(format!("{} is empty", file.name)));
        }

        tokio::fs::create_dir_all(&self.dir).await?;

        let stored_name = match file.extension() {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };
        tokio::fs::write(self.dir.join(&stored_name), &file.bytes).await?;

        info!(
            original = %file.name,
            stored = %stored_name,
            size = file.bytes.len(),
            "Stored upload"
        );
        Ok(format!("{}/{}", self.public_base_url, stored_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_writes_file_and_returns_url() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = LocalFileUploader::new(dir.path().join("uploads"), "https://cdn.example/files/");

        let file = UploadFile::new("avatar.PNG", "image/png", vec![137, 80, 78, 71]);
        let url = uploader.upload_file(&file).await.unwrap();

        assert!(url.starts_with("https://cdn.example/files/"));
        assert!(url.ends_with(".png"));

        let stored_name = url.rsplit('/').next().unwrap();
        let bytes = tokio::fs::read(uploader.dir().join(stored_name)).await.unwrap();
        assert_eq!(bytes, file.bytes);
    }

    #[tokio::test]
    async fn test_uploads_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = LocalFileUploader::new(dir.path(), "https://cdn.example");

        let file = UploadFile::new("same.txt", "text/plain", b"hello".to_vec());
        let first = uploader.upload_file(&file).await.unwrap();
        let second = uploader.upload_file(&file).await.unwrap();

        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_empty_upload_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = LocalFileUploader::new(dir.path(), "https://cdn.example");

        let err = uploader
            .upload_file(&UploadFile::new("empty.png", "image/png", Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UploadFailed(_)));
    }
}
