//! Directory service clients
//!
//! `HttpDirectoryClient` talks to the profile service over JSON;
//! `StaticDirectory` serves a fixed in-memory set of profiles.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::domain::directory::{DirectoryClient, PublicUserInfo};
use crate::error::{Error, Result};

#[derive(Debug, Serialize)]
struct PublicInfoRequest<'a> {
    user_ids: &'a [Uuid],
}

/// Directory client backed by the profile service's HTTP API
#[derive(Debug, Clone)]
pub struct HttpDirectoryClient {
    client: Client,
    base_url: String,
}

impl HttpDirectoryClient {
    /// Create a client for the service at `base_url`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl DirectoryClient for HttpDirectoryClient {
    async fn get_public_users_info(&self, user_ids: &[Uuid]) -> Result<Vec<PublicUserInfo>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(format!("{}/users/public-info", self.base_url))
            .json(&PublicInfoRequest { user_ids })
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let users: Vec<PublicUserInfo> = response.json().await?;
                debug!(requested = user_ids.len(), found = users.len(), "Resolved public user info");
                Ok(users)
            }
            StatusCode::NOT_FOUND => Err(Error::NotFound(format!("Users {:?}", user_ids))),
            status => Err(Error::DirectoryError(format!(
                "unexpected status {} from {}",
                status, self.base_url
            ))),
        }
    }
}

/// Directory serving a fixed set of profiles
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    users: HashMap<Uuid, PublicUserInfo>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a profile
    pub fn with_user(mut self, user: PublicUserInfo) -> Self {
        self.users.insert(user.id, user);
        self
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl DirectoryClient for StaticDirectory {
    async fn get_public_users_info(&self, user_ids: &[Uuid]) -> Result<Vec<PublicUserInfo>> {
        Ok(user_ids
            .iter()
            .filter_map(|id| self.users.get(id).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn profile(name: &str) -> PublicUserInfo {
        PublicUserInfo {
            id: Uuid::new_v4(),
            display_name: name.to_string(),
            avatar_url: format!("https://cdn.example/{name}.png"),
        }
    }

    /// Serve exactly one HTTP request with a canned response, returning the request body
    async fn serve_once(status_line: &'static str, body: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            let request_body = loop {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let length = text[..split]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    let body = &text[split + 4..];
                    if body.len() >= length {
                        break body.to_string();
                    }
                }
                if n == 0 {
                    break String::new();
                }
            };

            let response = format!(
                "{status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            request_body
        });

        (format!("http://{addr}"), handle)
    }

    #[tokio::test]
    async fn test_static_directory_returns_known_users() {
        let alice = profile("alice");
        let directory = StaticDirectory::new().with_user(alice.clone());

        let found = directory
            .get_public_users_info(&[alice.id, Uuid::new_v4()])
            .await
            .unwrap();

        assert_eq!(found, vec![alice]);
        assert_eq!(directory.len(), 1);
    }

    #[tokio::test]
    async fn test_http_client_posts_ids_and_decodes_profiles() {
        let alice = profile("alice");
        let payload = serde_json::to_string(&vec![alice.clone()]).unwrap();
        let (base_url, server) = serve_once("HTTP/1.1 200 OK", payload).await;

        let client = HttpDirectoryClient::new(format!("{base_url}/"), Duration::from_secs(5)).unwrap();
        let found = client.get_public_users_info(&[alice.id]).await.unwrap();

        assert_eq!(found, vec![alice.clone()]);
        let request_body = server.await.unwrap();
        assert!(request_body.contains(&alice.id.to_string()));
        assert!(request_body.contains("user_ids"));
    }

    #[tokio::test]
    async fn test_http_client_maps_404_to_not_found() {
        let (base_url, _server) = serve_once("HTTP/1.1 404 Not Found", "[]".to_string()).await;

        let client = HttpDirectoryClient::new(base_url, Duration::from_secs(5)).unwrap();
        let err = client.get_public_users_info(&[Uuid::new_v4()]).await.unwrap_err();

        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_http_client_maps_server_errors() {
        let (base_url, _server) =
            serve_once("HTTP/1.1 503 Service Unavailable", "{}".to_string()).await;

        let client = HttpDirectoryClient::new(base_url, Duration::from_secs(5)).unwrap();
        let err = client.get_public_users_info(&[Uuid::new_v4()]).await.unwrap_err();

        assert!(matches!(err, Error::DirectoryError(_)));
    }

    #[tokio::test]
    async fn test_http_client_skips_empty_lookup() {
        let client = HttpDirectoryClient::new("http://127.0.0.1:9", Duration::from_millis(50)).unwrap();
        assert!(client.get_public_users_info(&[]).await.unwrap().is_empty());
    }
}
