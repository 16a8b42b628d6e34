//! Blob storage for chat images.

use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::error::ApiError;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key` and return the public URL.
    async fn put(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<String, ApiError>;
}

/// Content-addressed key for a chat image: identical uploads share a blob.
pub fn chat_image_key(room_id: &str, bytes: &[u8]) -> String {
    format!("chat/{room_id}/{:x}", Sha256::digest(bytes))
}

/// Plain HTTP object store: `PUT {base}/{key}` stores, `GET` serves.
#[derive(Clone)]
pub struct HttpBlobStore {
    base_url: String,
    http: reqwest::Client,
}

impl HttpBlobStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<String, ApiError> {
        let url = format!("{}/{}", self.base_url, key);

        self.http
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| {
                tracing::error!(?e, %url, "blob upload failed");
                ApiError::internal("Failed to store image")
            })?;

        Ok(url)
    }
}

/// Keeps blobs in process; URLs use the `memory://` scheme.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, (String, Vec<u8>)>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<(String, Vec<u8>)> {
        self.blobs.get(key).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<String, ApiError> {
        self.blobs
            .insert(key.to_string(), (content_type.to_string(), bytes));
        Ok(format!("memory://{key}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_keys_are_content_addressed() {
        let a = chat_image_key("room_1", b"png-bytes");
        let b = chat_image_key("room_1", b"png-bytes");
        let c = chat_image_key("room_1", b"other");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("chat/room_1/"));
        assert_eq!(a.len(), "chat/room_1/".len() + 64);
    }

    #[tokio::test]
    async fn memory_store_keeps_content_type() {
        let store = MemoryBlobStore::new();
        let url = store.put("k", "image/png", vec![1, 2, 3]).await.unwrap();
        assert_eq!(url, "memory://k");
        assert_eq!(store.get("k"), Some(("image/png".to_string(), vec![1, 2, 3])));
    }
}
