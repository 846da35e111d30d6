use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use tokio::sync::RwLock;

use super::compute_hash;
use crate::image_processing::get_extension_from_mime_type;

pub const OUTPUTS_ROUTE: &str = "/api/outputs";

#[derive(Debug, Clone, PartialEq)]
pub struct StoredOutput {
    pub bytes: Bytes,
    pub mime_type: String,
}

/// Content-addressed, in-memory store for generated images that arrive as
/// raw bytes. Keys look like `<sha256>.<ext>`.
#[derive(Clone, Debug)]
pub struct OutputStore {
    entries: Arc<RwLock<HashMap<String, StoredOutput>>>,
    base_url: String,
}

impl OutputStore {
    pub fn new(base_url: String) -> Self {
        Self {
            entries: Arc::default(),
            base_url,
        }
    }

    pub async fn get(&self, key: &str) -> Option<StoredOutput> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn put(&self, data: Vec<u8>, mime_type: &str) -> String {
        let key = Self::get_key(&data, mime_type);
        self.entries
            .write()
            .await
            .entry(key.clone())
            .or_insert_with(|| StoredOutput {
                bytes: Bytes::from(data),
                mime_type: mime_type.to_string(),
            });
        key
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }

    pub fn get_key(data: &[u8], mime_type: &str) -> String {
        format!("{}.{}", compute_hash(data), get_extension_from_mime_type(mime_type))
    }

    pub fn get_public_url(&self, key: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let key = key.trim_start_matches('/');
        format!("{base}{OUTPUTS_ROUTE}/{key}")
    }
}
