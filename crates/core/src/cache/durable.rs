//! Durable key → JSON document stores backing the cache
//!
//! `FileJsonStore` keeps one pretty-printed JSON document per key:
//! ```text
//! <dir>/
//!   build.json
//!   test%20run.json
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::Result;

/// Slow, durable tier the cache cold-loads from
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Fetch the document stored under `key`
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Store (or replace) the document under `key`
    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()>;

    /// Remove the document under `key`, returning whether it existed
    async fn remove(&self, key: &str) -> Result<bool>;

    /// Remove every document
    async fn clear(&self) -> Result<()>;
}

/// File-based store using one JSON file per key
pub struct FileJsonStore {
    dir: PathBuf,
}

impl FileJsonStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }
}

/// Percent-encode the key so every name maps to one file inside the store directory
fn encode_key(key: &str) -> String {
    urlencoding::encode(key).into_owned()
}

#[async_trait]
impl DurableStore for FileJsonStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(key);
        let tmp = self
            .dir
            .join(format!("{}.{}.json.tmp", encode_key(key), Uuid::new_v4()));
        let content = serde_json::to_string_pretty(&value)?;

        // Rename so readers never see a half-written document
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!("Persisted cache document: {}", path.display());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self) -> Result<()> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                tokio::fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }
}

/// In-process store, mostly useful for tests and ephemeral hosts
#[derive(Default)]
pub struct MemoryJsonStore {
    docs: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryJsonStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents
    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }
}

#[async_trait]
impl DurableStore for MemoryJsonStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.docs.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.docs.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.docs.write().await.remove(key).is_some())
    }

    async fn clear(&self) -> Result<()> {
        self.docs.write().await.clear();
        Ok(())
    }
}
