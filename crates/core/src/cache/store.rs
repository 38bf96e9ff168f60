//! Two-tier cache store
//!
//! A fast in-memory map of `Arc<CacheEntry>` in front of an optional
//! [`DurableStore`]. Entries are swapped in whole, so a reader that holds an
//! `Arc` always sees a complete entry even while the name is being rewritten.
//!
//! Every operation that touches both tiers for a name (put, invalidate, cold
//! load) runs under that name's lock, so the tiers agree once it returns.
//! `invalidate_all` excludes all of them through the `tiers` gate.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, RwLockReadGuard};
use tracing::{debug, warn};

use super::durable::DurableStore;
use super::model::{CacheEntry, CacheListing};
use crate::channel::ChannelKind;
use crate::{Error, Result};

/// Concurrent name → entry cache with overwrite-only semantics
pub struct CacheStore {
    entries: RwLock<HashMap<String, Arc<CacheEntry>>>,
    durable: Option<Arc<dyn DurableStore>>,
    name_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    tiers: RwLock<()>,
}

/// Held while one name is changed in both tiers
struct NameGuard<'a> {
    _tiers: RwLockReadGuard<'a, ()>,
    _name: OwnedMutexGuard<()>,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore {
    /// Create a memory-only cache
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            durable: None,
            name_locks: Mutex::new(HashMap::new()),
            tiers: RwLock::new(()),
        }
    }

    /// Create a cache backed by a durable store
    pub fn with_durable(durable: Arc<dyn DurableStore>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            durable: Some(durable),
            name_locks: Mutex::new(HashMap::new()),
            tiers: RwLock::new(()),
        }
    }

    async fn lock_name(&self, name: &str) -> NameGuard<'_> {
        let tiers = self.tiers.read().await;
        let lock = {
            let mut locks = self.name_locks.lock().await;
            Arc::clone(locks.entry(name.to_string()).or_default())
        };
        NameGuard {
            _tiers: tiers,
            _name: lock.lock_owned().await,
        }
    }

    /// Store an entry under its name, replacing any previous entry wholesale
    pub async fn put(&self, entry: CacheEntry) -> Arc<CacheEntry> {
        let entry = Arc::new(entry);
        let _guard = self.lock_name(&entry.name).await;
        {
            let mut entries = self.entries.write().await;
            entries.insert(entry.name.clone(), Arc::clone(&entry));
        }
        debug!("Cached '{}'", entry.name);

        if let Some(durable) = &self.durable {
            let persisted = match serde_json::to_value(entry.as_ref()) {
                Ok(value) => durable.set(&entry.name, value).await,
                Err(e) => Err(e.into()),
            };
            if let Err(e) = persisted {
                warn!("Failed to persist cache entry '{}': {}", entry.name, e);
            }
        }

        entry
    }

    /// Fetch a whole entry.
    ///
    /// A miss in memory falls back to the durable store once and populates
    /// memory; `force` skips memory and reloads from the durable store.
    pub async fn get_entry(&self, name: &str, force: bool) -> Result<Arc<CacheEntry>> {
        if !force || self.durable.is_none() {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(name) {
                return Ok(Arc::clone(entry));
            }
        }

        let durable = match &self.durable {
            Some(durable) => durable,
            None => return Err(Error::NotFound(name.to_string())),
        };

        let _guard = self.lock_name(name).await;
        if !force {
            // A put or cold load that held the lock may have filled memory
            if let Some(entry) = self.entries.read().await.get(name) {
                return Ok(Arc::clone(entry));
            }
        }

        let value = durable
            .get(name)
            .await?
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        let loaded: CacheEntry = serde_json::from_value(value).map_err(|e| {
            Error::Storage(format!("Cached document for '{}' is unreadable: {}", name, e))
        })?;
        let loaded = Arc::new(loaded);

        debug!("Loaded '{}' from durable cache (force={})", name, force);

        self.entries
            .write()
            .await
            .insert(name.to_string(), Arc::clone(&loaded));
        Ok(loaded)
    }

    /// Lines of one channel of a cached entry
    pub async fn get(&self, name: &str, channel: ChannelKind, force: bool) -> Result<Vec<String>> {
        let entry = self.get_entry(name, force).await?;
        Ok(entry.lines(channel).to_vec())
    }

    /// Whether `name` is present in the fast layer
    pub async fn contains(&self, name: &str) -> bool {
        self.entries.read().await.contains_key(name)
    }

    /// Drop `name` from both tiers, returning whether anything was removed
    pub async fn invalidate(&self, name: &str) -> Result<bool> {
        let _guard = self.lock_name(name).await;
        let removed = self.entries.write().await.remove(name).is_some();
        let removed_durable = match &self.durable {
            Some(durable) => durable.remove(name).await?,
            None => false,
        };
        if removed || removed_durable {
            debug!("Invalidated cache entry '{}'", name);
        }
        Ok(removed || removed_durable)
    }

    /// Drop every entry from both tiers, returning how many in-memory entries were removed
    pub async fn invalidate_all(&self) -> Result<usize> {
        let _tiers = self.tiers.write().await;
        let removed = {
            let mut entries = self.entries.write().await;
            let count = entries.len();
            entries.clear();
            count
        };
        if let Some(durable) = &self.durable {
            durable.clear().await?;
        }
        debug!("Invalidated {} cache entries", removed);
        Ok(removed)
    }

    /// List cached entries, newest first
    pub async fn list(&self) -> Vec<CacheListing> {
        let entries = self.entries.read().await;
        let mut listing: Vec<CacheListing> =
            entries.values().map(|e| CacheListing::from(e.as_ref())).collect();
        listing.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        listing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{DurableStore, FileJsonStore, MemoryJsonStore};
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Durable store whose removes, and writes of documents mentioning "slow", lag
    struct LaggingStore {
        inner: MemoryJsonStore,
        delay: Duration,
    }

    impl LaggingStore {
        fn new(delay: Duration) -> Self {
            Self {
                inner: MemoryJsonStore::new(),
                delay,
            }
        }
    }

    #[async_trait]
    impl DurableStore for LaggingStore {
        async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
            if value.to_string().contains("slow") {
                tokio::time::sleep(self.delay).await;
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<bool> {
            tokio::time::sleep(self.delay).await;
            self.inner.remove(key).await
        }

        async fn clear(&self) -> Result<()> {
            self.inner.clear().await
        }
    }

    fn entry(name: &str, output: &[&str]) -> CacheEntry {
        CacheEntry::new(name, "cmd").with_lines(ChannelKind::Output, output.iter().copied())
    }

    #[tokio::test]
    async fn test_put_overwrites_without_merge() {
        let store = CacheStore::new();

        store
            .put(entry("build", &["one", "two"]).with_lines(ChannelKind::Error, ["bad"]))
            .await;
        store.put(entry("build", &["three"])).await;

        let output = store.get("build", ChannelKind::Output, false).await.unwrap();
        assert_eq!(output, vec!["three".to_string()]);

        // The first entry's Error channel must not survive the overwrite
        let errors = store.get("build", ChannelKind::Error, false).await.unwrap();
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn test_get_missing_name_is_not_found() {
        let store = CacheStore::new();
        let result = store.get("nope", ChannelKind::Output, false).await;
        match result {
            Err(Error::NotFound(name)) => assert_eq!(name, "nope"),
            other => panic!("Expected NotFound, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_absent_channel_is_empty() {
        let store = CacheStore::new();
        store.put(entry("x", &["hello"])).await;
        let verbose = store.get("x", ChannelKind::Verbose, false).await.unwrap();
        assert!(verbose.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_puts_to_distinct_names() {
        let store = Arc::new(CacheStore::new());

        let mut handles = Vec::new();
        for name in ["x", "y"] {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    let line = format!("{}-{}", name, i);
                    store.put(entry(name, &[line.as_str()])).await;
                    let read = store.get(name, ChannelKind::Output, false).await.unwrap();
                    assert_eq!(read.len(), 1);
                    assert!(read[0].starts_with(name));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(
            store.get("x", ChannelKind::Output, false).await.unwrap(),
            vec!["x-49".to_string()]
        );
        assert_eq!(
            store.get("y", ChannelKind::Output, false).await.unwrap(),
            vec!["y-49".to_string()]
        );
    }

    #[tokio::test]
    async fn test_reader_keeps_complete_old_entry() {
        let store = CacheStore::new();
        store.put(entry("a", &["old"])).await;

        let held = store.get_entry("a", false).await.unwrap();
        store.put(entry("a", &["new"])).await;

        assert_eq!(held.lines(ChannelKind::Output), ["old"]);
        assert_eq!(
            store.get_entry("a", false).await.unwrap().lines(ChannelKind::Output),
            ["new"]
        );
    }

    #[tokio::test]
    async fn test_cold_load_from_durable() {
        let durable = Arc::new(MemoryJsonStore::new());
        let doc = serde_json::to_value(entry("warm", &["from disk"])).unwrap();
        durable.set("warm", doc).await.unwrap();

        let store = CacheStore::with_durable(durable);
        assert!(!store.contains("warm").await);

        let lines = store.get("warm", ChannelKind::Output, false).await.unwrap();
        assert_eq!(lines, vec!["from disk".to_string()]);
        assert!(store.contains("warm").await);
    }

    #[tokio::test]
    async fn test_force_reloads_from_durable() {
        let durable = Arc::new(MemoryJsonStore::new());
        let store = CacheStore::with_durable(durable.clone());

        store.put(entry("r", &["memory"])).await;

        // Rewrite the durable copy behind the cache's back
        let doc = serde_json::to_value(entry("r", &["disk"])).unwrap();
        durable.set("r", doc).await.unwrap();

        assert_eq!(
            store.get("r", ChannelKind::Output, false).await.unwrap(),
            vec!["memory".to_string()]
        );
        assert_eq!(
            store.get("r", ChannelKind::Output, true).await.unwrap(),
            vec!["disk".to_string()]
        );
        // The forced load populated the fast layer
        assert_eq!(
            store.get("r", ChannelKind::Output, false).await.unwrap(),
            vec!["disk".to_string()]
        );
    }

    #[tokio::test]
    async fn test_force_without_durable_reads_memory() {
        let store = CacheStore::new();
        store.put(entry("m", &["only"])).await;
        assert_eq!(
            store.get("m", ChannelKind::Output, true).await.unwrap(),
            vec!["only".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unreadable_durable_document() {
        let durable = Arc::new(MemoryJsonStore::new());
        durable
            .set("broken", serde_json::json!({"channels": 5}))
            .await
            .unwrap();

        let store = CacheStore::with_durable(durable);
        match store.get("broken", ChannelKind::Output, false).await {
            Err(Error::Storage(msg)) => assert!(msg.contains("broken")),
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalidate_both_tiers() {
        let durable = Arc::new(MemoryJsonStore::new());
        let store = CacheStore::with_durable(durable.clone());

        store.put(entry("a", &["1"])).await;
        store.put(entry("b", &["2"])).await;
        assert_eq!(durable.len().await, 2);

        assert!(store.invalidate("a").await.unwrap());
        assert!(!store.invalidate("a").await.unwrap());
        assert!(store.get("a", ChannelKind::Output, false).await.is_err());

        assert_eq!(store.invalidate_all().await.unwrap(), 1);
        assert!(durable.is_empty().await);
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_read_during_invalidate_does_not_restore_entry() {
        let store = Arc::new(CacheStore::with_durable(Arc::new(LaggingStore::new(
            Duration::from_millis(200),
        ))));
        store.put(entry("a", &["v1"])).await;

        let invalidating = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.invalidate("a").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let during = store.get("a", ChannelKind::Output, false).await;
        assert!(matches!(during, Err(Error::NotFound(_))), "{:?}", during);

        assert!(invalidating.await.unwrap().unwrap());
        assert!(!store.contains("a").await);
        assert!(store.get("a", ChannelKind::Output, false).await.is_err());
        assert!(store.get("a", ChannelKind::Output, true).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_puts_leave_tiers_agreeing() {
        let store = Arc::new(CacheStore::with_durable(Arc::new(LaggingStore::new(
            Duration::from_millis(150),
        ))));

        let first = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.put(entry("x", &["slow"])).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        store.put(entry("x", &["fast"])).await;
        first.await.unwrap();

        let memory = store.get("x", ChannelKind::Output, false).await.unwrap();
        let reloaded = store.get("x", ChannelKind::Output, true).await.unwrap();
        assert_eq!(memory, vec!["fast".to_string()]);
        assert_eq!(reloaded, memory);
    }

    #[tokio::test]
    async fn test_list_counts() {
        let store = CacheStore::new();
        store
            .put(entry("t", &["o1", "o2"]).with_lines(ChannelKind::Error, ["e"]))
            .await;

        let listing = store.list().await;
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name, "t");
        assert_eq!(listing[0].counts[&ChannelKind::Output], 2);
        assert_eq!(listing[0].counts[&ChannelKind::Error], 1);
        assert_eq!(listing[0].counts[&ChannelKind::Debug], 0);
    }

    #[tokio::test]
    async fn test_file_backed_cache_survives_restart() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("cache");

        {
            let store = CacheStore::with_durable(Arc::new(FileJsonStore::new(&dir)));
            store.put(entry("nightly", &["ok"])).await;
        }

        let store = CacheStore::with_durable(Arc::new(FileJsonStore::new(&dir)));
        assert_eq!(
            store.get("nightly", ChannelKind::Output, false).await.unwrap(),
            vec!["ok".to_string()]
        );
    }
}
