//! Channel directory cache: channel name → channel id.
//!
//! The mapping is fetched from the listing service, persisted to a JSON file
//! and served from memory. A refresh only publishes once every page has been
//! fetched and the file has been replaced, so readers see either the old or
//! the complete new mapping.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error;
use crate::slack::{ChannelEntry, ChannelLister};
use crate::store::JsonFile;

/// Largest page the listing service accepts.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Canonical form of a channel name: trimmed and lowercased.
pub fn normalize_channel_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Mapping from normalized channel name to channel id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelDirectory {
    channels: BTreeMap<String, String>,
}

impl ChannelDirectory {
    /// Build a directory from listing entries. The first entry for a
    /// name wins; later duplicates are dropped.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = ChannelEntry>,
    {
        let mut directory = Self::default();
        for entry in entries {
            directory.insert_first(&entry.name, entry.id);
        }
        directory
    }

    /// Look up a channel id by (un-normalized) name.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.channels
            .get(&normalize_channel_name(name))
            .map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    fn insert_first(&mut self, name: &str, id: String) -> bool {
        let key = normalize_channel_name(name);
        if key.is_empty() || self.channels.contains_key(&key) {
            return false;
        }
        self.channels.insert(key, id);
        true
    }
}

/// Persisted, in-memory-served channel directory.
pub struct DirectoryCache {
    file: JsonFile<ChannelDirectory>,
    current: RwLock<Arc<ChannelDirectory>>,
    page_size: u32,
    /// Serializes refreshes so persist + publish stay paired.
    refresh_lock: Mutex<()>,
}

impl DirectoryCache {
    /// Create a cache backed by `file`. Nothing is read until `load()`.
    pub fn new(file: JsonFile<ChannelDirectory>, page_size: u32) -> Self {
        Self {
            file,
            current: RwLock::new(Arc::new(ChannelDirectory::default())),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Create a cache and load whatever mapping is already on disk.
    pub async fn open(file: JsonFile<ChannelDirectory>, page_size: u32) -> Self {
        let cache = Self::new(file, page_size);
        cache.load().await;
        cache
    }

    /// Read the persisted mapping and publish it.
    ///
    /// A missing or unreadable file yields an empty mapping.
    pub async fn load(&self) -> Arc<ChannelDirectory> {
        let directory = match self.file.load().await {
            Ok(Some(directory)) => directory,
            Ok(None) => {
                debug!(path = %self.file.path().display(), "No persisted channel directory");
                ChannelDirectory::default()
            }
            Err(e) => {
                warn!(error = %e, "Failed to read channel directory, using empty mapping");
                ChannelDirectory::default()
            }
        };
        let directory = Arc::new(directory);
        *self.current.write().await = Arc::clone(&directory);
        directory
    }

    /// Current in-memory mapping.
    pub async fn snapshot(&self) -> Arc<ChannelDirectory> {
        Arc::clone(&*self.current.read().await)
    }

    /// Resolve a channel name against the current mapping.
    pub async fn resolve(&self, name: &str) -> Option<String> {
        self.snapshot().await.resolve(name).map(str::to_string)
    }

    /// Fetch every page from `lister`, persist the merged mapping and
    /// publish it. Returns the number of channels.
    ///
    /// Any page failure abandons the refresh; the previous mapping stays
    /// both on disk and in memory.
    pub async fn refresh(&self, lister: &dyn ChannelLister) -> error::Result<usize> {
        let _guard = self.refresh_lock.lock().await;

        let mut directory = ChannelDirectory::default();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = lister
                .list_channels(cursor.as_deref(), self.page_size)
                .await
                .inspect_err(|e| warn!(page = pages + 1, error = %e, "Channel directory refresh aborted"))?;
            pages += 1;

            for entry in page.entries {
                let name = entry.name.clone();
                if !directory.insert_first(&entry.name, entry.id) {
                    debug!(channel = %name, "Duplicate channel name ignored");
                }
            }

            match page.next_cursor.filter(|c| !c.is_empty()) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        self.file.save(&directory).await?;

        let count = directory.len();
        *self.current.write().await = Arc::new(directory);
        info!(channels = count, pages, "Channel directory refreshed");
        Ok(count)
    }
}

/// Refresh `cache` from `lister` every `every`, starting one period from
/// now. Failures are logged and the stale mapping is kept.
///
/// A zero period disables the task and returns `None`.
pub fn spawn_refresh_task(
    cache: Arc<DirectoryCache>,
    lister: Arc<dyn ChannelLister>,
    every: Duration,
) -> Option<tokio::task::JoinHandle<()>> {
    if every.is_zero() {
        debug!("Periodic channel directory refresh disabled");
        return None;
    }
    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = cache.refresh(lister.as_ref()).await {
                warn!(error = %e, "Scheduled channel directory refresh failed");
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::error::SlackError;
    use crate::slack::ChannelPage;

    /// Serves scripted pages in order and records the cursors it was given.
    struct ScriptedLister {
        pages: std::sync::Mutex<VecDeque<Result<ChannelPage, SlackError>>>,
        seen: std::sync::Mutex<Vec<(Option<String>, u32)>>,
    }

    impl ScriptedLister {
        fn new(pages: Vec<Result<ChannelPage, SlackError>>) -> Self {
            Self {
                pages: std::sync::Mutex::new(pages.into()),
                seen: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChannelLister for ScriptedLister {
        async fn list_channels(
            &self,
            cursor: Option<&str>,
            limit: u32,
        ) -> Result<ChannelPage, SlackError> {
            self.seen
                .lock()
                .unwrap()
                .push((cursor.map(str::to_string), limit));
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ChannelPage::default()))
        }
    }

    fn page(entries: &[(&str, &str)], next: Option<&str>) -> Result<ChannelPage, SlackError> {
        Ok(ChannelPage {
            entries: entries
                .iter()
                .map(|(n, id)| ChannelEntry::new(*n, *id))
                .collect(),
            next_cursor: next.map(str::to_string),
        })
    }

    fn cache_in(dir: &TempDir) -> DirectoryCache {
        DirectoryCache::new(JsonFile::new(dir.path().join("channels.json")), MAX_PAGE_SIZE)
    }

    #[test]
    fn first_name_wins_on_collision() {
        let directory = ChannelDirectory::from_entries([
            ChannelEntry::new("General", "C1"),
            ChannelEntry::new("general", "C9"),
        ]);
        assert_eq!(directory.len(), 1);
        assert_eq!(directory.resolve("general"), Some("C1"));
    }

    #[test]
    fn resolve_normalizes_lookup() {
        let directory = ChannelDirectory::from_entries([ChannelEntry::new("dev-team", "C2")]);
        assert_eq!(directory.resolve("  DEV-Team "), Some("C2"));
        assert!(!directory.contains("dev"));
    }

    #[tokio::test]
    async fn refresh_follows_cursors_until_exhausted() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        let lister = ScriptedLister::new(vec![
            page(&[("general", "C1"), ("random", "C2")], Some("next-1")),
            page(&[("General", "C3"), ("ops", "C4")], Some("")),
        ]);

        let count = cache.refresh(&lister).await.unwrap();
        assert_eq!(count, 3);

        let seen = lister.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![(None, MAX_PAGE_SIZE), (Some("next-1".to_string()), MAX_PAGE_SIZE)]
        );

        let snapshot = cache.snapshot().await;
        assert_eq!(snapshot.resolve("general"), Some("C1"));
        assert_eq!(snapshot.resolve("ops"), Some("C4"));
    }

    #[tokio::test]
    async fn refresh_persists_for_next_load() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache
            .refresh(&ScriptedLister::new(vec![page(&[("general", "C1")], None)]))
            .await
            .unwrap();

        let reopened = DirectoryCache::open(
            JsonFile::new(dir.path().join("channels.json")),
            MAX_PAGE_SIZE,
        )
        .await;
        assert_eq!(reopened.resolve("GENERAL").await.as_deref(), Some("C1"));
    }

    #[tokio::test]
    async fn failed_second_page_leaves_previous_mapping() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache
            .refresh(&ScriptedLister::new(vec![page(&[("general", "C1")], None)]))
            .await
            .unwrap();
        let before = std::fs::read_to_string(dir.path().join("channels.json")).unwrap();

        let failing = ScriptedLister::new(vec![
            page(&[("random", "C2")], Some("c2")),
            Err(SlackError::Api {
                method: "conversations.list".into(),
                error: "ratelimited".into(),
            }),
        ]);
        assert!(cache.refresh(&failing).await.is_err());

        let after = std::fs::read_to_string(dir.path().join("channels.json")).unwrap();
        assert_eq!(before, after);
        let snapshot = cache.snapshot().await;
        assert!(snapshot.contains("general"));
        assert!(!snapshot.contains("random"));
    }

    #[tokio::test]
    async fn load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        assert!(cache.load().await.is_empty());
    }

    #[tokio::test]
    async fn load_corrupt_file_is_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("channels.json"), "[1, 2").unwrap();
        let cache = cache_in(&dir);
        assert!(cache.load().await.is_empty());
    }

    #[tokio::test]
    async fn refresh_task_runs_on_schedule() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(cache_in(&dir));
        let lister: Arc<dyn ChannelLister> =
            Arc::new(ScriptedLister::new(vec![page(&[("general", "C1")], None)]));

        let handle = spawn_refresh_task(Arc::clone(&cache), lister, Duration::from_millis(50))
            .expect("non-zero period spawns a task");
        assert!(cache.snapshot().await.is_empty());

        for _ in 0..100 {
            if !cache.snapshot().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(cache.snapshot().await.contains("general"));
        handle.abort();
    }

    #[tokio::test]
    async fn zero_period_spawns_nothing() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(cache_in(&dir));
        let lister: Arc<dyn ChannelLister> = Arc::new(ScriptedLister::new(vec![]));
        assert!(spawn_refresh_task(cache, lister, Duration::ZERO).is_none());
    }

    #[test]
    fn page_size_is_clamped() {
        let cache = DirectoryCache::new(JsonFile::new("/tmp/unused.json"), 10_000);
        assert_eq!(cache.page_size, MAX_PAGE_SIZE);
    }
}
