//! Test Helper Utilities
//!
//! Scripted collaborators for driving the engine without network access:
//! - `ScriptedSource`: video source with per-item metadata, audio size and
//!   failure injection; counts every call that would hit the network
//! - `MemoryBackend`: storage backend keeping objects in a map; counts
//!   uploads and can be told to fail

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tubecast::storage::glob_match;
use tubecast::types::{ChannelRef, SourceError, StorageBackend, StorageError, Usage, VideoSource};
use tubecast::{Engine, EngineConfig};

pub const MIB: u64 = 1024 * 1024;

const LINK_PREFIX: &str = "https://videos.invalid/watch?v=";

/// Initialize test logging (ignored if a subscriber is already set)
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tubecast=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Engine over `root` with the given quota and a generous deadline
pub async fn open_engine(
    root: &Path,
    source: &Arc<ScriptedSource>,
    backend: &Arc<MemoryBackend>,
    quota_mib: u64,
) -> Engine {
    open_engine_with(root, source, backend, quota_mib, Duration::from_secs(30)).await
}

pub async fn open_engine_with(
    root: &Path,
    source: &Arc<ScriptedSource>,
    backend: &Arc<MemoryBackend>,
    quota_mib: u64,
    timeout: Duration,
) -> Engine {
    init_test_logging();
    let config = EngineConfig::with_root(root)
        .quota_bytes(quota_mib * MIB)
        .operation_timeout(timeout)
        .recent_limit(5);
    Engine::open(config, source.clone(), backend.clone())
        .await
        .expect("engine should open")
}

pub fn link(id: &str) -> String {
    format!("{}{}", LINK_PREFIX, id)
}

/// Files left in a directory (empty when it does not exist)
pub fn files_in(dir: &Path) -> Vec<String> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}

// ============================================================================
// Scripted video source
// ============================================================================

#[derive(Debug, Clone)]
pub struct ScriptedItem {
    pub title: String,
    pub description: String,
    pub duration: String,
    pub views: u64,
    /// `YYYYMMDD`, as the real source reports it
    pub upload_date: String,
    /// `None` makes the audio fetch fail
    pub audio_bytes: Option<u64>,
    pub thumbnail: bool,
    pub uploader: String,
    /// Field names whose fetch fails
    pub failing: HashSet<&'static str>,
}

impl ScriptedItem {
    pub fn new(audio_bytes: u64) -> Self {
        Self {
            title: String::new(),
            description: "An episode".to_string(),
            duration: "10:00".to_string(),
            views: 1000,
            upload_date: "20240131".to_string(),
            audio_bytes: Some(audio_bytes),
            thumbnail: true,
            uploader: "@creator".to_string(),
            failing: HashSet::new(),
        }
    }

    pub fn without_audio(mut self) -> Self {
        self.audio_bytes = None;
        self
    }

    pub fn without_thumbnail(mut self) -> Self {
        self.thumbnail = false;
        self
    }

    pub fn failing(mut self, fields: &[&'static str]) -> Self {
        self.failing.extend(fields.iter().copied());
        self
    }

    pub fn upload_date(mut self, date: &str) -> Self {
        self.upload_date = date.to_string();
        self
    }
}

#[derive(Default)]
pub struct ScriptedSource {
    items: Mutex<HashMap<String, ScriptedItem>>,
    channels: Mutex<HashMap<String, Vec<String>>>,
    unreachable: Mutex<HashSet<String>>,
    audio_delay: Mutex<Option<Duration>>,
    /// Calls that would reach the network (listing, fields, media, uploader)
    pub calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_item(&self, id: &str, mut item: ScriptedItem) {
        if item.title.is_empty() {
            item.title = format!("Episode {}", id);
        }
        self.items.lock().unwrap().insert(id.to_string(), item);
    }

    /// Recent uploads of a channel, newest first
    pub fn set_channel(&self, handle: &str, ids: &[&str]) {
        self.channels.lock().unwrap().insert(
            normalize(handle),
            ids.iter().map(|s| s.to_string()).collect(),
        );
    }

    pub fn set_unreachable(&self, handle: &str) {
        self.unreachable.lock().unwrap().insert(normalize(handle));
    }

    pub fn set_audio_delay(&self, delay: Duration) {
        *self.audio_delay.lock().unwrap() = Some(delay);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn item(&self, id: &str, field: &'static str) -> Result<ScriptedItem, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let item = self
            .items
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| SourceError::Unreachable(format!("no item {}", id)))?;
        if item.failing.contains(field) {
            return Err(SourceError::CommandFailed {
                command: "scripted".to_string(),
                stderr: format!("{} unavailable", field),
            });
        }
        Ok(item)
    }
}

fn normalize(handle: &str) -> String {
    format!("@{}", handle.trim().trim_start_matches('@'))
}

#[async_trait]
impl VideoSource for ScriptedSource {
    async fn resolve_channel(&self, handle: &str) -> Result<ChannelRef, SourceError> {
        let handle = normalize(handle);
        if self.unreachable.lock().unwrap().contains(&handle) {
            return Err(SourceError::Unreachable(handle));
        }
        Ok(ChannelRef {
            feed_url: format!("https://videos.invalid/{}/videos", handle),
            handle,
        })
    }

    async fn list_recent_items(
        &self,
        channel: &ChannelRef,
        limit: usize,
    ) -> Result<Vec<String>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .channels
            .lock()
            .unwrap()
            .get(&channel.handle)
            .map(|ids| ids.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn resolve_item_id(&self, link: &str) -> Result<String, SourceError> {
        Ok(link.trim_start_matches(LINK_PREFIX).to_string())
    }

    async fn resolve_source_for_item(&self, link: &str) -> Result<String, SourceError> {
        let id = link.trim_start_matches(LINK_PREFIX);
        Ok(self.item(id, "uploader")?.uploader)
    }

    async fn title(&self, item_id: &str) -> Result<String, SourceError> {
        Ok(self.item(item_id, "title")?.title)
    }

    async fn description(&self, item_id: &str) -> Result<String, SourceError> {
        Ok(self.item(item_id, "description")?.description)
    }

    async fn duration(&self, item_id: &str) -> Result<String, SourceError> {
        Ok(self.item(item_id, "duration")?.duration)
    }

    async fn view_count(&self, item_id: &str) -> Result<u64, SourceError> {
        Ok(self.item(item_id, "view_count")?.views)
    }

    async fn publish_date(&self, item_id: &str) -> Result<String, SourceError> {
        let date = self.item(item_id, "publish_date")?.upload_date;
        tubecast_common::time::format_upload_date(&date)
            .map_err(|e| SourceError::Parse(e.to_string()))
    }

    async fn fetch_thumbnail(
        &self,
        item_id: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, SourceError> {
        let item = self.item(item_id, "thumbnail")?;
        if !item.thumbnail {
            return Err(SourceError::CommandFailed {
                command: "scripted".to_string(),
                stderr: "no thumbnail".to_string(),
            });
        }
        let path = dest_dir.join(format!("{}.jpg", item_id));
        tokio::fs::write(&path, b"\xFF\xD8\xFF\xE0 jpeg")
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))?;
        Ok(path)
    }

    async fn fetch_audio(&self, item_id: &str, dest_dir: &Path) -> Result<PathBuf, SourceError> {
        let item = self.item(item_id, "audio")?;
        let delay = *self.audio_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let bytes = item.audio_bytes.ok_or_else(|| SourceError::CommandFailed {
            command: "scripted".to_string(),
            stderr: "audio extraction failed".to_string(),
        })?;
        let path = dest_dir.join(format!("{}.mp3", item_id));
        // Sparse file: the size is what matters, not the content
        let file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))?;
        file.set_len(bytes)
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))?;
        Ok(path)
    }

    fn item_link(&self, item_id: &str) -> String {
        link(item_id)
    }
}

// ============================================================================
// In-memory storage backend
// ============================================================================

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub size: u64,
    /// Kept for feed documents only
    pub body: Option<Vec<u8>>,
}

#[derive(Default)]
pub struct MemoryBackend {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    deleted: Mutex<Vec<String>>,
    fail_uploads_ending_with: Mutex<Option<String>>,
    empty_url_for_suffix: Mutex<Option<String>>,
    fail_deletes: AtomicBool,
    pub uploads: AtomicUsize,
    pub usage_queries: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_uploads_ending_with(&self, suffix: Option<&str>) {
        *self.fail_uploads_ending_with.lock().unwrap() = suffix.map(str::to_string);
    }

    pub fn empty_url_for(&self, suffix: Option<&str>) {
        *self.empty_url_for_suffix.lock().unwrap() = suffix.map(str::to_string);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn has(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn body(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .and_then(|o| o.body.clone())
    }

    /// Keys removed so far, in deletion order
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn url_for(key: &str) -> String {
        format!("https://cdn.invalid/{}", key)
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn upload(&self, local_path: &Path, key: &str) -> Result<String, StorageError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);

        let failing = self.fail_uploads_ending_with.lock().unwrap().clone();
        if let Some(suffix) = failing {
            if key.ends_with(&suffix) {
                return Err(StorageError::Http(format!("503 for {}", key)));
            }
        }

        let meta = tokio::fs::metadata(local_path)
            .await
            .map_err(|e| StorageError::LocalFile {
                path: local_path.to_path_buf(),
                message: e.to_string(),
            })?;
        let body = if key.ends_with(".xml") {
            Some(tokio::fs::read(local_path).await.map_err(|e| StorageError::LocalFile {
                path: local_path.to_path_buf(),
                message: e.to_string(),
            })?)
        } else {
            None
        };
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                size: meta.len(),
                body,
            },
        );

        let empty = self.empty_url_for_suffix.lock().unwrap().clone();
        if let Some(suffix) = empty {
            if key.ends_with(&suffix) {
                return Ok(String::new());
            }
        }
        Ok(Self::url_for(key))
    }

    async fn delete(&self, pattern: &str) -> Result<u64, StorageError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::Http("delete refused".to_string()));
        }
        let mut objects = self.objects.lock().unwrap();
        let matching: Vec<String> = objects
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        for key in &matching {
            objects.remove(key);
        }
        self.deleted.lock().unwrap().extend(matching.iter().cloned());
        Ok(matching.len() as u64)
    }

    async fn usage(&self, namespace: &str) -> Result<Usage, StorageError> {
        self.usage_queries.fetch_add(1, Ordering::SeqCst);
        let prefix = format!("{}/", namespace);
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .fold(Usage::default(), |acc, (_, o)| Usage {
                total_bytes: acc.total_bytes + o.size,
                file_count: acc.file_count + 1,
            }))
    }
}
