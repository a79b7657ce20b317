//! Local store layout and remote object naming
//!
//! ```text
//! <root>/stations/<title>.json      snapshot (authoritative)
//! <root>/feeds/<title>.xml          rendered feed
//! <root>/media/<title>/<guid>.*     staged media, removed after upload
//! ```
//!
//! Remote keys mirror the show title as namespace:
//! `<title>/<guid>.mp3`, `<title>/<guid>.<ext>`, `<title>/cover.<ext>`,
//! `<title>/<title>.xml`.

use std::path::{Path, PathBuf};

const STATIONS_DIR: &str = "stations";
const FEEDS_DIR: &str = "feeds";
const MEDIA_DIR: &str = "media";

/// Snapshot file extension
pub const SNAPSHOT_EXT: &str = "json";

/// Characters a show title or item id may never contain
const FORBIDDEN_CHARS: &[char] = &['/', '\\', '*', '?', '[', ']'];

/// Paths under the configured root folder
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stations_dir(&self) -> PathBuf {
        self.root.join(STATIONS_DIR)
    }

    pub fn feeds_dir(&self) -> PathBuf {
        self.root.join(FEEDS_DIR)
    }

    /// Staging directory for one show's media downloads
    pub fn media_dir(&self, title: &str) -> PathBuf {
        self.root.join(MEDIA_DIR).join(title)
    }

    pub fn snapshot_path(&self, title: &str) -> PathBuf {
        self.stations_dir().join(format!("{}.{}", title, SNAPSHOT_EXT))
    }

    pub fn feed_path(&self, title: &str) -> PathBuf {
        self.feeds_dir().join(format!("{}.xml", title))
    }
}

pub fn audio_key(title: &str, guid: &str) -> String {
    format!("{}/{}.mp3", title, guid)
}

/// Thumbnail key, keeping the extension of the downloaded file
pub fn thumbnail_key(title: &str, guid: &str, local: &Path) -> String {
    format!("{}/{}.{}", title, guid, extension_or(local, "jpg"))
}

pub fn cover_key(title: &str, local: &Path) -> String {
    format!("{}/cover.{}", title, extension_or(local, "jpg"))
}

pub fn feed_key(title: &str) -> String {
    format!("{}/{}.xml", title, title)
}

/// Every remote object belonging to one episode
pub fn episode_pattern(title: &str, guid: &str) -> String {
    format!("{}/{}.*", title, guid)
}

/// Every remote object belonging to one show
pub fn show_pattern(title: &str) -> String {
    format!("{}/*", title)
}

/// Validate a show title for use as file stem and remote namespace
pub fn validate_title(title: &str) -> Result<(), String> {
    validate_component(title, "show title")
}

/// Validate an item identifier for use in file and object names
pub fn validate_item_id(item_id: &str) -> Result<(), String> {
    validate_component(item_id, "item id")
}

fn validate_component(value: &str, what: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} must not be empty", what));
    }
    if value != value.trim() {
        return Err(format!("{} must not start or end with whitespace", what));
    }
    if value.starts_with('.') {
        return Err(format!("{} must not start with '.'", what));
    }
    if let Some(c) = value
        .chars()
        .find(|c| c.is_control() || FORBIDDEN_CHARS.contains(c))
    {
        return Err(format!("{} must not contain {:?}", what, c));
    }
    Ok(())
}

fn extension_or<'a>(path: &'a Path, default: &'a str) -> &'a str {
    path.extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .unwrap_or(default)
}
