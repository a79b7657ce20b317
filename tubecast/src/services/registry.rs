//! Show registry
//!
//! In-memory set of known show titles. It is a cache of the snapshot
//! directory: built once at startup by scanning `stations/`, then mutated in
//! lock-step with snapshot creation and removal. It never persists anything
//! of its own.

use crate::error::EngineResult;
use crate::layout::{validate_title, SNAPSHOT_EXT};
use std::collections::BTreeSet;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use tubecast_common::fs::is_temp_artifact;

#[derive(Debug, Default)]
pub struct ShowRegistry {
    titles: RwLock<BTreeSet<String>>,
}

impl ShowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from the snapshot directory
    ///
    /// The directory is created when missing. Directories, in-flight atomic
    /// write artifacts and files without the snapshot extension are ignored,
    /// as are snapshots whose stem is not a valid show title.
    pub async fn load(stations_dir: &Path) -> EngineResult<Self> {
        tokio::fs::create_dir_all(stations_dir).await?;

        let mut titles = BTreeSet::new();
        let mut entries = tokio::fs::read_dir(stations_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if is_temp_artifact(&file_name) {
                debug!(file = %file_name, "Skipping in-flight snapshot write");
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(SNAPSHOT_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Err(reason) = validate_title(stem) {
                warn!(file = %file_name, reason = %reason, "Ignoring snapshot with invalid title");
                continue;
            }
            titles.insert(stem.to_string());
        }

        info!(
            dir = %stations_dir.display(),
            shows = titles.len(),
            "Show registry rebuilt from snapshot directory"
        );
        Ok(Self {
            titles: RwLock::new(titles),
        })
    }

    pub async fn exists(&self, title: &str) -> bool {
        self.titles.read().await.contains(title)
    }

    /// Returns `false` if the title was already registered
    pub async fn register(&self, title: &str) -> bool {
        self.titles.write().await.insert(title.to_string())
    }

    /// Returns `false` if the title was not registered
    pub async fn unregister(&self, title: &str) -> bool {
        self.titles.write().await.remove(title)
    }

    /// Every registered title (sorted)
    pub async fn all(&self) -> Vec<String> {
        self.titles.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.titles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.titles.read().await.is_empty()
    }
}
