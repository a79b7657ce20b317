//! Durable show snapshots (`stations/<title>.json`)

use crate::error::{EngineError, EngineResult};
use crate::layout::StoreLayout;
use crate::models::Show;
use tracing::debug;
use tubecast_common::fs::{remove_if_exists, write_atomic};

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    layout: StoreLayout,
}

impl SnapshotStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    pub async fn load(&self, title: &str) -> EngineResult<Show> {
        let path = self.layout.snapshot_path(title);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::NotFound(format!("show '{}'", title)));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes).map_err(|e| {
            EngineError::Persistence(format!("corrupt snapshot {}: {}", path.display(), e))
        })
    }

    /// Atomically replace the snapshot of `show`
    pub async fn save(&self, show: &Show) -> EngineResult<()> {
        let path = self.layout.snapshot_path(&show.title);
        let json = serde_json::to_vec_pretty(show)
            .map_err(|e| EngineError::Persistence(e.to_string()))?;
        write_atomic(&path, &json).await.map_err(|e| {
            EngineError::Persistence(format!("write {}: {}", path.display(), e))
        })?;
        debug!(show = %show.title, path = %path.display(), "Snapshot saved");
        Ok(())
    }

    /// Returns whether a snapshot existed
    pub async fn remove(&self, title: &str) -> EngineResult<bool> {
        Ok(remove_if_exists(&self.layout.snapshot_path(title)).await?)
    }

    /// Current snapshot bytes of `title`, `None` when there is none yet
    pub async fn checkpoint(&self, title: &str) -> EngineResult<Option<Vec<u8>>> {
        let path = self.layout.snapshot_path(title);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::Persistence(format!(
                "read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Put back what [`checkpoint`](Self::checkpoint) returned
    pub async fn restore(&self, title: &str, checkpoint: Option<&[u8]>) -> EngineResult<()> {
        let path = self.layout.snapshot_path(title);
        match checkpoint {
            Some(bytes) => write_atomic(&path, bytes).await.map_err(|e| {
                EngineError::Persistence(format!("restore {}: {}", path.display(), e))
            }),
            None => {
                remove_if_exists(&path).await?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tubecast_common::config::OwnerConfig;

    #[tokio::test]
    async fn test_save_load_remove() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(StoreLayout::new(dir.path()));
        let show = Show::new("Tech Talks", "desc", &OwnerConfig::default());

        store.save(&show).await.unwrap();
        assert_eq!(store.load("Tech Talks").await.unwrap(), show);

        assert!(store.remove("Tech Talks").await.unwrap());
        assert!(!store.remove("Tech Talks").await.unwrap());
        assert!(matches!(
            store.load("Tech Talks").await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_restore_checkpoint() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(StoreLayout::new(dir.path()));
        let mut show = Show::new("Tech Talks", "before", &OwnerConfig::default());

        assert_eq!(store.checkpoint("Tech Talks").await.unwrap(), None);
        store.save(&show).await.unwrap();
        let before = store.checkpoint("Tech Talks").await.unwrap();

        show.description = "after".to_string();
        store.save(&show).await.unwrap();
        store.restore("Tech Talks", before.as_deref()).await.unwrap();
        assert_eq!(store.load("Tech Talks").await.unwrap().description, "before");

        store.restore("Tech Talks", None).await.unwrap();
        assert!(!store.layout.snapshot_path("Tech Talks").exists());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_a_persistence_error() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(dir.path());
        std::fs::create_dir_all(layout.stations_dir()).unwrap();
        std::fs::write(layout.snapshot_path("Broken"), "{ not json").unwrap();

        let store = SnapshotStore::new(layout);
        assert!(matches!(
            store.load("Broken").await,
            Err(EngineError::Persistence(_))
        ));
    }
}
