//! Durable snapshot and feed publisher
//!
//! After every accepted mutation:
//! 1. the feed is rendered from the new state
//! 2. the snapshot is replaced atomically (fatal on failure)
//! 3. the feed is replaced atomically; on failure the previous snapshot bytes
//!    are put back and the error is fatal
//! 4. the feed is uploaded; a changed public URL is stored on the show and the
//!    snapshot re-saved
//!
//! Steps 2 and 3 commit together or not at all, so a failed persist leaves
//! the show exactly as it was before the mutation. A failed upload in step 4
//! leaves local state correct and the public feed stale. It is logged and
//! reported, never reverted.

use super::feed;
use super::snapshot_store::SnapshotStore;
use crate::error::{EngineError, EngineResult};
use crate::layout::{feed_key, StoreLayout};
use crate::models::Show;
use crate::types::StorageBackend;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use tubecast_common::fs::{remove_if_exists, write_atomic};

/// Outcome of one persist call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub feed_path: PathBuf,
    /// Public feed URL when the upload succeeded
    pub feed_url: Option<String>,
    /// Why the upload failed, if it did
    pub remote_error: Option<String>,
}

impl PublishReport {
    pub fn is_published(&self) -> bool {
        self.remote_error.is_none()
    }
}

pub struct FeedPublisher {
    layout: StoreLayout,
    snapshots: SnapshotStore,
    backend: Arc<dyn StorageBackend>,
}

impl FeedPublisher {
    pub fn new(layout: StoreLayout, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            snapshots: SnapshotStore::new(layout.clone()),
            layout,
            backend,
        }
    }

    /// Persist `show` locally and publish its feed
    ///
    /// On `Err` the snapshot and feed on disk are those from before the call.
    pub async fn persist(&self, show: &mut Show, deadline: Instant) -> EngineResult<PublishReport> {
        let xml = feed::render(show)?;
        let previous = self.snapshots.checkpoint(&show.title).await?;
        self.snapshots.save(show).await?;

        let feed_path = self.layout.feed_path(&show.title);
        if let Err(e) = write_atomic(&feed_path, xml.as_bytes()).await {
            if let Err(restore) = self.snapshots.restore(&show.title, previous.as_deref()).await {
                warn!(
                    show = %show.title,
                    error = %restore,
                    "Failed to roll back snapshot after feed write failure"
                );
            }
            return Err(EngineError::Persistence(format!(
                "write {}: {}",
                feed_path.display(),
                e
            )));
        }
        debug!(show = %show.title, path = %feed_path.display(), "Feed rendered");

        let key = feed_key(&show.title);
        let upload = tokio::time::timeout_at(deadline, self.backend.upload(&feed_path, &key)).await;
        let outcome = match upload {
            Ok(Ok(url)) if !url.is_empty() => Ok(url),
            Ok(Ok(_)) => Err("backend returned no public URL".to_string()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("deadline exceeded".to_string()),
        };

        match outcome {
            Ok(url) => {
                if show.feed_url != url {
                    show.feed_url = url.clone();
                    // The feed URL is rediscovered on the next publish
                    if let Err(e) = self.snapshots.save(show).await {
                        warn!(show = %show.title, error = %e, "Failed to record feed URL");
                    }
                }
                info!(show = %show.title, url = %url, "Feed published");
                Ok(PublishReport {
                    feed_path,
                    feed_url: Some(url),
                    remote_error: None,
                })
            }
            Err(reason) => {
                warn!(
                    show = %show.title,
                    backend = self.backend.name(),
                    error = %reason,
                    "Feed publish failed, public feed is stale"
                );
                Ok(PublishReport {
                    feed_path,
                    feed_url: None,
                    remote_error: Some(reason),
                })
            }
        }
    }

    /// Remove the local feed document
    pub async fn remove_local(&self, title: &str) -> EngineResult<bool> {
        Ok(remove_if_exists(&self.layout.feed_path(title)).await?)
    }
}
