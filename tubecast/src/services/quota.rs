//! Quota-enforced store
//!
//! Admission is checked against the show's remote usage before any media of
//! the candidate is uploaded. While the candidate does not fit, the episode
//! with the oldest `added_on` is evicted (remote objects, snapshot entry,
//! republished feed) and usage is queried again. Insertion age is the only
//! ordering; how often an episode was fetched does not matter.
//!
//! Usage is read from the backend, which is not transactional with the local
//! snapshot. The loop re-queries after every deletion so it converges, but a
//! concurrent external writer can still make a single reading stale.

use super::enrichment::discard_item_artifacts;
use super::publisher::FeedPublisher;
use super::within;
use crate::error::{EngineError, EngineResult, Stage};
use crate::layout::{episode_pattern, StoreLayout};
use crate::models::Show;
use crate::types::{StorageBackend, StorageError};
use std::path::Path;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub struct QuotaStore {
    backend: Arc<dyn StorageBackend>,
    publisher: Arc<FeedPublisher>,
    layout: StoreLayout,
    quota_bytes: u64,
}

impl QuotaStore {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        publisher: Arc<FeedPublisher>,
        layout: StoreLayout,
        quota_bytes: u64,
    ) -> Self {
        Self {
            backend,
            publisher,
            layout,
            quota_bytes,
        }
    }

    /// Make room for `candidate_bytes` in `show`, evicting oldest first
    ///
    /// Returns the guids evicted, in eviction order. Every eviction is
    /// persisted before the next usage query, so an interrupted admission
    /// leaves a consistent (smaller) show behind.
    pub async fn admit(
        &self,
        show: &mut Show,
        guid: &str,
        candidate_bytes: u64,
        deadline: Instant,
    ) -> EngineResult<Vec<String>> {
        if candidate_bytes >= self.quota_bytes {
            warn!(
                show = %show.title,
                guid = %guid,
                bytes = candidate_bytes,
                quota = self.quota_bytes,
                "Item larger than the whole quota"
            );
            return Err(self.exhausted(guid, candidate_bytes));
        }

        let mut evicted = Vec::new();
        loop {
            let usage = within(deadline, Stage::Quota, async {
                self.backend
                    .usage(&show.title)
                    .await
                    .map_err(|e| EngineError::remote(Stage::Quota, e))
            })
            .await?;

            if usage.total_bytes + candidate_bytes < self.quota_bytes {
                debug!(
                    show = %show.title,
                    guid = %guid,
                    usage = usage.total_bytes,
                    bytes = candidate_bytes,
                    quota = self.quota_bytes,
                    "Admitted"
                );
                return Ok(evicted);
            }

            let oldest = match show.oldest_episode() {
                Some(episode) => episode.guid.clone(),
                None => {
                    warn!(
                        show = %show.title,
                        guid = %guid,
                        usage = usage.total_bytes,
                        bytes = candidate_bytes,
                        "Nothing left to evict"
                    );
                    return Err(self.exhausted(guid, candidate_bytes));
                }
            };

            self.evict(show, &oldest, deadline).await?;
            evicted.push(oldest);
        }
    }

    /// Remove one episode: remote objects, local leftovers, snapshot entry
    pub async fn evict(&self, show: &mut Show, guid: &str, deadline: Instant) -> EngineResult<()> {
        let pattern = episode_pattern(&show.title, guid);
        let deleted = within(deadline, Stage::Quota, async {
            self.backend
                .delete(&pattern)
                .await
                .map_err(|e| EngineError::remote(Stage::Quota, e))
        })
        .await?;

        show.remove_episode(guid);
        discard_item_artifacts(&self.layout.media_dir(&show.title), guid).await;
        self.publisher.persist(show, deadline).await?;

        info!(show = %show.title, guid = %guid, objects = deleted, "Evicted oldest episode");
        Ok(())
    }

    /// Upload a staged media file, deleting the local copy on success only
    pub async fn upload_staged(&self, local_path: &Path, key: &str) -> Result<String, StorageError> {
        let url = self.backend.upload(local_path, key).await?;
        if url.is_empty() {
            return Err(StorageError::EmptyUrl(key.to_string()));
        }
        if let Err(e) = tokio::fs::remove_file(local_path).await {
            warn!(path = %local_path.display(), error = %e, "Uploaded, but failed to remove staged copy");
        }
        Ok(url)
    }

    /// Best-effort removal of whatever was uploaded for `guid`
    ///
    /// Used when an item is rejected after its media reached the backend.
    pub async fn discard_remote(&self, title: &str, guid: &str, deadline: Instant) {
        let pattern = episode_pattern(title, guid);
        let deleted = within(deadline, Stage::Delete, async {
            self.backend
                .delete(&pattern)
                .await
                .map_err(|e| EngineError::remote(Stage::Delete, e))
        })
        .await;
        match deleted {
            Ok(count) => debug!(show = %title, guid = %guid, objects = count, "Discarded uploaded media"),
            Err(e) => warn!(show = %title, guid = %guid, error = %e, "Failed to discard uploaded media"),
        }
    }

    fn exhausted(&self, guid: &str, required: u64) -> EngineError {
        EngineError::QuotaExhausted {
            guid: guid.to_string(),
            required,
            quota: self.quota_bytes,
        }
    }
}
