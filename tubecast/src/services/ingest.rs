//! Single-item admission: enrichment → quota → upload → persist

use super::enrichment::{discard_item_artifacts, EnrichmentPipeline, ItemOrigin};
use super::publisher::{FeedPublisher, PublishReport};
use super::quota::QuotaStore;
use super::within;
use crate::error::{EngineError, EngineResult, Stage};
use crate::layout::{audio_key, thumbnail_key, validate_item_id, StoreLayout};
use crate::models::{Episode, Show};
use crate::types::StorageError;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

/// Result of admitting one item
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub episode: Episode,
    /// Episodes evicted to make room, oldest first
    pub evicted: Vec<String>,
    pub publish: PublishReport,
}

pub struct IngestPipeline {
    enrichment: EnrichmentPipeline,
    quota: Arc<QuotaStore>,
    publisher: Arc<FeedPublisher>,
    layout: StoreLayout,
}

impl IngestPipeline {
    pub fn new(
        enrichment: EnrichmentPipeline,
        quota: Arc<QuotaStore>,
        publisher: Arc<FeedPublisher>,
        layout: StoreLayout,
    ) -> Self {
        Self {
            enrichment,
            quota,
            publisher,
            layout,
        }
    }

    /// Admit `item_id` into `show`
    ///
    /// The caller holds the show lock and has already deduplicated the item.
    /// On error, `show` may have lost evicted episodes (each eviction was
    /// persisted) but never holds a half-admitted one, and nothing uploaded
    /// for the rejected item is left on the backend.
    pub async fn ingest(
        &self,
        show: &mut Show,
        item_id: &str,
        origin: ItemOrigin,
        deadline: Instant,
    ) -> EngineResult<IngestOutcome> {
        validate_item_id(item_id).map_err(EngineError::InvalidInput)?;
        if show.has_episode(item_id) {
            return Err(EngineError::AlreadyExists(format!(
                "episode '{}' in show '{}'",
                item_id, show.title
            )));
        }

        let media_dir = self.layout.media_dir(&show.title);
        let item = self
            .enrichment
            .enrich(item_id, origin, &media_dir, deadline)
            .await?;

        let evicted = match self
            .quota
            .admit(show, item_id, item.audio_bytes, deadline)
            .await
        {
            Ok(evicted) => evicted,
            Err(e) => {
                item.discard().await;
                return Err(e);
            }
        };

        // A failed transfer keeps the staged files. An empty URL rejects the
        // item outright, and whatever the backend stored under its key goes.
        let audio_key = audio_key(&show.title, item_id);
        let audio_url = match within(deadline, Stage::Upload, async {
            self.quota
                .upload_staged(&item.audio_path, &audio_key)
                .await
                .map_err(|e| EngineError::remote(Stage::Upload, e))
        })
        .await
        {
            Ok(url) => url,
            Err(EngineError::Remote {
                source: StorageError::EmptyUrl(key),
                ..
            }) => {
                self.quota
                    .discard_remote(&show.title, item_id, deadline)
                    .await;
                item.discard().await;
                return Err(EngineError::EnrichmentIncomplete {
                    guid: item_id.to_string(),
                    reason: format!("audio upload returned no URL for {}", key),
                });
            }
            Err(e) => return Err(e),
        };

        let image_href = match &item.thumbnail_path {
            Some(path) => {
                let key = thumbnail_key(&show.title, item_id, path);
                let upload = within(deadline, Stage::Upload, async {
                    self.quota
                        .upload_staged(path, &key)
                        .await
                        .map_err(|e| EngineError::remote(Stage::Upload, e))
                })
                .await;
                upload.unwrap_or_else(|e| {
                    warn!(show = %show.title, guid = %item_id, error = %e, "Thumbnail upload failed, episode has no image");
                    String::new()
                })
            }
            None => String::new(),
        };

        let episode = item.into_episode(audio_url, image_href, tubecast_common::time::now());
        show.push_episode(episode.clone());
        let publish = match self.publisher.persist(show, deadline).await {
            Ok(publish) => publish,
            Err(e) => {
                warn!(show = %show.title, guid = %item_id, error = %e, "Persist failed, rolling back episode");
                show.remove_episode(item_id);
                self.quota
                    .discard_remote(&show.title, item_id, deadline)
                    .await;
                discard_item_artifacts(&media_dir, item_id).await;
                return Err(e);
            }
        };

        info!(
            show = %show.title,
            guid = %episode.guid,
            bytes = episode.enclosure.length,
            evicted = evicted.len(),
            "Episode added"
        );
        Ok(IngestOutcome {
            episode,
            evicted,
            publish,
        })
    }
}
