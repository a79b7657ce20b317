//! Item enrichment pipeline
//!
//! Resolves every metadata field and both media payloads of one item at the
//! same time. The seven fetches are independent; they all write into
//! disjoint parts of the result and meet at a single join barrier.
//!
//! Only the audio payload is required. Any other fetch that fails leaves its
//! field empty (or zero) and the item goes ahead with best-effort metadata.

use crate::error::{EngineError, EngineResult, Stage};
use crate::models::{Enclosure, Episode, ImageRef, AUDIO_MIME_TYPE};
use crate::types::{SourceError, VideoSource};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Where an item came from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemOrigin {
    /// Uploader handle, used as episode author
    pub author: String,
    /// Channel handle the item was discovered on
    pub source_channel: String,
}

impl ItemOrigin {
    pub fn channel(handle: &str) -> Self {
        Self {
            author: handle.to_string(),
            source_channel: handle.to_string(),
        }
    }
}

/// One fully fetched item, with its media staged locally
#[derive(Debug, Clone)]
pub struct EnrichedItem {
    pub guid: String,
    pub origin: ItemOrigin,
    pub title: String,
    pub description: String,
    pub duration: String,
    pub views: u64,
    pub pub_date: String,
    pub link: String,
    pub audio_path: PathBuf,
    pub audio_bytes: u64,
    pub thumbnail_path: Option<PathBuf>,
}

impl EnrichedItem {
    /// Build the catalog record once the media is public
    pub fn into_episode(self, audio_url: String, image_href: String, added_on: DateTime<Utc>) -> Episode {
        Episode {
            guid: self.guid,
            author: self.origin.author,
            source_channel: self.origin.source_channel,
            added_on,
            explicit: "no".to_string(),
            subtitle: if self.description.is_empty() {
                self.title.clone()
            } else {
                self.description.clone()
            },
            title: self.title,
            summary: self.description.clone(),
            description: self.description,
            duration: self.duration,
            views: self.views,
            pub_date: self.pub_date,
            image: ImageRef { href: image_href },
            enclosure: Enclosure {
                url: audio_url,
                length: self.audio_bytes,
                mime_type: AUDIO_MIME_TYPE.to_string(),
            },
            link: self.link,
        }
    }

    /// Delete the staged media of this item
    pub async fn discard(&self) {
        discard_staged(&self.audio_path).await;
        if let Some(thumbnail) = &self.thumbnail_path {
            discard_staged(thumbnail).await;
        }
    }
}

pub struct EnrichmentPipeline {
    source: Arc<dyn VideoSource>,
}

impl EnrichmentPipeline {
    pub fn new(source: Arc<dyn VideoSource>) -> Self {
        Self { source }
    }

    /// Fetch everything about `item_id`, staging media under `media_dir`
    ///
    /// Fails with `EnrichmentIncomplete` when no usable audio was obtained and
    /// with `Timeout` when the deadline passes first; in both cases whatever
    /// was staged for the item is removed again.
    pub async fn enrich(
        &self,
        item_id: &str,
        origin: ItemOrigin,
        media_dir: &Path,
        deadline: Instant,
    ) -> EngineResult<EnrichedItem> {
        debug!(guid = %item_id, "Enriching item");
        tokio::fs::create_dir_all(media_dir).await?;
        let source = self.source.as_ref();

        let fetched = tokio::time::timeout_at(deadline, async {
            tokio::join!(
                source.title(item_id),
                source.description(item_id),
                source.duration(item_id),
                source.view_count(item_id),
                source.publish_date(item_id),
                source.fetch_thumbnail(item_id, media_dir),
                source.fetch_audio(item_id, media_dir),
            )
        })
        .await;

        let (title, description, duration, views, pub_date, thumbnail, audio) = match fetched {
            Ok(results) => results,
            Err(_) => {
                warn!(guid = %item_id, "Enrichment deadline exceeded, item abandoned");
                discard_item_artifacts(media_dir, item_id).await;
                return Err(EngineError::Timeout { stage: Stage::Fetch });
            }
        };

        let thumbnail_path = soft(item_id, "thumbnail", thumbnail.map(Some));

        let audio_path = match audio {
            Ok(path) => path,
            Err(e) => {
                return self
                    .reject(item_id, media_dir, format!("audio unavailable: {}", e))
                    .await;
            }
        };
        let audio_bytes = match tokio::fs::metadata(&audio_path).await {
            Ok(meta) if meta.len() > 0 => meta.len(),
            Ok(_) => return self.reject(item_id, media_dir, "audio file is empty".to_string()).await,
            Err(e) => {
                return self
                    .reject(item_id, media_dir, format!("audio file unreadable: {}", e))
                    .await;
            }
        };

        let item = EnrichedItem {
            guid: item_id.to_string(),
            origin,
            title: soft(item_id, "title", title),
            description: soft(item_id, "description", description),
            duration: soft(item_id, "duration", duration),
            views: soft(item_id, "view_count", views),
            pub_date: soft(item_id, "publish_date", pub_date),
            link: self.source.item_link(item_id),
            audio_path,
            audio_bytes,
            thumbnail_path,
        };

        info!(
            guid = %item.guid,
            title = %item.title,
            bytes = item.audio_bytes,
            thumbnail = item.thumbnail_path.is_some(),
            "Item enriched"
        );
        Ok(item)
    }

    async fn reject(
        &self,
        item_id: &str,
        media_dir: &Path,
        reason: String,
    ) -> EngineResult<EnrichedItem> {
        warn!(guid = %item_id, reason = %reason, "Enrichment incomplete, item discarded");
        discard_item_artifacts(media_dir, item_id).await;
        Err(EngineError::EnrichmentIncomplete {
            guid: item_id.to_string(),
            reason,
        })
    }
}

/// Field value, or its default when the fetch failed
fn soft<T: Default>(item_id: &str, field: &str, result: Result<T, SourceError>) -> T {
    result.unwrap_or_else(|e| {
        warn!(guid = %item_id, field = field, error = %e, "Field fetch failed, using empty value");
        T::default()
    })
}

/// Remove every staged file of one item (`<media_dir>/<item_id>.*`)
pub async fn discard_item_artifacts(media_dir: &Path, item_id: &str) {
    let prefix = format!("{}.", item_id);
    let mut entries = match tokio::fs::read_dir(media_dir).await {
        Ok(entries) => entries,
        Err(_) => return,
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_name().to_string_lossy().starts_with(&prefix) {
            discard_staged(&entry.path()).await;
        }
    }
}

async fn discard_staged(path: &Path) {
    match tubecast_common::fs::remove_if_exists(path).await {
        Ok(true) => debug!(path = %path.display(), "Discarded staged media"),
        Ok(false) => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to discard staged media"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_discard_item_artifacts_matches_whole_id() {
        let dir = TempDir::new().unwrap();
        for name in ["abc.mp3", "abc.jpg", "abcd.mp3", "other.mp3"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        discard_item_artifacts(dir.path(), "abc").await;

        assert!(!dir.path().join("abc.mp3").exists());
        assert!(!dir.path().join("abc.jpg").exists());
        assert!(dir.path().join("abcd.mp3").exists());
        assert!(dir.path().join("other.mp3").exists());
    }

    #[tokio::test]
    async fn test_discard_in_missing_dir_is_noop() {
        let dir = TempDir::new().unwrap();
        discard_item_artifacts(&dir.path().join("missing"), "abc").await;
    }

    fn sample_item(description: &str) -> EnrichedItem {
        EnrichedItem {
            guid: "abc123".to_string(),
            origin: ItemOrigin::channel("@creator"),
            title: "Title".to_string(),
            description: description.to_string(),
            duration: "12:34".to_string(),
            views: 42,
            pub_date: "Wed, 31 Jan 2024 00:00:00 GMT".to_string(),
            link: "https://www.youtube.com/watch?v=abc123".to_string(),
            audio_path: PathBuf::from("/tmp/abc123.mp3"),
            audio_bytes: 1000,
            thumbnail_path: None,
        }
    }

    #[test]
    fn test_into_episode() {
        let now = Utc::now();

        let episode = sample_item("Body").into_episode(
            "https://cdn/abc123.mp3".to_string(),
            String::new(),
            now,
        );
        assert_eq!(episode.guid, "abc123");
        assert_eq!(episode.author, "@creator");
        assert_eq!(episode.title, "Title");
        assert_eq!(episode.subtitle, "Body");
        assert_eq!(episode.summary, "Body");
        assert_eq!(episode.enclosure.length, 1000);
        assert_eq!(episode.enclosure.mime_type, "audio/mpeg");
        assert_eq!(episode.added_on, now);
        assert!(episode.image.href.is_empty());
    }

    #[test]
    fn test_subtitle_falls_back_to_title() {
        let episode = sample_item("").into_episode(
            "https://cdn/abc123.mp3".to_string(),
            String::new(),
            Utc::now(),
        );
        assert_eq!(episode.subtitle, "Title");
        assert_eq!(episode.description, "");
    }
}
