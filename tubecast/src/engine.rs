//! Show engine
//!
//! The single entry point for every show operation. Construct one per process
//! with [`Engine::open`]; it owns the show registry, the per-show locks and
//! all services, and receives its two collaborators (video source and storage
//! backend) from the caller.
//!
//! Every mutating operation takes the show's lock, runs against one deadline
//! of `operation_timeout`, and persists/publishes before it returns.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, Stage};
use crate::layout::{cover_key, episode_pattern, show_pattern, validate_title, StoreLayout};
use crate::models::{Episode, Show};
use crate::services::enrichment::discard_item_artifacts;
use crate::services::{
    deduplicator, within, EnrichmentPipeline, FeedPublisher, IngestOutcome, IngestPipeline,
    ItemOrigin, PublishReport, QuotaStore, ShowLocks, ShowRegistry, SnapshotStore, SyncReport,
    SyncScheduler,
};
use crate::types::{StorageBackend, VideoSource};
use std::path::Path;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

/// Listing entry for one show
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowSummary {
    pub title: String,
    pub description: String,
    pub episode_count: usize,
    pub enclosure_bytes: u64,
    pub subscribed_channels: Vec<String>,
    pub feed_url: String,
}

/// Outcome of removing a show
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalReport {
    pub title: String,
    /// Remote objects deleted
    pub deleted_objects: u64,
}

pub struct Engine {
    config: EngineConfig,
    layout: StoreLayout,
    source: Arc<dyn VideoSource>,
    backend: Arc<dyn StorageBackend>,
    registry: Arc<ShowRegistry>,
    locks: Arc<ShowLocks>,
    snapshots: SnapshotStore,
    publisher: Arc<FeedPublisher>,
    ingest: Arc<IngestPipeline>,
    scheduler: SyncScheduler,
}

impl Engine {
    /// Build the engine and rebuild the show registry from disk
    pub async fn open(
        config: EngineConfig,
        source: Arc<dyn VideoSource>,
        backend: Arc<dyn StorageBackend>,
    ) -> EngineResult<Self> {
        let layout = StoreLayout::new(&config.root_folder);
        tokio::fs::create_dir_all(layout.feeds_dir()).await?;
        let registry = Arc::new(ShowRegistry::load(&layout.stations_dir()).await?);
        let locks = Arc::new(ShowLocks::new());
        let snapshots = SnapshotStore::new(layout.clone());

        let publisher = Arc::new(FeedPublisher::new(layout.clone(), backend.clone()));
        let quota = Arc::new(QuotaStore::new(
            backend.clone(),
            publisher.clone(),
            layout.clone(),
            config.quota_bytes,
        ));
        let ingest = Arc::new(IngestPipeline::new(
            EnrichmentPipeline::new(source.clone()),
            quota,
            publisher.clone(),
            layout.clone(),
        ));
        let scheduler = SyncScheduler::new(
            source.clone(),
            ingest.clone(),
            registry.clone(),
            locks.clone(),
            snapshots.clone(),
            config.recent_limit,
            config.operation_timeout,
        );

        info!(
            root = %layout.root().display(),
            backend = backend.name(),
            quota_bytes = config.quota_bytes,
            "Engine ready"
        );
        Ok(Self {
            config,
            layout,
            source,
            backend,
            registry,
            locks,
            snapshots,
            publisher,
            ingest,
            scheduler,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn registry(&self) -> &ShowRegistry {
        &self.registry
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.config.operation_timeout
    }

    /// Current snapshot of a show
    pub async fn show(&self, title: &str) -> EngineResult<Show> {
        if !self.registry.exists(title).await {
            return Err(not_found(title));
        }
        self.snapshots.load(title).await
    }

    /// Every show with its headline numbers, sorted by title
    pub async fn list_shows(&self) -> EngineResult<Vec<ShowSummary>> {
        let mut summaries = Vec::new();
        for title in self.registry.all().await {
            let show = match self.snapshots.load(&title).await {
                Ok(show) => show,
                // Removed between listing and loading
                Err(EngineError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            summaries.push(ShowSummary {
                episode_count: show.episodes.len(),
                enclosure_bytes: show.enclosure_bytes(),
                subscribed_channels: show.subscribed_channels.iter().cloned().collect(),
                title: show.title,
                description: show.description,
                feed_url: show.feed_url,
            });
        }
        Ok(summaries)
    }

    // ------------------------------------------------------------------
    // Shows
    // ------------------------------------------------------------------

    /// Create a show, optionally with cover art from a local image
    pub async fn create_show(
        &self,
        title: &str,
        description: &str,
        cover: Option<&Path>,
    ) -> EngineResult<Show> {
        validate_title(title).map_err(EngineError::InvalidInput)?;
        let _guard = self.locks.lock(title).await;
        let (show, _) = self
            .create_show_locked(title, description, cover, self.deadline())
            .await?;
        Ok(show)
    }

    async fn create_show_locked(
        &self,
        title: &str,
        description: &str,
        cover: Option<&Path>,
        deadline: Instant,
    ) -> EngineResult<(Show, PublishReport)> {
        if self.registry.exists(title).await {
            return Err(EngineError::AlreadyExists(format!("show '{}'", title)));
        }

        let mut show = Show::new(title, description, &self.config.owner);

        if let Some(cover) = cover {
            show.image.href = self.upload_cover(title, cover, deadline).await;
        }

        let report = match self.publisher.persist(&mut show, deadline).await {
            Ok(report) => report,
            Err(e) => {
                // Registry and snapshot directory must agree
                if let Err(err) = self.snapshots.remove(title).await {
                    warn!(show = %title, error = %err, "Failed to remove snapshot of aborted show");
                }
                if let (Some(cover), false) = (cover, show.image.href.is_empty()) {
                    self.discard_cover(title, cover, deadline).await;
                }
                return Err(e);
            }
        };
        self.registry.register(title).await;

        info!(show = %title, "Show created");
        Ok((show, report))
    }

    async fn upload_cover(&self, title: &str, cover: &Path, deadline: Instant) -> String {
        let key = cover_key(title, cover);
        let upload = within(deadline, Stage::Upload, async {
            self.backend
                .upload(cover, &key)
                .await
                .map_err(|e| EngineError::remote(Stage::Upload, e))
        })
        .await;
        match upload {
            Ok(url) => url,
            Err(e) => {
                warn!(show = %title, path = %cover.display(), error = %e, "Cover upload failed, show has no image");
                String::new()
            }
        }
    }

    async fn discard_cover(&self, title: &str, cover: &Path, deadline: Instant) {
        let key = cover_key(title, cover);
        let deleted = within(deadline, Stage::Delete, async {
            self.backend
                .delete(&key)
                .await
                .map_err(|e| EngineError::remote(Stage::Delete, e))
        })
        .await;
        if let Err(e) = deleted {
            warn!(show = %title, key = %key, error = %e, "Failed to delete cover of aborted show");
        }
    }

    /// Load `title`, creating it first when a description is supplied
    async fn load_or_create(
        &self,
        title: &str,
        description: Option<&str>,
        deadline: Instant,
    ) -> EngineResult<Show> {
        if self.registry.exists(title).await {
            return self.snapshots.load(title).await;
        }
        match description {
            Some(description) => Ok(self
                .create_show_locked(title, description, None, deadline)
                .await?
                .0),
            None => Err(not_found(title)),
        }
    }

    /// Delete a show with all its remote objects and local files
    pub async fn remove_show(&self, title: &str) -> EngineResult<RemovalReport> {
        let _guard = self.locks.lock(title).await;
        if !self.registry.exists(title).await {
            return Err(not_found(title));
        }
        let deadline = self.deadline();

        let pattern = show_pattern(title);
        let deleted_objects = within(deadline, Stage::Delete, async {
            self.backend
                .delete(&pattern)
                .await
                .map_err(|e| EngineError::remote(Stage::Delete, e))
        })
        .await?;

        self.snapshots.remove(title).await?;
        self.registry.unregister(title).await;

        self.publisher.remove_local(title).await?;
        match tokio::fs::remove_dir_all(self.layout.media_dir(title)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(show = %title, error = %e, "Failed to remove staged media directory"),
        }

        info!(show = %title, objects = deleted_objects, "Show removed");
        Ok(RemovalReport {
            title: title.to_string(),
            deleted_objects,
        })
    }

    // ------------------------------------------------------------------
    // Episodes
    // ------------------------------------------------------------------

    /// Add one item, given as link or bare identifier
    ///
    /// With `description`, a missing show is created first.
    pub async fn add_video(
        &self,
        title: &str,
        link: &str,
        description: Option<&str>,
    ) -> EngineResult<IngestOutcome> {
        validate_title(title).map_err(EngineError::InvalidInput)?;
        if link.trim().is_empty() {
            return Err(EngineError::InvalidInput("video link must not be empty".to_string()));
        }
        let _guard = self.locks.lock(title).await;
        let deadline = self.deadline();
        let mut show = self.load_or_create(title, description, deadline).await?;

        let item_id = within(deadline, Stage::Lookup, async {
            self.source
                .resolve_item_id(link.trim())
                .await
                .map_err(|e| EngineError::video(Stage::Lookup, e))
        })
        .await?;

        if deduplicator::is_duplicate(&show, &item_id) {
            return Err(EngineError::AlreadyExists(format!(
                "episode '{}' in show '{}'",
                item_id, title
            )));
        }

        let origin = match within(deadline, Stage::Lookup, async {
            self.source
                .resolve_source_for_item(link.trim())
                .await
                .map_err(|e| EngineError::video(Stage::Lookup, e))
        })
        .await
        {
            Ok(handle) => ItemOrigin::channel(&handle),
            Err(e) => {
                warn!(show = %title, guid = %item_id, error = %e, "Uploader lookup failed, episode has no author");
                ItemOrigin::default()
            }
        };

        self.ingest.ingest(&mut show, &item_id, origin, deadline).await
    }

    /// Remove one episode, given as link or bare identifier
    pub async fn remove_video(&self, title: &str, link: &str) -> EngineResult<Episode> {
        let _guard = self.locks.lock(title).await;
        if !self.registry.exists(title).await {
            return Err(not_found(title));
        }
        let deadline = self.deadline();
        let mut show = self.snapshots.load(title).await?;

        let item_id = within(deadline, Stage::Lookup, async {
            self.source
                .resolve_item_id(link.trim())
                .await
                .map_err(|e| EngineError::video(Stage::Lookup, e))
        })
        .await?;
        if !show.has_episode(&item_id) {
            return Err(EngineError::NotFound(format!(
                "episode '{}' in show '{}'",
                item_id, title
            )));
        }

        let pattern = episode_pattern(title, &item_id);
        within(deadline, Stage::Delete, async {
            self.backend
                .delete(&pattern)
                .await
                .map_err(|e| EngineError::remote(Stage::Delete, e))
        })
        .await?;

        let removed = show
            .remove_episode(&item_id)
            .ok_or_else(|| EngineError::NotFound(format!("episode '{}'", item_id)))?;
        discard_item_artifacts(&self.layout.media_dir(title), &item_id).await;
        self.publisher.persist(&mut show, deadline).await?;

        info!(show = %title, guid = %item_id, "Episode removed");
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Subscribe `title` to a channel and sync it right away
    ///
    /// With `description`, a missing show is created first.
    pub async fn sync_channel(
        &self,
        title: &str,
        handle: &str,
        description: Option<&str>,
    ) -> EngineResult<SyncReport> {
        validate_title(title).map_err(EngineError::InvalidInput)?;
        let _guard = self.locks.lock(title).await;
        let deadline = self.deadline();
        let mut show = self.load_or_create(title, description, deadline).await?;

        let channel = within(deadline, Stage::Lookup, async {
            self.source
                .resolve_channel(handle)
                .await
                .map_err(|e| EngineError::video(Stage::Lookup, e))
        })
        .await?;

        let mut publish_errors = Vec::new();
        if show.subscribed_channels.insert(channel.handle.clone()) {
            let report = self.publisher.persist(&mut show, deadline).await?;
            if let Some(reason) = report.remote_error {
                publish_errors.push((show.title.clone(), reason));
            }
            info!(show = %title, channel = %channel.handle, "Subscribed to channel");
        }

        let mut report = self.scheduler.sync_one(&mut show, &channel, deadline).await?;
        publish_errors.append(&mut report.publish_errors);
        report.publish_errors = publish_errors;
        Ok(report)
    }

    /// Sync every subscription of every show
    pub async fn sync_all(&self) -> EngineResult<SyncReport> {
        self.scheduler.sync_all().await
    }
}

fn not_found(title: &str) -> EngineError {
    EngineError::NotFound(format!("show '{}'", title))
}
