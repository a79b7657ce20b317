//! Sync scheduler
//!
//! For each subscribed channel: list the most recent items, drop the ones the
//! show already has, then admit the rest one after another. Items of one show
//! are never processed concurrently; the only parallelism is inside a single
//! item's enrichment.
//!
//! Item-scoped failures (duplicate, no audio, quota, fetch/upload trouble)
//! skip the item. Anything else, such as an unreachable channel or a local
//! write failure, ends the run.

use super::deduplicator;
use super::enrichment::ItemOrigin;
use super::ingest::IngestPipeline;
use super::publisher::PublishReport;
use super::registry::ShowRegistry;
use super::show_locks::ShowLocks;
use super::snapshot_store::SnapshotStore;
use super::within;
use crate::error::{EngineError, EngineResult, Stage};
use crate::models::Show;
use crate::types::{ChannelRef, VideoSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// An item of a show
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRef {
    pub show: String,
    pub guid: String,
}

/// An item a sync run did not admit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    pub show: String,
    pub guid: String,
    pub reason: String,
}

/// What a sync run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: Vec<ItemRef>,
    pub evicted: Vec<ItemRef>,
    pub skipped: Vec<SkippedItem>,
    /// Feed publications that failed (show title, reason)
    pub publish_errors: Vec<(String, String)>,
    /// (show, channel) pairs visited
    pub channels_synced: usize,
}

impl SyncReport {
    pub fn merge(&mut self, other: SyncReport) {
        self.added.extend(other.added);
        self.evicted.extend(other.evicted);
        self.skipped.extend(other.skipped);
        self.publish_errors.extend(other.publish_errors);
        self.channels_synced += other.channels_synced;
    }

    pub fn added_guids(&self) -> Vec<&str> {
        self.added.iter().map(|i| i.guid.as_str()).collect()
    }

    fn record_publish(&mut self, show: &str, report: &PublishReport) {
        if let Some(reason) = &report.remote_error {
            self.publish_errors.push((show.to_string(), reason.clone()));
        }
    }
}

pub struct SyncScheduler {
    source: Arc<dyn VideoSource>,
    ingest: Arc<IngestPipeline>,
    registry: Arc<ShowRegistry>,
    locks: Arc<ShowLocks>,
    snapshots: SnapshotStore,
    recent_limit: usize,
    operation_timeout: Duration,
}

impl SyncScheduler {
    pub fn new(
        source: Arc<dyn VideoSource>,
        ingest: Arc<IngestPipeline>,
        registry: Arc<ShowRegistry>,
        locks: Arc<ShowLocks>,
        snapshots: SnapshotStore,
        recent_limit: usize,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            source,
            ingest,
            registry,
            locks,
            snapshots,
            recent_limit,
            operation_timeout,
        }
    }

    /// Sync one channel into `show`; the caller holds the show lock
    pub async fn sync_one(
        &self,
        show: &mut Show,
        channel: &ChannelRef,
        deadline: Instant,
    ) -> EngineResult<SyncReport> {
        let mut report = SyncReport {
            channels_synced: 1,
            ..Default::default()
        };

        let recent = within(deadline, Stage::Lookup, async {
            self.source
                .list_recent_items(channel, self.recent_limit)
                .await
                .map_err(|e| EngineError::video(Stage::Lookup, e))
        })
        .await?;

        let fresh = deduplicator::filter_new(show, &recent);
        debug!(
            show = %show.title,
            channel = %channel.handle,
            listed = recent.len(),
            fresh = fresh.len(),
            "Channel listed"
        );

        for guid in fresh {
            if Instant::now() >= deadline {
                warn!(show = %show.title, guid = %guid, "Sync deadline exceeded, item left for next run");
                report.skipped.push(SkippedItem {
                    show: show.title.clone(),
                    guid,
                    reason: EngineError::Timeout { stage: Stage::Fetch }.to_string(),
                });
                continue;
            }

            match self
                .ingest
                .ingest(show, &guid, ItemOrigin::channel(&channel.handle), deadline)
                .await
            {
                Ok(outcome) => {
                    report.record_publish(&show.title, &outcome.publish);
                    report.evicted.extend(outcome.evicted.into_iter().map(|g| ItemRef {
                        show: show.title.clone(),
                        guid: g,
                    }));
                    report.added.push(ItemRef {
                        show: show.title.clone(),
                        guid,
                    });
                }
                Err(e) if e.is_item_scoped() => {
                    warn!(
                        show = %show.title,
                        guid = %guid,
                        stage = %e.stage(),
                        error = %e,
                        "Item skipped"
                    );
                    report.skipped.push(SkippedItem {
                        show: show.title.clone(),
                        guid,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            show = %show.title,
            channel = %channel.handle,
            added = report.added.len(),
            skipped = report.skipped.len(),
            "Channel synced"
        );
        Ok(report)
    }

    /// Sync every subscribed channel of every registered show
    ///
    /// Stops at the first hard error; shows and channels already synced keep
    /// their results.
    pub async fn sync_all(&self) -> EngineResult<SyncReport> {
        let mut report = SyncReport::default();

        for title in self.registry.all().await {
            let _guard = self.locks.lock(&title).await;
            if !self.registry.exists(&title).await {
                // Removed while waiting for the lock
                continue;
            }
            let mut show = self.snapshots.load(&title).await?;

            let handles: Vec<String> = show.subscribed_channels.iter().cloned().collect();
            for handle in handles {
                let deadline = Instant::now() + self.operation_timeout;
                let channel = within(deadline, Stage::Lookup, async {
                    self.source
                        .resolve_channel(&handle)
                        .await
                        .map_err(|e| EngineError::video(Stage::Lookup, e))
                })
                .await?;
                report.merge(self.sync_one(&mut show, &channel, deadline).await?);
            }
        }

        info!(
            channels = report.channels_synced,
            added = report.added.len(),
            skipped = report.skipped.len(),
            "Sync run complete"
        );
        Ok(report)
    }
}
