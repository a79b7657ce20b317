//! Engine services
//!
//! - **registry**: known show titles, rebuilt from the snapshot directory
//! - **deduplicator**: drops items a show already has
//! - **enrichment**: concurrent per-item metadata and media fetch
//! - **quota**: usage-driven admission with oldest-first eviction
//! - **snapshot_store / feed / publisher**: durable state and its public feed
//! - **ingest**: one item end to end
//! - **sync**: channel subscriptions
//! - **show_locks**: one mutating operation per show at a time

pub mod deduplicator;
pub mod enrichment;
pub mod feed;
pub mod ingest;
pub mod publisher;
pub mod quota;
pub mod registry;
pub mod show_locks;
pub mod snapshot_store;
pub mod sync;

pub use enrichment::{EnrichedItem, EnrichmentPipeline, ItemOrigin};
pub use ingest::{IngestOutcome, IngestPipeline};
pub use publisher::{FeedPublisher, PublishReport};
pub use quota::QuotaStore;
pub use registry::ShowRegistry;
pub use show_locks::{ShowGuard, ShowLocks};
pub use snapshot_store::SnapshotStore;
pub use sync::{ItemRef, SkippedItem, SyncReport, SyncScheduler};

use crate::error::{EngineError, EngineResult, Stage};
use std::future::Future;
use tokio::time::Instant;

/// Run `fut` against the operation deadline
pub(crate) async fn within<T, F>(deadline: Instant, stage: Stage, fut: F) -> EngineResult<T>
where
    F: Future<Output = EngineResult<T>>,
{
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::Timeout { stage }),
    }
}
