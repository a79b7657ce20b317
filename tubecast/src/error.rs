//! Error types for the TubeCast engine
//!
//! Every failure names the stage it happened in so a caller can tell
//! "try again later" conditions (remote backend, source, deadline) apart from
//! permanent ones (not found, already exists, invalid input).

use crate::types::{SourceError, StorageError};
use thiserror::Error;

/// Stage of a show operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Resolving shows, items and channels
    Lookup,
    /// Enrichment: metadata fields and media payloads
    Fetch,
    /// Admission against the storage quota, including eviction
    Quota,
    /// Media upload
    Upload,
    /// Remote deletion of a show or episode
    Delete,
    /// Local snapshot or feed write
    Persist,
    /// Remote feed publication
    Publish,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Lookup => "lookup",
            Stage::Fetch => "fetch",
            Stage::Quota => "quota",
            Stage::Upload => "upload",
            Stage::Delete => "delete",
            Stage::Persist => "persist",
            Stage::Publish => "publish",
        };
        f.write_str(name)
    }
}

/// Engine error type
#[derive(Debug, Error)]
pub enum EngineError {
    /// Show or episode does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate show title or episode guid
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Audio payload unobtainable; the item was discarded
    #[error("Enrichment incomplete for {guid}: {reason}")]
    EnrichmentIncomplete { guid: String, reason: String },

    /// Nothing left to evict and the item still does not fit
    #[error("Quota exhausted for {guid}: needs {required} bytes, quota is {quota} bytes")]
    QuotaExhausted {
        guid: String,
        required: u64,
        quota: u64,
    },

    #[error("Remote storage error during {stage}: {source}")]
    Remote {
        stage: Stage,
        #[source]
        source: StorageError,
    },

    #[error("Video source error during {stage}: {source}")]
    Source {
        stage: Stage,
        #[source]
        source: SourceError,
    },

    /// Local snapshot or feed write failed; the previous file is intact
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Deadline exceeded during {stage}")]
    Timeout { stage: Stage },

    #[error(transparent)]
    Common(#[from] tubecast_common::Error),
}

impl EngineError {
    pub fn remote(stage: Stage, source: StorageError) -> Self {
        EngineError::Remote { stage, source }
    }

    pub fn video(stage: Stage, source: SourceError) -> Self {
        EngineError::Source { stage, source }
    }

    /// Stage the operation failed in
    pub fn stage(&self) -> Stage {
        match self {
            EngineError::NotFound(_)
            | EngineError::AlreadyExists(_)
            | EngineError::InvalidInput(_) => Stage::Lookup,
            EngineError::EnrichmentIncomplete { .. } => Stage::Fetch,
            EngineError::QuotaExhausted { .. } => Stage::Quota,
            EngineError::Remote { stage, .. }
            | EngineError::Source { stage, .. }
            | EngineError::Timeout { stage } => *stage,
            EngineError::Persistence(_) | EngineError::Common(_) => Stage::Persist,
        }
    }

    /// Whether retrying the same operation later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Remote { .. }
                | EngineError::Source { .. }
                | EngineError::Timeout { .. }
                | EngineError::EnrichmentIncomplete { .. }
        )
    }

    /// Whether the failure concerns a single item only
    ///
    /// A sync run skips item-scoped failures and continues with the next
    /// item; anything else aborts the run.
    pub fn is_item_scoped(&self) -> bool {
        match self {
            EngineError::AlreadyExists(_)
            | EngineError::EnrichmentIncomplete { .. }
            | EngineError::QuotaExhausted { .. } => true,
            EngineError::Timeout { stage } => matches!(stage, Stage::Fetch | Stage::Upload),
            EngineError::Remote { stage, .. } => *stage == Stage::Upload,
            EngineError::Source { stage, .. } => *stage == Stage::Fetch,
            _ => false,
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Persistence(err.to_string())
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
