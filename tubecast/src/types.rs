//! Collaborator contracts
//!
//! The engine talks to two external collaborators, both slow and partially
//! failing network services:
//! - **VideoSource**: lists a channel's recent items and resolves one item's
//!   metadata fields and media payloads
//! - **StorageBackend**: uploads, deletes and measures remote objects
//!
//! Concrete implementations live in `sources` and `storage`; the engine only
//! ever holds `Arc<dyn ...>` and never branches on which implementation it
//! was given.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

// ============================================================================
// Video Source
// ============================================================================

/// A subscribed channel, as handle plus its listing URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    /// Normalised handle, always starting with `@`
    pub handle: String,
    /// URL listing the channel's uploads, newest first
    pub feed_url: String,
}

/// Video source failure
#[derive(Debug, Error)]
pub enum SourceError {
    /// The external tool could not be started
    #[error("Failed to run {command}: {message}")]
    Spawn { command: String, message: String },

    /// The external tool exited unsuccessfully
    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// The tool ran but produced output that cannot be used
    #[error("Unexpected output: {0}")]
    Parse(String),

    /// Channel or item does not exist / is not reachable
    #[error("Unreachable: {0}")]
    Unreachable(String),

    /// Expected media file missing after a download
    #[error("Missing media file: {0}")]
    MissingMedia(PathBuf),

    #[error("Network error: {0}")]
    Network(String),
}

/// External video metadata source
///
/// Every call is network-bound, individually failable and idempotent, so any
/// of them can be abandoned on a deadline and retried later.
#[async_trait::async_trait]
pub trait VideoSource: Send + Sync {
    /// Turn a user-supplied handle (`name` or `@name`) into a validated channel
    async fn resolve_channel(&self, handle: &str) -> Result<ChannelRef, SourceError>;

    /// Most recent item identifiers of a channel, newest first
    async fn list_recent_items(
        &self,
        channel: &ChannelRef,
        limit: usize,
    ) -> Result<Vec<String>, SourceError>;

    /// Item identifier behind a link (a bare identifier is returned as is)
    async fn resolve_item_id(&self, link: &str) -> Result<String, SourceError>;

    /// Handle of the channel that published the item behind `link`
    async fn resolve_source_for_item(&self, link: &str) -> Result<String, SourceError>;

    async fn title(&self, item_id: &str) -> Result<String, SourceError>;

    async fn description(&self, item_id: &str) -> Result<String, SourceError>;

    /// Human readable duration (e.g. `12:34`)
    async fn duration(&self, item_id: &str) -> Result<String, SourceError>;

    async fn view_count(&self, item_id: &str) -> Result<u64, SourceError>;

    /// RFC 2822 publish date
    async fn publish_date(&self, item_id: &str) -> Result<String, SourceError>;

    /// Download the item thumbnail into `dest_dir`, returning the local path
    async fn fetch_thumbnail(&self, item_id: &str, dest_dir: &Path)
        -> Result<PathBuf, SourceError>;

    /// Download the item audio track into `dest_dir`, returning the local path
    async fn fetch_audio(&self, item_id: &str, dest_dir: &Path) -> Result<PathBuf, SourceError>;

    /// Canonical public link of an item
    fn item_link(&self, item_id: &str) -> String;
}

// ============================================================================
// Storage Backend
// ============================================================================

/// Aggregate remote usage of one namespace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub total_bytes: u64,
    pub file_count: u64,
}

/// Remote storage failure
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to run {command}: {message}")]
    Spawn { command: String, message: String },

    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Unexpected response: {0}")]
    Parse(String),

    #[error("Local file unavailable {path}: {message}")]
    LocalFile { path: PathBuf, message: String },

    #[error("Upload returned no public URL for {0}")]
    EmptyUrl(String),
}

/// Remote object storage
///
/// Object keys are `/`-separated; the first segment is the owning show's
/// namespace. Patterns accept `*` and `?` wildcards.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Upload a local file under `key`, returning its stable public URL
    async fn upload(&self, local_path: &Path, key: &str) -> Result<String, StorageError>;

    /// Delete every object whose key matches `pattern`; returns how many went
    async fn delete(&self, pattern: &str) -> Result<u64, StorageError>;

    /// Aggregate usage of all objects under `namespace/`
    async fn usage(&self, namespace: &str) -> Result<Usage, StorageError>;
}
